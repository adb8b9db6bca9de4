use std::collections::HashMap;
use std::rc::Rc;

use crate::error::VmError;
use crate::program::Program;

/// Every method lookup that misses retries under this universal base name.
pub const BASE_OBJECT_NAME: &str = "Object";

/// The registry that resolves (object-name, method-name) pairs to programs.
///
/// Keys are the exact string pairs: the map hashes the pair and compares the
/// strings on a hit, so two distinct pairs can never collide, no matter what
/// the live keyspace looks like. A secondary index remembers, per object
/// name, the method names in insertion order — that is what introspection
/// and whole-object purging walk.
#[derive(Debug, Default)]
pub struct ProgramPool {
    programs: HashMap<(String, String), Rc<Program>>,
    index: HashMap<String, Vec<String>>,
}

impl ProgramPool {
    pub fn new() -> Self {
        ProgramPool::default()
    }

    /// Inserts a program. An exact-pair collision is the
    /// duplicate-definition fatal error; use [`replace`](Self::replace) to
    /// overwrite on purpose.
    pub fn put(&mut self, object: &str, method: &str, program: Program) -> Result<(), VmError> {
        if self.shallow_check(object, method) {
            return Err(VmError::DuplicateProgram {
                object: object.to_string(),
                method: method.to_string(),
            });
        }
        self.programs
            .insert((object.to_string(), method.to_string()), Rc::new(program));
        self.index
            .entry(object.to_string())
            .or_default()
            .push(method.to_string());
        Ok(())
    }

    /// Looks a program up: exact pair first, then the same method under the
    /// universal base name. Absence is not an error — dispatch treats it as
    /// a nil-producing no-op.
    pub fn get(&self, object: &str, method: &str) -> Option<Rc<Program>> {
        if let Some(program) = self.get_exact(object, method) {
            return Some(program);
        }
        self.get_exact(BASE_OBJECT_NAME, method)
    }

    fn get_exact(&self, object: &str, method: &str) -> Option<Rc<Program>> {
        self.programs
            .get(&(object.to_string(), method.to_string()))
            .cloned()
    }

    /// Exact-pair existence check, no base-name fallback.
    pub fn shallow_check(&self, object: &str, method: &str) -> bool {
        self.programs
            .contains_key(&(object.to_string(), method.to_string()))
    }

    /// Existence check with the base-name fallback.
    pub fn exists(&self, object: &str, method: &str) -> bool {
        self.get(object, method).is_some()
    }

    /// Inserts, destroying any prior program under the exact pair.
    pub fn replace(&mut self, object: &str, method: &str, program: Program) {
        let key = (object.to_string(), method.to_string());
        if self.programs.insert(key, Rc::new(program)).is_none() {
            self.index
                .entry(object.to_string())
                .or_default()
                .push(method.to_string());
        }
    }

    /// Removes one program of one object type.
    pub fn delete(&mut self, object: &str, method: &str) {
        if self
            .programs
            .remove(&(object.to_string(), method.to_string()))
            .is_some()
        {
            if let Some(names) = self.index.get_mut(object) {
                names.retain(|n| n != method);
            }
        }
    }

    /// Removes every program of one object type.
    pub fn purge(&mut self, object: &str) {
        if let Some(names) = self.index.remove(object) {
            for method in names {
                self.programs.remove(&(object.to_string(), method));
            }
        }
    }

    /// True iff at least one method is registered under the exact name.
    pub fn is_compiled(&self, object: &str) -> bool {
        self.index.get(object).is_some_and(|names| !names.is_empty())
    }

    /// Calls `callback` for each method name of the exact object name, in
    /// insertion order. Inherited (base-name) methods are not included.
    pub fn for_each(&self, object: &str, mut callback: impl FnMut(&str)) {
        if let Some(names) = self.index.get(object) {
            for name in names {
                callback(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Variant;

    fn nil_native() -> Program {
        Program::native(0, Box::new(|_, _| Ok(None)))
    }

    #[test]
    fn duplicate_definition_is_rejected() {
        let mut pool = ProgramPool::new();
        pool.put("Enemy", "attack", nil_native()).unwrap();
        assert!(matches!(
            pool.put("Enemy", "attack", nil_native()),
            Err(VmError::DuplicateProgram { .. })
        ));
    }

    #[test]
    fn lookup_falls_back_to_the_base_object() {
        let mut pool = ProgramPool::new();
        pool.put(BASE_OBJECT_NAME, "toString", nil_native()).unwrap();
        assert!(pool.get("Enemy", "toString").is_some());
        assert!(pool.exists("Enemy", "toString"));
        assert!(!pool.shallow_check("Enemy", "toString"));
    }

    #[test]
    fn distinct_pairs_never_alias() {
        let mut pool = ProgramPool::new();
        pool.put("Ab", "cd", Program::script(0, vec![Variant::Number(1.0)], vec![]))
            .unwrap();
        pool.put("A", "bcd", Program::script(0, vec![Variant::Number(2.0)], vec![]))
            .unwrap();
        let first = pool.get("Ab", "cd").unwrap();
        let second = pool.get("A", "bcd").unwrap();
        match (&*first, &*second) {
            (Program::Script { consts: a, .. }, Program::Script { consts: b, .. }) => {
                assert_eq!(a[0].as_number(), 1.0);
                assert_eq!(b[0].as_number(), 2.0);
            }
            _ => panic!("expected script programs"),
        }
    }

    #[test]
    fn for_each_sees_insertion_order_and_purge_clears_it() {
        let mut pool = ProgramPool::new();
        pool.put("Item", "use", nil_native()).unwrap();
        pool.put("Item", "drop", nil_native()).unwrap();
        pool.put("Item", "name", nil_native()).unwrap();

        let mut seen = Vec::new();
        pool.for_each("Item", |name| seen.push(name.to_string()));
        assert_eq!(seen, ["use", "drop", "name"]);
        assert!(pool.is_compiled("Item"));

        pool.delete("Item", "drop");
        let mut seen = Vec::new();
        pool.for_each("Item", |name| seen.push(name.to_string()));
        assert_eq!(seen, ["use", "name"]);

        pool.purge("Item");
        assert!(!pool.is_compiled("Item"));
        assert!(pool.get("Item", "use").is_none());
    }
}
