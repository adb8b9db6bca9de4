use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};

use crate::heap::Heap;
use crate::object::manager::ObjectManager;
use crate::object::Object;
use crate::program::pool::ProgramPool;
use crate::program::{run_script, Program};
use crate::stack::Stack;
use crate::variant::{Handle, Variant};

/// Temporary cells reserved for each program activation.
pub const TMP_CELLS: usize = 4;

/// The bundle of resources one executing program sees: the owning object
/// (by handle), the shared stack, program pool and object manager, and a
/// small bank of temporary cells private to this activation.
///
/// The long-lived subsystems are shared references; the owner's heap is
/// reached as a scoped borrow (see [`with_owner_heap`](Self::with_owner_heap)),
/// never held across a nested call. Cloning for a nested call keeps every
/// shared reference and replaces only the temporaries.
pub struct RuntimeEnv<'a> {
    owner: Handle,
    stack: &'a RefCell<Stack>,
    pool: &'a RefCell<ProgramPool>,
    manager: &'a ObjectManager,
    tmp: [Variant; TMP_CELLS],
}

impl<'a> RuntimeEnv<'a> {
    pub(crate) fn new(
        owner: Handle,
        stack: &'a RefCell<Stack>,
        pool: &'a RefCell<ProgramPool>,
        manager: &'a ObjectManager,
    ) -> Self {
        RuntimeEnv {
            owner,
            stack,
            pool,
            manager,
            tmp: Default::default(),
        }
    }

    /// A nested activation: same subsystems, fresh temporaries.
    pub fn clone_for_call(&self, owner: Handle) -> RuntimeEnv<'a> {
        RuntimeEnv {
            owner,
            stack: self.stack,
            pool: self.pool,
            manager: self.manager,
            tmp: Default::default(),
        }
    }

    pub fn owner(&self) -> Handle {
        self.owner
    }

    pub fn stack(&self) -> &'a RefCell<Stack> {
        self.stack
    }

    pub fn pool(&self) -> &'a RefCell<ProgramPool> {
        self.pool
    }

    pub fn manager(&self) -> &'a ObjectManager {
        self.manager
    }

    pub fn owner_object(&self) -> Result<Rc<RefCell<Object>>> {
        self.manager
            .get(self.owner)
            .ok_or_else(|| anyhow!("owner object {} is gone", self.owner))
    }

    /// Runs `f` with a scoped mutable borrow of the owner's heap. The borrow
    /// ends when `f` returns, so nested calls from inside `f` would alias —
    /// collect what you need first, then call out.
    pub fn with_owner_heap<R>(&self, f: impl FnOnce(&mut Heap) -> Result<R>) -> Result<R> {
        let object = self.owner_object()?;
        let mut object = object.borrow_mut();
        f(object.heap_mut())
    }

    pub fn set_owner_state(&self, state: &str) -> Result<()> {
        self.owner_object()?.borrow_mut().set_state(state);
        Ok(())
    }

    pub fn tmp(&self, index: usize) -> Result<&Variant> {
        self.tmp
            .get(index)
            .ok_or_else(|| anyhow!("temporary cell index out of range: {}", index))
    }

    pub fn tmp_mut(&mut self, index: usize) -> Result<&mut Variant> {
        self.tmp
            .get_mut(index)
            .ok_or_else(|| anyhow!("temporary cell index out of range: {}", index))
    }

    /// Dispatches `method` on `target` under its type name, with the pool's
    /// base-name fallback.
    ///
    /// The call convention for both program kinds: push exactly the
    /// declared number of argument cells, open a frame, run, close the
    /// frame. Argument lists are adjusted to the arity — short lists are
    /// padded with nil, extras are dropped. A missing method (or a dead
    /// target) is not an error — the call silently produces nil, because
    /// states and methods may legitimately be unimplemented for a type.
    pub fn call(&mut self, target: Handle, method: &str, args: &[Variant]) -> Result<Variant> {
        let Some(object) = self.manager.get(target) else {
            return Ok(Variant::Null);
        };
        let object_name = object.borrow().name().to_string();

        let program = self.pool.borrow().get(&object_name, method);
        let Some(program) = program else {
            return Ok(Variant::Null);
        };

        let arity = program.arity() as usize;
        {
            let mut stack = self.stack.borrow_mut();
            for arg in args.iter().take(arity) {
                stack.push(arg.clone());
            }
            for _ in args.len()..arity {
                stack.push(Variant::Null);
            }
            stack.push_frame(arity)?;
        }

        let params = {
            let stack = self.stack.borrow();
            let mut params = Vec::with_capacity(arity);
            for i in 0..arity {
                params.push(stack.at(i as i32 - arity as i32)?.clone());
            }
            params
        };

        let mut env = self.clone_for_call(target);
        let produced = match &*program {
            Program::Native { f, .. } => f(&mut env, &params),
            Program::Script { consts, code, .. } => run_script(consts, code, &mut env, arity),
        };

        self.stack.borrow_mut().pop_frame()?;
        let produced = produced.with_context(|| format!("in {}::{}", object_name, method))?;
        Ok(produced.unwrap_or(Variant::Null))
    }
}

impl std::fmt::Debug for RuntimeEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEnv")
            .field("owner", &self.owner)
            .field("tmp", &self.tmp)
            .finish()
    }
}
