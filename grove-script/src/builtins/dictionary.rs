//! The dictionary-like container: string keys to value cells, iterated in
//! insertion order.
//!
//! Entries live in the object's heap as contiguous key/value slot pairs
//! behind a count slot, the same bump-allocation layout the array uses.
//! Lookups are linear scans; script dictionaries are short-lived and small,
//! and the layout keeps deletion a simple shift-and-shrink.

use std::cmp::Ordering;

use anyhow::{ensure, Result};

use crate::heap::{Heap, HeapPtr};
use crate::renv::RuntimeEnv;
use crate::variant::Variant;
use crate::vm::Vm;

/// The entry count is allocated on the first address.
const COUNT_ADDR: HeapPtr = 0;

pub fn register(vm: &Vm) -> Result<()> {
    vm.bind("Dictionary", "__constructor", 0, constructor)?;
    vm.bind("Dictionary", "__destructor", 0, |_, _| Ok(None))?;
    vm.bind("Dictionary", "state:main", 0, |_, _| Ok(None))?;
    vm.bind("Dictionary", "get", 1, get)?;
    vm.bind("Dictionary", "set", 2, set)?;
    vm.bind("Dictionary", "has", 1, has)?;
    vm.bind("Dictionary", "delete", 1, delete)?;
    vm.bind("Dictionary", "count", 0, count_method)?;
    vm.bind("Dictionary", "clear", 0, clear)?;
    vm.bind("Dictionary", "keys", 0, keys)?;
    Ok(())
}

fn count(heap: &Heap) -> Result<i64> {
    Ok(heap.at(COUNT_ADDR)?.as_number() as i64)
}

fn set_count(heap: &mut Heap, n: i64) -> Result<()> {
    heap.at_mut(COUNT_ADDR)?.set_number(n as f64);
    Ok(())
}

fn key_addr(entry: i64) -> HeapPtr {
    (1 + 2 * entry) as HeapPtr
}

fn value_addr(entry: i64) -> HeapPtr {
    (2 + 2 * entry) as HeapPtr
}

/// Index of the entry holding `key`, scanning in insertion order.
fn find_entry(heap: &Heap, key: &Variant) -> Result<Option<i64>> {
    let n = count(heap)?;
    for i in 0..n {
        if heap.at(key_addr(i))?.compare(key) == Ordering::Equal {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// Calls `f` with each (key, value) pair in insertion order. This is the
/// embedder-level iteration surface; script code gets `keys` instead.
pub fn for_each_entry(
    heap: &Heap,
    mut f: impl FnMut(&Variant, &Variant) -> Result<()>,
) -> Result<()> {
    let n = count(heap)?;
    for i in 0..n {
        f(heap.at(key_addr(i))?, heap.at(value_addr(i))?)?;
    }
    Ok(())
}

fn constructor(env: &mut RuntimeEnv, _params: &[Variant]) -> Result<Option<Variant>> {
    let handle = env.owner();
    env.with_owner_heap(|heap| {
        let addr = heap.alloc();
        ensure!(
            addr == COUNT_ADDR,
            "dictionary count slot must land on the first heap address, got {}",
            addr
        );
        heap.at_mut(addr)?.set_number(0.0);
        Ok(())
    })?;
    Ok(Some(Variant::ObjectHandle(handle)))
}

/// Produces the value for a key, or nil for a missing key.
fn get(env: &mut RuntimeEnv, params: &[Variant]) -> Result<Option<Variant>> {
    let key = Variant::String(params[0].as_string());
    env.with_owner_heap(|heap| match find_entry(heap, &key)? {
        Some(i) => Ok(Some(heap.at(value_addr(i))?.clone())),
        None => Ok(None),
    })
}

/// Inserts or overwrites. New keys append to the end of the iteration
/// order; overwriting keeps the key's original position.
fn set(env: &mut RuntimeEnv, params: &[Variant]) -> Result<Option<Variant>> {
    let key = params[0].as_string();
    let value = params[1].clone();
    env.with_owner_heap(|heap| {
        let needle = Variant::String(key.clone());
        if let Some(i) = find_entry(heap, &needle)? {
            heap.at_mut(value_addr(i))?.copy_from(&value);
            return Ok(());
        }

        let n = count(heap)?;
        let kptr = heap.alloc();
        let vptr = heap.alloc();
        ensure!(
            kptr == key_addr(n) && vptr == value_addr(n),
            "dictionary storage must stay contiguous"
        );
        heap.at_mut(kptr)?.set_string(key.clone());
        heap.at_mut(vptr)?.copy_from(&value);
        set_count(heap, n + 1)?;
        Ok(())
    })?;
    Ok(Some(value))
}

fn has(env: &mut RuntimeEnv, params: &[Variant]) -> Result<Option<Variant>> {
    let key = Variant::String(params[0].as_string());
    env.with_owner_heap(|heap| Ok(Some(Variant::Boolean(find_entry(heap, &key)?.is_some()))))
}

/// Removes a key if present; later entries shift down to keep the layout
/// contiguous, and the freed tail slots go back to the heap.
fn delete(env: &mut RuntimeEnv, params: &[Variant]) -> Result<Option<Variant>> {
    let key = Variant::String(params[0].as_string());
    env.with_owner_heap(|heap| {
        let Some(index) = find_entry(heap, &key)? else {
            return Ok(None);
        };
        let n = count(heap)?;
        for i in index..n - 1 {
            let k = heap.at(key_addr(i + 1))?.clone();
            let v = heap.at(value_addr(i + 1))?.clone();
            heap.at_mut(key_addr(i))?.copy_from(&k);
            heap.at_mut(value_addr(i))?.copy_from(&v);
        }
        // value slot first: it is the tail, so both frees shrink the heap
        heap.free(value_addr(n - 1))?;
        heap.free(key_addr(n - 1))?;
        set_count(heap, n - 1)?;
        Ok(None)
    })
}

fn count_method(env: &mut RuntimeEnv, _params: &[Variant]) -> Result<Option<Variant>> {
    env.with_owner_heap(|heap| Ok(Some(heap.at(COUNT_ADDR)?.clone())))
}

/// Drops every entry, tail first so the heap shrinks back to the count
/// slot.
fn clear(env: &mut RuntimeEnv, _params: &[Variant]) -> Result<Option<Variant>> {
    env.with_owner_heap(|heap| {
        let n = count(heap)?;
        for i in (0..n).rev() {
            heap.free(value_addr(i))?;
            heap.free(key_addr(i))?;
        }
        set_count(heap, 0)?;
        Ok(None)
    })
}

/// Spawns a child Array holding the keys in insertion order.
fn keys(env: &mut RuntimeEnv, _params: &[Variant]) -> Result<Option<Variant>> {
    let collected: Vec<Variant> = env.with_owner_heap(|heap| {
        let n = count(heap)?;
        let mut keys = Vec::with_capacity(n as usize);
        for i in 0..n {
            keys.push(heap.at(key_addr(i))?.clone());
        }
        Ok(keys)
    })?;

    let owner = env.owner();
    let array = env.manager().spawn_child(owner, "Array", None, None, None)?;
    for key in collected {
        env.call(array, "push", &[key])?;
    }
    Ok(Some(Variant::ObjectHandle(array)))
}
