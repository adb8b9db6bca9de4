//! The resizable array, backed directly by its object's heap.
//!
//! Slot 0 holds the length; elements live contiguously in slots 1..n. The
//! heap's bump allocation policy is what makes this work: the array only
//! ever frees its highest slot, so element addresses stay contiguous and
//! append is O(1) with no resize bookkeeping.

use std::cmp::Ordering;

use anyhow::{ensure, Result};

use crate::error::VmError;
use crate::heap::{Heap, HeapPtr};
use crate::renv::RuntimeEnv;
use crate::variant::Variant;
use crate::vm::Vm;

/// The length of the array is allocated on the first address.
const LENGTH_ADDR: HeapPtr = 0;
/// Array elements come later.
const BASE_ADDR: HeapPtr = 1;
/// `set` may grow the array at most this far past the end; anything further
/// is a runaway index.
const GROWTH_LIMIT: i64 = 1024;

pub fn register(vm: &Vm) -> Result<()> {
    vm.bind("Array", "__constructor", 0, constructor)?;
    vm.bind("Array", "__destructor", 0, |_, _| Ok(None))?;
    vm.bind("Array", "state:main", 0, |_, _| Ok(None))?;
    vm.bind("Array", "get", 1, get)?;
    vm.bind("Array", "set", 2, set)?;
    vm.bind("Array", "length", 0, length_method)?;
    vm.bind("Array", "push", 1, push)?;
    vm.bind("Array", "pop", 0, pop)?;
    vm.bind("Array", "shift", 0, shift)?;
    vm.bind("Array", "unshift", 1, unshift)?;
    vm.bind("Array", "sort", 0, sort)?;
    vm.bind("Array", "reverse", 0, reverse)?;
    vm.bind("Array", "indexOf", 1, index_of)?;
    Ok(())
}

fn length(heap: &Heap) -> Result<i64> {
    Ok(heap.at(LENGTH_ADDR)?.as_number() as i64)
}

fn set_length(heap: &mut Heap, len: i64) -> Result<()> {
    heap.at_mut(LENGTH_ADDR)?.set_number(len as f64);
    Ok(())
}

fn element_addr(index: i64) -> HeapPtr {
    BASE_ADDR + index as HeapPtr
}

fn constructor(env: &mut RuntimeEnv, _params: &[Variant]) -> Result<Option<Variant>> {
    let handle = env.owner();
    env.with_owner_heap(|heap| {
        let addr = heap.alloc();
        ensure!(
            addr == LENGTH_ADDR,
            "array length slot must land on the first heap address, got {}",
            addr
        );
        heap.at_mut(addr)?.set_number(0.0);
        Ok(())
    })?;
    Ok(Some(Variant::ObjectHandle(handle)))
}

/// 0-based element read; an index outside the array is fatal.
fn get(env: &mut RuntimeEnv, params: &[Variant]) -> Result<Option<Variant>> {
    let index = params[0].as_number() as i64;
    env.with_owner_heap(|heap| {
        let len = length(heap)?;
        if index < 0 || index >= len {
            return Err(VmError::ArrayIndexOutOfBounds { index, length: len }.into());
        }
        Ok(Some(heap.at(element_addr(index))?.clone()))
    })
}

/// Writes an element, appending nil cells first if the index is past the
/// end. The produced cell is a copy of the value, so `arr.set(i, v)` reads
/// as the assignment expression it is.
fn set(env: &mut RuntimeEnv, params: &[Variant]) -> Result<Option<Variant>> {
    let index = params[0].as_number() as i64;
    let value = params[1].clone();
    env.with_owner_heap(|heap| {
        let mut len = length(heap)?;
        if index < 0 {
            return Err(VmError::ArrayIndexOutOfBounds { index, length: len }.into());
        }
        if index >= len + GROWTH_LIMIT {
            return Err(VmError::ArrayIndexTooFar { index, length: len }.into());
        }

        while index >= len {
            let ptr = heap.alloc();
            len += 1;
            set_length(heap, len)?;
            ensure!(
                ptr == element_addr(len - 1),
                "array storage must stay contiguous"
            );
        }

        heap.at_mut(element_addr(index))?.copy_from(&value);
        Ok(())
    })?;
    Ok(Some(value))
}

fn length_method(env: &mut RuntimeEnv, _params: &[Variant]) -> Result<Option<Variant>> {
    env.with_owner_heap(|heap| Ok(Some(heap.at(LENGTH_ADDR)?.clone())))
}

/// Appends in O(1); the fresh slot is always the next contiguous address.
fn push(env: &mut RuntimeEnv, params: &[Variant]) -> Result<Option<Variant>> {
    let value = params[0].clone();
    env.with_owner_heap(|heap| {
        let len = length(heap)?;
        let ptr = heap.alloc();
        ensure!(ptr == element_addr(len), "array storage must stay contiguous");
        heap.at_mut(ptr)?.copy_from(&value);
        set_length(heap, len + 1)?;
        Ok(None)
    })
}

/// Removes and produces the last element; nil on an empty array.
fn pop(env: &mut RuntimeEnv, _params: &[Variant]) -> Result<Option<Variant>> {
    env.with_owner_heap(|heap| {
        let len = length(heap)?;
        if len == 0 {
            return Ok(None);
        }
        let value = heap.at(element_addr(len - 1))?.clone();
        set_length(heap, len - 1)?;
        heap.free(element_addr(len - 1))?;
        Ok(Some(value))
    })
}

/// Removes and produces the first element, shifting the rest down; nil on
/// an empty array.
fn shift(env: &mut RuntimeEnv, _params: &[Variant]) -> Result<Option<Variant>> {
    env.with_owner_heap(|heap| {
        let len = length(heap)?;
        if len == 0 {
            return Ok(None);
        }
        let value = heap.at(element_addr(0))?.clone();
        for i in 0..len - 1 {
            let next = heap.at(element_addr(i + 1))?.clone();
            heap.at_mut(element_addr(i))?.copy_from(&next);
        }
        set_length(heap, len - 1)?;
        heap.free(element_addr(len - 1))?;
        Ok(Some(value))
    })
}

/// Prepends, shifting every element up one slot.
fn unshift(env: &mut RuntimeEnv, params: &[Variant]) -> Result<Option<Variant>> {
    let value = params[0].clone();
    env.with_owner_heap(|heap| {
        let len = length(heap)?;
        let ptr = heap.alloc();
        ensure!(ptr == element_addr(len), "array storage must stay contiguous");
        set_length(heap, len + 1)?;
        for i in (1..=len).rev() {
            let below = heap.at(element_addr(i - 1))?.clone();
            heap.at_mut(element_addr(i))?.copy_from(&below);
        }
        heap.at_mut(element_addr(0))?.copy_from(&value);
        Ok(None)
    })
}

/// In-place reversal via cell swaps.
fn reverse(env: &mut RuntimeEnv, _params: &[Variant]) -> Result<Option<Variant>> {
    env.with_owner_heap(|heap| {
        let len = length(heap)?;
        for i in 0..len / 2 {
            heap.swap(element_addr(i), element_addr(len - 1 - i))?;
        }
        Ok(None)
    })
}

/// First index whose element compares equal to the needle, or -1.
fn index_of(env: &mut RuntimeEnv, params: &[Variant]) -> Result<Option<Variant>> {
    let needle = &params[0];
    env.with_owner_heap(|heap| {
        let len = length(heap)?;
        for i in 0..len {
            if heap.at(element_addr(i))?.compare(needle) == Ordering::Equal {
                return Ok(Some(Variant::Number(i as f64)));
            }
        }
        Ok(Some(Variant::Number(-1.0)))
    })
}

/// In-place quicksort over the heap slots, median-of-three pivot. Not
/// stable.
fn sort(env: &mut RuntimeEnv, _params: &[Variant]) -> Result<Option<Variant>> {
    env.with_owner_heap(|heap| {
        let len = length(heap)?;
        quicksort(heap, BASE_ADDR as i64, BASE_ADDR as i64 + len - 1)?;
        Ok(None)
    })
}

/// Sorts heap[begin ..= end].
fn quicksort(heap: &mut Heap, begin: i64, end: i64) -> Result<()> {
    if begin < end {
        let p = partition(heap, begin, end)?;
        quicksort(heap, begin, p - 1)?;
        quicksort(heap, p + 1, end)?;
    }
    Ok(())
}

/// Produces p with heap[begin .. p] <= heap[p] < heap[p+1 ..= end].
fn partition(heap: &mut Heap, begin: i64, end: i64) -> Result<i64> {
    let mid = begin + (end - begin) / 2;
    let median = med3(heap, begin, mid, end)?;
    heap.swap(median as HeapPtr, end as HeapPtr)?;

    let mut p = begin;
    for i in begin..end {
        if heap.at(i as HeapPtr)?.compare(heap.at(end as HeapPtr)?) != Ordering::Greater {
            heap.swap(i as HeapPtr, p as HeapPtr)?;
            p += 1;
        }
    }
    heap.swap(p as HeapPtr, end as HeapPtr)?;
    Ok(p)
}

/// Address of the median of the three cells.
fn med3(heap: &Heap, a: i64, b: i64, c: i64) -> Result<i64> {
    let ab = heap.at(a as HeapPtr)?.compare(heap.at(b as HeapPtr)?);
    let bc = heap.at(b as HeapPtr)?.compare(heap.at(c as HeapPtr)?);
    let ac = heap.at(a as HeapPtr)?.compare(heap.at(c as HeapPtr)?);

    Ok(if ab != Ordering::Less && ac != Ordering::Less {
        // a is the max
        if bc != Ordering::Less {
            b
        } else {
            c
        }
    } else if ab != Ordering::Greater && bc != Ordering::Less {
        // b is the max
        if ac != Ordering::Less {
            a
        } else {
            c
        }
    } else {
        // c is the max
        if ab != Ordering::Less {
            a
        } else {
            b
        }
    })
}
