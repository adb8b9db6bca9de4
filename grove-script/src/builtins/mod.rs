//! The built-in object types every VM starts with.

use anyhow::Result;

use crate::vm::Vm;

pub mod array;
pub mod dictionary;

pub(crate) fn register_all(vm: &Vm) -> Result<()> {
    array::register(vm)?;
    dictionary::register(vm)
}
