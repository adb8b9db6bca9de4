//! grove-script
//!
//! The runtime core of the grove scripting language: compiled programs
//! attached to objects in a living tree, advanced one state-machine step
//! per tick. This crate is the execution substrate — value cells,
//! per-object heaps, the framed call stack, the program pool with
//! base-object fallback, the object manager that owns the tree, and the
//! runtime environment threaded through every executing program — plus the
//! two canonical built-in objects (Array, Dictionary) that exercise all of
//! it.
//!
//! The surface compiler, full opcode decoder and standard library live
//! outside this crate; they feed programs into the pool and drive ticks
//! through [`Vm`].

pub mod builtins;
pub mod error;
pub mod heap;
pub mod object;
pub mod program;
pub mod renv;
pub mod stack;
pub mod variant;
pub mod vm;

pub use error::VmError;
pub use heap::{Heap, HeapPtr};
pub use object::manager::ObjectManager;
pub use object::{LifecycleFn, Object, DEFAULT_STATE};
pub use program::pool::{ProgramPool, BASE_OBJECT_NAME};
pub use program::{Instr, NativeFn, Program};
pub use renv::{RuntimeEnv, TMP_CELLS};
pub use stack::Stack;
pub use variant::{Handle, Variant};
pub use vm::{Vm, ROOT_OBJECT_NAME};
