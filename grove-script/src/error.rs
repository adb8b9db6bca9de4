/// Program-integrity errors.
///
/// Anything in here is fatal: the current tick is aborted and the VM
/// deactivates itself. Recoverable conditions (missing method, empty pop,
/// missing dictionary key, unparseable numeric string) are never errors;
/// they come back as nil or NaN cells so script logic can inspect them.
#[derive(thiserror::Error, Debug)]
pub enum VmError {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("bad heap pointer: {ptr}")]
    BadHeapPointer { ptr: u32 },

    #[error("duplicate function \"{method}\" in object \"{object}\"")]
    DuplicateProgram { object: String, method: String },

    #[error("array index {index} is out of bounds (length {length})")]
    ArrayIndexOutOfBounds { index: i64, length: i64 },

    #[error("array index {index} is too far past the end (length {length})")]
    ArrayIndexTooFar { index: i64, length: i64 },

    #[error("constant index {index} out of range (pool size {size})")]
    ConstantOutOfRange { index: usize, size: usize },
}
