use anyhow::{bail, Result};

use crate::error::VmError;
use crate::renv::RuntimeEnv;
use crate::variant::Variant;

pub mod pool;

/// A native method implementation.
///
/// The owning object and its heap are reached through the environment as
/// scoped borrows; `None` means the program produced nothing, which the
/// caller reads as nil.
pub type NativeFn = Box<dyn Fn(&mut RuntimeEnv, &[Variant]) -> Result<Option<Variant>>>;

/// One instruction of a script program.
///
/// The surface compiler and its full opcode set live outside the core; this
/// is the minimal set the runtime itself defines — enough to move cells
/// between the constant pool, the stack, the temporaries and the return
/// slot, to switch the owner's state, and to call methods with the same
/// convention natives use.
#[derive(Clone, Debug)]
pub enum Instr {
    Nop,
    /// push a copy of a constant-pool cell onto the stack
    PushConst(u16),
    /// push the k-th call argument (0-based)
    PushArg(u8),
    /// push the last produced return value
    PushRet,
    /// pop into temporary cell `t`
    StoreTmp(u8),
    /// push a copy of temporary cell `t`
    LoadTmp(u8),
    /// discard the top of the stack
    Pop,
    /// pop `argc` cells (pushed left to right) and call the method named by
    /// a string constant on the owning object; the produced cell lands in
    /// the return slot
    CallMethod { name: u16, argc: u8 },
    /// switch the owner's current state to the named string constant
    SetState(u16),
    /// return nothing
    Ret,
    /// return the top of the stack
    RetV,
}

/// A callable registered in the program pool: either compiler-emitted
/// instructions with a local constant table, or a native function with a
/// declared arity.
pub enum Program {
    Native {
        arity: u8,
        f: NativeFn,
    },
    Script {
        arity: u8,
        consts: Vec<Variant>,
        code: Vec<Instr>,
    },
}

impl Program {
    pub fn native(arity: u8, f: NativeFn) -> Self {
        Program::Native { arity, f }
    }

    pub fn script(arity: u8, consts: Vec<Variant>, code: Vec<Instr>) -> Self {
        Program::Script { arity, consts, code }
    }

    pub fn arity(&self) -> u8 {
        match self {
            Program::Native { arity, .. } => *arity,
            Program::Script { arity, .. } => *arity,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Program::Native { .. })
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Program::Native { arity, .. } => f.debug_struct("Native").field("arity", arity).finish(),
            Program::Script { arity, consts, code } => f
                .debug_struct("Script")
                .field("arity", arity)
                .field("consts", &consts.len())
                .field("code", &code.len())
                .finish(),
        }
    }
}

fn constant(consts: &[Variant], index: u16) -> Result<&Variant, VmError> {
    consts.get(index as usize).ok_or(VmError::ConstantOutOfRange {
        index: index as usize,
        size: consts.len(),
    })
}

/// Interprets a script program against the runtime environment.
///
/// The caller has already pushed the arguments and opened a frame; argument
/// reads go through the frame's negative indexes, the same convention
/// natives see.
pub(crate) fn run_script(
    consts: &[Variant],
    code: &[Instr],
    env: &mut RuntimeEnv,
    argc: usize,
) -> Result<Option<Variant>> {
    let mut ret = Variant::Null;

    for instr in code {
        match instr {
            Instr::Nop => {}

            Instr::PushConst(i) => {
                let value = constant(consts, *i)?.clone();
                env.stack().borrow_mut().push(value);
            }

            Instr::PushArg(k) => {
                let index = *k as i32 - argc as i32;
                let value = env.stack().borrow().at(index)?.clone();
                env.stack().borrow_mut().push(value);
            }

            Instr::PushRet => {
                env.stack().borrow_mut().push(ret.clone());
            }

            Instr::StoreTmp(t) => {
                let value = env.stack().borrow_mut().pop()?;
                *env.tmp_mut(*t as usize)? = value;
            }

            Instr::LoadTmp(t) => {
                let value = env.tmp(*t as usize)?.clone();
                env.stack().borrow_mut().push(value);
            }

            Instr::Pop => {
                env.stack().borrow_mut().pop()?;
            }

            Instr::CallMethod { name, argc } => {
                let method = match constant(consts, *name)? {
                    Variant::String(s) => s.clone(),
                    other => bail!("call target is not a string constant: {}", other),
                };
                let mut call_args = vec![Variant::Null; *argc as usize];
                {
                    let mut stack = env.stack().borrow_mut();
                    for slot in call_args.iter_mut().rev() {
                        *slot = stack.pop()?;
                    }
                }
                let owner = env.owner();
                ret = env.call(owner, &method, &call_args)?;
            }

            Instr::SetState(i) => {
                let state = constant(consts, *i)?.as_string();
                env.set_owner_state(&state)?;
            }

            Instr::Ret => return Ok(None),

            Instr::RetV => {
                let value = env.stack().borrow_mut().pop()?;
                return Ok(Some(value));
            }
        }
    }

    Ok(None)
}
