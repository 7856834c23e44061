//! Error taxonomy for the reader, call stack, and dispatcher.
//!
//! Parser-level failures propagate unchanged; everything raised while the
//! dispatcher is executing is wrapped in [`ScriptRuntimeException`] carrying
//! the program counter of the opcode that failed.

use std::fmt;

/// Failures from the binary [`crate::reader::Reader`].
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("end of stream at offset {offset}, needed {needed} more byte(s)")]
    EndOfStream { offset: usize, needed: usize },

    #[error("invalid data: {0}")]
    InvalidData(&'static str),
}

/// Failures raised directly by the [`crate::call_stack::CallStack`].
#[derive(Debug, thiserror::Error)]
pub enum StackBreak {
    #[error("operand stack underflow")]
    Underflow,

    #[error("local index {index} out of range (arg_count={arg_count}, local_count={local_count})")]
    BadLocalIndex {
        index: i32,
        arg_count: u8,
        local_count: u8,
    },

    #[error("attempted to write local index {0} which is negative")]
    WriteToArgument(i32),

    #[error("return attempted with {remaining} operand(s) still on the stack")]
    NonEmptyReturn { remaining: usize },

    #[error("call stack has no active frame")]
    NoFrame,

    #[error("call stack corrupted: expected a value slot, found a frame record (or vice versa)")]
    Corrupt,
}

/// Failures from the VM's opcode semantics, not otherwise covered by
/// [`ReaderError`] or [`StackBreak`].
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("type error: {0}")]
    TypeError(String),

    #[error("division by zero")]
    DivideByZero,

    #[error("global {0} read before being initialized")]
    UninitializedGlobal(u16),

    #[error("unimplemented opcode 0x{0:02x}")]
    NotImplementedOpcode(u8),

    #[error("unknown syscall {0:?}")]
    NotImplementedSyscall(String),

    #[error("Call target 0x{addr:08x} does not begin with InitStack")]
    CallTargetNotInitStack { addr: u32 },

    #[error("InitStack encountered outside of a freshly entered call at pc {pc:#x}")]
    MisplacedInitStack { pc: u32 },
}

/// Failures from the [`crate::syscall::SyscallRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    #[error("syscall {0:?} is already registered")]
    DuplicateName(String),
}

/// A VM-observable failure, annotated with the program counter of the opcode
/// that raised it. This is the only error type the dispatcher's `step`/
/// `execute` methods return.
#[derive(Debug)]
pub struct ScriptRuntimeException {
    pub pc: u32,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ScriptRuntimeException {
    pub fn new(pc: u32, message: impl Into<String>) -> Self {
        Self {
            pc,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        pc: u32,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            pc,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for ScriptRuntimeException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script runtime exception at pc={:#x}: {}", self.pc, self.message)
    }
}

impl std::error::Error for ScriptRuntimeException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Helper for dispatcher code: lift any error into a [`ScriptRuntimeException`]
/// at the given pc, preserving it as the boxed `source` so `source()`
/// delegates to the original cause instead of discarding it.
pub(crate) fn wrap(pc: u32, err: impl Into<anyhow::Error>) -> ScriptRuntimeException {
    let err = err.into();
    let message = err.to_string();
    ScriptRuntimeException {
        pc,
        message,
        source: Some(err.into()),
    }
}
