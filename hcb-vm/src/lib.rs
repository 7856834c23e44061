//! hcb-vm
//!
//! A small, self-contained bytecode container/parser + stack VM for the HCB
//! scripting format used by a family of visual-novel engines. Loads an HCB
//! image, resolves its syscalls against a host-provided registry, and runs
//! it to completion or to the next host interaction point.

pub mod call_stack;
pub mod context;
pub mod error;
pub mod instruction;
pub mod metadata;
pub mod opcode;
pub mod reader;
pub mod syscall;
pub mod value;

pub use context::ScriptContext;
pub use error::ScriptRuntimeException;
pub use metadata::ScriptMetadata;
pub use syscall::{SyscallHost, SyscallRegistry};
pub use value::Value;
