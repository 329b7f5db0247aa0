//! Bytecode compiler and stack virtual machine.
//!
//! The compiler path lowers the compiler AST into a linear instruction
//! sequence with constant, name, and function pools; the VM executes it
//! with a stack-based model supporting closures (via cells), cooperative
//! asynchronous tasks, and events.
//!
//! # Module Structure
//!
//! - `op` - opcode definitions
//! - `code` - compiled program: chunks, pools, header
//! - `builder` - `ChunkBuilder` with forward-jump patching
//! - `compiler` - AST to bytecode emitter
//! - `vm` - the virtual machine and its task scheduler

mod builder;
mod code;
mod compiler;
mod op;
mod vm;

pub(crate) use code::Code;
pub(crate) use compiler::compile;
pub(crate) use vm::Vm;
