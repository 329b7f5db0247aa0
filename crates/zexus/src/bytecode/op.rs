//! Opcode definitions.
//!
//! An instruction is one enum value with its operands inline: constant-pool
//! indices, name-table indices, absolute jump targets, and arities. The
//! typed encoding keeps jump patching and the VM dispatch loop simple.

use crate::ast::{BinOp, UnOp};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Op {
    /// Push constant pool entry `i`.
    LoadConst(u32),
    /// Push the value bound under a name, walking the environment chain.
    Load(u32),
    /// Bind the popped value in the innermost frame (re-binding an existing
    /// local mutates its cell so captured references stay shared).
    Store(u32),
    /// Mutate the cell visible under a name; errors when unbound.
    Assign(u32),
    Pop,
    Dup,
    /// Pop `n` values and push a list of them.
    MakeList(u32),
    /// Pop `n` key/value pairs (keys pushed first) and push a map.
    MakeMap(u32),
    /// Pop index and receiver; push `receiver[index]`.
    Index,
    /// Pop value, index, receiver; perform `receiver[index] = value` and
    /// push the value back.
    IndexSet,
    /// Pop receiver; push `receiver.name`.
    Prop(u32),
    /// Pop value and receiver; perform `receiver.name = value` and push
    /// the value back.
    PropSet(u32),
    Bin(BinOp),
    Un(UnOp),
    /// Unconditional jump to an absolute instruction index.
    Jump(u32),
    /// Pop a value; jump when it is falsy.
    JumpIfFalse(u32),
    /// Resolve a name and call it with `arity` popped arguments.
    CallName { name: u32, arity: u32 },
    /// Instantiate function-pool entry `func` (snapshotting cells) and call
    /// it immediately.
    CallFuncConst { func: u32, arity: u32 },
    /// Pop `arity` arguments, then the callee beneath them, and call it.
    CallTop(u32),
    /// Pop `arity` arguments, then the receiver, and dispatch a method.
    CallMethod { name: u32, arity: u32 },
    Return,
    /// Instantiate function-pool entry `func`, snapshot the visible cells
    /// of its captures, and bind it under `name`.
    StoreFunc { name: u32, func: u32 },
    /// Same snapshot as `StoreFunc`, but push the closure instead of
    /// binding it (anonymous actions and lambdas).
    MakeFunc(u32),
    /// Pop a value and print its rendering plus a newline.
    Print,
    /// Mark a binding of the current frame as exported.
    Export(u32),
    /// Pop a coroutine, enqueue it on the scheduler, push a task handle.
    Spawn,
    /// Pop a value; coroutines suspend the frame until completion, any
    /// other value passes through unchanged.
    Await,
    /// Declare the event descriptor `name` from the program header.
    RegisterEvent(u32),
    /// Pop a payload map and deliver the event synchronously.
    EmitEvent(u32),
    /// Bind the enum `name` (variant list in the program header).
    DefineEnum { name: u32, variants: u32 },
    /// Verify the contract map on top of the stack satisfies a protocol.
    AssertProtocol(u32),
    /// Resolve module `name` from the host table and bind it as `alias`.
    Import { name: u32, alias: u32 },
    /// Enter a protected region; on raise, control transfers to `handler`
    /// with the error bound under `err_name`.
    TryPush { handler: u32, err_name: u32 },
    TryPop,
    /// Pop an error value and raise it.
    Raise,
    /// Pop `arity` arguments and forward them to the renderer collaborator
    /// as `op(tag, args)`; push its result.
    RenderOp { tag: u32, arity: u32 },
    /// Enter a nested lexical scope within the current frame.
    ScopePush,
    ScopePop,
}
