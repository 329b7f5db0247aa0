//! Compiled program representation: chunks, pools, and the header.

use std::rc::Rc;

use super::op::Op;
use crate::{error::Pos, events::EventDescriptor, value::Value};

/// A linear instruction sequence with a parallel source-location table.
#[derive(Debug, Default)]
pub(crate) struct Chunk {
    pub ops: Vec<Op>,
    /// One entry per instruction, for tracebacks.
    pub locs: Vec<Pos>,
}

/// A function descriptor in the per-program function pool.
#[derive(Debug)]
pub(crate) struct FuncDesc {
    pub name: Option<Rc<str>>,
    pub params: Vec<Rc<str>>,
    /// Free variables wrapped into cells at function-creation time.
    pub captures: Vec<Rc<str>>,
    pub chunk: Chunk,
    pub is_async: bool,
    pub pos: Pos,
}

/// Output of the bytecode emitter and input to the VM.
#[derive(Debug, Default)]
pub(crate) struct Code {
    pub top: Chunk,
    pub consts: Vec<Value>,
    /// Interned names referenced by name-table operands.
    pub names: Vec<Rc<str>>,
    pub funcs: Vec<FuncDesc>,
    /// Declared events, consulted by `RegisterEvent`.
    pub events: Vec<Rc<EventDescriptor>>,
    /// Declared enums: name and variant list.
    pub enums: Vec<(Rc<str>, Vec<Rc<str>>)>,
    /// Declared protocols: name and required signatures.
    pub protocols: Vec<(Rc<str>, Vec<(Rc<str>, usize)>)>,
}

impl Code {
    pub(crate) fn name(&self, idx: u32) -> &Rc<str> {
        &self.names[idx as usize]
    }
}
