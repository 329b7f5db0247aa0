//! Builder for emitting bytecode during compilation.
//!
//! Handles forward jumps with patching and tracks source locations for
//! traceback generation.

use super::{code::Chunk, op::Op};
use crate::error::Pos;

/// A forward-jump reservation returned by the `emit_*jump*` helpers.
#[derive(Debug, Clone, Copy)]
pub(super) struct JumpSlot(usize);

#[derive(Debug, Default)]
pub(super) struct ChunkBuilder {
    ops: Vec<Op>,
    locs: Vec<Pos>,
    current: Pos,
}

impl ChunkBuilder {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Sets the source location recorded for subsequent instructions.
    pub(super) fn set_location(&mut self, pos: Pos) {
        self.current = pos;
    }

    pub(super) fn emit(&mut self, op: Op) {
        self.ops.push(op);
        self.locs.push(self.current);
    }

    /// Next instruction index; used for back-edges.
    pub(super) fn here(&self) -> u32 {
        self.ops.len() as u32
    }

    /// Emits a jump with a placeholder target to patch later.
    pub(super) fn emit_jump(&mut self, op: Op) -> JumpSlot {
        let slot = JumpSlot(self.ops.len());
        self.emit(op);
        slot
    }

    /// Points a reserved jump at the next instruction.
    pub(super) fn patch_jump(&mut self, slot: JumpSlot) {
        let target = self.ops.len() as u32;
        match &mut self.ops[slot.0] {
            Op::Jump(t) | Op::JumpIfFalse(t) => *t = target,
            Op::TryPush { handler, .. } => *handler = target,
            other => unreachable!("patching a non-jump instruction {other:?}"),
        }
    }

    pub(super) fn build(self) -> Chunk {
        Chunk {
            ops: self.ops,
            locs: self.locs,
        }
    }
}
