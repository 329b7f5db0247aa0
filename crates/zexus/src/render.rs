//! Renderer collaborator seam.
//!
//! The core delegates every screen/component/theme/canvas operation through
//! a single opaque `op(tag, args)` call and never inspects tag semantics,
//! so the language core is testable without any terminal I/O.

use crate::{
    error::RunResult,
    value::Value,
};

/// External renderer collaborator.
pub(crate) trait Renderer {
    /// Performs one renderer operation. `tag` is the builtin name that was
    /// invoked (e.g. `"define_screen"`, `"draw_line"`).
    fn op(&mut self, tag: &str, args: Vec<Value>) -> RunResult<Value>;
}

/// Renderer that accepts every operation and returns null.
#[derive(Debug, Default)]
pub(crate) struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn op(&mut self, _tag: &str, _args: Vec<Value>) -> RunResult<Value> {
        Ok(Value::Null)
    }
}
