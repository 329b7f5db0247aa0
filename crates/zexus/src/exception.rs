//! Public error surface returned by the `Runner`.

use std::fmt::{self, Display, Write};

use crate::error::{ErrorKind, Pos, RunError, TraceFrame};

/// A failure surfaced to the host.
///
/// Formats as a single-line summary `"<kind> at <pos>: <message>"`; with
/// debug logs enabled, [`Exception::render`] additionally yields a stack of
/// action names and source positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Option<Pos>,
    pub trace: Vec<TraceFrame>,
}

impl Exception {
    /// Renders the exception; with `with_trace` the action stack is appended.
    #[must_use]
    pub fn render(&self, with_trace: bool) -> String {
        let mut out = self.to_string();
        if with_trace && !self.trace.is_empty() {
            for frame in &self.trace {
                let name = frame.action.as_deref().unwrap_or("<anonymous>");
                let _ = write!(out, "\n  in {name} at {}", frame.pos);
            }
        }
        out
    }
}

impl From<RunError> for Exception {
    fn from(err: RunError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
            pos: err.pos,
            trace: err.trace,
        }
    }
}

impl Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "{} at {pos}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Exception {}
