//! Error kinds, the internal runtime error type, and parser diagnostics.
//!
//! `RunError` is the crate-internal error threaded through the lexer, the
//! parsers, both engines, and the builtins. The public [`crate::Exception`]
//! wrapper is produced at the `Runner` boundary.

use std::fmt::{self, Display};

use strum::{Display as StrumDisplay, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// The error taxonomy shared by every stage of the pipeline.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and
/// `Into<&'static str>` implementations. The string representation matches
/// the variant name exactly (e.g. `TypeError` -> "TypeError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    /// Unknown character, bad escape, unterminated string or embedded block.
    LexicalError,
    /// Hard parse failure (production parser) or unrecoverable structure.
    SyntaxError,
    /// Name resolution, export, async-usage, or protocol-conformance failure.
    SemanticError,
    /// Wrong number of arguments to a callable.
    ArityError,
    TypeError,
    NameError,
    AttributeError,
    ArithmeticError,
    #[strum(serialize = "IOError")]
    IoError,
    ProtocolError,
    EventError,
    /// Step budget exceeded.
    InterruptedError,
    /// Invariant violation inside the toolchain itself.
    InternalError,
    /// Unhandled `return` at top level and similar evaluation failures.
    EvaluationError,
}

/// A source position: 1-based line and column, optional file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    #[must_use]
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// One frame of the action-call trace attached to runtime errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Action name, or `None` for anonymous actions and lambdas.
    pub action: Option<String>,
    pub pos: Pos,
}

/// Crate-internal error carrying kind, message, and position.
#[derive(Debug, Clone, PartialEq)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Option<Pos>,
    /// Action names and positions accumulated while unwinding call frames.
    pub trace: Vec<TraceFrame>,
}

impl RunError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            pos: None,
            trace: Vec::new(),
        }
    }

    /// Attaches a position if none is set yet. The innermost position wins.
    #[must_use]
    pub(crate) fn with_pos(mut self, pos: Pos) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }

    /// Records an action frame while the error unwinds through a call.
    pub(crate) fn push_frame(&mut self, action: Option<&str>, pos: Pos) {
        self.trace.push(TraceFrame {
            action: action.map(str::to_owned),
            pos,
        });
    }

    pub(crate) fn lexical(pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LexicalError, message).with_pos(pos)
    }

    pub(crate) fn syntax(pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message).with_pos(pos)
    }

    pub(crate) fn semantic(pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SemanticError, message).with_pos(pos)
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub(crate) fn name_error(name: &str) -> Self {
        Self::new(ErrorKind::NameError, format!("name '{name}' is not defined"))
    }

    pub(crate) fn attribute_error(type_name: impl Display, attr: &str) -> Self {
        Self::new(
            ErrorKind::AttributeError,
            format!("'{type_name}' has no attribute '{attr}'"),
        )
    }

    pub(crate) fn arity_error(callee: &str, expected: usize, actual: usize) -> Self {
        Self::new(
            ErrorKind::ArityError,
            format!("{callee} takes {expected} argument(s) but {actual} were given"),
        )
    }

    pub(crate) fn arithmetic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArithmeticError, message)
    }

    pub(crate) fn division_by_zero() -> Self {
        Self::arithmetic("division by zero")
    }

    pub(crate) fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IoError, message)
    }

    pub(crate) fn event(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EventError, message)
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolError, message)
    }

    pub(crate) fn interrupted() -> Self {
        Self::new(ErrorKind::InterruptedError, "step budget exceeded")
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "{} at {pos}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RunError {}

/// The recovery step the tolerant parser took after a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Dropped `n` tokens and synchronized at the next statement boundary.
    Skipped(usize),
    /// Force-closed the innermost open block.
    ClosedBlock,
    /// Structural analysis failed; fell back to plain recursive descent.
    Fallback,
    /// No token was consumed; parsing continued in place.
    None,
}

/// A recoverable diagnostic collected by the tolerant parser.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Pos,
    pub recovery: RecoveryAction,
}

impl Diagnostic {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>, pos: Pos, recovery: RecoveryAction) -> Self {
        Self {
            kind,
            message: message.into(),
            pos,
            recovery,
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.pos, self.message)
    }
}
