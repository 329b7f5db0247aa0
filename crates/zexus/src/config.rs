//! Process-wide configuration flags.
//!
//! These defaults apply to every `Runner` unless overridden per instance.
//! They live for the process lifetime and are safe to flip from tests.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Which surface style the production parser should accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntaxStyle {
    /// Parens-and-braces style only; colon blocks are a hard syntax error
    /// on the compiler path.
    #[default]
    Universal,
    /// Also accept colon-style blocks (`if cond: ...`) on the compiler path.
    Tolerable,
}

static SYNTAX_STYLE: AtomicU8 = AtomicU8::new(0);
static ENABLE_ADVANCED_PARSING: AtomicBool = AtomicBool::new(true);
static ENABLE_DEBUG_LOGS: AtomicBool = AtomicBool::new(false);

/// Sets the process-wide default syntax style.
pub fn set_syntax_style(style: SyntaxStyle) {
    SYNTAX_STYLE.store(style as u8, Ordering::Relaxed);
}

/// Returns the process-wide default syntax style.
#[must_use]
pub fn syntax_style() -> SyntaxStyle {
    match SYNTAX_STYLE.load(Ordering::Relaxed) {
        0 => SyntaxStyle::Universal,
        _ => SyntaxStyle::Tolerable,
    }
}

/// Enables or disables the multi-strategy tolerant parser.
///
/// When disabled, the interpreter path skips structural analysis and goes
/// straight to the recursive-descent fallback.
pub fn set_advanced_parsing(enabled: bool) {
    ENABLE_ADVANCED_PARSING.store(enabled, Ordering::Relaxed);
}

/// Whether structural analysis is enabled for the tolerant parser.
#[must_use]
pub fn advanced_parsing() -> bool {
    ENABLE_ADVANCED_PARSING.load(Ordering::Relaxed)
}

/// Enables or disables `debug` statements and the `debug_log`/`debug_trace`
/// builtins process-wide.
pub fn set_debug_logs(enabled: bool) {
    ENABLE_DEBUG_LOGS.store(enabled, Ordering::Relaxed);
}

/// Whether debug logging is enabled process-wide.
#[must_use]
pub fn debug_logs() -> bool {
    ENABLE_DEBUG_LOGS.load(Ordering::Relaxed)
}
