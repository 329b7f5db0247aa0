//! The two parsing strategies.
//!
//! - [`tolerant`]: multi-strategy parser for the interpreter path. It runs
//!   the [`structure`] analyzer first, then a context-stack parser over the
//!   resulting blocks, with an error-recovery engine and a plain
//!   recursive-descent fallback. It always yields a program.
//! - [`strict`]: the production parser for the compiler path: ordinary
//!   recursive descent that fails fast outside the enumerated tolerances.

pub mod strict;
pub mod structure;
pub mod tolerant;

use crate::{
    error::Pos,
    token::{Keyword, Token, TokenKind},
};

/// Shared token cursor with arbitrary lookahead.
pub(crate) struct Cursor<'t> {
    toks: &'t [Token],
    pub idx: usize,
}

impl<'t> Cursor<'t> {
    pub(crate) fn new(toks: &'t [Token]) -> Self {
        Self { toks, idx: 0 }
    }

    pub(crate) fn peek(&self) -> &'t Token {
        self.at(self.idx)
    }

    /// Lookahead helper: the k-th token from the cursor, newlines included.
    pub(crate) fn peek_at(&self, k: usize) -> &'t Token {
        self.at(self.idx + k)
    }

    fn at(&self, idx: usize) -> &'t Token {
        self.toks.get(idx).unwrap_or_else(|| {
            self.toks
                .last()
                .expect("token stream always ends with EOF")
        })
    }

    pub(crate) fn next(&mut self) -> &'t Token {
        let tok = self.at(self.idx);
        if self.idx < self.toks.len() {
            self.idx += 1;
        }
        tok
    }

    pub(crate) fn at_end(&self) -> bool {
        self.peek().is_eof()
    }

    pub(crate) fn pos(&self) -> Pos {
        self.peek().pos
    }

    /// Skips newline tokens.
    pub(crate) fn skip_newlines(&mut self) {
        while self.peek().is_newline() {
            self.next();
        }
    }

    /// Skips newlines and stray semicolons (an enumerated tolerance).
    pub(crate) fn skip_separators(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline | TokenKind::Semicolon) {
            self.next();
        }
    }

    /// Consumes the next token if it matches `kind` exactly.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.next();
            true
        } else {
            false
        }
    }

    /// Consumes the next token if it is the given keyword.
    pub(crate) fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.peek().keyword() == Some(kw) {
            self.next();
            true
        } else {
            false
        }
    }

    /// The next non-newline token without consuming anything.
    pub(crate) fn peek_skip_newlines(&self) -> &'t Token {
        let mut k = 0;
        loop {
            let tok = self.peek_at(k);
            if !tok.is_newline() {
                return tok;
            }
            k += 1;
        }
    }
}

/// Which screen-family definition a shared parser path produces.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ScreenLike {
    Screen,
    Component,
    Theme,
}

/// True when the token can begin a statement-only construct, used by the
/// colon-block end rule and the recovery engine.
pub(crate) fn starts_statement_keyword(tok: &Token) -> bool {
    matches!(
        tok.keyword(),
        Some(
            Keyword::Let
                | Keyword::Return
                | Keyword::Print
                | Keyword::For
                | Keyword::If
                | Keyword::While
                | Keyword::Try
                | Keyword::Debug
                | Keyword::External
                | Keyword::From
                | Keyword::Use
                | Keyword::Export
                | Keyword::Exactly
                | Keyword::Event
                | Keyword::Emit
                | Keyword::Enum
                | Keyword::Protocol
                | Keyword::Contract
                | Keyword::Require
                | Keyword::Persistent
                | Keyword::Screen
                | Keyword::Component
                | Keyword::Theme
        )
    )
}
