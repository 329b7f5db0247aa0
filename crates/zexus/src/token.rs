//! Token vocabulary produced by the lexer and consumed by both parsers.

use std::fmt::{self, Display};
use std::rc::Rc;

use num_bigint::BigInt;
use strum::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::error::Pos;

/// A half-open byte range into the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Reserved words.
///
/// strum's snake_case serialization yields the surface spelling
/// (`RegisterEvent` -> "register_event").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Let,
    Return,
    Print,
    For,
    Each,
    In,
    Action,
    If,
    Else,
    While,
    Try,
    Catch,
    Debug,
    External,
    From,
    Use,
    Export,
    Exactly,
    Lambda,
    True,
    False,
    Null,
    /// Recognized only in the position `action async ...`; elsewhere the
    /// lexeme `async` stays an identifier.
    Async,
    Await,
    Event,
    Emit,
    RegisterEvent,
    Enum,
    Protocol,
    Contract,
    Require,
    Persistent,
    Storage,
    Screen,
    Component,
    Theme,
}

/// Token kind, carrying the literal value where applicable.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Ident,
    Int(BigInt),
    Float(f64),
    /// Unescaped string value; the original text lives in the lexeme.
    Str(String),
    /// `{| lang ... |}` block: the first in-block line is the language tag.
    Embedded { language: String, text: String },

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Arrow,

    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AndAnd,
    OrOr,
    Bang,

    /// One physical newline. Insignificant except inside colon-blocks.
    Newline,
    Eof,
}

impl TokenKind {
    /// Short human name used in expected-token error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Keyword(kw) => format!("'{kw}'"),
            Self::Ident => "identifier".to_owned(),
            Self::Int(_) => "integer literal".to_owned(),
            Self::Float(_) => "float literal".to_owned(),
            Self::Str(_) => "string literal".to_owned(),
            Self::Embedded { .. } => "embedded block".to_owned(),
            Self::LParen => "'('".to_owned(),
            Self::RParen => "')'".to_owned(),
            Self::LBrace => "'{'".to_owned(),
            Self::RBrace => "'}'".to_owned(),
            Self::LBracket => "'['".to_owned(),
            Self::RBracket => "']'".to_owned(),
            Self::Comma => "','".to_owned(),
            Self::Semicolon => "';'".to_owned(),
            Self::Colon => "':'".to_owned(),
            Self::Dot => "'.'".to_owned(),
            Self::Arrow => "'->'".to_owned(),
            Self::Assign => "'='".to_owned(),
            Self::Plus => "'+'".to_owned(),
            Self::Minus => "'-'".to_owned(),
            Self::Star => "'*'".to_owned(),
            Self::Slash => "'/'".to_owned(),
            Self::Percent => "'%'".to_owned(),
            Self::Eq => "'=='".to_owned(),
            Self::NotEq => "'!='".to_owned(),
            Self::Lt => "'<'".to_owned(),
            Self::Gt => "'>'".to_owned(),
            Self::LtEq => "'<='".to_owned(),
            Self::GtEq => "'>='".to_owned(),
            Self::AndAnd => "'&&'".to_owned(),
            Self::OrOr => "'||'".to_owned(),
            Self::Bang => "'!'".to_owned(),
            Self::Newline => "newline".to_owned(),
            Self::Eof => "end of input".to_owned(),
        }
    }
}

/// A lexed token: kind, original text, and source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: Rc<str>,
    pub span: Span,
    pub pos: Pos,
}

impl Token {
    #[must_use]
    pub fn is_newline(&self) -> bool {
        matches!(self.kind, TokenKind::Newline)
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    #[must_use]
    pub fn keyword(&self) -> Option<Keyword> {
        match self.kind {
            TokenKind::Keyword(kw) => Some(kw),
            _ => None,
        }
    }

    /// The identifier text for `Ident` tokens and keyword tokens used in
    /// identifier position (e.g. `register_event(...)` as a call).
    #[must_use]
    pub fn ident_text(&self) -> Option<&str> {
        match self.kind {
            TokenKind::Ident => Some(&self.lexeme),
            TokenKind::Keyword(kw) => Some(<&'static str>::from(kw)),
            _ => None,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lexeme)
    }
}
