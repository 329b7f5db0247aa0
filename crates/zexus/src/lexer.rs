//! Byte-walking lexer for Zexus source.
//!
//! Whitespace and comments (`// ...` and `/* ... */`) are skipped; every
//! physical newline is emitted as a `Newline` token so the tolerant parser
//! can honor colon-block boundaries. Multi-character operators are
//! tokenized greedily. Embedded code blocks use matched `{|` / `|}`
//! delimiters with the first in-block line as the language tag.
//!
//! The identifier `async` is promoted to the `Async` keyword only when it
//! immediately follows `action`; everywhere else it stays an identifier.

use std::rc::Rc;
use std::str::FromStr;

use num_bigint::BigInt;

use crate::{
    error::{Diagnostic, Pos, RecoveryAction, RunError, RunResult},
    token::{Keyword, Span, Token, TokenKind},
};

/// Streaming lexer with one-token lookahead.
pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    /// Last non-newline token kind, for `action async` promotion.
    prev_keyword: Option<Keyword>,
    peeked: Option<Token>,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            prev_keyword: None,
            peeked: None,
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> RunResult<&Token> {
        if self.peeked.is_none() {
            let tok = self.scan()?;
            self.peeked = Some(tok);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    /// Consumes and returns the next token.
    pub fn next_token(&mut self) -> RunResult<Token> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }
        self.scan()
    }

    fn cur_pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn bump(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Skips spaces, tabs, carriage returns, and both comment forms.
    /// Newlines are not skipped; they become tokens.
    fn skip_trivia(&mut self) -> RunResult<()> {
        loop {
            match self.peek_byte() {
                Some(b' ' | b'\t' | b'\r') => {
                    self.bump();
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek_byte() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'*') => {
                    let start = self.cur_pos();
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek_byte() {
                            Some(b'*') if self.peek_byte_at(1) == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => return Err(RunError::lexical(start, "unterminated block comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan(&mut self) -> RunResult<Token> {
        self.skip_trivia()?;
        let start = self.pos;
        let pos = self.cur_pos();

        let Some(b) = self.peek_byte() else {
            return Ok(self.make(TokenKind::Eof, start, pos));
        };

        let kind = match b {
            b'\n' => {
                self.bump();
                TokenKind::Newline
            }
            b'0'..=b'9' => return self.scan_number(start, pos),
            b'"' => return self.scan_string(start, pos),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => return Ok(self.scan_ident(start, pos)),
            b'{' if self.peek_byte_at(1) == Some(b'|') => return self.scan_embedded(start, pos),
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b'[' => self.single(TokenKind::LBracket),
            b']' => self.single(TokenKind::RBracket),
            b',' => self.single(TokenKind::Comma),
            b';' => self.single(TokenKind::Semicolon),
            b':' => self.single(TokenKind::Colon),
            b'.' => self.single(TokenKind::Dot),
            b'+' => self.single(TokenKind::Plus),
            b'*' => self.single(TokenKind::Star),
            b'/' => self.single(TokenKind::Slash),
            b'%' => self.single(TokenKind::Percent),
            b'-' => {
                self.bump();
                if self.peek_byte() == Some(b'>') {
                    self.bump();
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            b'=' => {
                self.bump();
                if self.peek_byte() == Some(b'=') {
                    self.bump();
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            b'!' => {
                self.bump();
                if self.peek_byte() == Some(b'=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                self.bump();
                if self.peek_byte() == Some(b'=') {
                    self.bump();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                self.bump();
                if self.peek_byte() == Some(b'=') {
                    self.bump();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            b'&' => {
                self.bump();
                if self.peek_byte() == Some(b'&') {
                    self.bump();
                    TokenKind::AndAnd
                } else {
                    return Err(RunError::lexical(pos, "unexpected character '&'"));
                }
            }
            b'|' => {
                self.bump();
                if self.peek_byte() == Some(b'|') {
                    self.bump();
                    TokenKind::OrOr
                } else {
                    return Err(RunError::lexical(pos, "unexpected character '|'"));
                }
            }
            other => {
                let ch = self.src[self.pos..].chars().next().unwrap_or(other as char);
                return Err(RunError::lexical(pos, format!("unexpected character '{ch}'")));
            }
        };
        Ok(self.make(kind, start, pos))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn make(&mut self, kind: TokenKind, start: usize, pos: Pos) -> Token {
        self.prev_keyword = match kind {
            TokenKind::Keyword(kw) => Some(kw),
            TokenKind::Newline => self.prev_keyword,
            _ => None,
        };
        Token {
            kind,
            lexeme: Rc::from(&self.src[start..self.pos]),
            span: Span::new(start, self.pos),
            pos,
        }
    }

    fn scan_number(&mut self, start: usize, pos: Pos) -> RunResult<Token> {
        while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
            self.bump();
        }
        let mut is_float = false;
        if self.peek_byte() == Some(b'.') {
            if matches!(self.peek_byte_at(1), Some(b'0'..=b'9')) {
                is_float = true;
                self.bump();
                while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                    self.bump();
                }
            } else {
                return Err(RunError::lexical(pos, "numeric literal may not end with '.'"));
            }
        }
        let text = &self.src[start..self.pos];
        let kind = if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| RunError::lexical(pos, format!("invalid float literal '{text}'")))?;
            TokenKind::Float(value)
        } else {
            let value = BigInt::from_str(text)
                .map_err(|_| RunError::lexical(pos, format!("invalid integer literal '{text}'")))?;
            TokenKind::Int(value)
        };
        Ok(self.make(kind, start, pos))
    }

    fn scan_string(&mut self, start: usize, pos: Pos) -> RunResult<Token> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => return Err(RunError::lexical(pos, "unterminated string literal")),
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => value.push('\n'),
                    Some(b't') => value.push('\t'),
                    Some(b'r') => value.push('\r'),
                    Some(b'\\') => value.push('\\'),
                    Some(b'"') => value.push('"'),
                    Some(b'x') => {
                        let hi = self.bump();
                        let lo = self.bump();
                        let (Some(hi), Some(lo)) = (hi, lo) else {
                            return Err(RunError::lexical(pos, "truncated \\x escape"));
                        };
                        let hex = [hi, lo];
                        let hex = std::str::from_utf8(&hex)
                            .ok()
                            .and_then(|s| u8::from_str_radix(s, 16).ok());
                        match hex {
                            Some(byte) => value.push(byte as char),
                            None => return Err(RunError::lexical(pos, "invalid \\x escape")),
                        }
                    }
                    Some(other) => {
                        return Err(RunError::lexical(pos, format!("unknown escape '\\{}'", other as char)));
                    }
                    None => return Err(RunError::lexical(pos, "unterminated string literal")),
                },
                Some(byte) if byte < 0x80 => value.push(byte as char),
                Some(_) => {
                    // Multi-byte UTF-8: re-read the full char from the source.
                    let char_start = self.pos - 1;
                    let ch = self.src[char_start..].chars().next().unwrap();
                    for _ in 1..ch.len_utf8() {
                        self.bump();
                    }
                    value.push(ch);
                }
            }
        }
        Ok(self.make(TokenKind::Str(value), start, pos))
    }

    fn scan_ident(&mut self, start: usize, pos: Pos) -> Token {
        while matches!(self.peek_byte(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')) {
            self.bump();
        }
        let text = &self.src[start..self.pos];
        let kind = match Keyword::from_str(text) {
            // `async` is a keyword only in the position `action async ...`.
            Ok(Keyword::Async) if self.prev_keyword != Some(Keyword::Action) => TokenKind::Ident,
            Ok(kw) => TokenKind::Keyword(kw),
            Err(_) => TokenKind::Ident,
        };
        self.make(kind, start, pos)
    }

    fn scan_embedded(&mut self, start: usize, pos: Pos) -> RunResult<Token> {
        self.bump(); // '{'
        self.bump(); // '|'
        let body_start = self.pos;
        loop {
            match self.peek_byte() {
                Some(b'|') if self.peek_byte_at(1) == Some(b'}') => break,
                Some(_) => {
                    self.bump();
                }
                None => return Err(RunError::lexical(pos, "unterminated embedded block")),
            }
        }
        let body = &self.src[body_start..self.pos];
        self.bump(); // '|'
        self.bump(); // '}'
        let (language, text) = match body.split_once('\n') {
            Some((tag, rest)) => (tag.trim().to_owned(), rest.to_owned()),
            None => (body.trim().to_owned(), String::new()),
        };
        Ok(self.make(TokenKind::Embedded { language, text }, start, pos))
    }
}

/// Lexes the whole source, failing on the first lexical error.
pub fn tokenize(src: &str) -> RunResult<Vec<Token>> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    while !lexer.peek()?.is_eof() {
        tokens.push(lexer.next_token()?);
    }
    tokens.push(lexer.next_token()?);
    Ok(tokens)
}

/// Lexes the whole source, converting lexical errors into diagnostics and
/// skipping the offending character. The tolerant parser path uses this so
/// it never aborts before EOF.
pub fn tokenize_tolerant(src: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    loop {
        match lexer.next_token() {
            Ok(tok) => {
                let done = tok.is_eof();
                tokens.push(tok);
                if done {
                    return (tokens, diagnostics);
                }
            }
            Err(err) => {
                diagnostics.push(Diagnostic::new(
                    err.kind,
                    err.message,
                    err.pos.unwrap_or_default(),
                    RecoveryAction::Skipped(1),
                ));
                // Drop one character and retry; on a stuck cursor, stop.
                if lexer.bump().is_none() {
                    let pos = Pos::new(lexer.line, lexer.col);
                    tokens.push(Token {
                        kind: TokenKind::Eof,
                        lexeme: Rc::from(""),
                        span: Span::new(src.len(), src.len()),
                        pos,
                    });
                    return (tokens, diagnostics);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn operators_are_greedy() {
        let toks = kinds("a == b != c <= d >= e && f || g -> h");
        assert!(toks.contains(&TokenKind::Eq));
        assert!(toks.contains(&TokenKind::NotEq));
        assert!(toks.contains(&TokenKind::LtEq));
        assert!(toks.contains(&TokenKind::GtEq));
        assert!(toks.contains(&TokenKind::AndAnd));
        assert!(toks.contains(&TokenKind::OrOr));
        assert!(toks.contains(&TokenKind::Arrow));
    }

    #[test]
    fn async_promoted_only_after_action() {
        let toks = kinds("action async f() {}");
        assert!(toks.contains(&TokenKind::Keyword(Keyword::Async)));
        let toks = kinds("let async = 1");
        assert!(!toks.contains(&TokenKind::Keyword(Keyword::Async)));
        assert!(toks.contains(&TokenKind::Ident));
    }

    #[test]
    fn trailing_dot_is_rejected() {
        assert!(tokenize("let x = 12.").is_err());
        assert!(tokenize("let x = 12.5").is_ok());
    }

    #[test]
    fn string_escapes() {
        let toks = tokenize(r#""a\n\t\x41""#).unwrap();
        assert_eq!(toks[0].kind, TokenKind::Str("a\n\tA".to_owned()));
    }

    #[test]
    fn embedded_block_tags_language() {
        let toks = tokenize("{| sql\nselect 1\n|}").unwrap();
        match &toks[0].kind {
            TokenKind::Embedded { language, text } => {
                assert_eq!(language, "sql");
                assert_eq!(text, "select 1\n");
            }
            other => panic!("expected embedded block, got {other:?}"),
        }
    }

    #[test]
    fn unknown_character_fails() {
        let err = tokenize("let x = @").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::LexicalError);
    }

    #[test]
    fn spans_tile_the_source() {
        let src = "let x = 1 + 2 // done\nprint(x)";
        let toks = tokenize(src).unwrap();
        let mut rebuilt = String::new();
        let mut cursor = 0;
        for tok in &toks {
            rebuilt.push_str(&src[cursor..tok.span.start]);
            rebuilt.push_str(&tok.lexeme);
            cursor = tok.span.end;
        }
        rebuilt.push_str(&src[cursor..]);
        assert_eq!(rebuilt, src);
    }
}
