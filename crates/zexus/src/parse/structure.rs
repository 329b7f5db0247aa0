//! Structural analyzer: brace-aware block segmentation.
//!
//! A single left-to-right pass with a brace-depth counter and a small
//! state machine segments the token stream into tagged blocks before any
//! grammar work happens. The context-stack parser then operates on clean
//! slices, and the recovery engine synchronizes at block edges.
//!
//! Tie-break rules:
//! - a `{` immediately after `=`, `:`, `,`, `(`, `[`, `return`, or `in`
//!   opens a *map* block; otherwise it opens a statement block;
//! - a `catch` following a `try` block always binds to that try regardless
//!   of intervening newlines;
//! - an unmatched closing brace terminates the innermost block and emits a
//!   `brace_mismatch` diagnostic.

use crate::{
    error::{Diagnostic, ErrorKind, RecoveryAction, RunError, RunResult},
    token::{Keyword, Token, TokenKind},
};

/// Tag for one contiguous token slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    Top,
    If,
    While,
    ForEach,
    Try,
    Catch,
    ActionBody,
    Map,
    List,
    Paren,
    /// A `{` block in statement position with no governing keyword.
    Stmt,
}

/// One structural block: a token slice `[open, close]` (inclusive of the
/// delimiters where present) plus nested blocks.
#[derive(Debug)]
pub(crate) struct StructBlock {
    pub kind: BlockKind,
    /// Index of the opening delimiter token (or the slice start for `Top`).
    pub open: usize,
    /// Index of the matching closing delimiter (or the slice end for `Top`).
    pub close: usize,
    pub children: Vec<StructBlock>,
}

impl StructBlock {
    /// Innermost block whose span contains `idx`.
    pub(crate) fn innermost_containing(&self, idx: usize) -> &StructBlock {
        for child in &self.children {
            if idx > child.open && idx < child.close {
                return child.innermost_containing(idx);
            }
        }
        self
    }
}

/// State tracked while deciding how to tag the next `{`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    If,
    While,
    ForEach,
    Try,
    Catch,
    Action,
}

struct Analyzer<'t> {
    toks: &'t [Token],
    diagnostics: Vec<Diagnostic>,
}

/// Runs structural analysis over the whole token stream.
///
/// Returns the block tree plus recoverable diagnostics. Fails (triggering
/// the recursive-descent fallback) only when the stream is so malformed
/// that no consistent segmentation exists: more than half of the opened
/// braces never close.
pub(crate) fn analyze(toks: &[Token]) -> RunResult<(StructBlock, Vec<Diagnostic>)> {
    let mut analyzer = Analyzer {
        toks,
        diagnostics: Vec::new(),
    };
    let mut root = StructBlock {
        kind: BlockKind::Top,
        open: 0,
        close: toks.len().saturating_sub(1),
        children: Vec::new(),
    };
    let unclosed = analyzer.scan(&mut root)?;
    if unclosed > 0 {
        analyzer.diagnostics.push(Diagnostic::new(
            ErrorKind::SyntaxError,
            format!("{unclosed} unclosed block(s) at end of input"),
            toks.last().map(|t| t.pos).unwrap_or_default(),
            RecoveryAction::ClosedBlock,
        ));
    }
    Ok((root, analyzer.diagnostics))
}

impl Analyzer<'_> {
    /// Scans the stream, building the nested block tree. Returns the count
    /// of blocks force-closed at EOF.
    fn scan(&mut self, root: &mut StructBlock) -> RunResult<usize> {
        // Stack of (block, pending-tag used to tag it). The borrow rules
        // make a recursive build awkward, so build a flat list of frames
        // and fold children on close.
        let mut stack: Vec<StructBlock> = Vec::new();
        let mut pending = Pending::None;
        let mut opened = 0usize;
        let mut mismatches = 0usize;
        let mut prev_kind: Option<&TokenKind> = None;

        for (idx, tok) in self.toks.iter().enumerate() {
            match &tok.kind {
                TokenKind::Keyword(Keyword::If) => pending = Pending::If,
                TokenKind::Keyword(Keyword::While) => pending = Pending::While,
                TokenKind::Keyword(Keyword::For) => pending = Pending::ForEach,
                TokenKind::Keyword(Keyword::Try) => pending = Pending::Try,
                TokenKind::Keyword(Keyword::Catch) => pending = Pending::Catch,
                TokenKind::Keyword(Keyword::Action | Keyword::Lambda) => pending = Pending::Action,
                TokenKind::LBrace => {
                    opened += 1;
                    let kind = self.tag_brace(pending, prev_kind);
                    stack.push(StructBlock {
                        kind,
                        open: idx,
                        close: idx,
                        children: Vec::new(),
                    });
                    pending = Pending::None;
                }
                TokenKind::RBrace => match stack.pop() {
                    Some(mut block) => {
                        block.close = idx;
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(block),
                            None => root.children.push(block),
                        }
                    }
                    None => {
                        mismatches += 1;
                        self.diagnostics.push(Diagnostic::new(
                            ErrorKind::SyntaxError,
                            "brace_mismatch: unmatched '}'",
                            tok.pos,
                            RecoveryAction::ClosedBlock,
                        ));
                    }
                },
                TokenKind::LBracket => {
                    stack.push(StructBlock {
                        kind: BlockKind::List,
                        open: idx,
                        close: idx,
                        children: Vec::new(),
                    });
                }
                TokenKind::LParen => {
                    stack.push(StructBlock {
                        kind: BlockKind::Paren,
                        open: idx,
                        close: idx,
                        children: Vec::new(),
                    });
                }
                TokenKind::RBracket | TokenKind::RParen => {
                    // Close the innermost bracket/paren block if it matches;
                    // otherwise this is a stray delimiter the context parser
                    // will diagnose.
                    let expected = if tok.kind == TokenKind::RBracket {
                        BlockKind::List
                    } else {
                        BlockKind::Paren
                    };
                    if stack.last().is_some_and(|b| b.kind == expected) {
                        let mut block = stack.pop().unwrap();
                        block.close = idx;
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(block),
                            None => root.children.push(block),
                        }
                    }
                }
                _ => {}
            }
            if !tok.is_newline() {
                prev_kind = Some(&tok.kind);
            }
        }

        if opened > 0 && mismatches + stack.len() > opened / 2 && opened > 2 {
            return Err(RunError::syntax(
                self.toks.first().map(|t| t.pos).unwrap_or_default(),
                "structural analysis failed: inconsistent block nesting",
            ));
        }

        // Force-close what never closed, innermost-first.
        let unclosed = stack.len();
        while let Some(mut block) = stack.pop() {
            block.close = self.toks.len().saturating_sub(1);
            match stack.last_mut() {
                Some(parent) => parent.children.push(block),
                None => root.children.push(block),
            }
        }
        Ok(unclosed)
    }

    /// Applies the map-vs-statement tie-break for a `{`.
    fn tag_brace(&self, pending: Pending, prev: Option<&TokenKind>) -> BlockKind {
        match pending {
            Pending::If => return BlockKind::If,
            Pending::While => return BlockKind::While,
            Pending::ForEach => return BlockKind::ForEach,
            Pending::Try => return BlockKind::Try,
            Pending::Catch => return BlockKind::Catch,
            Pending::Action => return BlockKind::ActionBody,
            Pending::None => {}
        }
        match prev {
            Some(
                TokenKind::Assign
                | TokenKind::Colon
                | TokenKind::Comma
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Keyword(Keyword::Return | Keyword::In),
            ) => BlockKind::Map,
            _ => BlockKind::Stmt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn analyze_src(src: &str) -> (StructBlock, Vec<Diagnostic>) {
        let toks = tokenize(src).unwrap();
        analyze(&toks).unwrap()
    }

    #[test]
    fn tags_control_blocks() {
        let (root, diags) = analyze_src("if x { let y = 1 } while y { }");
        assert!(diags.is_empty());
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].kind, BlockKind::If);
        assert_eq!(root.children[1].kind, BlockKind::While);
    }

    #[test]
    fn brace_after_assign_is_map() {
        let (root, _) = analyze_src("let m = { \"a\": 1 }");
        assert_eq!(root.children[0].kind, BlockKind::Map);
    }

    #[test]
    fn bare_brace_is_statement_block() {
        let (root, _) = analyze_src("{ let x = 1 }");
        assert_eq!(root.children[0].kind, BlockKind::Stmt);
    }

    #[test]
    fn unmatched_close_is_diagnosed() {
        let toks = tokenize("let x = 1 }").unwrap();
        let (_, diags) = analyze(&toks).unwrap();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("brace_mismatch"));
    }

    #[test]
    fn try_catch_blocks_tagged() {
        let (root, _) = analyze_src("try { x } catch(e) { y }");
        assert_eq!(root.children[0].kind, BlockKind::Try);
        assert_eq!(root.children[1].kind, BlockKind::Paren);
        assert_eq!(root.children[2].kind, BlockKind::Catch);
    }

    #[test]
    fn nested_map_inside_action() {
        let (root, _) = analyze_src("action f() { let m = { a: 1 } }");
        assert_eq!(root.children[0].kind, BlockKind::Paren);
        assert_eq!(root.children[1].kind, BlockKind::ActionBody);
        assert_eq!(root.children[1].children[0].kind, BlockKind::Map);
    }
}
