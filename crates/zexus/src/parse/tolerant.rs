//! Tolerant multi-strategy parser for the interpreter path.
//!
//! Strategy order:
//! 1. structural analysis segments the token stream into tagged blocks;
//! 2. a context-stack parser maps each block to AST nodes, with a direct
//!    micro-parser per grammar context;
//! 3. on unexpected tokens the recovery engine synchronizes at the next
//!    `;` or newline at bracket depth zero within the current block, drops
//!    the offending tokens, records a diagnostic, and resumes;
//! 4. if structural analysis fails (or advanced parsing is disabled), a
//!    plain Pratt-style recursive descent runs over the raw token stream
//!    with the same recovery engine.
//!
//! The parser consumes the whole token stream and always yields a program.

use std::rc::Rc;

use crate::{
    ast::{
        BinOp, UnOp,
        interp::{ActionDef, Block, Expr, IMeta, Program, Stmt},
    },
    config,
    error::{Diagnostic, Pos, RecoveryAction, RunError, RunResult},
    lexer::tokenize_tolerant,
    parse::{
        Cursor, ScreenLike, starts_statement_keyword,
        structure::{self, StructBlock},
    },
    token::{Keyword, Token, TokenKind},
};

/// Result of a tolerant parse: always a program, plus diagnostics.
#[derive(Debug)]
pub(crate) struct ParseOutcome {
    pub program: Program,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses `src` tolerantly. Never fails; all trouble lands in diagnostics.
pub(crate) fn parse(src: &str) -> ParseOutcome {
    let (toks, mut diagnostics) = tokenize_tolerant(src);
    let blocks = if config::advanced_parsing() {
        match structure::analyze(&toks) {
            Ok((blocks, struct_diags)) => {
                diagnostics.extend(struct_diags);
                Some(blocks)
            }
            Err(err) => {
                diagnostics.push(Diagnostic::new(
                    err.kind,
                    err.message,
                    err.pos.unwrap_or_default(),
                    RecoveryAction::Fallback,
                ));
                None
            }
        }
    } else {
        None
    };
    let mut parser = TolerantParser {
        cur: Cursor::new(&toks),
        blocks,
        diagnostics,
        ctx: vec![Ctx::Statement],
        next_fn_id: 0,
    };
    let program = parser.parse_program();
    ParseOutcome {
        program,
        diagnostics: parser.diagnostics,
    }
}

/// What the parser currently expects; the top of the context stack names
/// the grammar production diagnostics refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Statement,
    Expression,
    MapEntry,
    CatchVar,
}

impl Ctx {
    fn describe(self) -> &'static str {
        match self {
            Self::Statement => "statement",
            Self::Expression => "expression",
            Self::MapEntry => "map entry",
            Self::CatchVar => "catch variable",
        }
    }
}

struct TolerantParser<'t> {
    cur: Cursor<'t>,
    /// Structural block tree; `None` means the recursive-descent fallback.
    blocks: Option<StructBlock>,
    diagnostics: Vec<Diagnostic>,
    ctx: Vec<Ctx>,
    next_fn_id: u32,
}

impl TolerantParser<'_> {
    fn meta(&self, pos: Pos) -> IMeta {
        IMeta::at(pos)
    }

    fn fn_id(&mut self) -> u32 {
        let id = self.next_fn_id;
        self.next_fn_id += 1;
        id
    }

    fn parse_program(&mut self) -> Program {
        let mut stmts = Vec::new();
        loop {
            self.cur.skip_separators();
            if self.cur.at_end() {
                break;
            }
            if self.cur.peek().kind == TokenKind::RBrace {
                // Stray closer at top level; structural analysis already
                // diagnosed it when it ran.
                let tok = self.cur.next();
                if self.blocks.is_none() {
                    self.diagnostics.push(Diagnostic::new(
                        crate::error::ErrorKind::SyntaxError,
                        "brace_mismatch: unmatched '}'",
                        tok.pos,
                        RecoveryAction::ClosedBlock,
                    ));
                }
                continue;
            }
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    let stmt = self.recover(err);
                    stmts.push(stmt);
                }
            }
        }
        Program { stmts }
    }

    /// The recovery engine: records a diagnostic, drops tokens up to the
    /// next statement boundary within the current structural block, and
    /// yields a `Malformed` node carrying the note.
    fn recover(&mut self, err: RunError) -> Stmt {
        let pos = err.pos.unwrap_or_else(|| self.cur.pos());
        let limit = self
            .blocks
            .as_ref()
            .map(|root| root.innermost_containing(self.cur.idx).close);
        let start = self.cur.idx;
        let mut depth = 0usize;
        loop {
            if self.cur.at_end() {
                break;
            }
            if let Some(limit) = limit
                && self.cur.idx >= limit
            {
                break;
            }
            match self.cur.peek().kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => depth = depth.saturating_sub(1),
                TokenKind::RBrace => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                TokenKind::Semicolon | TokenKind::Newline if depth == 0 => {
                    self.cur.next();
                    break;
                }
                _ => {}
            }
            self.cur.next();
        }
        let skipped = self.cur.idx - start;
        let context = self.ctx.last().copied().unwrap_or(Ctx::Statement);
        let note = format!("{} (while parsing {})", err.message, context.describe());
        self.diagnostics.push(Diagnostic::new(
            err.kind,
            note.clone(),
            pos,
            RecoveryAction::Skipped(skipped),
        ));
        let meta = IMeta {
            pos,
            note: Some(note.clone().into_boxed_str()),
        };
        Stmt::Malformed { note, meta }
    }

    // --- statements -------------------------------------------------------

    fn parse_stmt(&mut self) -> RunResult<Stmt> {
        self.ctx.push(Ctx::Statement);
        let result = self.parse_stmt_inner();
        self.ctx.pop();
        result
    }

    fn parse_stmt_inner(&mut self) -> RunResult<Stmt> {
        let tok = self.cur.peek();
        let pos = tok.pos;
        match tok.kind {
            TokenKind::LBrace => {
                self.cur.next();
                let block = self.parse_brace_block_body();
                Ok(Stmt::Block(block))
            }
            TokenKind::Keyword(kw) => match kw {
                Keyword::Let => self.parse_let(pos),
                Keyword::Return => self.parse_return(pos),
                Keyword::Print => self.parse_print(pos),
                Keyword::For => self.parse_for_each(pos),
                Keyword::If => self.parse_if(pos),
                Keyword::While => self.parse_while(pos),
                Keyword::Try => self.parse_try(pos),
                Keyword::Action => self.parse_action_stmt(pos),
                Keyword::Event => self.parse_event(pos),
                Keyword::Emit => self.parse_emit(pos),
                Keyword::Enum => self.parse_enum(pos),
                Keyword::Protocol => self.parse_protocol(pos),
                Keyword::Contract => self.parse_contract(pos),
                Keyword::External => self.parse_external(pos),
                Keyword::Export => self.parse_export(pos),
                Keyword::Debug => self.parse_debug(pos),
                Keyword::Use => self.parse_use(pos),
                Keyword::From => self.parse_import(pos),
                Keyword::Screen => self.parse_screen_like(pos, ScreenLike::Screen),
                Keyword::Component => self.parse_screen_like(pos, ScreenLike::Component),
                Keyword::Theme => self.parse_screen_like(pos, ScreenLike::Theme),
                Keyword::Persistent => self.parse_persistent(pos),
                Keyword::Require => self.parse_require(pos),
                Keyword::Exactly => self.parse_exactly(pos),
                _ => self.parse_expr_stmt(pos),
            },
            _ => self.parse_expr_stmt(pos),
        }
    }

    fn parse_expr_stmt(&mut self, pos: Pos) -> RunResult<Stmt> {
        let expr = self.parse_expr()?;
        Ok(Stmt::ExpressionStatement {
            expr,
            meta: self.meta(pos),
        })
    }

    fn expect_ident(&mut self, what: &str) -> RunResult<String> {
        let tok = self.cur.peek();
        match tok.kind {
            TokenKind::Ident => {
                let name = tok.lexeme.to_string();
                self.cur.next();
                Ok(name)
            }
            _ => Err(RunError::syntax(
                tok.pos,
                format!("expected {what}, found {}", tok.kind.describe()),
            )),
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> RunResult<&'_ Token> {
        let tok = self.cur.peek();
        if &tok.kind == kind {
            Ok(self.cur.next())
        } else {
            Err(RunError::syntax(
                tok.pos,
                format!("expected {}, found {}", kind.describe(), tok.kind.describe()),
            ))
        }
    }

    /// Skips an optional `: type` annotation. Annotations are parsed and
    /// ignored at runtime.
    fn skip_annotation(&mut self) {
        if self.cur.peek().kind == TokenKind::Colon && self.cur.peek_at(1).kind == TokenKind::Ident {
            // Only treat it as an annotation when an `=` or delimiter
            // follows; `name:` ahead of a block stays a colon block.
            let after = &self.cur.peek_at(2).kind;
            if matches!(
                after,
                TokenKind::Assign | TokenKind::Comma | TokenKind::RParen | TokenKind::Semicolon | TokenKind::Newline
            ) {
                self.cur.next();
                self.cur.next();
            }
        }
    }

    fn parse_let(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let name = self.expect_ident("binding name")?;
        self.skip_annotation();
        self.expect(&TokenKind::Assign)?;
        let value = self.parse_expr()?;
        Ok(Stmt::Let {
            name,
            value,
            meta: self.meta(pos),
        })
    }

    fn parse_return(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let value = if matches!(
            self.cur.peek().kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        Ok(Stmt::Return {
            value,
            meta: self.meta(pos),
        })
    }

    fn parse_print(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let expr = self.parse_expr()?;
        Ok(Stmt::Print {
            expr,
            meta: self.meta(pos),
        })
    }

    fn parse_for_each(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        self.cur.eat_keyword(Keyword::Each);
        let var = self.expect_ident("loop variable")?;
        if !self.cur.eat_keyword(Keyword::In) {
            return Err(RunError::syntax(self.cur.pos(), "expected 'in' in for-each loop"));
        }
        let iterable = self.parse_expr()?;
        let body = self.parse_block(pos.col)?;
        Ok(Stmt::ForEach {
            var,
            iterable,
            body,
            meta: self.meta(pos),
        })
    }

    fn parse_if(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let cond = self.parse_expr()?;
        let then_block = self.parse_block(pos.col)?;
        let else_block = if self.cur.peek_skip_newlines().keyword() == Some(Keyword::Else) {
            self.cur.skip_newlines();
            self.cur.next();
            if self.cur.peek().keyword() == Some(Keyword::If) {
                let nested_pos = self.cur.pos();
                let nested = self.parse_if(nested_pos)?;
                Some(Block { stmts: vec![nested] })
            } else {
                Some(self.parse_block(pos.col)?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
            meta: self.meta(pos),
        })
    }

    fn parse_while(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let cond = self.parse_expr()?;
        let body = self.parse_block(pos.col)?;
        Ok(Stmt::While {
            cond,
            body,
            meta: self.meta(pos),
        })
    }

    fn parse_try(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let body = self.parse_block(pos.col)?;
        // `catch` binds to this try regardless of intervening newlines.
        self.cur.skip_newlines();
        let (err_var, handler) = if self.cur.eat_keyword(Keyword::Catch) {
            let err_var = self.parse_catch_var()?;
            let handler = self.parse_block(pos.col)?;
            (err_var, handler)
        } else {
            self.diagnostics.push(Diagnostic::new(
                crate::error::ErrorKind::SyntaxError,
                "try without catch; inserted an empty handler",
                self.cur.pos(),
                RecoveryAction::None,
            ));
            ("_".to_owned(), Block { stmts: Vec::new() })
        };
        Ok(Stmt::TryCatch {
            body,
            err_var,
            handler,
            meta: self.meta(pos),
        })
    }

    /// Accepts `err`, `(err)`, and `((err))` as equivalent forms.
    fn parse_catch_var(&mut self) -> RunResult<String> {
        self.ctx.push(Ctx::CatchVar);
        let result = (|| {
            let mut parens = 0;
            while self.cur.eat(&TokenKind::LParen) {
                parens += 1;
            }
            let name = self.expect_ident("catch variable")?;
            for _ in 0..parens {
                self.expect(&TokenKind::RParen)?;
            }
            Ok(name)
        })();
        self.ctx.pop();
        result
    }

    fn parse_action_stmt(&mut self, pos: Pos) -> RunResult<Stmt> {
        // `action name(...)` is a definition; `action (...)` is an
        // anonymous literal in expression position.
        let named = match self.cur.peek_at(1).kind {
            TokenKind::Ident => true,
            TokenKind::Keyword(Keyword::Async) => self.cur.peek_at(2).kind == TokenKind::Ident,
            _ => false,
        };
        if named {
            let def = self.parse_action_def(pos)?;
            Ok(Stmt::Action(def))
        } else {
            self.parse_expr_stmt(pos)
        }
    }

    fn parse_action_def(&mut self, pos: Pos) -> RunResult<ActionDef> {
        self.cur.next(); // action
        let is_async = self.cur.eat_keyword(Keyword::Async);
        let name = match self.cur.peek().kind {
            TokenKind::Ident => Some(self.expect_ident("action name")?),
            _ => None,
        };
        let params = self.parse_params()?;
        let body = self.parse_block(pos.col)?;
        Ok(ActionDef {
            name,
            params,
            body,
            is_async,
            id: self.fn_id(),
            meta: self.meta(pos),
        })
    }

    fn parse_params(&mut self) -> RunResult<Vec<String>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        self.cur.skip_newlines();
        if !self.cur.eat(&TokenKind::RParen) {
            loop {
                let name = self.expect_ident("parameter name")?;
                self.skip_annotation();
                params.push(name);
                self.cur.skip_newlines();
                if self.cur.eat(&TokenKind::Comma) {
                    self.cur.skip_newlines();
                    if self.cur.eat(&TokenKind::RParen) {
                        break;
                    }
                    continue;
                }
                self.expect(&TokenKind::RParen)?;
                break;
            }
        }
        Ok(params)
    }

    fn parse_event(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let name = self.expect_ident("event name")?;
        self.expect(&TokenKind::LBrace)?;
        let mut fields = Vec::new();
        loop {
            self.cur.skip_separators();
            if self.cur.eat(&TokenKind::RBrace) {
                break;
            }
            if self.cur.at_end() {
                return Err(RunError::syntax(self.cur.pos(), "unterminated event declaration"));
            }
            let field = self.expect_ident("event field")?;
            // Field types are parsed and ignored.
            if self.cur.eat(&TokenKind::Colon) {
                self.expect_ident("field type")?;
            }
            fields.push(field);
            self.cur.eat(&TokenKind::Comma);
        }
        Ok(Stmt::Event {
            name,
            fields,
            meta: self.meta(pos),
        })
    }

    fn parse_emit(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let name = self.expect_ident("event name")?;
        self.expect(&TokenKind::LBrace)?;
        let payload = self.parse_map_entries()?;
        Ok(Stmt::Emit {
            name,
            payload,
            meta: self.meta(pos),
        })
    }

    fn parse_enum(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let name = self.expect_ident("enum name")?;
        self.expect(&TokenKind::LBrace)?;
        let mut variants = Vec::new();
        loop {
            self.cur.skip_separators();
            if self.cur.eat(&TokenKind::RBrace) {
                break;
            }
            if self.cur.at_end() {
                return Err(RunError::syntax(self.cur.pos(), "unterminated enum declaration"));
            }
            variants.push(self.expect_ident("enum variant")?);
            self.cur.eat(&TokenKind::Comma);
        }
        Ok(Stmt::Enum {
            name,
            variants,
            meta: self.meta(pos),
        })
    }

    fn parse_protocol(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let name = self.expect_ident("protocol name")?;
        self.expect(&TokenKind::LBrace)?;
        let mut signatures = Vec::new();
        loop {
            self.cur.skip_separators();
            if self.cur.eat(&TokenKind::RBrace) {
                break;
            }
            if self.cur.at_end() {
                return Err(RunError::syntax(self.cur.pos(), "unterminated protocol declaration"));
            }
            if !self.cur.eat_keyword(Keyword::Action) {
                return Err(RunError::syntax(
                    self.cur.pos(),
                    "expected 'action' signature in protocol body",
                ));
            }
            let sig_name = self.expect_ident("action name")?;
            let params = self.parse_params()?;
            signatures.push((sig_name, params.len()));
        }
        Ok(Stmt::Protocol {
            name,
            signatures,
            meta: self.meta(pos),
        })
    }

    fn parse_contract(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let name = self.expect_ident("contract name")?;
        let protocol = if self.cur.eat(&TokenKind::Colon) {
            Some(self.expect_ident("protocol name")?)
        } else {
            None
        };
        self.expect(&TokenKind::LBrace)?;
        let mut storage = Vec::new();
        let mut actions = Vec::new();
        loop {
            self.cur.skip_separators();
            if self.cur.eat(&TokenKind::RBrace) {
                break;
            }
            if self.cur.at_end() {
                return Err(RunError::syntax(self.cur.pos(), "unterminated contract declaration"));
            }
            let tok = self.cur.peek();
            match tok.keyword() {
                Some(Keyword::Storage) => {
                    self.cur.next();
                    self.expect(&TokenKind::LBrace)?;
                    storage.extend(self.parse_map_entries()?);
                }
                Some(Keyword::Action) => {
                    let action_pos = tok.pos;
                    let def = self.parse_action_def(action_pos)?;
                    actions.push(def);
                }
                _ => {
                    return Err(RunError::syntax(
                        tok.pos,
                        format!(
                            "expected 'storage' or 'action' in contract body, found {}",
                            tok.kind.describe()
                        ),
                    ));
                }
            }
        }
        Ok(Stmt::Contract {
            name,
            protocol,
            storage,
            actions,
            meta: self.meta(pos),
        })
    }

    fn parse_external(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let name = self.expect_ident("external name")?;
        let source = if self.cur.eat_keyword(Keyword::From) {
            let tok = self.cur.peek();
            match &tok.kind {
                TokenKind::Str(s) => {
                    let s = s.clone();
                    self.cur.next();
                    Some(s)
                }
                _ => {
                    return Err(RunError::syntax(
                        tok.pos,
                        format!("expected string literal after 'from', found {}", tok.kind.describe()),
                    ));
                }
            }
        } else {
            None
        };
        Ok(Stmt::ExternalDeclaration {
            name,
            source,
            meta: self.meta(pos),
        })
    }

    fn parse_export(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let inner = self.parse_stmt()?;
        Ok(Stmt::Export {
            inner: Box::new(inner),
            meta: self.meta(pos),
        })
    }

    fn parse_debug(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let message = self.parse_expr()?;
        let value = if self.cur.eat(&TokenKind::Comma) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Stmt::Debug {
            message,
            value,
            meta: self.meta(pos),
        })
    }

    fn parse_use(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let module = self.expect_ident("module name")?;
        // `as` is a contextual keyword; it is not reserved.
        let alias = if self.cur.peek().kind == TokenKind::Ident && self.cur.peek().lexeme.as_ref() == "as" {
            self.cur.next();
            Some(self.expect_ident("alias")?)
        } else {
            None
        };
        Ok(Stmt::Use {
            module,
            alias,
            meta: self.meta(pos),
        })
    }

    fn parse_import(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next(); // from
        let module = self.expect_ident("module name")?;
        if !self.cur.eat_keyword(Keyword::Use) {
            return Err(RunError::syntax(self.cur.pos(), "expected 'use' after 'from <module>'"));
        }
        let mut names = vec![self.expect_ident("imported name")?];
        while self.cur.eat(&TokenKind::Comma) {
            names.push(self.expect_ident("imported name")?);
        }
        Ok(Stmt::Import {
            module,
            names,
            meta: self.meta(pos),
        })
    }

    fn parse_screen_like(&mut self, pos: Pos, which: ScreenLike) -> RunResult<Stmt> {
        self.cur.next();
        let name = self.expect_ident("definition name")?;
        self.expect(&TokenKind::LBrace)?;
        let props = self.parse_map_entries()?;
        let meta = self.meta(pos);
        Ok(match which {
            ScreenLike::Screen => Stmt::ScreenDef { name, props, meta },
            ScreenLike::Component => Stmt::ComponentDef { name, props, meta },
            ScreenLike::Theme => Stmt::ThemeDef { name, props, meta },
        })
    }

    fn parse_persistent(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        if !self.cur.eat_keyword(Keyword::Storage) {
            return Err(RunError::syntax(self.cur.pos(), "expected 'storage' after 'persistent'"));
        }
        let name = self.expect_ident("storage name")?;
        self.expect(&TokenKind::LBrace)?;
        let fields = self.parse_map_entries()?;
        Ok(Stmt::PersistentStorage {
            name,
            fields,
            meta: self.meta(pos),
        })
    }

    fn parse_require(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        let cond = self.parse_expr()?;
        Ok(Stmt::Require {
            cond,
            meta: self.meta(pos),
        })
    }

    /// Semantics are undefined; the statement parses (trailing tokens are
    /// skipped up to the statement boundary) and the node errors when it
    /// executes. The production parser does the same, so this is not a
    /// recoverable-diagnostic case.
    fn parse_exactly(&mut self, pos: Pos) -> RunResult<Stmt> {
        self.cur.next();
        while !matches!(
            self.cur.peek().kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            self.cur.next();
        }
        Ok(Stmt::Exactly { meta: self.meta(pos) })
    }

    // --- blocks -----------------------------------------------------------

    /// A block body: `{ ... }`, or a colon block ending per the colon-block
    /// end rule.
    fn parse_block(&mut self, opener_col: u32) -> RunResult<Block> {
        self.cur.skip_newlines();
        if self.cur.eat(&TokenKind::LBrace) {
            Ok(self.parse_brace_block_body())
        } else if self.cur.eat(&TokenKind::Colon) {
            Ok(self.parse_colon_block(opener_col))
        } else {
            Err(RunError::syntax(
                self.cur.pos(),
                format!("expected '{{' or ':', found {}", self.cur.peek().kind.describe()),
            ))
        }
    }

    fn parse_brace_block_body(&mut self) -> Block {
        let mut stmts = Vec::new();
        loop {
            self.cur.skip_separators();
            if self.cur.eat(&TokenKind::RBrace) {
                break;
            }
            if self.cur.at_end() {
                self.diagnostics.push(Diagnostic::new(
                    crate::error::ErrorKind::SyntaxError,
                    "unterminated block",
                    self.cur.pos(),
                    RecoveryAction::ClosedBlock,
                ));
                break;
            }
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    let stmt = self.recover(err);
                    stmts.push(stmt);
                }
            }
        }
        Block { stmts }
    }

    /// Colon block: same-line statements up to the newline, or an indented
    /// run of statements ending at the first statement at the opener's
    /// column or lower, or at the closing brace of an enclosing block.
    fn parse_colon_block(&mut self, opener_col: u32) -> Block {
        let mut stmts = Vec::new();
        if !self.cur.peek().is_newline() && !self.cur.at_end() {
            // Single-line form.
            loop {
                match self.parse_stmt() {
                    Ok(stmt) => stmts.push(stmt),
                    Err(err) => {
                        let stmt = self.recover(err);
                        stmts.push(stmt);
                        break;
                    }
                }
                while self.cur.eat(&TokenKind::Semicolon) {}
                if matches!(
                    self.cur.peek().kind,
                    TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof
                ) {
                    break;
                }
            }
            return Block { stmts };
        }
        loop {
            self.cur.skip_separators();
            let tok = self.cur.peek();
            if tok.is_eof() || tok.kind == TokenKind::RBrace {
                break;
            }
            if tok.pos.col <= opener_col {
                break;
            }
            // A new top-level construct at deeper indentation is ambiguous;
            // close the block and say so.
            if starts_statement_keyword(tok)
                && matches!(
                    tok.keyword(),
                    Some(
                        Keyword::Event
                            | Keyword::Enum
                            | Keyword::Protocol
                            | Keyword::Contract
                            | Keyword::Screen
                            | Keyword::Component
                            | Keyword::Theme
                    )
                )
            {
                self.diagnostics.push(Diagnostic::new(
                    crate::error::ErrorKind::SyntaxError,
                    "ambiguous colon-block end before top-level construct",
                    tok.pos,
                    RecoveryAction::ClosedBlock,
                ));
                break;
            }
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    let stmt = self.recover(err);
                    stmts.push(stmt);
                }
            }
        }
        Block { stmts }
    }

    // --- expressions ------------------------------------------------------

    fn parse_expr(&mut self) -> RunResult<Expr> {
        self.ctx.push(Ctx::Expression);
        let result = self.parse_assign();
        self.ctx.pop();
        result
    }

    fn parse_assign(&mut self) -> RunResult<Expr> {
        let left = self.parse_or()?;
        if self.cur.peek().kind == TokenKind::Assign {
            let pos = self.cur.pos();
            if !matches!(
                left,
                Expr::Identifier { .. } | Expr::Index { .. } | Expr::PropertyAccess { .. }
            ) {
                return Err(RunError::syntax(pos, "invalid assignment target"));
            }
            self.cur.next();
            let value = self.parse_assign()?;
            return Ok(Expr::Assignment {
                target: Box::new(left),
                value: Box::new(value),
                meta: self.meta(pos),
            });
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> RunResult<Expr> {
        let mut left = self.parse_and()?;
        while self.cur.peek().kind == TokenKind::OrOr {
            let pos = self.cur.pos();
            self.cur.next();
            let right = self.parse_and()?;
            left = Expr::Infix {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                meta: self.meta(pos),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> RunResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.cur.peek().kind == TokenKind::AndAnd {
            let pos = self.cur.pos();
            self.cur.next();
            let right = self.parse_equality()?;
            left = Expr::Infix {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
                meta: self.meta(pos),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> RunResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.cur.peek().kind {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                _ => break,
            };
            let pos = self.cur.pos();
            self.cur.next();
            let right = self.parse_relational()?;
            left = Expr::Infix {
                op,
                left: Box::new(left),
                right: Box::new(right),
                meta: self.meta(pos),
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> RunResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.cur.peek().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::LtEq => BinOp::LtEq,
                TokenKind::GtEq => BinOp::GtEq,
                _ => break,
            };
            let pos = self.cur.pos();
            self.cur.next();
            let right = self.parse_additive()?;
            left = Expr::Infix {
                op,
                left: Box::new(left),
                right: Box::new(right),
                meta: self.meta(pos),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> RunResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.cur.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.cur.pos();
            self.cur.next();
            let right = self.parse_multiplicative()?;
            left = Expr::Infix {
                op,
                left: Box::new(left),
                right: Box::new(right),
                meta: self.meta(pos),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> RunResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.cur.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let pos = self.cur.pos();
            self.cur.next();
            let right = self.parse_unary()?;
            left = Expr::Infix {
                op,
                left: Box::new(left),
                right: Box::new(right),
                meta: self.meta(pos),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> RunResult<Expr> {
        let tok = self.cur.peek();
        let pos = tok.pos;
        match tok.kind {
            TokenKind::Bang => {
                self.cur.next();
                let expr = self.parse_unary()?;
                Ok(Expr::Prefix {
                    op: UnOp::Not,
                    expr: Box::new(expr),
                    meta: self.meta(pos),
                })
            }
            TokenKind::Minus => {
                self.cur.next();
                let expr = self.parse_unary()?;
                Ok(Expr::Prefix {
                    op: UnOp::Neg,
                    expr: Box::new(expr),
                    meta: self.meta(pos),
                })
            }
            TokenKind::Keyword(Keyword::Await) => {
                self.cur.next();
                let expr = self.parse_unary()?;
                Ok(Expr::Await {
                    expr: Box::new(expr),
                    meta: self.meta(pos),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> RunResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let tok = self.cur.peek();
            let pos = tok.pos;
            match tok.kind {
                TokenKind::LParen => {
                    self.cur.next();
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        meta: self.meta(pos),
                    };
                }
                TokenKind::Dot => {
                    self.cur.next();
                    let name_tok = self.cur.peek();
                    let Some(name) = name_tok.ident_text().map(str::to_owned) else {
                        return Err(RunError::syntax(
                            name_tok.pos,
                            format!("expected member name after '.', found {}", name_tok.kind.describe()),
                        ));
                    };
                    self.cur.next();
                    if self.cur.eat(&TokenKind::LParen) {
                        let args = self.parse_args()?;
                        expr = Expr::MethodCall {
                            receiver: Box::new(expr),
                            name,
                            args,
                            meta: self.meta(pos),
                        };
                    } else {
                        expr = Expr::PropertyAccess {
                            receiver: Box::new(expr),
                            name,
                            meta: self.meta(pos),
                        };
                    }
                }
                TokenKind::LBracket => {
                    self.cur.next();
                    self.cur.skip_newlines();
                    let index = self.parse_expr()?;
                    self.cur.skip_newlines();
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expr::Index {
                        receiver: Box::new(expr),
                        index: Box::new(index),
                        meta: self.meta(pos),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> RunResult<Vec<Expr>> {
        let mut args = Vec::new();
        self.cur.skip_newlines();
        if self.cur.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            self.cur.skip_newlines();
            if self.cur.eat(&TokenKind::Comma) {
                self.cur.skip_newlines();
                if self.cur.eat(&TokenKind::RParen) {
                    return Ok(args);
                }
                continue;
            }
            self.expect(&TokenKind::RParen)?;
            return Ok(args);
        }
    }

    fn parse_primary(&mut self) -> RunResult<Expr> {
        let tok = self.cur.peek();
        let pos = tok.pos;
        match &tok.kind {
            TokenKind::Int(value) => {
                let value = value.clone();
                self.cur.next();
                Ok(Expr::Integer {
                    value,
                    meta: self.meta(pos),
                })
            }
            TokenKind::Float(value) => {
                let value = *value;
                self.cur.next();
                Ok(Expr::Float {
                    value,
                    meta: self.meta(pos),
                })
            }
            TokenKind::Str(value) => {
                let value = value.clone();
                self.cur.next();
                Ok(Expr::Str {
                    value,
                    meta: self.meta(pos),
                })
            }
            TokenKind::Embedded { language, text } => {
                let (language, text) = (language.clone(), text.clone());
                self.cur.next();
                Ok(Expr::EmbeddedLiteral {
                    language,
                    text,
                    meta: self.meta(pos),
                })
            }
            TokenKind::Ident => {
                let name = tok.lexeme.to_string();
                self.cur.next();
                Ok(Expr::Identifier {
                    name,
                    meta: self.meta(pos),
                })
            }
            TokenKind::Keyword(Keyword::True) => {
                self.cur.next();
                Ok(Expr::Bool {
                    value: true,
                    meta: self.meta(pos),
                })
            }
            TokenKind::Keyword(Keyword::False) => {
                self.cur.next();
                Ok(Expr::Bool {
                    value: false,
                    meta: self.meta(pos),
                })
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.cur.next();
                Ok(Expr::Null { meta: self.meta(pos) })
            }
            TokenKind::Keyword(Keyword::RegisterEvent) => {
                // Builtin name in call position.
                self.cur.next();
                Ok(Expr::Identifier {
                    name: "register_event".to_owned(),
                    meta: self.meta(pos),
                })
            }
            TokenKind::LParen => {
                self.cur.next();
                self.cur.skip_newlines();
                let expr = self.parse_expr()?;
                self.cur.skip_newlines();
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.cur.next();
                let mut items = Vec::new();
                self.cur.skip_newlines();
                if !self.cur.eat(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        self.cur.skip_newlines();
                        if self.cur.eat(&TokenKind::Comma) {
                            self.cur.skip_newlines();
                            if self.cur.eat(&TokenKind::RBracket) {
                                break;
                            }
                            continue;
                        }
                        self.expect(&TokenKind::RBracket)?;
                        break;
                    }
                }
                Ok(Expr::ListLiteral {
                    items,
                    meta: self.meta(pos),
                })
            }
            TokenKind::LBrace => {
                self.cur.next();
                let entries = self.parse_map_entries()?;
                Ok(Expr::MapLiteral {
                    entries,
                    meta: self.meta(pos),
                })
            }
            TokenKind::Keyword(Keyword::Action) => {
                let def = self.parse_action_def(pos)?;
                Ok(Expr::ActionLiteral(def))
            }
            TokenKind::Keyword(Keyword::Lambda) => self.parse_lambda(pos),
            TokenKind::Keyword(Keyword::If) => self.parse_if_expr(pos),
            other => Err(RunError::syntax(
                pos,
                format!("expected expression, found {}", other.describe()),
            )),
        }
    }

    /// `lambda(x, y) -> expr` or the single-parameter `lambda x -> expr`.
    fn parse_lambda(&mut self, pos: Pos) -> RunResult<Expr> {
        self.cur.next();
        let params = if self.cur.peek().kind == TokenKind::LParen {
            self.parse_params()?
        } else {
            vec![self.expect_ident("lambda parameter")?]
        };
        self.expect(&TokenKind::Arrow)?;
        let body = self.parse_assign()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
            id: self.fn_id(),
            meta: self.meta(pos),
        })
    }

    fn parse_if_expr(&mut self, pos: Pos) -> RunResult<Expr> {
        self.cur.next();
        let cond = self.parse_expr()?;
        let then_block = self.parse_block(pos.col)?;
        self.cur.skip_newlines();
        let else_block = if self.cur.eat_keyword(Keyword::Else) {
            self.parse_block(pos.col)?
        } else {
            Block { stmts: Vec::new() }
        };
        Ok(Expr::IfExpression {
            cond: Box::new(cond),
            then_block,
            else_block,
            meta: self.meta(pos),
        })
    }

    /// Map entries after the opening `{`: `,` or `;` separators, trailing
    /// separators allowed, bare identifier keys coerced to strings.
    fn parse_map_entries(&mut self) -> RunResult<Vec<(String, Expr)>> {
        let mut entries = Vec::new();
        loop {
            self.cur.skip_separators();
            if self.cur.eat(&TokenKind::RBrace) {
                break;
            }
            if self.cur.at_end() {
                self.diagnostics.push(Diagnostic::new(
                    crate::error::ErrorKind::SyntaxError,
                    "unterminated map literal",
                    self.cur.pos(),
                    RecoveryAction::ClosedBlock,
                ));
                break;
            }
            self.ctx.push(Ctx::MapEntry);
            let entry = self.parse_map_entry();
            self.ctx.pop();
            match entry {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    self.recover(err);
                    continue;
                }
            }
            // Separators between entries: ',' or ';', or a bare newline.
            if !(self.cur.eat(&TokenKind::Comma) || self.cur.eat(&TokenKind::Semicolon)) {
                let had_newline = self.cur.peek().is_newline();
                self.cur.skip_newlines();
                if self.cur.eat(&TokenKind::RBrace) {
                    break;
                }
                if self.cur.at_end() {
                    continue;
                }
                if !had_newline {
                    self.diagnostics.push(Diagnostic::new(
                        crate::error::ErrorKind::SyntaxError,
                        "missing separator between map entries",
                        self.cur.pos(),
                        RecoveryAction::None,
                    ));
                }
            }
        }
        Ok(entries)
    }

    fn parse_map_entry(&mut self) -> RunResult<(String, Expr)> {
        let tok = self.cur.peek();
        let key = match &tok.kind {
            TokenKind::Str(s) => {
                let key = s.clone();
                self.cur.next();
                key
            }
            TokenKind::Ident => {
                let key = tok.lexeme.to_string();
                self.cur.next();
                key
            }
            other => {
                return Err(RunError::syntax(
                    tok.pos,
                    format!("expected map key, found {}", other.describe()),
                ));
            }
        };
        self.expect(&TokenKind::Colon)?;
        self.cur.skip_newlines();
        let value = self.parse_expr()?;
        Ok((key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::sexpr;

    fn parse_clean(src: &str) -> Program {
        let outcome = parse(src);
        assert!(
            outcome.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            outcome.diagnostics
        );
        outcome.program
    }

    #[test]
    fn parses_let_and_print() {
        let program = parse_clean("let x = 1 + 2 * 3\nprint(x)");
        assert_eq!(program.stmts.len(), 2);
        assert!(sexpr(&program).contains("(+ 1 (* 2 3))"));
    }

    #[test]
    fn map_tolerances() {
        let program = parse_clean("let m = { \"a\": 1, b: 2; c: 3, }");
        let shape = sexpr(&program);
        assert!(shape.contains("(map (a 1) (b 2) (c 3))"), "{shape}");
    }

    #[test]
    fn catch_forms_are_equivalent() {
        for src in [
            "try { x } catch err { y }",
            "try { x } catch(err) { y }",
            "try { x } catch((err)) { y }",
        ] {
            let program = parse_clean(src);
            assert!(sexpr(&program).contains("catch err"), "{src}");
        }
    }

    #[test]
    fn lambda_short_form() {
        let a = sexpr(&parse_clean("let f = lambda x -> x * 2"));
        let b = sexpr(&parse_clean("let f = lambda(x) -> x * 2"));
        assert_eq!(a, b);
    }

    #[test]
    fn colon_block_single_line() {
        let program = parse_clean("if x: print(x)");
        assert!(sexpr(&program).contains("(if x (block (print x)))"));
    }

    #[test]
    fn colon_block_indented() {
        let src = "if x:\n    print(x)\n    print(x)\nlet y = 1";
        let program = parse_clean(src);
        assert_eq!(program.stmts.len(), 2);
        let shape = sexpr(&program);
        assert!(shape.contains("(if x (block (print x) (print x)))"), "{shape}");
    }

    #[test]
    fn recovery_produces_malformed_and_continues() {
        let outcome = parse("let = 5\nprint(2)");
        assert!(!outcome.diagnostics.is_empty());
        assert_eq!(outcome.program.stmts.len(), 2);
        assert!(matches!(outcome.program.stmts[0], Stmt::Malformed { .. }));
        assert!(matches!(outcome.program.stmts[1], Stmt::Print { .. }));
    }

    #[test]
    fn always_yields_a_program() {
        for src in ["}}}{{{", "let", "if { } } else", "action ( ] )", ""] {
            let outcome = parse(src);
            let _ = outcome.program;
        }
    }

    #[test]
    fn fallback_parser_accepts_the_same_programs() {
        crate::config::set_advanced_parsing(false);
        let program = parse_clean("let x = 1\nif x { print(string(x)) }\nlet m = { a: 1 }");
        crate::config::set_advanced_parsing(true);
        let with_structure = parse_clean("let x = 1\nif x { print(string(x)) }\nlet m = { a: 1 }");
        assert_eq!(sexpr(&program), sexpr(&with_structure));
    }

    #[test]
    fn stray_semicolons_are_ignored() {
        let program = parse_clean(";;let x = 1;;print(x);");
        assert_eq!(program.stmts.len(), 2);
    }

    #[test]
    fn method_call_and_property() {
        let shape = sexpr(&parse_clean("let d = nums.map(lambda(n) -> n * 2)\nlet k = e.x"));
        assert!(shape.contains("(method nums map (lambda [n] (* n 2)))"), "{shape}");
        assert!(shape.contains("(prop e x)"), "{shape}");
    }

    #[test]
    fn emit_payload() {
        let shape = sexpr(&parse_clean("emit E { x: 7 }"));
        assert!(shape.contains("(emit E (x 7))"), "{shape}");
    }
}
