//! The two parallel AST node sets.
//!
//! Shared constructs keep identical names across the interpreter AST and
//! the compiler AST. Rather than maintaining two hand-written node sets,
//! the nodes are generic over a metadata type: the interpreter AST attaches
//! a source position plus an optional parse-recovery note to every node,
//! while the compiler AST carries only the position. Structural equality of
//! the two layouts is therefore guaranteed by construction; [`sexpr`]
//! renders the metadata-independent shape used by the equivalence tests.

pub mod compile;
pub mod interp;

use std::fmt::{Debug, Write};

use num_bigint::BigInt;

/// Binary operators, shared by both node sets and the bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    /// Short-circuiting; lowered to jumps by the emitter.
    And,
    Or,
}

impl BinOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "!",
        }
    }
}

/// Node metadata carried by a concrete AST layout.
pub trait AstMeta: Clone + Debug + PartialEq {}

/// A whole program: an ordered sequence of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program<M: AstMeta> {
    pub stmts: Vec<Stmt<M>>,
}

/// A brace- or colon-delimited statement sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Block<M: AstMeta> {
    pub stmts: Vec<Stmt<M>>,
}

/// A named or anonymous user function.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDef<M: AstMeta> {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Block<M>,
    pub is_async: bool,
    /// Parser-assigned id; the semantic analyzer keys capture lists on it.
    pub id: u32,
    pub meta: M,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt<M: AstMeta> {
    Let {
        name: String,
        value: Expr<M>,
        meta: M,
    },
    Return {
        value: Option<Expr<M>>,
        meta: M,
    },
    ExpressionStatement {
        expr: Expr<M>,
        meta: M,
    },
    Block(Block<M>),
    Print {
        expr: Expr<M>,
        meta: M,
    },
    ForEach {
        var: String,
        iterable: Expr<M>,
        body: Block<M>,
        meta: M,
    },
    If {
        cond: Expr<M>,
        then_block: Block<M>,
        else_block: Option<Block<M>>,
        meta: M,
    },
    While {
        cond: Expr<M>,
        body: Block<M>,
        meta: M,
    },
    TryCatch {
        body: Block<M>,
        err_var: String,
        handler: Block<M>,
        meta: M,
    },
    Action(ActionDef<M>),
    Event {
        name: String,
        fields: Vec<String>,
        meta: M,
    },
    Emit {
        name: String,
        payload: Vec<(String, Expr<M>)>,
        meta: M,
    },
    Enum {
        name: String,
        variants: Vec<String>,
        meta: M,
    },
    Protocol {
        name: String,
        /// Required action signatures: name and arity.
        signatures: Vec<(String, usize)>,
        meta: M,
    },
    Contract {
        name: String,
        /// Protocol this contract claims to satisfy, if any.
        protocol: Option<String>,
        storage: Vec<(String, Expr<M>)>,
        actions: Vec<ActionDef<M>>,
        meta: M,
    },
    ExternalDeclaration {
        name: String,
        source: Option<String>,
        meta: M,
    },
    Export {
        inner: Box<Stmt<M>>,
        meta: M,
    },
    Debug {
        message: Expr<M>,
        value: Option<Expr<M>>,
        meta: M,
    },
    Use {
        module: String,
        alias: Option<String>,
        meta: M,
    },
    /// `from <module> use <names...>`: binds selected module members.
    Import {
        module: String,
        names: Vec<String>,
        meta: M,
    },
    ScreenDef {
        name: String,
        props: Vec<(String, Expr<M>)>,
        meta: M,
    },
    ComponentDef {
        name: String,
        props: Vec<(String, Expr<M>)>,
        meta: M,
    },
    ThemeDef {
        name: String,
        props: Vec<(String, Expr<M>)>,
        meta: M,
    },
    /// `persistent storage NAME { ... }`: sugar for a map-typed binding.
    PersistentStorage {
        name: String,
        fields: Vec<(String, Expr<M>)>,
        meta: M,
    },
    Require {
        cond: Expr<M>,
        meta: M,
    },
    /// Reserved; evaluating it raises `SyntaxError`.
    Exactly {
        meta: M,
    },
    /// A recovered region the tolerant parser dropped tokens from.
    /// Only the interpreter AST ever contains this.
    Malformed {
        note: String,
        meta: M,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr<M: AstMeta> {
    Identifier {
        name: String,
        meta: M,
    },
    Integer {
        value: BigInt,
        meta: M,
    },
    Float {
        value: f64,
        meta: M,
    },
    Str {
        value: String,
        meta: M,
    },
    Bool {
        value: bool,
        meta: M,
    },
    Null {
        meta: M,
    },
    ListLiteral {
        items: Vec<Expr<M>>,
        meta: M,
    },
    /// Keys are coerced to strings at parse time (string literals or bare
    /// identifiers).
    MapLiteral {
        entries: Vec<(String, Expr<M>)>,
        meta: M,
    },
    /// Anonymous `action(params) { ... }`.
    ActionLiteral(ActionDef<M>),
    /// `lambda(x) -> expr` or `lambda x -> expr`.
    Lambda {
        params: Vec<String>,
        body: Box<Expr<M>>,
        id: u32,
        meta: M,
    },
    Call {
        callee: Box<Expr<M>>,
        args: Vec<Expr<M>>,
        meta: M,
    },
    MethodCall {
        receiver: Box<Expr<M>>,
        name: String,
        args: Vec<Expr<M>>,
        meta: M,
    },
    PropertyAccess {
        receiver: Box<Expr<M>>,
        name: String,
        meta: M,
    },
    Index {
        receiver: Box<Expr<M>>,
        index: Box<Expr<M>>,
        meta: M,
    },
    Assignment {
        target: Box<Expr<M>>,
        value: Box<Expr<M>>,
        meta: M,
    },
    Prefix {
        op: UnOp,
        expr: Box<Expr<M>>,
        meta: M,
    },
    Infix {
        op: BinOp,
        left: Box<Expr<M>>,
        right: Box<Expr<M>>,
        meta: M,
    },
    /// `if` in expression position; the value of a branch block is the
    /// value of its trailing expression statement, else null.
    IfExpression {
        cond: Box<Expr<M>>,
        then_block: Block<M>,
        else_block: Block<M>,
        meta: M,
    },
    Await {
        expr: Box<Expr<M>>,
        meta: M,
    },
    EmbeddedLiteral {
        language: String,
        text: String,
        meta: M,
    },
}

// --- shape printing -------------------------------------------------------

/// Renders the metadata-independent shape of a program as an s-expression.
///
/// Two programs parsed by the tolerant and production parsers compare equal
/// here exactly when they have the same shape, literal values, and binding
/// names.
#[must_use]
pub fn sexpr<M: AstMeta>(program: &Program<M>) -> String {
    let mut out = String::new();
    out.push_str("(program");
    for stmt in &program.stmts {
        out.push(' ');
        stmt_sexpr(stmt, &mut out);
    }
    out.push(')');
    out
}

fn block_sexpr<M: AstMeta>(block: &Block<M>, out: &mut String) {
    out.push_str("(block");
    for stmt in &block.stmts {
        out.push(' ');
        stmt_sexpr(stmt, out);
    }
    out.push(')');
}

fn action_sexpr<M: AstMeta>(def: &ActionDef<M>, out: &mut String) {
    let _ = write!(
        out,
        "(action {} async={} [{}] ",
        def.name.as_deref().unwrap_or("_"),
        def.is_async,
        def.params.join(" ")
    );
    block_sexpr(&def.body, out);
    out.push(')');
}

fn pairs_sexpr<M: AstMeta>(pairs: &[(String, Expr<M>)], out: &mut String) {
    for (key, value) in pairs {
        let _ = write!(out, " ({key} ");
        expr_sexpr(value, out);
        out.push(')');
    }
}

fn stmt_sexpr<M: AstMeta>(stmt: &Stmt<M>, out: &mut String) {
    match stmt {
        Stmt::Let { name, value, .. } => {
            let _ = write!(out, "(let {name} ");
            expr_sexpr(value, out);
            out.push(')');
        }
        Stmt::Return { value, .. } => {
            out.push_str("(return");
            if let Some(value) = value {
                out.push(' ');
                expr_sexpr(value, out);
            }
            out.push(')');
        }
        Stmt::ExpressionStatement { expr, .. } => {
            out.push_str("(expr ");
            expr_sexpr(expr, out);
            out.push(')');
        }
        Stmt::Block(block) => block_sexpr(block, out),
        Stmt::Print { expr, .. } => {
            out.push_str("(print ");
            expr_sexpr(expr, out);
            out.push(')');
        }
        Stmt::ForEach { var, iterable, body, .. } => {
            let _ = write!(out, "(for-each {var} ");
            expr_sexpr(iterable, out);
            out.push(' ');
            block_sexpr(body, out);
            out.push(')');
        }
        Stmt::If {
            cond,
            then_block,
            else_block,
            ..
        } => {
            out.push_str("(if ");
            expr_sexpr(cond, out);
            out.push(' ');
            block_sexpr(then_block, out);
            if let Some(else_block) = else_block {
                out.push(' ');
                block_sexpr(else_block, out);
            }
            out.push(')');
        }
        Stmt::While { cond, body, .. } => {
            out.push_str("(while ");
            expr_sexpr(cond, out);
            out.push(' ');
            block_sexpr(body, out);
            out.push(')');
        }
        Stmt::TryCatch {
            body, err_var, handler, ..
        } => {
            out.push_str("(try ");
            block_sexpr(body, out);
            let _ = write!(out, " catch {err_var} ");
            block_sexpr(handler, out);
            out.push(')');
        }
        Stmt::Action(def) => action_sexpr(def, out),
        Stmt::Event { name, fields, .. } => {
            let _ = write!(out, "(event {name} [{}])", fields.join(" "));
        }
        Stmt::Emit { name, payload, .. } => {
            let _ = write!(out, "(emit {name}");
            pairs_sexpr(payload, out);
            out.push(')');
        }
        Stmt::Enum { name, variants, .. } => {
            let _ = write!(out, "(enum {name} [{}])", variants.join(" "));
        }
        Stmt::Protocol { name, signatures, .. } => {
            let _ = write!(out, "(protocol {name}");
            for (sig_name, arity) in signatures {
                let _ = write!(out, " {sig_name}/{arity}");
            }
            out.push(')');
        }
        Stmt::Contract {
            name,
            protocol,
            storage,
            actions,
            ..
        } => {
            let _ = write!(out, "(contract {name}");
            if let Some(protocol) = protocol {
                let _ = write!(out, " : {protocol}");
            }
            pairs_sexpr(storage, out);
            for action in actions {
                out.push(' ');
                action_sexpr(action, out);
            }
            out.push(')');
        }
        Stmt::ExternalDeclaration { name, source, .. } => {
            let _ = write!(out, "(external {name}");
            if let Some(source) = source {
                let _ = write!(out, " from {source:?}");
            }
            out.push(')');
        }
        Stmt::Export { inner, .. } => {
            out.push_str("(export ");
            stmt_sexpr(inner, out);
            out.push(')');
        }
        Stmt::Debug { message, value, .. } => {
            out.push_str("(debug ");
            expr_sexpr(message, out);
            if let Some(value) = value {
                out.push(' ');
                expr_sexpr(value, out);
            }
            out.push(')');
        }
        Stmt::Use { module, alias, .. } => {
            let _ = write!(out, "(use {module}");
            if let Some(alias) = alias {
                let _ = write!(out, " as {alias}");
            }
            out.push(')');
        }
        Stmt::Import { module, names, .. } => {
            let _ = write!(out, "(import {module} [{}])", names.join(" "));
        }
        Stmt::ScreenDef { name, props, .. } => {
            let _ = write!(out, "(screen {name}");
            pairs_sexpr(props, out);
            out.push(')');
        }
        Stmt::ComponentDef { name, props, .. } => {
            let _ = write!(out, "(component {name}");
            pairs_sexpr(props, out);
            out.push(')');
        }
        Stmt::ThemeDef { name, props, .. } => {
            let _ = write!(out, "(theme {name}");
            pairs_sexpr(props, out);
            out.push(')');
        }
        Stmt::PersistentStorage { name, fields, .. } => {
            let _ = write!(out, "(storage {name}");
            pairs_sexpr(fields, out);
            out.push(')');
        }
        Stmt::Require { cond, .. } => {
            out.push_str("(require ");
            expr_sexpr(cond, out);
            out.push(')');
        }
        Stmt::Exactly { .. } => out.push_str("(exactly)"),
        Stmt::Malformed { .. } => out.push_str("(malformed)"),
    }
}

fn expr_sexpr<M: AstMeta>(expr: &Expr<M>, out: &mut String) {
    match expr {
        Expr::Identifier { name, .. } => out.push_str(name),
        Expr::Integer { value, .. } => {
            let _ = write!(out, "{value}");
        }
        Expr::Float { value, .. } => {
            let _ = write!(out, "{value:?}");
        }
        Expr::Str { value, .. } => {
            let _ = write!(out, "{value:?}");
        }
        Expr::Bool { value, .. } => {
            let _ = write!(out, "{value}");
        }
        Expr::Null { .. } => out.push_str("null"),
        Expr::ListLiteral { items, .. } => {
            out.push_str("(list");
            for item in items {
                out.push(' ');
                expr_sexpr(item, out);
            }
            out.push(')');
        }
        Expr::MapLiteral { entries, .. } => {
            out.push_str("(map");
            pairs_sexpr(entries, out);
            out.push(')');
        }
        Expr::ActionLiteral(def) => action_sexpr(def, out),
        Expr::Lambda { params, body, .. } => {
            let _ = write!(out, "(lambda [{}] ", params.join(" "));
            expr_sexpr(body, out);
            out.push(')');
        }
        Expr::Call { callee, args, .. } => {
            out.push_str("(call ");
            expr_sexpr(callee, out);
            for arg in args {
                out.push(' ');
                expr_sexpr(arg, out);
            }
            out.push(')');
        }
        Expr::MethodCall {
            receiver, name, args, ..
        } => {
            out.push_str("(method ");
            expr_sexpr(receiver, out);
            let _ = write!(out, " {name}");
            for arg in args {
                out.push(' ');
                expr_sexpr(arg, out);
            }
            out.push(')');
        }
        Expr::PropertyAccess { receiver, name, .. } => {
            out.push_str("(prop ");
            expr_sexpr(receiver, out);
            let _ = write!(out, " {name})");
        }
        Expr::Index { receiver, index, .. } => {
            out.push_str("(index ");
            expr_sexpr(receiver, out);
            out.push(' ');
            expr_sexpr(index, out);
            out.push(')');
        }
        Expr::Assignment { target, value, .. } => {
            out.push_str("(assign ");
            expr_sexpr(target, out);
            out.push(' ');
            expr_sexpr(value, out);
            out.push(')');
        }
        Expr::Prefix { op, expr, .. } => {
            let _ = write!(out, "({} ", op.symbol());
            expr_sexpr(expr, out);
            out.push(')');
        }
        Expr::Infix { op, left, right, .. } => {
            let _ = write!(out, "({} ", op.symbol());
            expr_sexpr(left, out);
            out.push(' ');
            expr_sexpr(right, out);
            out.push(')');
        }
        Expr::IfExpression {
            cond,
            then_block,
            else_block,
            ..
        } => {
            out.push_str("(if-expr ");
            expr_sexpr(cond, out);
            out.push(' ');
            block_sexpr(then_block, out);
            out.push(' ');
            block_sexpr(else_block, out);
            out.push(')');
        }
        Expr::Await { expr, .. } => {
            out.push_str("(await ");
            expr_sexpr(expr, out);
            out.push(')');
        }
        Expr::EmbeddedLiteral { language, .. } => {
            let _ = write!(out, "(embedded {language})");
        }
    }
}
