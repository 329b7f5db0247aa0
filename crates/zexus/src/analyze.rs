//! Semantic analysis over the compiler AST.
//!
//! A single pass builds a nested symbol table, resolves identifiers
//! (local / outer / global / builtin), classifies the free variables of
//! inner action bodies as captures, validates async/return/emit/export
//! usage and protocol conformance, and collects the declared events and
//! enums into the program header. Errors accumulate; bytecode emission
//! proceeds only if the error list is empty.

use std::{rc::Rc, str::FromStr};

use ahash::{AHashMap, AHashSet};

use crate::{
    ast::compile as ca,
    builtins::Builtin,
    error::RunError,
    events::EventDescriptor,
};

/// Output of the analysis pass: the program header plus capture lists.
#[derive(Debug, Default)]
pub(crate) struct Analysis {
    /// Captured free variables per action/lambda node id, sorted by name.
    pub captures: AHashMap<u32, Vec<String>>,
    /// Declared events, in declaration order.
    pub events: Vec<Rc<EventDescriptor>>,
    /// Declared enums, in declaration order.
    pub enums: Vec<(String, Vec<String>)>,
    /// Declared protocols, in declaration order.
    pub protocols: Vec<(String, Vec<(String, usize)>)>,
    pub errors: Vec<RunError>,
}

/// Analyzes a program; `Err` carries the first error when any accumulated.
pub(crate) fn analyze(program: &ca::Program) -> Result<Analysis, Vec<RunError>> {
    let mut analyzer = Analyzer::default();
    analyzer.collect_declarations(program);
    analyzer.push_scope(ScopeKind::Global);
    analyzer.hoist_block(&program.stmts);
    for stmt in &program.stmts {
        analyzer.stmt(stmt, true);
    }
    analyzer.pop_scope();
    if analyzer.out.errors.is_empty() {
        Ok(analyzer.out)
    } else {
        Err(analyzer.out.errors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Global,
    /// An action/lambda boundary carrying the node id and async flag.
    Function { id: u32, is_async: bool },
    Block,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    names: AHashSet<String>,
}

#[derive(Default)]
struct Analyzer {
    scopes: Vec<Scope>,
    protocols: AHashMap<String, Vec<(String, usize)>>,
    declared_events: AHashSet<String>,
    out: Analysis,
}

impl Analyzer {
    /// Pre-collects top-level event/enum/protocol declarations so emit and
    /// conformance checks are order-insensitive.
    fn collect_declarations(&mut self, program: &ca::Program) {
        for stmt in &program.stmts {
            let stmt = unwrap_export(stmt);
            match stmt {
                ca::Stmt::Event { name, fields, .. } => {
                    self.declared_events.insert(name.clone());
                    self.out.events.push(Rc::new(EventDescriptor {
                        name: Rc::from(name.as_str()),
                        fields: fields.iter().map(|f| Rc::from(f.as_str())).collect(),
                    }));
                }
                ca::Stmt::Enum { name, variants, .. } => {
                    self.out.enums.push((name.clone(), variants.clone()));
                }
                ca::Stmt::Protocol { name, signatures, .. } => {
                    self.protocols.insert(name.clone(), signatures.clone());
                    self.out.protocols.push((name.clone(), signatures.clone()));
                }
                _ => {}
            }
        }
    }

    fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            names: AHashSet::new(),
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name.to_owned());
        }
    }

    fn error(&mut self, err: RunError) {
        self.out.errors.push(err);
    }

    fn in_function(&self) -> bool {
        self.scopes
            .iter()
            .any(|s| matches!(s.kind, ScopeKind::Function { .. }))
    }

    fn in_async_context(&self) -> bool {
        for scope in self.scopes.iter().rev() {
            if let ScopeKind::Function { is_async, .. } = scope.kind {
                return is_async;
            }
        }
        // Module top level runs as the main task, which may await.
        true
    }

    /// Hoists the names a statement list binds, so forward references
    /// between sibling statements (mutually recursive actions) resolve.
    fn hoist_block(&mut self, stmts: &[ca::Stmt]) {
        for stmt in stmts {
            let stmt = unwrap_export(stmt);
            match stmt {
                ca::Stmt::Let { name, .. }
                | ca::Stmt::Enum { name, .. }
                | ca::Stmt::Event { name, .. }
                | ca::Stmt::Contract { name, .. }
                | ca::Stmt::PersistentStorage { name, .. }
                | ca::Stmt::ExternalDeclaration { name, .. } => self.declare(name),
                ca::Stmt::Action(def) => {
                    if let Some(name) = &def.name {
                        let name = name.clone();
                        self.declare(&name);
                    }
                }
                ca::Stmt::Use { module, alias, .. } => {
                    let bind_as = alias.clone().unwrap_or_else(|| module.clone());
                    self.declare(&bind_as);
                }
                ca::Stmt::Import { names, .. } => {
                    for name in names.clone() {
                        self.declare(&name);
                    }
                }
                _ => {}
            }
        }
    }

    /// Resolves an identifier, recording captures along the way.
    fn resolve(&mut self, name: &str, err: impl FnOnce() -> RunError) {
        // Walk inner to outer; remember the function boundaries crossed.
        let mut crossed: Vec<u32> = Vec::new();
        for scope in self.scopes.iter().rev() {
            if scope.names.contains(name) {
                // Bound. A hit below any crossed function boundary in a
                // non-global scope is a capture for every crossed function.
                if scope.kind != ScopeKind::Global && !crossed.is_empty() {
                    for id in &crossed {
                        let captures = self.out.captures.entry(*id).or_default();
                        if !captures.iter().any(|c| c == name) {
                            captures.push(name.to_owned());
                            captures.sort();
                        }
                    }
                }
                return;
            }
            if let ScopeKind::Function { id, .. } = scope.kind {
                crossed.push(id);
            }
        }
        if Builtin::from_str(name).is_ok() {
            return;
        }
        self.error(err());
    }

    fn stmt(&mut self, stmt: &ca::Stmt, top_level: bool) {
        match stmt {
            ca::Stmt::Let { name, value, .. } => {
                self.expr(value);
                self.declare(name);
            }
            ca::Stmt::Return { value, meta } => {
                if !self.in_function() {
                    self.error(RunError::semantic(meta.pos, "'return' outside of an action"));
                }
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            ca::Stmt::ExpressionStatement { expr, .. } => self.expr(expr),
            ca::Stmt::Block(block) => self.block(block),
            ca::Stmt::Print { expr, .. } => self.expr(expr),
            ca::Stmt::ForEach {
                var, iterable, body, ..
            } => {
                self.expr(iterable);
                self.push_scope(ScopeKind::Block);
                self.declare(var);
                self.hoist_block(&body.stmts);
                for stmt in &body.stmts {
                    self.stmt(stmt, false);
                }
                self.pop_scope();
            }
            ca::Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.expr(cond);
                self.block(then_block);
                if let Some(else_block) = else_block {
                    self.block(else_block);
                }
            }
            ca::Stmt::While { cond, body, .. } => {
                self.expr(cond);
                self.block(body);
            }
            ca::Stmt::TryCatch {
                body, err_var, handler, ..
            } => {
                self.block(body);
                self.push_scope(ScopeKind::Block);
                self.declare(err_var);
                self.hoist_block(&handler.stmts);
                for stmt in &handler.stmts {
                    self.stmt(stmt, false);
                }
                self.pop_scope();
            }
            ca::Stmt::Action(def) => {
                if let Some(name) = &def.name {
                    self.declare(name);
                }
                self.action(def);
            }
            ca::Stmt::Event { name, .. } => self.declare(name),
            ca::Stmt::Emit { name, payload, meta } => {
                if !self.declared_events.contains(name) {
                    self.error(RunError::semantic(
                        meta.pos,
                        format!("emit of undeclared event '{name}'"),
                    ));
                }
                for (_, value) in payload {
                    self.expr(value);
                }
            }
            ca::Stmt::Enum { name, .. } => self.declare(name),
            ca::Stmt::Protocol { .. } => {}
            ca::Stmt::Contract {
                name,
                protocol,
                storage,
                actions,
                meta,
            } => {
                for (_, value) in storage {
                    self.expr(value);
                }
                for def in actions {
                    self.action(def);
                }
                if let Some(protocol) = protocol {
                    match self.protocols.get(protocol) {
                        None => {
                            self.error(RunError::semantic(
                                meta.pos,
                                format!("unknown protocol '{protocol}'"),
                            ));
                        }
                        Some(signatures) => {
                            for (sig_name, arity) in signatures.clone() {
                                let found = actions.iter().any(|def| {
                                    def.name.as_deref() == Some(sig_name.as_str())
                                        && def.params.len() == arity
                                });
                                if !found {
                                    self.error(RunError::semantic(
                                        meta.pos,
                                        format!(
                                            "contract '{name}' does not satisfy '{protocol}': missing action {sig_name}/{arity}"
                                        ),
                                    ));
                                }
                            }
                        }
                    }
                }
                self.declare(name);
            }
            ca::Stmt::ExternalDeclaration { name, .. } => self.declare(name),
            ca::Stmt::Export { inner, meta } => {
                if !top_level {
                    self.error(RunError::semantic(meta.pos, "export must be a top-level binding"));
                }
                if binding_name(inner).is_none() {
                    self.error(RunError::semantic(meta.pos, "export requires a binding statement"));
                }
                self.stmt(inner, top_level);
            }
            ca::Stmt::Debug { message, value, .. } => {
                self.expr(message);
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            ca::Stmt::Use { module, alias, .. } => {
                let bind_as = alias.clone().unwrap_or_else(|| module.clone());
                self.declare(&bind_as);
            }
            ca::Stmt::Import { names, .. } => {
                for name in names {
                    self.declare(name);
                }
            }
            ca::Stmt::ScreenDef { props, .. }
            | ca::Stmt::ComponentDef { props, .. }
            | ca::Stmt::ThemeDef { props, .. } => {
                for (_, value) in props {
                    self.expr(value);
                }
            }
            ca::Stmt::PersistentStorage { name, fields, .. } => {
                for (_, value) in fields {
                    self.expr(value);
                }
                self.declare(name);
            }
            ca::Stmt::Require { cond, .. } => self.expr(cond),
            ca::Stmt::Exactly { meta } => {
                // Reserved keyword with undefined semantics; surfaced here
                // rather than at parse time so both parsers accept the node.
                self.error(RunError::syntax(meta.pos, "'exactly' is reserved"));
            }
            ca::Stmt::Malformed { note, meta } => {
                self.error(RunError::semantic(meta.pos, format!("unparsed region: {note}")));
            }
        }
    }

    fn block(&mut self, block: &ca::Block) {
        self.push_scope(ScopeKind::Block);
        self.hoist_block(&block.stmts);
        for stmt in &block.stmts {
            self.stmt(stmt, false);
        }
        self.pop_scope();
    }

    fn action(&mut self, def: &ca::ActionDef) {
        self.push_scope(ScopeKind::Function {
            id: def.id,
            is_async: def.is_async,
        });
        for param in &def.params {
            self.declare(param);
        }
        self.hoist_block(&def.body.stmts);
        for stmt in &def.body.stmts {
            self.stmt(stmt, false);
        }
        self.pop_scope();
        self.out.captures.entry(def.id).or_default();
    }

    fn expr(&mut self, expr: &ca::Expr) {
        match expr {
            ca::Expr::Identifier { name, meta } => {
                let (name_owned, pos) = (name.clone(), meta.pos);
                self.resolve(name, move || {
                    RunError::semantic(pos, format!("unresolved name '{name_owned}'"))
                });
            }
            ca::Expr::Integer { .. }
            | ca::Expr::Float { .. }
            | ca::Expr::Str { .. }
            | ca::Expr::Bool { .. }
            | ca::Expr::Null { .. }
            | ca::Expr::EmbeddedLiteral { .. } => {}
            ca::Expr::ListLiteral { items, .. } => {
                for item in items {
                    self.expr(item);
                }
            }
            ca::Expr::MapLiteral { entries, .. } => {
                for (_, value) in entries {
                    self.expr(value);
                }
            }
            ca::Expr::ActionLiteral(def) => self.action(def),
            ca::Expr::Lambda { params, body, id, .. } => {
                self.push_scope(ScopeKind::Function {
                    id: *id,
                    is_async: false,
                });
                for param in params {
                    self.declare(param);
                }
                self.expr(body);
                self.pop_scope();
                self.out.captures.entry(*id).or_default();
            }
            ca::Expr::Call { callee, args, .. } => {
                self.expr(callee);
                for arg in args {
                    self.expr(arg);
                }
            }
            ca::Expr::MethodCall { receiver, args, .. } => {
                self.expr(receiver);
                for arg in args {
                    self.expr(arg);
                }
            }
            ca::Expr::PropertyAccess { receiver, .. } => self.expr(receiver),
            ca::Expr::Index { receiver, index, .. } => {
                self.expr(receiver);
                self.expr(index);
            }
            ca::Expr::Assignment { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            ca::Expr::Prefix { expr, .. } => self.expr(expr),
            ca::Expr::Infix { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ca::Expr::IfExpression {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.expr(cond);
                self.block(then_block);
                self.block(else_block);
            }
            ca::Expr::Await { expr, meta } => {
                if !self.in_async_context() {
                    self.error(RunError::semantic(
                        meta.pos,
                        "'await' outside of an 'action async' body",
                    ));
                }
                self.expr(expr);
            }
        }
    }
}

fn unwrap_export(stmt: &ca::Stmt) -> &ca::Stmt {
    match stmt {
        ca::Stmt::Export { inner, .. } => unwrap_export(inner),
        other => other,
    }
}

/// The name a statement binds, mirroring the evaluator's export rule.
fn binding_name(stmt: &ca::Stmt) -> Option<&str> {
    match stmt {
        ca::Stmt::Let { name, .. }
        | ca::Stmt::Enum { name, .. }
        | ca::Stmt::Contract { name, .. }
        | ca::Stmt::Event { name, .. }
        | ca::Stmt::PersistentStorage { name, .. }
        | ca::Stmt::ExternalDeclaration { name, .. } => Some(name),
        ca::Stmt::Action(def) => def.name.as_deref(),
        ca::Stmt::Export { inner, .. } => binding_name(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::strict;

    fn run(src: &str) -> Result<Analysis, Vec<RunError>> {
        analyze(&strict::parse(src).unwrap())
    }

    #[test]
    fn resolves_builtins_and_locals() {
        assert!(run("let x = 1\nprint(string(x))").is_ok());
    }

    #[test]
    fn unresolved_name_is_an_error() {
        let errors = run("print(string(missing))").unwrap_err();
        assert!(errors[0].message.contains("unresolved name 'missing'"));
    }

    #[test]
    fn captures_recorded_for_closures() {
        let analysis = run("action make() { let c = 0 action inc() { c = c + 1 return c } return inc }").unwrap();
        let captured: Vec<_> = analysis.captures.values().filter(|v| !v.is_empty()).collect();
        assert_eq!(captured, vec![&vec!["c".to_owned()]]);
    }

    #[test]
    fn await_requires_async_action() {
        assert!(run("action f() { return await g() }\naction async g() { return 1 }").is_err());
        assert!(run("action async f() { return await g() }\naction async g() { return 1 }").is_ok());
    }

    #[test]
    fn emit_requires_declared_event() {
        assert!(run("emit E { x: 1 }").is_err());
        assert!(run("event E { x: integer }\nemit E { x: 1 }").is_ok());
    }

    #[test]
    fn return_outside_action_is_an_error() {
        assert!(run("return 1").is_err());
    }

    #[test]
    fn exactly_is_reported_as_a_syntax_error() {
        let errors = run("exactly 3 of x").unwrap_err();
        assert_eq!(errors[0].kind, crate::error::ErrorKind::SyntaxError);
        assert!(errors[0].message.contains("exactly"));
    }

    #[test]
    fn protocol_conformance() {
        let ok = run("protocol P { action f(a) }\ncontract C : P { action f(x) { return x } }");
        assert!(ok.is_ok());
        let missing = run("protocol P { action f(a) }\ncontract C : P { action g(x) { return x } }");
        assert!(missing.is_err());
    }

    #[test]
    fn export_must_be_top_level() {
        assert!(run("export let x = 1").is_ok());
        assert!(run("action f() { export let x = 1 }").is_err());
    }
}
