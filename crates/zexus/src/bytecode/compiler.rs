//! AST-to-bytecode emitter.
//!
//! Every expression leaves exactly one value on the stack; every statement
//! leaves zero. The last top-level expression statement becomes the
//! program result via a trailing `Return`.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    analyze::Analysis,
    ast::{BinOp, compile as ca},
    error::{ErrorKind, Pos, RunError, RunResult},
    value::Value,
};

use super::{
    builder::ChunkBuilder,
    code::{Chunk, Code, FuncDesc},
    op::Op,
};

/// Compiles an analyzed program.
pub(crate) fn compile(program: &ca::Program, analysis: &Analysis) -> RunResult<Code> {
    let mut compiler = Compiler {
        code: Code::default(),
        name_idx: AHashMap::new(),
        captures: &analysis.captures,
    };
    for descriptor in &analysis.events {
        compiler.code.events.push(Rc::clone(descriptor));
    }
    for (name, variants) in &analysis.enums {
        compiler.code.enums.push((
            Rc::from(name.as_str()),
            variants.iter().map(|v| Rc::from(v.as_str())).collect(),
        ));
    }
    for (name, signatures) in &analysis.protocols {
        compiler.code.protocols.push((
            Rc::from(name.as_str()),
            signatures
                .iter()
                .map(|(sig, arity)| (Rc::from(sig.as_str()), *arity))
                .collect(),
        ));
    }

    let mut b = ChunkBuilder::new();
    let last_expr = matches!(program.stmts.last(), Some(ca::Stmt::ExpressionStatement { .. }));
    for (i, stmt) in program.stmts.iter().enumerate() {
        if i + 1 == program.stmts.len()
            && let ca::Stmt::ExpressionStatement { expr, meta } = stmt
        {
            // The value of the final expression statement is the program
            // result.
            b.set_location(meta.pos);
            compiler.expr(&mut b, expr)?;
            continue;
        }
        compiler.stmt(&mut b, stmt)?;
    }
    if !last_expr {
        compiler.load_null(&mut b);
    }
    b.emit(Op::Return);
    compiler.code.top = b.build();
    Ok(compiler.code)
}

struct Compiler<'a> {
    code: Code,
    name_idx: AHashMap<Rc<str>, u32>,
    captures: &'a AHashMap<u32, Vec<String>>,
}

impl Compiler<'_> {
    fn name(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.name_idx.get(name) {
            return *idx;
        }
        let interned: Rc<str> = Rc::from(name);
        let idx = self.code.names.len() as u32;
        self.code.names.push(Rc::clone(&interned));
        self.name_idx.insert(interned, idx);
        idx
    }

    fn constant(&mut self, value: Value) -> u32 {
        let idx = self.code.consts.len() as u32;
        self.code.consts.push(value);
        idx
    }

    fn load_const(&mut self, b: &mut ChunkBuilder, value: Value) {
        let idx = self.constant(value);
        b.emit(Op::LoadConst(idx));
    }

    fn load_null(&mut self, b: &mut ChunkBuilder) {
        self.load_const(b, Value::Null);
    }

    // --- statements -------------------------------------------------------

    fn stmt(&mut self, b: &mut ChunkBuilder, stmt: &ca::Stmt) -> RunResult<()> {
        b.set_location(stmt.pos());
        match stmt {
            ca::Stmt::Let { name, value, .. } => {
                self.expr(b, value)?;
                let name = self.name(name);
                b.emit(Op::Store(name));
            }
            ca::Stmt::Return { value, .. } => {
                match value {
                    Some(value) => self.expr(b, value)?,
                    None => self.load_null(b),
                }
                b.emit(Op::Return);
            }
            ca::Stmt::ExpressionStatement { expr, .. } => {
                self.expr(b, expr)?;
                b.emit(Op::Pop);
            }
            ca::Stmt::Block(block) => {
                b.emit(Op::ScopePush);
                for stmt in &block.stmts {
                    self.stmt(b, stmt)?;
                }
                b.emit(Op::ScopePop);
            }
            ca::Stmt::Print { expr, .. } => {
                self.expr(b, expr)?;
                b.emit(Op::Print);
            }
            ca::Stmt::ForEach {
                var, iterable, body, ..
            } => self.for_each(b, var, iterable, body)?,
            ca::Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.expr(b, cond)?;
                let to_else = b.emit_jump(Op::JumpIfFalse(0));
                self.scoped_block(b, then_block)?;
                let to_end = b.emit_jump(Op::Jump(0));
                b.patch_jump(to_else);
                if let Some(else_block) = else_block {
                    self.scoped_block(b, else_block)?;
                }
                b.patch_jump(to_end);
            }
            ca::Stmt::While { cond, body, .. } => {
                let head = b.here();
                self.expr(b, cond)?;
                let to_end = b.emit_jump(Op::JumpIfFalse(0));
                self.scoped_block(b, body)?;
                b.emit(Op::Jump(head));
                b.patch_jump(to_end);
            }
            ca::Stmt::TryCatch {
                body, err_var, handler, ..
            } => {
                let err_name = self.name(err_var);
                let try_slot = b.emit_jump(Op::TryPush { handler: 0, err_name });
                self.scoped_block(b, body)?;
                b.emit(Op::TryPop);
                let to_end = b.emit_jump(Op::Jump(0));
                b.patch_jump(try_slot);
                // The VM enters the handler with a fresh scope holding the
                // error variable; the handler closes it.
                for stmt in &handler.stmts {
                    self.stmt(b, stmt)?;
                }
                b.emit(Op::ScopePop);
                b.patch_jump(to_end);
            }
            ca::Stmt::Action(def) => {
                let Some(name) = &def.name else {
                    return Err(RunError::internal("unnamed action in statement position"));
                };
                let func = self.function(def)?;
                let name = self.name(name);
                b.emit(Op::StoreFunc { name, func });
            }
            ca::Stmt::Event { name, .. } => {
                let name = self.name(name);
                b.emit(Op::RegisterEvent(name));
            }
            ca::Stmt::Emit { name, payload, .. } => {
                for (key, value) in payload {
                    self.load_const(b, Value::str(key));
                    self.expr(b, value)?;
                }
                b.emit(Op::MakeMap(payload.len() as u32));
                let name = self.name(name);
                b.emit(Op::EmitEvent(name));
            }
            ca::Stmt::Enum { name, variants, .. } => {
                let name = self.name(name);
                b.emit(Op::DefineEnum {
                    name,
                    variants: variants.len() as u32,
                });
            }
            ca::Stmt::Protocol { .. } => {
                // Header-only: consumed by AssertProtocol.
            }
            ca::Stmt::Contract {
                name,
                protocol,
                storage,
                actions,
                ..
            } => {
                let mut entries = storage.len();
                for (key, value) in storage {
                    self.load_const(b, Value::str(key));
                    self.expr(b, value)?;
                }
                for def in actions {
                    let Some(action_name) = &def.name else {
                        return Err(RunError::internal("unnamed action in contract body"));
                    };
                    self.load_const(b, Value::str(action_name));
                    let func = self.function(def)?;
                    b.emit(Op::MakeFunc(func));
                    entries += 1;
                }
                b.emit(Op::MakeMap(entries as u32));
                if let Some(protocol) = protocol {
                    let protocol = self.name(protocol);
                    b.emit(Op::AssertProtocol(protocol));
                }
                let name = self.name(name);
                b.emit(Op::Store(name));
            }
            ca::Stmt::ExternalDeclaration { name, .. } => {
                self.load_const(b, Value::External(Rc::from(name.as_str())));
                let name = self.name(name);
                b.emit(Op::Store(name));
            }
            ca::Stmt::Export { inner, .. } => {
                self.stmt(b, inner)?;
                if let Some(bound) = export_binding_name(inner) {
                    let bound = self.name(bound);
                    b.emit(Op::Export(bound));
                }
            }
            ca::Stmt::Debug { message, value, .. } => {
                self.expr(b, message)?;
                let mut arity = 1;
                if let Some(value) = value {
                    self.expr(b, value)?;
                    arity = 2;
                }
                let name = self.name("debug_log");
                b.emit(Op::CallName { name, arity });
                b.emit(Op::Pop);
            }
            ca::Stmt::Use { module, alias, .. } => {
                let name = self.name(module);
                let alias = self.name(alias.as_deref().unwrap_or(module));
                b.emit(Op::Import { name, alias });
            }
            ca::Stmt::Import { module, names, .. } => {
                let module_idx = self.name(module);
                b.emit(Op::Import {
                    name: module_idx,
                    alias: module_idx,
                });
                for member in names {
                    b.emit(Op::Load(module_idx));
                    let member_idx = self.name(member);
                    b.emit(Op::Prop(member_idx));
                    b.emit(Op::Store(member_idx));
                }
            }
            ca::Stmt::ScreenDef { name, props, .. } => self.render_def(b, "define_screen", name, props)?,
            ca::Stmt::ComponentDef { name, props, .. } => self.render_def(b, "define_component", name, props)?,
            ca::Stmt::ThemeDef { name, props, .. } => self.render_def(b, "define_theme", name, props)?,
            ca::Stmt::PersistentStorage { name, fields, .. } => {
                for (key, value) in fields {
                    self.load_const(b, Value::str(key));
                    self.expr(b, value)?;
                }
                b.emit(Op::MakeMap(fields.len() as u32));
                let name = self.name(name);
                b.emit(Op::Store(name));
            }
            ca::Stmt::Require { cond, meta } => {
                self.expr(b, cond)?;
                let to_fail = b.emit_jump(Op::JumpIfFalse(0));
                let to_end = b.emit_jump(Op::Jump(0));
                b.patch_jump(to_fail);
                self.load_const(
                    b,
                    Value::error(ErrorKind::ProtocolError, "requirement failed", Some(meta.pos)),
                );
                b.emit(Op::Raise);
                b.patch_jump(to_end);
            }
            // Both are rejected by semantic analysis before emission runs.
            ca::Stmt::Exactly { meta } => {
                return Err(RunError::internal(format!(
                    "'exactly' statement at {} reached the emitter",
                    meta.pos
                )));
            }
            ca::Stmt::Malformed { note, meta } => {
                return Err(RunError::internal(format!(
                    "malformed region at {} reached the emitter: {note}",
                    meta.pos
                )));
            }
        }
        Ok(())
    }

    fn scoped_block(&mut self, b: &mut ChunkBuilder, block: &ca::Block) -> RunResult<()> {
        b.emit(Op::ScopePush);
        for stmt in &block.stmts {
            self.stmt(b, stmt)?;
        }
        b.emit(Op::ScopePop);
        Ok(())
    }

    /// Lowers `for each` through the `__iter__`/`__next__` runtime calls
    /// with the end sentinel driving the exit branch.
    fn for_each(&mut self, b: &mut ChunkBuilder, var: &str, iterable: &ca::Expr, body: &ca::Block) -> RunResult<()> {
        self.expr(b, iterable)?;
        let iter_name = self.name("__iter__");
        let next_name = self.name("__next__");
        b.emit(Op::CallName {
            name: iter_name,
            arity: 1,
        });
        // stack: [iter]
        let head = b.here();
        b.emit(Op::Dup);
        b.emit(Op::CallName {
            name: next_name,
            arity: 1,
        });
        // stack: [iter, item]
        b.emit(Op::Dup);
        let sentinel = self.constant(Value::IterEnd);
        b.emit(Op::LoadConst(sentinel));
        b.emit(Op::Bin(BinOp::Eq));
        let to_body = b.emit_jump(Op::JumpIfFalse(0));
        // Exhausted: drop the sentinel and the iterator.
        b.emit(Op::Pop);
        b.emit(Op::Pop);
        let to_end = b.emit_jump(Op::Jump(0));
        b.patch_jump(to_body);
        // Fresh scope per iteration; the loop variable binds inside it.
        b.emit(Op::ScopePush);
        let var = self.name(var);
        b.emit(Op::Store(var));
        for stmt in &body.stmts {
            self.stmt(b, stmt)?;
        }
        b.emit(Op::ScopePop);
        b.emit(Op::Jump(head));
        b.patch_jump(to_end);
        Ok(())
    }

    fn render_def(&mut self, b: &mut ChunkBuilder, tag: &str, name: &str, props: &[(String, ca::Expr)]) -> RunResult<()> {
        self.load_const(b, Value::str(name));
        for (key, value) in props {
            self.load_const(b, Value::str(key));
            self.expr(b, value)?;
        }
        b.emit(Op::MakeMap(props.len() as u32));
        let tag = self.name(tag);
        b.emit(Op::RenderOp { tag, arity: 2 });
        b.emit(Op::Pop);
        Ok(())
    }

    // --- functions --------------------------------------------------------

    fn function(&mut self, def: &ca::ActionDef) -> RunResult<u32> {
        let mut b = ChunkBuilder::new();
        b.set_location(def.meta.pos);
        for stmt in &def.body.stmts {
            self.stmt(&mut b, stmt)?;
        }
        self.load_null(&mut b);
        b.emit(Op::Return);
        Ok(self.push_func(
            def.name.as_deref(),
            &def.params,
            def.id,
            b.build(),
            def.is_async,
            def.meta.pos,
        ))
    }

    fn lambda(&mut self, params: &[String], body: &ca::Expr, id: u32, pos: Pos) -> RunResult<u32> {
        let mut b = ChunkBuilder::new();
        b.set_location(pos);
        self.expr(&mut b, body)?;
        b.emit(Op::Return);
        Ok(self.push_func(None, params, id, b.build(), false, pos))
    }

    fn push_func(
        &mut self,
        name: Option<&str>,
        params: &[String],
        id: u32,
        chunk: Chunk,
        is_async: bool,
        pos: Pos,
    ) -> u32 {
        let captures = self
            .captures
            .get(&id)
            .map(|names| names.iter().map(|n| Rc::from(n.as_str())).collect())
            .unwrap_or_default();
        let idx = self.code.funcs.len() as u32;
        self.code.funcs.push(FuncDesc {
            name: name.map(Rc::from),
            params: params.iter().map(|p| Rc::from(p.as_str())).collect(),
            captures,
            chunk,
            is_async,
            pos,
        });
        idx
    }

    // --- expressions ------------------------------------------------------

    fn expr(&mut self, b: &mut ChunkBuilder, expr: &ca::Expr) -> RunResult<()> {
        b.set_location(expr.pos());
        match expr {
            ca::Expr::Identifier { name, .. } => {
                let name = self.name(name);
                b.emit(Op::Load(name));
            }
            ca::Expr::Integer { value, .. } => self.load_const(b, Value::Int(value.clone())),
            ca::Expr::Float { value, .. } => self.load_const(b, Value::Float(*value)),
            ca::Expr::Str { value, .. } => self.load_const(b, Value::str(value)),
            ca::Expr::Bool { value, .. } => self.load_const(b, Value::Bool(*value)),
            ca::Expr::Null { .. } => self.load_null(b),
            ca::Expr::ListLiteral { items, .. } => {
                for item in items {
                    self.expr(b, item)?;
                }
                b.emit(Op::MakeList(items.len() as u32));
            }
            ca::Expr::MapLiteral { entries, .. } => {
                for (key, value) in entries {
                    self.load_const(b, Value::str(key));
                    self.expr(b, value)?;
                }
                b.emit(Op::MakeMap(entries.len() as u32));
            }
            ca::Expr::ActionLiteral(def) => {
                let func = self.function(def)?;
                b.emit(Op::MakeFunc(func));
            }
            ca::Expr::Lambda { params, body, id, meta } => {
                let func = self.lambda(params, body, *id, meta.pos)?;
                b.emit(Op::MakeFunc(func));
            }
            ca::Expr::Call { callee, args, .. } => {
                // `spawn(c)` lowers to the dedicated opcode.
                if let ca::Expr::Identifier { name, .. } = callee.as_ref()
                    && name == "spawn"
                    && args.len() == 1
                {
                    self.expr(b, &args[0])?;
                    b.emit(Op::Spawn);
                    return Ok(());
                }
                match callee.as_ref() {
                    ca::Expr::Identifier { name, .. } => {
                        for arg in args {
                            self.expr(b, arg)?;
                        }
                        let name = self.name(name);
                        b.emit(Op::CallName {
                            name,
                            arity: args.len() as u32,
                        });
                    }
                    // Calling a literal function goes through the constant
                    // pool without a temporary binding.
                    ca::Expr::ActionLiteral(def) => {
                        for arg in args {
                            self.expr(b, arg)?;
                        }
                        let func = self.function(def)?;
                        b.emit(Op::CallFuncConst {
                            func,
                            arity: args.len() as u32,
                        });
                    }
                    ca::Expr::Lambda { params, body, id, meta } => {
                        for arg in args {
                            self.expr(b, arg)?;
                        }
                        let func = self.lambda(params, body, *id, meta.pos)?;
                        b.emit(Op::CallFuncConst {
                            func,
                            arity: args.len() as u32,
                        });
                    }
                    other => {
                        self.expr(b, other)?;
                        for arg in args {
                            self.expr(b, arg)?;
                        }
                        b.emit(Op::CallTop(args.len() as u32));
                    }
                }
            }
            ca::Expr::MethodCall {
                receiver, name, args, ..
            } => {
                self.expr(b, receiver)?;
                for arg in args {
                    self.expr(b, arg)?;
                }
                let name = self.name(name);
                b.emit(Op::CallMethod {
                    name,
                    arity: args.len() as u32,
                });
            }
            ca::Expr::PropertyAccess { receiver, name, .. } => {
                self.expr(b, receiver)?;
                let name = self.name(name);
                b.emit(Op::Prop(name));
            }
            ca::Expr::Index { receiver, index, .. } => {
                self.expr(b, receiver)?;
                self.expr(b, index)?;
                b.emit(Op::Index);
            }
            ca::Expr::Assignment { target, value, .. } => match target.as_ref() {
                ca::Expr::Identifier { name, .. } => {
                    self.expr(b, value)?;
                    b.emit(Op::Dup);
                    let name = self.name(name);
                    b.emit(Op::Assign(name));
                }
                ca::Expr::Index { receiver, index, .. } => {
                    self.expr(b, receiver)?;
                    self.expr(b, index)?;
                    self.expr(b, value)?;
                    b.emit(Op::IndexSet);
                }
                ca::Expr::PropertyAccess { receiver, name, .. } => {
                    self.expr(b, receiver)?;
                    self.expr(b, value)?;
                    let name = self.name(name);
                    b.emit(Op::PropSet(name));
                }
                _ => return Err(RunError::type_error("invalid assignment target")),
            },
            ca::Expr::Prefix { op, expr, .. } => {
                self.expr(b, expr)?;
                b.emit(Op::Un(*op));
            }
            ca::Expr::Infix { op, left, right, .. } => match op {
                BinOp::And => {
                    self.expr(b, left)?;
                    b.emit(Op::Dup);
                    let to_end = b.emit_jump(Op::JumpIfFalse(0));
                    b.emit(Op::Pop);
                    self.expr(b, right)?;
                    b.patch_jump(to_end);
                }
                BinOp::Or => {
                    self.expr(b, left)?;
                    b.emit(Op::Dup);
                    let to_rhs = b.emit_jump(Op::JumpIfFalse(0));
                    let to_end = b.emit_jump(Op::Jump(0));
                    b.patch_jump(to_rhs);
                    b.emit(Op::Pop);
                    self.expr(b, right)?;
                    b.patch_jump(to_end);
                }
                _ => {
                    self.expr(b, left)?;
                    self.expr(b, right)?;
                    b.emit(Op::Bin(*op));
                }
            },
            ca::Expr::IfExpression {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.expr(b, cond)?;
                let to_else = b.emit_jump(Op::JumpIfFalse(0));
                self.valued_block(b, then_block)?;
                let to_end = b.emit_jump(Op::Jump(0));
                b.patch_jump(to_else);
                self.valued_block(b, else_block)?;
                b.patch_jump(to_end);
            }
            ca::Expr::Await { expr, .. } => {
                self.expr(b, expr)?;
                b.emit(Op::Await);
            }
            ca::Expr::EmbeddedLiteral { language, text, .. } => {
                self.load_const(b, Value::str("language"));
                self.load_const(b, Value::str(language));
                self.load_const(b, Value::str("text"));
                self.load_const(b, Value::str(text));
                b.emit(Op::MakeMap(2));
            }
        }
        Ok(())
    }

    /// A block in value position: its value is the trailing expression
    /// statement's value, null otherwise.
    fn valued_block(&mut self, b: &mut ChunkBuilder, block: &ca::Block) -> RunResult<()> {
        b.emit(Op::ScopePush);
        let trailing_expr = matches!(block.stmts.last(), Some(ca::Stmt::ExpressionStatement { .. }));
        for (i, stmt) in block.stmts.iter().enumerate() {
            if i + 1 == block.stmts.len()
                && let ca::Stmt::ExpressionStatement { expr, meta } = stmt
            {
                b.set_location(meta.pos);
                self.expr(b, expr)?;
                continue;
            }
            self.stmt(b, stmt)?;
        }
        if !trailing_expr {
            self.load_null(b);
        }
        b.emit(Op::ScopePop);
        Ok(())
    }
}

/// The name an exported statement binds; mirrors the analyzer's rule.
fn export_binding_name(stmt: &ca::Stmt) -> Option<&str> {
    match stmt {
        ca::Stmt::Let { name, .. }
        | ca::Stmt::Enum { name, .. }
        | ca::Stmt::Contract { name, .. }
        | ca::Stmt::Event { name, .. }
        | ca::Stmt::PersistentStorage { name, .. }
        | ca::Stmt::ExternalDeclaration { name, .. } => Some(name),
        ca::Stmt::Action(def) => def.name.as_deref(),
        ca::Stmt::Export { inner, .. } => export_binding_name(inner),
        _ => None,
    }
}
