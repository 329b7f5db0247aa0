//! Tree-walking evaluator over the interpreter AST.
//!
//! `return` unwinds through the dedicated error channel (`Unwind::Return`)
//! and is caught by the nearest action frame; an unhandled return at top
//! level is an `EvaluationError`. Errors accumulate action names and
//! positions while unwinding, which feeds the debug stack trace.

mod scheduler;

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;
use scheduler::TaskQueue;

use crate::{
    ast::{BinOp, interp as ia},
    builtins::{self, Host},
    config,
    env::{EnvFrame, EnvRef},
    error::{ErrorKind, RunError, RunResult},
    events::{EventDescriptor, EventRegistry},
    io::PrintWriter,
    render::Renderer,
    run::HostFn,
    object::Object,
    value::{ActionBody, ActionValue, CoroKind, CoroState, CoroutineValue, Value, bin_op, index_assign, index_value, iter_value, property_access, property_assign, un_op},
};

const MAX_CALL_DEPTH: u32 = 200;

/// Evaluator control flow: either a plain error or a `return` unwinding to
/// the nearest action frame.
pub(crate) enum Unwind {
    Return(Value),
    Error(RunError),
}

impl From<RunError> for Unwind {
    fn from(err: RunError) -> Self {
        Self::Error(err)
    }
}

type Flow<T> = Result<T, Unwind>;

/// One evaluator instance: global environment, event registry, scheduler.
pub(crate) struct Interp<'h> {
    pub globals: EnvRef,
    print: &'h mut dyn PrintWriter,
    renderer: &'h mut dyn Renderer,
    events: EventRegistry,
    tasks: TaskQueue,
    protocols: AHashMap<String, Vec<(String, usize)>>,
    externals: &'h AHashMap<String, HostFn>,
    modules: &'h AHashMap<String, Value>,
    depth: u32,
}

impl<'h> Interp<'h> {
    pub(crate) fn new(
        print: &'h mut dyn PrintWriter,
        renderer: &'h mut dyn Renderer,
        externals: &'h AHashMap<String, HostFn>,
        modules: &'h AHashMap<String, Value>,
    ) -> Self {
        let globals = EnvFrame::global();
        builtins::install(&globals);
        Self {
            globals,
            print,
            renderer,
            events: EventRegistry::default(),
            tasks: TaskQueue::default(),
            protocols: AHashMap::new(),
            externals,
            modules,
            depth: 0,
        }
    }

    /// Evaluates a program; the result is the value of the last expression
    /// statement (null if there is none).
    pub(crate) fn eval_program(&mut self, program: &ia::Program) -> RunResult<Value> {
        let env = Rc::clone(&self.globals);
        let mut last = Value::Null;
        for stmt in &program.stmts {
            match self.eval_stmt(stmt, &env) {
                Ok(value) => last = value,
                Err(Unwind::Return(_)) => {
                    return Err(RunError::new(
                        ErrorKind::EvaluationError,
                        "'return' outside of an action",
                    )
                    .with_pos(stmt.pos()));
                }
                Err(Unwind::Error(err)) => return Err(err),
            }
        }
        Ok(last)
    }

    /// `run_async` entry: evaluates the program, then drives every spawned
    /// task to completion in FIFO order.
    pub(crate) fn eval_program_async(&mut self, program: &ia::Program) -> RunResult<Value> {
        let result = self.eval_program(program)?;
        self.drain_tasks()?;
        Ok(result)
    }

    fn drain_tasks(&mut self) -> RunResult<()> {
        while let Some(coro) = self.tasks.pop() {
            self.drive(&coro)?;
        }
        Ok(())
    }

    // --- statements -------------------------------------------------------

    fn eval_stmt(&mut self, stmt: &ia::Stmt, env: &EnvRef) -> Flow<Value> {
        let pos = stmt.pos();
        self.eval_stmt_inner(stmt, env).map_err(|unwind| match unwind {
            Unwind::Error(err) => Unwind::Error(err.with_pos(pos)),
            other => other,
        })
    }

    fn eval_stmt_inner(&mut self, stmt: &ia::Stmt, env: &EnvRef) -> Flow<Value> {
        match stmt {
            ia::Stmt::Let { name, value, .. } => {
                let value = self.eval_expr(value, env)?;
                env.define(name.as_str(), value);
                Ok(Value::Null)
            }
            ia::Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Null,
                };
                Err(Unwind::Return(value))
            }
            ia::Stmt::ExpressionStatement { expr, .. } => self.eval_expr(expr, env),
            ia::Stmt::Block(block) => {
                let child = EnvFrame::child(env);
                self.eval_block(block, &child)?;
                Ok(Value::Null)
            }
            ia::Stmt::Print { expr, .. } => {
                let value = self.eval_expr(expr, env)?;
                self.print.line(&value.to_display_string());
                Ok(Value::Null)
            }
            ia::Stmt::ForEach {
                var, iterable, body, ..
            } => {
                let iterable = self.eval_expr(iterable, env)?;
                let iter = iter_value(&iterable)?;
                let Value::Iterator(state) = iter else {
                    return Err(RunError::internal("iterator construction produced a non-iterator").into());
                };
                loop {
                    let item = state.borrow_mut().next();
                    if matches!(item, Value::IterEnd) {
                        break;
                    }
                    let child = EnvFrame::child(env);
                    child.set(var.as_str(), item);
                    self.eval_block(body, &child)?;
                }
                Ok(Value::Null)
            }
            ia::Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                if self.eval_expr(cond, env)?.truthy() {
                    let child = EnvFrame::child(env);
                    self.eval_block(then_block, &child)?;
                } else if let Some(else_block) = else_block {
                    let child = EnvFrame::child(env);
                    self.eval_block(else_block, &child)?;
                }
                Ok(Value::Null)
            }
            ia::Stmt::While { cond, body, .. } => {
                while self.eval_expr(cond, env)?.truthy() {
                    let child = EnvFrame::child(env);
                    self.eval_block(body, &child)?;
                }
                Ok(Value::Null)
            }
            ia::Stmt::TryCatch {
                body,
                err_var,
                handler,
                ..
            } => {
                let child = EnvFrame::child(env);
                match self.eval_block(body, &child) {
                    Ok(_) => Ok(Value::Null),
                    Err(Unwind::Return(value)) => Err(Unwind::Return(value)),
                    Err(Unwind::Error(err)) => {
                        // Fresh child environment holding only the error
                        // variable, bound to the reified Error object.
                        let handler_env = EnvFrame::child(env);
                        handler_env.set(err_var.as_str(), Value::error(err.kind, err.message, err.pos));
                        self.eval_block(handler, &handler_env)?;
                        Ok(Value::Null)
                    }
                }
            }
            ia::Stmt::Action(def) => {
                let action = self.make_action(def, env);
                if let Some(name) = &def.name {
                    env.set(name.as_str(), action);
                }
                Ok(Value::Null)
            }
            ia::Stmt::Event { name, fields, .. } => {
                let descriptor = Rc::new(EventDescriptor {
                    name: Rc::from(name.as_str()),
                    fields: fields.iter().map(|f| Rc::from(f.as_str())).collect(),
                });
                self.events.declare(Rc::clone(&descriptor));
                env.set(name.as_str(), Value::EventDescriptor(descriptor));
                Ok(Value::Null)
            }
            ia::Stmt::Emit { name, payload, .. } => {
                let mut entries = IndexMap::new();
                for (key, expr) in payload {
                    let value = self.eval_expr(expr, env)?;
                    entries.insert(key.clone(), value);
                }
                self.emit_event(name, entries)?;
                Ok(Value::Null)
            }
            ia::Stmt::Enum { name, variants, .. } => {
                env.set(
                    name.as_str(),
                    Value::EnumType(Rc::new(crate::value::EnumDef {
                        name: Rc::from(name.as_str()),
                        variants: variants.iter().map(|v| Rc::from(v.as_str())).collect(),
                    })),
                );
                Ok(Value::Null)
            }
            ia::Stmt::Protocol { name, signatures, .. } => {
                self.protocols.insert(name.clone(), signatures.clone());
                Ok(Value::Null)
            }
            ia::Stmt::Contract {
                name,
                protocol,
                storage,
                actions,
                ..
            } => {
                let mut entries = IndexMap::new();
                for (key, expr) in storage {
                    let value = self.eval_expr(expr, env)?;
                    entries.insert(key.clone(), value);
                }
                for def in actions {
                    let action = self.make_action(def, env);
                    if let Some(action_name) = &def.name {
                        entries.insert(action_name.clone(), action);
                    }
                }
                if let Some(protocol) = protocol {
                    self.check_protocol(name, protocol, actions)?;
                }
                env.set(name.as_str(), Value::map(entries));
                Ok(Value::Null)
            }
            ia::Stmt::ExternalDeclaration { name, .. } => {
                env.set(name.as_str(), Value::External(Rc::from(name.as_str())));
                Ok(Value::Null)
            }
            ia::Stmt::Export { inner, .. } => {
                self.eval_stmt(inner, env)?;
                match binding_name(inner) {
                    Some(name) => {
                        env.export(name);
                        Ok(Value::Null)
                    }
                    None => Err(RunError::new(
                        ErrorKind::EvaluationError,
                        "export requires a binding statement",
                    )
                    .into()),
                }
            }
            ia::Stmt::Debug { message, value, .. } => {
                // Arguments are evaluated unconditionally; only the output
                // is gated, matching the compiled lowering.
                let mut line = format!("[debug] {}", self.eval_expr(message, env)?.to_display_string());
                if let Some(value) = value {
                    line.push_str(" = ");
                    line.push_str(&self.eval_expr(value, env)?.to_display_string());
                }
                if config::debug_logs() {
                    self.print.line(&line);
                }
                Ok(Value::Null)
            }
            ia::Stmt::Use { module, alias, .. } => {
                let Some(value) = self.modules.get(module) else {
                    return Err(RunError::name_error(module).into());
                };
                let bind_as = alias.as_deref().unwrap_or(module);
                env.set(bind_as, value.clone());
                Ok(Value::Null)
            }
            ia::Stmt::Import { module, names, .. } => {
                let Some(value) = self.modules.get(module) else {
                    return Err(RunError::name_error(module).into());
                };
                for name in names {
                    let member = property_access(value, name).map_err(|_| {
                        RunError::new(
                            ErrorKind::NameError,
                            format!("module '{module}' has no member '{name}'"),
                        )
                    })?;
                    env.set(name.as_str(), member);
                }
                Ok(Value::Null)
            }
            ia::Stmt::ScreenDef { name, props, .. } => self.render_def("define_screen", name, props, env),
            ia::Stmt::ComponentDef { name, props, .. } => self.render_def("define_component", name, props, env),
            ia::Stmt::ThemeDef { name, props, .. } => self.render_def("define_theme", name, props, env),
            ia::Stmt::PersistentStorage { name, fields, .. } => {
                let mut entries = IndexMap::new();
                for (key, expr) in fields {
                    let value = self.eval_expr(expr, env)?;
                    entries.insert(key.clone(), value);
                }
                env.set(name.as_str(), Value::map(entries));
                Ok(Value::Null)
            }
            ia::Stmt::Require { cond, .. } => {
                if self.eval_expr(cond, env)?.truthy() {
                    Ok(Value::Null)
                } else {
                    Err(RunError::protocol("requirement failed").into())
                }
            }
            ia::Stmt::Exactly { meta } => {
                Err(RunError::syntax(meta.pos, "'exactly' is reserved").into())
            }
            // The offending tokens were already dropped and diagnosed;
            // execution resumes past the recovered region.
            ia::Stmt::Malformed { .. } => Ok(Value::Null),
        }
    }

    /// Evaluates a block in the given environment; the value is the last
    /// expression statement's value (null otherwise).
    fn eval_block(&mut self, block: &ia::Block, env: &EnvRef) -> Flow<Value> {
        let mut last = Value::Null;
        for stmt in &block.stmts {
            last = self.eval_stmt(stmt, env)?;
            if !matches!(stmt, ia::Stmt::ExpressionStatement { .. }) {
                last = Value::Null;
            }
        }
        Ok(last)
    }

    fn render_def(&mut self, tag: &str, name: &str, props: &[(String, ia::Expr)], env: &EnvRef) -> Flow<Value> {
        let mut entries = IndexMap::new();
        for (key, expr) in props {
            let value = self.eval_expr(expr, env)?;
            entries.insert(key.clone(), value);
        }
        self.renderer.op(tag, vec![Value::str(name), Value::map(entries)])?;
        Ok(Value::Null)
    }

    fn make_action(&mut self, def: &ia::ActionDef, env: &EnvRef) -> Value {
        Value::Action(Rc::new(ActionValue {
            name: def.name.as_deref().map(Rc::from),
            params: def.params.iter().map(|p| Rc::from(p.as_str())).collect(),
            body: ActionBody::Block(Rc::new(def.body.clone())),
            env: Rc::clone(env),
            is_async: def.is_async,
            pos: def.meta.pos,
        }))
    }

    fn check_protocol(&self, contract: &str, protocol: &str, actions: &[ia::ActionDef]) -> RunResult<()> {
        let Some(signatures) = self.protocols.get(protocol) else {
            return Err(RunError::protocol(format!("unknown protocol '{protocol}'")));
        };
        for (sig_name, arity) in signatures {
            let found = actions
                .iter()
                .any(|def| def.name.as_deref() == Some(sig_name) && def.params.len() == *arity);
            if !found {
                return Err(RunError::protocol(format!(
                    "contract '{contract}' does not satisfy '{protocol}': missing action {sig_name}/{arity}"
                )));
            }
        }
        Ok(())
    }

    // --- expressions ------------------------------------------------------

    fn eval_expr(&mut self, expr: &ia::Expr, env: &EnvRef) -> Flow<Value> {
        let pos = expr.pos();
        self.eval_expr_inner(expr, env).map_err(|unwind| match unwind {
            Unwind::Error(err) => Unwind::Error(err.with_pos(pos)),
            other => other,
        })
    }

    fn eval_expr_inner(&mut self, expr: &ia::Expr, env: &EnvRef) -> Flow<Value> {
        match expr {
            ia::Expr::Identifier { name, .. } => match env.get(name) {
                Some(value) => Ok(value),
                None => Err(RunError::name_error(name).into()),
            },
            ia::Expr::Integer { value, .. } => Ok(Value::Int(value.clone())),
            ia::Expr::Float { value, .. } => Ok(Value::Float(*value)),
            ia::Expr::Str { value, .. } => Ok(Value::str(value)),
            ia::Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
            ia::Expr::Null { .. } => Ok(Value::Null),
            ia::Expr::ListLiteral { items, .. } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item, env)?);
                }
                Ok(Value::list(out))
            }
            ia::Expr::MapLiteral { entries, .. } => {
                let mut out = IndexMap::new();
                for (key, value) in entries {
                    let value = self.eval_expr(value, env)?;
                    out.insert(key.clone(), value);
                }
                Ok(Value::map(out))
            }
            ia::Expr::ActionLiteral(def) => Ok(self.make_action(def, env)),
            ia::Expr::Lambda { params, body, meta, .. } => Ok(Value::Action(Rc::new(ActionValue {
                name: None,
                params: params.iter().map(|p| Rc::from(p.as_str())).collect(),
                body: ActionBody::Expr(Rc::new((**body).clone())),
                env: Rc::clone(env),
                is_async: false,
                pos: meta.pos,
            }))),
            ia::Expr::Call { callee, args, .. } => {
                let callee = self.eval_expr(callee, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg, env)?);
                }
                Ok(self.call_value(&callee, values)?)
            }
            ia::Expr::MethodCall {
                receiver, name, args, ..
            } => {
                let receiver = self.eval_expr(receiver, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg, env)?);
                }
                Ok(builtins::call_method(receiver, name, values, self)?)
            }
            ia::Expr::PropertyAccess { receiver, name, .. } => {
                let receiver = self.eval_expr(receiver, env)?;
                Ok(property_access(&receiver, name)?)
            }
            ia::Expr::Index { receiver, index, .. } => {
                let receiver = self.eval_expr(receiver, env)?;
                let index = self.eval_expr(index, env)?;
                Ok(index_value(&receiver, &index)?)
            }
            ia::Expr::Assignment { target, value, .. } => {
                let value = self.eval_expr(value, env)?;
                match target.as_ref() {
                    ia::Expr::Identifier { name, .. } => {
                        env.assign(name, value.clone())?;
                    }
                    ia::Expr::Index { receiver, index, .. } => {
                        let receiver = self.eval_expr(receiver, env)?;
                        let index = self.eval_expr(index, env)?;
                        index_assign(&receiver, &index, value.clone())?;
                    }
                    ia::Expr::PropertyAccess { receiver, name, .. } => {
                        let receiver = self.eval_expr(receiver, env)?;
                        property_assign(&receiver, name, value.clone())?;
                    }
                    _ => return Err(RunError::type_error("invalid assignment target").into()),
                }
                Ok(value)
            }
            ia::Expr::Prefix { op, expr, .. } => {
                let value = self.eval_expr(expr, env)?;
                Ok(un_op(*op, &value)?)
            }
            ia::Expr::Infix { op, left, right, .. } => match op {
                BinOp::And => {
                    let left = self.eval_expr(left, env)?;
                    if left.truthy() {
                        self.eval_expr(right, env)
                    } else {
                        Ok(left)
                    }
                }
                BinOp::Or => {
                    let left = self.eval_expr(left, env)?;
                    if left.truthy() {
                        Ok(left)
                    } else {
                        self.eval_expr(right, env)
                    }
                }
                _ => {
                    let left = self.eval_expr(left, env)?;
                    let right = self.eval_expr(right, env)?;
                    Ok(bin_op(*op, &left, &right)?)
                }
            },
            ia::Expr::IfExpression {
                cond,
                then_block,
                else_block,
                ..
            } => {
                let branch = if self.eval_expr(cond, env)?.truthy() {
                    then_block
                } else {
                    else_block
                };
                let child = EnvFrame::child(env);
                self.eval_block(branch, &child)
            }
            ia::Expr::Await { expr, .. } => {
                let value = self.eval_expr(expr, env)?;
                match value {
                    Value::Coroutine(coro) => Ok(self.await_coroutine(&coro)?),
                    other => Ok(other),
                }
            }
            ia::Expr::EmbeddedLiteral { language, text, .. } => {
                let mut entries = IndexMap::new();
                entries.insert("language".to_owned(), Value::str(language));
                entries.insert("text".to_owned(), Value::str(text));
                Ok(Value::map(entries))
            }
        }
    }

    // --- calls and coroutines ---------------------------------------------

    fn call_action(&mut self, action: &Rc<ActionValue>, args: Vec<Value>) -> RunResult<Value> {
        if args.len() != action.params.len() {
            let name = action.name.as_deref().unwrap_or("<anonymous>");
            return Err(RunError::arity_error(name, action.params.len(), args.len()));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RunError::new(
                ErrorKind::EvaluationError,
                "maximum call depth exceeded",
            ));
        }
        let frame = EnvFrame::child(&action.env);
        for (param, arg) in action.params.iter().zip(args) {
            frame.set(Rc::clone(param), arg);
        }
        self.depth += 1;
        let result = match &action.body {
            ActionBody::Block(block) => match self.eval_block(block, &frame) {
                Ok(_) => Ok(Value::Null),
                Err(Unwind::Return(value)) => Ok(value),
                Err(Unwind::Error(err)) => Err(err),
            },
            ActionBody::Expr(expr) => match self.eval_expr(expr, &frame) {
                Ok(value) => Ok(value),
                Err(Unwind::Return(value)) => Ok(value),
                Err(Unwind::Error(err)) => Err(err),
            },
        };
        self.depth -= 1;
        result.map_err(|mut err| {
            err.push_frame(action.name.as_deref(), action.pos);
            err
        })
    }

    /// Awaits a coroutine: previously spawned runnable tasks progress first
    /// (FIFO), then the awaited coroutine runs to completion.
    fn await_coroutine(&mut self, coro: &Rc<RefCell<CoroutineValue>>) -> RunResult<Value> {
        self.drain_tasks()?;
        self.drive(coro)
    }

    /// Drives one coroutine to completion, memoizing its result.
    fn drive(&mut self, coro: &Rc<RefCell<CoroutineValue>>) -> RunResult<Value> {
        {
            let guard = coro.borrow();
            match &guard.state {
                CoroState::Done(value) => return Ok(value.clone()),
                CoroState::Failed(err) => return Err(err.clone()),
                CoroState::Running => {
                    return Err(RunError::new(
                        ErrorKind::EvaluationError,
                        "coroutine is already being awaited",
                    ));
                }
                CoroState::New => {}
            }
        }
        let kind = {
            let mut coro = coro.borrow_mut();
            coro.state = CoroState::Running;
            match &coro.kind {
                CoroKind::Action { action, args } => (Rc::clone(action), args.clone()),
                CoroKind::Closure { .. } => {
                    return Err(RunError::internal("compiled coroutine reached the evaluator"));
                }
            }
        };
        let result = self.call_action(&kind.0, kind.1);
        let mut coro = coro.borrow_mut();
        match &result {
            Ok(value) => coro.state = CoroState::Done(value.clone()),
            Err(err) => coro.state = CoroState::Failed(err.clone()),
        }
        result
    }

    fn emit_event(&mut self, name: &str, payload: IndexMap<String, Value>) -> RunResult<()> {
        let conformed = self.events.conform_payload(name, payload)?;
        for handler in self.events.handlers(name) {
            // Handler return values are ignored; a raising handler halts
            // delivery of this emission.
            self.call_value(&handler, vec![conformed.clone()])?;
        }
        Ok(())
    }
}

impl Host for Interp<'_> {
    fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> RunResult<Value> {
        match callee {
            Value::Builtin(builtin) => builtins::call(*builtin, args, self),
            Value::Action(action) => {
                if action.is_async {
                    // Arity is checked at call time, before the body is
                    // wrapped into a coroutine.
                    if args.len() != action.params.len() {
                        let name = action.name.as_deref().unwrap_or("<anonymous>");
                        return Err(RunError::arity_error(name, action.params.len(), args.len()));
                    }
                    return Ok(Value::Coroutine(Rc::new(RefCell::new(CoroutineValue {
                        kind: CoroKind::Action {
                            action: Rc::clone(action),
                            args,
                        },
                        state: CoroState::New,
                    }))));
                }
                self.call_action(action, args)
            }
            Value::External(name) => {
                let Some(callback) = self.externals.get(name.as_ref()) else {
                    return Err(RunError::name_error(name));
                };
                let inputs = args.iter().map(Object::from_value).collect();
                let output = callback(inputs).map_err(|exc| RunError::new(exc.kind, exc.message))?;
                Ok(output.into_value())
            }
            other => Err(RunError::type_error(format!("{} is not callable", other.type_name()))),
        }
    }

    fn print(&mut self) -> &mut dyn PrintWriter {
        &mut *self.print
    }

    fn renderer_op(&mut self, tag: &str, args: Vec<Value>) -> RunResult<Value> {
        self.renderer.op(tag, args)
    }

    fn register_event(&mut self, name: &str, handler: Value) -> RunResult<()> {
        self.events.register(name, handler);
        Ok(())
    }

    fn spawn(&mut self, coro: Value) -> RunResult<Value> {
        let Value::Coroutine(coro) = coro else {
            return Err(RunError::type_error(format!(
                "spawn expects a coroutine, not {}",
                coro.type_name()
            )));
        };
        let handle = self.tasks.push(coro);
        Ok(Value::TaskHandle(handle))
    }
}

/// The name a statement binds, for `export` bookkeeping.
fn binding_name(stmt: &ia::Stmt) -> Option<&str> {
    match stmt {
        ia::Stmt::Let { name, .. }
        | ia::Stmt::Enum { name, .. }
        | ia::Stmt::Contract { name, .. }
        | ia::Stmt::Event { name, .. }
        | ia::Stmt::PersistentStorage { name, .. }
        | ia::Stmt::ExternalDeclaration { name, .. } => Some(name),
        ia::Stmt::Action(def) => def.name.as_deref(),
        ia::Stmt::Export { inner, .. } => binding_name(inner),
        _ => None,
    }
}
