//! Stack virtual machine.
//!
//! Execution state is a value stack plus a call stack of frames; each
//! frame owns its instruction pointer, lexical environment (with a scope
//! stack for nested blocks), and try stack. Asynchronous tasks are whole
//! `Task` values multiplexed by the cooperative [`scheduler`]; `Await` is
//! the only suspension point.

mod scheduler;

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;
use scheduler::Scheduler;

use crate::{
    builtins::{self, Host},
    env::{EnvFrame, EnvRef},
    error::{ErrorKind, RunError, RunResult},
    events::EventRegistry,
    io::PrintWriter,
    object::Object,
    render::Renderer,
    run::HostFn,
    value::{
        ClosureValue, CoroKind, CoroState, CoroutineValue, EnumDef, Value, bin_op, index_assign, index_value,
        property_access, property_assign, un_op,
    },
};

use super::{
    code::{Chunk, Code},
    op::Op,
};

/// A protected region on a frame's try stack.
#[derive(Debug)]
struct TryEntry {
    handler: u32,
    err_name: u32,
    stack_depth: usize,
    env: EnvRef,
    env_stack_len: usize,
}

/// One call frame.
#[derive(Debug)]
struct Frame {
    /// Function-pool index, or `None` for the top-level chunk.
    func: Option<u32>,
    ip: usize,
    env: EnvRef,
    /// Enclosing environments for nested scopes within this frame.
    env_stack: Vec<EnvRef>,
    try_stack: Vec<TryEntry>,
    stack_base: usize,
}

/// One cooperative task: its own frame stack and value stack.
#[derive(Debug, Default)]
pub(super) struct Task {
    id: u32,
    frames: Vec<Frame>,
    stack: Vec<Value>,
    /// The coroutine this task is driving, for result memoization.
    coro: Option<Rc<RefCell<CoroutineValue>>>,
    /// Error injected by a failed awaitee, raised on resume.
    pending_error: Option<RunError>,
}

/// Why the op loop stopped.
enum StepExit {
    /// The frame at the target depth returned.
    Done,
    /// The task parked awaiting the given task id.
    Blocked(u32),
}

/// Per-instruction outcome.
enum StepFlow {
    Continue,
    Block(u32),
}

/// Outcome of awaiting a coroutine, decided without holding its borrow.
enum AwaitNext {
    Ready(Value),
    Raise(RunError),
    Start,
    Join,
}

pub(crate) struct Vm<'h> {
    code: &'h Code,
    globals: EnvRef,
    print: &'h mut dyn PrintWriter,
    renderer: &'h mut dyn Renderer,
    events: EventRegistry,
    externals: &'h AHashMap<String, HostFn>,
    modules: &'h AHashMap<String, Value>,
    sched: Scheduler,
    cur: Task,
    steps: u64,
    step_limit: Option<u64>,
}

impl<'h> Vm<'h> {
    pub(crate) fn new(
        code: &'h Code,
        print: &'h mut dyn PrintWriter,
        renderer: &'h mut dyn Renderer,
        externals: &'h AHashMap<String, HostFn>,
        modules: &'h AHashMap<String, Value>,
        step_limit: Option<u64>,
    ) -> Self {
        let globals = EnvFrame::global();
        builtins::install(&globals);
        Self {
            code,
            globals,
            print,
            renderer,
            events: EventRegistry::default(),
            externals,
            modules,
            sched: Scheduler::default(),
            cur: Task::default(),
            steps: 0,
            step_limit,
        }
    }

    /// Runs the program to completion, draining spawned tasks.
    pub(crate) fn run(&mut self) -> RunResult<Value> {
        let main_id = self.sched.alloc_id();
        self.cur = Task {
            id: main_id,
            frames: vec![Frame {
                func: None,
                ip: 0,
                env: Rc::clone(&self.globals),
                env_stack: Vec::new(),
                try_stack: Vec::new(),
                stack_base: 0,
            }],
            stack: Vec::new(),
            coro: None,
            pending_error: None,
        };
        let mut main_result = Value::Null;
        loop {
            match self.execute_until(0, true) {
                Ok(StepExit::Done) => {
                    let value = self.cur.stack.pop().unwrap_or(Value::Null);
                    let id = self.cur.id;
                    if let Some(coro) = self.cur.coro.take() {
                        coro.borrow_mut().state = CoroState::Done(value.clone());
                    }
                    if id == main_id {
                        main_result = value.clone();
                    }
                    if let Some(mut waiter) = self.sched.release(id) {
                        waiter.stack.push(value);
                        self.sched.enqueue(waiter);
                    }
                }
                Ok(StepExit::Blocked(awaited)) => {
                    let task = std::mem::take(&mut self.cur);
                    if let Err(_task) = self.sched.park(awaited, task) {
                        return Err(RunError::new(
                            ErrorKind::EvaluationError,
                            "coroutine is already being awaited",
                        ));
                    }
                }
                Err(err) => {
                    let id = self.cur.id;
                    if let Some(coro) = self.cur.coro.take() {
                        coro.borrow_mut().state = CoroState::Failed(err.clone());
                    }
                    match self.sched.release(id) {
                        Some(mut waiter) => {
                            // The awaiting task re-raises the error, where a
                            // surrounding try/catch can still handle it.
                            waiter.pending_error = Some(err);
                            self.sched.enqueue(waiter);
                        }
                        None => return Err(err),
                    }
                }
            }
            match self.sched.next_runnable() {
                Some(task) => self.cur = task,
                None => {
                    if self.sched.has_parked() {
                        return Err(RunError::internal("all tasks are blocked"));
                    }
                    return Ok(main_result);
                }
            }
        }
    }

    /// Snapshot of the exported global bindings.
    pub(crate) fn exports(&self) -> Vec<(String, Value)> {
        self.globals.exports()
    }

    fn chunk_of(&self, func: Option<u32>) -> &'h Chunk {
        match func {
            None => &self.code.top,
            Some(idx) => &self.code.funcs[idx as usize].chunk,
        }
    }

    /// Runs instructions until the frame at `target` depth returns.
    /// `allow_block` permits `Await` suspension (top-level execution only).
    fn execute_until(&mut self, target: usize, allow_block: bool) -> RunResult<StepExit> {
        if let Some(err) = self.cur.pending_error.take() {
            self.raise(err, target)?;
        }
        loop {
            if self.cur.frames.len() <= target {
                return Ok(StepExit::Done);
            }
            if let Some(limit) = self.step_limit {
                self.steps += 1;
                if self.steps > limit {
                    return Err(RunError::interrupted());
                }
            }
            let frame_idx = self.cur.frames.len() - 1;
            let (op, loc) = {
                let frame = &self.cur.frames[frame_idx];
                let chunk = self.chunk_of(frame.func);
                let Some(op) = chunk.ops.get(frame.ip).copied() else {
                    return Err(RunError::internal("instruction pointer out of bounds"));
                };
                (op, chunk.locs.get(frame.ip).copied().unwrap_or_default())
            };
            self.cur.frames[frame_idx].ip += 1;
            match self.step(op, allow_block) {
                Ok(StepFlow::Continue) => {}
                Ok(StepFlow::Block(id)) => return Ok(StepExit::Blocked(id)),
                Err(err) => self.raise(err.with_pos(loc), target)?,
            }
        }
    }

    /// Transfers control to the innermost matching handler at or above
    /// `target`, or propagates the error with an action trace.
    fn raise(&mut self, err: RunError, target: usize) -> RunResult<()> {
        let mut depth = self.cur.frames.len();
        while depth > target {
            depth -= 1;
            if let Some(entry) = self.cur.frames[depth].try_stack.pop() {
                self.cur.frames.truncate(depth + 1);
                self.cur.stack.truncate(entry.stack_depth);
                let err_name = Rc::clone(self.code.name(entry.err_name));
                let frame = self.cur.frames.last_mut().expect("frame present");
                frame.env_stack.truncate(entry.env_stack_len);
                // Fresh child environment holding only the error variable.
                let handler_env = EnvFrame::child(&entry.env);
                handler_env.set(err_name, Value::error(err.kind, err.message, err.pos));
                frame.env_stack.push(Rc::clone(&entry.env));
                frame.env = handler_env;
                frame.ip = entry.handler as usize;
                return Ok(());
            }
        }
        let mut err = err;
        for frame in self.cur.frames[target..].iter().rev() {
            if let Some(idx) = frame.func {
                let desc = &self.code.funcs[idx as usize];
                err.push_frame(desc.name.as_deref(), desc.pos);
            }
        }
        self.cur.frames.truncate(target);
        Err(err)
    }

    // --- stack helpers ----------------------------------------------------

    fn push(&mut self, value: Value) {
        self.cur.stack.push(value);
    }

    fn pop(&mut self) -> RunResult<Value> {
        self.cur
            .stack
            .pop()
            .ok_or_else(|| RunError::internal("value stack underflow"))
    }

    fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        let len = self.cur.stack.len();
        if len < n {
            return Err(RunError::internal("value stack underflow"));
        }
        Ok(self.cur.stack.split_off(len - n))
    }

    fn frame(&mut self) -> &mut Frame {
        self.cur.frames.last_mut().expect("no active frame")
    }

    // --- instruction dispatch ---------------------------------------------

    fn step(&mut self, op: Op, allow_block: bool) -> RunResult<StepFlow> {
        match op {
            Op::LoadConst(idx) => {
                let value = self.code.consts[idx as usize].clone();
                self.push(value);
            }
            Op::Load(name) => {
                let name = Rc::clone(self.code.name(name));
                match self.frame().env.get(&name) {
                    Some(value) => self.push(value),
                    None => return Err(RunError::name_error(&name)),
                }
            }
            Op::Store(name) => {
                let value = self.pop()?;
                let name = Rc::clone(self.code.name(name));
                self.frame().env.define(name, value);
            }
            Op::Assign(name) => {
                let value = self.pop()?;
                let name = Rc::clone(self.code.name(name));
                self.frame().env.assign(&name, value)?;
            }
            Op::Pop => {
                self.pop()?;
            }
            Op::Dup => {
                let top = self
                    .cur
                    .stack
                    .last()
                    .cloned()
                    .ok_or_else(|| RunError::internal("value stack underflow"))?;
                self.push(top);
            }
            Op::MakeList(n) => {
                let items = self.pop_n(n as usize)?;
                self.push(Value::list(items));
            }
            Op::MakeMap(n) => {
                let flat = self.pop_n(n as usize * 2)?;
                let mut entries = IndexMap::new();
                let mut iter = flat.into_iter();
                while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                    let Value::Str(key) = key else {
                        return Err(RunError::internal("non-string map key on stack"));
                    };
                    entries.insert(key.to_string(), value);
                }
                self.push(Value::map(entries));
            }
            Op::Index => {
                let index = self.pop()?;
                let receiver = self.pop()?;
                self.push(index_value(&receiver, &index)?);
            }
            Op::IndexSet => {
                let value = self.pop()?;
                let index = self.pop()?;
                let receiver = self.pop()?;
                index_assign(&receiver, &index, value.clone())?;
                self.push(value);
            }
            Op::Prop(name) => {
                let receiver = self.pop()?;
                self.push(property_access(&receiver, self.code.name(name))?);
            }
            Op::PropSet(name) => {
                let value = self.pop()?;
                let receiver = self.pop()?;
                property_assign(&receiver, self.code.name(name), value.clone())?;
                self.push(value);
            }
            Op::Bin(op) => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(bin_op(op, &left, &right)?);
            }
            Op::Un(op) => {
                let value = self.pop()?;
                self.push(un_op(op, &value)?);
            }
            Op::Jump(target) => self.frame().ip = target as usize,
            Op::JumpIfFalse(target) => {
                let value = self.pop()?;
                if !value.truthy() {
                    self.frame().ip = target as usize;
                }
            }
            Op::CallName { name, arity } => {
                let args = self.pop_n(arity as usize)?;
                let name = Rc::clone(self.code.name(name));
                let Some(callee) = self.frame().env.get(&name) else {
                    return Err(RunError::name_error(&name));
                };
                self.invoke(callee, args)?;
            }
            Op::CallFuncConst { func, arity } => {
                let args = self.pop_n(arity as usize)?;
                let closure = self.make_closure(func);
                self.invoke(Value::Closure(closure), args)?;
            }
            Op::CallTop(arity) => {
                let args = self.pop_n(arity as usize)?;
                let callee = self.pop()?;
                self.invoke(callee, args)?;
            }
            Op::CallMethod { name, arity } => {
                let args = self.pop_n(arity as usize)?;
                let receiver = self.pop()?;
                let name = Rc::clone(self.code.name(name));
                let result = builtins::call_method(receiver, &name, args, self)?;
                self.push(result);
            }
            Op::Return => {
                let value = self.pop()?;
                let frame = self.cur.frames.pop().expect("return without frame");
                self.cur.stack.truncate(frame.stack_base);
                self.push(value);
            }
            Op::StoreFunc { name, func } => {
                let closure = self.make_closure(func);
                let name = Rc::clone(self.code.name(name));
                self.frame().env.define(name, Value::Closure(closure));
            }
            Op::MakeFunc(func) => {
                let closure = self.make_closure(func);
                self.push(Value::Closure(closure));
            }
            Op::Print => {
                let value = self.pop()?;
                self.print.line(&value.to_display_string());
            }
            Op::Export(name) => {
                let name = Rc::clone(self.code.name(name));
                self.frame().env.export(&name);
            }
            Op::Spawn => {
                let value = self.pop()?;
                let handle = self.spawn(value)?;
                self.push(handle);
            }
            Op::Await => return self.op_await(allow_block),
            Op::RegisterEvent(name) => {
                let name = self.code.name(name);
                let Some(descriptor) = self.code.events.iter().find(|d| d.name.as_ref() == name.as_ref()) else {
                    return Err(RunError::event(format!("unknown event descriptor '{name}'")));
                };
                self.events.declare(Rc::clone(descriptor));
                let value = Value::EventDescriptor(Rc::clone(descriptor));
                let name = Rc::clone(name);
                self.frame().env.define(name, value);
            }
            Op::EmitEvent(name) => {
                let payload = self.pop()?;
                let Value::Map(entries) = payload else {
                    return Err(RunError::internal("emit payload is not a map"));
                };
                let entries = entries.borrow().clone();
                let name = Rc::clone(self.code.name(name));
                let conformed = self.events.conform_payload(&name, entries)?;
                for handler in self.events.handlers(&name) {
                    self.call_value(&handler, vec![conformed.clone()])?;
                }
            }
            Op::DefineEnum { name, .. } => {
                let name = self.code.name(name);
                let Some((enum_name, variants)) = self
                    .code
                    .enums
                    .iter()
                    .find(|(n, _)| n.as_ref() == name.as_ref())
                else {
                    return Err(RunError::internal(format!("unknown enum '{name}'")));
                };
                let value = Value::EnumType(Rc::new(EnumDef {
                    name: Rc::clone(enum_name),
                    variants: variants.clone(),
                }));
                let name = Rc::clone(name);
                self.frame().env.define(name, value);
            }
            Op::AssertProtocol(name) => {
                let name = self.code.name(name);
                let Some((_, signatures)) = self
                    .code
                    .protocols
                    .iter()
                    .find(|(n, _)| n.as_ref() == name.as_ref())
                else {
                    return Err(RunError::protocol(format!("unknown protocol '{name}'")));
                };
                let top = self
                    .cur
                    .stack
                    .last()
                    .ok_or_else(|| RunError::internal("value stack underflow"))?;
                let Value::Map(entries) = top else {
                    return Err(RunError::protocol("protocol conformance requires a contract map"));
                };
                let entries = entries.borrow();
                for (sig_name, arity) in signatures {
                    let conforms = matches!(
                        entries.get(sig_name.as_ref()),
                        Some(Value::Closure(c)) if c.arity == *arity
                    );
                    if !conforms {
                        return Err(RunError::protocol(format!(
                            "missing action {sig_name}/{arity} required by '{name}'"
                        )));
                    }
                }
            }
            Op::Import { name, alias } => {
                let name = self.code.name(name);
                let Some(value) = self.modules.get(name.as_ref()) else {
                    return Err(RunError::name_error(name));
                };
                let value = value.clone();
                let alias = Rc::clone(self.code.name(alias));
                self.frame().env.define(alias, value);
            }
            Op::TryPush { handler, err_name } => {
                let stack_depth = self.cur.stack.len();
                let frame = self.frame();
                let entry = TryEntry {
                    handler,
                    err_name,
                    stack_depth,
                    env: Rc::clone(&frame.env),
                    env_stack_len: frame.env_stack.len(),
                };
                frame.try_stack.push(entry);
            }
            Op::TryPop => {
                if self.frame().try_stack.pop().is_none() {
                    return Err(RunError::internal("TRY_POP without a matching TRY_PUSH"));
                }
            }
            Op::Raise => {
                let value = self.pop()?;
                let Value::Error(err) = value else {
                    return Err(RunError::type_error(format!(
                        "can only raise errors, not {}",
                        value.type_name()
                    )));
                };
                let mut raised = RunError::new(err.kind, err.message.clone());
                raised.pos = err.pos;
                return Err(raised);
            }
            Op::RenderOp { tag, arity } => {
                let args = self.pop_n(arity as usize)?;
                let tag = Rc::clone(self.code.name(tag));
                let result = self.renderer.op(&tag, args)?;
                self.push(result);
            }
            Op::ScopePush => {
                let frame = self.frame();
                let child = EnvFrame::child(&frame.env);
                frame.env_stack.push(std::mem::replace(&mut frame.env, child));
            }
            Op::ScopePop => {
                let frame = self.frame();
                match frame.env_stack.pop() {
                    Some(env) => frame.env = env,
                    None => return Err(RunError::internal("scope stack underflow")),
                }
            }
        }
        Ok(StepFlow::Continue)
    }

    fn op_await(&mut self, allow_block: bool) -> RunResult<StepFlow> {
        let value = self.pop()?;
        let Value::Coroutine(coro) = value else {
            // A non-coroutine passes through unchanged.
            self.push(value);
            return Ok(StepFlow::Continue);
        };
        let next = {
            let guard = coro.borrow();
            match &guard.state {
                CoroState::Done(value) => AwaitNext::Ready(value.clone()),
                CoroState::Failed(err) => AwaitNext::Raise(err.clone()),
                CoroState::New => AwaitNext::Start,
                CoroState::Running => AwaitNext::Join,
            }
        };
        match next {
            AwaitNext::Ready(value) => {
                self.push(value);
                Ok(StepFlow::Continue)
            }
            AwaitNext::Raise(err) => Err(err),
            AwaitNext::Start => {
                if !allow_block {
                    return Err(RunError::internal("await cannot suspend inside a nested call"));
                }
                let id = self.schedule_coroutine(&coro)?;
                Ok(StepFlow::Block(id))
            }
            AwaitNext::Join => {
                if !allow_block {
                    return Err(RunError::internal("await cannot suspend inside a nested call"));
                }
                let ptr = Rc::as_ptr(&coro) as usize;
                match self.sched.task_for_coro(ptr) {
                    Some(id) => Ok(StepFlow::Block(id)),
                    None => Err(RunError::new(
                        ErrorKind::EvaluationError,
                        "coroutine is already being awaited",
                    )),
                }
            }
        }
    }

    // --- calls ------------------------------------------------------------

    fn make_closure(&mut self, func: u32) -> Rc<ClosureValue> {
        let desc = &self.code.funcs[func as usize];
        let mut cells = Vec::with_capacity(desc.captures.len());
        for capture in &desc.captures {
            let env = &self.cur.frames.last().expect("no active frame").env;
            let cell = match env.get_cell(capture) {
                Some(cell) => cell,
                None => {
                    // Captured before first binding: create the shared cell
                    // now so the later binding mutates it in place.
                    let cell = Rc::new(RefCell::new(Value::Null));
                    env.set_cell(Rc::clone(capture), Rc::clone(&cell));
                    cell
                }
            };
            cells.push((Rc::clone(capture), cell));
        }
        Rc::new(ClosureValue {
            name: desc.name.clone(),
            func,
            arity: desc.params.len(),
            cells,
            is_async: desc.is_async,
        })
    }

    fn build_frame(&self, closure: &ClosureValue, args: Vec<Value>, stack_base: usize) -> Frame {
        let env = EnvFrame::child(&self.globals);
        for (name, cell) in &closure.cells {
            env.set_cell(Rc::clone(name), Rc::clone(cell));
        }
        let desc = &self.code.funcs[closure.func as usize];
        for (param, arg) in desc.params.iter().zip(args) {
            env.set(Rc::clone(param), arg);
        }
        Frame {
            func: Some(closure.func),
            ip: 0,
            env,
            env_stack: Vec::new(),
            try_stack: Vec::new(),
            stack_base,
        }
    }

    fn check_arity(closure: &ClosureValue, actual: usize) -> RunResult<()> {
        if closure.arity == actual {
            Ok(())
        } else {
            let name = closure.name.as_deref().unwrap_or("<anonymous>");
            Err(RunError::arity_error(name, closure.arity, actual))
        }
    }

    /// Direct call dispatch for the `Call*` opcodes: sync closures push a
    /// frame and continue in the main loop, async closures produce a
    /// coroutine value.
    fn invoke(&mut self, callee: Value, args: Vec<Value>) -> RunResult<()> {
        match callee {
            Value::Closure(closure) => {
                Self::check_arity(&closure, args.len())?;
                if closure.is_async {
                    self.push(Value::Coroutine(Rc::new(RefCell::new(CoroutineValue {
                        kind: CoroKind::Closure { closure, args },
                        state: CoroState::New,
                    }))));
                    return Ok(());
                }
                let frame = self.build_frame(&closure, args, self.cur.stack.len());
                self.cur.frames.push(frame);
                Ok(())
            }
            Value::Builtin(builtin) => {
                let result = builtins::call(builtin, args, self)?;
                self.push(result);
                Ok(())
            }
            Value::External(name) => {
                let result = self.call_external(&name, args)?;
                self.push(result);
                Ok(())
            }
            other => Err(RunError::type_error(format!("{} is not callable", other.type_name()))),
        }
    }

    fn call_external(&mut self, name: &str, args: Vec<Value>) -> RunResult<Value> {
        let Some(callback) = self.externals.get(name) else {
            return Err(RunError::name_error(name));
        };
        let inputs = args.iter().map(Object::from_value).collect();
        let output = callback(inputs).map_err(|exc| RunError::new(exc.kind, exc.message))?;
        Ok(output.into_value())
    }

    /// Creates and enqueues a task driving `coro`. The coroutine must be
    /// fresh; its state becomes `Running`.
    fn schedule_coroutine(&mut self, coro: &Rc<RefCell<CoroutineValue>>) -> RunResult<u32> {
        let (closure, args) = {
            let mut guard = coro.borrow_mut();
            if !matches!(guard.state, CoroState::New) {
                return Err(RunError::new(
                    ErrorKind::EvaluationError,
                    "coroutine has already been started",
                ));
            }
            guard.state = CoroState::Running;
            match &guard.kind {
                CoroKind::Closure { closure, args } => (Rc::clone(closure), args.clone()),
                CoroKind::Action { .. } => {
                    return Err(RunError::internal("tree-walking coroutine reached the VM"));
                }
            }
        };
        let id = self.sched.alloc_id();
        let frame = self.build_frame(&closure, args, 0);
        let task = Task {
            id,
            frames: vec![frame],
            stack: Vec::new(),
            coro: Some(Rc::clone(coro)),
            pending_error: None,
        };
        self.sched.record_coro(Rc::as_ptr(coro) as usize, id);
        self.sched.enqueue(task);
        Ok(id)
    }
}

impl Host for Vm<'_> {
    /// Synchronous nested call used by builtins (`map`, `filter`, event
    /// delivery). Runs the callee to completion inside the current task;
    /// suspension is not permitted here.
    fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> RunResult<Value> {
        match callee {
            Value::Builtin(builtin) => builtins::call(*builtin, args, self),
            Value::Closure(closure) => {
                Self::check_arity(closure, args.len())?;
                if closure.is_async {
                    return Ok(Value::Coroutine(Rc::new(RefCell::new(CoroutineValue {
                        kind: CoroKind::Closure {
                            closure: Rc::clone(closure),
                            args,
                        },
                        state: CoroState::New,
                    }))));
                }
                let depth = self.cur.frames.len();
                let frame = self.build_frame(closure, args, self.cur.stack.len());
                self.cur.frames.push(frame);
                match self.execute_until(depth, false)? {
                    StepExit::Done => self.pop(),
                    StepExit::Blocked(_) => Err(RunError::internal("nested call suspended")),
                }
            }
            Value::External(name) => {
                let name = Rc::clone(name);
                self.call_external(&name, args)
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
        let id = self.schedule_coroutine(&coro)?;
        Ok(Value::TaskHandle(id))
    }
}
