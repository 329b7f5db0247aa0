//! Public interface for running Zexus code.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    analyze,
    bytecode::{self, Code, Vm},
    config::SyntaxStyle,
    error::{Diagnostic, ErrorKind, RunError, RunResult},
    eval::Interp,
    exception::Exception,
    io::{CollectStringPrint, PrintWriter},
    object::Object,
    parse::{strict, tolerant},
    render::{NoopRenderer, Renderer},
    value::Value,
};

/// Host callback backing an `external` declaration.
pub type HostFn = Rc<dyn Fn(Vec<Object>) -> Result<Object, Exception>>;

/// Execution mode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Tolerant parser + tree-walking evaluator.
    Interpret,
    /// Production parser + semantic analysis + bytecode VM.
    Compile,
    /// Compiler path first; on a compile-stage error, the interpreter
    /// result.
    #[default]
    Auto,
}

/// Host-facing renderer collaborator.
///
/// The core forwards every screen/component/theme/canvas builtin through
/// `op(tag, args)` and never inspects tag semantics.
pub trait RenderBackend {
    fn op(&mut self, tag: &str, args: Vec<Object>) -> Result<Object, Exception>;
}

/// Primary interface for running Zexus code.
///
/// # Example
/// ```
/// use zexus::{CollectStringPrint, Runner};
///
/// let mut print = CollectStringPrint::new();
/// let mut runner = Runner::new("print(string(10 + 5))");
/// runner.run(&mut print).unwrap();
/// assert_eq!(print.output(), "15\n");
/// ```
pub struct Runner {
    source: String,
    mode: Mode,
    step_limit: Option<u64>,
    externals: AHashMap<String, HostFn>,
    modules: AHashMap<String, Object>,
    backend: Option<Box<dyn RenderBackend>>,
    diagnostics: Vec<Diagnostic>,
    exports: Vec<(String, Object)>,
}

impl Runner {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mode: Mode::default(),
            step_limit: None,
            externals: AHashMap::new(),
            modules: AHashMap::new(),
            backend: None,
            diagnostics: Vec::new(),
            exports: Vec::new(),
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the process-wide syntax style (see [`crate::config`]).
    #[must_use]
    pub fn syntax_style(self, style: SyntaxStyle) -> Self {
        crate::config::set_syntax_style(style);
        self
    }

    /// Step budget for the VM; exceeding it raises `InterruptedError`.
    #[must_use]
    pub fn step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    /// Registers a module for `use` / `from ... use` resolution.
    #[must_use]
    pub fn module(mut self, name: impl Into<String>, value: Object) -> Self {
        self.modules.insert(name.into(), value);
        self
    }

    /// Registers the host callback behind an `external` declaration.
    #[must_use]
    pub fn external(
        mut self,
        name: impl Into<String>,
        callback: impl Fn(Vec<Object>) -> Result<Object, Exception> + 'static,
    ) -> Self {
        self.externals.insert(name.into(), Rc::new(callback));
        self
    }

    /// Installs a renderer collaborator; without one, renderer operations
    /// are accepted and return null.
    #[must_use]
    pub fn renderer(mut self, backend: Box<dyn RenderBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Recoverable diagnostics collected by the tolerant parser during the
    /// last interpreter-path run.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Exported top-level bindings observed by the last run.
    #[must_use]
    pub fn exports(&self) -> &[(String, Object)] {
        &self.exports
    }

    /// Runs the program. The result is the value of the last top-level
    /// expression statement.
    pub fn run(&mut self, print: &mut impl PrintWriter) -> Result<Object, Exception> {
        self.run_inner(print, false)
    }

    /// Runs the program and drives spawned interpreter tasks to
    /// completion. (The VM path always drains its scheduler.)
    pub fn run_async(&mut self, print: &mut impl PrintWriter) -> Result<Object, Exception> {
        self.run_inner(print, true)
    }

    /// Convenience: run with captured output.
    pub fn run_captured(&mut self) -> Result<(Object, String), Exception> {
        let mut print = CollectStringPrint::new();
        let result = self.run(&mut print)?;
        Ok((result, print.into_output()))
    }

    fn run_inner(&mut self, print: &mut dyn PrintWriter, async_drain: bool) -> Result<Object, Exception> {
        match self.mode {
            Mode::Interpret => self.run_interpreter(print, async_drain),
            Mode::Compile => self.run_compiler(print),
            Mode::Auto => match self.compile() {
                Ok(code) => self.run_vm(&code, print),
                Err(err) if is_compile_stage(err.kind) => self.run_interpreter(print, async_drain),
                Err(err) => Err(err.into()),
            },
        }
    }

    fn compile(&self) -> RunResult<Code> {
        let program = strict::parse(&self.source)?;
        let analysis = analyze::analyze(&program).map_err(|mut errors| errors.remove(0))?;
        bytecode::compile(&program, &analysis)
    }

    fn run_compiler(&mut self, print: &mut dyn PrintWriter) -> Result<Object, Exception> {
        let code = self.compile()?;
        self.run_vm(&code, print)
    }

    fn run_vm(&mut self, code: &Code, print: &mut dyn PrintWriter) -> Result<Object, Exception> {
        let modules = module_values(&self.modules);
        let mut noop = NoopRenderer;
        let mut adapter;
        let renderer: &mut dyn Renderer = match self.backend.as_mut() {
            Some(backend) => {
                adapter = AdaptBackend(backend.as_mut());
                &mut adapter
            }
            None => &mut noop,
        };
        let mut vm = Vm::new(code, print, renderer, &self.externals, &modules, self.step_limit);
        let result = vm.run();
        self.exports = vm
            .exports()
            .into_iter()
            .map(|(name, value)| (name, Object::from_value(&value)))
            .collect();
        result.map(|value| Object::from_value(&value)).map_err(Into::into)
    }

    fn run_interpreter(&mut self, print: &mut dyn PrintWriter, async_drain: bool) -> Result<Object, Exception> {
        let outcome = tolerant::parse(&self.source);
        self.diagnostics = outcome.diagnostics;
        let modules = module_values(&self.modules);
        let mut noop = NoopRenderer;
        let mut adapter;
        let renderer: &mut dyn Renderer = match self.backend.as_mut() {
            Some(backend) => {
                adapter = AdaptBackend(backend.as_mut());
                &mut adapter
            }
            None => &mut noop,
        };
        let mut interp = Interp::new(print, renderer, &self.externals, &modules);
        let result = if async_drain {
            interp.eval_program_async(&outcome.program)
        } else {
            interp.eval_program(&outcome.program)
        };
        self.exports = interp
            .globals
            .exports()
            .into_iter()
            .map(|(name, value)| (name, Object::from_value(&value)))
            .collect();
        result.map(|value| Object::from_value(&value)).map_err(Into::into)
    }
}

fn module_values(modules: &AHashMap<String, Object>) -> AHashMap<String, Value> {
    modules
        .iter()
        .map(|(name, value)| (name.clone(), value.clone().into_value()))
        .collect()
}

/// Errors that trigger the auto-mode fallback to the interpreter.
fn is_compile_stage(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::LexicalError | ErrorKind::SyntaxError | ErrorKind::SemanticError
    )
}

struct AdaptBackend<'a>(&'a mut dyn RenderBackend);

impl Renderer for AdaptBackend<'_> {
    fn op(&mut self, tag: &str, args: Vec<Value>) -> RunResult<Value> {
        let inputs = args.iter().map(Object::from_value).collect();
        self.0
            .op(tag, inputs)
            .map(Object::into_value)
            .map_err(|exc| RunError::new(exc.kind, exc.message))
    }
}
