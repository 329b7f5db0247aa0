//! Host integration: modules, external functions, the renderer seam, and
//! the debug-log flag.

use std::{cell::RefCell, rc::Rc};

use pretty_assertions::assert_eq;
use zexus::{CollectStringPrint, ErrorKind, Exception, Mode, Object, RenderBackend, Runner};

#[test]
fn use_binds_a_registered_module() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let mut print = CollectStringPrint::new();
        let module = Object::Map(vec![("pi".to_owned(), Object::Float(3.14))]);
        let mut runner = Runner::new("use mathish\nprint(string(mathish.pi))")
            .mode(mode)
            .module("mathish", module);
        runner.run(&mut print).unwrap();
        assert_eq!(print.output(), "3.14\n", "{mode:?}");
    }
}

#[test]
fn use_with_alias() {
    let mut print = CollectStringPrint::new();
    let module = Object::Map(vec![("v".to_owned(), Object::from(1))]);
    let mut runner = Runner::new("use mathish as m\nprint(string(m.v))")
        .mode(Mode::Interpret)
        .module("mathish", module);
    runner.run(&mut print).unwrap();
    assert_eq!(print.output(), "1\n");
}

#[test]
fn from_use_imports_members() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let mut print = CollectStringPrint::new();
        let module = Object::Map(vec![
            ("a".to_owned(), Object::from(1)),
            ("b".to_owned(), Object::from(2)),
        ]);
        let mut runner = Runner::new("from mathish use a, b\nprint(string(a + b))")
            .mode(mode)
            .module("mathish", module);
        runner.run(&mut print).unwrap();
        assert_eq!(print.output(), "3\n", "{mode:?}");
    }
}

#[test]
fn unknown_module_is_a_name_error() {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("use nope").mode(Mode::Interpret);
    let err = runner.run(&mut print).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameError);
}

#[test]
fn external_functions_dispatch_to_the_host() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let mut print = CollectStringPrint::new();
        let mut runner = Runner::new("external double from \"host\"\nprint(string(double(21)))")
            .mode(mode)
            .external("double", |args| match args.first() {
                Some(Object::Int(i)) => Ok(Object::Int(i * 2)),
                _ => Err(Exception {
                    kind: ErrorKind::TypeError,
                    message: "expected an integer".to_owned(),
                    pos: None,
                    trace: Vec::new(),
                }),
            });
        runner.run(&mut print).unwrap();
        assert_eq!(print.output(), "42\n", "{mode:?}");
    }
}

#[test]
fn unbound_external_is_a_name_error() {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("external mystery\nmystery()").mode(Mode::Interpret);
    let err = runner.run(&mut print).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameError);
}

#[derive(Default)]
struct RecordingBackend {
    calls: Rc<RefCell<Vec<(String, usize)>>>,
}

impl RenderBackend for RecordingBackend {
    fn op(&mut self, tag: &str, args: Vec<Object>) -> Result<Object, Exception> {
        self.calls.borrow_mut().push((tag.to_owned(), args.len()));
        Ok(Object::Null)
    }
}

#[test]
fn renderer_builtins_forward_tag_and_args() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let backend = RecordingBackend { calls: Rc::clone(&calls) };
        let mut print = CollectStringPrint::new();
        let mut runner = Runner::new(
            "create_canvas(80, 24)\ndraw_line(0, 0, 10, 10)\ndraw_text(1, 1, \"hi\")",
        )
        .mode(mode)
        .renderer(Box::new(backend));
        runner.run(&mut print).unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![
                ("create_canvas".to_owned(), 2),
                ("draw_line".to_owned(), 4),
                ("draw_text".to_owned(), 3),
            ],
            "{mode:?}"
        );
    }
}

#[test]
fn screen_definitions_reach_the_renderer() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let backend = RecordingBackend { calls: Rc::clone(&calls) };
        let mut print = CollectStringPrint::new();
        let mut runner = Runner::new("screen Home { title: \"hello\" }")
            .mode(mode)
            .renderer(Box::new(backend));
        runner.run(&mut print).unwrap();
        assert_eq!(*calls.borrow(), vec![("define_screen".to_owned(), 2)], "{mode:?}");
    }
}

#[test]
fn without_a_renderer_operations_return_null() {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("print(string(create_canvas(80, 24)))").mode(Mode::Interpret);
    runner.run(&mut print).unwrap();
    assert_eq!(print.output(), "null\n");
}

#[test]
fn debug_statements_are_gated_by_the_flag() {
    let src = "debug \"checkpoint\", 42";
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new(src).mode(Mode::Interpret);
    runner.run(&mut print).unwrap();
    assert_eq!(print.output(), "");

    zexus::config::set_debug_logs(true);
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new(src).mode(Mode::Interpret);
    runner.run(&mut print).unwrap();
    zexus::config::set_debug_logs(false);
    assert_eq!(print.output(), "[debug] checkpoint = 42\n");
}
