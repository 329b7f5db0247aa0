//! Compiler-path behavior: semantic validation, VM semantics, step budget.

use pretty_assertions::assert_eq;
use zexus::{CollectStringPrint, ErrorKind, Mode, Runner};

fn run(src: &str) -> (Result<zexus::Object, zexus::Exception>, String) {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new(src).mode(Mode::Compile);
    let result = runner.run(&mut print);
    (result, print.into_output())
}

fn run_output(src: &str) -> String {
    let (result, output) = run(src);
    result.unwrap_or_else(|err| panic!("failed for {src:?}: {err}"));
    output
}

#[test]
fn unresolved_name_is_a_semantic_error() {
    let (result, _) = run("print(string(missing))");
    assert_eq!(result.unwrap_err().kind, ErrorKind::SemanticError);
}

#[test]
fn await_outside_async_is_a_semantic_error() {
    let (result, _) = run("action f() { return await f() }");
    assert_eq!(result.unwrap_err().kind, ErrorKind::SemanticError);
}

#[test]
fn emit_of_undeclared_event_is_a_semantic_error() {
    let (result, _) = run("emit E { x: 1 }");
    assert_eq!(result.unwrap_err().kind, ErrorKind::SemanticError);
}

#[test]
fn exactly_is_rejected_during_analysis() {
    let (result, _) = run("exactly 3 of x");
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert!(err.message.contains("exactly"), "{}", err.message);
}

#[test]
fn protocol_conformance_is_checked() {
    let (result, _) = run("protocol P { action f(a) }\ncontract C : P { action g(x) { return x } }");
    assert_eq!(result.unwrap_err().kind, ErrorKind::SemanticError);
}

#[test]
fn syntax_error_reports_expected_token() {
    let (result, _) = run("let x 5");
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert!(err.message.contains("expected"), "{}", err.message);
    assert!(err.pos.is_some());
}

#[test]
fn step_budget_interrupts_infinite_loops() {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("while true { }").mode(Mode::Compile).step_limit(10_000);
    let err = runner.run(&mut print).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InterruptedError);
}

#[test]
fn while_loop_with_mutation() {
    assert_eq!(
        run_output("let i = 0\nlet total = 0\nwhile i < 5 { i = i + 1 total = total + i }\nprint(string(total))"),
        "15\n"
    );
}

#[test]
fn foreach_lowering_drives_the_iterator_protocol() {
    assert_eq!(
        run_output("let total = 0\nfor each n in [1, 2, 3, 4] { total = total + n }\nprint(string(total))"),
        "10\n"
    );
}

#[test]
fn nested_closures_capture_through_levels() {
    let src = "action outer() {\n\
                 let a = 10\n\
                 action middle() {\n\
                   action inner() { return a + 1 }\n\
                   return inner()\n\
                 }\n\
                 return middle()\n\
               }\n\
               print(string(outer()))";
    assert_eq!(run_output(src), "11\n");
}

#[test]
fn calling_a_lambda_literal_directly() {
    assert_eq!(run_output("print(string((lambda(x) -> x + 1)(41)))"), "42\n");
}

#[test]
fn anonymous_action_call() {
    assert_eq!(run_output("let r = action(x) { return x * 2 }(21)\nprint(string(r))"), "42\n");
}

#[test]
fn try_catch_restores_the_stack() {
    let src = "let before = 1\n\
               try { let x = [1, 2][9] } catch(e) { print(e.kind()) }\n\
               print(string(before))";
    let output = run_output(src);
    assert!(output.ends_with("1\n"), "{output}");
}

#[test]
fn raise_reaches_the_nearest_handler_across_frames() {
    let src = "action boom() { return 1 / 0 }\n\
               action wrap() { return boom() }\n\
               try { wrap() } catch(e) { print(e.kind()) }";
    assert_eq!(run_output(src), "ArithmeticError\n");
}

#[test]
fn unhandled_error_carries_an_action_trace() {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("action boom() { return 1 / 0 }\naction wrap() { return boom() }\nwrap()")
        .mode(Mode::Compile);
    let err = runner.run(&mut print).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArithmeticError);
    let rendered = err.render(true);
    assert!(rendered.contains("boom"), "{rendered}");
    assert!(rendered.contains("wrap"), "{rendered}");
}

#[test]
fn exports_are_recorded() {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("export let answer = 42").mode(Mode::Compile);
    runner.run(&mut print).unwrap();
    assert_eq!(runner.exports().len(), 1);
    assert_eq!(runner.exports()[0].0, "answer");
}

#[test]
fn program_result_is_the_last_expression() {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("let x = 40\nx + 2").mode(Mode::Compile);
    let result = runner.run(&mut print).unwrap();
    assert_eq!(result, zexus::Object::from(42));
}
