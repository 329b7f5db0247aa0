//! End-to-end scenarios, each required to pass identically through both
//! execution modes.

use pretty_assertions::assert_eq;
use zexus::{CollectStringPrint, Mode, Runner};

fn output(src: &str, mode: Mode) -> String {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new(src).mode(mode);
    runner
        .run(&mut print)
        .unwrap_or_else(|err| panic!("{mode:?} failed for {src:?}: {err}"));
    print.into_output()
}

fn assert_both_modes(src: &str, expected: &str) {
    assert_eq!(output(src, Mode::Interpret), expected, "interpreter: {src:?}");
    assert_eq!(output(src, Mode::Compile), expected, "compiler: {src:?}");
    assert_eq!(output(src, Mode::Auto), expected, "auto: {src:?}");
}

#[test]
fn arithmetic_prints() {
    assert_both_modes("print(string(10 + 5))", "15\n");
}

#[test]
fn map_literal_tolerances() {
    assert_both_modes(
        "let m = { \"a\": 1, b: 2; c: 3, }  print(string(m))",
        "{\"a\": 1, \"b\": 2, \"c\": 3}\n",
    );
}

#[test]
fn division_by_zero_is_caught() {
    assert_both_modes(
        "try { let x = 10 / 0 } catch(err) { print(\"error: \" + string(err)) }",
        "error: ArithmeticError: division by zero\n",
    );
}

#[test]
fn list_map_with_lambda() {
    assert_both_modes(
        "let nums=[1,2,3,4] let d=nums.map(lambda(n)->n*2) print(string(d))",
        "[2, 4, 6, 8]\n",
    );
}

#[test]
fn closure_counter() {
    assert_both_modes(
        "action make(){ let c=0 action inc(){ c=c+1 return c } return inc } let f=make() print(string(f())) print(string(f()))",
        "1\n2\n",
    );
}

#[test]
fn event_delivery() {
    assert_both_modes(
        "event E { x: integer } register_event(\"E\", action(e){ print(\"got \" + string(e.x)) }) emit E { x: 7 }",
        "got 7\n",
    );
}

#[test]
fn auto_mode_falls_back_on_compile_errors() {
    // A clean program stays on the compiler path.
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("print(string(1))").mode(Mode::Auto);
    runner.run(&mut print).unwrap();
    assert_eq!(print.output(), "1\n");

    // The production parser rejects this; the tolerant parser still yields
    // a program (with diagnostics), which the interpreter runs.
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("let x = (\nprint(string(2))").mode(Mode::Auto);
    let result = runner.run(&mut print);
    assert!(result.is_err() || !runner.diagnostics().is_empty());
}
