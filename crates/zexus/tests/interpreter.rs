//! Interpreter-path behavior: tolerances, recovery, error taxonomy.

use pretty_assertions::assert_eq;
use zexus::{CollectStringPrint, ErrorKind, Mode, Runner};

fn run(src: &str) -> (Result<zexus::Object, zexus::Exception>, String) {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new(src).mode(Mode::Interpret);
    let result = runner.run(&mut print);
    (result, print.into_output())
}

fn run_output(src: &str) -> String {
    let (result, output) = run(src);
    result.unwrap_or_else(|err| panic!("failed for {src:?}: {err}"));
    output
}

#[test]
fn stray_semicolons_are_ignored() {
    assert_eq!(run_output(";;let x = 1;;print(string(x));"), "1\n");
}

#[test]
fn all_catch_forms_are_equivalent() {
    for src in [
        "try { let x = 1 / 0 } catch err { print(err.kind()) }",
        "try { let x = 1 / 0 } catch(err) { print(err.kind()) }",
        "try { let x = 1 / 0 } catch((err)) { print(err.kind()) }",
    ] {
        assert_eq!(run_output(src), "ArithmeticError\n", "{src}");
    }
}

#[test]
fn catch_variable_is_scoped_to_the_handler() {
    let (result, _) = run("try { let x = 1 / 0 } catch(e) { }\nprint(string(e))");
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameError);
}

#[test]
fn error_raised_inside_handler_propagates() {
    let (result, _) = run("try { let x = 1 / 0 } catch(e) { let y = missing }");
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameError);
}

#[test]
fn colon_blocks() {
    assert_eq!(run_output("let x = 3\nif x > 1: print(string(x))"), "3\n");
    assert_eq!(
        run_output("let x = 0\nwhile x < 3:\n    x = x + 1\nprint(string(x))"),
        "3\n"
    );
}

#[test]
fn single_param_lambda_form() {
    assert_eq!(
        run_output("let d = [1, 2].map(lambda n -> n * 10)\nprint(string(d))"),
        "[10, 20]\n"
    );
}

#[test]
fn recovery_keeps_later_statements_running() {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("let = broken\nprint(string(7))").mode(Mode::Interpret);
    runner.run(&mut print).unwrap();
    assert_eq!(print.output(), "7\n");
    assert!(!runner.diagnostics().is_empty());
}

#[test]
fn arity_errors() {
    let (result, _) = run("action f(a) { return a }\nf(1, 2)");
    assert_eq!(result.unwrap_err().kind, ErrorKind::ArityError);
    let (result, _) = run("len()");
    assert_eq!(result.unwrap_err().kind, ErrorKind::ArityError);
}

#[test]
fn unknown_method_is_attribute_error() {
    let (result, _) = run("let x = \"s\".nope()");
    assert_eq!(result.unwrap_err().kind, ErrorKind::AttributeError);
}

#[test]
fn unknown_name_is_name_error() {
    let (result, _) = run("print(string(missing))");
    assert_eq!(result.unwrap_err().kind, ErrorKind::NameError);
}

#[test]
fn string_concat_requires_strings() {
    let (result, _) = run("let x = \"a\" + 1");
    assert_eq!(result.unwrap_err().kind, ErrorKind::TypeError);
}

#[test]
fn foreach_iterates_lists_and_map_keys() {
    assert_eq!(
        run_output("for each n in [1, 2, 3] { print(string(n)) }"),
        "1\n2\n3\n"
    );
    assert_eq!(
        run_output("let m = { a: 1, b: 2 }\nfor each k in m { print(k) }"),
        "a\nb\n"
    );
}

#[test]
fn foreach_on_non_iterable_is_type_error() {
    let (result, _) = run("for each n in 5 { }");
    assert_eq!(result.unwrap_err().kind, ErrorKind::TypeError);
}

#[test]
fn return_at_top_level_is_an_evaluation_error() {
    let (result, _) = run("return 1");
    assert_eq!(result.unwrap_err().kind, ErrorKind::EvaluationError);
}

#[test]
fn exactly_is_reserved() {
    let (result, _) = run("exactly 3 of x");
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert!(err.message.contains("exactly"));
}

#[test]
fn truthiness_in_conditions() {
    assert_eq!(
        run_output("if 0 { print(\"t\") } else { print(\"f\") }"),
        "f\n"
    );
    assert_eq!(
        run_output("if \"\" { print(\"t\") } else { print(\"f\") }"),
        "f\n"
    );
    assert_eq!(
        run_output("if [0] { print(\"t\") } else { print(\"f\") }"),
        "t\n"
    );
}

#[test]
fn integer_arithmetic_semantics() {
    assert_eq!(run_output("print(string(7 / 2))"), "3\n");
    assert_eq!(run_output("print(string(7 % 2))"), "1\n");
    assert_eq!(run_output("print(string(7 / 2.0))"), "3.5\n");
    assert_eq!(run_output("print(string(2 == 2.0))"), "true\n");
    assert_eq!(run_output("print(string(\"1\" == 1))"), "false\n");
}

#[test]
fn bignum_integers() {
    assert_eq!(
        run_output("print(string(99999999999999999999 + 1))"),
        "100000000000000000000\n"
    );
}

#[test]
fn hex_builtins_round_trip() {
    assert_eq!(run_output("print(to_hex(255))"), "ff\n");
    assert_eq!(run_output("print(string(from_hex(\"ff\")))"), "255\n");
}

#[test]
fn persistent_storage_binds_a_map() {
    assert_eq!(
        run_output("persistent storage Bank { total: 100 }\nprint(string(Bank.total))"),
        "100\n"
    );
}

#[test]
fn contract_binds_a_map_with_actions() {
    let src = "protocol P { action get(k) }\n\
               contract Store : P { storage { items: 0 } action get(k) { return k } }\n\
               print(string(Store.get(5)))\nprint(string(Store.items))";
    assert_eq!(run_output(src), "5\n0\n");
}

#[test]
fn enum_values() {
    assert_eq!(
        run_output("enum Color { Red, Green }\nprint(string(Color.Red))\nprint(string(Color.Red == Color.Red))\nprint(string(Color.Red == Color.Green))"),
        "Color.Red\ntrue\nfalse\n"
    );
}

#[test]
fn embedded_literal_is_a_tagged_map() {
    assert_eq!(
        run_output("let e = {| sql\nselect 1\n|}\nprint(e.language)"),
        "sql\n"
    );
}

#[test]
fn exports_are_observable() {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new("export let answer = 42\nlet hidden = 1").mode(Mode::Interpret);
    runner.run(&mut print).unwrap();
    let exports = runner.exports();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].0, "answer");
}

#[test]
fn if_expression_value() {
    assert_eq!(
        run_output("let x = if 1 < 2 { \"yes\" } else { \"no\" }\nprint(x)"),
        "yes\n"
    );
}
