//! Event declaration, registration order, payload conformance.

use pretty_assertions::assert_eq;
use zexus::{CollectStringPrint, ErrorKind, Mode, Runner};

fn run(src: &str, mode: Mode) -> (Result<zexus::Object, zexus::Exception>, String) {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new(src).mode(mode);
    let result = runner.run(&mut print);
    (result, print.into_output())
}

#[test]
fn handlers_run_in_registration_order() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let src = "event E { x: integer }\n\
                   register_event(\"E\", action(e) { print(\"first \" + string(e.x)) })\n\
                   register_event(\"E\", action(e) { print(\"second \" + string(e.x)) })\n\
                   emit E { x: 9 }";
        let (result, output) = run(src, mode);
        result.unwrap_or_else(|err| panic!("{mode:?}: {err}"));
        assert_eq!(output, "first 9\nsecond 9\n", "{mode:?}");
    }
}

#[test]
fn payload_matches_the_emit_arguments() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let src = "event Move { x: integer, y: integer }\n\
                   register_event(\"Move\", action(e) { print(string(e)) })\n\
                   emit Move { x: 1, y: 2 }";
        let (result, output) = run(src, mode);
        result.unwrap_or_else(|err| panic!("{mode:?}: {err}"));
        assert_eq!(output, "{\"x\": 1, \"y\": 2}\n", "{mode:?}");
    }
}

#[test]
fn missing_fields_are_null() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let src = "event Move { x: integer, y: integer }\n\
                   register_event(\"Move\", action(e) { print(string(e.y)) })\n\
                   emit Move { x: 1 }";
        let (result, output) = run(src, mode);
        result.unwrap_or_else(|err| panic!("{mode:?}: {err}"));
        assert_eq!(output, "null\n", "{mode:?}");
    }
}

#[test]
fn unknown_payload_field_is_an_event_error() {
    let (result, _) = run("event E { x: integer }\nemit E { z: 1 }", Mode::Interpret);
    assert_eq!(result.unwrap_err().kind, ErrorKind::EventError);
}

#[test]
fn emit_of_undeclared_event() {
    // Runtime EventError on the interpreter path; the compiler path
    // rejects it during semantic analysis.
    let (result, _) = run("emit Nope { }", Mode::Interpret);
    assert_eq!(result.unwrap_err().kind, ErrorKind::EventError);
    let (result, _) = run("emit Nope { }", Mode::Compile);
    assert_eq!(result.unwrap_err().kind, ErrorKind::SemanticError);
}

#[test]
fn raising_handler_halts_delivery() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let src = "event E { x: integer }\n\
                   register_event(\"E\", action(e) { print(\"one\") let y = 1 / 0 })\n\
                   register_event(\"E\", action(e) { print(\"two\") })\n\
                   emit E { x: 1 }";
        let (result, output) = run(src, mode);
        assert_eq!(result.unwrap_err().kind, ErrorKind::ArithmeticError, "{mode:?}");
        assert_eq!(output, "one\n", "{mode:?}");
    }
}

#[test]
fn handler_return_values_are_ignored() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let src = "event E { x: integer }\n\
                   register_event(\"E\", action(e) { return 99 })\n\
                   register_event(\"E\", action(e) { print(\"ran\") })\n\
                   emit E { x: 1 }";
        let (result, output) = run(src, mode);
        result.unwrap_or_else(|err| panic!("{mode:?}: {err}"));
        assert_eq!(output, "ran\n", "{mode:?}");
    }
}
