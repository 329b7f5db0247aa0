//! Evaluator ≡ VM: both engines must produce the same result and the same
//! output for every program in this corpus (no I/O builtins involved).

use pretty_assertions::assert_eq;
use zexus::{CollectStringPrint, Mode, Object, Runner};

const CORPUS: &[&str] = &[
    "1 + 2 * 3",
    "10 / 4",
    "10 / 4.0",
    "7 % 3",
    "-5 + 3",
    "!true",
    "\"a\" + \"b\"",
    "1 < 2 && 2 < 3",
    "false || \"fallback\"",
    "[1, 2, 3][1]",
    "let m = { a: 1, b: 2 }\nm.b",
    "let m = { \"k\": [1, 2] }\nm[\"k\"][0]",
    "let x = 1\nx = x + 41\nx",
    "let l = [1, 2]\nl[0] = 9\nl[0] + l[1]",
    "let m = { a: 1 }\nm.a = 5\nm.a",
    "action add(a, b) { return a + b }\nadd(2, 3)",
    "action fact(n) { if n < 2 { return 1 }\nreturn n * fact(n - 1) }\nfact(10)",
    "let nums = [1, 2, 3, 4]\nnums.filter(lambda(n) -> n % 2 == 0)",
    "let nums = [1, 2, 3, 4]\nnums.reduce(lambda(a, b) -> a + b)",
    "let nums = [1, 2, 3]\nnums.reduce(lambda(a, b) -> a + b, 10)",
    "push([1], 2)",
    "first([])",
    "rest([1, 2, 3])",
    "len(\"hello\")",
    "let total = 0\nfor each n in [1, 2, 3] { total = total + n }\ntotal",
    "let keys = []\nfor each k in { x: 1, y: 2 } { keys = push(keys, k) }\nkeys",
    "let i = 0\nwhile i < 10 { i = i + 2 }\ni",
    "action make() { let c = 0 action inc() { c = c + 1 return c } return inc }\nlet f = make()\nf()\nf()\nf()",
    "try { let x = 1 / 0 } catch(e) { e.kind() }",
    "try { [1][5] } catch(e) { \"caught\" }",
    "if 1 < 2 { \"yes\" } else { \"no\" }",
    "enum State { On, Off }\nState.On == State.On",
    "string({ b: 2, a: 1 })",
    "string([1, \"two\", null, true, 1.5])",
    "\"HeLLo\".lower()",
    "\"a,b,c\".split(\",\")",
    "\"hello\".contains(\"ell\")",
    "to_hex(48879)",
    "from_hex(\"beef\")",
    "sqrt(16)",
    "event Ping { n: integer }\nlet seen = []\nregister_event(\"Ping\", action(e) { seen = push(seen, e.n) })\nemit Ping { n: 1 }\nemit Ping { n: 2 }\nseen",
];

fn run_mode(src: &str, mode: Mode) -> (Object, String) {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new(src).mode(mode);
    let result = runner
        .run(&mut print)
        .unwrap_or_else(|err| panic!("{mode:?} failed for {src:?}: {err}"));
    (result, print.into_output())
}

#[test]
fn evaluator_matches_vm_on_the_corpus() {
    for src in CORPUS {
        let (interp_result, interp_out) = run_mode(src, Mode::Interpret);
        let (vm_result, vm_out) = run_mode(src, Mode::Compile);
        assert_eq!(interp_result, vm_result, "result mismatch for {src:?}");
        assert_eq!(interp_out, vm_out, "output mismatch for {src:?}");
    }
}

#[test]
fn errors_agree_in_kind() {
    let failing = [
        "1 / 0",
        "\"a\" + 1",
        "missing_name",
        "action f(a) { return a }\nf(1, 2)",
        "\"s\".nope()",
        "5[0]",
    ];
    for src in failing {
        let mut print = CollectStringPrint::new();
        let interp_err = Runner::new(src)
            .mode(Mode::Interpret)
            .run(&mut print)
            .unwrap_err();
        let mut print = CollectStringPrint::new();
        let vm_err = Runner::new(src).mode(Mode::Compile).run(&mut print).unwrap_err();
        // The compiler path catches unresolved names earlier.
        if interp_err.kind == zexus::ErrorKind::NameError {
            assert!(
                matches!(vm_err.kind, zexus::ErrorKind::NameError | zexus::ErrorKind::SemanticError),
                "{src:?}: {vm_err:?}"
            );
        } else {
            assert_eq!(interp_err.kind, vm_err.kind, "{src:?}");
        }
    }
}
