//! The Zexus language core.
//!
//! Zexus is a small, deliberately tolerant dynamic language. One surface
//! grammar feeds two execution paths: a tree-walking interpreter behind a
//! multi-strategy tolerant parser, and a bytecode compiler plus stack VM
//! behind a stricter production parser. Both paths share the runtime value
//! model, the builtin registry, the event system, and the cooperative
//! async model.
//!
//! The host-facing entry point is [`Runner`]; output flows through
//! [`PrintWriter`], terminal rendering through [`RenderBackend`], and
//! results come back as [`Object`] values.

mod analyze;
mod ast;
mod builtins;
pub mod config;
mod env;
mod error;
mod eval;
mod events;
mod exception;
mod io;
mod lexer;
mod object;
mod parse;
mod render;
mod run;
mod token;
mod value;

mod bytecode;

pub use crate::{
    config::SyntaxStyle,
    error::{Diagnostic, ErrorKind, Pos, RecoveryAction, TraceFrame},
    exception::Exception,
    io::{CollectStringPrint, PrintWriter, StdPrint},
    object::Object,
    run::{HostFn, Mode, RenderBackend, Runner},
};

#[cfg(test)]
mod parser_equivalence_tests {
    //! The two parsers must agree structurally on every program both
    //! accept, and the tolerant parser's diagnostics must be empty exactly
    //! when the production parser accepts.

    use pretty_assertions::assert_eq;

    use crate::{
        ast::sexpr,
        parse::{strict, tolerant},
    };

    const ACCEPTED: &[&str] = &[
        "let x = 1 + 2 * 3\nprint(string(x))",
        "let m = { \"a\": 1, b: 2; c: 3, }\nprint(string(m))",
        "try { let x = 10 / 0 } catch(err) { print(\"error: \" + string(err)) }",
        "let nums = [1, 2, 3, 4]\nlet d = nums.map(lambda(n) -> n * 2)",
        "action make() { let c = 0 action inc() { c = c + 1 return c } return inc }",
        "event E { x: integer }\nregister_event(\"E\", action(e) { print(\"got \" + string(e.x)) })\nemit E { x: 7 }",
        "action async f() { return await g() }\naction async g() { return 1 }",
        "enum Color { Red, Green, Blue }\nlet c = Color.Red",
        "protocol P { action f(a) }\ncontract C : P { storage { total: 0 } action f(x) { return x } }",
        "while x < 10 { x = x + 1 }",
        "for each n in nums { print(string(n)) }",
        "external fetch from \"net\"\nexport let answer = 42",
        "if a { print(\"a\") } else if b { print(\"b\") } else { print(\"c\") }",
        "exactly 3 of x\nlet y = 1",
    ];

    #[test]
    fn shapes_agree_on_the_accepted_corpus() {
        for src in ACCEPTED {
            let strict_program = strict::parse(src).unwrap_or_else(|err| panic!("strict rejected {src:?}: {err}"));
            let outcome = tolerant::parse(src);
            assert!(
                outcome.diagnostics.is_empty(),
                "tolerant diagnostics for {src:?}: {:?}",
                outcome.diagnostics
            );
            assert_eq!(sexpr(&outcome.program), sexpr(&strict_program), "shape mismatch for {src:?}");
        }
    }

    #[test]
    fn diagnostics_nonempty_exactly_when_strict_rejects() {
        let rejected = ["let = 5", "let m = { 1: 2 }", "try { x }"];
        for src in rejected {
            assert!(strict::parse(src).is_err(), "strict accepted {src:?}");
            let outcome = tolerant::parse(src);
            assert!(
                !outcome.diagnostics.is_empty(),
                "tolerant produced no diagnostics for {src:?}"
            );
        }
    }

    #[test]
    fn tolerant_is_total_on_garbage() {
        for src in ["", "}}}", "let let let", "action (((", "\"unterminated", "@#!"] {
            let outcome = tolerant::parse(src);
            // Totality: a program always comes back.
            let _ = outcome.program.stmts.len();
        }
    }
}
