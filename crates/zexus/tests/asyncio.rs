//! Cooperative async: coroutine creation, spawn/await, FIFO ordering.

use pretty_assertions::assert_eq;
use zexus::{CollectStringPrint, ErrorKind, Mode, Runner};

fn run_async(src: &str, mode: Mode) -> (Result<zexus::Object, zexus::Exception>, String) {
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new(src).mode(mode);
    let result = runner.run_async(&mut print);
    (result, print.into_output())
}

#[test]
fn calling_an_async_action_returns_a_coroutine_unexecuted() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let (result, output) = run_async(
            "action async f() { print(\"ran\") return 1 }\nlet c = f()\nprint(\"before\")\nprint(string(await c))",
            mode,
        );
        result.unwrap_or_else(|err| panic!("{mode:?}: {err}"));
        // The body must not run until the await.
        assert_eq!(output, "before\nran\n1\n", "{mode:?}");
    }
}

#[test]
fn await_on_a_non_coroutine_passes_through() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let (result, _) = run_async("action async f() { return await 42 }\nawait f()", mode);
        assert_eq!(result.unwrap(), zexus::Object::from(42), "{mode:?}");
    }
}

#[test]
fn spawned_tasks_run_fifo() {
    // Without awaits inside the tasks, each runs to completion before the
    // next progresses, in spawn order; main finishes before either.
    for mode in [Mode::Interpret, Mode::Compile] {
        let src = "export let log = []\n\
                   action async f() { log = push(log, \"f\") }\n\
                   action async g() { log = push(log, \"g\") }\n\
                   spawn(f())\n\
                   spawn(g())\n\
                   log = push(log, \"main\")";
        let mut print = CollectStringPrint::new();
        let mut runner = Runner::new(src).mode(mode);
        runner.run_async(&mut print).unwrap();
        let exports = runner.exports();
        assert_eq!(exports.len(), 1, "{mode:?}");
        let zexus::Object::List(log) = &exports[0].1 else {
            panic!("{mode:?}: log export is not a list");
        };
        let log: Vec<_> = log
            .iter()
            .map(|item| match item {
                zexus::Object::Str(s) => s.as_str(),
                other => panic!("{other:?}"),
            })
            .collect();
        assert_eq!(log, ["main", "f", "g"], "{mode:?}");
    }
}

#[test]
fn spawned_tasks_interleave_at_await_boundaries_in_fifo_order() {
    // Two tasks performing two awaits each must interleave at the await
    // boundaries in FIFO order on the VM path.
    let src = "let log = []\n\
               action async tick() { return 0 }\n\
               action async worker(name) {\n\
                 log = push(log, name + \"1\")\n\
                 await tick()\n\
                 log = push(log, name + \"2\")\n\
                 await tick()\n\
                 log = push(log, name + \"3\")\n\
               }\n\
               let cf = worker(\"f\")\n\
               let cg = worker(\"g\")\n\
               spawn(cf)\n\
               spawn(cg)\n\
               await cf\n\
               await cg\n\
               print(string(log))";
    let mut print = CollectStringPrint::new();
    let mut runner = Runner::new(src).mode(Mode::Compile);
    runner.run_async(&mut print).unwrap();
    assert_eq!(
        print.output(),
        "[\"f1\", \"g1\", \"f2\", \"g2\", \"f3\", \"g3\"]\n"
    );
}

#[test]
fn await_on_a_failed_coroutine_raises_the_underlying_error() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let (result, _) = run_async(
            "action async boom() { return 1 / 0 }\nlet c = boom()\nawait c",
            mode,
        );
        assert_eq!(result.unwrap_err().kind, ErrorKind::ArithmeticError, "{mode:?}");
    }
}

#[test]
fn awaited_failure_is_catchable() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let (result, output) = run_async(
            "action async boom() { return 1 / 0 }\n\
             let c = boom()\n\
             try { await c } catch(e) { print(e.kind()) }",
            mode,
        );
        result.unwrap_or_else(|err| panic!("{mode:?}: {err}"));
        assert_eq!(output, "ArithmeticError\n", "{mode:?}");
    }
}

#[test]
fn spawn_rejects_non_coroutines() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let (result, _) = run_async("spawn(42)", mode);
        assert_eq!(result.unwrap_err().kind, ErrorKind::TypeError, "{mode:?}");
    }
}

#[test]
fn spawn_returns_a_task_handle() {
    for mode in [Mode::Interpret, Mode::Compile] {
        let (result, _) = run_async(
            "action async f() { return 1 }\nstring(spawn(f()))",
            mode,
        );
        let rendered = format!("{}", result.unwrap());
        assert!(rendered.contains("task"), "{mode:?}: {rendered}");
    }
}
