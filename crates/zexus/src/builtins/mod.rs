//! Builtin functions shared by both engines.
//!
//! Each builtin is an enum variant; strum's snake_case serialization gives
//! the surface name (`FileReadText` -> "file_read_text"). Dispatch happens
//! through [`call`], which receives a [`Host`] so builtins that invoke user
//! callables (`map`, `filter`, `reduce`, event handlers) or touch engine
//! state (`spawn`, `register_event`) stay engine-agnostic.

mod collections;
mod debug;
mod fs;
mod methods;
mod numeric;
mod time;

pub(crate) use methods::call_method;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    env::EnvRef,
    error::{RunError, RunResult},
    io::PrintWriter,
    value::Value,
};

/// Engine services a builtin may need.
///
/// Both the evaluator and the VM implement this; builtins never know which
/// engine is driving them.
pub(crate) trait Host {
    /// Calls a user-supplied callable synchronously.
    fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> RunResult<Value>;

    /// The output writer for `print`/`debug_log`/`debug_trace`.
    fn print(&mut self) -> &mut dyn PrintWriter;

    /// Forwards a renderer-delegation builtin to the renderer collaborator.
    fn renderer_op(&mut self, tag: &str, args: Vec<Value>) -> RunResult<Value>;

    /// Appends an event handler to the engine's registry.
    fn register_event(&mut self, name: &str, handler: Value) -> RunResult<()>;

    /// Enqueues a coroutine on the engine's scheduler; returns the handle.
    fn spawn(&mut self, coro: Value) -> RunResult<Value>;
}

/// Enumerates every builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Builtin {
    String,
    Len,
    First,
    Rest,
    Push,
    Map,
    Filter,
    Reduce,
    DatetimeNow,
    Random,
    Sqrt,
    ToHex,
    FromHex,
    FileReadText,
    FileWriteText,
    FileReadJson,
    FileWriteJson,
    FileListDir,
    DebugLog,
    DebugTrace,
    Sleep,
    Spawn,
    RegisterEvent,
    /// Iterator-protocol hooks used by the `for each` lowering.
    #[strum(serialize = "__iter__")]
    Iter,
    #[strum(serialize = "__next__")]
    Next,
    // Renderer delegation: each forwards to the renderer collaborator.
    DefineScreen,
    DefineComponent,
    RenderScreen,
    AddToScreen,
    SetTheme,
    Mix,
    CreateCanvas,
    DrawLine,
    DrawCircle,
    DrawRectangle,
    DrawText,
    CreateAnimation,
    StartAnimation,
}

impl Builtin {
    /// Arity hint: inclusive (min, max) argument counts.
    #[must_use]
    pub(crate) fn arity(self) -> (usize, usize) {
        match self {
            Self::DatetimeNow | Self::Random => (0, 0),
            Self::String
            | Self::Len
            | Self::First
            | Self::Rest
            | Self::Sqrt
            | Self::ToHex
            | Self::FromHex
            | Self::FileReadText
            | Self::FileReadJson
            | Self::FileListDir
            | Self::DebugTrace
            | Self::Sleep
            | Self::Spawn
            | Self::Iter
            | Self::Next => (1, 1),
            Self::Push
            | Self::Map
            | Self::Filter
            | Self::FileWriteText
            | Self::FileWriteJson
            | Self::RegisterEvent => (2, 2),
            Self::Reduce => (2, 3),
            Self::DebugLog => (1, 2),
            Self::DefineScreen
            | Self::DefineComponent
            | Self::RenderScreen
            | Self::AddToScreen
            | Self::SetTheme
            | Self::Mix
            | Self::CreateCanvas
            | Self::DrawLine
            | Self::DrawCircle
            | Self::DrawRectangle
            | Self::DrawText
            | Self::CreateAnimation
            | Self::StartAnimation => (0, usize::MAX),
        }
    }

    /// Whether this builtin delegates to the renderer collaborator.
    #[must_use]
    fn is_render_op(self) -> bool {
        matches!(
            self,
            Self::DefineScreen
                | Self::DefineComponent
                | Self::RenderScreen
                | Self::AddToScreen
                | Self::SetTheme
                | Self::Mix
                | Self::CreateCanvas
                | Self::DrawLine
                | Self::DrawCircle
                | Self::DrawRectangle
                | Self::DrawText
                | Self::CreateAnimation
                | Self::StartAnimation
        )
    }
}

/// Merges every builtin into the global frame.
pub(crate) fn install(env: &EnvRef) {
    for builtin in Builtin::iter() {
        env.set(<&'static str>::from(builtin), Value::Builtin(builtin));
    }
}

/// Calls a builtin with already-evaluated arguments.
pub(crate) fn call(builtin: Builtin, args: Vec<Value>, host: &mut dyn Host) -> RunResult<Value> {
    let (min, max) = builtin.arity();
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min
        } else if args.len() < min {
            min
        } else {
            max
        };
        return Err(RunError::arity_error(
            <&'static str>::from(builtin),
            expected,
            args.len(),
        ));
    }
    if builtin.is_render_op() {
        return host.renderer_op(<&'static str>::from(builtin), args);
    }
    match builtin {
        Builtin::String => collections::string(args),
        Builtin::Len => collections::len(args),
        Builtin::First => collections::first(args),
        Builtin::Rest => collections::rest(args),
        Builtin::Push => collections::push(args),
        Builtin::Map => collections::map(args, host),
        Builtin::Filter => collections::filter(args, host),
        Builtin::Reduce => collections::reduce(args, host),
        Builtin::Iter => collections::iter(args),
        Builtin::Next => collections::next(args),
        Builtin::DatetimeNow => time::datetime_now(),
        Builtin::Sleep => time::sleep(args),
        Builtin::Random => numeric::random(),
        Builtin::Sqrt => numeric::sqrt(args),
        Builtin::ToHex => numeric::to_hex(args),
        Builtin::FromHex => numeric::from_hex(args),
        Builtin::FileReadText => fs::read_text(args),
        Builtin::FileWriteText => fs::write_text(args),
        Builtin::FileReadJson => fs::read_json(args),
        Builtin::FileWriteJson => fs::write_json(args),
        Builtin::FileListDir => fs::list_dir(args),
        Builtin::DebugLog => debug::debug_log(args, host),
        Builtin::DebugTrace => debug::debug_trace(args, host),
        Builtin::Spawn => {
            let [coro] = take_args(args)?;
            host.spawn(coro)
        }
        Builtin::RegisterEvent => {
            let [name, handler] = take_args(args)?;
            let Value::Str(name) = &name else {
                return Err(RunError::type_error("register_event expects an event name string"));
            };
            if !matches!(handler, Value::Action(_) | Value::Closure(_) | Value::Builtin(_)) {
                return Err(RunError::type_error("register_event expects a callable handler"));
            }
            host.register_event(name, handler)?;
            Ok(Value::Null)
        }
        _ => Err(RunError::internal(format!("unrouted builtin {builtin}"))),
    }
}

/// Converts an argument vector into a fixed-size array; arity was already
/// checked by [`call`].
pub(crate) fn take_args<const N: usize>(args: Vec<Value>) -> RunResult<[Value; N]> {
    args.try_into()
        .map_err(|_| RunError::internal("argument count changed after arity check"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn names_round_trip() {
        assert_eq!(<&'static str>::from(Builtin::FileReadText), "file_read_text");
        assert_eq!(Builtin::from_str("datetime_now").unwrap(), Builtin::DatetimeNow);
        assert_eq!(Builtin::from_str("__iter__").unwrap(), Builtin::Iter);
        assert!(Builtin::from_str("no_such_builtin").is_err());
    }

    #[test]
    fn registry_contains_the_documented_names() {
        for name in [
            "string",
            "len",
            "first",
            "rest",
            "push",
            "map",
            "filter",
            "reduce",
            "datetime_now",
            "random",
            "sqrt",
            "to_hex",
            "from_hex",
            "file_read_text",
            "file_write_text",
            "file_read_json",
            "file_write_json",
            "file_list_dir",
            "debug_log",
            "debug_trace",
            "sleep",
            "spawn",
            "register_event",
            "define_screen",
            "define_component",
            "render_screen",
            "add_to_screen",
            "set_theme",
            "mix",
            "create_canvas",
            "draw_line",
            "draw_circle",
            "draw_rectangle",
            "draw_text",
            "create_animation",
            "start_animation",
        ] {
            assert!(Builtin::from_str(name).is_ok(), "missing builtin {name}");
        }
    }
}
