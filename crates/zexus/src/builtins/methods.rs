//! Method dispatch keyed on the receiver's tag kind and the method name.

use num_bigint::BigInt;

use super::{Builtin, Host, call};
use crate::{
    error::{RunError, RunResult},
    value::Value,
};

/// Resolves `recv.name(args)`. Unknown receiver/method pairs raise
/// `AttributeError`.
pub(crate) fn call_method(
    recv: Value,
    name: &str,
    args: Vec<Value>,
    host: &mut dyn Host,
) -> RunResult<Value> {
    match (&recv, name) {
        // List methods reuse the builtin implementations.
        (Value::List(_), "map") => delegate(Builtin::Map, recv, args, host),
        (Value::List(_), "filter") => delegate(Builtin::Filter, recv, args, host),
        (Value::List(_), "reduce") => delegate(Builtin::Reduce, recv, args, host),
        (Value::List(_), "push") => delegate(Builtin::Push, recv, args, host),
        (Value::List(_), "first") => delegate(Builtin::First, recv, args, host),
        (Value::List(_), "rest") => delegate(Builtin::Rest, recv, args, host),
        (Value::List(_), "len") => delegate(Builtin::Len, recv, args, host),
        (Value::List(items), "contains") => {
            let needle = one_arg("contains", args)?;
            let found = items.borrow().iter().any(|item| item.eq_value(&needle));
            Ok(Value::Bool(found))
        }

        (Value::Map(entries), "keys") => {
            check_no_args(name, &args)?;
            Ok(Value::list(
                entries.borrow().keys().map(Value::str).collect(),
            ))
        }
        (Value::Map(entries), "values") => {
            check_no_args(name, &args)?;
            Ok(Value::list(entries.borrow().values().cloned().collect()))
        }
        (Value::Map(entries), "has") => {
            let key = one_arg("has", args)?;
            let Value::Str(key) = &key else {
                return Err(RunError::type_error("has expects a string key"));
            };
            Ok(Value::Bool(entries.borrow().contains_key(key.as_ref())))
        }
        (Value::Map(_), "len") => delegate(Builtin::Len, recv, args, host),

        (Value::Str(s), "len") => {
            check_no_args(name, &args)?;
            Ok(Value::Int(BigInt::from(s.chars().count())))
        }
        (Value::Str(s), "upper") => {
            check_no_args(name, &args)?;
            Ok(Value::str(s.to_uppercase()))
        }
        (Value::Str(s), "lower") => {
            check_no_args(name, &args)?;
            Ok(Value::str(s.to_lowercase()))
        }
        (Value::Str(s), "trim") => {
            check_no_args(name, &args)?;
            Ok(Value::str(s.trim()))
        }
        (Value::Str(s), "contains") => {
            let needle = one_arg("contains", args)?;
            let Value::Str(needle) = &needle else {
                return Err(RunError::type_error("contains expects a string"));
            };
            Ok(Value::Bool(s.contains(needle.as_ref())))
        }
        (Value::Str(s), "split") => {
            let sep = one_arg("split", args)?;
            let Value::Str(sep) = &sep else {
                return Err(RunError::type_error("split expects a string separator"));
            };
            let parts = if sep.is_empty() {
                s.chars().map(|c| Value::str(c.to_string())).collect()
            } else {
                s.split(sep.as_ref()).map(Value::str).collect()
            };
            Ok(Value::list(parts))
        }

        (Value::Error(err), "kind") => {
            check_no_args(name, &args)?;
            Ok(Value::str(<&'static str>::from(err.kind)))
        }
        (Value::Error(err), "message") => {
            check_no_args(name, &args)?;
            Ok(Value::str(&err.message))
        }

        _ => {
            // A map entry holding a callable doubles as a method
            // (contract actions live in contract maps).
            if let Value::Map(entries) = &recv {
                let callee = entries.borrow().get(name).cloned();
                if let Some(callee) = callee
                    && matches!(callee, Value::Action(_) | Value::Closure(_) | Value::Builtin(_))
                {
                    return host.call_value(&callee, args);
                }
            }
            Err(RunError::attribute_error(recv.type_name(), name))
        }
    }
}

fn delegate(builtin: Builtin, recv: Value, args: Vec<Value>, host: &mut dyn Host) -> RunResult<Value> {
    let mut full = Vec::with_capacity(args.len() + 1);
    full.push(recv);
    full.extend(args);
    call(builtin, full, host)
}

fn check_no_args(name: &str, args: &[Value]) -> RunResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(RunError::arity_error(name, 0, args.len()))
    }
}

fn one_arg(name: &str, args: Vec<Value>) -> RunResult<Value> {
    if args.len() != 1 {
        return Err(RunError::arity_error(name, 1, args.len()));
    }
    Ok(args.into_iter().next().expect("length checked"))
}
