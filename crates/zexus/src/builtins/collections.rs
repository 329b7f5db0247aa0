//! Collection and printing builtins.

use num_bigint::BigInt;

use super::{Host, take_args};
use crate::{
    error::{RunError, RunResult},
    value::{Value, iter_value},
};

pub(super) fn string(args: Vec<Value>) -> RunResult<Value> {
    let [value] = take_args(args)?;
    Ok(Value::str(value.to_display_string()))
}

pub(super) fn len(args: Vec<Value>) -> RunResult<Value> {
    let [value] = take_args(args)?;
    let len = match &value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Map(entries) => entries.borrow().len(),
        other => {
            return Err(RunError::type_error(format!(
                "len expects a string, list, or map, not {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(BigInt::from(len)))
}

pub(super) fn first(args: Vec<Value>) -> RunResult<Value> {
    let [value] = take_args(args)?;
    let Value::List(items) = &value else {
        return Err(RunError::type_error(format!(
            "first expects a list, not {}",
            value.type_name()
        )));
    };
    Ok(items.borrow().first().cloned().unwrap_or(Value::Null))
}

pub(super) fn rest(args: Vec<Value>) -> RunResult<Value> {
    let [value] = take_args(args)?;
    let Value::List(items) = &value else {
        return Err(RunError::type_error(format!(
            "rest expects a list, not {}",
            value.type_name()
        )));
    };
    let items = items.borrow();
    if items.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::list(items[1..].to_vec()))
}

/// Non-mutating append: returns a new list.
pub(super) fn push(args: Vec<Value>) -> RunResult<Value> {
    let [list, value] = take_args(args)?;
    let Value::List(items) = &list else {
        return Err(RunError::type_error(format!(
            "push expects a list, not {}",
            list.type_name()
        )));
    };
    let mut items = items.borrow().clone();
    items.push(value);
    Ok(Value::list(items))
}

pub(super) fn map(args: Vec<Value>, host: &mut dyn Host) -> RunResult<Value> {
    let [list, f] = take_args(args)?;
    let Value::List(items) = &list else {
        return Err(RunError::type_error(format!(
            "map expects a list, not {}",
            list.type_name()
        )));
    };
    let snapshot = items.borrow().clone();
    let mut out = Vec::with_capacity(snapshot.len());
    for item in snapshot {
        out.push(host.call_value(&f, vec![item])?);
    }
    Ok(Value::list(out))
}

pub(super) fn filter(args: Vec<Value>, host: &mut dyn Host) -> RunResult<Value> {
    let [list, f] = take_args(args)?;
    let Value::List(items) = &list else {
        return Err(RunError::type_error(format!(
            "filter expects a list, not {}",
            list.type_name()
        )));
    };
    let snapshot = items.borrow().clone();
    let mut out = Vec::new();
    for item in snapshot {
        if host.call_value(&f, vec![item.clone()])?.truthy() {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

pub(super) fn reduce(args: Vec<Value>, host: &mut dyn Host) -> RunResult<Value> {
    let has_init = args.len() == 3;
    let mut args = args.into_iter();
    let list = args.next().expect("arity checked");
    let f = args.next().expect("arity checked");
    let init = args.next();
    let Value::List(items) = &list else {
        return Err(RunError::type_error(format!(
            "reduce expects a list, not {}",
            list.type_name()
        )));
    };
    let snapshot = items.borrow().clone();
    let mut iter = snapshot.into_iter();
    let mut acc = if has_init {
        init.expect("arity checked")
    } else {
        iter.next()
            .ok_or_else(|| RunError::type_error("reduce of an empty list with no initial value"))?
    };
    for item in iter {
        acc = host.call_value(&f, vec![acc, item])?;
    }
    Ok(acc)
}

/// Hidden `__iter__` hook: builds an iterator handle.
pub(super) fn iter(args: Vec<Value>) -> RunResult<Value> {
    let [value] = take_args(args)?;
    iter_value(&value)
}

/// Hidden `__next__` hook: advances an iterator, yielding the end sentinel
/// when exhausted.
pub(super) fn next(args: Vec<Value>) -> RunResult<Value> {
    let [value] = take_args(args)?;
    let Value::Iterator(state) = &value else {
        return Err(RunError::type_error(format!(
            "__next__ expects an iterator, not {}",
            value.type_name()
        )));
    };
    Ok(state.borrow_mut().next())
}
