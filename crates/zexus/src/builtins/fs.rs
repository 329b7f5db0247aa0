//! Path-based I/O builtins. All failures surface as `IOError`.

use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use super::take_args;
use crate::{
    error::{RunError, RunResult},
    value::Value,
};

fn path_of(value: &Value, builtin: &str) -> RunResult<Rc<str>> {
    match value {
        Value::Str(s) => Ok(Rc::clone(s)),
        other => Err(RunError::type_error(format!(
            "{builtin} expects a path string, not {}",
            other.type_name()
        ))),
    }
}

pub(super) fn read_text(args: Vec<Value>) -> RunResult<Value> {
    let [path] = take_args(args)?;
    let path = path_of(&path, "file_read_text")?;
    std::fs::read_to_string(path.as_ref())
        .map(Value::str)
        .map_err(|err| RunError::io(format!("cannot read '{path}': {err}")))
}

pub(super) fn write_text(args: Vec<Value>) -> RunResult<Value> {
    let [path, content] = take_args(args)?;
    let path = path_of(&path, "file_write_text")?;
    let Value::Str(content) = &content else {
        return Err(RunError::type_error(format!(
            "file_write_text expects string content, not {}",
            content.type_name()
        )));
    };
    std::fs::write(path.as_ref(), content.as_bytes())
        .map(|()| Value::Null)
        .map_err(|err| RunError::io(format!("cannot write '{path}': {err}")))
}

pub(super) fn read_json(args: Vec<Value>) -> RunResult<Value> {
    let [path] = take_args(args)?;
    let path = path_of(&path, "file_read_json")?;
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|err| RunError::io(format!("cannot read '{path}': {err}")))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).map_err(|err| RunError::io(format!("invalid JSON in '{path}': {err}")))?;
    Ok(from_json(json))
}

pub(super) fn write_json(args: Vec<Value>) -> RunResult<Value> {
    let [path, value] = take_args(args)?;
    let path = path_of(&path, "file_write_json")?;
    let json = to_json(&value)?;
    let text = serde_json::to_string_pretty(&json)
        .map_err(|err| RunError::io(format!("cannot serialize JSON: {err}")))?;
    std::fs::write(path.as_ref(), text.as_bytes())
        .map(|()| Value::Null)
        .map_err(|err| RunError::io(format!("cannot write '{path}': {err}")))
}

pub(super) fn list_dir(args: Vec<Value>) -> RunResult<Value> {
    let [path] = take_args(args)?;
    let path = path_of(&path, "file_list_dir")?;
    let entries = std::fs::read_dir(path.as_ref())
        .map_err(|err| RunError::io(format!("cannot list '{path}': {err}")))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| RunError::io(format!("cannot list '{path}': {err}")))?;
        names.push(Value::str(entry.file_name().to_string_lossy()));
    }
    names.sort_by(|a, b| match (a, b) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => std::cmp::Ordering::Equal,
    });
    Ok(Value::list(names))
}

/// JSON -> runtime value. Objects keep their insertion order.
fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(BigInt::from(i))
            } else if let Some(u) = n.as_u64() {
                Value::Int(BigInt::from(u))
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => Value::list(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(entries) => {
            let mut map = IndexMap::new();
            for (key, value) in entries {
                map.insert(key, from_json(value));
            }
            Value::map(map)
        }
    }
}

/// Runtime value -> JSON. Integers beyond the i64 range fall back to their
/// decimal string form.
fn to_json(value: &Value) -> RunResult<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => match i.to_i64() {
            Some(i) => serde_json::Value::from(i),
            None => serde_json::Value::String(i.to_string()),
        },
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.borrow().len());
            for item in items.borrow().iter() {
                out.push(to_json(item)?);
            }
            serde_json::Value::Array(out)
        }
        Value::Map(entries) => {
            let mut out = serde_json::Map::new();
            for (key, item) in entries.borrow().iter() {
                out.insert(key.clone(), to_json(item)?);
            }
            serde_json::Value::Object(out)
        }
        other => {
            return Err(RunError::type_error(format!(
                "{} is not JSON-serializable",
                other.type_name()
            )));
        }
    })
}
