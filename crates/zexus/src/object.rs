//! Public value type returned to the host.
//!
//! Internal `Value`s are `Rc`-shared and crate-private; `Object` is the
//! owned, comparable mirror handed across the `Runner` boundary, and the
//! form accepted for host-supplied module tables and external-function
//! results.

use std::fmt::{self, Display};

use num_bigint::BigInt;

use crate::{error::ErrorKind, value::Value};

/// An owned runtime value for host consumption.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Str(String),
    List(Vec<Object>),
    /// Insertion-ordered entries.
    Map(Vec<(String, Object)>),
    Error { kind: ErrorKind, message: String },
    /// Anything without a structural host representation (actions,
    /// coroutines, task handles, ...), carried as its printed form.
    Opaque(String),
}

impl Object {
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Int(i.clone()),
            Value::Float(f) => Self::Float(*f),
            Value::Str(s) => Self::Str(s.to_string()),
            Value::List(items) => Self::List(items.borrow().iter().map(Self::from_value).collect()),
            Value::Map(entries) => Self::Map(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_value(v)))
                    .collect(),
            ),
            Value::Error(err) => Self::Error {
                kind: err.kind,
                message: err.message.clone(),
            },
            other => Self::Opaque(other.to_display_string()),
        }
    }

    pub(crate) fn into_value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::Int(i),
            Self::Float(f) => Value::Float(f),
            Self::Str(s) => Value::str(s),
            Self::List(items) => Value::list(items.into_iter().map(Self::into_value).collect()),
            Self::Map(entries) => Value::map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect(),
            ),
            Self::Error { kind, message } => Value::error(kind, message, None),
            Self::Opaque(text) => Value::str(text),
        }
    }
}

impl Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Object::into_value(self.clone()).to_display_string())
    }
}

impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Self::Int(BigInt::from(v))
    }
}

impl From<&str> for Object {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
