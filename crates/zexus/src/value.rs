//! Runtime value type shared by the evaluator and the VM.
//!
//! Immediate values (null, booleans, numbers) are stored inline; containers
//! and callables are shared handles (`Rc`), so cloning a `Value` is cheap.
//! Closure capture goes through [`Cell`]s: an environment entry and every
//! captured reference alias the same `Rc<RefCell<Value>>` slot.

use std::{
    cell::RefCell,
    cmp::Ordering,
    fmt::Write,
    rc::Rc,
};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    ast::{BinOp, UnOp, interp as ia},
    builtins::Builtin,
    env::EnvRef,
    error::{ErrorKind, Pos, RunError, RunResult},
    events::EventDescriptor,
};

/// A single mutable slot shared between an environment entry and any
/// captured reference to it.
pub(crate) type Cell = Rc<RefCell<Value>>;
pub(crate) type ListRef = Rc<RefCell<Vec<Value>>>;
pub(crate) type MapRef = Rc<RefCell<IndexMap<String, Value>>>;

/// Body of a user function on the interpreter path.
#[derive(Debug)]
pub(crate) enum ActionBody {
    Block(Rc<ia::Block>),
    /// Expression-bodied lambda.
    Expr(Rc<ia::Expr>),
}

/// A user function value on the interpreter path: parameter list, body,
/// and the captured (defining) environment.
pub(crate) struct ActionValue {
    pub name: Option<Rc<str>>,
    pub params: Vec<Rc<str>>,
    pub body: ActionBody,
    pub env: EnvRef,
    pub is_async: bool,
    pub pos: Pos,
}

// The captured environment can reference the action itself; Debug skips it
// to stay cycle-safe.
impl std::fmt::Debug for ActionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionValue")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("is_async", &self.is_async)
            .finish_non_exhaustive()
    }
}

/// A compiled function value on the VM path: function-pool index plus the
/// cells snapshotted at creation time.
pub(crate) struct ClosureValue {
    pub name: Option<Rc<str>>,
    pub func: u32,
    pub arity: usize,
    pub cells: Vec<(Rc<str>, Cell)>,
    pub is_async: bool,
}

// Captured cells can reference the closure itself; Debug skips them.
impl std::fmt::Debug for ClosureValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureValue")
            .field("name", &self.name)
            .field("func", &self.func)
            .field("arity", &self.arity)
            .field("is_async", &self.is_async)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of a coroutine. Single-shot: once completed, awaiting again
/// yields the stored result (or re-raises the stored error).
#[derive(Debug)]
pub(crate) enum CoroState {
    New,
    Running,
    Done(Value),
    Failed(RunError),
}

#[derive(Debug)]
pub(crate) enum CoroKind {
    /// Interpreter-side pending call of an async action.
    Action { action: Rc<ActionValue>, args: Vec<Value> },
    /// VM-side pending call of an async closure.
    Closure { closure: Rc<ClosureValue>, args: Vec<Value> },
}

/// An async frame: a paused call, resumable by the scheduler.
#[derive(Debug)]
pub(crate) struct CoroutineValue {
    pub kind: CoroKind,
    pub state: CoroState,
}

/// A caught or raised error reified as a runtime object.
#[derive(Debug)]
pub(crate) struct ErrorValue {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Option<Pos>,
}

/// A declared enum type (`enum Color { Red, Green }`).
#[derive(Debug)]
pub(crate) struct EnumDef {
    pub name: Rc<str>,
    pub variants: Vec<Rc<str>>,
}

/// One variant of a declared enum.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct EnumVal {
    pub enum_name: Rc<str>,
    pub variant: Rc<str>,
}

/// Iterator handle produced by the hidden `__iter__` runtime call.
#[derive(Debug)]
pub(crate) enum IterState {
    List { items: Vec<Value>, idx: usize },
    /// Maps iterate keys in insertion order.
    Map { keys: Vec<String>, idx: usize },
}

impl IterState {
    pub(crate) fn next(&mut self) -> Value {
        match self {
            Self::List { items, idx } => {
                if *idx < items.len() {
                    let value = items[*idx].clone();
                    *idx += 1;
                    value
                } else {
                    Value::IterEnd
                }
            }
            Self::Map { keys, idx } => {
                if *idx < keys.len() {
                    let key = keys[*idx].clone();
                    *idx += 1;
                    Value::Str(Rc::from(key.as_str()))
                } else {
                    Value::IterEnd
                }
            }
        }
    }
}

/// Primary runtime value.
#[derive(Debug, Clone)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    /// Arbitrary-precision integer.
    Int(BigInt),
    Float(f64),
    Str(Rc<str>),
    List(ListRef),
    /// Insertion-ordered string-keyed map.
    Map(MapRef),
    Builtin(Builtin),
    Action(Rc<ActionValue>),
    Closure(Rc<ClosureValue>),
    Coroutine(Rc<RefCell<CoroutineValue>>),
    /// Handle returned by `spawn`.
    TaskHandle(u32),
    DateTime(DateTime<Utc>),
    EnumType(Rc<EnumDef>),
    EnumValue(Rc<EnumVal>),
    EventDescriptor(Rc<EventDescriptor>),
    Error(Rc<ErrorValue>),
    /// Host function declared via `external name from "..."`.
    External(Rc<str>),
    Iterator(Rc<RefCell<IterState>>),
    /// Sentinel returned by `__next__` when exhausted. Never user-visible.
    IterEnd,
}

impl Value {
    #[must_use]
    pub(crate) fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    #[must_use]
    pub(crate) fn int(i: i64) -> Self {
        Self::Int(BigInt::from(i))
    }

    #[must_use]
    pub(crate) fn list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub(crate) fn map(entries: IndexMap<String, Self>) -> Self {
        Self::Map(Rc::new(RefCell::new(entries)))
    }

    #[must_use]
    pub(crate) fn error(kind: ErrorKind, message: impl Into<String>, pos: Option<Pos>) -> Self {
        Self::Error(Rc::new(ErrorValue {
            kind,
            message: message.into(),
            pos,
        }))
    }

    /// Human-facing tag name used in error messages.
    #[must_use]
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Builtin(_) => "builtin",
            Self::Action(_) | Self::Closure(_) => "action",
            Self::Coroutine(_) => "coroutine",
            Self::TaskHandle(_) => "task",
            Self::DateTime(_) => "datetime",
            Self::EnumType(_) => "enum",
            Self::EnumValue(_) => "enum value",
            Self::EventDescriptor(_) => "event",
            Self::Error(_) => "error",
            Self::External(_) => "external action",
            Self::Iterator(_) => "iterator",
            Self::IterEnd => "iterator end",
        }
    }

    /// `false`, `null`, `0`, `0.0`, and empty string/list/map are false;
    /// everything else is true.
    #[must_use]
    pub(crate) fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => !i.is_zero(),
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.borrow().is_empty(),
            Self::Map(m) => !m.borrow().is_empty(),
            _ => true,
        }
    }

    /// Structural equality: numeric across Int/Float, deep for containers,
    /// identity for callables; different tag kinds are never equal.
    #[must_use]
    pub(crate) fn eq_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => {
                a.to_f64().is_some_and(|a| a == *b)
            }
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq_value(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.eq_value(vb))
            }
            (Self::EnumValue(a), Self::EnumValue(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Action(a), Self::Action(b)) => Rc::ptr_eq(a, b),
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            (Self::Coroutine(a), Self::Coroutine(b)) => Rc::ptr_eq(a, b),
            (Self::TaskHandle(a), Self::TaskHandle(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a.kind == b.kind && a.message == b.message,
            (Self::IterEnd, Self::IterEnd) => true,
            _ => false,
        }
    }

    /// Ordering for relational operators: numerics and strings only.
    pub(crate) fn compare(&self, other: &Self, op_symbol: &str) -> RunResult<Ordering> {
        let ord = match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => a.to_f64().and_then(|a| a.partial_cmp(b)),
            (Self::Float(a), Self::Int(b)) => b.to_f64().and_then(|b| a.partial_cmp(&b)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            _ => None,
        };
        ord.ok_or_else(|| {
            RunError::type_error(format!(
                "'{op_symbol}' not supported between {} and {}",
                self.type_name(),
                other.type_name()
            ))
        })
    }

    /// Renders the value the way the `string(x)` builtin does.
    #[must_use]
    pub(crate) fn to_display_string(&self) -> String {
        let mut out = String::new();
        self.write_display(&mut out, true);
        out
    }

    fn write_display(&self, out: &mut String, top_level: bool) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Self::Float(f) => {
                if f.is_finite() {
                    let mut buffer = ryu::Buffer::new();
                    out.push_str(buffer.format(*f));
                } else {
                    let _ = write!(out, "{f}");
                }
            }
            Self::Str(s) => {
                if top_level {
                    out.push_str(s);
                } else {
                    let _ = write!(out, "{s:?}");
                }
            }
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_display(out, false);
                }
                out.push(']');
            }
            Self::Map(entries) => {
                out.push('{');
                for (i, (key, value)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{key:?}: ");
                    value.write_display(out, false);
                }
                out.push('}');
            }
            Self::Builtin(b) => {
                let _ = write!(out, "<builtin {b}>");
            }
            Self::Action(a) => {
                let name = a.name.as_deref().unwrap_or("<anonymous>");
                let _ = write!(out, "<action {name}>");
            }
            Self::Closure(c) => {
                let name = c.name.as_deref().unwrap_or("<anonymous>");
                let _ = write!(out, "<action {name}>");
            }
            Self::Coroutine(_) => out.push_str("<coroutine>"),
            Self::TaskHandle(id) => {
                let _ = write!(out, "<task {id}>");
            }
            Self::DateTime(dt) => {
                out.push_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            Self::EnumType(def) => {
                let _ = write!(out, "<enum {}>", def.name);
            }
            Self::EnumValue(v) => {
                let _ = write!(out, "{}.{}", v.enum_name, v.variant);
            }
            Self::EventDescriptor(d) => {
                let _ = write!(out, "<event {}>", d.name);
            }
            Self::Error(e) => {
                let _ = write!(out, "{}: {}", e.kind, e.message);
            }
            Self::External(name) => {
                let _ = write!(out, "<external {name}>");
            }
            Self::Iterator(_) => out.push_str("<iterator>"),
            Self::IterEnd => out.push_str("<end>"),
        }
    }
}

// --- operators ------------------------------------------------------------

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => i.to_f64(),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Applies a binary operator. `And`/`Or` are not handled here; both engines
/// lower them to short-circuiting control flow.
pub(crate) fn bin_op(op: BinOp, left: &Value, right: &Value) -> RunResult<Value> {
    match op {
        BinOp::Add => add(left, right),
        BinOp::Sub => numeric(op, left, right),
        BinOp::Mul => numeric(op, left, right),
        BinOp::Div => numeric(op, left, right),
        BinOp::Mod => numeric(op, left, right),
        BinOp::Eq => Ok(Value::Bool(left.eq_value(right))),
        BinOp::NotEq => Ok(Value::Bool(!left.eq_value(right))),
        BinOp::Lt => Ok(Value::Bool(left.compare(right, "<")? == Ordering::Less)),
        BinOp::Gt => Ok(Value::Bool(left.compare(right, ">")? == Ordering::Greater)),
        BinOp::LtEq => Ok(Value::Bool(left.compare(right, "<=")? != Ordering::Greater)),
        BinOp::GtEq => Ok(Value::Bool(left.compare(right, ">=")? != Ordering::Less)),
        BinOp::And | BinOp::Or => Err(RunError::internal("logical operator reached bin_op")),
    }
}

fn add(left: &Value, right: &Value) -> RunResult<Value> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::str(s))
        }
        (Value::Str(_), other) | (other, Value::Str(_)) => Err(RunError::type_error(format!(
            "cannot concatenate string and {}",
            other.type_name()
        ))),
        _ => numeric(BinOp::Add, left, right),
    }
}

fn numeric(op: BinOp, left: &Value, right: &Value) -> RunResult<Value> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        return match op {
            BinOp::Add => Ok(Value::Int(a + b)),
            BinOp::Sub => Ok(Value::Int(a - b)),
            BinOp::Mul => Ok(Value::Int(a * b)),
            // Integer division truncates toward zero, like the remainder.
            BinOp::Div => {
                if b.is_zero() {
                    Err(RunError::division_by_zero())
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            BinOp::Mod => {
                if b.is_zero() {
                    Err(RunError::division_by_zero())
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            _ => Err(RunError::internal("non-arithmetic op in numeric")),
        };
    }
    let (Some(a), Some(b)) = (float_of(left), float_of(right)) else {
        return Err(RunError::type_error(format!(
            "unsupported operand types for '{}': {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        )));
    };
    match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        BinOp::Div => {
            if b == 0.0 {
                Err(RunError::division_by_zero())
            } else {
                Ok(Value::Float(a / b))
            }
        }
        BinOp::Mod => {
            if b == 0.0 {
                Err(RunError::division_by_zero())
            } else {
                Ok(Value::Float(a % b))
            }
        }
        _ => Err(RunError::internal("non-arithmetic op in numeric")),
    }
}

/// Applies a unary operator.
pub(crate) fn un_op(op: UnOp, value: &Value) -> RunResult<Value> {
    match op {
        UnOp::Not => Ok(Value::Bool(!value.truthy())),
        UnOp::Neg => match value {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(RunError::type_error(format!("cannot negate {}", other.type_name()))),
        },
    }
}

/// Subscript access: `recv[index]`.
pub(crate) fn index_value(recv: &Value, index: &Value) -> RunResult<Value> {
    match (recv, index) {
        (Value::List(items), Value::Int(i)) => {
            let items = items.borrow();
            let idx = normalize_index(i, items.len())?;
            Ok(items[idx].clone())
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(i, chars.len())?;
            Ok(Value::str(chars[idx].to_string()))
        }
        (Value::Map(entries), Value::Str(key)) => entries
            .borrow()
            .get(key.as_ref())
            .cloned()
            .ok_or_else(|| RunError::new(ErrorKind::NameError, format!("map has no key '{key}'"))),
        (Value::List(_) | Value::Str(_), other) => Err(RunError::type_error(format!(
            "index must be an integer, not {}",
            other.type_name()
        ))),
        (Value::Map(_), other) => Err(RunError::type_error(format!(
            "map key must be a string, not {}",
            other.type_name()
        ))),
        (other, _) => Err(RunError::type_error(format!(
            "{} is not indexable",
            other.type_name()
        ))),
    }
}

/// Subscript assignment: `recv[index] = value`.
pub(crate) fn index_assign(recv: &Value, index: &Value, value: Value) -> RunResult<()> {
    match (recv, index) {
        (Value::List(items), Value::Int(i)) => {
            let mut items = items.borrow_mut();
            let len = items.len();
            let idx = normalize_index(i, len)?;
            items[idx] = value;
            Ok(())
        }
        (Value::Map(entries), Value::Str(key)) => {
            entries.borrow_mut().insert(key.to_string(), value);
            Ok(())
        }
        (Value::List(_), other) => Err(RunError::type_error(format!(
            "index must be an integer, not {}",
            other.type_name()
        ))),
        (Value::Map(_), other) => Err(RunError::type_error(format!(
            "map key must be a string, not {}",
            other.type_name()
        ))),
        (other, _) => Err(RunError::type_error(format!(
            "{} does not support item assignment",
            other.type_name()
        ))),
    }
}

fn normalize_index(i: &BigInt, len: usize) -> RunResult<usize> {
    let idx = i
        .to_i64()
        .ok_or_else(|| RunError::new(ErrorKind::NameError, "index out of range"))?;
    let idx = if idx < 0 { idx + len as i64 } else { idx };
    if idx < 0 || idx as usize >= len {
        return Err(RunError::new(
            ErrorKind::NameError,
            format!("index {i} out of range for length {len}"),
        ));
    }
    Ok(idx as usize)
}

/// Property access: maps expose their entries, errors expose `kind` and
/// `message`, enum types expose their variants.
pub(crate) fn property_access(recv: &Value, name: &str) -> RunResult<Value> {
    match recv {
        Value::Map(entries) => entries
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| RunError::attribute_error("map", name)),
        Value::Error(err) => match name {
            "kind" => Ok(Value::str(<&'static str>::from(err.kind))),
            "message" => Ok(Value::str(&err.message)),
            _ => Err(RunError::attribute_error("error", name)),
        },
        Value::EnumType(def) => {
            for variant in &def.variants {
                if variant.as_ref() == name {
                    return Ok(Value::EnumValue(Rc::new(EnumVal {
                        enum_name: Rc::clone(&def.name),
                        variant: Rc::clone(variant),
                    })));
                }
            }
            Err(RunError::attribute_error(format!("enum {}", def.name), name))
        }
        Value::EnumValue(v) => match name {
            "name" => Ok(Value::Str(Rc::clone(&v.variant))),
            _ => Err(RunError::attribute_error("enum value", name)),
        },
        other => Err(RunError::attribute_error(other.type_name(), name)),
    }
}

/// Property assignment: only maps support it.
pub(crate) fn property_assign(recv: &Value, name: &str, value: Value) -> RunResult<()> {
    match recv {
        Value::Map(entries) => {
            entries.borrow_mut().insert(name.to_owned(), value);
            Ok(())
        }
        other => Err(RunError::type_error(format!(
            "{} does not support property assignment",
            other.type_name()
        ))),
    }
}

/// Builds an iterator handle for `for each` and the `__iter__` runtime call.
pub(crate) fn iter_value(value: &Value) -> RunResult<Value> {
    match value {
        Value::List(items) => Ok(Value::Iterator(Rc::new(RefCell::new(IterState::List {
            items: items.borrow().clone(),
            idx: 0,
        })))),
        Value::Map(entries) => Ok(Value::Iterator(Rc::new(RefCell::new(IterState::Map {
            keys: entries.borrow().keys().cloned().collect(),
            idx: 0,
        })))),
        Value::Iterator(it) => Ok(Value::Iterator(Rc::clone(it))),
        other => Err(RunError::type_error(format!(
            "{} is not iterable",
            other.type_name()
        ))),
    }
}

/// Absolute value helper for `to_hex` on negative integers.
pub(crate) fn bigint_to_hex(i: &BigInt) -> String {
    if i.is_negative() {
        format!("-{:x}", i.abs())
    } else {
        format!("{i:x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_truncates() {
        let v = bin_op(BinOp::Div, &Value::int(7), &Value::int(2)).unwrap();
        assert!(v.eq_value(&Value::int(3)));
        let v = bin_op(BinOp::Div, &Value::int(-7), &Value::int(2)).unwrap();
        assert!(v.eq_value(&Value::int(-3)));
    }

    #[test]
    fn division_by_zero_is_arithmetic_error() {
        let err = bin_op(BinOp::Div, &Value::int(10), &Value::int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ArithmeticError);
        assert_eq!(err.message, "division by zero");
    }

    #[test]
    fn float_operand_promotes() {
        let v = bin_op(BinOp::Add, &Value::int(1), &Value::Float(0.5)).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 1.5));
    }

    #[test]
    fn string_plus_requires_both_strings() {
        let v = bin_op(BinOp::Add, &Value::str("a"), &Value::str("b")).unwrap();
        assert!(v.eq_value(&Value::str("ab")));
        let err = bin_op(BinOp::Add, &Value::str("a"), &Value::int(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn cross_kind_equality_is_false_except_numeric() {
        assert!(!Value::str("1").eq_value(&Value::int(1)));
        assert!(Value::int(1).eq_value(&Value::Float(1.0)));
        assert!(!Value::Bool(true).eq_value(&Value::int(1)));
    }

    #[test]
    fn display_formats_nested_containers() {
        let m = Value::map(IndexMap::from([
            ("a".to_owned(), Value::int(1)),
            ("b".to_owned(), Value::list(vec![Value::str("x"), Value::Null])),
        ]));
        assert_eq!(m.to_display_string(), r#"{"a": 1, "b": ["x", null]}"#);
    }

    #[test]
    fn truthiness_of_empties() {
        assert!(!Value::Null.truthy());
        assert!(!Value::int(0).truthy());
        assert!(!Value::Float(0.0).truthy());
        assert!(!Value::str("").truthy());
        assert!(!Value::list(vec![]).truthy());
        assert!(Value::str("x").truthy());
    }
}
