//! Numeric builtins.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use super::take_args;
use crate::{
    error::{RunError, RunResult},
    value::{Value, bigint_to_hex},
};

pub(super) fn random() -> RunResult<Value> {
    Ok(Value::Float(rand::random::<f64>()))
}

pub(super) fn sqrt(args: Vec<Value>) -> RunResult<Value> {
    let [value] = take_args(args)?;
    let x = match &value {
        Value::Int(i) => i.to_f64().unwrap_or(f64::INFINITY),
        Value::Float(f) => *f,
        other => {
            return Err(RunError::type_error(format!(
                "sqrt expects a number, not {}",
                other.type_name()
            )));
        }
    };
    if x < 0.0 {
        return Err(RunError::arithmetic("sqrt of a negative number"));
    }
    Ok(Value::Float(x.sqrt()))
}

/// Lowercase hex without a `0x` prefix.
pub(super) fn to_hex(args: Vec<Value>) -> RunResult<Value> {
    let [value] = take_args(args)?;
    let Value::Int(i) = &value else {
        return Err(RunError::type_error(format!(
            "to_hex expects an integer, not {}",
            value.type_name()
        )));
    };
    Ok(Value::str(bigint_to_hex(i)))
}

pub(super) fn from_hex(args: Vec<Value>) -> RunResult<Value> {
    let [value] = take_args(args)?;
    let Value::Str(s) = &value else {
        return Err(RunError::type_error(format!(
            "from_hex expects a string, not {}",
            value.type_name()
        )));
    };
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.as_ref()),
    };
    let parsed = BigInt::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| RunError::type_error(format!("invalid hex string '{s}'")))?;
    Ok(Value::Int(if negative { -parsed } else { parsed }))
}
