//! Time builtins.

use std::time::Duration;

use chrono::Utc;
use num_traits::ToPrimitive;

use super::take_args;
use crate::{
    error::{RunError, RunResult},
    value::Value,
};

pub(super) fn datetime_now() -> RunResult<Value> {
    Ok(Value::DateTime(Utc::now()))
}

pub(super) fn sleep(args: Vec<Value>) -> RunResult<Value> {
    let [value] = take_args(args)?;
    let seconds = match &value {
        Value::Int(i) => i.to_f64().unwrap_or(0.0),
        Value::Float(f) => *f,
        other => {
            return Err(RunError::type_error(format!(
                "sleep expects a number of seconds, not {}",
                other.type_name()
            )));
        }
    };
    if seconds > 0.0 {
        std::thread::sleep(Duration::from_secs_f64(seconds));
    }
    Ok(Value::Null)
}
