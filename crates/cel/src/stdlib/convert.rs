//! Type conversions, `type()` and `dyn()`.
//!
//! Conversions are explicit: arithmetic never coerces between integer and
//! floating types, so `int(x)`, `uint(x)` and `double(x)` are the only
//! numeric bridges. Conversion failures (range, parse) are fatal evaluation
//! errors.

use std::sync::Arc;

use chrono::DateTime;
use num_traits::ToPrimitive;

use crate::{
    error::{EvalError, RegistrationError},
    registry::Registry,
    types::CelType,
    value::{Value, format_double, format_duration_millis, format_timestamp},
};

use super::parse_duration;

/// The canonical strings accepted by `bool(string)`.
const BOOL_STRINGS: &[(&str, bool)] = &[
    ("1", true),
    ("0", false),
    ("t", true),
    ("f", false),
    ("true", true),
    ("false", false),
    ("TRUE", true),
    ("FALSE", false),
    ("True", true),
    ("False", false),
];

pub(super) fn install(registry: &mut Registry) -> Result<(), RegistrationError> {
    install_int(registry)?;
    install_uint(registry)?;
    install_double(registry)?;
    install_string(registry)?;
    install_bool_bytes(registry)?;
    install_time_conversions(registry)?;
    install_type_and_dyn(registry)?;
    Ok(())
}

fn install_int(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_function("int(int): int", |args| Ok(args[0].clone()))?;
    registry.register_function("int(uint): int", |args| match args {
        [Value::Uint(u)] => i64::try_from(*u)
            .map(Value::Int)
            .map_err(|_| EvalError::new("integer overflow")),
        _ => Err(EvalError::new("expected a uint argument")),
    })?;
    // Truncation toward zero; out-of-range (and NaN) is fatal.
    registry.register_function("int(double): int", |args| match args {
        [Value::Double(d)] => d
            .trunc()
            .to_i64()
            .map(Value::Int)
            .ok_or_else(|| EvalError::new("integer overflow")),
        _ => Err(EvalError::new("expected a double argument")),
    })?;
    registry.register_function("int(string): int", |args| match args {
        [Value::String(s)] => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError::new(format!("cannot convert '{s}' to int"))),
        _ => Err(EvalError::new("expected a string argument")),
    })?;
    // Unix seconds.
    registry.register_function("int(timestamp): int", |args| match args {
        [Value::Timestamp(ts)] => Ok(Value::Int(ts.timestamp())),
        _ => Err(EvalError::new("expected a timestamp argument")),
    })?;
    Ok(())
}

fn install_uint(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_function("uint(uint): uint", |args| Ok(args[0].clone()))?;
    registry.register_function("uint(int): uint", |args| match args {
        [Value::Int(i)] => u64::try_from(*i)
            .map(Value::Uint)
            .map_err(|_| EvalError::new("unsigned integer overflow")),
        _ => Err(EvalError::new("expected an int argument")),
    })?;
    registry.register_function("uint(double): uint", |args| match args {
        [Value::Double(d)] => d
            .trunc()
            .to_u64()
            .map(Value::Uint)
            .ok_or_else(|| EvalError::new("unsigned integer overflow")),
        _ => Err(EvalError::new("expected a double argument")),
    })?;
    registry.register_function("uint(string): uint", |args| match args {
        [Value::String(s)] => s
            .parse::<u64>()
            .map(Value::Uint)
            .map_err(|_| EvalError::new(format!("cannot convert '{s}' to uint"))),
        _ => Err(EvalError::new("expected a string argument")),
    })?;
    Ok(())
}

fn install_double(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_function("double(double): double", |args| Ok(args[0].clone()))?;
    registry.register_function("double(int): double", |args| match args {
        [Value::Int(i)] => Ok(Value::Double(*i as f64)),
        _ => Err(EvalError::new("expected an int argument")),
    })?;
    registry.register_function("double(uint): double", |args| match args {
        [Value::Uint(u)] => Ok(Value::Double(*u as f64)),
        _ => Err(EvalError::new("expected a uint argument")),
    })?;
    registry.register_function("double(string): double", |args| match args {
        [Value::String(s)] => s
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| EvalError::new(format!("cannot convert '{s}' to double"))),
        _ => Err(EvalError::new("expected a string argument")),
    })?;
    Ok(())
}

fn install_string(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_function("string(string): string", |args| Ok(args[0].clone()))?;
    registry.register_function("string(int): string", |args| match args {
        [Value::Int(i)] => Ok(Value::string(i.to_string())),
        _ => Err(EvalError::new("expected an int argument")),
    })?;
    registry.register_function("string(uint): string", |args| match args {
        [Value::Uint(u)] => Ok(Value::string(u.to_string())),
        _ => Err(EvalError::new("expected a uint argument")),
    })?;
    registry.register_function("string(double): string", |args| match args {
        [Value::Double(d)] => Ok(Value::string(format_double(*d))),
        _ => Err(EvalError::new("expected a double argument")),
    })?;
    registry.register_function("string(bool): string", |args| match args {
        [Value::Bool(b)] => Ok(Value::string(b.to_string())),
        _ => Err(EvalError::new("expected a bool argument")),
    })?;
    registry.register_function("string(bytes): string", |args| match args {
        [Value::Bytes(b)] => match std::str::from_utf8(b) {
            Ok(s) => Ok(Value::string(s)),
            Err(_) => Err(EvalError::new("bytes are not valid UTF-8")),
        },
        _ => Err(EvalError::new("expected a bytes argument")),
    })?;
    registry.register_function("string(timestamp): string", |args| match args {
        [Value::Timestamp(ts)] => Ok(Value::string(format_timestamp(*ts))),
        _ => Err(EvalError::new("expected a timestamp argument")),
    })?;
    registry.register_function("string(duration): string", |args| match args {
        [Value::Duration(ms)] => Ok(Value::string(format_duration_millis(*ms))),
        _ => Err(EvalError::new("expected a duration argument")),
    })?;
    registry.register_function("string(type): string", |args| match args {
        [Value::Type(t)] => Ok(Value::string(t.to_string())),
        _ => Err(EvalError::new("expected a type argument")),
    })?;
    Ok(())
}

fn install_bool_bytes(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_function("bool(bool): bool", |args| Ok(args[0].clone()))?;
    registry.register_function("bool(string): bool", |args| match args {
        [Value::String(s)] => BOOL_STRINGS
            .iter()
            .find(|(text, _)| *text == &**s)
            .map(|(_, value)| Value::Bool(*value))
            .ok_or_else(|| EvalError::new(format!("cannot convert '{s}' to bool"))),
        _ => Err(EvalError::new("expected a string argument")),
    })?;
    registry.register_function("bytes(bytes): bytes", |args| Ok(args[0].clone()))?;
    registry.register_function("bytes(string): bytes", |args| match args {
        [Value::String(s)] => Ok(Value::bytes(s.as_bytes().to_vec())),
        _ => Err(EvalError::new("expected a string argument")),
    })?;
    Ok(())
}

fn install_time_conversions(registry: &mut Registry) -> Result<(), RegistrationError> {
    // ISO 8601 / RFC 3339 input, truncated to millisecond precision.
    registry.register_function("timestamp(string): timestamp", |args| match args {
        [Value::String(s)] => DateTime::parse_from_rfc3339(s)
            .map(|ts| Value::Timestamp(truncate_to_millis(ts.with_timezone(&chrono::Utc))))
            .map_err(|_| EvalError::new(format!("unrecognized timestamp '{s}'"))),
        _ => Err(EvalError::new("expected a string argument")),
    })?;
    // Integer Unix seconds.
    registry.register_function("timestamp(int): timestamp", |args| match args {
        [Value::Int(seconds)] => DateTime::from_timestamp(*seconds, 0)
            .map(Value::Timestamp)
            .ok_or_else(|| EvalError::new("timestamp out of range")),
        _ => Err(EvalError::new("expected an int argument")),
    })?;
    registry.register_function("timestamp(timestamp): timestamp", |args| Ok(args[0].clone()))?;
    registry.register_function("duration(string): duration", |args| match args {
        [Value::String(s)] => parse_duration(s).map(Value::Duration),
        _ => Err(EvalError::new("expected a string argument")),
    })?;
    registry.register_function("duration(duration): duration", |args| Ok(args[0].clone()))?;
    Ok(())
}

fn install_type_and_dyn(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_function("type(dyn): type", |args| Ok(Value::Type(args[0].type_of())))?;
    // `dyn(x)` is the identity at runtime; its check hook forces the static
    // type to `dyn`, which is the whole point.
    registry.register_function_with_hook(
        "dyn(dyn): dyn",
        Arc::new(|checker, _receiver, args, _range| {
            checker.check(&args[0])?;
            Ok(CelType::Dyn)
        }),
        |args| Ok(args[0].clone()),
    )?;
    Ok(())
}

fn truncate_to_millis(ts: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}
