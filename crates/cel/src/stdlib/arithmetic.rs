//! Arithmetic operators.
//!
//! Integer arithmetic is checked: any result outside the 64-bit range is a
//! fatal `integer overflow` (signed) or `unsigned integer overflow`. Integer
//! division and modulo by zero are fatal. Doubles follow IEEE-754 and
//! propagate NaN and infinities. Concatenation covers strings, bytes and
//! lists; time arithmetic covers durations and timestamps.

use chrono::TimeDelta;

use crate::{
    error::{EvalError, RegistrationError},
    registry::Registry,
    types::CelType,
    value::Value,
};

pub(super) fn install(registry: &mut Registry) -> Result<(), RegistrationError> {
    install_int(registry)?;
    install_uint(registry)?;
    install_double(registry)?;
    install_concat(registry)?;
    install_time(registry)?;
    install_unary(registry)?;
    Ok(())
}

fn overflow() -> EvalError {
    EvalError::new("integer overflow")
}

fn uint_overflow() -> EvalError {
    EvalError::new("unsigned integer overflow")
}

fn int_pair(args: &[Value]) -> Result<(i64, i64), EvalError> {
    match args {
        [Value::Int(a), Value::Int(b)] => Ok((*a, *b)),
        _ => Err(EvalError::new("expected two int operands")),
    }
}

fn uint_pair(args: &[Value]) -> Result<(u64, u64), EvalError> {
    match args {
        [Value::Uint(a), Value::Uint(b)] => Ok((*a, *b)),
        _ => Err(EvalError::new("expected two uint operands")),
    }
}

fn double_pair(args: &[Value]) -> Result<(f64, f64), EvalError> {
    match args {
        [Value::Double(a), Value::Double(b)] => Ok((*a, *b)),
        _ => Err(EvalError::new("expected two double operands")),
    }
}

fn install_int(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_operator("int + int", |args| {
        let (a, b) = int_pair(args)?;
        a.checked_add(b).map(Value::Int).ok_or_else(overflow)
    })?;
    registry.register_operator("int - int", |args| {
        let (a, b) = int_pair(args)?;
        a.checked_sub(b).map(Value::Int).ok_or_else(overflow)
    })?;
    registry.register_operator("int * int", |args| {
        let (a, b) = int_pair(args)?;
        a.checked_mul(b).map(Value::Int).ok_or_else(overflow)
    })?;
    registry.register_operator("int / int", |args| {
        let (a, b) = int_pair(args)?;
        if b == 0 {
            return Err(EvalError::new("division by zero"));
        }
        // i64::MIN / -1 is the one overflowing division.
        a.checked_div(b).map(Value::Int).ok_or_else(overflow)
    })?;
    registry.register_operator("int % int", |args| {
        let (a, b) = int_pair(args)?;
        if b == 0 {
            return Err(EvalError::new("modulo by zero"));
        }
        a.checked_rem(b).map(Value::Int).ok_or_else(overflow)
    })?;
    Ok(())
}

fn install_uint(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_operator("uint + uint", |args| {
        let (a, b) = uint_pair(args)?;
        a.checked_add(b).map(Value::Uint).ok_or_else(uint_overflow)
    })?;
    // Underflow below zero is rejected, not wrapped.
    registry.register_operator("uint - uint", |args| {
        let (a, b) = uint_pair(args)?;
        a.checked_sub(b).map(Value::Uint).ok_or_else(uint_overflow)
    })?;
    registry.register_operator("uint * uint", |args| {
        let (a, b) = uint_pair(args)?;
        a.checked_mul(b).map(Value::Uint).ok_or_else(uint_overflow)
    })?;
    registry.register_operator("uint / uint", |args| {
        let (a, b) = uint_pair(args)?;
        if b == 0 {
            return Err(EvalError::new("division by zero"));
        }
        Ok(Value::Uint(a / b))
    })?;
    registry.register_operator("uint % uint", |args| {
        let (a, b) = uint_pair(args)?;
        if b == 0 {
            return Err(EvalError::new("modulo by zero"));
        }
        Ok(Value::Uint(a % b))
    })?;
    Ok(())
}

fn install_double(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_operator("double + double", |args| {
        let (a, b) = double_pair(args)?;
        Ok(Value::Double(a + b))
    })?;
    registry.register_operator("double - double", |args| {
        let (a, b) = double_pair(args)?;
        Ok(Value::Double(a - b))
    })?;
    registry.register_operator("double * double", |args| {
        let (a, b) = double_pair(args)?;
        Ok(Value::Double(a * b))
    })?;
    // Division by zero on doubles follows IEEE-754 (±Inf, NaN).
    registry.register_operator("double / double", |args| {
        let (a, b) = double_pair(args)?;
        Ok(Value::Double(a / b))
    })?;
    Ok(())
}

fn install_concat(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_operator("string + string", |args| match args {
        [Value::String(a), Value::String(b)] => {
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(a);
            out.push_str(b);
            Ok(Value::string(out))
        }
        _ => Err(EvalError::new("expected two string operands")),
    })?;
    registry.register_operator("bytes + bytes", |args| match args {
        [Value::Bytes(a), Value::Bytes(b)] => {
            let mut out = Vec::with_capacity(a.len() + b.len());
            out.extend_from_slice(a);
            out.extend_from_slice(b);
            Ok(Value::bytes(out))
        }
        _ => Err(EvalError::new("expected two bytes operands")),
    })?;
    // Concatenation requires matching element types. The checker enforces
    // this for statically-known lists; values arriving through `dyn` are
    // re-checked here.
    registry.register_operator("list + list", |args| match args {
        [Value::List(a), Value::List(b)] => {
            if let (Some(left), Some(right)) = (uniform_element_type(a), uniform_element_type(b))
                && left != right
            {
                return Err(EvalError::new(format!("no such overload: list<{left}> + list<{right}>")));
            }
            let mut out = Vec::with_capacity(a.len() + b.len());
            out.extend(a.iter().cloned());
            out.extend(b.iter().cloned());
            Ok(Value::list(out))
        }
        _ => Err(EvalError::new("expected two list operands")),
    })?;
    Ok(())
}

/// The shared runtime element type of a list, or `None` when the list is
/// empty or holds mixed types (either way there is nothing to enforce).
fn uniform_element_type(items: &[Value]) -> Option<CelType> {
    let mut types = items.iter().map(Value::type_of);
    let first = types.next()?;
    types.all(|t| t == first).then_some(first)
}

fn install_time(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_operator("duration + duration", |args| match args {
        [Value::Duration(a), Value::Duration(b)] => {
            a.checked_add(*b).map(Value::Duration).ok_or_else(overflow)
        }
        _ => Err(EvalError::new("expected two duration operands")),
    })?;
    registry.register_operator("duration - duration", |args| match args {
        [Value::Duration(a), Value::Duration(b)] => {
            a.checked_sub(*b).map(Value::Duration).ok_or_else(overflow)
        }
        _ => Err(EvalError::new("expected two duration operands")),
    })?;
    registry.register_operator("timestamp + duration", |args| match args {
        [Value::Timestamp(ts), Value::Duration(ms)] => shift_timestamp(*ts, *ms),
        _ => Err(EvalError::new("expected timestamp + duration")),
    })?;
    registry.register_operator("duration + timestamp", |args| match args {
        [Value::Duration(ms), Value::Timestamp(ts)] => shift_timestamp(*ts, *ms),
        _ => Err(EvalError::new("expected duration + timestamp")),
    })?;
    registry.register_operator("timestamp - duration", |args| match args {
        [Value::Timestamp(ts), Value::Duration(ms)] => shift_timestamp(*ts, -*ms),
        _ => Err(EvalError::new("expected timestamp - duration")),
    })?;
    registry.register_operator("timestamp - timestamp : duration", |args| match args {
        [Value::Timestamp(a), Value::Timestamp(b)] => {
            let delta = a.signed_duration_since(*b);
            Ok(Value::Duration(delta.num_milliseconds()))
        }
        _ => Err(EvalError::new("expected two timestamp operands")),
    })?;
    Ok(())
}

fn shift_timestamp(ts: chrono::DateTime<chrono::Utc>, ms: i64) -> Result<Value, EvalError> {
    ts.checked_add_signed(TimeDelta::milliseconds(ms))
        .map(Value::Timestamp)
        .ok_or_else(|| EvalError::new("timestamp overflow"))
}

fn install_unary(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_function("!_(bool): bool", |args| match args {
        [Value::Bool(b)] => Ok(Value::Bool(!b)),
        _ => Err(EvalError::new("expected a bool operand")),
    })?;
    registry.register_function("-_(int): int", |args| match args {
        [Value::Int(i)] => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        _ => Err(EvalError::new("expected an int operand")),
    })?;
    registry.register_function("-_(double): double", |args| match args {
        [Value::Double(d)] => Ok(Value::Double(-d)),
        _ => Err(EvalError::new("expected a double operand")),
    })?;
    registry.register_function("-_(duration): duration", |args| match args {
        [Value::Duration(ms)] => ms.checked_neg().map(Value::Duration).ok_or_else(overflow),
        _ => Err(EvalError::new("expected a duration operand")),
    })?;
    Ok(())
}
