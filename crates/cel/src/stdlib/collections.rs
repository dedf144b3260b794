//! Aggregate helpers: polymorphic `size` and membership.
//!
//! `x in list` tests element equality; `k in map` tests key presence.
//! Membership on strings is deliberately not an overload: substring testing
//! is `.contains`, and `"a" in "abc"` is a type error.

use crate::{
    error::{EvalError, RegistrationError},
    registry::Registry,
    value::{Key, Value},
};

pub(super) fn install(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_function("size(list): int", |args| match args {
        [Value::List(items)] => Ok(Value::Int(items.len() as i64)),
        _ => Err(EvalError::new("expected a list argument")),
    })?;
    registry.register_function("list.size(): int", |args| match args {
        [Value::List(items)] => Ok(Value::Int(items.len() as i64)),
        _ => Err(EvalError::new("expected a list receiver")),
    })?;
    registry.register_function("size(map): int", |args| match args {
        [Value::Map(map)] => Ok(Value::Int(map.len() as i64)),
        _ => Err(EvalError::new("expected a map argument")),
    })?;
    registry.register_function("map.size(): int", |args| match args {
        [Value::Map(map)] => Ok(Value::Int(map.len() as i64)),
        _ => Err(EvalError::new("expected a map receiver")),
    })?;

    registry.register_operator("dyn in list", |args| match args {
        [needle, Value::List(items)] => Ok(Value::Bool(items.iter().any(|item| item.cel_eq(needle)))),
        _ => Err(EvalError::new("expected a list on the right of 'in'")),
    })?;
    registry.register_operator("dyn in map", |args| match args {
        [needle, Value::Map(map)] => {
            let key = Key::from_value(needle)?;
            Ok(Value::Bool(map.contains_key(&key)))
        }
        _ => Err(EvalError::new("expected a map on the right of 'in'")),
    })?;
    Ok(())
}
