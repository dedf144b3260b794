//! The `optional` namespace and the methods on optional values.
//!
//! Installed only when `enable_optional_types` is set. `optional.of(x)` and
//! `optional.none()` build the two states; `hasValue`, `value`, `orValue`
//! and `or` unwrap them. Member and index accesses on an optional propagate
//! optionality (the viral rule) until one of the unwrapping methods runs;
//! that propagation lives in the evaluator, not here.

use std::sync::Arc;

use crate::{
    error::{EvalError, RegistrationError},
    registry::Registry,
    types::CelType,
    value::Value,
};

pub(super) fn install(registry: &mut Registry) -> Result<(), RegistrationError> {
    // The check hook keeps the wrapped type: `optional.of(1)` is
    // `optional<int>`, not `optional<dyn>`.
    registry.register_function_with_hook(
        "optional.of(dyn): optional<dyn>",
        Arc::new(|checker, _receiver, args, _range| {
            let inner = checker.check(&args[0])?;
            Ok(CelType::Optional(Arc::new(inner)))
        }),
        |args| Ok(Value::optional_of(args[0].clone())),
    )?;
    registry.register_function("optional.none(): optional<dyn>", |_args| Ok(Value::optional_none()))?;

    registry.register_function("optional<dyn>.hasValue(): bool", |args| {
        let inner = receiver(args)?;
        Ok(Value::Bool(inner.is_some()))
    })?;
    registry.register_function("optional<dyn>.value(): dyn", |args| {
        let inner = receiver(args)?;
        match inner {
            Some(value) => Ok((**value).clone()),
            None => Err(EvalError::new("optional.none() dereference")),
        }
    })?;
    registry.register_function("optional<dyn>.orValue(dyn): dyn", |args| {
        let inner = receiver(args)?;
        match inner {
            Some(value) => Ok((**value).clone()),
            None => Ok(args[1].clone()),
        }
    })?;
    registry.register_function("optional<dyn>.or(optional<dyn>): optional<dyn>", |args| {
        let inner = receiver(args)?;
        match inner {
            Some(_) => Ok(args[0].clone()),
            None => match &args[1] {
                Value::Optional(_) => Ok(args[1].clone()),
                other => Err(EvalError::new(format!(
                    "or() expects an optional argument, got '{}'",
                    other.type_of()
                ))),
            },
        }
    })?;
    Ok(())
}

fn receiver(args: &[Value]) -> Result<&Option<Arc<Value>>, EvalError> {
    match args {
        [Value::Optional(inner), ..] => Ok(inner),
        _ => Err(EvalError::new("expected an optional receiver")),
    }
}
