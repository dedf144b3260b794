//! Relational operators.
//!
//! `< <= > >=` are defined for every same-type primitive pair that orders
//! (string, bool, bytes, timestamp, duration) and for all cross-numeric
//! pairs (`int < double`, `uint < int`, ...). Comparisons involving NaN
//! yield false. Equality is not registered here: cross-numeric `==` is a
//! static type error unless routed through `dyn`, and the evaluator's
//! structural rule covers the runtime side.

use std::cmp::Ordering;

use crate::{
    error::{EvalError, RegistrationError},
    registry::Registry,
    value::Value,
};

/// Same-type orderable pairs plus the cross-numeric grid.
const ORDERED_PAIRS: &[(&str, &str)] = &[
    ("int", "int"),
    ("int", "uint"),
    ("int", "double"),
    ("uint", "uint"),
    ("uint", "int"),
    ("uint", "double"),
    ("double", "double"),
    ("double", "int"),
    ("double", "uint"),
    ("string", "string"),
    ("bool", "bool"),
    ("bytes", "bytes"),
    ("timestamp", "timestamp"),
    ("duration", "duration"),
];

pub(super) fn install(registry: &mut Registry) -> Result<(), RegistrationError> {
    for (lhs, rhs) in ORDERED_PAIRS {
        registry.register_operator(&format!("{lhs} < {rhs}"), |args| {
            ordered(args, |o| o == Ordering::Less)
        })?;
        registry.register_operator(&format!("{lhs} <= {rhs}"), |args| {
            ordered(args, |o| o != Ordering::Greater)
        })?;
        registry.register_operator(&format!("{lhs} > {rhs}"), |args| {
            ordered(args, |o| o == Ordering::Greater)
        })?;
        registry.register_operator(&format!("{lhs} >= {rhs}"), |args| {
            ordered(args, |o| o != Ordering::Less)
        })?;
    }
    Ok(())
}

/// Applies `test` to the operand ordering; unordered pairs (NaN) are false.
fn ordered(args: &[Value], test: impl Fn(Ordering) -> bool) -> Result<Value, EvalError> {
    let [left, right] = args else {
        return Err(EvalError::new("expected two operands"));
    };
    Ok(Value::Bool(left.cel_cmp(right).is_some_and(test)))
}
