//! `has()` and the comprehension macros.
//!
//! These are macro overloads: their `ast` parameters receive the raw
//! argument AST. Each handler evaluates the receiver, then re-enters the
//! evaluator once per element with the macro variable bound in a local
//! frame; the frame is pushed and popped around every iteration so it is
//! released on all exit paths.
//!
//! `all` is true for empty input; `exists_one` requires exactly one match;
//! `filter` yields elements (lists) or keys (maps); `map` has a two-argument
//! transform form and a three-argument filter+transform form. A predicate
//! that produces a non-bool is fatal.

use std::sync::Arc;

use crate::{
    ast::{CodeRange, Expr, ExprLoc},
    check::Checker,
    error::{EvalError, RegistrationError, TypeError},
    eval::Interp,
    registry::{CheckHook, MacroHandler, Registry},
    types::CelType,
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    All,
    Exists,
    ExistsOne,
    Filter,
    Map,
    MapFiltered,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Exists => "exists",
            Self::ExistsOne => "exists_one",
            Self::Filter => "filter",
            Self::Map | Self::MapFiltered => "map",
        }
    }

    fn arity(self) -> usize {
        match self {
            Self::MapFiltered => 3,
            _ => 2,
        }
    }
}

pub(super) fn install(registry: &mut Registry) -> Result<(), RegistrationError> {
    for kind in [
        Kind::All,
        Kind::Exists,
        Kind::ExistsOne,
        Kind::Filter,
        Kind::Map,
        Kind::MapFiltered,
    ] {
        let params = match kind.arity() {
            3 => "ast, ast, ast",
            _ => "ast, ast",
        };
        let ret = match kind {
            Kind::All | Kind::Exists | Kind::ExistsOne => "bool",
            _ => "list",
        };
        registry.register_macro(
            &format!("dyn.{}({params}): {ret}", kind.name()),
            comprehension_hook(kind),
            comprehension_handler(kind),
        )?;
    }

    registry.register_macro("has(ast): bool", has_hook(), has_handler())?;
    Ok(())
}

/// `has(e.f)` accepts exactly a non-optional field-selection argument.
fn has_hook() -> CheckHook {
    Arc::new(|checker, _receiver, args, range| {
        let Expr::Member {
            object,
            optional: false,
            ..
        } = &args[0].expr
        else {
            return Err(checker.error("has() invalid argument", range));
        };
        checker.check(object)?;
        Ok(CelType::Bool)
    })
}

fn has_handler() -> MacroHandler {
    Arc::new(|interp, _receiver, args| {
        let Expr::Member {
            object,
            field,
            optional: false,
        } = &args[0].expr
        else {
            return Err(EvalError::new("has() invalid argument").into());
        };
        let present = interp.member_presence(object, field, args[0].range)?;
        Ok(Value::Bool(present))
    })
}

fn comprehension_hook(kind: Kind) -> CheckHook {
    Arc::new(move |checker, receiver, args, range| {
        let receiver = receiver.expect("comprehension macros are receiver methods");
        let element_ty = element_type(checker, receiver, kind, range)?;
        let var = binding_name(checker, kind, &args[0])?;

        match kind {
            Kind::All | Kind::Exists | Kind::ExistsOne => {
                require_bool_predicate(checker, kind, &var, element_ty, &args[1])?;
                Ok(CelType::Bool)
            }
            Kind::Filter => {
                require_bool_predicate(checker, kind, &var, element_ty.clone(), &args[1])?;
                Ok(CelType::List(Arc::new(element_ty)))
            }
            Kind::Map => {
                let out = checker.check_with_binding(var, element_ty, &args[1])?;
                Ok(CelType::List(Arc::new(out)))
            }
            Kind::MapFiltered => {
                require_bool_predicate(checker, kind, &var, element_ty.clone(), &args[1])?;
                let out = checker.check_with_binding(var, element_ty, &args[2])?;
                Ok(CelType::List(Arc::new(out)))
            }
        }
    })
}

/// Lists iterate elements; maps iterate keys.
fn element_type(checker: &mut Checker<'_>, receiver: &ExprLoc, kind: Kind, range: CodeRange) -> Result<CelType, crate::error::CelError> {
    let receiver_ty = checker.check(receiver)?;
    match receiver_ty {
        CelType::List(element) => Ok((*element).clone()),
        CelType::Map(key, _) => Ok((*key).clone()),
        CelType::Dyn => Ok(CelType::Dyn),
        other => Err(checker.error(
            format!("{}() requires a list or map receiver, got '{other}'", kind.name()),
            range,
        )),
    }
}

fn binding_name(checker: &Checker<'_>, kind: Kind, arg: &ExprLoc) -> Result<Arc<str>, crate::error::CelError> {
    match &arg.expr {
        Expr::Ident(name) => Ok(Arc::clone(name)),
        _ => Err(checker.error(
            format!("{}() binding must be an identifier", kind.name()),
            arg.range,
        )),
    }
}

fn require_bool_predicate(
    checker: &mut Checker<'_>,
    kind: Kind,
    var: &Arc<str>,
    element_ty: CelType,
    predicate: &ExprLoc,
) -> Result<(), crate::error::CelError> {
    let ty = checker.check_with_binding(Arc::clone(var), element_ty, predicate)?;
    if matches!(ty, CelType::Bool | CelType::Dyn) {
        Ok(())
    } else {
        Err(TypeError::new(predicate_message(kind, var, &ty), predicate.range).into())
    }
}

fn predicate_message(kind: Kind, var: &str, got: &impl std::fmt::Display) -> String {
    format!(
        "{}({var}, predicate) predicate must return bool, got '{got}'",
        kind.name()
    )
}

fn comprehension_handler(kind: Kind) -> MacroHandler {
    Arc::new(move |interp, receiver, args| {
        let receiver = receiver.expect("comprehension macros are receiver methods");
        let items = iteration_items(interp, receiver, kind)?;
        let Expr::Ident(var) = &args[0].expr else {
            return Err(EvalError::new(format!("{}() binding must be an identifier", kind.name())).into());
        };

        match kind {
            Kind::All => {
                for item in items {
                    if !predicate(interp, kind, var, item, &args[1])? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Kind::Exists => {
                for item in items {
                    if predicate(interp, kind, var, item, &args[1])? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Kind::ExistsOne => {
                let mut matches = 0usize;
                for item in items {
                    if predicate(interp, kind, var, item, &args[1])? {
                        matches += 1;
                        if matches > 1 {
                            return Ok(Value::Bool(false));
                        }
                    }
                }
                Ok(Value::Bool(matches == 1))
            }
            Kind::Filter => {
                let mut kept = Vec::new();
                for item in items {
                    if predicate(interp, kind, var, item.clone(), &args[1])? {
                        kept.push(item);
                    }
                }
                Ok(Value::list(kept))
            }
            Kind::Map => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(interp.eval_with_binding(Arc::clone(var), item, &args[1])?);
                }
                Ok(Value::list(out))
            }
            Kind::MapFiltered => {
                let mut out = Vec::new();
                for item in items {
                    if predicate(interp, kind, var, item.clone(), &args[1])? {
                        out.push(interp.eval_with_binding(Arc::clone(var), item, &args[2])?);
                    }
                }
                Ok(Value::list(out))
            }
        }
    })
}

fn iteration_items(
    interp: &mut Interp<'_>,
    receiver: &ExprLoc,
    kind: Kind,
) -> Result<Vec<Value>, crate::error::CelError> {
    let value = interp.eval(receiver)?;
    match value {
        Value::List(items) => Ok(items.iter().cloned().collect()),
        Value::Map(map) => Ok(map.keys().map(crate::value::Key::to_value).collect()),
        other => Err(interp.error(
            format!("{}() requires a list or map receiver, got '{}'", kind.name(), other.type_of()),
            receiver.range,
        )),
    }
}

fn predicate(
    interp: &mut Interp<'_>,
    kind: Kind,
    var: &Arc<str>,
    item: Value,
    node: &ExprLoc,
) -> Result<bool, crate::error::CelError> {
    let result = interp.eval_with_binding(Arc::clone(var), item, node)?;
    match result {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::new(predicate_message(kind, var, &other.type_of()))
            .at(node.range)
            .into()),
    }
}
