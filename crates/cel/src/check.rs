//! The static type checker.
//!
//! Recursive post-order inference: every node receives a resolved type
//! descriptor, with `dyn` remaining only where the source forces it. The
//! checker consults the registry for operator, function and method
//! overloads, and surfaces at most one error per call — the first in
//! post-order, carrying the offending node's range.

use std::sync::Arc;

use crate::{
    ast::{BinaryOp, CodeRange, Expr, ExprLoc, Literal},
    env::EnvInner,
    error::{CelError, TypeError},
    registry::Resolution,
    types::CelType,
};

/// The checker. Hook closures registered with overloads receive a mutable
/// reference to drive recursive checking of macro arguments.
pub struct Checker<'a> {
    env: &'a EnvInner,
    /// Macro-variable bindings, innermost last.
    locals: Vec<(Arc<str>, CelType)>,
}

impl<'a> Checker<'a> {
    pub(crate) fn new(env: &'a EnvInner) -> Self {
        Self {
            env,
            locals: Vec::new(),
        }
    }

    /// Builds a positioned type error.
    pub fn error(&self, message: impl Into<String>, range: CodeRange) -> CelError {
        TypeError::new(message, range).into()
    }

    /// Checks `node` in an environment extended with one binding. The
    /// binding is removed on all exit paths.
    pub fn check_with_binding(&mut self, name: Arc<str>, ty: CelType, node: &ExprLoc) -> Result<CelType, CelError> {
        self.locals.push((name, ty));
        let result = self.check(node);
        self.locals.pop();
        result
    }

    /// Infers the type of `node`.
    pub fn check(&mut self, node: &ExprLoc) -> Result<CelType, CelError> {
        match &node.expr {
            Expr::Literal(lit) => Ok(literal_type(lit)),
            Expr::Ident(name) => self.check_ident(name, node.range),
            Expr::Member { object, field, optional } => {
                let object_ty = self.check(object)?;
                let ty = self.member_result(&object_ty, field, node.range)?;
                Ok(wrap_optional_access(ty, *optional))
            }
            Expr::Index { object, index, optional } => {
                let object_ty = self.check(object)?;
                let index_ty = self.check(index)?;
                let ty = self.index_result(&object_ty, &index_ty, node.range)?;
                Ok(wrap_optional_access(ty, *optional))
            }
            Expr::Unary { op, operand } => {
                let operand_ty = self.check(operand)?;
                match self.env.registry.resolve(op.registry_name(), None, &[operand_ty.clone()]) {
                    Resolution::Single(overload) => Ok(overload.ret.clone()),
                    Resolution::Join(ty) => Ok(ty),
                    Resolution::NotFound => Err(self.error(
                        format!("no such overload: {}{operand_ty}", op.symbol()),
                        node.range,
                    )),
                }
            }
            Expr::Binary { left, op, right } => self.check_binary(left, *op, right, node.range),
            Expr::Ternary { cond, then, otherwise } => {
                let cond_ty = self.check(cond)?;
                if !matches!(cond_ty, CelType::Bool | CelType::Dyn) {
                    return Err(self.error(
                        format!("ternary condition must be bool, got '{cond_ty}'"),
                        cond.range,
                    ));
                }
                let then_ty = self.check(then)?;
                let else_ty = self.check(otherwise)?;
                if then_ty == else_ty {
                    Ok(then_ty)
                } else if matches!(then_ty, CelType::Dyn) || matches!(else_ty, CelType::Dyn) {
                    Ok(CelType::Dyn)
                } else {
                    Err(self.error(
                        format!("ternary branches must have the same type, got '{then_ty}' and '{else_ty}'"),
                        node.range,
                    ))
                }
            }
            Expr::Call { function, args } => self.check_call(function, None, args, node.range),
            Expr::MethodCall { receiver, method, args } => {
                // A method on a bare namespace identifier is a qualified
                // free-function call, e.g. `optional.none()`.
                if let Some(qualified) = self.qualified_name(receiver, method) {
                    return self.check_call(&qualified, None, args, node.range);
                }
                self.check_call(method, Some(receiver), args, node.range)
            }
            Expr::ListLit(items) => {
                let mut element_ty: Option<CelType> = None;
                for item in items {
                    let ty = self.check(item)?;
                    element_ty = Some(self.join_aggregate(element_ty, ty, "list elements", item.range)?);
                }
                Ok(CelType::List(Arc::new(element_ty.unwrap_or(CelType::Dyn))))
            }
            Expr::MapLit(entries) => {
                let mut key_ty: Option<CelType> = None;
                let mut value_ty: Option<CelType> = None;
                for (key, value) in entries {
                    let kt = self.check(key)?;
                    if !valid_key_type(&kt) {
                        return Err(self.error(format!("'{kt}' cannot be used as a map key"), key.range));
                    }
                    key_ty = Some(self.join_aggregate(key_ty, kt, "map keys", key.range)?);
                    let vt = self.check(value)?;
                    value_ty = Some(self.join_aggregate(value_ty, vt, "map values", value.range)?);
                }
                Ok(CelType::Map(
                    Arc::new(key_ty.unwrap_or(CelType::Dyn)),
                    Arc::new(value_ty.unwrap_or(CelType::Dyn)),
                ))
            }
        }
    }

    fn check_ident(&self, name: &str, range: CodeRange) -> Result<CelType, CelError> {
        if let Some((_, ty)) = self.locals.iter().rev().find(|(local, _)| &**local == name) {
            return Ok(ty.clone());
        }
        if let Some(ty) = self.env.registry.variable(name) {
            return Ok(ty.clone());
        }
        if self.env.options.unlisted_variables_are_dyn {
            return Ok(CelType::Dyn);
        }
        Err(self.error(format!("Unknown variable '{name}'"), range))
    }

    /// The element/key/value join for aggregate literals. With the
    /// homogeneity option set, two differing non-`dyn` types are an error;
    /// `dyn`-typed elements (notably `dyn(x)` wrappings) never contribute.
    fn join_aggregate(
        &self,
        acc: Option<CelType>,
        ty: CelType,
        what: &str,
        range: CodeRange,
    ) -> Result<CelType, CelError> {
        let Some(acc) = acc else {
            return Ok(ty);
        };
        if acc == ty {
            return Ok(acc);
        }
        if matches!(acc, CelType::Dyn) {
            return Ok(ty);
        }
        if matches!(ty, CelType::Dyn) {
            return Ok(acc);
        }
        if self.env.options.homogeneous_aggregate_literals {
            Err(self.error(
                format!("{what} must have the same type, got '{acc}' and '{ty}'"),
                range,
            ))
        } else {
            Ok(CelType::Dyn)
        }
    }

    /// The type of `object.field`, also used for the optional-access forms
    /// (wrapped by the caller).
    fn member_result(&self, object_ty: &CelType, field: &str, range: CodeRange) -> Result<CelType, CelError> {
        match object_ty {
            CelType::Dyn => Ok(CelType::Dyn),
            CelType::Map(key, value) => {
                if CelType::String.assignable_to(key) {
                    Ok((**value).clone())
                } else {
                    Err(self.error(
                        format!("fields are not accessible on '{object_ty}': keys are not strings"),
                        range,
                    ))
                }
            }
            CelType::Object(name) => match self.env.registry.type_decl(name) {
                Some(decl) => match &decl.fields {
                    None => Ok(CelType::Dyn),
                    Some(fields) => fields.get(field).cloned().ok_or_else(|| {
                        self.error(format!("undeclared field '{field}' on type '{name}'"), range)
                    }),
                },
                None => Err(self.error(format!("unknown type '{name}'"), range)),
            },
            CelType::Optional(inner) => {
                let inner_ty = self.member_result(inner, field, range)?;
                Ok(CelType::Optional(Arc::new(inner_ty)))
            }
            other => Err(self.error(
                format!("type '{other}' does not support field selection (field '{field}')"),
                range,
            )),
        }
    }

    fn index_result(&self, object_ty: &CelType, index_ty: &CelType, range: CodeRange) -> Result<CelType, CelError> {
        match object_ty {
            CelType::Dyn => Ok(CelType::Dyn),
            CelType::List(element) => match index_ty {
                CelType::Int | CelType::Uint | CelType::Dyn => Ok((**element).clone()),
                other => Err(self.error(format!("no such overload: {object_ty}[{other}]"), range)),
            },
            CelType::Map(key, value) => {
                if index_ty.assignable_to(key) || key.assignable_to(index_ty) {
                    Ok((**value).clone())
                } else {
                    Err(self.error(format!("no such overload: {object_ty}[{index_ty}]"), range))
                }
            }
            CelType::Optional(inner) => {
                let inner_ty = self.index_result(inner, index_ty, range)?;
                Ok(CelType::Optional(Arc::new(inner_ty)))
            }
            other => Err(self.error(format!("no such overload: {other}[{index_ty}]"), range)),
        }
    }

    fn check_binary(
        &mut self,
        left: &ExprLoc,
        op: BinaryOp,
        right: &ExprLoc,
        range: CodeRange,
    ) -> Result<CelType, CelError> {
        let left_ty = self.check(left)?;
        let right_ty = self.check(right)?;
        let mismatch = |checker: &Self| {
            checker.error(
                format!("no such overload: {left_ty} {} {right_ty}", op.symbol()),
                range,
            )
        };

        match op {
            // Short-circuit forms: strictly bool, never registry-dispatched.
            BinaryOp::And | BinaryOp::Or => {
                for ty in [&left_ty, &right_ty] {
                    if !matches!(ty, CelType::Bool | CelType::Dyn) {
                        return Err(mismatch(self));
                    }
                }
                Ok(CelType::Bool)
            }
            // Equality admits user overloads, then the structural rule:
            // equal types, or one side dyn. `int == double`, `int == uint`
            // and `int == null` are type errors unless routed through dyn.
            BinaryOp::Eq | BinaryOp::Ne => {
                match self
                    .env
                    .registry
                    .resolve(op.registry_name(), None, &[left_ty.clone(), right_ty.clone()])
                {
                    Resolution::Single(overload) => Ok(overload.ret.clone()),
                    Resolution::Join(ty) => Ok(ty),
                    Resolution::NotFound => {
                        if left_ty.assignable_to(&right_ty) || right_ty.assignable_to(&left_ty) {
                            Ok(CelType::Bool)
                        } else {
                            Err(mismatch(self))
                        }
                    }
                }
            }
            _ => {
                // List concatenation requires matching element types. The
                // registry entry is generic over lists for runtime dispatch,
                // so the element constraint is enforced here, where both
                // static element types are known.
                if op == BinaryOp::Add
                    && let (CelType::List(left_elem), CelType::List(right_elem)) = (&left_ty, &right_ty)
                {
                    let elem = if left_elem == right_elem || matches!(**right_elem, CelType::Dyn) {
                        (**left_elem).clone()
                    } else if matches!(**left_elem, CelType::Dyn) {
                        (**right_elem).clone()
                    } else {
                        return Err(mismatch(self));
                    };
                    return Ok(CelType::List(Arc::new(elem)));
                }
                match self
                    .env
                    .registry
                    .resolve(op.registry_name(), None, &[left_ty.clone(), right_ty.clone()])
                {
                    Resolution::Single(overload) => Ok(overload.ret.clone()),
                    Resolution::Join(ty) => Ok(ty),
                    Resolution::NotFound => Err(mismatch(self)),
                }
            }
        }
    }

    /// Checks a call. `receiver` is `Some` for method form. Overloads with a
    /// check hook delegate inference to the hook (macros and generic
    /// builtins); everything else goes through argument typing and overload
    /// resolution.
    fn check_call(
        &mut self,
        name: &str,
        receiver: Option<&ExprLoc>,
        args: &[ExprLoc],
        range: CodeRange,
    ) -> Result<CelType, CelError> {
        if let Some(overload) = self
            .env
            .registry
            .find_hooked(name, args.len(), receiver.is_some())
        {
            let hook = Arc::clone(overload.check_hook.as_ref().expect("find_hooked returned a hook"));
            return hook(self, receiver, args, range);
        }

        let receiver_ty = receiver.map(|r| self.check(r)).transpose()?;
        let arg_types = args.iter().map(|a| self.check(a)).collect::<Result<Vec<_>, _>>()?;

        match self.env.registry.resolve(name, receiver_ty.as_ref(), &arg_types) {
            Resolution::Single(overload) => Ok(overload.ret.clone()),
            Resolution::Join(ty) => Ok(ty),
            Resolution::NotFound => {
                let mut shown = String::new();
                if let Some(receiver_ty) = &receiver_ty {
                    shown.push_str(&format!("{receiver_ty}."));
                }
                shown.push_str(name);
                shown.push('(');
                for (i, ty) in arg_types.iter().enumerate() {
                    if i > 0 {
                        shown.push_str(", ");
                    }
                    shown.push_str(&ty.to_string());
                }
                shown.push(')');
                Err(self.error(format!("found no matching overload for '{shown}'"), range))
            }
        }
    }

    /// When `receiver` is a bare identifier that names no variable but
    /// `recv.method` names a registered free function, the call is a
    /// qualified free-function call.
    fn qualified_name(&self, receiver: &ExprLoc, method: &str) -> Option<String> {
        let Expr::Ident(ns) = &receiver.expr else {
            return None;
        };
        if self.locals.iter().any(|(local, _)| local == ns) || self.env.registry.variable(ns).is_some() {
            return None;
        }
        let qualified = format!("{ns}.{method}");
        self.env
            .registry
            .has_function(&qualified, false)
            .then_some(qualified)
    }
}

fn literal_type(lit: &Literal) -> CelType {
    match lit {
        Literal::Null => CelType::Null,
        Literal::Bool(_) => CelType::Bool,
        Literal::Int(_) => CelType::Int,
        Literal::Uint(_) => CelType::Uint,
        Literal::Double(_) => CelType::Double,
        Literal::String(_) => CelType::String,
        Literal::Bytes(_) => CelType::Bytes,
    }
}

/// `a.?f` and `m[?k]` produce an optional even when the receiver is plain;
/// an already-optional result (viral propagation) is not double-wrapped.
fn wrap_optional_access(ty: CelType, optional: bool) -> CelType {
    if optional && !matches!(ty, CelType::Optional(_)) {
        CelType::Optional(Arc::new(ty))
    } else {
        ty
    }
}

fn valid_key_type(ty: &CelType) -> bool {
    matches!(
        ty,
        CelType::Int | CelType::Uint | CelType::Bool | CelType::String | CelType::Dyn
    )
}
