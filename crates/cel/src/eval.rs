//! The tree-walking evaluator.
//!
//! Pure: no externally observable side effects. Evaluation is strictly
//! left-to-right; `&&`/`||` short-circuit with strictly bool operands;
//! ternary evaluates only the chosen branch. Operator and function overloads
//! resolve against the runtime types of already-evaluated arguments, which
//! re-resolves anything the checker left as `dyn`. Every failure is a single
//! fatal error carrying the offending node.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::{
    ast::{BinaryOp, CodeRange, Expr, ExprLoc, Literal},
    env::{Context, EnvInner},
    error::{CelError, EvalError},
    registry::{Handler, Overload},
    token::is_reserved_word,
    tracer::EvalTracer,
    types::CelType,
    value::{Key, Value},
};

/// Evaluates `ast` against `ctx` within the environment snapshot `env`.
pub(crate) fn evaluate(
    env: &EnvInner,
    ast: &ExprLoc,
    ctx: &Context,
    tracer: &mut dyn EvalTracer,
) -> Result<Value, CelError> {
    let mut interp = Interp {
        env,
        ctx,
        frames: Vec::new(),
        tracer,
    };
    interp.eval(ast)
}

/// The evaluator state. Macro handlers receive a mutable reference and
/// re-enter [`Interp::eval`] for each element, with the macro variable bound
/// in a local frame.
pub struct Interp<'a> {
    env: &'a EnvInner,
    ctx: &'a Context,
    /// Macro-variable frames, innermost last.
    frames: Vec<(Arc<str>, Value)>,
    tracer: &'a mut dyn EvalTracer,
}

impl Interp<'_> {
    /// Builds a positioned evaluation error.
    pub fn error(&self, message: impl Into<String>, range: CodeRange) -> CelError {
        EvalError::new(message).at(range).into()
    }

    /// Evaluates `node` with one extra binding. The frame is pushed and
    /// popped around the evaluation so it is released on all exit paths.
    pub fn eval_with_binding(&mut self, name: Arc<str>, value: Value, node: &ExprLoc) -> Result<Value, CelError> {
        self.frames.push((name, value));
        let result = self.eval(node);
        self.frames.pop();
        result
    }

    /// Evaluates one node.
    pub fn eval(&mut self, node: &ExprLoc) -> Result<Value, CelError> {
        self.tracer.on_node(node.expr.tag(), node.range);
        match &node.expr {
            Expr::Literal(lit) => Ok(literal_value(lit)),
            Expr::Ident(name) => self.eval_ident(name, node.range),
            Expr::Member { object, field, optional } => {
                let value = self.eval(object)?;
                self.access_member(value, field, *optional, node.range)
            }
            Expr::Index { object, index, optional } => {
                let value = self.eval(object)?;
                let index = self.eval(index)?;
                self.access_index(value, &index, *optional, node.range)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                let arg_ty = value.type_of();
                let Some(overload) = self.env.registry.find(op.registry_name(), None, &[arg_ty.clone()]) else {
                    return Err(self.error(format!("no such overload: {}{arg_ty}", op.symbol()), node.range));
                };
                self.call_function(overload, &[value], node.range)
            }
            Expr::Binary { left, op, right } => self.eval_binary(left, *op, right, node.range),
            Expr::Ternary { cond, then, otherwise } => {
                let cond = self.eval(cond)?;
                let cond = cond
                    .as_bool("ternary condition")
                    .map_err(|e| CelError::from(e.at(node.range)))?;
                if cond { self.eval(then) } else { self.eval(otherwise) }
            }
            Expr::Call { function, args } => self.eval_call(function, None, args, node.range),
            Expr::MethodCall { receiver, method, args } => {
                if let Some(qualified) = self.qualified_name(receiver, method) {
                    return self.eval_call(&qualified, None, args, node.range);
                }
                self.eval_call(method, Some(receiver), args, node.range)
            }
            Expr::ListLit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::list(values))
            }
            Expr::MapLit(entries) => {
                let mut map = crate::value::CelMap::with_capacity(entries.len());
                for (key_node, value_node) in entries {
                    let key_value = self.eval(key_node)?;
                    let key = Key::from_value(&key_value).map_err(|e| CelError::from(e.at(key_node.range)))?;
                    let value = self.eval(value_node)?;
                    // Duplicate keys: last write wins.
                    map.insert(key, value);
                }
                Ok(Value::Map(Arc::new(map)))
            }
        }
    }

    fn eval_ident(&mut self, name: &str, range: CodeRange) -> Result<Value, CelError> {
        if let Some((_, value)) = self.frames.iter().rev().find(|(frame, _)| &**frame == name) {
            return Ok(value.clone());
        }
        if is_reserved_word(name) {
            return Err(self.error(format!("reserved identifier '{name}'"), range));
        }
        let Some(value) = self.ctx.get(name) else {
            return Err(self.error(format!("Unknown variable '{name}'"), range));
        };
        // For variables declared with a registered object type, verify the
        // runtime instance's type before any field is read through it.
        if let Some(CelType::Object(type_name)) = self.env.registry.variable(name) {
            let matches = matches!(value, Value::Object(obj) if obj.type_name() == &**type_name);
            if !matches {
                return Err(self.error(
                    format!("variable '{name}' is not an instance of type '{type_name}'"),
                    range,
                ));
            }
        }
        Ok(value.clone())
    }

    /// Member access with optional propagation. Once a value is optional,
    /// every further access behaves optionally until explicitly unwrapped.
    fn access_member(
        &mut self,
        value: Value,
        field: &str,
        optional: bool,
        range: CodeRange,
    ) -> Result<Value, CelError> {
        match value {
            Value::Optional(None) => Ok(Value::optional_none()),
            Value::Optional(Some(inner)) => match self.try_member(&inner, field, range)? {
                Some(found) => Ok(Value::optional_of(found)),
                None => Ok(Value::optional_none()),
            },
            plain => {
                if optional {
                    match self.try_member(&plain, field, range)? {
                        Some(found) => Ok(Value::optional_of(found)),
                        None => Ok(Value::optional_none()),
                    }
                } else {
                    match self.try_member(&plain, field, range)? {
                        Some(found) => Ok(found),
                        None => Err(self.error(format!("No such key: {field}"), range)),
                    }
                }
            }
        }
    }

    /// Field lookup distinguishing "absent" (`Ok(None)`) from type-level
    /// failure (`Err`). Maps expose exactly their own keys, nothing else.
    fn try_member(&self, value: &Value, field: &str, range: CodeRange) -> Result<Option<Value>, CelError> {
        match value {
            Value::Map(map) => Ok(map.get(&Key::String(Arc::from(field))).cloned()),
            Value::Object(obj) => {
                let decl = self.env.registry.type_decl(obj.type_name());
                let declared_ty = match decl.and_then(|d| d.fields.as_ref()) {
                    Some(fields) => match fields.get(field) {
                        // With declared fields, only those are readable.
                        None => return Ok(None),
                        Some(ty) => Some(ty.clone()),
                    },
                    None => None,
                };
                let Some(found) = obj.field(field) else {
                    return Ok(None);
                };
                if let Some(declared_ty) = declared_ty
                    && !found.type_of().assignable_to(&declared_ty)
                {
                    return Err(self.error(
                        format!("Field '{field}' is not of type '{declared_ty}'"),
                        range,
                    ));
                }
                Ok(Some(found))
            }
            other => Err(self.error(
                format!(
                    "type '{}' does not support field selection (field '{field}')",
                    other.type_of()
                ),
                range,
            )),
        }
    }

    fn access_index(
        &mut self,
        value: Value,
        index: &Value,
        optional: bool,
        range: CodeRange,
    ) -> Result<Value, CelError> {
        match value {
            Value::Optional(None) => Ok(Value::optional_none()),
            Value::Optional(Some(inner)) => match self.try_index(&inner, index, range)? {
                Some(found) => Ok(Value::optional_of(found)),
                None => Ok(Value::optional_none()),
            },
            plain => {
                if optional {
                    match self.try_index(&plain, index, range)? {
                        Some(found) => Ok(Value::optional_of(found)),
                        None => Ok(Value::optional_none()),
                    }
                } else {
                    match self.try_index(&plain, index, range)? {
                        Some(found) => Ok(found),
                        None => Err(self.error(format!("No such key: {index}"), range)),
                    }
                }
            }
        }
    }

    /// Index lookup distinguishing "absent" from failure. List indices must
    /// be integers; map keys must be a valid key kind.
    fn try_index(&self, value: &Value, index: &Value, range: CodeRange) -> Result<Option<Value>, CelError> {
        match value {
            Value::List(items) => {
                let position = match index {
                    Value::Int(i) => usize::try_from(*i).ok(),
                    Value::Uint(u) => usize::try_from(*u).ok(),
                    other => {
                        return Err(self.error(
                            format!("no such overload: list[{}]", other.type_of()),
                            range,
                        ));
                    }
                };
                Ok(position.and_then(|i| items.get(i)).cloned())
            }
            Value::Map(map) => {
                let key = Key::from_value(index).map_err(|e| CelError::from(e.at(range)))?;
                Ok(map.get(&key).cloned())
            }
            other => Err(self.error(
                format!("no such overload: {}[{}]", other.type_of(), index.type_of()),
                range,
            )),
        }
    }

    fn eval_binary(
        &mut self,
        left: &ExprLoc,
        op: BinaryOp,
        right: &ExprLoc,
        range: CodeRange,
    ) -> Result<Value, CelError> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let left = self.eval(left)?;
                let left = left
                    .as_bool(&format!("operand of '{}'", op.symbol()))
                    .map_err(|e| CelError::from(e.at(range)))?;
                // Short-circuit: the right operand runs only when the left
                // does not determine the result.
                let determined = match op {
                    BinaryOp::And => !left,
                    _ => left,
                };
                if determined {
                    return Ok(Value::Bool(left));
                }
                let right = self.eval(right)?;
                let right = right
                    .as_bool(&format!("operand of '{}'", op.symbol()))
                    .map_err(|e| CelError::from(e.at(range)))?;
                Ok(Value::Bool(right))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let types = [left.type_of(), right.type_of()];
                // User overloads take precedence; the built-in structural
                // rule covers everything else.
                if let Some(overload) = self.env.registry.find(op.registry_name(), None, &types) {
                    let args = [left, right];
                    return self.call_function(overload, &args, range);
                }
                let equal = left.cel_eq(&right);
                Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
            }
            _ => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let types = [left.type_of(), right.type_of()];
                let Some(overload) = self.env.registry.find(op.registry_name(), None, &types) else {
                    return Err(self.error(
                        format!("no such overload: {} {} {}", types[0], op.symbol(), types[1]),
                        range,
                    ));
                };
                let args = [left, right];
                self.call_function(overload, &args, range)
            }
        }
    }

    fn eval_call(
        &mut self,
        name: &str,
        receiver: Option<&ExprLoc>,
        args: &[ExprLoc],
        range: CodeRange,
    ) -> Result<Value, CelError> {
        // Macro overloads consume raw AST.
        if let Some(overload) = self.env.registry.find_macro(name, args.len(), receiver.is_some()) {
            let Handler::Macro(handler) = &overload.handler else {
                unreachable!("find_macro returns macro overloads only");
            };
            let handler = Arc::clone(handler);
            return handler(self, receiver, args).map_err(|e| position_error(e, range));
        }

        let mut values: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len() + 1);
        if let Some(receiver) = receiver {
            values.push(self.eval(receiver)?);
        }
        for arg in args {
            values.push(self.eval(arg)?);
        }

        let types: SmallVec<[CelType; 4]> = values.iter().map(Value::type_of).collect();
        let (receiver_ty, arg_types) = if receiver.is_some() {
            (Some(&types[0]), &types[1..])
        } else {
            (None, &types[..])
        };

        let Some(overload) = self.env.registry.find(name, receiver_ty, arg_types) else {
            let mut shown = String::new();
            if let Some(receiver_ty) = receiver_ty {
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
            return Err(self.error(format!("found no matching overload for '{shown}'"), range));
        };
        self.call_function(overload, &values, range)
    }

    /// Invokes a function overload and enforces its declared return type.
    fn call_function(&self, overload: &Overload, args: &[Value], range: CodeRange) -> Result<Value, CelError> {
        let Handler::Function(handler) = &overload.handler else {
            return Err(self.error(
                format!("'{}' is a macro and cannot be called with evaluated arguments", overload.name),
                range,
            ));
        };
        let result = handler(args).map_err(|e| CelError::from(e.at(range)))?;
        if !matches!(overload.ret, CelType::Dyn) && !result.type_of().assignable_to(&overload.ret) {
            return Err(self.error(
                format!(
                    "'{}' returned '{}', declared '{}'",
                    overload.name,
                    result.type_of(),
                    overload.ret
                ),
                range,
            ));
        }
        Ok(result)
    }

    /// Field presence for `has(e.f)`: true when the map has the key or the
    /// object instance exposes the field. On types with declared fields an
    /// undeclared name is simply absent.
    pub(crate) fn member_presence(&mut self, object: &ExprLoc, field: &str, range: CodeRange) -> Result<bool, CelError> {
        let value = self.eval(object)?;
        match value {
            Value::Map(map) => Ok(map.contains_key(&Key::String(Arc::from(field)))),
            Value::Object(obj) => {
                if let Some(fields) = self
                    .env
                    .registry
                    .type_decl(obj.type_name())
                    .and_then(|d| d.fields.as_ref())
                    && !fields.contains_key(field)
                {
                    return Ok(false);
                }
                Ok(obj.field(field).is_some())
            }
            Value::Optional(inner) => match inner {
                None => Ok(false),
                Some(value) => match &*value {
                    Value::Map(map) => Ok(map.contains_key(&Key::String(Arc::from(field)))),
                    _ => Ok(false),
                },
            },
            other => Err(self.error(
                format!(
                    "type '{}' does not support field selection (field '{field}')",
                    other.type_of()
                ),
                range,
            )),
        }
    }

    /// Mirror of the checker's namespace rule: a method on a bare identifier
    /// that names no variable, where `recv.method` is a registered free
    /// function, is a qualified free-function call.
    fn qualified_name(&self, receiver: &ExprLoc, method: &str) -> Option<String> {
        let Expr::Ident(ns) = &receiver.expr else {
            return None;
        };
        if self.frames.iter().any(|(frame, _)| frame == ns)
            || self.ctx.contains_key(&**ns)
            || self.env.registry.variable(ns).is_some()
        {
            return None;
        }
        let qualified = format!("{ns}.{method}");
        self.env
            .registry
            .has_function(&qualified, false)
            .then_some(qualified)
    }
}

/// Attaches `range` to an evaluation error that a macro handler produced
/// without position information.
fn position_error(error: CelError, range: CodeRange) -> CelError {
    match error {
        CelError::Eval(e) => CelError::Eval(e.at(range)),
        other => other,
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Uint(u) => Value::Uint(*u),
        Literal::Double(d) => Value::Double(*d),
        Literal::String(s) => Value::String(Arc::clone(s)),
        Literal::Bytes(b) => Value::Bytes(Arc::clone(b)),
    }
}
