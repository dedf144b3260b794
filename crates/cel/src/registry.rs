//! The overload registry.
//!
//! Stores function, method and operator overloads keyed by name and arity,
//! plus variable declarations and user-type declarations. Registration
//! detects ambiguous signatures synchronously: two signatures overlap when,
//! for every position, one parameter type is `dyn` or both are equal.
//!
//! An overload whose parameter list contains the marker type `ast` is a
//! *macro overload*: its handler receives the raw argument AST (plus the
//! evaluator) instead of evaluated values.

use std::{fmt::Write as _, sync::Arc};

use ahash::AHashMap;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    ast::{BinaryOp, CodeRange, ExprLoc},
    check::Checker,
    error::{CelError, EvalError, RegistrationError},
    eval::Interp,
    types::CelType,
    value::Value,
};

/// A plain function handler: evaluated arguments in, value out. For method
/// overloads the receiver is argument 0.
pub type FunctionHandler = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// A macro handler: receives the evaluator, the receiver AST (for method
/// macros) and the raw argument AST.
pub type MacroHandler =
    Arc<dyn for<'a, 'b> Fn(&mut Interp<'a>, Option<&'b ExprLoc>, &'b [ExprLoc]) -> Result<Value, CelError> + Send + Sync>;

/// A type-check hook that overrides default return-type inference. Receives
/// the checker, the receiver AST and the argument AST of the call site.
pub type CheckHook = Arc<
    dyn for<'a, 'b> Fn(&mut Checker<'a>, Option<&'b ExprLoc>, &'b [ExprLoc], CodeRange) -> Result<CelType, CelError>
        + Send
        + Sync,
>;

/// The callable payload of an overload.
#[derive(Clone)]
pub(crate) enum Handler {
    Function(FunctionHandler),
    Macro(MacroHandler),
}

/// One overload record: fully-qualified name, optional receiver type,
/// ordered parameter types, declared return type and handler.
#[derive(Clone)]
pub struct Overload {
    pub(crate) name: Arc<str>,
    pub(crate) receiver: Option<CelType>,
    pub(crate) params: SmallVec<[CelType; 4]>,
    pub(crate) ret: CelType,
    pub(crate) handler: Handler,
    pub(crate) check_hook: Option<CheckHook>,
}

impl Overload {
    /// Whether any parameter is the `ast` marker (macro overload).
    #[must_use]
    pub fn is_macro(&self) -> bool {
        matches!(self.handler, Handler::Macro(_))
    }

    /// Human-readable signature, used in error messages.
    #[must_use]
    pub fn signature(&self) -> String {
        let mut out = String::new();
        if let Some(receiver) = &self.receiver {
            let _ = write!(out, "{receiver}.");
        }
        let _ = write!(out, "{}(", self.name);
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{param}");
        }
        out.push(')');
        let _ = write!(out, ": {}", self.ret);
        out
    }
}

impl std::fmt::Debug for Overload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.signature())
    }
}

/// A user-type declaration: optional per-field type constraints. With
/// declared fields, only those fields are readable on instances.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub(crate) fields: Option<IndexMap<String, CelType>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    name: Arc<str>,
    arity: usize,
    method: bool,
}

/// Outcome of overload resolution for the checker.
pub(crate) enum Resolution<'a> {
    /// Exactly one best overload.
    Single(&'a Overload),
    /// Several concrete overloads matched because of a `dyn` argument; the
    /// carried type is the join of their outputs (the common output when
    /// they agree, `dyn` otherwise).
    Join(CelType),
    NotFound,
}

/// The registry of overloads, variable declarations and type declarations.
///
/// Cloning produces an independent registry; handler closures are shared
/// (they are immutable).
#[derive(Debug, Clone, Default)]
pub struct Registry {
    functions: AHashMap<BucketKey, Vec<Overload>>,
    variables: IndexMap<String, CelType>,
    type_decls: AHashMap<String, TypeDecl>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable with the type named by `type_str`. Redeclaration
    /// with a conflicting type is rejected.
    pub fn register_variable(&mut self, name: &str, type_str: &str) -> Result<(), RegistrationError> {
        let ty = CelType::parse(type_str)?;
        if let CelType::Object(type_name) = &ty
            && !self.type_decls.contains_key(type_name.as_ref())
        {
            return Err(RegistrationError::new(format!("unknown type '{type_name}'")));
        }
        if let Some(existing) = self.variables.get(name) {
            if *existing == ty {
                return Ok(());
            }
            return Err(RegistrationError::new(format!(
                "variable '{name}' is already declared with type '{existing}'"
            )));
        }
        self.variables.insert(name.to_owned(), ty);
        Ok(())
    }

    /// Declares a user type. With `fields` present, only the declared fields
    /// are readable on instances and field reads enforce the declared types.
    pub fn register_type(
        &mut self,
        name: &str,
        fields: Option<Vec<(String, String)>>,
    ) -> Result<(), RegistrationError> {
        if self.type_decls.contains_key(name) {
            return Err(RegistrationError::new(format!("type '{name}' is already registered")));
        }
        let fields = match fields {
            None => None,
            Some(pairs) => {
                let mut decls = IndexMap::with_capacity(pairs.len());
                for (field, type_str) in pairs {
                    let ty = CelType::parse(&type_str)?;
                    decls.insert(field, ty);
                }
                Some(decls)
            }
        };
        self.type_decls.insert(name.to_owned(), TypeDecl { fields });
        Ok(())
    }

    /// Registers a function or method overload from a signature string:
    /// `name(T1, T2): R` or `Recv.name(T1): R`. The return type defaults to
    /// `dyn` when omitted.
    pub fn register_function(
        &mut self,
        signature: &str,
        handler: impl Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) -> Result<(), RegistrationError> {
        let parsed = self.parse_signature(signature)?;
        self.add_overload(Overload {
            name: parsed.name,
            receiver: parsed.receiver,
            params: parsed.params,
            ret: parsed.ret.unwrap_or(CelType::Dyn),
            handler: Handler::Function(Arc::new(handler)),
            check_hook: None,
        })
    }

    /// Registers a binary operator overload from the sugar form
    /// `LHS op RHS : R`, equivalent to `_op_(LHS, RHS): R`.
    ///
    /// The return type defaults to the left operand type for arithmetic
    /// operators and to `bool` for comparison and membership operators;
    /// comparison overloads that do declare a return type must declare
    /// `bool`.
    pub fn register_operator(
        &mut self,
        signature: &str,
        handler: impl Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) -> Result<(), RegistrationError> {
        let (op, lhs, rhs, ret) = parse_operator_signature(signature)?;
        let ret = match ret {
            Some(ret) => {
                if op.is_comparison() && ret != CelType::Bool {
                    return Err(RegistrationError::new(format!(
                        "comparison operator overloads must return bool, not '{ret}'"
                    )));
                }
                ret
            }
            None if op.is_comparison() => CelType::Bool,
            None => lhs.clone(),
        };
        self.add_overload(Overload {
            name: Arc::from(op.registry_name()),
            receiver: None,
            params: SmallVec::from_vec(vec![lhs, rhs]),
            ret,
            handler: Handler::Function(Arc::new(handler)),
            check_hook: None,
        })
    }

    /// Registers a macro overload: parameters typed `ast` receive raw AST.
    /// Used by the standard library for the comprehension macros and
    /// available for host-defined macros.
    pub(crate) fn register_macro(
        &mut self,
        signature: &str,
        check_hook: CheckHook,
        handler: MacroHandler,
    ) -> Result<(), RegistrationError> {
        let parsed = self.parse_signature(signature)?;
        self.add_overload(Overload {
            name: parsed.name,
            receiver: parsed.receiver,
            params: parsed.params,
            ret: parsed.ret.unwrap_or(CelType::Dyn),
            handler: Handler::Macro(handler),
            check_hook: Some(check_hook),
        })
    }

    /// Registers a plain function overload with a custom type-check hook.
    pub(crate) fn register_function_with_hook(
        &mut self,
        signature: &str,
        check_hook: CheckHook,
        handler: impl Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) -> Result<(), RegistrationError> {
        let parsed = self.parse_signature(signature)?;
        self.add_overload(Overload {
            name: parsed.name,
            receiver: parsed.receiver,
            params: parsed.params,
            ret: parsed.ret.unwrap_or(CelType::Dyn),
            handler: Handler::Function(Arc::new(handler)),
            check_hook: Some(check_hook),
        })
    }

    /// The declared type of a variable, if any.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&CelType> {
        self.variables.get(name)
    }

    /// The declaration for a registered type, if any.
    #[must_use]
    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.type_decls.get(name)
    }

    /// Whether any overload (of any arity) exists under `name`.
    #[must_use]
    pub fn has_function(&self, name: &str, method: bool) -> bool {
        self.functions.keys().any(|k| k.method == method && &*k.name == name)
    }

    /// Finds the best-matching overload for the given runtime types, or
    /// `None`. Concrete parameters outrank `dyn`; among equally-specific
    /// candidates the earliest registration wins.
    #[must_use]
    pub(crate) fn find(&self, name: &str, receiver: Option<&CelType>, args: &[CelType]) -> Option<&Overload> {
        let bucket = self.bucket(name, args.len(), receiver.is_some())?;
        let mut best: Option<(u32, &Overload)> = None;
        for overload in bucket {
            if !overload_matches(overload, receiver, args) {
                continue;
            }
            let score = specificity(overload, receiver, args);
            match &best {
                Some((best_score, _)) if *best_score >= score => {}
                _ => best = Some((score, overload)),
            }
        }
        best.map(|(_, overload)| overload)
    }

    /// Macro overloads are looked up by name and arity alone; their
    /// arguments are AST, not values.
    #[must_use]
    pub(crate) fn find_macro(&self, name: &str, arity: usize, method: bool) -> Option<&Overload> {
        self.bucket(name, arity, method)?.iter().find(|o| o.is_macro())
    }

    /// The first overload under (name, arity) carrying a type-check hook.
    /// Hooks override default return-type inference for the whole bucket.
    #[must_use]
    pub(crate) fn find_hooked(&self, name: &str, arity: usize, method: bool) -> Option<&Overload> {
        self.bucket(name, arity, method)?.iter().find(|o| o.check_hook.is_some())
    }

    /// Overload resolution for the checker. When several overloads match
    /// because a `dyn` argument widened the search, the outputs are joined.
    pub(crate) fn resolve(&self, name: &str, receiver: Option<&CelType>, args: &[CelType]) -> Resolution<'_> {
        let Some(bucket) = self.bucket(name, args.len(), receiver.is_some()) else {
            return Resolution::NotFound;
        };
        let matching: Vec<&Overload> = bucket
            .iter()
            .filter(|o| overload_matches(o, receiver, args))
            .collect();
        match matching.as_slice() {
            [] => Resolution::NotFound,
            [single] => Resolution::Single(single),
            several => {
                let has_dyn_arg =
                    args.iter().any(CelType::is_dynamic) || receiver.is_some_and(CelType::is_dynamic);
                if has_dyn_arg {
                    let first = several[0].ret.clone();
                    if several.iter().all(|o| o.ret == first) {
                        Resolution::Join(first)
                    } else {
                        Resolution::Join(CelType::Dyn)
                    }
                } else {
                    // Concrete arguments: the specificity tie-break picks one.
                    self.find(name, receiver, args)
                        .map_or(Resolution::NotFound, Resolution::Single)
                }
            }
        }
    }

    fn bucket(&self, name: &str, arity: usize, method: bool) -> Option<&Vec<Overload>> {
        self.functions.get(&BucketKey {
            name: Arc::from(name),
            arity,
            method,
        })
    }

    /// Inserts an overload, rejecting any that would be ambiguous with an
    /// existing signature in the same arity bucket.
    fn add_overload(&mut self, overload: Overload) -> Result<(), RegistrationError> {
        let key = BucketKey {
            name: Arc::clone(&overload.name),
            arity: overload.params.len(),
            method: overload.receiver.is_some(),
        };
        let bucket = self.functions.entry(key).or_default();
        for existing in bucket.iter() {
            if overloads_overlap(existing, &overload) {
                return Err(RegistrationError::new(format!(
                    "overload '{}' overlaps existing '{}'",
                    overload.signature(),
                    existing.signature()
                )));
            }
        }
        bucket.push(overload);
        Ok(())
    }

    /// Parses `name(T1, T2): R` or `Recv.name(T1): R`.
    ///
    /// A dotted prefix is a receiver type when it names a built-in type or a
    /// registered user type; otherwise it stays part of a qualified function
    /// name (`optional.none`).
    fn parse_signature(&self, signature: &str) -> Result<ParsedSignature, RegistrationError> {
        let signature = signature.trim();
        let open = signature
            .find('(')
            .ok_or_else(|| RegistrationError::new(format!("malformed signature '{signature}': missing '('")))?;
        let close = signature
            .rfind(')')
            .filter(|close| *close > open)
            .ok_or_else(|| RegistrationError::new(format!("malformed signature '{signature}': missing ')'")))?;

        let head = signature[..open].trim();
        let (receiver, name) = self.split_receiver(head)?;
        if name.is_empty() {
            return Err(RegistrationError::new(format!(
                "malformed signature '{signature}': missing function name"
            )));
        }

        let params_str = &signature[open + 1..close];
        let mut params = SmallVec::new();
        for part in split_top_level(params_str, ',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            params.push(CelType::parse(part)?);
        }

        let tail = signature[close + 1..].trim();
        let ret = if tail.is_empty() {
            None
        } else if let Some(ret_str) = tail.strip_prefix(':') {
            Some(CelType::parse(ret_str)?)
        } else {
            return Err(RegistrationError::new(format!(
                "malformed signature '{signature}': unexpected '{tail}' after ')'"
            )));
        };

        Ok(ParsedSignature {
            receiver,
            name: Arc::from(name),
            params,
            ret,
        })
    }

    /// Splits `head` into an optional receiver type and the function name.
    fn split_receiver(&self, head: &str) -> Result<(Option<CelType>, String), RegistrationError> {
        let Some(dot) = head.rfind('.') else {
            return Ok((None, head.to_owned()));
        };
        let (prefix, name) = (head[..dot].trim(), head[dot + 1..].trim());
        if is_builtin_type_name(prefix) || self.type_decls.contains_key(prefix) {
            Ok((Some(CelType::parse(prefix)?), name.to_owned()))
        } else {
            // Qualified free-function name, e.g. `optional.none`.
            Ok((None, head.to_owned()))
        }
    }
}

struct ParsedSignature {
    receiver: Option<CelType>,
    name: Arc<str>,
    params: SmallVec<[CelType; 4]>,
    ret: Option<CelType>,
}

/// Whether `name` spells a built-in type (optionally parameterized), so a
/// signature prefix like `string.` or `list<int>.` reads as a receiver.
/// Bare `optional` is excluded: it is the namespace in qualified names like
/// `optional.none`, while `optional<T>.` is a receiver.
fn is_builtin_type_name(name: &str) -> bool {
    let base = name.split('<').next().unwrap_or(name).trim();
    if base == "optional" {
        return name.contains('<');
    }
    matches!(
        base,
        "dyn"
            | "null"
            | "null_type"
            | "bool"
            | "int"
            | "uint"
            | "double"
            | "string"
            | "bytes"
            | "timestamp"
            | "duration"
            | "type"
            | "list"
            | "map"
    )
}

/// Splits on `sep` at angle-bracket depth zero, so `map<string, int>` stays
/// whole inside a parameter list.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + sep.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Parses the operator sugar `LHS op RHS : R`.
fn parse_operator_signature(signature: &str) -> Result<(BinaryOp, CelType, CelType, Option<CelType>), RegistrationError> {
    // Longest symbols first so `<=` is not read as `<`.
    const SYMBOLS: &[&str] = &["==", "!=", "<=", ">=", "&&", "||", "<", ">", "in", "+", "-", "*", "/", "%"];

    let (rest, ret) = split_operator_return(signature);
    let ret = ret.map(CelType::parse).transpose()?;

    let mut depth = 0usize;
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' if depth > 0 || looks_like_type_parameter(rest, i) => {
                depth += 1;
                i += 1;
            }
            b'>' if depth > 0 => {
                depth -= 1;
                i += 1;
            }
            _ if depth == 0 => {
                if let Some(symbol) = SYMBOLS.iter().find(|s| rest[i..].starts_with(**s)) {
                    // `in` must stand alone, not begin an identifier.
                    let is_word = symbol.chars().all(char::is_alphanumeric);
                    let bounded = !is_word
                        || (i > 0
                            && rest.as_bytes()[i - 1].is_ascii_whitespace()
                            && rest
                                .as_bytes()
                                .get(i + symbol.len())
                                .is_none_or(u8::is_ascii_whitespace));
                    if bounded && (i > 0 || !symbol.chars().next().is_some_and(char::is_alphanumeric)) {
                        let lhs = rest[..i].trim();
                        let rhs = rest[i + symbol.len()..].trim();
                        if !lhs.is_empty() && !rhs.is_empty() {
                            let op = BinaryOp::from_symbol(symbol).ok_or_else(|| {
                                RegistrationError::new(format!("unsupported operator '{symbol}'"))
                            })?;
                            return Ok((op, CelType::parse(lhs)?, CelType::parse(rhs)?, ret));
                        }
                    }
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    Err(RegistrationError::new(format!(
        "malformed operator signature '{signature}': no operator found"
    )))
}

/// Heuristic for `<` inside an operator signature: it opens a type parameter
/// when glued to the preceding identifier (`list<`), and is the less-than
/// operator when surrounded by whitespace.
fn looks_like_type_parameter(s: &str, i: usize) -> bool {
    i > 0 && s.as_bytes()[i - 1].is_ascii_alphanumeric()
}

/// Splits `LHS op RHS : R` at the return-type colon, ignoring colons inside
/// type parameters. A bare `<` or `>` operator never counts as a bracket.
fn split_operator_return(signature: &str) -> (&str, Option<&str>) {
    let bytes = signature.as_bytes();
    let mut depth = 0usize;
    for i in 0..bytes.len() {
        match bytes[i] {
            b'<' if depth > 0 || looks_like_type_parameter(signature, i) => depth += 1,
            b'>' if depth > 0 => depth -= 1,
            b':' if depth == 0 => return (&signature[..i], Some(&signature[i + 1..])),
            _ => {}
        }
    }
    (signature, None)
}

/// Assignability check for one overload against concrete or static types.
fn overload_matches(overload: &Overload, receiver: Option<&CelType>, args: &[CelType]) -> bool {
    match (&overload.receiver, receiver) {
        (None, None) => {}
        (Some(param), Some(arg)) => {
            if !arg.assignable_to(param) {
                return false;
            }
        }
        _ => return false,
    }
    overload
        .params
        .iter()
        .zip(args)
        .all(|(param, arg)| matches!(param, CelType::Ast) || arg.assignable_to(param))
}

/// Specificity score for the concrete-beats-`dyn` tie-break.
fn specificity(overload: &Overload, receiver: Option<&CelType>, args: &[CelType]) -> u32 {
    let position = |param: &CelType, arg: &CelType| -> u32 {
        if param == arg {
            2
        } else if matches!(param, CelType::Dyn) {
            0
        } else {
            1
        }
    };
    let mut score = 0;
    if let (Some(param), Some(arg)) = (&overload.receiver, receiver) {
        score += position(param, arg);
    }
    score += overload
        .params
        .iter()
        .zip(args)
        .map(|(param, arg)| position(param, arg))
        .sum::<u32>();
    score
}

/// The registration-time overlap rule of two same-bucket overloads.
fn overloads_overlap(a: &Overload, b: &Overload) -> bool {
    let receivers_overlap = match (&a.receiver, &b.receiver) {
        (None, None) => true,
        (Some(ra), Some(rb)) => ra.overlaps(rb),
        _ => false,
    };
    receivers_overlap
        && a.params
            .iter()
            .zip(b.params.iter())
            .all(|(pa, pb)| pa.overlaps(pb))
}
