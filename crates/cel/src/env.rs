//! The user-facing environment.
//!
//! An [`Environment`] owns a [`Registry`] and an options record, and exposes
//! the four engine operations: `parse`, `check`, `evaluate`, `serialize`.
//!
//! Environments are copy-on-write: `parse` captures a snapshot, and later
//! registrations clone the inner state, so a [`Program`] keeps evaluating
//! against the environment it was parsed with. One environment may serve
//! concurrent `evaluate` calls; registrations must happen before sharing.

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use crate::{
    ast::ExprLoc,
    check::Checker,
    error::{CelError, EvalError},
    eval,
    parse::parse_expression,
    registry::Registry,
    serialize,
    stdlib,
    tracer::{EvalTracer, NoopTracer},
    types::CelType,
    value::Value,
};

/// The runtime context: a mapping from variable name to value, insertion
/// order preserved. Read-only from the engine's perspective.
pub type Context = IndexMap<String, Value>;

/// Structural limits enforced by the parser. Each violation surfaces as a
/// parse failure naming the exceeded limit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParseLimits {
    /// Maximum total AST node count.
    pub max_ast_nodes: usize,
    /// Maximum nesting depth across aggregate literals, member chains,
    /// index chains and function-call nesting.
    pub max_depth: usize,
    /// Maximum element count of a single list literal.
    pub max_list_elements: usize,
    /// Maximum entry count of a single map literal.
    pub max_map_entries: usize,
    /// Maximum direct argument count of a single call.
    pub max_call_arguments: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_ast_nodes: 100_000,
            max_depth: 250,
            max_list_elements: 1000,
            max_map_entries: 1000,
            max_call_arguments: 32,
        }
    }
}

impl ParseLimits {
    /// Sets the maximum total AST node count.
    #[must_use]
    pub fn max_ast_nodes(mut self, limit: usize) -> Self {
        self.max_ast_nodes = limit;
        self
    }

    /// Sets the maximum structural nesting depth.
    #[must_use]
    pub fn max_depth(mut self, limit: usize) -> Self {
        self.max_depth = limit;
        self
    }

    /// Sets the maximum list literal element count.
    #[must_use]
    pub fn max_list_elements(mut self, limit: usize) -> Self {
        self.max_list_elements = limit;
        self
    }

    /// Sets the maximum map literal entry count.
    #[must_use]
    pub fn max_map_entries(mut self, limit: usize) -> Self {
        self.max_map_entries = limit;
        self
    }

    /// Sets the maximum call argument count.
    #[must_use]
    pub fn max_call_arguments(mut self, limit: usize) -> Self {
        self.max_call_arguments = limit;
        self
    }
}

/// Environment construction options.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EnvOptions {
    /// When set, free variables with no declaration type as `dyn` instead of
    /// failing the check with "Unknown variable".
    pub unlisted_variables_are_dyn: bool,
    /// When set (the default), the checker requires aggregate literal
    /// elements (or keys and values, separately) to share one type.
    /// Elements wrapped in `dyn(x)` are exempt.
    pub homogeneous_aggregate_literals: bool,
    /// Gates the `?.` and `[?` syntax and the `optional` namespace.
    pub enable_optional_types: bool,
    /// Structural parse limits.
    pub limits: ParseLimits,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            unlisted_variables_are_dyn: false,
            homogeneous_aggregate_literals: true,
            enable_optional_types: false,
            limits: ParseLimits::default(),
        }
    }
}

impl EnvOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Types free variables as `dyn` instead of rejecting them.
    #[must_use]
    pub fn unlisted_variables_are_dyn(mut self, enabled: bool) -> Self {
        self.unlisted_variables_are_dyn = enabled;
        self
    }

    /// Enables or disables the aggregate-literal homogeneity check.
    #[must_use]
    pub fn homogeneous_aggregate_literals(mut self, enabled: bool) -> Self {
        self.homogeneous_aggregate_literals = enabled;
        self
    }

    /// Enables optional types: `a.?b`, `m[?k]` and the `optional` namespace.
    #[must_use]
    pub fn enable_optional_types(mut self, enabled: bool) -> Self {
        self.enable_optional_types = enabled;
        self
    }

    /// Overrides the structural parse limits.
    #[must_use]
    pub fn limits(mut self, limits: ParseLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Immutable-after-use environment state shared between an [`Environment`]
/// and the [`Program`]s parsed from it.
#[derive(Debug, Clone)]
pub(crate) struct EnvInner {
    pub(crate) registry: Registry,
    pub(crate) options: EnvOptions,
}

/// The engine facade: a registry of overloads, operators and types, plus
/// option flags, behind a copy-on-write handle.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvInner>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment with default options and the standard library
    /// installed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(EnvOptions::default())
    }

    /// An environment with the given options and the standard library
    /// installed.
    #[must_use]
    pub fn with_options(options: EnvOptions) -> Self {
        let mut registry = Registry::new();
        stdlib::install(&mut registry, &options);
        Self {
            inner: Arc::new(EnvInner { registry, options }),
        }
    }

    /// The environment's options.
    #[must_use]
    pub fn options(&self) -> &EnvOptions {
        &self.inner.options
    }

    fn registry_mut(&mut self) -> &mut Registry {
        &mut Arc::make_mut(&mut self.inner).registry
    }

    /// Declares a variable: `env.register_variable("user", "map<string, dyn>")`.
    pub fn register_variable(&mut self, name: &str, type_str: &str) -> Result<(), CelError> {
        self.registry_mut().register_variable(name, type_str)?;
        Ok(())
    }

    /// Registers a user type, optionally with per-field type constraints.
    /// Instances are host values implementing [`crate::CelObject`] whose
    /// `type_name()` matches `name`.
    pub fn register_type(&mut self, name: &str, fields: Option<Vec<(String, String)>>) -> Result<(), CelError> {
        self.registry_mut().register_type(name, fields)?;
        Ok(())
    }

    /// Registers a function or method overload from a signature string:
    /// `"greet(string): string"` or `"string.shout(): string"`.
    pub fn register_function(
        &mut self,
        signature: &str,
        handler: impl Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) -> Result<(), CelError> {
        self.registry_mut().register_function(signature, handler)?;
        Ok(())
    }

    /// Registers a binary operator overload from the sugar form
    /// `"Vec2 + Vec2 : Vec2"`.
    pub fn register_operator(
        &mut self,
        signature: &str,
        handler: impl Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) -> Result<(), CelError> {
        self.registry_mut().register_operator(signature, handler)?;
        Ok(())
    }

    /// Parses `source` into an evaluable [`Program`], enforcing the
    /// configured limits.
    pub fn parse(&self, source: &str) -> Result<Program, CelError> {
        let ast = parse_expression(
            source,
            &self.inner.options.limits,
            self.inner.options.enable_optional_types,
        )?;
        Ok(Program {
            inner: Arc::clone(&self.inner),
            ast,
            source: Arc::from(source),
        })
    }

    /// Type-checks `source`, producing the inferred result type and the
    /// typed AST, or the first error in post-order.
    pub fn check(&self, source: &str) -> Result<Checked, CelError> {
        let program = self.parse(source)?;
        let result_type = Checker::new(&self.inner).check(&program.ast)?;
        Ok(Checked {
            result_type,
            program,
        })
    }

    /// Parses and immediately evaluates `source` against `ctx`.
    pub fn evaluate(&self, source: &str, ctx: &Context) -> Result<Value, CelError> {
        self.parse(source)?.evaluate(ctx)
    }

    /// Serializes an AST back to canonical source.
    #[must_use]
    pub fn serialize(ast: &ExprLoc) -> String {
        serialize::to_source(ast)
    }
}

/// A successful check result.
#[derive(Debug)]
pub struct Checked {
    /// The inferred type of the whole expression.
    pub result_type: CelType,
    /// The checked program, ready to evaluate.
    pub program: Program,
}

/// A parsed expression bound to the environment snapshot it was parsed with.
///
/// Programs are pure functions of that snapshot: registrations made on the
/// originating [`Environment`] afterwards do not affect them.
#[derive(Debug, Clone)]
pub struct Program {
    inner: Arc<EnvInner>,
    ast: ExprLoc,
    source: Arc<str>,
}

impl Program {
    /// The parsed AST.
    #[must_use]
    pub fn ast(&self) -> &ExprLoc {
        &self.ast
    }

    /// The original source string.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against `ctx`. The context is read-only; evaluation is
    /// strictly left-to-right and fails fast on the first error.
    pub fn evaluate(&self, ctx: &Context) -> Result<Value, CelError> {
        let mut tracer = NoopTracer;
        eval::evaluate(&self.inner, &self.ast, ctx, &mut tracer)
    }

    /// Evaluates with a host-provided tracer observing each visited node.
    pub fn evaluate_with_tracer(&self, ctx: &Context, tracer: &mut dyn EvalTracer) -> Result<Value, CelError> {
        eval::evaluate(&self.inner, &self.ast, ctx, tracer)
    }
}

fn default_environment() -> &'static Environment {
    static DEFAULT: OnceLock<Environment> = OnceLock::new();
    DEFAULT.get_or_init(Environment::new)
}

/// Parses with a default environment.
pub fn parse(source: &str) -> Result<Program, CelError> {
    default_environment().parse(source)
}

/// Type-checks with a default environment.
pub fn check(source: &str) -> Result<Checked, CelError> {
    default_environment().check(source)
}

/// Evaluates with a default environment.
pub fn evaluate(source: &str, ctx: &Context) -> Result<Value, CelError> {
    default_environment().evaluate(source, ctx)
}

/// Serializes an AST back to canonical source.
#[must_use]
pub fn serialize_ast(ast: &ExprLoc) -> String {
    serialize::to_source(ast)
}
