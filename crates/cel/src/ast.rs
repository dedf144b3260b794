//! The abstract syntax tree.
//!
//! Every node carries a [`CodeRange`] (byte offsets into the source) for
//! diagnostics. Structural equality of nodes ignores source positions, which
//! is what the serialize/parse round-trip property compares.

use std::sync::Arc;

use strum::{Display, EnumString, IntoStaticStr};

use crate::error::EvalError;

/// A half-open byte range into the source string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodeRange {
    pub start: u32,
    pub end: u32,
}

impl CodeRange {
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// The range spanning from the start of `self` to the end of `other`.
    #[must_use]
    pub fn to(self, other: Self) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }
}

/// An expression with its source range.
///
/// `PartialEq` compares the expression structure only; two nodes parsed from
/// differently-spaced sources are equal.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExprLoc {
    pub expr: Expr,
    pub range: CodeRange,
}

impl ExprLoc {
    #[must_use]
    pub fn new(expr: Expr, range: CodeRange) -> Self {
        Self { expr, range }
    }
}

impl PartialEq for ExprLoc {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

/// A literal value in source form.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    /// `u`/`U`-suffixed integer literal.
    Uint(u64),
    Double(f64),
    String(Arc<str>),
    /// `b`/`B`-prefixed string literal.
    Bytes(Arc<[u8]>),
}

/// Unary operator tags.
///
/// Uses strum derives for the source-symbol spelling; the string form of a
/// variant is its symbol (`!`, `-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    /// `!_`
    #[strum(serialize = "!")]
    Not,
    /// `-_`
    #[strum(serialize = "-")]
    Neg,
}

impl UnaryOp {
    /// The registry name this operator dispatches through.
    #[must_use]
    pub fn registry_name(self) -> &'static str {
        match self {
            Self::Not => "!_",
            Self::Neg => "-_",
        }
    }

    /// The source symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        self.into()
    }
}

/// Binary operator tags, including membership.
///
/// The strum derives pin each variant's string form to its source symbol,
/// which doubles as the AST externalization tag: `Display`/`IntoStaticStr`
/// render it and `EnumString` parses it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
}

impl BinaryOp {
    /// The source symbol (also the AST externalization tag).
    #[must_use]
    pub fn symbol(self) -> &'static str {
        self.into()
    }

    /// The registry name this operator dispatches through (`_+_` style).
    /// `&&` and `||` never reach the registry; they are short-circuit forms
    /// handled by the evaluator.
    #[must_use]
    pub fn registry_name(self) -> &'static str {
        match self {
            Self::Or => "_||_",
            Self::And => "_&&_",
            Self::Eq => "_==_",
            Self::Ne => "_!=_",
            Self::Lt => "_<_",
            Self::Le => "_<=_",
            Self::Gt => "_>_",
            Self::Ge => "_>=_",
            Self::In => "_in_",
            Self::Add => "_+_",
            Self::Sub => "_-_",
            Self::Mul => "_*_",
            Self::Div => "_/_",
            Self::Mod => "_%_",
        }
    }

    /// Binding strength for parsing and precedence-aware serialization.
    /// Higher binds tighter; ternary sits below all of these.
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne => 3,
            Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::In => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Mod => 6,
        }
    }

    /// Whether this operator is a comparison or membership form, whose
    /// overloads default to (and must declare) a `bool` return type.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::In
        )
    }

    /// Looks an operator up by its source symbol.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        symbol.parse().ok()
    }
}

/// An expression node, labeled by operator tag.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Literal(Literal),
    /// Variable reference.
    Ident(Arc<str>),
    /// Member access `a.f`, or `a.?f` when `optional` is set.
    Member {
        object: Box<ExprLoc>,
        field: Arc<str>,
        optional: bool,
    },
    /// Index access `a[i]`, or `a[?i]` when `optional` is set.
    Index {
        object: Box<ExprLoc>,
        index: Box<ExprLoc>,
        optional: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ExprLoc>,
    },
    Binary {
        left: Box<ExprLoc>,
        op: BinaryOp,
        right: Box<ExprLoc>,
    },
    /// `cond ? then : otherwise`; only the chosen branch is evaluated.
    Ternary {
        cond: Box<ExprLoc>,
        then: Box<ExprLoc>,
        otherwise: Box<ExprLoc>,
    },
    /// Free function call `f(args)`.
    Call {
        function: Arc<str>,
        args: Vec<ExprLoc>,
    },
    /// Receiver method call `recv.m(args)`.
    MethodCall {
        receiver: Box<ExprLoc>,
        method: Arc<str>,
        args: Vec<ExprLoc>,
    },
    /// List literal `[a, b, c]`.
    ListLit(Vec<ExprLoc>),
    /// Map literal `{k: v, ...}`. Duplicate keys are permitted here; the
    /// last write wins at evaluation.
    MapLit(Vec<(ExprLoc, ExprLoc)>),
}

impl Expr {
    /// The operator tag, used by the tracer and the JSON externalization.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Literal(Literal::Uint(_)) => "uint",
            Self::Literal(Literal::Bytes(_)) => "bytes",
            Self::Literal(_) => "lit",
            Self::Ident(_) => "id",
            Self::Member { optional: false, .. } => ".",
            Self::Member { optional: true, .. } => "?.",
            Self::Index { optional: false, .. } => "[]",
            Self::Index { optional: true, .. } => "[?]",
            Self::Unary { op, .. } => match op {
                UnaryOp::Not => "!_",
                UnaryOp::Neg => "-_",
            },
            Self::Binary { op, .. } => op.symbol(),
            Self::Ternary { .. } => "?:",
            Self::Call { .. } => "call",
            Self::MethodCall { .. } => "rcall",
            Self::ListLit(_) => "list",
            Self::MapLit(_) => "map",
        }
    }
}

impl ExprLoc {
    /// Externalizes the AST as a tagged sequence: each node becomes a JSON
    /// array whose first element is the operator tag, and literals appear as
    /// their own JSON values (`uint` and `bytes` literals are tagged, since
    /// JSON cannot distinguish them).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match &self.expr {
            Expr::Literal(lit) => match lit {
                Literal::Null => serde_json::Value::Null,
                Literal::Bool(b) => json!(b),
                Literal::Int(i) => json!(i),
                Literal::Uint(u) => json!(["uint", u]),
                Literal::Double(d) => json!(d),
                Literal::String(s) => json!(&**s),
                Literal::Bytes(b) => json!(["bytes", &**b]),
            },
            Expr::Ident(name) => json!(["id", &**name]),
            Expr::Member { object, field, optional } => {
                json!([if *optional { "?." } else { "." }, object.to_json(), &**field])
            }
            Expr::Index { object, index, optional } => {
                json!([if *optional { "[?]" } else { "[]" }, object.to_json(), index.to_json()])
            }
            Expr::Unary { op, operand } => json!([op.registry_name(), operand.to_json()]),
            Expr::Binary { left, op, right } => json!([op.symbol(), left.to_json(), right.to_json()]),
            Expr::Ternary { cond, then, otherwise } => {
                json!(["?:", cond.to_json(), then.to_json(), otherwise.to_json()])
            }
            Expr::Call { function, args } => {
                let args: Vec<_> = args.iter().map(Self::to_json).collect();
                json!(["call", &**function, args])
            }
            Expr::MethodCall { receiver, method, args } => {
                let args: Vec<_> = args.iter().map(Self::to_json).collect();
                json!(["rcall", &**method, receiver.to_json(), args])
            }
            Expr::ListLit(items) => {
                let items: Vec<_> = items.iter().map(Self::to_json).collect();
                json!(["list", items])
            }
            Expr::MapLit(entries) => {
                let entries: Vec<_> = entries.iter().map(|(k, v)| json!([k.to_json(), v.to_json()])).collect();
                json!(["map", entries])
            }
        }
    }

    /// Rebuilds an AST from its tagged-sequence form. Positions are
    /// synthetic (zero ranges); structural equality with the original holds.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, EvalError> {
        use serde_json::Value as Json;
        let bad = |what: &str| EvalError::new(format!("malformed AST JSON: {what}"));
        let node = |expr| Self::new(expr, CodeRange::default());
        match json {
            Json::Null => Ok(node(Expr::Literal(Literal::Null))),
            Json::Bool(b) => Ok(node(Expr::Literal(Literal::Bool(*b)))),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(node(Expr::Literal(Literal::Int(i))))
                } else if let Some(f) = n.as_f64() {
                    Ok(node(Expr::Literal(Literal::Double(f))))
                } else {
                    Err(bad("integer literal out of range"))
                }
            }
            Json::String(s) => Ok(node(Expr::Literal(Literal::String(Arc::from(s.as_str()))))),
            Json::Object(_) => Err(bad("objects are not AST nodes")),
            Json::Array(items) => {
                let tag = items
                    .first()
                    .and_then(Json::as_str)
                    .ok_or_else(|| bad("node tag missing"))?;
                let operand = |i: usize| items.get(i).ok_or_else(|| bad("operand missing"));
                let sub = |i: usize| operand(i).and_then(|v| Self::from_json(v).map(Box::new));
                let name = |i: usize| -> Result<Arc<str>, EvalError> {
                    Ok(Arc::from(
                        operand(i)?.as_str().ok_or_else(|| bad("name operand must be a string"))?,
                    ))
                };
                let list = |v: &Json| -> Result<Vec<Self>, EvalError> {
                    v.as_array()
                        .ok_or_else(|| bad("expected an array of nodes"))?
                        .iter()
                        .map(Self::from_json)
                        .collect()
                };
                let expr = match tag {
                    "uint" => Expr::Literal(Literal::Uint(
                        operand(1)?.as_u64().ok_or_else(|| bad("uint literal out of range"))?,
                    )),
                    "bytes" => {
                        let raw = operand(1)?
                            .as_array()
                            .ok_or_else(|| bad("bytes literal must be an array"))?
                            .iter()
                            .map(|b| {
                                b.as_u64()
                                    .and_then(|b| u8::try_from(b).ok())
                                    .ok_or_else(|| bad("byte out of range"))
                            })
                            .collect::<Result<Vec<u8>, _>>()?;
                        Expr::Literal(Literal::Bytes(raw.into()))
                    }
                    "id" => Expr::Ident(name(1)?),
                    "." | "?." => Expr::Member {
                        object: sub(1)?,
                        field: name(2)?,
                        optional: tag == "?.",
                    },
                    "[]" | "[?]" => Expr::Index {
                        object: sub(1)?,
                        index: sub(2)?,
                        optional: tag == "[?]",
                    },
                    "!_" => Expr::Unary {
                        op: UnaryOp::Not,
                        operand: sub(1)?,
                    },
                    "-_" => Expr::Unary {
                        op: UnaryOp::Neg,
                        operand: sub(1)?,
                    },
                    "?:" => Expr::Ternary {
                        cond: sub(1)?,
                        then: sub(2)?,
                        otherwise: sub(3)?,
                    },
                    "call" => Expr::Call {
                        function: name(1)?,
                        args: list(operand(2)?)?,
                    },
                    "rcall" => Expr::MethodCall {
                        method: name(1)?,
                        receiver: sub(2)?,
                        args: list(operand(3)?)?,
                    },
                    "list" => Expr::ListLit(list(operand(1)?)?),
                    "map" => {
                        let entries = operand(1)?
                            .as_array()
                            .ok_or_else(|| bad("map payload must be an array"))?
                            .iter()
                            .map(|pair| {
                                let pair = pair.as_array().filter(|p| p.len() == 2).ok_or_else(|| {
                                    bad("map entry must be a [key, value] pair")
                                })?;
                                Ok((Self::from_json(&pair[0])?, Self::from_json(&pair[1])?))
                            })
                            .collect::<Result<Vec<_>, EvalError>>()?;
                        Expr::MapLit(entries)
                    }
                    op => {
                        let op = BinaryOp::from_symbol(op).ok_or_else(|| bad(&format!("unknown node tag '{op}'")))?;
                        Expr::Binary {
                            left: sub(1)?,
                            op,
                            right: sub(2)?,
                        }
                    }
                };
                Ok(node(expr))
            }
        }
    }
}
