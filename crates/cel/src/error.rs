//! Error types for the three fatal failure kinds: parsing, type checking and
//! evaluation.
//!
//! Every failure aborts the calling operation. The checker reports the first
//! error in post-order; the evaluator fails fast on the first error. There is
//! no recovery, no retry and no partial result.

use std::fmt;

use crate::ast::CodeRange;

/// Raised when the source is syntactically invalid or exceeds a configured
/// structural limit.
///
/// Carries the byte offset of the failure. When the originating source is
/// attached (the parser always attaches it), `Display` renders a one-line
/// excerpt with a caret pointing at the offending column:
///
/// ```text
/// parse error: unexpected token '}'
///   1 + { }
///       ^
/// ```
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ParseError {
    message: String,
    /// Byte offset into the source where the failure was detected.
    offset: usize,
    /// The full source string, used for excerpt rendering.
    source: Option<String>,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
            source: None,
        }
    }

    /// Raised when a structural limit from [`crate::ParseLimits`] is exceeded.
    ///
    /// The message carries the limit's field name so callers can tell which
    /// bound was hit.
    pub(crate) fn limit(limit_name: &'static str, value: usize, offset: usize) -> Self {
        Self::new(
            format!("expression exceeds configured limit '{limit_name}' ({value})"),
            offset,
        )
    }

    pub(crate) fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_owned());
        self
    }

    /// The parse failure message, without the source excerpt.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Byte offset into the source where the failure was detected.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.message)?;
        let Some(source) = &self.source else {
            return Ok(());
        };
        // Render the line containing the offset with a caret under the column.
        let offset = self.offset.min(source.len());
        let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[offset..].find('\n').map_or(source.len(), |i| offset + i);
        let line = &source[line_start..line_end];
        let column = source[line_start..offset].chars().count();
        write!(f, "\n  {line}\n  {caret:>width$}", caret = '^', width = column + 1)
    }
}

impl std::error::Error for ParseError {}

/// Raised when a well-formed expression violates the type discipline:
/// unknown variable, unknown function or overload, mis-arity, operand kind
/// mismatch, non-bool ternary condition, non-identifier macro binding.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TypeError {
    message: String,
    /// Source range of the offending AST node.
    range: CodeRange,
}

impl TypeError {
    pub(crate) fn new(message: impl Into<String>, range: CodeRange) -> Self {
        Self {
            message: message.into(),
            range,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source range of the offending AST node, for caller-side highlighting.
    #[must_use]
    pub fn range(&self) -> CodeRange {
        self.range
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type error: {}", self.message)
    }
}

impl std::error::Error for TypeError {}

/// Raised by the evaluator for runtime failures: missing field access,
/// integer overflow, division by zero, conversion failure, unrecognized
/// timezone, regex compilation failure, a macro predicate not returning bool.
///
/// Overload handlers construct these with [`EvalError::new`]; the evaluator
/// attaches the offending node's source range before propagating.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EvalError {
    message: String,
    /// Source range of the offending AST node, once the evaluator attached it.
    range: Option<CodeRange>,
}

impl EvalError {
    /// Creates an evaluation error with no position. Handlers use this; the
    /// evaluator fills in the call site's range.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            range: None,
        }
    }

    pub(crate) fn at(mut self, range: CodeRange) -> Self {
        if self.range.is_none() {
            self.range = Some(range);
        }
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source range of the offending AST node, if attached.
    #[must_use]
    pub fn range(&self) -> Option<CodeRange> {
        self.range
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evaluation error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Raised when a registration on the [`crate::Environment`] is rejected:
/// malformed signature or type string, overlapping overload, conflicting
/// variable redeclaration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegistrationError {
    message: String,
}

impl RegistrationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registration error: {}", self.message)
    }
}

impl std::error::Error for RegistrationError {}

/// The public error sum returned by every [`crate::Environment`] operation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum CelError {
    Parse(ParseError),
    Type(TypeError),
    Eval(EvalError),
    Registration(RegistrationError),
}

impl CelError {
    /// The bare message, without the `parse error:` style prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Parse(e) => e.message(),
            Self::Type(e) => e.message(),
            Self::Eval(e) => e.message(),
            Self::Registration(e) => e.message(),
        }
    }
}

impl fmt::Display for CelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => e.fmt(f),
            Self::Type(e) => e.fmt(f),
            Self::Eval(e) => e.fmt(f),
            Self::Registration(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for CelError {}

impl From<ParseError> for CelError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<TypeError> for CelError {
    fn from(e: TypeError) -> Self {
        Self::Type(e)
    }
}

impl From<EvalError> for CelError {
    fn from(e: EvalError) -> Self {
        Self::Eval(e)
    }
}

impl From<RegistrationError> for CelError {
    fn from(e: RegistrationError) -> Self {
        Self::Registration(e)
    }
}
