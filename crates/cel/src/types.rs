//! Type descriptors for the CEL type lattice.
//!
//! `dyn` is the top of the lattice: every type is assignable to it, and it is
//! assignable to every type (the coercion may still fail at runtime). Lists,
//! maps and optionals are parameterized; an unparameterized `list` is
//! `list<dyn>` and an unparameterized `map` is `map<dyn, dyn>`.

use std::{fmt, sync::Arc};

use crate::error::RegistrationError;

/// A CEL type descriptor. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CelType {
    /// Top of the lattice; defers type checking to runtime.
    Dyn,
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Timestamp,
    Duration,
    /// The type of type values, as returned by `type(x)`.
    Type,
    List(Arc<CelType>),
    Map(Arc<CelType>, Arc<CelType>),
    Optional(Arc<CelType>),
    /// A registered user type, by name.
    Object(Arc<str>),
    /// Marker parameter type for macro overloads: the raw argument AST is
    /// passed to the handler instead of an evaluated value. Only valid inside
    /// registry signatures, never as the type of a value.
    Ast,
}

impl CelType {
    /// `list<dyn>`, the type of an unparameterized list.
    #[must_use]
    pub fn list_of_dyn() -> Self {
        Self::List(Arc::new(Self::Dyn))
    }

    /// `map<dyn, dyn>`, the type of an unparameterized map.
    #[must_use]
    pub fn map_of_dyn() -> Self {
        Self::Map(Arc::new(Self::Dyn), Arc::new(Self::Dyn))
    }

    /// Whether a value of type `self` can be passed where `param` is
    /// expected.
    ///
    /// Assignability is identity, anything to `dyn`, and `dyn` to anything;
    /// parameterized types recurse per position, so `list<int>` is assignable
    /// to `list` (which is `list<dyn>`).
    #[must_use]
    pub fn assignable_to(&self, param: &Self) -> bool {
        match (self, param) {
            (_, Self::Dyn) | (Self::Dyn, _) => true,
            (Self::List(a), Self::List(b)) | (Self::Optional(a), Self::Optional(b)) => a.assignable_to(b),
            (Self::Map(ak, av), Self::Map(bk, bv)) => ak.assignable_to(bk) && av.assignable_to(bv),
            _ => self == param,
        }
    }

    /// The overlap rule used for ambiguity detection at registration time:
    /// two parameter types overlap when one is `dyn` or both are equal.
    /// `list` and `list<dyn>` (and `map` / `map<dyn, dyn>`) are the same
    /// descriptor in this representation, so no extra normalization is
    /// needed.
    #[must_use]
    pub(crate) fn overlaps(&self, other: &Self) -> bool {
        matches!(self, Self::Dyn) || matches!(other, Self::Dyn) || self == other
    }

    /// Whether the descriptor contains `dyn` anywhere.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Dyn => true,
            Self::List(t) | Self::Optional(t) => t.is_dynamic(),
            Self::Map(k, v) => k.is_dynamic() || v.is_dynamic(),
            _ => false,
        }
    }

    /// Parses a type string as accepted by `register_variable` and function
    /// signatures: primitive names, `list`, `list<T>`, `map`, `map<K, V>`,
    /// `optional<T>`, `ast`, or a registered object type name.
    pub fn parse(s: &str) -> Result<Self, RegistrationError> {
        let mut parser = TypeStrParser { rest: s.trim() };
        let ty = parser.parse_type()?;
        if parser.rest.trim_start().is_empty() {
            Ok(ty)
        } else {
            Err(RegistrationError::new(format!("trailing input in type string '{s}'")))
        }
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dyn => f.write_str("dyn"),
            Self::Null => f.write_str("null"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Uint => f.write_str("uint"),
            Self::Double => f.write_str("double"),
            Self::String => f.write_str("string"),
            Self::Bytes => f.write_str("bytes"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Duration => f.write_str("duration"),
            Self::Type => f.write_str("type"),
            Self::List(t) => {
                if matches!(**t, Self::Dyn) {
                    f.write_str("list")
                } else {
                    write!(f, "list<{t}>")
                }
            }
            Self::Map(k, v) => {
                if matches!(**k, Self::Dyn) && matches!(**v, Self::Dyn) {
                    f.write_str("map")
                } else {
                    write!(f, "map<{k}, {v}>")
                }
            }
            Self::Optional(t) => write!(f, "optional<{t}>"),
            Self::Object(name) => f.write_str(name),
            Self::Ast => f.write_str("ast"),
        }
    }
}

/// Cursor-based parser for the type-string grammar.
struct TypeStrParser<'a> {
    rest: &'a str,
}

impl TypeStrParser<'_> {
    fn parse_type(&mut self) -> Result<CelType, RegistrationError> {
        self.rest = self.rest.trim_start();
        let name = self.take_name()?;
        Ok(match name {
            "dyn" => CelType::Dyn,
            "null" | "null_type" => CelType::Null,
            "bool" => CelType::Bool,
            "int" => CelType::Int,
            "uint" => CelType::Uint,
            "double" => CelType::Double,
            "string" => CelType::String,
            "bytes" => CelType::Bytes,
            "timestamp" => CelType::Timestamp,
            "duration" => CelType::Duration,
            "type" => CelType::Type,
            "ast" => CelType::Ast,
            "list" => {
                if self.eat('<') {
                    let elem = self.parse_type()?;
                    self.expect('>')?;
                    CelType::List(Arc::new(elem))
                } else {
                    CelType::list_of_dyn()
                }
            }
            "map" => {
                if self.eat('<') {
                    let key = self.parse_type()?;
                    self.expect(',')?;
                    let value = self.parse_type()?;
                    self.expect('>')?;
                    CelType::Map(Arc::new(key), Arc::new(value))
                } else {
                    CelType::map_of_dyn()
                }
            }
            "optional" => {
                self.expect('<')?;
                let inner = self.parse_type()?;
                self.expect('>')?;
                CelType::Optional(Arc::new(inner))
            }
            // Anything else names a registered object type. Existence is not
            // checked here; the registry validates on use.
            other => CelType::Object(Arc::from(other)),
        })
    }

    fn take_name(&mut self) -> Result<&str, RegistrationError> {
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphanumeric() && *c != '_' && *c != '.')
            .map_or(self.rest.len(), |(i, _)| i);
        if end == 0 {
            return Err(RegistrationError::new(format!(
                "expected a type name, found '{}'",
                self.rest
            )));
        }
        let (name, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(name)
    }

    fn eat(&mut self, c: char) -> bool {
        self.rest = self.rest.trim_start();
        if let Some(stripped) = self.rest.strip_prefix(c) {
            self.rest = stripped;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), RegistrationError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(RegistrationError::new(format!(
                "expected '{c}' in type string, found '{}'",
                self.rest
            )))
        }
    }
}
