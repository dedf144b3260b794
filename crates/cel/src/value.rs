//! Runtime values.
//!
//! `Value` is a tagged union covering every CEL runtime type. Values are
//! immutable within an evaluation; heavy payloads (strings, bytes, lists,
//! maps, objects) sit behind `Arc` so cloning is cheap and one value can be
//! shared between the context and intermediate results.

use std::{cmp::Ordering, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::{error::EvalError, types::CelType};

/// A host-registered object instance.
///
/// Hosts implement this trait for values of user-registered types and place
/// them in the evaluation context as [`Value::Object`]. The engine matches
/// [`CelObject::type_name`] against the name passed to
/// `Environment::register_type` to verify the instance before field reads.
pub trait CelObject: fmt::Debug + Send + Sync {
    /// The registered type name this instance belongs to.
    fn type_name(&self) -> &str;

    /// Reads a field by name. `None` means the field is absent, which the
    /// evaluator reports as `No such key: F`.
    fn field(&self, name: &str) -> Option<Value>;
}

/// A CEL runtime value.
///
/// Equality (`PartialEq`) follows CEL runtime semantics: values of different
/// numeric tags compare numerically (`2 == 2.0` is true once both have
/// traveled through `dyn`), `NaN` is never equal to anything, and lists and
/// maps compare structurally. The *static* restriction that `int == double`
/// is a type error lives in the checker, not here.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    /// Signed 64-bit integer. Arithmetic is checked; overflow is a fatal
    /// evaluation error.
    Int(i64),
    /// Unsigned 64-bit integer (`u` suffix in source). Arithmetic rejects
    /// wraparound and underflow below zero.
    Uint(u64),
    /// IEEE-754 64-bit. NaN and infinities propagate.
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    /// Ordered sequence, insertion order preserved.
    List(Arc<Vec<Value>>),
    /// Mapping with insertion-order iteration.
    Map(Arc<CelMap>),
    /// An instant, millisecond precision.
    Timestamp(DateTime<Utc>),
    /// A signed span in milliseconds.
    Duration(i64),
    /// A type value, as produced by `type(x)`.
    Type(CelType),
    /// A two-state wrapper: `optional.of(v)` or `optional.none()`.
    Optional(Option<Arc<Value>>),
    /// An instance of a host-registered type.
    Object(Arc<dyn CelObject>),
}

impl Value {
    /// Builds a string value.
    #[must_use]
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    /// Builds a bytes value.
    #[must_use]
    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(b.into())
    }

    /// Builds a list value.
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Arc::new(items))
    }

    /// An empty optional.
    #[must_use]
    pub fn optional_none() -> Self {
        Self::Optional(None)
    }

    /// An optional wrapping `v`.
    #[must_use]
    pub fn optional_of(v: Value) -> Self {
        Self::Optional(Some(Arc::new(v)))
    }

    /// The runtime type descriptor of this value.
    ///
    /// Aggregates report their `dyn`-parameterized form: element types are a
    /// static notion and runtime collections may be heterogeneous.
    #[must_use]
    pub fn type_of(&self) -> CelType {
        match self {
            Self::Null => CelType::Null,
            Self::Bool(_) => CelType::Bool,
            Self::Int(_) => CelType::Int,
            Self::Uint(_) => CelType::Uint,
            Self::Double(_) => CelType::Double,
            Self::String(_) => CelType::String,
            Self::Bytes(_) => CelType::Bytes,
            Self::List(_) => CelType::list_of_dyn(),
            Self::Map(_) => CelType::map_of_dyn(),
            Self::Timestamp(_) => CelType::Timestamp,
            Self::Duration(_) => CelType::Duration,
            Self::Type(_) => CelType::Type,
            Self::Optional(_) => CelType::Optional(Arc::new(CelType::Dyn)),
            Self::Object(obj) => CelType::Object(Arc::from(obj.type_name())),
        }
    }

    /// Runtime equality per CEL semantics. See the type-level docs.
    #[must_use]
    pub fn cel_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a == b,
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::List(a), Self::List(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.cel_eq(y)),
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other_v| v.cel_eq(other_v)))
            }
            (Self::Optional(a), Self::Optional(b)) => match (a, b) {
                (None, None) => true,
                (Some(x), Some(y)) => x.cel_eq(y),
                _ => false,
            },
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            // Numeric cross-tag equality; NaN is never equal to NaN.
            _ => numeric_cmp(self, other) == Some(Ordering::Equal),
        }
    }

    /// Runtime ordering, defined for numerics (cross-tag), string, bool,
    /// bytes, timestamp and duration. `None` for unordered pairs, including
    /// any comparison involving NaN.
    #[must_use]
    pub fn cel_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Duration(a), Self::Duration(b)) => Some(a.cmp(b)),
            _ => numeric_cmp(self, other),
        }
    }

    /// Extracts a bool, or reports the actual type.
    pub(crate) fn as_bool(&self, what: &str) -> Result<bool, EvalError> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(EvalError::new(format!(
                "{what} must be bool, got '{}'",
                other.type_of()
            ))),
        }
    }

    /// Converts a JSON value into a CEL value using the natural mapping:
    /// null, bool, integer (`int`, or `uint` when it only fits unsigned),
    /// float (`double`), string, array (`list`), object (`map` with string
    /// keys, insertion order preserved).
    pub fn from_json(json: &serde_json::Value) -> Result<Self, EvalError> {
        Ok(match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::Uint(u)
                } else if let Some(f) = n.as_f64() {
                    Self::Double(f)
                } else {
                    return Err(EvalError::new(format!("unrepresentable JSON number: {n}")));
                }
            }
            serde_json::Value::String(s) => Self::string(s.as_str()),
            serde_json::Value::Array(items) => {
                let values = items.iter().map(Self::from_json).collect::<Result<Vec<_>, _>>()?;
                Self::list(values)
            }
            serde_json::Value::Object(fields) => {
                let mut map = CelMap::with_capacity(fields.len());
                for (k, v) in fields {
                    map.insert(Key::String(Arc::from(k.as_str())), Self::from_json(v)?);
                }
                Self::Map(Arc::new(map))
            }
        })
    }

    /// Converts this value to JSON.
    ///
    /// Natural variants map directly; non-JSON-native variants use `$`-tagged
    /// objects (`{"$bytes": [...]}`, `{"$timestamp": "..."}` and so on) so
    /// the output stays unambiguous. Non-finite doubles become JSON null.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{Value as Json, json};
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Uint(u) => json!(u),
            Self::Double(f) => {
                if f.is_finite() {
                    json!(f)
                } else {
                    Json::Null
                }
            }
            Self::String(s) => json!(&**s),
            Self::Bytes(b) => json!({ "$bytes": &**b }),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => {
                let mut obj = serde_json::Map::with_capacity(map.len());
                for (k, v) in map.iter() {
                    obj.insert(k.to_string(), v.to_json());
                }
                Json::Object(obj)
            }
            Self::Timestamp(_) => json!({ "$timestamp": self.to_string() }),
            Self::Duration(_) => json!({ "$duration": self.to_string() }),
            Self::Type(t) => json!({ "$type": t.to_string() }),
            Self::Optional(inner) => match inner {
                None => json!({ "$optional": Json::Null }),
                Some(v) => json!({ "$optional": v.to_json() }),
            },
            Self::Object(obj) => json!({ "$object": obj.type_name() }),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cel_eq(other)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::string(v)
    }
}

/// Cross-tag numeric comparison. NaN is unordered; mixed signed/unsigned
/// comparison is exact (no round-trip through double).
fn numeric_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Uint(a), Value::Uint(b)) => Some(a.cmp(b)),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Uint(b)) => Some(cmp_i64_u64(*a, *b)),
        (Value::Uint(a), Value::Int(b)) => Some(cmp_i64_u64(*b, *a).reverse()),
        (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Uint(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Uint(b)) => a.partial_cmp(&(*b as f64)),
        _ => None,
    }
}

fn cmp_i64_u64(a: i64, b: u64) -> Ordering {
    if a < 0 {
        Ordering::Less
    } else {
        (a as u64).cmp(&b)
    }
}

impl fmt::Display for Value {
    /// The canonical string form, as produced by the `string()` conversion
    /// and used in diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Double(d) => f.write_str(&format_double(*d)),
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => {
                // Lossy UTF-8 view, matching the diagnostic form of bytes.
                f.write_str(&String::from_utf8_lossy(b))
            }
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.display_quoted(f)?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    k.display_quoted(f)?;
                    f.write_str(": ")?;
                    v.display_quoted(f)?;
                }
                f.write_str("}")
            }
            Self::Timestamp(ts) => f.write_str(&format_timestamp(*ts)),
            Self::Duration(ms) => f.write_str(&format_duration_millis(*ms)),
            Self::Type(t) => write!(f, "{t}"),
            Self::Optional(inner) => match inner {
                None => f.write_str("optional.none()"),
                Some(v) => {
                    f.write_str("optional.of(")?;
                    v.display_quoted(f)?;
                    f.write_str(")")
                }
            },
            Self::Object(obj) => write!(f, "<{}>", obj.type_name()),
        }
    }
}

impl Value {
    /// Like `Display`, but strings render quoted. Used inside aggregate
    /// display so `["a, b"]` and `["a", "b"]` stay distinguishable.
    fn display_quoted(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{}\"", s.escape_default()),
            other => write!(f, "{other}"),
        }
    }
}

/// Canonical double formatting: `ryu`, with an exact integral value reduced
/// to its integer spelling (`string(1.0)` is `"1"`).
#[must_use]
pub(crate) fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_owned();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    let mut buffer = ryu::Buffer::new();
    let s = buffer.format(d);
    s.strip_suffix(".0").map_or_else(|| s.to_owned(), str::to_owned)
}

/// RFC 3339 rendering in UTC, milliseconds only when present.
#[must_use]
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    if ts.timestamp_subsec_millis() == 0 {
        ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }
}

/// Canonical duration form: seconds with a fractional part when the span is
/// not a whole number of seconds, e.g. `5400s`, `-0.5s`.
#[must_use]
pub(crate) fn format_duration_millis(ms: i64) -> String {
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        let s = format!("{:.3}", ms as f64 / 1000.0);
        let s = s.trim_end_matches('0').trim_end_matches('.');
        format!("{s}s")
    }
}

/// A map key. CEL map keys are `int`, `uint`, `bool` or `string`.
///
/// A `uint` key whose value fits in `i64` normalizes to the `int` key of the
/// same numeric value, so `{1: "a"}[1u]` resolves to `"a"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(Arc<str>),
}

impl Key {
    /// Builds a key from a value, applying the uint normalization. Rejects
    /// the value kinds that cannot key a map.
    pub fn from_value(value: &Value) -> Result<Self, EvalError> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Int(i) => Ok(Self::Int(*i)),
            Value::Uint(u) => Ok(match i64::try_from(*u) {
                Ok(i) => Self::Int(i),
                Err(_) => Self::Uint(*u),
            }),
            Value::String(s) => Ok(Self::String(Arc::clone(s))),
            other => Err(EvalError::new(format!(
                "'{}' cannot be used as a map key",
                other.type_of()
            ))),
        }
    }

    /// The key back as a value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Uint(u) => Value::Uint(*u),
            Self::String(s) => Value::String(Arc::clone(s)),
        }
    }

    fn display_quoted(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{}\"", s.escape_default()),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// An insertion-ordered CEL map.
#[derive(Debug, Clone, Default)]
pub struct CelMap {
    entries: IndexMap<Key, Value>,
}

impl CelMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Inserts an entry. A duplicate key overwrites the previous value while
    /// keeping the key's original insertion position (last write wins).
    pub fn insert(&mut self, key: Key, value: Value) {
        self.entries.insert(key, value);
    }

    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }
}

impl FromIterator<(Key, Value)> for CelMap {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_crosses_tags() {
        assert!(Value::Int(2).cel_eq(&Value::Double(2.0)));
        assert!(Value::Int(2).cel_eq(&Value::Uint(2)));
        assert!(!Value::Int(2).cel_eq(&Value::Double(2.5)));
        assert!(!Value::Double(f64::NAN).cel_eq(&Value::Double(f64::NAN)));
    }

    #[test]
    fn nan_is_unordered() {
        assert_eq!(Value::Double(f64::NAN).cel_cmp(&Value::Double(1.0)), None);
        assert_eq!(Value::Int(1).cel_cmp(&Value::Double(f64::NAN)), None);
    }

    #[test]
    fn mixed_sign_comparison_is_exact() {
        assert_eq!(Value::Int(-1).cel_cmp(&Value::Uint(0)), Some(Ordering::Less));
        assert_eq!(
            Value::Uint(u64::MAX).cel_cmp(&Value::Int(i64::MAX)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn uint_keys_normalize_to_int() {
        let mut map = CelMap::new();
        map.insert(Key::from_value(&Value::Int(1)).unwrap(), Value::string("a"));
        let probe = Key::from_value(&Value::Uint(1)).unwrap();
        assert_eq!(map.get(&probe), Some(&Value::string("a")));
    }

    #[test]
    fn double_formatting_is_canonical() {
        assert_eq!(format_double(1.0), "1");
        assert_eq!(format_double(1.5), "1.5");
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration_millis(5_400_000), "5400s");
        assert_eq!(format_duration_millis(-500), "-0.5s");
        assert_eq!(format_duration_millis(1_250), "1.25s");
    }

    #[test]
    fn json_round_trip_for_natural_types() {
        let json = serde_json::json!({"a": [1, true, "x", 2.5], "b": null});
        let value = Value::from_json(&json).unwrap();
        assert_eq!(value.to_json(), json);
    }
}
