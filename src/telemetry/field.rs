//! Typed free-form fields attached to telemetry.
//!
//! Every value a caller hands to the emitter ends up as one of a small,
//! closed set of kinds so that serialization can never fail downstream.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered map of field name to value.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<FieldValue>),
    Map(Fields),
}

impl FieldValue {
    /// Convert any serializable value, falling back to its `Debug` text.
    pub fn coerce<T: Serialize + fmt::Debug>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Self::from(json),
            Err(_) => Self::Str(format!("{value:?}")),
        }
    }

    /// Replace values that have no JSON representation with their string form.
    pub fn normalized(self) -> Self {
        match self {
            Self::Float(f) if !f.is_finite() => Self::Str(f.to_string()),
            Self::List(items) => Self::List(items.into_iter().map(Self::normalized).collect()),
            Self::Map(map) => Self::Map(normalize_fields(map)),
            other => other,
        }
    }
}

/// Normalize every value in a field map.
pub fn normalize_fields(fields: Fields) -> Fields {
    fields
        .into_iter()
        .map(|(k, v)| (k, v.normalized()))
        .collect()
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(_) | Self::Map(_) => match serde_json::to_string(&self.clone().normalized()) {
                Ok(json) => f.write_str(&json),
                Err(_) => write!(f, "{self:?}"),
            },
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Str("null".to_string()),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::Str(n.to_string())
                }
            }
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Self::Int(i),
            Err(_) => Self::Str(v.to_string()),
        }
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        Self::from(v as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v).normalized()
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self {
        Self::Str(v.clone())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Self::Str("null".to_string()),
        }
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<Fields> for FieldValue {
    fn from(v: Fields) -> Self {
        Self::Map(v)
    }
}

/// Build a [`Fields`] map inline.
///
/// ```
/// use checkout_telemetry::fields;
///
/// let f = fields! { "username" => "7", "item_count" => 1_i64 };
/// assert_eq!(f.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => { $crate::telemetry::Fields::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::telemetry::Fields::new();
        $(
            map.insert(::std::string::String::from($key), $crate::telemetry::FieldValue::from($value));
        )+
        map
    }};
}
