//! The closed value union stored at resource attributes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A configuration value.
///
/// A closed tagged union so every consumer matches exhaustively; there is no
/// runtime type tag to interrogate and no coercion between variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelValue {
    /// Boolean flag.
    Bool(bool),

    /// Signed integer.
    Int(i64),

    /// UTF-8 string.
    String(String),

    /// Ordered list of values.
    List(Vec<ModelValue>),

    /// Nested key/value map with unique keys.
    Map(BTreeMap<String, ModelValue>),
}

impl ModelValue {
    /// Borrow as a string, if this is the string variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ModelValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read as an integer, if this is the integer variant.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ModelValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Read as a boolean, if this is the boolean variant.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ModelValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as a list, if this is the list variant.
    pub fn as_list(&self) -> Option<&[ModelValue]> {
        match self {
            ModelValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as a map, if this is the map variant.
    pub fn as_map(&self) -> Option<&BTreeMap<String, ModelValue>> {
        match self {
            ModelValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ModelValue::Bool(_) => "bool",
            ModelValue::Int(_) => "int",
            ModelValue::String(_) => "string",
            ModelValue::List(_) => "list",
            ModelValue::Map(_) => "map",
        }
    }
}

impl fmt::Display for ModelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelValue::Bool(b) => write!(f, "{b}"),
            ModelValue::Int(i) => write!(f, "{i}"),
            ModelValue::String(s) => write!(f, "{s}"),
            other => {
                // Structured variants render as JSON.
                let json = serde_json::to_string(other).map_err(|_| fmt::Error)?;
                write!(f, "{json}")
            }
        }
    }
}

impl From<&str> for ModelValue {
    fn from(s: &str) -> Self {
        ModelValue::String(s.to_string())
    }
}

impl From<String> for ModelValue {
    fn from(s: String) -> Self {
        ModelValue::String(s)
    }
}

impl From<i64> for ModelValue {
    fn from(i: i64) -> Self {
        ModelValue::Int(i)
    }
}

impl From<bool> for ModelValue {
    fn from(b: bool) -> Self {
        ModelValue::Bool(b)
    }
}
