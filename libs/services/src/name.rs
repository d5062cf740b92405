//! Service names: dotted identifiers addressing services in the container.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique name of a service within a container.
///
/// Names are hierarchical by convention, joined with dots, e.g.
/// `network-interface.public` or `management.http`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceName(String);

impl ServiceName {
    /// Create a service name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Append a part, producing `self.part`.
    pub fn append(&self, part: impl AsRef<str>) -> Self {
        Self(format!("{}.{}", self.0, part.as_ref()))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}
