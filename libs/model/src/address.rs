//! Path addresses: ordered `(key, value)` segments identifying a resource.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;

/// One segment of a path address, e.g. `subsystem=http-management`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathElement {
    /// Segment type, e.g. `subsystem`, `interface`, `server`.
    pub key: String,

    /// Segment name within its type, e.g. `http-management`.
    pub value: String,
}

impl PathElement {
    /// Create a new path element.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// An ordered sequence of path elements identifying a single resource.
///
/// Addresses compare structurally; two addresses are equal iff their segment
/// sequences are equal. The empty address is the model root.
///
/// Serializes as the canonical string form, so addresses can key JSON maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathAddress(Vec<PathElement>);

impl PathAddress {
    /// The root address (no segments).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build an address from `(key, value)` pairs.
    pub fn of<K, V>(segments: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            segments
                .into_iter()
                .map(|(k, v)| PathElement::new(k, v))
                .collect(),
        )
    }

    /// Append a segment, returning the extended address.
    pub fn child(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathElement::new(key, value));
        Self(segments)
    }

    /// The segments of this address.
    pub fn segments(&self) -> &[PathElement] {
        &self.0
    }

    /// The final segment, if any.
    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the root address.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &PathAddress) -> bool {
        other.0.len() > self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for PathAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PathAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for PathAddress {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "/" {
            return Ok(Self::root());
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(ModelError::NotRooted(s.to_string()));
        };
        let mut segments = Vec::new();
        for part in rest.split('/') {
            let Some((key, value)) = part.split_once('=') else {
                return Err(ModelError::MalformedSegment {
                    address: s.to_string(),
                    segment: part.to_string(),
                });
            };
            if key.is_empty() || value.is_empty() {
                return Err(ModelError::MalformedSegment {
                    address: s.to_string(),
                    segment: part.to_string(),
                });
            }
            segments.push(PathElement::new(key, value));
        }
        Ok(Self(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_roundtrip() {
        let addr = PathAddress::of([("host", "primary"), ("server", "one")]);
        assert_eq!(addr.to_string(), "/host=primary/server=one");
        assert_eq!(addr.to_string().parse::<PathAddress>().unwrap(), addr);
    }

    #[test]
    fn root_roundtrip() {
        assert_eq!("/".parse::<PathAddress>().unwrap(), PathAddress::root());
        assert_eq!(PathAddress::root().to_string(), "/");
    }

    #[test]
    fn parse_rejects_unrooted_and_malformed() {
        assert!(matches!(
            "subsystem=ee".parse::<PathAddress>(),
            Err(ModelError::NotRooted(_))
        ));
        assert!(matches!(
            "/subsystem".parse::<PathAddress>(),
            Err(ModelError::MalformedSegment { .. })
        ));
        assert!(matches!(
            "/=ee".parse::<PathAddress>(),
            Err(ModelError::MalformedSegment { .. })
        ));
    }

    #[test]
    fn serializes_as_canonical_string() {
        let addr = PathAddress::of([("subsystem", "ee")]);
        assert_eq!(serde_json::to_string(&addr).unwrap(), r#""/subsystem=ee""#);
        let back: PathAddress = serde_json::from_str(r#""/subsystem=ee""#).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn ancestor_is_strict() {
        let parent = PathAddress::of([("subsystem", "web")]);
        let child = parent.child("connector", "http");
        assert!(parent.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&parent));
        assert!(!parent.is_ancestor_of(&parent));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn segment() -> impl Strategy<Value = (String, String)> {
            let part = "[a-z][a-z0-9-]{0,12}";
            (part, part)
        }

        proptest! {
            #[test]
            fn display_parse_roundtrip(segments in proptest::collection::vec(segment(), 0..5)) {
                let addr = PathAddress::of(segments);
                let parsed: PathAddress = addr.to_string().parse().unwrap();
                prop_assert_eq!(parsed, addr);
            }
        }
    }
}
