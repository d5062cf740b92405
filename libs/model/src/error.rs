//! Error types for model addressing and storage.

use thiserror::Error;

use crate::address::PathAddress;

/// Errors that can occur when resolving or parsing model addresses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// No resource is registered at the address.
    #[error("no resource at address {0}")]
    NotFound(PathAddress),

    /// The address string is empty or not rooted at '/'.
    #[error("address must start with '/': {0:?}")]
    NotRooted(String),

    /// An address segment is not of the form `key=value`.
    #[error("malformed address segment {segment:?} in {address:?}")]
    MalformedSegment { address: String, segment: String },
}
