//! Error types for operation execution.

use mast_model::{ModelError, PathAddress};
use mast_services::ServiceError;
use thiserror::Error;

/// Errors reported synchronously by [`execute`](crate::OperationExecutor::execute).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// A parameter is missing, malformed, or out of range.
    #[error("invalid parameter {param}: {reason}")]
    Validation { param: String, reason: String },

    /// The operation requires a resource that is absent.
    #[error("no resource at address {0}")]
    UnknownAddress(PathAddress),

    /// The operation requires the address to be vacant.
    #[error("resource already exists at address {0}")]
    ResourceExists(PathAddress),

    /// No handler is registered for the operation name.
    #[error("no handler registered for operation {0:?}")]
    UnknownOperation(String),

    /// A service-container error surfaced during the runtime phase.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The configuration collaborator failed to supply operations.
    #[error("configuration source error: {0}")]
    Config(String),
}

impl OperationError {
    /// Shorthand for a validation failure.
    pub fn validation(param: impl Into<String>, reason: impl Into<String>) -> Self {
        OperationError::Validation {
            param: param.into(),
            reason: reason.into(),
        }
    }
}

impl From<ModelError> for OperationError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NotFound(address) => OperationError::UnknownAddress(address),
            other @ (ModelError::NotRooted(_) | ModelError::MalformedSegment { .. }) => {
                OperationError::validation("address", other.to_string())
            }
        }
    }
}
