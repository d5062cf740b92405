//! Error types for service installation and lifecycle.

use thiserror::Error;

use crate::name::ServiceName;
use crate::ServiceState;

/// Errors that can occur when installing, removing, or querying services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A service with this name is already registered and not removable.
    #[error("service {name} already registered in state {state}")]
    DuplicateServiceName {
        name: ServiceName,
        state: ServiceState,
    },

    /// Installing the descriptor would close a dependency cycle.
    #[error("installing {name} would create a dependency cycle: {}", format_path(.path))]
    CyclicDependency {
        name: ServiceName,
        /// The offending path, from `name` back to itself.
        path: Vec<ServiceName>,
    },

    /// The service still has live required dependents.
    #[error("service {name} is required by {}", format_names(.dependents))]
    InUse {
        name: ServiceName,
        dependents: Vec<ServiceName>,
    },

    /// The service's start action raised or timed out.
    #[error("service {name} failed to start: {reason}")]
    ServiceStart { name: ServiceName, reason: String },

    /// A required dependency failed, permanently blocking this service.
    #[error("service {name} blocked: required dependency {dependency} failed")]
    DependencyFailed {
        name: ServiceName,
        dependency: ServiceName,
    },

    /// No service is registered under the name.
    #[error("no service registered as {0}")]
    NotFound(ServiceName),

    /// The service was removed while a caller was waiting on it.
    #[error("service {0} was removed")]
    Removed(ServiceName),
}

fn format_path(path: &[ServiceName]) -> String {
    path.iter()
        .map(ServiceName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_names(names: &[ServiceName]) -> String {
    names
        .iter()
        .map(ServiceName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
