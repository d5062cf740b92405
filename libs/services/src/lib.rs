//! # mast-services
//!
//! The runtime service container: a registry of named services connected by a
//! dependency graph, driven through their lifecycle asynchronously.
//!
//! ## Lifecycle
//!
//! ```text
//! DOWN -> STARTING -> UP -> STOPPING -> DOWN
//!             |
//!             +-> FAILED
//! ```
//!
//! `DOWN` and `FAILED` are the quiescent states; a `FAILED` service stays
//! queryable with its error recorded until it is explicitly removed.
//!
//! ## Guarantees
//!
//! - A service never begins starting before all required dependencies are `UP`
//! - Cascading removal stops dependents strictly before their dependencies
//! - Installing a descriptor that would close a dependency cycle fails without
//!   committing any edge
//! - Injected values are immutable snapshots taken when the start is scheduled

mod config;
mod container;
mod descriptor;
mod error;
mod graph;
mod name;

pub use config::ContainerConfig;
pub use container::{ServiceContainer, ServiceHandle};
pub use descriptor::{InjectionSource, Injections, Service, ServiceDescriptor, StartMode};
pub use error::ServiceError;
pub use name::ServiceName;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Registered but not running. Pending starts wait here.
    Down,
    /// Start action in progress.
    Starting,
    /// Running; dependents may start and read its provided value.
    Up,
    /// Stop action in progress.
    Stopping,
    /// Start action raised or timed out; error recorded, explicit remove required.
    Failed,
}

impl ServiceState {
    /// True for the states in which a name may be re-registered.
    pub fn is_removable(&self) -> bool {
        matches!(self, ServiceState::Down | ServiceState::Failed)
    }

    /// True while a lifecycle action is in flight.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, ServiceState::Starting | ServiceState::Stopping)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::Down => "down",
            ServiceState::Starting => "starting",
            ServiceState::Up => "up",
            ServiceState::Stopping => "stopping",
            ServiceState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}
