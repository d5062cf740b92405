//! Operation requests and results.

use std::collections::BTreeMap;
use std::fmt;

use mast_model::{ModelValue, PathAddress};
use mast_services::{ServiceError, ServiceHandle};
use serde::{Deserialize, Serialize};

/// Names of the built-in operations.
pub mod op_names {
    pub const ADD: &str = "add";
    pub const REMOVE: &str = "remove";
    pub const WRITE_ATTRIBUTE: &str = "write-attribute";
    pub const UNDEFINE_ATTRIBUTE: &str = "undefine-attribute";
    pub const READ_RESOURCE: &str = "read-resource";
    pub const DESCRIBE: &str = "describe";
}

/// A requested change: target address, operation name, parameters.
///
/// Immutable once submitted; the executor never mutates a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Target resource address.
    pub address: PathAddress,

    /// Operation name, resolved through the handler table.
    pub name: String,

    /// Operation parameters.
    #[serde(default)]
    pub params: BTreeMap<String, ModelValue>,
}

impl Operation {
    /// Create an operation with no parameters.
    pub fn new(address: PathAddress, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ModelValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Read a parameter.
    pub fn param(&self, name: &str) -> Option<&ModelValue> {
        self.params.get(name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.name, self.address)
    }
}

/// Outcome of a successful operation.
#[derive(Debug)]
pub struct OperationResult {
    /// The exact inverse of the executed operation. Executing it against the
    /// post-state restores the pre-state. Never executed automatically.
    pub compensating: Operation,

    /// Value produced by query operations (`read-resource`, `describe`).
    pub value: Option<ModelValue>,

    /// Handles to services installed by the operation's runtime task, for
    /// callers that need completion signalling.
    pub handles: Vec<ServiceHandle>,

    /// A runtime-task submission failure. The model mutation is already
    /// committed when the task runs, so this does not unwind it; rolling back
    /// is the enclosing coordinator's decision.
    pub runtime_failure: Option<ServiceError>,
}
