//! Operation handlers and the handler table.
//!
//! Handlers are stateless values registered in an explicit table keyed by
//! operation name; there are no hidden singleton instances. A handler
//! declares its parameter contract and address policy, mutates the tree,
//! and returns the compensating operation plus an optional runtime task.

use std::collections::BTreeMap;
use std::sync::Arc;

use mast_model::ModelTree;
use mast_services::ServiceError;

use crate::builtin::{
    AddResourceHandler, DescribeHandler, ReadResourceHandler, RemoveResourceHandler,
    UndefineAttributeHandler, WriteAttributeHandler,
};
use crate::error::OperationError;
use crate::operation::{op_names, Operation};
use crate::runtime::RuntimeTaskContext;
use crate::validation::ParamSpec;

/// What the target address must look like before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPolicy {
    /// A resource must exist at the address (`remove`, `write-attribute`, …).
    MustExist,
    /// The address must be vacant (`add`).
    MustNotExist,
    /// No address precondition.
    Ignore,
}

/// Mutable view handed to a handler: the submitted operation and the tree.
pub struct OperationContext<'a> {
    /// The operation being executed.
    pub operation: &'a Operation,

    /// The model tree, write-locked for the duration of the handler.
    pub tree: &'a mut ModelTree,
}

/// Deferred work queued by a handler to affect the live service graph once
/// the model mutation has committed. Runs against the task callback surface;
/// closes over the committed model values, never over the tree itself.
pub type RuntimeTask = Box<dyn FnOnce(&mut RuntimeTaskContext) -> Result<(), ServiceError> + Send>;

/// What a handler produced.
pub struct HandlerOutcome {
    /// The exact inverse of the applied change.
    pub compensating: Operation,

    /// Query result, if the operation is a read.
    pub value: Option<mast_model::ModelValue>,

    /// Runtime work to submit after the model mutation commits.
    pub runtime_task: Option<RuntimeTask>,
}

impl HandlerOutcome {
    /// An outcome with no read value and no runtime task.
    pub fn new(compensating: Operation) -> Self {
        Self {
            compensating,
            value: None,
            runtime_task: None,
        }
    }

    /// Attach a runtime task.
    pub fn with_runtime_task(mut self, task: RuntimeTask) -> Self {
        self.runtime_task = Some(task);
        self
    }

    /// Attach a query result.
    pub fn with_value(mut self, value: mast_model::ModelValue) -> Self {
        self.value = Some(value);
        self
    }
}

/// A stateless operation handler.
pub trait OperationHandler: Send + Sync {
    /// Address precondition checked by the executor before validation.
    fn address_policy(&self) -> AddressPolicy;

    /// Declared parameter contract; validated by the executor before
    /// `execute` is called.
    fn parameters(&self) -> &[ParamSpec];

    /// Apply the operation. Called with the precondition and parameter
    /// contract already enforced; must not mutate the tree on its own
    /// validation failures.
    fn execute(&self, ctx: OperationContext<'_>) -> Result<HandlerOutcome, OperationError>;
}

/// Explicit registry mapping operation names to handlers.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: BTreeMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table pre-populated with the built-in handlers: permissive `add`,
    /// `remove`, `write-attribute`, `undefine-attribute`, `read-resource`,
    /// and `describe`. Embedders re-register `add`/`remove` with declared
    /// parameters and runtime tasks per subsystem.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register(op_names::ADD, AddResourceHandler::permissive());
        table.register(op_names::REMOVE, RemoveResourceHandler::new());
        table.register(op_names::WRITE_ATTRIBUTE, WriteAttributeHandler::new());
        table.register(op_names::UNDEFINE_ATTRIBUTE, UndefineAttributeHandler::new());
        table.register(op_names::READ_RESOURCE, ReadResourceHandler);
        table.register(op_names::DESCRIBE, DescribeHandler);
        table
    }

    /// Register (or replace) the handler for an operation name.
    pub fn register(&mut self, name: impl Into<String>, handler: impl OperationHandler + 'static) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Look up a handler.
    pub fn get(&self, name: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered operation names, in order.
    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_core_operations() {
        let table = HandlerTable::builtin();
        for name in [
            op_names::ADD,
            op_names::REMOVE,
            op_names::WRITE_ATTRIBUTE,
            op_names::UNDEFINE_ATTRIBUTE,
            op_names::READ_RESOURCE,
            op_names::DESCRIBE,
        ] {
            assert!(table.get(name).is_some(), "missing handler for {name}");
        }
        assert!(table.get("no-such-op").is_none());
    }
}
