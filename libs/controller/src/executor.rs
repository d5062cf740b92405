//! The operation executor: validation, model mutation, compensating
//! operations, and runtime-task submission.

use std::sync::RwLock;

use mast_model::{ModelTree, ModelTreeSnapshot, ModelValue, PathAddress};
use mast_services::ServiceContainer;
use tracing::{debug, info, warn};

use crate::error::OperationError;
use crate::handler::{AddressPolicy, HandlerTable, OperationContext};
use crate::operation::{Operation, OperationResult};
use crate::persist::ConfigSource;
use crate::rollback::RollbackCoordinator;
use crate::runtime::RuntimeTaskContext;

/// Executes operations against the model tree and drives the runtime phase.
///
/// The tree is owned exclusively by the executor under a single-writer
/// discipline: one handler mutates at a time, readers are concurrent when no
/// writer is active. Within one `execute` call the model mutation
/// happens-before runtime-task submission.
pub struct OperationExecutor {
    tree: RwLock<ModelTree>,
    handlers: HandlerTable,
    container: ServiceContainer,
    runtime_active: bool,
}

impl OperationExecutor {
    /// Create an executor over an empty tree.
    pub fn new(handlers: HandlerTable, container: ServiceContainer) -> Self {
        Self {
            tree: RwLock::new(ModelTree::new()),
            handlers,
            container,
            runtime_active: true,
        }
    }

    /// Disable the runtime phase: operations mutate the model and produce
    /// compensating operations, but runtime tasks are discarded. Used for
    /// model-only execution contexts (e.g. validating stored configuration).
    pub fn without_runtime(mut self) -> Self {
        self.runtime_active = false;
        self
    }

    /// The service container this executor installs into.
    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    /// Execute one operation.
    ///
    /// Fail-fast: on `Validation`/`UnknownAddress`/`ResourceExists`/
    /// `UnknownOperation` nothing has been written. On success the result
    /// carries the compensating operation (never executed automatically) and
    /// handles to any services the runtime task installed; `execute` returns
    /// once the task is submitted, not completed.
    pub fn execute(&self, operation: Operation) -> Result<OperationResult, OperationError> {
        debug!(operation = %operation, "executing operation");
        let handler = self
            .handlers
            .get(&operation.name)
            .ok_or_else(|| OperationError::UnknownOperation(operation.name.clone()))?;

        let outcome = {
            let mut tree = self.tree.write().expect("model tree lock poisoned");

            match handler.address_policy() {
                AddressPolicy::MustExist if !tree.contains(&operation.address) => {
                    return Err(OperationError::UnknownAddress(operation.address.clone()));
                }
                AddressPolicy::MustNotExist if tree.contains(&operation.address) => {
                    return Err(OperationError::ResourceExists(operation.address.clone()));
                }
                _ => {}
            }

            for spec in handler.parameters() {
                match operation.param(&spec.name) {
                    Some(value) => spec.validator.validate(&spec.name, value)?,
                    None if spec.required => {
                        return Err(OperationError::validation(
                            &spec.name,
                            "required parameter is missing",
                        ));
                    }
                    None => {}
                }
            }

            handler.execute(OperationContext {
                operation: &operation,
                tree: &mut tree,
            })?
        };

        let mut handles = Vec::new();
        let mut runtime_failure = None;
        if let Some(task) = outcome.runtime_task {
            if self.runtime_active {
                let mut ctx = RuntimeTaskContext::new(self.container.clone());
                if let Err(error) = task(&mut ctx) {
                    // The model mutation is committed; unwinding it is the
                    // enclosing coordinator's decision, not ours.
                    warn!(operation = %operation, %error, "runtime task failed");
                    runtime_failure = Some(error);
                }
                handles = ctx.into_handles();
            }
        }

        info!(operation = %operation, services = handles.len(), "operation applied");
        Ok(OperationResult {
            compensating: outcome.compensating,
            value: outcome.value,
            handles,
            runtime_failure,
        })
    }

    /// Caller-facing convenience: build and execute an operation.
    pub fn submit<K, V>(
        &self,
        address: PathAddress,
        name: impl Into<String>,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Result<OperationResult, OperationError>
    where
        K: Into<String>,
        V: Into<ModelValue>,
    {
        let mut operation = Operation::new(address, name);
        for (k, v) in params {
            operation = operation.with_param(k, v);
        }
        self.execute(operation)
    }

    /// Apply every operation supplied by a configuration source, in order.
    ///
    /// On failure, already-applied operations are rolled back best-effort and
    /// the original error is returned. On success, returns the applied
    /// `(operation, compensating)` pairs for an enclosing coordinator.
    pub fn boot(
        &self,
        source: &dyn ConfigSource,
    ) -> Result<Vec<(Operation, Operation)>, OperationError> {
        let operations = source
            .load()
            .map_err(|e| OperationError::Config(format!("{e:#}")))?;
        info!(operations = operations.len(), "booting from configuration");

        let mut applied = Vec::with_capacity(operations.len());
        for operation in operations {
            match self.execute(operation.clone()) {
                Ok(result) => applied.push((operation, result.compensating)),
                Err(error) => {
                    warn!(operation = %operation, %error, "boot operation failed, rolling back");
                    if let Err(rollback) = RollbackCoordinator::rollback(self, applied) {
                        warn!(%rollback, "boot rollback incomplete");
                    }
                    return Err(error);
                }
            }
        }
        Ok(applied)
    }

    /// Run a closure against the tree under the read lock.
    pub fn with_tree<R>(&self, f: impl FnOnce(&ModelTree) -> R) -> R {
        let tree = self.tree.read().expect("model tree lock poisoned");
        f(&tree)
    }

    /// An immutable snapshot of the whole tree, for the persistence
    /// collaborator.
    pub fn snapshot(&self) -> ModelTreeSnapshot {
        self.tree
            .read()
            .expect("model tree lock poisoned")
            .snapshot()
    }
}
