//! Best-effort reverse-order replay of compensating operations.

use thiserror::Error;
use tracing::{info, warn};

use crate::error::OperationError;
use crate::executor::OperationExecutor;
use crate::operation::Operation;

/// Errors reported after a rollback pass completes.
#[derive(Debug, Error)]
pub enum RollbackError {
    /// One or more compensating operations failed. The remaining ones were
    /// still executed; nothing is swallowed and nothing aborts the unwind.
    #[error(
        "rollback incomplete: {}/{attempted} compensating operations failed",
        .failures.len()
    )]
    Incomplete {
        /// How many compensating operations were attempted.
        attempted: usize,
        /// The failed compensating operations with their errors, in the
        /// order they were attempted.
        failures: Vec<(Operation, OperationError)>,
    },
}

/// Replays compensating operations for a composite change that failed
/// partway. Rollback is not a special code path: each compensating
/// operation goes through the ordinary executor, including its runtime
/// task, exactly like a forward operation.
pub struct RollbackCoordinator;

impl RollbackCoordinator {
    /// Execute the compensating operation of every applied pair, in strict
    /// reverse order of application. Failures are collected, never fatal to
    /// the pass.
    pub fn rollback(
        executor: &OperationExecutor,
        applied: Vec<(Operation, Operation)>,
    ) -> Result<(), RollbackError> {
        let attempted = applied.len();
        info!(operations = attempted, "rolling back composite change");

        let mut failures = Vec::new();
        for (original, compensating) in applied.into_iter().rev() {
            info!(original = %original, compensating = %compensating, "applying compensating operation");
            match executor.execute(compensating.clone()) {
                Ok(result) => {
                    if let Some(error) = result.runtime_failure {
                        warn!(compensating = %compensating, %error, "compensating runtime task failed");
                        failures.push((compensating, OperationError::Service(error)));
                    }
                }
                Err(error) => {
                    warn!(compensating = %compensating, %error, "compensating operation failed");
                    failures.push((compensating, error));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RollbackError::Incomplete {
                attempted,
                failures,
            })
        }
    }
}
