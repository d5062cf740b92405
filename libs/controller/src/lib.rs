//! # mast-controller
//!
//! The transactional operation layer of the mast kernel.
//!
//! An [`Operation`] targets an address in the model tree. The
//! [`OperationExecutor`] validates it, applies the mutation, and returns an
//! [`OperationResult`] carrying the exact inverse ([compensating]
//! operation) plus handles to any runtime services the operation installed.
//! Compensating operations are never executed automatically; an enclosing
//! transaction coordinator replays them through [`RollbackCoordinator`] when
//! a later step of a composite change fails.
//!
//! [compensating]: OperationResult::compensating
//!
//! ## Fail-fast contract
//!
//! Validation and addressing errors are reported synchronously with no model
//! mutation. Runtime-phase failures happen after the model mutation committed
//! and are reported in-band ([`OperationResult::runtime_failure`]) or
//! asynchronously through the returned service handles; the committed
//! mutation stands either way.

mod builtin;
mod error;
mod executor;
mod handler;
mod operation;
mod persist;
mod rollback;
mod runtime;
mod validation;

pub use builtin::{
    AddResourceHandler, DescribeHandler, ReadResourceHandler, RemoveResourceHandler,
    UndefineAttributeHandler, WriteAttributeHandler,
};
pub use error::OperationError;
pub use executor::OperationExecutor;
pub use handler::{
    AddressPolicy, HandlerOutcome, HandlerTable, OperationContext, OperationHandler, RuntimeTask,
};
pub use operation::{op_names, Operation, OperationResult};
pub use persist::{ConfigSink, ConfigSource, JsonConfigStore};
pub use rollback::{RollbackCoordinator, RollbackError};
pub use runtime::RuntimeTaskContext;
pub use validation::{AnyValue, IntRange, OneOf, ParamSpec, ParamValidator, StringLength};
