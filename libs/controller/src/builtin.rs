//! Built-in operation handlers: add, remove, attribute writes, and queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use mast_model::{ModelValue, Resource};

use crate::error::OperationError;
use crate::handler::{AddressPolicy, HandlerOutcome, OperationContext, OperationHandler, RuntimeTask};
use crate::operation::{op_names, Operation};
use crate::validation::{AnyValue, ParamSpec, ParamValidator, StringLength};

/// Produces the runtime task for an operation, given the operation and the
/// resource it created or removed. Invoked after the model mutation; the
/// returned task closes over committed values only.
pub type RuntimeTaskFactory = Arc<dyn Fn(&Operation, &Resource) -> RuntimeTask + Send + Sync>;

// =============================================================================
// add
// =============================================================================

/// Creates a resource at a vacant address from the operation's parameters.
///
/// The compensating operation is `remove` at the same address. Subsystems
/// register their own instance with declared parameters and a runtime task
/// that installs the subsystem's services.
pub struct AddResourceHandler {
    params: Vec<ParamSpec>,
    task: Option<RuntimeTaskFactory>,
}

impl AddResourceHandler {
    /// An add handler with a declared parameter contract.
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params, task: None }
    }

    /// An add handler accepting arbitrary parameters. Backs the generic
    /// `add` registration so compensating operations of `remove` always
    /// replay, whatever attributes the removed resource carried.
    pub fn permissive() -> Self {
        Self::new(Vec::new())
    }

    /// Attach a runtime-task factory, invoked once the resource is committed.
    pub fn with_runtime_task(
        mut self,
        factory: impl Fn(&Operation, &Resource) -> RuntimeTask + Send + Sync + 'static,
    ) -> Self {
        self.task = Some(Arc::new(factory));
        self
    }
}

impl OperationHandler for AddResourceHandler {
    fn address_policy(&self) -> AddressPolicy {
        AddressPolicy::MustNotExist
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    fn execute(&self, ctx: OperationContext<'_>) -> Result<HandlerOutcome, OperationError> {
        let resource = Resource::with_attributes(
            ctx.operation
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let compensating = Operation::new(ctx.operation.address.clone(), op_names::REMOVE);
        ctx.tree
            .put(ctx.operation.address.clone(), resource.clone());

        let mut outcome = HandlerOutcome::new(compensating);
        if let Some(factory) = &self.task {
            outcome = outcome.with_runtime_task(factory(ctx.operation, &resource));
        }
        Ok(outcome)
    }
}

// =============================================================================
// remove
// =============================================================================

/// Removes the resource at the address.
///
/// The compensating operation is `add` carrying the removed attributes, so
/// replaying it restores the resource attribute for attribute.
pub struct RemoveResourceHandler {
    task: Option<RuntimeTaskFactory>,
}

impl RemoveResourceHandler {
    /// A remove handler with no runtime task.
    pub fn new() -> Self {
        Self { task: None }
    }

    /// Attach a runtime-task factory, invoked with the removed resource.
    pub fn with_runtime_task(
        mut self,
        factory: impl Fn(&Operation, &Resource) -> RuntimeTask + Send + Sync + 'static,
    ) -> Self {
        self.task = Some(Arc::new(factory));
        self
    }
}

impl Default for RemoveResourceHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationHandler for RemoveResourceHandler {
    fn address_policy(&self) -> AddressPolicy {
        AddressPolicy::MustExist
    }

    fn parameters(&self) -> &[ParamSpec] {
        &[]
    }

    fn execute(&self, ctx: OperationContext<'_>) -> Result<HandlerOutcome, OperationError> {
        let removed = ctx.tree.remove(&ctx.operation.address)?;

        let mut compensating = Operation::new(ctx.operation.address.clone(), op_names::ADD);
        for (name, value) in removed.attributes() {
            compensating = compensating.with_param(name, value.clone());
        }

        let mut outcome = HandlerOutcome::new(compensating);
        if let Some(factory) = &self.task {
            outcome = outcome.with_runtime_task(factory(ctx.operation, &removed));
        }
        Ok(outcome)
    }
}

// =============================================================================
// write-attribute / undefine-attribute
// =============================================================================

/// Writes one attribute of an existing resource.
///
/// Attribute-specific validators are registered per attribute name;
/// attributes without one accept any value. The compensating operation
/// rewrites the previous value, or undefines the attribute when it was
/// previously unset.
pub struct WriteAttributeHandler {
    params: Vec<ParamSpec>,
    validators: BTreeMap<String, Arc<dyn ParamValidator>>,
}

impl WriteAttributeHandler {
    /// A write handler with no per-attribute validators.
    pub fn new() -> Self {
        Self {
            params: vec![
                ParamSpec::required("name", StringLength::non_empty()),
                ParamSpec::required("value", AnyValue),
            ],
            validators: BTreeMap::new(),
        }
    }

    /// Register a validator for one attribute.
    pub fn with_validator(
        mut self,
        attribute: impl Into<String>,
        validator: impl ParamValidator + 'static,
    ) -> Self {
        self.validators.insert(attribute.into(), Arc::new(validator));
        self
    }
}

impl Default for WriteAttributeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationHandler for WriteAttributeHandler {
    fn address_policy(&self) -> AddressPolicy {
        AddressPolicy::MustExist
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    fn execute(&self, ctx: OperationContext<'_>) -> Result<HandlerOutcome, OperationError> {
        // Both parameters exist and `name` is a string; the executor enforced
        // the declared contract already.
        let attribute = ctx
            .operation
            .param("name")
            .and_then(ModelValue::as_str)
            .ok_or_else(|| OperationError::validation("name", "missing attribute name"))?
            .to_string();
        let value = ctx
            .operation
            .param("value")
            .ok_or_else(|| OperationError::validation("value", "missing attribute value"))?
            .clone();

        if let Some(validator) = self.validators.get(&attribute) {
            validator.validate(&attribute, &value)?;
        }

        let resource = ctx.tree.get_mut(&ctx.operation.address)?;
        let previous = resource.set(attribute.clone(), value);

        let compensating = match previous {
            Some(prev) => Operation::new(ctx.operation.address.clone(), op_names::WRITE_ATTRIBUTE)
                .with_param("name", attribute)
                .with_param("value", prev),
            None => Operation::new(
                ctx.operation.address.clone(),
                op_names::UNDEFINE_ATTRIBUTE,
            )
            .with_param("name", attribute),
        };
        Ok(HandlerOutcome::new(compensating))
    }
}

/// Removes one attribute from an existing resource.
///
/// The inverse of writing a previously-unset attribute. Undefining an
/// already-unset attribute is a no-op whose inverse is itself.
pub struct UndefineAttributeHandler {
    params: Vec<ParamSpec>,
}

impl UndefineAttributeHandler {
    /// Create the handler.
    pub fn new() -> Self {
        Self {
            params: vec![ParamSpec::required("name", StringLength::non_empty())],
        }
    }
}

impl Default for UndefineAttributeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationHandler for UndefineAttributeHandler {
    fn address_policy(&self) -> AddressPolicy {
        AddressPolicy::MustExist
    }

    fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    fn execute(&self, ctx: OperationContext<'_>) -> Result<HandlerOutcome, OperationError> {
        let attribute = ctx
            .operation
            .param("name")
            .and_then(ModelValue::as_str)
            .ok_or_else(|| OperationError::validation("name", "missing attribute name"))?
            .to_string();

        let resource = ctx.tree.get_mut(&ctx.operation.address)?;
        let previous = resource.unset(&attribute);

        let compensating = match previous {
            Some(prev) => Operation::new(ctx.operation.address.clone(), op_names::WRITE_ATTRIBUTE)
                .with_param("name", attribute)
                .with_param("value", prev),
            None => Operation::new(
                ctx.operation.address.clone(),
                op_names::UNDEFINE_ATTRIBUTE,
            )
            .with_param("name", attribute),
        };
        Ok(HandlerOutcome::new(compensating))
    }
}

// =============================================================================
// read-resource / describe
// =============================================================================

/// Reads a resource's attributes as a map value. Self-inverse.
pub struct ReadResourceHandler;

impl OperationHandler for ReadResourceHandler {
    fn address_policy(&self) -> AddressPolicy {
        AddressPolicy::MustExist
    }

    fn parameters(&self) -> &[ParamSpec] {
        &[]
    }

    fn execute(&self, ctx: OperationContext<'_>) -> Result<HandlerOutcome, OperationError> {
        let resource = ctx.tree.get(&ctx.operation.address)?;
        let attrs: BTreeMap<String, ModelValue> = resource
            .attributes()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let compensating = ctx.operation.clone();
        Ok(HandlerOutcome::new(compensating).with_value(ModelValue::Map(attrs)))
    }
}

/// Describes a subtree as the list of `add` operations that would recreate
/// it: one entry per resource, in address order. Self-inverse.
pub struct DescribeHandler;

impl OperationHandler for DescribeHandler {
    fn address_policy(&self) -> AddressPolicy {
        AddressPolicy::MustExist
    }

    fn parameters(&self) -> &[ParamSpec] {
        &[]
    }

    fn execute(&self, ctx: OperationContext<'_>) -> Result<HandlerOutcome, OperationError> {
        let root = &ctx.operation.address;
        let mut addresses = vec![root.clone()];
        addresses.extend(ctx.tree.child_addresses(root).cloned());

        let mut entries = Vec::with_capacity(addresses.len());
        for address in addresses {
            let resource = ctx.tree.get(&address)?;
            let params: BTreeMap<String, ModelValue> = resource
                .attributes()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            let mut entry = BTreeMap::new();
            entry.insert(
                "address".to_string(),
                ModelValue::String(address.to_string()),
            );
            entry.insert(
                "operation".to_string(),
                ModelValue::String(op_names::ADD.to_string()),
            );
            entry.insert("params".to_string(), ModelValue::Map(params));
            entries.push(ModelValue::Map(entry));
        }

        let compensating = ctx.operation.clone();
        Ok(HandlerOutcome::new(compensating).with_value(ModelValue::List(entries)))
    }
}
