//! The runtime-task callback surface.

use mast_services::{ServiceContainer, ServiceDescriptor, ServiceError, ServiceHandle, ServiceName};

/// Context a runtime task runs against: the only channel through which the
/// operation layer reaches the service container.
///
/// Installation is submit-and-return; the handles collected here are carried
/// back to the caller on the operation result for completion signalling.
pub struct RuntimeTaskContext {
    container: ServiceContainer,
    handles: Vec<ServiceHandle>,
}

impl RuntimeTaskContext {
    pub(crate) fn new(container: ServiceContainer) -> Self {
        Self {
            container,
            handles: Vec::new(),
        }
    }

    /// Install a service descriptor, recording its handle.
    pub fn add_service(
        &mut self,
        descriptor: ServiceDescriptor,
    ) -> Result<ServiceHandle, ServiceError> {
        let handle = self.container.install(descriptor)?;
        self.handles.push(handle.clone());
        Ok(handle)
    }

    /// Request removal of a service.
    ///
    /// Refusals (`InUse` with live dependents and no `cascade`, `NotFound`)
    /// are reported here and carried back to the caller on the operation
    /// result; an accepted removal unwinds asynchronously.
    pub fn remove_service(&mut self, name: &ServiceName, cascade: bool) -> Result<(), ServiceError> {
        self.container.schedule_remove(name, cascade)
    }

    /// Direct access to the container, for state queries.
    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    pub(crate) fn into_handles(self) -> Vec<ServiceHandle> {
        self.handles
    }
}
