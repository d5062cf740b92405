//! The service container: registry, dependency bookkeeping, and the async
//! lifecycle scheduler.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use mast_model::ModelValue;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::config::ContainerConfig;
use crate::descriptor::{Injections, InjectionSource, Service, ServiceDescriptor, StartMode};
use crate::error::ServiceError;
use crate::graph;
use crate::name::ServiceName;
use crate::ServiceState;

// =============================================================================
// Registry state
// =============================================================================

struct ServiceEntry {
    descriptor: ServiceDescriptor,
    state: ServiceState,
    state_tx: watch::Sender<ServiceState>,
    /// Value returned by the start action, read by dependents' injections.
    provided: Option<ModelValue>,
    /// Recorded start failure, kept until the entry is removed.
    error: Option<String>,
    /// Required dependency whose failure permanently blocks this service.
    blocked_on: Option<ServiceName>,
    /// Set while a removal is unwinding this entry.
    remove_requested: bool,
}

impl ServiceEntry {
    fn set_state(&mut self, state: ServiceState) {
        self.state = state;
        // Receivers are woken on every send, including blocked-marker resends.
        let _ = self.state_tx.send(state);
    }
}

#[derive(Default)]
struct Inner {
    services: BTreeMap<ServiceName, ServiceEntry>,
}

impl Inner {
    /// Names of services holding an edge on `name`.
    fn dependents(&self, name: &ServiceName, required_only: bool) -> Vec<ServiceName> {
        self.services
            .iter()
            .filter(|(other, entry)| {
                *other != name
                    && (entry.descriptor.required.contains(name)
                        || (!required_only && entry.descriptor.optional.contains(name)))
            })
            .map(|(other, _)| other.clone())
            .collect()
    }

    /// Current dependency edges (service -> its declared dependencies).
    fn edges(&self) -> BTreeMap<ServiceName, BTreeSet<ServiceName>> {
        self.services
            .iter()
            .map(|(n, e)| (n.clone(), e.descriptor.dependencies().cloned().collect()))
            .collect()
    }
}

struct Shared {
    inner: Mutex<Inner>,
    /// Bounds concurrently running start/stop actions.
    actions: Semaphore,
    config: ContainerConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("container lock poisoned")
    }
}

/// A start action ready to run: everything it needs, snapshotted under the lock.
struct StartJob {
    name: ServiceName,
    service: Arc<dyn Service>,
    injections: Injections,
}

// =============================================================================
// Container
// =============================================================================

/// The live service registry and scheduler.
///
/// Structural mutations (install, remove, state transitions) are serialized
/// under one lock; start and stop actions run on the tokio pool, bounded by
/// [`ContainerConfig::max_concurrent_starts`]. `install` returns as soon as
/// the descriptor is registered; completion is observed via [`ServiceHandle`].
#[derive(Clone)]
pub struct ServiceContainer {
    shared: Arc<Shared>,
}

impl ServiceContainer {
    /// Create a container with the given configuration.
    pub fn new(config: ContainerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                actions: Semaphore::new(config.max_concurrent_starts.max(1)),
                config,
            }),
        }
    }

    /// Register a descriptor and schedule it according to its start mode.
    ///
    /// Fails with [`ServiceError::DuplicateServiceName`] when the name is held
    /// by a registration that is not `Down`/`Failed`, and with
    /// [`ServiceError::CyclicDependency`] when the descriptor's edges would
    /// close a cycle; neither failure commits anything to the graph.
    pub fn install(&self, descriptor: ServiceDescriptor) -> Result<ServiceHandle, ServiceError> {
        let name = descriptor.name.clone();
        let (state_rx, jobs) = {
            let mut inner = self.shared.lock();

            if let Some(existing) = inner.services.get(&name) {
                if existing.state.is_removable() {
                    // Down/Failed registrations are replaced in place.
                    inner.services.remove(&name);
                } else {
                    return Err(ServiceError::DuplicateServiceName {
                        name,
                        state: existing.state,
                    });
                }
            }

            let edges = inner.edges();
            let candidate_deps: BTreeSet<ServiceName> =
                descriptor.dependencies().cloned().collect();
            if let Some(path) = graph::find_cycle(&edges, &name, &candidate_deps) {
                return Err(ServiceError::CyclicDependency { name, path });
            }

            let (state_tx, state_rx) = watch::channel(ServiceState::Down);
            info!(
                service = %name,
                mode = ?descriptor.mode,
                required = descriptor.required.len(),
                optional = descriptor.optional.len(),
                "installing service"
            );
            let required: Vec<ServiceName> = descriptor.required.iter().cloned().collect();
            inner.services.insert(
                name.clone(),
                ServiceEntry {
                    descriptor,
                    state: ServiceState::Down,
                    state_tx,
                    provided: None,
                    error: None,
                    blocked_on: None,
                    remove_requested: false,
                },
            );

            let mut jobs = Vec::new();
            if let Some(job) = maybe_start(&mut inner, &name) {
                jobs.push(job);
            }
            // Installing a service demands its on-demand dependencies.
            for dep in &required {
                if let Some(job) = maybe_start(&mut inner, dep) {
                    jobs.push(job);
                }
            }
            (state_rx, jobs)
        };

        for job in jobs {
            spawn_start(self.shared.clone(), job);
        }

        Ok(ServiceHandle {
            name,
            state_rx,
            shared: self.shared.clone(),
        })
    }

    /// Stop and unregister a service.
    ///
    /// With `cascade` false, live required dependents cause
    /// [`ServiceError::InUse`] and nothing changes. With `cascade` true, the
    /// transitive required dependents are stopped and removed first, each stop
    /// beginning strictly before the stop of anything it depends on. A start
    /// already in progress is never preempted; removal waits for it to settle.
    pub async fn remove(&self, name: &ServiceName, cascade: bool) -> Result<(), ServiceError> {
        let order = self.plan_remove(name, cascade)?;
        for svc in &order {
            stop_and_settle(&self.shared, svc, true).await;
        }
        Ok(())
    }

    /// Validate and begin a removal without waiting for it to settle.
    ///
    /// `NotFound` and `InUse` are checked synchronously under the lock, so a
    /// caller that cannot await still learns whether the removal was refused;
    /// the stop-and-unregister unwind then runs on its own task.
    pub fn schedule_remove(&self, name: &ServiceName, cascade: bool) -> Result<(), ServiceError> {
        let order = self.plan_remove(name, cascade)?;
        let shared = self.shared.clone();
        tokio::spawn(async move {
            for svc in &order {
                stop_and_settle(&shared, svc, true).await;
            }
        });
        Ok(())
    }

    /// The locked phase of removal: refuse `NotFound`/`InUse`, mark every
    /// affected entry, and return the unwind order (dependents first).
    fn plan_remove(&self, name: &ServiceName, cascade: bool) -> Result<Vec<ServiceName>, ServiceError> {
        let order = {
            let mut inner = self.shared.lock();
            if !inner.services.contains_key(name) {
                return Err(ServiceError::NotFound(name.clone()));
            }

            let dependents = transitive_required_dependents(&inner, name);
            let live: Vec<ServiceName> = dependents
                .iter()
                .filter(|d| {
                    inner
                        .services
                        .get(*d)
                        .is_some_and(|e| !e.state.is_removable())
                })
                .cloned()
                .collect();

            let mut order = if cascade {
                stop_order(&inner, &dependents)
            } else if live.is_empty() {
                Vec::new()
            } else {
                return Err(ServiceError::InUse {
                    name: name.clone(),
                    dependents: live,
                });
            };
            order.push(name.clone());

            for svc in &order {
                if let Some(entry) = inner.services.get_mut(svc) {
                    entry.remove_requested = true;
                }
            }
            order
        };

        info!(service = %name, cascade, unwinding = order.len(), "removing service");
        Ok(order)
    }

    /// Current lifecycle state of a registered service.
    pub fn state(&self, name: &ServiceName) -> Result<ServiceState, ServiceError> {
        let inner = self.shared.lock();
        inner
            .services
            .get(name)
            .map(|e| e.state)
            .ok_or_else(|| ServiceError::NotFound(name.clone()))
    }

    /// The recorded failure affecting a service, if any.
    ///
    /// `ServiceStart` for a service whose own start action failed,
    /// `DependencyFailed` for a pending service blocked by a failed
    /// required dependency.
    pub fn failure(&self, name: &ServiceName) -> Result<Option<ServiceError>, ServiceError> {
        let inner = self.shared.lock();
        let entry = inner
            .services
            .get(name)
            .ok_or_else(|| ServiceError::NotFound(name.clone()))?;
        Ok(entry_failure(name, entry))
    }

    /// The value a service provided at start, while it is up.
    pub fn provided(&self, name: &ServiceName) -> Result<Option<ModelValue>, ServiceError> {
        let inner = self.shared.lock();
        inner
            .services
            .get(name)
            .map(|e| e.provided.clone())
            .ok_or_else(|| ServiceError::NotFound(name.clone()))
    }

    /// Obtain a handle to an already-registered service.
    pub fn handle(&self, name: &ServiceName) -> Result<ServiceHandle, ServiceError> {
        let inner = self.shared.lock();
        let entry = inner
            .services
            .get(name)
            .ok_or_else(|| ServiceError::NotFound(name.clone()))?;
        Ok(ServiceHandle {
            name: name.clone(),
            state_rx: entry.state_tx.subscribe(),
            shared: self.shared.clone(),
        })
    }

    /// Names of all registered services, in order.
    pub fn service_names(&self) -> Vec<ServiceName> {
        self.shared.lock().services.keys().cloned().collect()
    }
}

fn entry_failure(name: &ServiceName, entry: &ServiceEntry) -> Option<ServiceError> {
    if entry.state == ServiceState::Failed {
        return Some(ServiceError::ServiceStart {
            name: name.clone(),
            reason: entry.error.clone().unwrap_or_default(),
        });
    }
    entry
        .blocked_on
        .as_ref()
        .map(|dependency| ServiceError::DependencyFailed {
            name: name.clone(),
            dependency: dependency.clone(),
        })
}

// =============================================================================
// Scheduling
// =============================================================================

/// Transition `name` to `Starting` and build its start job, when startable.
///
/// A service is startable when it is `Down`, not blocked, its mode permits
/// (`Active`, or `OnDemand` with at least one registered required dependent),
/// and every required dependency is registered and `Up`. The injection
/// snapshot is taken here, under the lock.
fn maybe_start(inner: &mut Inner, name: &ServiceName) -> Option<StartJob> {
    let (required, injections, mode, service) = {
        let entry = inner.services.get(name)?;
        if entry.state != ServiceState::Down
            || entry.blocked_on.is_some()
            || entry.remove_requested
        {
            return None;
        }
        (
            entry.descriptor.required.clone(),
            entry.descriptor.injections.clone(),
            entry.descriptor.mode,
            entry.descriptor.service.clone(),
        )
    };

    match mode {
        StartMode::Never => return None,
        StartMode::Active => {}
        StartMode::OnDemand => {
            if inner.dependents(name, true).is_empty() {
                return None;
            }
        }
    }

    let mut failed_dep = None;
    for dep in &required {
        match inner.services.get(dep) {
            Some(d) if d.state == ServiceState::Up => {}
            Some(d) if d.state == ServiceState::Failed => {
                failed_dep = Some(dep.clone());
                break;
            }
            // Absent or not yet up: stay pending.
            _ => return None,
        }
    }
    if let Some(dep) = failed_dep {
        warn!(service = %name, dependency = %dep, "service blocked by failed dependency");
        let entry = inner.services.get_mut(name)?;
        entry.blocked_on = Some(dep);
        // Resend to wake waiters; state itself stays Down.
        entry.set_state(ServiceState::Down);
        return None;
    }

    let mut values = BTreeMap::new();
    for (point, source) in &injections {
        match source {
            InjectionSource::Value(v) => {
                values.insert(point.clone(), v.clone());
            }
            InjectionSource::Dependency(dep) => {
                // Optional dependencies that are absent or down contribute
                // nothing; the point is simply unset in the snapshot.
                if let Some(d) = inner.services.get(dep) {
                    if d.state == ServiceState::Up {
                        if let Some(v) = &d.provided {
                            values.insert(point.clone(), v.clone());
                        }
                    }
                }
            }
        }
    }

    let entry = inner.services.get_mut(name)?;
    entry.set_state(ServiceState::Starting);
    Some(StartJob {
        name: name.clone(),
        service,
        injections: Injections::new(values),
    })
}

fn spawn_start(shared: Arc<Shared>, job: StartJob) {
    tokio::spawn(async move { run_start(shared, job).await });
}

fn spawn_stop(shared: Arc<Shared>, name: ServiceName) {
    tokio::spawn(async move { stop_and_settle(&shared, &name, false).await });
}

async fn run_start(shared: Arc<Shared>, job: StartJob) {
    let StartJob {
        name,
        service,
        injections,
    } = job;

    let Ok(_permit) = shared.actions.acquire().await else {
        return;
    };
    debug!(service = %name, injected = injections.len(), "starting service");
    let outcome = tokio::time::timeout(shared.config.start_timeout, service.start(&injections)).await;

    let mut follow_starts = Vec::new();
    let mut follow_stops = Vec::new();
    {
        let mut inner = shared.lock();
        let failure = match outcome {
            Ok(Ok(provided)) => {
                let Some(entry) = inner.services.get_mut(&name) else {
                    return;
                };
                entry.provided = provided;
                entry.error = None;
                entry.set_state(ServiceState::Up);
                let removing = entry.remove_requested;
                info!(service = %name, "service up");
                if !removing {
                    for dependent in inner.dependents(&name, false) {
                        if let Some(job) = maybe_start(&mut inner, &dependent) {
                            follow_starts.push(job);
                        }
                    }
                }
                None
            }
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(_) => Some(format!(
                "start timed out after {:?}",
                shared.config.start_timeout
            )),
        };

        if let Some(reason) = failure {
            warn!(service = %name, reason = %reason, "service failed to start");
            let Some(entry) = inner.services.get_mut(&name) else {
                return;
            };
            entry.error = Some(reason);
            entry.set_state(ServiceState::Failed);

            // Required dependents: live ones stop, pending ones are
            // permanently blocked. Optional dependents keep running with
            // their binding cleared at next start.
            for dependent in inner.dependents(&name, true) {
                let Some(dep_entry) = inner.services.get_mut(&dependent) else {
                    continue;
                };
                match dep_entry.state {
                    ServiceState::Up | ServiceState::Starting => {
                        follow_stops.push(dependent);
                    }
                    ServiceState::Down => {
                        dep_entry.blocked_on = Some(name.clone());
                        dep_entry.set_state(ServiceState::Down);
                    }
                    ServiceState::Stopping | ServiceState::Failed => {}
                }
            }
        }
    }

    for job in follow_starts {
        spawn_start(shared.clone(), job);
    }
    for dependent in follow_stops {
        spawn_stop(shared.clone(), dependent);
    }
}

/// Drive a service to `Down` (and optionally out of the registry).
///
/// Waits out any start or stop already in flight instead of preempting it.
async fn stop_and_settle(shared: &Arc<Shared>, name: &ServiceName, remove_entry: bool) {
    enum Action {
        Wait(watch::Receiver<ServiceState>),
        Stop(Arc<dyn Service>),
    }

    loop {
        let action = {
            let mut inner = shared.lock();
            let Some(entry) = inner.services.get_mut(name) else {
                return;
            };
            match entry.state {
                ServiceState::Down | ServiceState::Failed => {
                    if remove_entry {
                        inner.services.remove(name);
                        info!(service = %name, "service removed");
                    }
                    return;
                }
                ServiceState::Starting | ServiceState::Stopping => {
                    Action::Wait(entry.state_tx.subscribe())
                }
                ServiceState::Up => {
                    entry.set_state(ServiceState::Stopping);
                    Action::Stop(entry.descriptor.service.clone())
                }
            }
        };

        match action {
            Action::Wait(mut rx) => {
                // A closed channel means the entry was removed concurrently;
                // the next loop iteration observes that and returns.
                let _ = rx.changed().await;
            }
            Action::Stop(service) => {
                let permit = shared.actions.acquire().await;
                info!(service = %name, "stopping service");
                service.stop().await;
                drop(permit);

                let follow = {
                    let mut inner = shared.lock();
                    if let Some(entry) = inner.services.get_mut(name) {
                        entry.provided = None;
                        entry.error = None;
                        entry.set_state(ServiceState::Down);
                        if remove_entry || entry.remove_requested {
                            inner.services.remove(name);
                            info!(service = %name, "service removed");
                        } else {
                            info!(service = %name, "service down");
                        }
                    }
                    // Live required dependents follow their dependency down.
                    inner
                        .dependents(name, true)
                        .into_iter()
                        .filter(|d| {
                            inner.services.get(d).is_some_and(|e| {
                                matches!(e.state, ServiceState::Up | ServiceState::Starting)
                            })
                        })
                        .collect::<Vec<_>>()
                };
                for dependent in follow {
                    spawn_stop(shared.clone(), dependent);
                }
                return;
            }
        }
    }
}

// =============================================================================
// Removal ordering
// =============================================================================

/// All services transitively requiring `name`, unordered.
fn transitive_required_dependents(inner: &Inner, name: &ServiceName) -> Vec<ServiceName> {
    let mut seen: BTreeSet<ServiceName> = BTreeSet::new();
    let mut frontier = vec![name.clone()];
    while let Some(current) = frontier.pop() {
        for dependent in inner.dependents(&current, true) {
            if seen.insert(dependent.clone()) {
                frontier.push(dependent);
            }
        }
    }
    seen.remove(name);
    seen.into_iter().collect()
}

/// Order `set` so every service precedes anything it requires within the set.
///
/// The graph is acyclic by construction (install rejects cycles), so the
/// selection loop always makes progress.
fn stop_order(inner: &Inner, set: &[ServiceName]) -> Vec<ServiceName> {
    let mut remaining: Vec<ServiceName> = set.to_vec();
    let mut order = Vec::with_capacity(set.len());
    while !remaining.is_empty() {
        let next = remaining.iter().position(|candidate| {
            // No other remaining service may still require this one.
            !remaining.iter().any(|other| {
                other != candidate
                    && inner
                        .services
                        .get(other)
                        .is_some_and(|e| e.descriptor.required.contains(candidate))
            })
        });
        match next {
            Some(idx) => order.push(remaining.remove(idx)),
            // Unreachable for acyclic graphs; bail rather than spin.
            None => {
                order.append(&mut remaining);
                break;
            }
        }
    }
    order
}

// =============================================================================
// Handle
// =============================================================================

/// Observer handle for one registered service.
///
/// Returned by [`ServiceContainer::install`]; completion, failure, and state
/// changes surface here rather than from `install` itself.
#[derive(Clone)]
pub struct ServiceHandle {
    name: ServiceName,
    state_rx: watch::Receiver<ServiceState>,
    shared: Arc<Shared>,
}

impl ServiceHandle {
    /// The service name this handle observes.
    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    /// The recorded failure affecting this service, if any.
    pub fn failure(&self) -> Option<ServiceError> {
        let inner = self.shared.lock();
        inner
            .services
            .get(&self.name)
            .and_then(|entry| entry_failure(&self.name, entry))
    }

    /// Wait until the service reaches `Up`.
    ///
    /// Fails with the recorded [`ServiceError::ServiceStart`] if the start
    /// action fails, [`ServiceError::DependencyFailed`] if a required
    /// dependency fails while this service is pending, and
    /// [`ServiceError::Removed`] if the registration disappears.
    pub async fn await_up(&mut self) -> Result<(), ServiceError> {
        loop {
            match self.state() {
                ServiceState::Up => return Ok(()),
                ServiceState::Failed => {
                    return Err(self.failure().unwrap_or(ServiceError::ServiceStart {
                        name: self.name.clone(),
                        reason: "unknown failure".to_string(),
                    }))
                }
                _ => {}
            }
            if let Some(err @ ServiceError::DependencyFailed { .. }) = self.failure() {
                return Err(err);
            }
            if self.state_rx.changed().await.is_err() {
                return Err(ServiceError::Removed(self.name.clone()));
            }
        }
    }

    /// Wait until the service is in a quiescent state and return it.
    pub async fn await_settled(&mut self) -> Result<ServiceState, ServiceError> {
        loop {
            let state = self.state();
            if !state.is_transitioning() {
                return Ok(state);
            }
            if self.state_rx.changed().await.is_err() {
                return Err(ServiceError::Removed(self.name.clone()));
            }
        }
    }

    /// Wait for the next state change and return the new state.
    pub async fn changed(&mut self) -> Result<ServiceState, ServiceError> {
        self.state_rx
            .changed()
            .await
            .map_err(|_| ServiceError::Removed(self.name.clone()))?;
        Ok(self.state())
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
