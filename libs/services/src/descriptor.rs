//! Service descriptors: declarative records of a service's name, dependencies,
//! injections, and start mode.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mast_model::ModelValue;

use crate::name::ServiceName;

/// When the container should attempt to start a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Start eagerly as soon as required dependencies are up.
    Active,
    /// Start when first depended upon by another registered service.
    OnDemand,
    /// Register only; never scheduled.
    Never,
}

/// Source of a value injected into a service at start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionSource {
    /// A literal value captured from the configuration model.
    Value(ModelValue),
    /// The value provided by a named dependency once it is up.
    Dependency(ServiceName),
}

/// The resolved injection snapshot handed to a start action.
///
/// Immutable for the lifetime of the start; dependents never observe later
/// mutation of a running dependency's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Injections(BTreeMap<String, ModelValue>);

impl Injections {
    pub(crate) fn new(values: BTreeMap<String, ModelValue>) -> Self {
        Self(values)
    }

    /// Read an injection point.
    pub fn get(&self, point: &str) -> Option<&ModelValue> {
        self.0.get(point)
    }

    /// Read an injection point as a string.
    pub fn get_str(&self, point: &str) -> Option<&str> {
        self.0.get(point).and_then(ModelValue::as_str)
    }

    /// Read an injection point as an integer.
    pub fn get_int(&self, point: &str) -> Option<i64> {
        self.0.get(point).and_then(ModelValue::as_int)
    }

    /// Iterate over all points in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of resolved points.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing was injected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A runtime service's lifecycle actions.
///
/// `start` returns the value this service provides to dependents' injection
/// points, if any. Errors are opaque to the container; they are recorded
/// verbatim on the failed registration.
#[async_trait]
pub trait Service: Send + Sync {
    /// Bring the service up with its resolved injections.
    async fn start(&self, injections: &Injections) -> anyhow::Result<Option<ModelValue>>;

    /// Tear the service down. Infallible; cleanup problems are logged by impls.
    async fn stop(&self);
}

/// Declarative record submitted to the container.
///
/// A plain struct built by [`ServiceDescriptor::new`] and the `with_*` helpers,
/// then passed by value into [`install`](crate::ServiceContainer::install);
/// nothing is retained by the caller after submission.
#[derive(Clone)]
pub struct ServiceDescriptor {
    /// Unique name within the container.
    pub name: ServiceName,

    /// Start policy.
    pub mode: StartMode,

    /// Dependencies that must be up before this service starts.
    pub required: BTreeSet<ServiceName>,

    /// Dependencies that never block start but are wired in when present.
    pub optional: BTreeSet<ServiceName>,

    /// Injection points resolved at start scheduling time.
    pub injections: BTreeMap<String, InjectionSource>,

    /// The lifecycle actions.
    pub service: Arc<dyn Service>,
}

impl ServiceDescriptor {
    /// Create a descriptor with no dependencies or injections.
    pub fn new(name: impl Into<ServiceName>, service: Arc<dyn Service>, mode: StartMode) -> Self {
        Self {
            name: name.into(),
            mode,
            required: BTreeSet::new(),
            optional: BTreeSet::new(),
            injections: BTreeMap::new(),
            service,
        }
    }

    /// Declare a dependency edge.
    pub fn with_dependency(mut self, dependency: impl Into<ServiceName>, required: bool) -> Self {
        let dependency = dependency.into();
        if required {
            self.optional.remove(&dependency);
            self.required.insert(dependency);
        } else if !self.required.contains(&dependency) {
            self.optional.insert(dependency);
        }
        self
    }

    /// Declare an injection point.
    pub fn with_injection(mut self, point: impl Into<String>, source: InjectionSource) -> Self {
        self.injections.insert(point.into(), source);
        self
    }

    /// All dependency names, required first.
    pub fn dependencies(&self) -> impl Iterator<Item = &ServiceName> {
        self.required.iter().chain(self.optional.iter())
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("injections", &self.injections.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
