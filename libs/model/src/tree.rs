//! The model tree: address-keyed storage of configuration resources.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::PathAddress;
use crate::error::ModelError;
use crate::value::ModelValue;

/// A configuration node: a unique-keyed attribute map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    attributes: BTreeMap<String, ModelValue>,
}

impl Resource {
    /// Create an empty resource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a resource from attribute pairs.
    pub fn with_attributes<K>(attrs: impl IntoIterator<Item = (K, ModelValue)>) -> Self
    where
        K: Into<String>,
    {
        Self {
            attributes: attrs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Read an attribute.
    pub fn get(&self, name: &str) -> Option<&ModelValue> {
        self.attributes.get(name)
    }

    /// Write an attribute, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: ModelValue) -> Option<ModelValue> {
        self.attributes.insert(name.into(), value)
    }

    /// Remove an attribute, returning the removed value.
    pub fn unset(&mut self, name: &str) -> Option<ModelValue> {
        self.attributes.remove(name)
    }

    /// Iterate over attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &ModelValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// True when the resource has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// The in-memory configuration model.
///
/// Pure storage keyed by [`PathAddress`]. Mutations are synchronous; callers
/// that share a tree across threads wrap it in a lock so a resource's
/// attribute set is never observed mid-write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelTree {
    nodes: BTreeMap<PathAddress, Resource>,
}

impl ModelTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an address to its resource.
    pub fn get(&self, address: &PathAddress) -> Result<&Resource, ModelError> {
        self.nodes
            .get(address)
            .ok_or_else(|| ModelError::NotFound(address.clone()))
    }

    /// Mutable resolution.
    pub fn get_mut(&mut self, address: &PathAddress) -> Result<&mut Resource, ModelError> {
        self.nodes
            .get_mut(address)
            .ok_or_else(|| ModelError::NotFound(address.clone()))
    }

    /// True if a resource exists at the address.
    pub fn contains(&self, address: &PathAddress) -> bool {
        self.nodes.contains_key(address)
    }

    /// Install a resource, returning the previous occupant if any.
    pub fn put(&mut self, address: PathAddress, resource: Resource) -> Option<Resource> {
        self.nodes.insert(address, resource)
    }

    /// Remove the resource at the address.
    pub fn remove(&mut self, address: &PathAddress) -> Result<Resource, ModelError> {
        self.nodes
            .remove(address)
            .ok_or_else(|| ModelError::NotFound(address.clone()))
    }

    /// Addresses of direct and transitive children of `prefix`, in order.
    pub fn child_addresses<'a>(
        &'a self,
        prefix: &'a PathAddress,
    ) -> impl Iterator<Item = &'a PathAddress> {
        self.nodes
            .keys()
            .filter(move |addr| prefix.is_ancestor_of(addr))
    }

    /// Number of resources in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no resources are registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// An immutable copy of the whole tree for serialization.
    pub fn snapshot(&self) -> ModelTreeSnapshot {
        ModelTreeSnapshot {
            nodes: self.nodes.clone(),
        }
    }
}

/// An immutable point-in-time copy of the model, handed to the persistence
/// collaborator. The kernel never serializes markup itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTreeSnapshot {
    nodes: BTreeMap<PathAddress, Resource>,
}

impl ModelTreeSnapshot {
    /// Resources in address order.
    pub fn resources(&self) -> impl Iterator<Item = (&PathAddress, &Resource)> {
        self.nodes.iter()
    }

    /// Read one resource.
    pub fn get(&self, address: &PathAddress) -> Option<&Resource> {
        self.nodes.get(address)
    }

    /// Number of resources captured.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
