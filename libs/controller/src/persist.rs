//! The configuration persistence seam.
//!
//! The kernel never parses or emits markup. It consumes already-parsed
//! operations from a [`ConfigSource`] and hands model snapshots to a
//! [`ConfigSink`]; what format lives behind either trait is a collaborator
//! concern.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use mast_model::ModelTreeSnapshot;

use crate::operation::Operation;

/// Supplies parsed operations, e.g. from stored configuration.
pub trait ConfigSource: Send + Sync {
    /// Load the operation sequence that reconstructs the model.
    fn load(&self) -> anyhow::Result<Vec<Operation>>;
}

/// Receives model snapshots for serialization.
pub trait ConfigSink: Send + Sync {
    /// Persist a snapshot of the whole model.
    fn persist(&self, snapshot: &ModelTreeSnapshot) -> anyhow::Result<()>;
}

/// A JSON-backed store implementing both sides of the seam.
///
/// Operations load from a JSON array; snapshots persist as pretty-printed
/// JSON. Sufficient for tests and for embedders without their own
/// marshalling layer.
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    /// A store reading and writing `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for JsonConfigStore {
    fn load(&self) -> anyhow::Result<Vec<Operation>> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let operations = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(operations)
    }
}

impl ConfigSink for JsonConfigStore {
    fn persist(&self, snapshot: &ModelTreeSnapshot) -> anyhow::Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("creating {}", self.path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), snapshot)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::op_names;
    use mast_model::{ModelTree, ModelValue, Resource};

    #[test]
    fn json_store_roundtrips_operations() {
        let path = std::env::temp_dir().join(format!(
            "mast-config-{}-{:?}.json",
            std::process::id(),
            std::thread::current().id()
        ));
        let ops = vec![
            Operation::new("/subsystem=ee".parse().unwrap(), op_names::ADD),
            Operation::new(
                "/subsystem=http-management".parse().unwrap(),
                op_names::ADD,
            )
            .with_param("interface", "public")
            .with_param("port", 9990i64),
        ];
        std::fs::write(&path, serde_json::to_string(&ops).unwrap()).unwrap();

        let store = JsonConfigStore::new(&path);
        let loaded = store.load().unwrap();
        assert_eq!(loaded, ops);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn snapshot_persists_and_reloads() {
        let path = std::env::temp_dir().join(format!(
            "mast-snapshot-{}-{:?}.json",
            std::process::id(),
            std::thread::current().id()
        ));
        let mut tree = ModelTree::new();
        tree.put(
            "/subsystem=http-management".parse().unwrap(),
            Resource::with_attributes([("port", ModelValue::Int(9990))]),
        );
        let snapshot = tree.snapshot();

        let store = JsonConfigStore::new(&path);
        store.persist(&snapshot).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let back: ModelTreeSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, snapshot);

        std::fs::remove_file(&path).ok();
    }
}
