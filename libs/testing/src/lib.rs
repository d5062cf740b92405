//! # mast-testing
//!
//! Shared test support for the kernel crates: tracing initialization and
//! scripted [`Service`] implementations that record lifecycle activity.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use mast_model::ModelValue;
use mast_services::{Injections, Service};

/// Initialize tracing for tests. Safe to call more than once.
///
/// Honors `RUST_LOG`; output goes through the test writer so it interleaves
/// with test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shared, ordered log of lifecycle events across scripted services.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn record(&self, event: impl Into<String>) {
        self.events
            .lock()
            .expect("event log lock poisoned")
            .push(event.into());
    }

    /// Snapshot of all events in order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("event log lock poisoned").clone()
    }

    /// Position of an event, if recorded.
    pub fn position_of(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

/// A scripted service for lifecycle tests.
///
/// Records `start <label>` / `stop <label>` into its [`EventLog`] and can be
/// configured to provide a value, fail, or stall.
pub struct RecordingService {
    label: String,
    log: EventLog,
    provides: Option<ModelValue>,
    fail_with: Option<String>,
    start_delay: Option<Duration>,
}

impl RecordingService {
    /// A service that starts and stops cleanly.
    pub fn new(label: impl Into<String>, log: EventLog) -> Self {
        Self {
            label: label.into(),
            log,
            provides: None,
            fail_with: None,
            start_delay: None,
        }
    }

    /// Provide a value to dependents on start.
    pub fn providing(mut self, value: impl Into<ModelValue>) -> Self {
        self.provides = Some(value.into());
        self
    }

    /// Fail the start action with the given reason.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_with = Some(reason.into());
        self
    }

    /// Sleep before completing the start action (for timeout tests).
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }
}

#[async_trait]
impl Service for RecordingService {
    async fn start(&self, _injections: &Injections) -> anyhow::Result<Option<ModelValue>> {
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.fail_with {
            self.log.record(format!("fail {}", self.label));
            bail!("{reason}");
        }
        self.log.record(format!("start {}", self.label));
        Ok(self.provides.clone())
    }

    async fn stop(&self) {
        self.log.record(format!("stop {}", self.label));
    }
}

/// A service that captures the injection snapshot it was started with.
#[derive(Debug, Default)]
pub struct CapturingService {
    seen: Arc<Mutex<Option<Injections>>>,
}

impl CapturingService {
    /// Create a capturing service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the captured snapshot.
    pub fn captured(&self) -> Arc<Mutex<Option<Injections>>> {
        self.seen.clone()
    }
}

#[async_trait]
impl Service for CapturingService {
    async fn start(&self, injections: &Injections) -> anyhow::Result<Option<ModelValue>> {
        *self.seen.lock().expect("capture lock poisoned") = Some(injections.clone());
        Ok(None)
    }

    async fn stop(&self) {}
}
