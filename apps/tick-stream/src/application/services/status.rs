//! Pipeline component status.
//!
//! Each long-running component (generator, storage consumer, cache consumer)
//! owns a `ComponentState` and updates it as it moves through bootstrap and
//! steady state. The health server reads the same handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle phase of a pipeline component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentPhase {
    /// Constructed, not yet started.
    Starting,
    /// Retrying a dependency that is not reachable yet.
    WaitingForDependency,
    /// Steady state.
    Running,
    /// Stopped because of an error.
    Failed,
    /// Stopped on shutdown.
    Stopped,
}

/// Shared status of one pipeline component.
#[derive(Debug)]
pub struct ComponentState {
    name: &'static str,
    phase: parking_lot::RwLock<ComponentPhase>,
    running_since: parking_lot::RwLock<Option<DateTime<Utc>>>,
    last_error: parking_lot::RwLock<Option<String>>,
    retry_attempts: AtomicU32,
    processed: AtomicU64,
}

impl ComponentState {
    /// Create a status handle in the `Starting` phase.
    #[must_use]
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            phase: parking_lot::RwLock::new(ComponentPhase::Starting),
            running_since: parking_lot::RwLock::new(None),
            last_error: parking_lot::RwLock::new(None),
            retry_attempts: AtomicU32::new(0),
            processed: AtomicU64::new(0),
        })
    }

    /// Component name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Move to a new phase.
    pub fn set_phase(&self, phase: ComponentPhase) {
        *self.phase.write() = phase;
        if phase == ComponentPhase::Running {
            *self.running_since.write() = Some(Utc::now());
            *self.last_error.write() = None;
        }
    }

    /// Record a bootstrap retry.
    pub fn record_retry(&self, error: String) {
        *self.phase.write() = ComponentPhase::WaitingForDependency;
        *self.last_error.write() = Some(error);
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark the component failed.
    pub fn set_failed(&self, error: String) {
        *self.phase.write() = ComponentPhase::Failed;
        *self.last_error.write() = Some(error);
    }

    /// Count one processed item (a published tick or a handled record).
    pub fn increment_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ComponentPhase {
        *self.phase.read()
    }

    /// Items processed so far.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Bootstrap retries so far.
    #[must_use]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.load(Ordering::Relaxed)
    }

    /// Point-in-time copy for reporting.
    #[must_use]
    pub fn snapshot(&self) -> ComponentSnapshot {
        ComponentSnapshot {
            name: self.name,
            phase: self.phase(),
            running_since: *self.running_since.read(),
            last_error: self.last_error.read().clone(),
            retry_attempts: self.retry_attempts(),
            processed: self.processed(),
        }
    }
}

/// Serializable copy of a `ComponentState`.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentSnapshot {
    /// Component name.
    pub name: &'static str,
    /// Current phase.
    pub phase: ComponentPhase,
    /// When the component last entered `Running`.
    pub running_since: Option<DateTime<Utc>>,
    /// Most recent error, cleared on entering `Running`.
    pub last_error: Option<String>,
    /// Bootstrap retries so far.
    pub retry_attempts: u32,
    /// Items processed so far.
    pub processed: u64,
}

/// Status handles for the three pipeline components.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    /// Tick generator.
    pub generator: Arc<ComponentState>,
    /// Durable storage consumer group.
    pub storage: Arc<ComponentState>,
    /// Cache + broadcast consumer group.
    pub cache: Arc<ComponentState>,
}

impl PipelineStatus {
    /// Fresh handles, all `Starting`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            generator: ComponentState::new("generator"),
            storage: ComponentState::new("storage_consumer"),
            cache: ComponentState::new("cache_consumer"),
        }
    }

    /// All component handles.
    #[must_use]
    pub fn components(&self) -> [&Arc<ComponentState>; 3] {
        [&self.generator, &self.storage, &self.cache]
    }

    /// True when every component is `Running`.
    #[must_use]
    pub fn all_running(&self) -> bool {
        self.components()
            .iter()
            .all(|c| c.phase() == ComponentPhase::Running)
    }

    /// True when any component has failed.
    #[must_use]
    pub fn any_failed(&self) -> bool {
        self.components()
            .iter()
            .any(|c| c.phase() == ComponentPhase::Failed)
    }
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::new()
    }
}
