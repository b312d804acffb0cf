#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Tick Stream - Synthetic Market Tick Pipeline
//!
//! Generates synthetic price ticks for a static instrument catalog, moves them
//! through a durable append-only log, and fans them out along two independent
//! consumer paths: a durable tick table, and a windowed cache that feeds live
//! WebSocket subscribers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Tick model, instrument catalog, price model, subscriptions
//!   - `market`: `Tick` and its validated wire form
//!   - `instrument`: `InstrumentConfig` and the `SymbolRegistry`
//!   - `pricing`: random walk with mean reversion and clamping
//!   - `subscription`: named symbol sets and the wildcard
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: message log, tick store and tick handler interfaces
//!   - `services`: generator, consumer loop, component status
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `log`: file-backed message log with consumer groups
//!   - `storage`: SQLite tick table
//!   - `window`: sliding-window cache
//!   - `broadcast`: live connection registry and fan-out
//!   - `gateway`: HTTP query and WebSocket streaming endpoints
//!   - `retry`, `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                                        ┌─► storage group ─► SQLite
//! SymbolRegistry ─► Generator ─► Log ────┤
//!                                        └─► cache group ─► WindowedStore
//!                                                        └─► Broadcaster ─► WS clients
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Tick model and price generation, free of I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::instrument::{InstrumentConfig, SymbolRegistry};
pub use domain::market::{Tick, TickDecodeError, WindowEntry};
pub use domain::pricing::{NoiseSource, SeededNoise, SyntheticMarket};
pub use domain::subscription::Subscription;

// Ports and services
pub use application::ports::{
    HandlerError, LogError, LogRecord, StoreError, TickHandler, TickPublisher, TickStore,
    TickSubscription,
};
pub use application::services::{
    CacheConsumer, ComponentPhase, ComponentState, ConsumerError, PipelineStatus, StorageConsumer,
    TickGenerator, run_consumer,
};

// Adapters
pub use infrastructure::broadcast::{
    Broadcaster, ConnectionId, ConnectionRegistry, DeliveryError, PublishReport, SharedBroadcaster,
};
pub use infrastructure::gateway::{GatewayError, GatewayServer, GatewayState};
pub use infrastructure::log::{FileMessageLog, FileSubscription, OffsetReset};
pub use infrastructure::storage::SqliteTickStore;
pub use infrastructure::window::WindowedStore;

// Configuration and retry
pub use infrastructure::config::{ConfigError, PipelineConfig};
pub use infrastructure::retry::{RetryConfig, RetryError, RetryPolicy, wait_until_ready};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
