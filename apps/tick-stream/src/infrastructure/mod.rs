//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the HTTP surfaces
//! and ambient concerns (configuration, retry, metrics, telemetry).

/// File-backed durable message log with consumer groups.
pub mod log;

/// SQLite durable tick table.
pub mod storage;

/// In-process sliding-window tick cache.
pub mod window;

/// Live connection registry and tick fan-out.
pub mod broadcast;

/// HTTP query and WebSocket streaming gateway.
pub mod gateway;

/// Bootstrap retry policy.
pub mod retry;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry setup.
pub mod telemetry;
