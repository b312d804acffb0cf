//! Domain Layer - Core tick types and pricing logic.
//!
//! This layer contains the tick data model, the static instrument catalog,
//! the synthetic price model and subscription parsing. Nothing here performs
//! I/O; everything is plain Rust with serialization support.

/// Instrument catalog and per-instrument price-model parameters.
pub mod instrument;

/// Tick and window-entry types shared by every pipeline stage.
pub mod market;

/// Random-walk price model with mean reversion and band clamping.
pub mod pricing;

/// Subscription parsing and matching for live connections.
pub mod subscription;
