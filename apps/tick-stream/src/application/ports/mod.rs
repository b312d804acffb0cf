//! Port Interfaces
//!
//! Contracts between the pipeline services and their infrastructure adapters.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TickPublisher`: append a tick to the message log
//! - `TickSubscription`: read one consumer group's position in the log
//! - `TickStore`: durable, append-only tick table
//!
//! ## Driver Ports (Inbound)
//!
//! - `TickHandler`: what a consumer group does with each tick

use async_trait::async_trait;

use crate::domain::market::{Tick, TickDecodeError};

// =============================================================================
// Message Log
// =============================================================================

/// Errors from the message log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Underlying file or transport I/O failed.
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tick could not be encoded for the log.
    #[error("tick encoding failed: {0}")]
    Encode(#[from] TickDecodeError),

    /// A stored consumer-group position is unreadable.
    #[error("corrupt offset for consumer group {group}: {reason}")]
    CorruptOffset {
        /// Consumer group name.
        group: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The log was shut down while waiting.
    #[error("log closed")]
    Closed,
}

/// One record read from the log.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Byte position of the record.
    pub offset: u64,
    /// Position just past the record; committing it acknowledges the record.
    pub next_offset: u64,
    /// Raw record payload (one JSON tick).
    pub payload: String,
}

impl LogRecord {
    /// Decode and validate the payload as a tick.
    ///
    /// # Errors
    ///
    /// Returns `TickDecodeError` for malformed payloads.
    pub fn decode(&self) -> Result<Tick, TickDecodeError> {
        Tick::from_json(self.payload.as_bytes())
    }
}

/// Producer side of the message log.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TickPublisher: Send + Sync {
    /// Append a tick and wait until it is durable.
    async fn publish(&self, tick: &Tick) -> Result<(), LogError>;
}

/// One consumer group's cursor over the log.
///
/// Records are delivered in log order. A record stays unacknowledged until
/// `commit` is called with its `next_offset`; a restarted group resumes from
/// the last committed position, so uncommitted records are redelivered.
#[async_trait]
pub trait TickSubscription: Send {
    /// Consumer group name.
    fn group(&self) -> &str;

    /// Wait for the next record.
    async fn next(&mut self) -> Result<LogRecord, LogError>;

    /// Acknowledge every record before `next_offset`.
    async fn commit(&mut self, next_offset: u64) -> Result<(), LogError>;
}

// =============================================================================
// Tick Store
// =============================================================================

/// Errors from the durable tick store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not open or reach the store.
    #[error("store connection error: {0}")]
    Connection(String),

    /// A statement failed.
    #[error("store query error: {0}")]
    Query(String),

    /// Tick timestamp cannot be represented.
    #[error("tick timestamp out of range: {0}")]
    Timestamp(f64),
}

/// A persisted tick row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTick {
    /// Auto-incrementing row id.
    pub id: i64,
    /// The tick as stored.
    pub tick: Tick,
}

/// Durable, append-only tick table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TickStore: Send + Sync {
    /// Create the table if it does not exist. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Append one tick as a new row.
    async fn insert(&self, tick: &Tick) -> Result<i64, StoreError>;

    /// Number of rows for a symbol.
    async fn count_for(&self, symbol: &str) -> Result<u64, StoreError>;

    /// Most recent rows for a symbol, newest first.
    async fn recent(&self, symbol: &str, limit: u32) -> Result<Vec<StoredTick>, StoreError>;
}

// =============================================================================
// Tick Handler
// =============================================================================

/// Errors a tick handler can raise. Any error stops the consumer without
/// acknowledging the record.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Durable write failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Cache write failed.
    #[error("cache write failed: {0}")]
    Cache(String),
}

/// Per-tick work done by one consumer group.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TickHandler: Send + Sync {
    /// Handle one validated tick.
    async fn handle(&self, tick: &Tick) -> Result<(), HandlerError>;
}
