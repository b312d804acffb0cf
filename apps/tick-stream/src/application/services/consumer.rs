//! Consumer-group loop and the two tick handlers.
//!
//! `run_consumer` reads one group's records in log order, hands each decoded
//! tick to a `TickHandler`, and commits the record only after the handler
//! succeeds. Malformed records are skipped and committed. A handler error
//! stops the loop with the record left uncommitted, so it is delivered again
//! after a restart.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    HandlerError, LogError, TickHandler, TickStore, TickSubscription,
};
use crate::application::services::status::{ComponentPhase, ComponentState};
use crate::domain::market::Tick;
use crate::infrastructure::broadcast::SharedBroadcaster;
use crate::infrastructure::metrics;
use crate::infrastructure::window::WindowedStore;

/// Why a consumer loop stopped early.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// Reading or committing failed.
    #[error("consumer group {group}: {source}")]
    Log {
        /// Consumer group name.
        group: String,
        /// Underlying log error.
        #[source]
        source: LogError,
    },

    /// The handler rejected a tick.
    #[error("consumer group {group} handler failed at offset {offset}: {source}")]
    Handler {
        /// Consumer group name.
        group: String,
        /// Offset of the unacknowledged record.
        offset: u64,
        /// Underlying handler error.
        #[source]
        source: HandlerError,
    },
}

/// Consume records until cancelled or until an error occurs.
///
/// Cancellation is checked between records; a record already being handled
/// is finished and committed first.
///
/// # Errors
///
/// Returns `ConsumerError` on a log or handler failure. `state` is marked
/// failed in that case.
pub async fn run_consumer<S, H>(
    subscription: &mut S,
    handler: &H,
    state: &ComponentState,
    cancel: &CancellationToken,
) -> Result<(), ConsumerError>
where
    S: TickSubscription + ?Sized,
    H: TickHandler + ?Sized,
{
    let group = subscription.group().to_string();
    state.set_phase(ComponentPhase::Running);
    tracing::info!(group = %group, "Consumer started");

    let result = consume(subscription, handler, state, cancel, &group).await;

    match &result {
        Ok(()) => {
            state.set_phase(ComponentPhase::Stopped);
            tracing::info!(group = %group, "Consumer stopped");
        }
        Err(e) => {
            state.set_failed(e.to_string());
            tracing::error!(group = %group, error = %e, "Consumer failed");
        }
    }
    result
}

async fn consume<S, H>(
    subscription: &mut S,
    handler: &H,
    state: &ComponentState,
    cancel: &CancellationToken,
    group: &str,
) -> Result<(), ConsumerError>
where
    S: TickSubscription + ?Sized,
    H: TickHandler + ?Sized,
{
    let log_err = |source: LogError| ConsumerError::Log {
        group: group.to_string(),
        source,
    };

    loop {
        let record = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            record = subscription.next() => record.map_err(log_err)?,
        };

        match record.decode() {
            Ok(tick) => {
                handler
                    .handle(&tick)
                    .await
                    .map_err(|source| ConsumerError::Handler {
                        group: group.to_string(),
                        offset: record.offset,
                        source,
                    })?;
                metrics::record_consumed(group);
                state.increment_processed();
            }
            Err(e) => {
                metrics::record_malformed(group);
                tracing::warn!(
                    group,
                    offset = record.offset,
                    error = %e,
                    "Skipping malformed record"
                );
            }
        }

        subscription
            .commit(record.next_offset)
            .await
            .map_err(log_err)?;
    }
}

// =============================================================================
// Storage Consumer
// =============================================================================

/// Appends every tick to the durable store.
pub struct StorageConsumer {
    store: Arc<dyn TickStore>,
}

impl StorageConsumer {
    /// Create a handler writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TickStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TickHandler for StorageConsumer {
    async fn handle(&self, tick: &Tick) -> Result<(), HandlerError> {
        let id = self.store.insert(tick).await?;
        metrics::record_tick_stored();
        tracing::debug!(symbol = %tick.symbol, id, "Tick stored");
        Ok(())
    }
}

// =============================================================================
// Cache Consumer
// =============================================================================

/// Writes each tick to the windowed cache, then fans it out to live clients.
pub struct CacheConsumer {
    window: Arc<WindowedStore>,
    broadcaster: SharedBroadcaster,
}

impl CacheConsumer {
    /// Create a handler feeding `window` and `broadcaster`.
    #[must_use]
    pub fn new(window: Arc<WindowedStore>, broadcaster: SharedBroadcaster) -> Self {
        Self {
            window,
            broadcaster,
        }
    }
}

#[async_trait]
impl TickHandler for CacheConsumer {
    async fn handle(&self, tick: &Tick) -> Result<(), HandlerError> {
        self.window
            .put(&tick.symbol, tick)
            .map_err(|e| HandlerError::Cache(e.to_string()))?;
        metrics::record_cache_write();

        let report = self
            .broadcaster
            .publish(tick)
            .map_err(|e| HandlerError::Cache(e.to_string()))?;
        tracing::debug!(
            symbol = %tick.symbol,
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Tick cached and broadcast"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::application::ports::{LogRecord, MockTickHandler, MockTickStore, StoreError};
    use crate::domain::subscription::Subscription;
    use crate::infrastructure::broadcast::Broadcaster;

    /// In-memory subscription that idles once its records run out.
    struct ScriptedSubscription {
        records: VecDeque<LogRecord>,
        commits: Vec<u64>,
    }

    impl ScriptedSubscription {
        fn new(payloads: &[&str]) -> Self {
            let mut offset = 0;
            let records = payloads
                .iter()
                .map(|payload| {
                    let next_offset = offset + payload.len() as u64 + 1;
                    let record = LogRecord {
                        offset,
                        next_offset,
                        payload: (*payload).to_string(),
                    };
                    offset = next_offset;
                    record
                })
                .collect();
            Self {
                records,
                commits: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl TickSubscription for ScriptedSubscription {
        fn group(&self) -> &str {
            "test-group"
        }

        async fn next(&mut self) -> Result<LogRecord, LogError> {
            match self.records.pop_front() {
                Some(record) => Ok(record),
                None => std::future::pending().await,
            }
        }

        async fn commit(&mut self, next_offset: u64) -> Result<(), LogError> {
            self.commits.push(next_offset);
            Ok(())
        }
    }

    const AAPL: &str = r#"{"symbol":"AAPL","price":191.23,"volume":1040,"timestamp":1700000000.5}"#;
    const MSFT: &str = r#"{"symbol":"MSFT","price":420.1,"volume":800,"timestamp":1700000000.5}"#;

    async fn drain<H: TickHandler>(
        subscription: &mut ScriptedSubscription,
        handler: &H,
        state: &ComponentState,
    ) -> Result<(), ConsumerError> {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        run_consumer(subscription, handler, state, &cancel).await
    }

    #[tokio::test]
    async fn handles_in_order_and_commits_after_each() {
        let mut handler = MockTickHandler::new();
        let mut seq = mockall::Sequence::new();
        handler
            .expect_handle()
            .withf(|tick| tick.symbol == "AAPL")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        handler
            .expect_handle()
            .withf(|tick| tick.symbol == "MSFT")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut subscription = ScriptedSubscription::new(&[AAPL, MSFT]);
        let state = ComponentState::new("cache_consumer");
        drain(&mut subscription, &handler, &state).await.unwrap();

        let first = AAPL.len() as u64 + 1;
        assert_eq!(subscription.commits, vec![first, first + MSFT.len() as u64 + 1]);
        assert_eq!(state.processed(), 2);
        assert_eq!(state.phase(), ComponentPhase::Stopped);
    }

    #[tokio::test]
    async fn malformed_records_are_skipped_and_committed() {
        let mut handler = MockTickHandler::new();
        handler.expect_handle().times(1).returning(|_| Ok(()));

        let bad_price = r#"{"symbol":"AAPL","price":-1.0,"volume":10,"timestamp":1.0}"#;
        let mut subscription = ScriptedSubscription::new(&["{oops", bad_price, AAPL]);
        let state = ComponentState::new("storage_consumer");
        drain(&mut subscription, &handler, &state).await.unwrap();

        assert_eq!(subscription.commits.len(), 3);
        assert_eq!(state.processed(), 1);
    }

    #[tokio::test]
    async fn handler_failure_stops_without_commit() {
        let mut handler = MockTickHandler::new();
        handler
            .expect_handle()
            .times(1)
            .returning(|_| Err(HandlerError::Store(StoreError::Query("disk I/O error".into()))));

        let mut subscription = ScriptedSubscription::new(&[AAPL, MSFT]);
        let state = ComponentState::new("storage_consumer");
        let err = drain(&mut subscription, &handler, &state).await.unwrap_err();

        assert!(matches!(err, ConsumerError::Handler { offset: 0, .. }));
        assert!(subscription.commits.is_empty());
        assert_eq!(state.phase(), ComponentPhase::Failed);
    }

    #[tokio::test]
    async fn storage_consumer_inserts_each_tick() {
        let mut store = MockTickStore::new();
        store
            .expect_insert()
            .withf(|tick| tick.symbol == "AAPL" && tick.volume == 1040)
            .times(1)
            .returning(|_| Ok(7));

        let consumer = StorageConsumer::new(Arc::new(store));
        let tick = Tick::from_json(AAPL.as_bytes()).unwrap();
        consumer.handle(&tick).await.unwrap();
    }

    #[tokio::test]
    async fn cache_consumer_writes_window_then_broadcasts() {
        let window = Arc::new(WindowedStore::new(Duration::from_secs(100 * 365 * 24 * 3600)));
        let broadcaster = Arc::new(Broadcaster::default());
        let (_, mut aapl_rx) = broadcaster.registry().register(Subscription::single("AAPL"));
        let (_, mut msft_rx) = broadcaster.registry().register(Subscription::single("MSFT"));

        let consumer = CacheConsumer::new(Arc::clone(&window), Arc::clone(&broadcaster));
        let tick = Tick::from_json(AAPL.as_bytes()).unwrap();
        consumer.handle(&tick).await.unwrap();

        assert_eq!(window.len("AAPL"), 1);
        assert_eq!(window.latest("AAPL").unwrap().timestamp_ms, 1_700_000_000_500);
        assert_eq!(&*aapl_rx.try_recv().unwrap(), AAPL);
        assert!(msft_rx.try_recv().is_err());
    }
}
