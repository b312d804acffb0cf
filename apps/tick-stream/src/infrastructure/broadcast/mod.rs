//! Live Tick Fan-out
//!
//! Process-local registry of live connections and the broadcaster that pushes
//! each tick to the connections subscribed to its symbol.
//!
//! # Architecture
//!
//! Every registered connection gets a bounded `mpsc` channel; the gateway task
//! owning the socket drains the receiving half. `publish` serializes a tick
//! once and `try_send`s the shared frame to each matching connection, so one
//! slow client can never stall the pass. A full or closed channel marks the
//! connection dead; dead connections are removed after the pass completes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::domain::market::{Tick, TickDecodeError};
use crate::domain::subscription::Subscription;
use crate::infrastructure::metrics::{self, DropReason};

/// One serialized tick, shared by every connection it is sent to.
pub type Frame = Arc<str>;

/// Default per-connection outbound buffer.
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

// =============================================================================
// Connection Registry
// =============================================================================

/// Identifier of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug)]
struct Registration {
    subscription: Subscription,
    tx: mpsc::Sender<Frame>,
}

/// Live connections and their subscriptions.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: parking_lot::RwLock<HashMap<ConnectionId, Registration>>,
    buffer: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry; each connection buffers up to `buffer` frames.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: parking_lot::RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a connection and return its id and frame receiver.
    pub fn register(&self, subscription: Subscription) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = ConnectionId::generate();
        let live = {
            let mut connections = self.connections.write();
            connections.insert(id, Registration { subscription, tx });
            connections.len()
        };
        metrics::set_live_connections(live);
        (id, rx)
    }

    /// Remove a connection. Returns `false` if it was not registered.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let (removed, live) = {
            let mut connections = self.connections.write();
            let removed = connections.remove(&id).is_some();
            (removed, connections.len())
        };
        if removed {
            metrics::set_live_connections(live);
        }
        removed
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// True when no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Subscription of a registered connection.
    #[must_use]
    pub fn subscription_of(&self, id: ConnectionId) -> Option<Subscription> {
        self.connections
            .read()
            .get(&id)
            .map(|registration| registration.subscription.clone())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_BUFFER)
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Why a frame could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The connection's task has gone away.
    #[error("connection closed")]
    Closed,
    /// The connection's outbound buffer is full.
    #[error("connection lagging")]
    Lagging,
}

impl From<DeliveryError> for DropReason {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Closed => Self::Closed,
            DeliveryError::Lagging => Self::Lagging,
        }
    }
}

/// Outcome of one `publish` pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections whose subscription matched the tick.
    pub matched: usize,
    /// Frames queued successfully.
    pub delivered: usize,
    /// Connections removed because delivery failed.
    pub dropped: Vec<ConnectionId>,
}

fn deliver(tx: &mpsc::Sender<Frame>, frame: &Frame) -> Result<(), DeliveryError> {
    tx.try_send(Arc::clone(frame)).map_err(|err| match err {
        TrySendError::Full(_) => DeliveryError::Lagging,
        TrySendError::Closed(_) => DeliveryError::Closed,
    })
}

/// Fans ticks out to live connections.
#[derive(Debug, Default)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
}

/// Broadcaster shared between the gateway and the cache consumer.
pub type SharedBroadcaster = Arc<Broadcaster>;

impl Broadcaster {
    /// Create a broadcaster with the given per-connection buffer.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: ConnectionRegistry::new(buffer),
        }
    }

    /// The connection registry.
    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Push `tick` to every connection subscribed to its symbol.
    ///
    /// # Errors
    ///
    /// Returns `TickDecodeError` if the tick cannot be serialized; no
    /// connection is touched in that case.
    pub fn publish(&self, tick: &Tick) -> Result<PublishReport, TickDecodeError> {
        let frame: Frame = Arc::from(tick.to_json()?);
        let mut report = PublishReport::default();
        let mut failed = Vec::new();

        {
            let connections = self.registry.connections.read();
            for (id, registration) in connections.iter() {
                if !registration.subscription.matches(&tick.symbol) {
                    continue;
                }
                report.matched += 1;
                match deliver(&registration.tx, &frame) {
                    Ok(()) => report.delivered += 1,
                    Err(err) => failed.push((*id, err)),
                }
            }
        }

        for (id, err) in failed {
            if self.registry.deregister(id) {
                tracing::info!(connection = %id, reason = %err, "Dropping live connection");
                metrics::record_connection_dropped(err.into());
                report.dropped.push(id);
            }
        }

        if report.delivered > 0 {
            let delivered = u64::try_from(report.delivered).unwrap_or(u64::MAX);
            metrics::record_broadcast_deliveries(delivered);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str) -> Tick {
        Tick::new(symbol, 191.23, 1040, 1_700_000_000.5)
    }

    fn subscribe(broadcaster: &Broadcaster, csv: &str) -> (ConnectionId, mpsc::Receiver<Frame>) {
        broadcaster
            .registry()
            .register(Subscription::from_csv(csv).unwrap())
    }

    #[test]
    fn register_and_deregister() {
        let registry = ConnectionRegistry::default();
        let (id, _rx) = registry.register(Subscription::single("aapl"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.subscription_of(id), Some(Subscription::single("AAPL")));

        assert!(registry.deregister(id));
        assert!(!registry.deregister(id));
        assert!(registry.is_empty());
        assert!(registry.subscription_of(id).is_none());
    }

    #[test]
    fn delivers_only_to_matching_subscriptions() {
        let broadcaster = Broadcaster::default();
        let (_, mut aapl) = subscribe(&broadcaster, "AAPL");
        let (_, mut msft) = subscribe(&broadcaster, "MSFT");
        let (_, mut both) = subscribe(&broadcaster, "MSFT,AAPL");
        let (_, mut all) = subscribe(&broadcaster, "*");

        let report = broadcaster.publish(&tick("AAPL")).unwrap();
        assert_eq!(report.matched, 3);
        assert_eq!(report.delivered, 3);
        assert!(report.dropped.is_empty());

        let expected = r#"{"symbol":"AAPL","price":191.23,"volume":1040,"timestamp":1700000000.5}"#;
        assert_eq!(&*aapl.try_recv().unwrap(), expected);
        assert_eq!(&*both.try_recv().unwrap(), expected);
        assert_eq!(&*all.try_recv().unwrap(), expected);
        assert!(msft.try_recv().is_err());
    }

    #[test]
    fn closed_connection_removed_before_next_publish() {
        let broadcaster = Broadcaster::default();
        let (gone, rx) = subscribe(&broadcaster, "AAPL");
        let (kept, mut live_rx) = subscribe(&broadcaster, "AAPL");
        drop(rx);

        let report = broadcaster.publish(&tick("AAPL")).unwrap();
        assert_eq!(report.dropped, vec![gone]);
        assert_eq!(report.delivered, 1);
        assert!(broadcaster.registry().subscription_of(gone).is_none());
        assert!(broadcaster.registry().subscription_of(kept).is_some());

        let report = broadcaster.publish(&tick("AAPL")).unwrap();
        assert_eq!(report.matched, 1);
        assert!(report.dropped.is_empty());
        assert_eq!(live_rx.len(), 2);
    }

    #[test]
    fn lagging_connection_is_dropped() {
        let broadcaster = Broadcaster::new(1);
        let (slow, _rx) = subscribe(&broadcaster, "AAPL");

        let first = broadcaster.publish(&tick("AAPL")).unwrap();
        assert_eq!(first.delivered, 1);

        let second = broadcaster.publish(&tick("AAPL")).unwrap();
        assert_eq!(second.dropped, vec![slow]);
        assert!(broadcaster.registry().is_empty());
    }

    #[test]
    fn unmatched_publish_touches_nobody() {
        let broadcaster = Broadcaster::default();
        let (_, rx) = subscribe(&broadcaster, "MSFT");
        drop(rx);

        // Dead but unmatched connections are only discovered by a matching tick.
        let report = broadcaster.publish(&tick("AAPL")).unwrap();
        assert_eq!(report, PublishReport::default());
        assert_eq!(broadcaster.registry().len(), 1);
    }
}
