//! Windowed Tick Cache
//!
//! Per-symbol sliding window of recent ticks, ordered by millisecond
//! timestamp. Written by the cache consumer, read by the query handlers.
//!
//! Members are keyed by `(timestamp_ms, serialized entry)`, so two ticks with
//! byte-identical content collapse into one member. Entries older than the
//! window are pruned lazily, only when the same symbol is written again.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::Utc;

use crate::domain::market::{Tick, TickDecodeError, WindowEntry};

/// Default lookback kept per symbol.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

type Series = BTreeMap<(i64, String), WindowEntry>;

/// In-process sliding-window store.
#[derive(Debug)]
pub struct WindowedStore {
    window_ms: i64,
    series: parking_lot::RwLock<HashMap<String, Series>>,
}

impl WindowedStore {
    /// Create a store keeping `window` of history per symbol.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            series: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Configured window in milliseconds.
    #[must_use]
    pub const fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Insert a tick under `symbol`, then prune that symbol's stale entries.
    ///
    /// Returns `false` when an identical entry was already present.
    ///
    /// # Errors
    ///
    /// Returns `TickDecodeError` if the entry cannot be serialized.
    pub fn put(&self, symbol: &str, tick: &Tick) -> Result<bool, TickDecodeError> {
        self.put_at(symbol, tick, Utc::now().timestamp_millis())
    }

    /// `put` with an explicit current time.
    ///
    /// # Errors
    ///
    /// Returns `TickDecodeError` if the entry cannot be serialized.
    pub fn put_at(&self, symbol: &str, tick: &Tick, now_ms: i64) -> Result<bool, TickDecodeError> {
        let entry = WindowEntry::from(tick);
        let member = serde_json::to_string(&entry)?;
        let score = entry.timestamp_ms;

        let mut series = self.series.write();
        let entries = series.entry(symbol.to_string()).or_default();
        let inserted = entries.insert((score, member), entry).is_none();

        let threshold = now_ms.saturating_sub(self.window_ms);
        let kept = entries.split_off(&(threshold, String::new()));
        let pruned = entries.len();
        *entries = kept;

        if pruned > 0 {
            tracing::debug!(symbol, pruned, threshold, "Pruned stale window entries");
        }
        Ok(inserted)
    }

    /// Entries for `symbol` with `since_ms <= timestamp_ms <= until_ms`,
    /// ascending by timestamp.
    #[must_use]
    pub fn range(&self, symbol: &str, since_ms: i64, until_ms: i64) -> Vec<WindowEntry> {
        if since_ms > until_ms {
            return Vec::new();
        }
        let series = self.series.read();
        series.get(symbol).map_or_else(Vec::new, |entries| {
            entries
                .range((since_ms, String::new())..)
                .take_while(|((score, _), _)| *score <= until_ms)
                .map(|(_, entry)| entry.clone())
                .collect()
        })
    }

    /// Entry with the greatest timestamp for `symbol`.
    #[must_use]
    pub fn latest(&self, symbol: &str) -> Option<WindowEntry> {
        self.series
            .read()
            .get(symbol)
            .and_then(|entries| entries.last_key_value().map(|(_, entry)| entry.clone()))
    }

    /// Number of entries held for `symbol`.
    #[must_use]
    pub fn len(&self, symbol: &str) -> usize {
        self.series.read().get(symbol).map_or(0, BTreeMap::len)
    }

    /// True when no symbol has any entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.read().values().all(BTreeMap::is_empty)
    }

    /// Symbols with at least one entry, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .series
            .read()
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort_unstable();
        symbols
    }
}

impl Default for WindowedStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const HOUR_MS: i64 = 60 * 60 * 1000;
    const NOW_MS: i64 = 1_700_000_000_000;

    #[allow(clippy::cast_precision_loss)]
    fn tick_at(symbol: &str, price: f64, ts_ms: i64) -> Tick {
        Tick::new(symbol, price, 1000, ts_ms as f64 / 1000.0)
    }

    #[test]
    fn identical_ticks_are_stored_once() {
        let store = WindowedStore::default();
        let tick = tick_at("AAPL", 190.50, NOW_MS);

        assert!(store.put_at("AAPL", &tick, NOW_MS).unwrap());
        assert!(!store.put_at("AAPL", &tick.clone(), NOW_MS).unwrap());
        assert_eq!(store.len("AAPL"), 1);
    }

    #[test]
    fn same_timestamp_different_price_both_kept() {
        let store = WindowedStore::default();
        store.put_at("AAPL", &tick_at("AAPL", 190.50, NOW_MS), NOW_MS).unwrap();
        store.put_at("AAPL", &tick_at("AAPL", 190.51, NOW_MS), NOW_MS).unwrap();
        assert_eq!(store.len("AAPL"), 2);
    }

    #[test]
    fn latest_returns_highest_timestamp() {
        let store = WindowedStore::default();
        let (t1, t2, t3) = (NOW_MS - 3000, NOW_MS - 2000, NOW_MS - 1000);
        // Inserted out of order on purpose.
        store.put_at("AAPL", &tick_at("AAPL", 190.3, t3), NOW_MS).unwrap();
        store.put_at("AAPL", &tick_at("AAPL", 190.1, t1), NOW_MS).unwrap();
        store.put_at("AAPL", &tick_at("AAPL", 190.2, t2), NOW_MS).unwrap();

        let latest = store.latest("AAPL").unwrap();
        assert_eq!(latest.timestamp_ms, t3);
        assert!((latest.price - 190.3).abs() < f64::EPSILON);
        assert!(store.latest("MSFT").is_none());
    }

    #[test]
    fn range_is_inclusive_and_ascending() {
        let store = WindowedStore::default();
        for offset in [5, 1, 3, 2, 4] {
            let ts = NOW_MS - offset * 1000;
            store.put_at("AAPL", &tick_at("AAPL", 190.0, ts), NOW_MS).unwrap();
        }

        let entries = store.range("AAPL", NOW_MS - 4000, NOW_MS - 2000);
        let stamps: Vec<i64> = entries.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(stamps, vec![NOW_MS - 4000, NOW_MS - 3000, NOW_MS - 2000]);

        assert!(store.range("AAPL", NOW_MS, NOW_MS - 1).is_empty());
        assert!(store.range("GOOG", 0, NOW_MS).is_empty());
    }

    #[test]
    fn write_prunes_only_that_symbol() {
        let store = WindowedStore::new(Duration::from_secs(3600));
        let old = NOW_MS - 2 * HOUR_MS;
        store.put_at("AAPL", &tick_at("AAPL", 190.0, old), old).unwrap();
        store.put_at("MSFT", &tick_at("MSFT", 420.0, old), old).unwrap();

        store.put_at("AAPL", &tick_at("AAPL", 191.0, NOW_MS), NOW_MS).unwrap();

        assert_eq!(store.len("AAPL"), 1);
        assert_eq!(store.latest("AAPL").unwrap().timestamp_ms, NOW_MS);
        // No write to MSFT yet, so its stale entry survives.
        assert_eq!(store.len("MSFT"), 1);
        assert_eq!(store.symbols(), vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn entry_on_window_boundary_is_kept() {
        let store = WindowedStore::new(Duration::from_secs(3600));
        let boundary = NOW_MS - HOUR_MS;
        store.put_at("AAPL", &tick_at("AAPL", 190.0, boundary), NOW_MS).unwrap();
        store.put_at("AAPL", &tick_at("AAPL", 190.0, boundary - 1), NOW_MS).unwrap();

        let entries = store.range("AAPL", 0, NOW_MS);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp_ms, boundary);
    }

    #[test]
    fn empty_store() {
        let store = WindowedStore::default();
        assert!(store.is_empty());
        assert!(store.symbols().is_empty());
        assert_eq!(store.window_ms(), 24 * HOUR_MS);
    }

    proptest! {
        #[test]
        fn range_never_escapes_bounds(
            offsets in prop::collection::vec(0i64..100_000, 1..60),
            a in 0i64..100_000,
            b in 0i64..100_000,
        ) {
            let store = WindowedStore::default();
            for offset in &offsets {
                let ts = NOW_MS - offset;
                store.put_at("AAPL", &tick_at("AAPL", 190.0, ts), NOW_MS).unwrap();
            }
            let (since, until) = (NOW_MS - a.max(b), NOW_MS - a.min(b));
            let entries = store.range("AAPL", since, until);

            for entry in &entries {
                prop_assert!(entry.timestamp_ms >= since && entry.timestamp_ms <= until);
            }
            for pair in entries.windows(2) {
                prop_assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
            }
        }
    }
}
