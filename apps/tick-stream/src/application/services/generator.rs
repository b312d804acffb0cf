//! Synthetic tick generator.
//!
//! Once per interval, steps every instrument of the market and appends the
//! resulting ticks to the message log, one awaited publish at a time. A
//! publish error abandons the rest of that cycle; the next cycle starts on
//! the next interval tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{LogError, TickPublisher};
use crate::application::services::status::{ComponentPhase, ComponentState};
use crate::domain::market::epoch_seconds;
use crate::domain::pricing::{NoiseSource, SyntheticMarket};
use crate::infrastructure::metrics;

/// Drives a `SyntheticMarket` and publishes its ticks.
pub struct TickGenerator<N> {
    market: SyntheticMarket<N>,
    publisher: Arc<dyn TickPublisher>,
    interval: Duration,
    state: Arc<ComponentState>,
}

impl<N: NoiseSource> TickGenerator<N> {
    /// Create a generator publishing every `interval`.
    #[must_use]
    pub fn new(
        market: SyntheticMarket<N>,
        publisher: Arc<dyn TickPublisher>,
        interval: Duration,
        state: Arc<ComponentState>,
    ) -> Self {
        Self {
            market,
            publisher,
            interval,
            state,
        }
    }

    /// The underlying market.
    #[must_use]
    pub const fn market(&self) -> &SyntheticMarket<N> {
        &self.market
    }

    /// Generate and publish one tick per instrument, all stamped `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns the first publish error; later ticks of the cycle are not sent.
    pub async fn run_cycle(&mut self, timestamp: f64) -> Result<usize, LogError> {
        let ticks = self.market.step(timestamp);
        metrics::record_ticks_generated(ticks.len() as u64);

        for tick in &ticks {
            let started = Instant::now();
            self.publisher.publish(tick).await?;
            metrics::record_tick_published(started.elapsed());
            self.state.increment_processed();
            tracing::debug!(
                symbol = %tick.symbol,
                price = tick.price,
                volume = tick.volume,
                "Tick published"
            );
        }
        Ok(ticks.len())
    }

    /// Run cycles until `cancel` fires. Cancellation is observed between cycles.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.state.set_phase(ComponentPhase::Running);
        tracing::info!(
            instruments = self.market.registry().len(),
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Tick generator started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let timestamp = epoch_seconds(Utc::now());
            match self.run_cycle(timestamp).await {
                Ok(count) => tracing::debug!(count, "Generation cycle complete"),
                Err(e) => {
                    metrics::record_generation_failed();
                    tracing::warn!(error = %e, "Generation cycle failed, retrying next interval");
                }
            }
        }

        self.state.set_phase(ComponentPhase::Stopped);
        tracing::info!("Tick generator stopped");
    }
}
