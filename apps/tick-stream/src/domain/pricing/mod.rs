//! Synthetic Price Model
//!
//! Each instrument follows a Gaussian random walk with mild mean reversion
//! toward its base price, clamped to a fixed deviation band:
//!
//! ```text
//! p += N(0, volatility)
//! p += (base - p) * 0.002
//! p  = clamp(p, base - band, base + band)
//! ```
//!
//! The unrounded price is carried into the next step; only the emitted tick
//! is rounded to cents. Noise comes from a `NoiseSource` so a fixed draw
//! sequence yields a fixed trajectory.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::instrument::{InstrumentConfig, SymbolRegistry};
use super::market::Tick;

/// Pull toward the base price applied on every step.
pub const MEAN_REVERSION_STRENGTH: f64 = 0.002;

// =============================================================================
// Noise
// =============================================================================

/// Source of Gaussian draws for the price model.
pub trait NoiseSource: Send {
    /// Draw from `N(mean, std_dev)`.
    fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64;
}

/// Seedable Gaussian noise backed by ChaCha8.
#[derive(Debug, Clone)]
pub struct SeededNoise {
    rng: ChaCha8Rng,
}

impl SeededNoise {
    /// Deterministic noise from a seed.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Noise seeded from the operating system.
    #[must_use]
    pub fn from_os_rng() -> Self {
        Self {
            rng: ChaCha8Rng::from_os_rng(),
        }
    }
}

impl NoiseSource for SeededNoise {
    /// Box-Muller transform over two uniform draws.
    fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        // 1 - u keeps the log argument in (0, 1].
        let u1 = 1.0 - self.rng.random::<f64>();
        let u2: f64 = self.rng.random();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        mean + std_dev * z
    }
}

// =============================================================================
// Step Functions
// =============================================================================

/// Advance one price step given a noise draw already in price units.
#[must_use]
pub fn next_price(instrument: &InstrumentConfig, current: f64, step: f64) -> f64 {
    let mut price = current + step;
    price += (instrument.base_price - price) * MEAN_REVERSION_STRENGTH;
    price.clamp(instrument.price_floor(), instrument.price_ceiling())
}

/// Turn a raw volume draw into a traded volume (at least 1).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn volume_from_draw(draw: f64) -> u64 {
    let rounded = draw.round();
    if rounded.is_finite() && rounded >= 1.0 {
        rounded as u64
    } else {
        1
    }
}

/// Round a price to cents for emission.
#[must_use]
pub fn round_to_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

// =============================================================================
// Price State
// =============================================================================

/// Current unrounded price per instrument, aligned with the registry order.
#[derive(Debug, Clone)]
pub struct PriceState {
    prices: Vec<f64>,
}

impl PriceState {
    /// Start every instrument at its base price.
    #[must_use]
    pub fn at_base(registry: &SymbolRegistry) -> Self {
        Self {
            prices: registry.instruments().iter().map(|i| i.base_price).collect(),
        }
    }

    /// Current price of the instrument at `index`.
    #[must_use]
    pub fn price(&self, index: usize) -> Option<f64> {
        self.prices.get(index).copied()
    }
}

// =============================================================================
// Synthetic Market
// =============================================================================

/// Owns the price state and produces one tick per instrument per step.
pub struct SyntheticMarket<N> {
    registry: SymbolRegistry,
    state: PriceState,
    noise: N,
}

impl<N: NoiseSource> SyntheticMarket<N> {
    /// Create a market with every instrument at its base price.
    #[must_use]
    pub fn new(registry: SymbolRegistry, noise: N) -> Self {
        let state = PriceState::at_base(&registry);
        Self {
            registry,
            state,
            noise,
        }
    }

    /// Produce one tick for every instrument, all stamped with `timestamp`.
    ///
    /// Work is linear in the number of instruments.
    pub fn step(&mut self, timestamp: f64) -> Vec<Tick> {
        let mut ticks = Vec::with_capacity(self.registry.len());

        for (index, instrument) in self.registry.instruments().iter().enumerate() {
            let current = self.state.prices[index];
            let step = self.noise.gaussian(0.0, instrument.tick_volatility());
            let price = next_price(instrument, current, step);
            self.state.prices[index] = price;

            let volume_draw = self.noise.gaussian(
                f64::from(instrument.mean_volume),
                f64::from(instrument.volume_jitter),
            );

            ticks.push(Tick::new(
                instrument.symbol,
                round_to_cents(price),
                volume_from_draw(volume_draw),
                timestamp,
            ));
        }

        ticks
    }

    /// Current price state.
    #[must_use]
    pub const fn state(&self) -> &PriceState {
        &self.state
    }

    /// The registry this market draws instruments from.
    #[must_use]
    pub const fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }
}

// =============================================================================
// Tests
// =============================================================================
