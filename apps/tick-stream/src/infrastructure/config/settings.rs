//! Pipeline Configuration Settings
//!
//! Every setting has a default; unparseable values fall back to it. Values
//! that parse but make no sense (zero window, zero interval, zero client
//! buffer, zero segment size) are rejected.

use std::path::PathBuf;
use std::time::Duration;

use crate::infrastructure::log::DEFAULT_SEGMENT_BYTES;
use crate::infrastructure::retry::RetryConfig;

/// Message log settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Directory holding the log and offset files.
    pub dir: PathBuf,
    /// Topic name.
    pub topic: String,
    /// Interval between checks for appends from other processes.
    pub poll_interval: Duration,
    /// Size at which the active segment is closed and retention runs.
    pub segment_bytes: u64,
    /// Consumer group of the durable storage path.
    pub storage_group: String,
    /// Consumer group of the cache and broadcast path.
    pub cache_group: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/log"),
            topic: "market_ticks".to_string(),
            poll_interval: Duration::from_millis(200),
            segment_bytes: DEFAULT_SEGMENT_BYTES,
            storage_group: "db-writer-group".to_string(),
            cache_group: "backend-tick-group".to_string(),
        }
    }
}

/// Durable store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// SQLite database file.
    pub db_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/ticks.sqlite"),
        }
    }
}

/// Windowed cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Lookback kept per symbol.
    pub window: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Tick generator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSettings {
    /// Time between generation cycles.
    pub interval: Duration,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            seed: None,
        }
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Query and WebSocket gateway port.
    pub http_port: u16,
    /// Health and metrics port.
    pub health_port: u16,
    /// Bound on each wait for an inbound client message.
    pub receive_timeout: Duration,
    /// Outbound frames buffered per live connection.
    pub client_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8000,
            health_port: 8082,
            receive_timeout: Duration::from_secs(30),
            client_buffer: 256,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    /// Message log settings.
    pub log: LogSettings,
    /// Durable store settings.
    pub storage: StorageSettings,
    /// Windowed cache settings.
    pub cache: CacheSettings,
    /// Generator settings.
    pub generator: GeneratorSettings,
    /// Server settings.
    pub server: ServerSettings,
    /// Bootstrap retry policy.
    pub retry: RetryConfig,
}

impl PipelineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for values that parse but cannot be used.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for values that parse but cannot be used.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = Self::default();

        let log = LogSettings {
            dir: env.path("TICKSTREAM_LOG_DIR", defaults.log.dir),
            topic: env.string("TICKSTREAM_TOPIC", defaults.log.topic),
            poll_interval: env.millis("TICKSTREAM_LOG_POLL_MS", defaults.log.poll_interval),
            segment_bytes: env
                .parsed("TICKSTREAM_LOG_SEGMENT_BYTES")
                .unwrap_or(defaults.log.segment_bytes),
            storage_group: env.string("TICKSTREAM_STORAGE_GROUP", defaults.log.storage_group),
            cache_group: env.string("TICKSTREAM_CACHE_GROUP", defaults.log.cache_group),
        };

        let storage = StorageSettings {
            db_path: env.path("TICKSTREAM_DB_PATH", defaults.storage.db_path),
        };

        let cache = CacheSettings {
            window: env
                .parsed::<u64>("TICKSTREAM_WINDOW_HOURS")
                .map_or(defaults.cache.window, |hours| {
                    Duration::from_secs(hours.saturating_mul(3600))
                }),
        };

        let generator = GeneratorSettings {
            interval: env.millis(
                "TICKSTREAM_GENERATION_INTERVAL_MS",
                defaults.generator.interval,
            ),
            seed: env.parsed("TICKSTREAM_SEED"),
        };

        let server = ServerSettings {
            http_port: env
                .parsed("TICKSTREAM_HTTP_PORT")
                .unwrap_or(defaults.server.http_port),
            health_port: env
                .parsed("TICKSTREAM_HEALTH_PORT")
                .unwrap_or(defaults.server.health_port),
            receive_timeout: env
                .parsed("TICKSTREAM_RECEIVE_TIMEOUT_SECS")
                .map_or(defaults.server.receive_timeout, Duration::from_secs),
            client_buffer: env
                .parsed("TICKSTREAM_CLIENT_BUFFER")
                .unwrap_or(defaults.server.client_buffer),
        };

        let retry = RetryConfig {
            initial_delay: env.millis("TICKSTREAM_RETRY_DELAY_MS", defaults.retry.initial_delay),
            max_delay: env.millis("TICKSTREAM_RETRY_MAX_DELAY_MS", defaults.retry.max_delay),
            multiplier: env
                .parsed("TICKSTREAM_RETRY_MULTIPLIER")
                .unwrap_or(defaults.retry.multiplier),
            jitter_factor: defaults.retry.jitter_factor,
            max_attempts: env
                .parsed("TICKSTREAM_RETRY_MAX_ATTEMPTS")
                .unwrap_or(defaults.retry.max_attempts),
        };

        let config = Self {
            log,
            storage,
            cache,
            generator,
            server,
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.window.is_zero() {
            return Err(ConfigError::Invalid {
                key: "TICKSTREAM_WINDOW_HOURS",
                reason: "window must be at least one hour",
            });
        }
        if self.generator.interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "TICKSTREAM_GENERATION_INTERVAL_MS",
                reason: "interval must be positive",
            });
        }
        if self.server.client_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "TICKSTREAM_CLIENT_BUFFER",
                reason: "buffer must hold at least one frame",
            });
        }
        if self.log.segment_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "TICKSTREAM_LOG_SEGMENT_BYTES",
                reason: "segment size must be positive",
            });
        }
        if self.log.storage_group == self.log.cache_group {
            return Err(ConfigError::Invalid {
                key: "TICKSTREAM_CACHE_GROUP",
                reason: "consumer groups must differ",
            });
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                key: "TICKSTREAM_RETRY_MULTIPLIER",
                reason: "multiplier must be at least 1.0",
            });
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value parsed but cannot be used.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.raw(key).and_then(|v| v.parse().ok())
    }

    fn string(&self, key: &str, default: String) -> String {
        self.raw(key).unwrap_or(default)
    }

    fn path(&self, key: &str, default: PathBuf) -> PathBuf {
        self.raw(key).map_or(default, PathBuf::from)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.parsed::<u64>(key).map_or(default, Duration::from_millis)
    }
}
