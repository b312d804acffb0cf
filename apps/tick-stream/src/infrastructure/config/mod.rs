//! Configuration Module
//!
//! Pipeline configuration loaded from environment variables.

mod settings;

pub use settings::{
    CacheSettings, ConfigError, GeneratorSettings, LogSettings, PipelineConfig, ServerSettings,
    StorageSettings,
};
