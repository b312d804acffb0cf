//! Pipeline services: the tick generator, the consumer-group loop with its
//! two handlers, and shared component status.

pub mod consumer;
pub mod generator;
pub mod status;

pub use consumer::{CacheConsumer, ConsumerError, StorageConsumer, run_consumer};
pub use generator::TickGenerator;
pub use status::{ComponentPhase, ComponentSnapshot, ComponentState, PipelineStatus};
