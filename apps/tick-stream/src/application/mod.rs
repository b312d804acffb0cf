//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the pipeline services (generator, consumers) and the
//! port interfaces they use to reach the log, the tick store and the live
//! fan-out.

/// Port interfaces for the message log, tick store and tick handlers.
pub mod ports;

/// Generator, consumer loops and component status.
pub mod services;
