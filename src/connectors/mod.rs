//! Built-in connector implementations.
//!
//! Broker connectors live outside this crate; the in-memory connector is
//! used to drive graphs from tests and embedded applications.

/// In-memory connector: push messages into inbound channels and record what
/// reaches outbound channels.
pub mod in_memory;

pub use in_memory::{IN_MEMORY, InMemoryConnector, InMemorySink, InMemorySource, Received};
