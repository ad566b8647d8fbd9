//! # MessageWeave
//!
//! Reactive messaging mediation in pure Rust.
//!
//! MessageWeave wires application handlers ("mediators") to named channels and
//! turns them into one running stream graph. Each mediator declares the channel
//! it consumes from, the channel it produces to, and the shape of its handler;
//! the engine works out how to invoke it, connects every channel end to end,
//! and bridges channels to external systems through connectors.
//!
//! ## Key Features
//!
//! - **Shape-driven**: a handler's declared signature selects how it is driven
//!   (one item at a time, whole streams, async completions, raw messages)
//! - **Validated up front**: incomplete, ambiguous or cyclic channel wiring is
//!   rejected before anything runs
//! - **Acknowledged**: every message carries an acknowledgement that is settled
//!   exactly once, propagated through processors and split across fan-out
//! - **Back-pressured**: bounded channels everywhere, emitters included
//! - **Pluggable**: connectors and payload converters are registered by the
//!   application
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use messageweave::graph_builder::{GraphBuilder, MediatorDefinition};
//! use messageweave::handler::Handler;
//!
//! # async fn run() -> Result<(), messageweave::error::WeaveError> {
//! let graph = GraphBuilder::new("greetings")
//!   .emitter::<String>("names")
//!   .mediator(
//!     MediatorDefinition::new("greeter", "greet", Handler::function(|n: String| format!("hello {n}")))
//!       .incoming("names")
//!       .outgoing("greetings"),
//!   )
//!   .mediator(
//!     MediatorDefinition::new("printer", "print", Handler::consumer(|g: String| println!("{g}")))
//!       .incoming("greetings"),
//!   )
//!   .build()?;
//!
//! let running = graph.start().await?;
//! if let Some(names) = running.emitter::<String>("names") {
//!   let _ = names.send("world".to_string()).await;
//! }
//! running.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Message acknowledgement and settlement tracking.
pub mod acknowledgement;
/// Channel hubs: per-channel merge and fan-out.
pub mod channel;
/// Connector and engine configuration.
pub mod config;
/// The connector contract.
pub mod connector;
/// Built-in connectors.
pub mod connectors;
/// Payload converters.
pub mod converter;
/// Mediator identity, bindings and node kind selection.
pub mod descriptor;
/// Imperative emitters feeding channels.
pub mod emitter;
/// Error types.
pub mod error;
/// Validated graphs.
pub mod graph;
/// Fluent graph construction.
pub mod graph_builder;
/// Handler closures and their declared signatures.
pub mod handler;
/// Per-mediator dispatch.
pub mod invoker;
/// Starting and stopping graphs.
pub mod lifecycle;
/// Messages, payloads and metadata.
pub mod message;
/// Channel registry and wiring validation.
pub mod registry;
/// Signature analysis.
pub mod signature;
/// Type references used in signatures.
pub mod types;

pub use acknowledgement::{Acknowledgement, Settlement, SettlementHandle};
pub use config::{ChannelConfig, EngineConfig, MessagingConfig};
pub use connector::Connector;
pub use descriptor::{Bindings, MediatorDescriptor, MediatorId, NodeKind};
pub use emitter::Emitter;
pub use error::{ConfigurationError, InvocationError, SignatureError, WeaveError};
pub use graph::Graph;
pub use graph_builder::{GraphBuilder, MediatorDefinition};
pub use handler::Handler;
pub use lifecycle::{NodeEvent, RunningGraph, ShutdownReport};
pub use message::{Message, MessageMetadata, Payload};
pub use signature::MethodSignature;
pub use types::{Container, TypeRef, TypeTag};

#[cfg(test)]
mod acknowledgement_test;
#[cfg(test)]
mod config_test;
#[cfg(test)]
mod descriptor_test;
#[cfg(test)]
mod graph_builder_test;
