//! # Graph
//!
//! A validated, not yet running messaging graph: every mediator described and
//! checked against its handler, every channel validated, mediators ordered
//! upstream first. Produced by [`GraphBuilder::build`] and turned into a
//! running graph by [`Graph::start`].
//!
//! The topology is fixed once built. Emitters are wired at build time and can
//! be obtained from the graph before or after it starts.
//!
//! [`GraphBuilder::build`]: crate::graph_builder::GraphBuilder::build
//! [`Graph::start`]: crate::graph::Graph::start

use crate::config::{EngineConfig, MessagingConfig};
use crate::connector::Connector;
use crate::converter::ConverterRegistry;
use crate::descriptor::{MediatorDescriptor, MediatorId};
use crate::emitter::Emitter;
use crate::handler::Handler;
use crate::invoker::Schedule;
use crate::message::Message;
use crate::registry::ChannelRegistry;
use crate::types::TypeTag;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One mediator of the graph.
pub(crate) struct GraphNode {
  pub(crate) descriptor: MediatorDescriptor,
  pub(crate) handler: Handler,
  pub(crate) schedule: Schedule,
}

/// An emitter channel, wired at build time.
pub(crate) struct EmitterSlot {
  pub(crate) tag: TypeTag,
  pub(crate) tx: mpsc::Sender<Message>,
  pub(crate) rx: mpsc::Receiver<Message>,
}

/// A validated messaging graph.
pub struct Graph {
  pub(crate) name: String,
  pub(crate) nodes: Vec<GraphNode>,
  pub(crate) registry: ChannelRegistry,
  pub(crate) emitters: BTreeMap<String, EmitterSlot>,
  pub(crate) connectors: HashMap<String, Arc<dyn Connector>>,
  pub(crate) config: MessagingConfig,
  pub(crate) engine: EngineConfig,
  pub(crate) converters: Arc<ConverterRegistry>,
}

impl Graph {
  /// Graph name.
  #[must_use]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Number of mediators.
  #[must_use]
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  /// Returns true if the graph has no mediator.
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Mediator descriptors, upstream first.
  pub fn descriptors(&self) -> impl Iterator<Item = &MediatorDescriptor> {
    self.nodes.iter().map(|node| &node.descriptor)
  }

  /// Descriptor of one mediator.
  #[must_use]
  pub fn descriptor(&self, id: &MediatorId) -> Option<&MediatorDescriptor> {
    self.descriptors().find(|d| d.id() == id)
  }

  /// Mediator identities, upstream first.
  #[must_use]
  pub fn execution_order(&self) -> Vec<&MediatorId> {
    self.descriptors().map(MediatorDescriptor::id).collect()
  }

  /// The validated channel registry.
  #[must_use]
  pub fn registry(&self) -> &ChannelRegistry {
    &self.registry
  }

  /// Connector configuration of the graph.
  #[must_use]
  pub fn config(&self) -> &MessagingConfig {
    &self.config
  }

  /// Emitter for `channel`, if one was declared with payload type `T`.
  #[must_use]
  pub fn emitter<T: Any + Send + Sync>(&self, channel: &str) -> Option<Emitter<T>> {
    let slot = self.emitters.get(channel)?;
    (slot.tag == TypeTag::of::<T>()).then(|| Emitter::new(channel, slot.tx.clone()))
  }

  /// Buffer size of `channel`: its `buffer-size` attribute, else the engine
  /// default.
  #[must_use]
  pub fn buffer_size(&self, channel: &str) -> usize {
    buffer_size(&self.config, &self.engine, channel)
  }
}

pub(crate) fn buffer_size(config: &MessagingConfig, engine: &EngineConfig, channel: &str) -> usize {
  config
    .incoming_channel(channel)
    .or_else(|| config.outgoing_channel(channel))
    .and_then(|c| c.buffer_size())
    .unwrap_or(engine.default_buffer_size)
    .max(1)
}

impl fmt::Debug for Graph {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Graph")
      .field("name", &self.name)
      .field("mediators", &self.execution_order())
      .field("emitters", &self.emitters.keys().collect::<Vec<_>>())
      .field("connectors", &self.connectors.keys().collect::<Vec<_>>())
      .finish()
  }
}
