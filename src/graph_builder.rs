//! # GraphBuilder
//!
//! Fluent construction of a [`Graph`]: declare mediators, emitters, connectors
//! and converters, then call [`GraphBuilder::build`].
//!
//! `build` performs every check that does not need a running system:
//!
//! 1. each mediator is described from its signature and bindings
//!    ([`MediatorDescriptor::describe`]) and its handler is checked against the
//!    node kind selected for it;
//! 2. every producer, consumer, emitter and connector channel is registered
//!    and the channel registry is validated;
//! 3. mediators are ordered upstream first.
//!
//! The first failure is returned and nothing is built.
//!
//! # Example
//!
//! ```rust,no_run
//! use messageweave::graph_builder::{GraphBuilder, MediatorDefinition};
//! use messageweave::handler::Handler;
//!
//! let graph = GraphBuilder::new("prices")
//!   .mediator(
//!     MediatorDefinition::new("generator", "generate", Handler::supplier(|| 42i32))
//!       .outgoing("prices"),
//!   )
//!   .mediator(
//!     MediatorDefinition::new("printer", "print", Handler::consumer(|p: i32| println!("{p}")))
//!       .incoming("prices"),
//!   )
//!   .build()?;
//! # Ok::<(), messageweave::error::WeaveError>(())
//! ```

use crate::config::{EngineConfig, MessagingConfig};
use crate::connector::Connector;
use crate::converter::ConverterRegistry;
use crate::descriptor::{Bindings, MediatorDescriptor, MediatorId};
use crate::error::{ConfigurationError, InvocationError, SignatureError, WeaveError};
use crate::graph::{buffer_size, EmitterSlot, Graph, GraphNode};
use crate::handler::Handler;
use crate::invoker::Schedule;
use crate::registry::ChannelRegistry;
use crate::types::TypeTag;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// One mediator: identity, channel bindings, handler and schedule.
#[derive(Clone, Debug)]
pub struct MediatorDefinition {
  id: MediatorId,
  bindings: Bindings,
  handler: Handler,
  schedule: Schedule,
}

impl MediatorDefinition {
  /// A mediator without bindings. At least one binding must be added.
  pub fn new(bean: impl Into<String>, method: impl Into<String>, handler: Handler) -> Self {
    Self {
      id: MediatorId::new(bean, method),
      bindings: Bindings::new(),
      handler,
      schedule: Schedule::default(),
    }
  }

  /// Binds the incoming channel.
  #[must_use]
  pub fn incoming(mut self, channel: impl Into<String>) -> Self {
    self.bindings = self.bindings.incoming(channel);
    self
  }

  /// Binds the outgoing channel.
  #[must_use]
  pub fn outgoing(mut self, channel: impl Into<String>) -> Self {
    self.bindings = self.bindings.outgoing(channel);
    self
  }

  /// Accepts several producers on the incoming channel.
  #[must_use]
  pub fn merge(mut self) -> Self {
    self.bindings = self.bindings.merge();
    self
  }

  /// Replaces all bindings.
  #[must_use]
  pub fn with_bindings(mut self, bindings: Bindings) -> Self {
    self.bindings = bindings;
    self
  }

  /// Sets how a supplier is invoked. Only suppliers accept an interval
  /// schedule; `build` rejects it on any other mediator.
  #[must_use]
  pub fn with_schedule(mut self, schedule: Schedule) -> Self {
    self.schedule = schedule;
    self
  }

  /// Mediator identity.
  #[must_use]
  pub fn id(&self) -> &MediatorId {
    &self.id
  }
}

/// Builder for [`Graph`].
pub struct GraphBuilder {
  name: String,
  mediators: Vec<MediatorDefinition>,
  emitters: Vec<(String, TypeTag)>,
  connectors: HashMap<String, Arc<dyn Connector>>,
  config: MessagingConfig,
  engine: EngineConfig,
  converters: ConverterRegistry,
}

impl GraphBuilder {
  /// Creates a builder for a graph named `name`, with the default converters.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      mediators: Vec::new(),
      emitters: Vec::new(),
      connectors: HashMap::new(),
      config: MessagingConfig::new(),
      engine: EngineConfig::default(),
      converters: ConverterRegistry::with_defaults(),
    }
  }

  /// Adds a mediator.
  #[must_use]
  pub fn mediator(mut self, definition: MediatorDefinition) -> Self {
    self.mediators.push(definition);
    self
  }

  /// Declares an emitter of `T` payloads feeding `channel`.
  #[must_use]
  pub fn emitter<T: Any + Send + Sync>(mut self, channel: impl Into<String>) -> Self {
    self.emitters.push((channel.into(), TypeTag::of::<T>()));
    self
  }

  /// Registers a connector under its own name.
  #[must_use]
  pub fn connector(self, connector: impl Connector + 'static) -> Self {
    self.shared_connector(Arc::new(connector))
  }

  /// Registers a shared connector under its own name.
  #[must_use]
  pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
    self
      .connectors
      .insert(connector.name().to_string(), connector);
    self
  }

  /// Sets the connector configuration.
  #[must_use]
  pub fn with_config(mut self, config: MessagingConfig) -> Self {
    self.config = config;
    self
  }

  /// Sets the engine settings.
  #[must_use]
  pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
    self.engine = engine;
    self
  }

  /// Replaces the converter registry.
  #[must_use]
  pub fn with_converters(mut self, converters: ConverterRegistry) -> Self {
    self.converters = converters;
    self
  }

  /// Adds a payload converter from `A` to `B`.
  #[must_use]
  pub fn converter<A, B, F>(mut self, convert: F) -> Self
  where
    A: Any + Send + Sync,
    B: Any + Send + Sync,
    F: Fn(&A) -> Result<B, InvocationError> + Send + Sync + 'static,
  {
    self.converters.register::<A, B, F>(convert);
    self
  }

  /// Validates everything and builds the graph.
  pub fn build(self) -> Result<Graph, WeaveError> {
    let GraphBuilder {
      name,
      mediators,
      emitters,
      connectors,
      config,
      engine,
      converters,
    } = self;

    let mut seen = BTreeSet::new();
    let mut described = Vec::with_capacity(mediators.len());
    for definition in mediators {
      let MediatorDefinition {
        id,
        bindings,
        handler,
        schedule,
      } = definition;
      if !seen.insert(id.clone()) {
        return Err(SignatureError::DuplicateMediator { mediator: id }.into());
      }
      let descriptor = MediatorDescriptor::describe(id, handler.signature().clone(), bindings)?;
      let expected = descriptor.kind().handler_family();
      if !handler.drives(expected) {
        return Err(
          SignatureError::HandlerMismatch {
            mediator: descriptor.id().clone(),
            expected,
            actual: handler.invocable().family(),
          }
          .into(),
        );
      }
      if schedule != Schedule::OnDemand && expected != "supplier" {
        return Err(
          SignatureError::ScheduleWithoutSupplier {
            mediator: descriptor.id().clone(),
          }
          .into(),
        );
      }
      debug!(mediator = %descriptor.id(), kind = ?descriptor.kind(), "mediator described");
      described.push(GraphNode {
        descriptor,
        handler,
        schedule,
      });
    }

    let mut emitter_channels = BTreeSet::new();
    for (channel, _) in &emitters {
      if !emitter_channels.insert(channel.as_str()) {
        return Err(
          ConfigurationError::DuplicateEmitter {
            channel: channel.clone(),
          }
          .into(),
        );
      }
    }

    let mut registry = ChannelRegistry::new();
    for connector in connectors.keys() {
      registry.declare_connector(connector.clone());
    }
    for node in &described {
      registry.register(&node.descriptor);
    }
    for (channel, _) in &emitters {
      registry.register_emitter(channel);
    }
    for channel in config.channels() {
      registry.register_connector(channel);
    }
    registry.validate()?;
    let order = registry.topological_order()?;

    let mut by_id: BTreeMap<MediatorId, GraphNode> = described
      .into_iter()
      .map(|node| (node.descriptor.id().clone(), node))
      .collect();
    let nodes: Vec<GraphNode> = order.iter().filter_map(|id| by_id.remove(id)).collect();

    let mut emitter_slots = BTreeMap::new();
    for (channel, tag) in emitters {
      let (tx, rx) = mpsc::channel(buffer_size(&config, &engine, &channel));
      emitter_slots.insert(channel, EmitterSlot { tag, tx, rx });
    }

    info!(
      graph = %name,
      mediators = nodes.len(),
      emitters = emitter_slots.len(),
      channels = registry.channels().count(),
      "graph built"
    );
    Ok(Graph {
      name,
      nodes,
      registry,
      emitters: emitter_slots,
      connectors,
      config,
      engine,
      converters: Arc::new(converters),
    })
  }
}
