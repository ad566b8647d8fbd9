//! # Channel Registry
//!
//! Maps every channel name to the endpoints producing to it and consuming
//! from it, and validates that the resulting topology is complete.
//!
//! ## Endpoints
//!
//! - a mediator's outgoing binding makes it a producer, its incoming binding
//!   a consumer;
//! - an emitter is a producer;
//! - an inbound connector configuration makes the connector the channel's
//!   source, an outbound one makes it the channel's sink.
//!
//! ## Connector precedence
//!
//! Connectors are resolved first. A channel fed by a connector takes no
//! in-process producer: any producer declared on it would publish into the
//! void and is reported as [`ConfigurationError::EmptyOutgoing`]. Likewise a
//! channel drained by a connector has no in-process consumer, and consumers
//! declared on it are reported as [`ConfigurationError::EmptyIncoming`].
//!
//! ## Validation order
//!
//! Channels are checked in name order; the first failure wins. Per channel:
//! unknown connector, empty incoming, empty outgoing, ambiguous producer.
//! Once every channel passes, chains are checked for reachability: every
//! mediator must be fed from a root source and drain into a terminal sink.

use crate::config::ChannelConfig;
use crate::descriptor::{Direction, MediatorDescriptor, MediatorId};
use crate::error::ConfigurationError;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, warn};

/// Something producing to or consuming from a channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
  /// A mediator.
  Mediator(MediatorId),
  /// An emitter, by channel.
  Emitter(String),
  /// A connector, by name.
  Connector(String),
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Endpoint::Mediator(id) => write!(f, "mediator {}", id),
      Endpoint::Emitter(channel) => write!(f, "emitter on {}", channel),
      Endpoint::Connector(name) => write!(f, "connector {}", name),
    }
  }
}

/// Producers and consumers of one channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelEntry {
  producers: Vec<Endpoint>,
  consumers: Vec<Endpoint>,
  merge: bool,
  inbound_connector: Option<String>,
  outbound_connector: Option<String>,
}

impl ChannelEntry {
  /// Declared in-process producers (mediators and emitters).
  #[must_use]
  pub fn producers(&self) -> &[Endpoint] {
    &self.producers
  }

  /// Declared in-process consumers.
  #[must_use]
  pub fn consumers(&self) -> &[Endpoint] {
    &self.consumers
  }

  /// Some consumer accepts several producers.
  #[must_use]
  pub fn is_merging(&self) -> bool {
    self.merge
  }

  /// Connector feeding the channel.
  #[must_use]
  pub fn inbound_connector(&self) -> Option<&str> {
    self.inbound_connector.as_deref()
  }

  /// Connector draining the channel.
  #[must_use]
  pub fn outbound_connector(&self) -> Option<&str> {
    self.outbound_connector.as_deref()
  }

  /// Effective sources, after connector precedence.
  #[must_use]
  pub fn sources(&self) -> Vec<Endpoint> {
    match &self.inbound_connector {
      Some(connector) => vec![Endpoint::Connector(connector.clone())],
      None => self.producers.clone(),
    }
  }

  /// Effective sinks, after connector precedence.
  #[must_use]
  pub fn sinks(&self) -> Vec<Endpoint> {
    match &self.outbound_connector {
      Some(connector) => vec![Endpoint::Connector(connector.clone())],
      None => self.consumers.clone(),
    }
  }

  fn is_fed_from_outside(&self) -> bool {
    self.inbound_connector.is_some() || self.producers.iter().any(|p| matches!(p, Endpoint::Emitter(_)))
  }
}

/// Channel name to endpoints, plus the connectors known to the engine.
#[derive(Clone, Debug, Default)]
pub struct ChannelRegistry {
  channels: BTreeMap<String, ChannelEntry>,
  mediators: BTreeMap<MediatorId, (Option<String>, Option<String>)>,
  known_connectors: BTreeSet<String>,
}

impl ChannelRegistry {
  /// An empty registry.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Declares a connector name as available.
  pub fn declare_connector(&mut self, name: impl Into<String>) {
    self.known_connectors.insert(name.into());
  }

  /// Registers a mediator's bindings.
  pub fn register(&mut self, descriptor: &MediatorDescriptor) {
    let id = descriptor.id().clone();
    if let Some(channel) = descriptor.outgoing() {
      self
        .entry(channel)
        .producers
        .push(Endpoint::Mediator(id.clone()));
    }
    if let Some(channel) = descriptor.incoming() {
      let merge = descriptor.bindings().merge;
      let entry = self.entry(channel);
      entry.consumers.push(Endpoint::Mediator(id.clone()));
      entry.merge |= merge;
    }
    self.mediators.insert(
      id,
      (
        descriptor.incoming().map(str::to_string),
        descriptor.outgoing().map(str::to_string),
      ),
    );
  }

  /// Registers an emitter producing to `channel`.
  pub fn register_emitter(&mut self, channel: &str) {
    self
      .entry(channel)
      .producers
      .push(Endpoint::Emitter(channel.to_string()));
  }

  /// Registers a connector-backed channel.
  pub fn register_connector(&mut self, config: &ChannelConfig) {
    let entry = self.entry(&config.channel);
    match config.direction {
      Direction::Inbound => entry.inbound_connector = Some(config.connector.clone()),
      Direction::Outbound => entry.outbound_connector = Some(config.connector.clone()),
    }
  }

  fn entry(&mut self, channel: &str) -> &mut ChannelEntry {
    self.channels.entry(channel.to_string()).or_default()
  }

  /// Entry of `channel`.
  #[must_use]
  pub fn channel(&self, channel: &str) -> Option<&ChannelEntry> {
    self.channels.get(channel)
  }

  /// Every channel, in name order.
  pub fn channels(&self) -> impl Iterator<Item = (&str, &ChannelEntry)> {
    self.channels.iter().map(|(name, entry)| (name.as_str(), entry))
  }

  /// Checks completeness of every channel, then of every chain.
  pub fn validate(&self) -> Result<(), ConfigurationError> {
    for (name, entry) in &self.channels {
      self.validate_channel(name, entry)?;
    }
    self.validate_chains()?;
    debug!(channels = self.channels.len(), "channel registry validated");
    Ok(())
  }

  fn validate_channel(&self, name: &str, entry: &ChannelEntry) -> Result<(), ConfigurationError> {
    let connectors = entry
      .inbound_connector
      .iter()
      .chain(entry.outbound_connector.iter());
    for connector in connectors {
      if !self.known_connectors.contains(connector) {
        return Err(ConfigurationError::UnknownConnector {
          channel: name.to_string(),
          connector: connector.clone(),
        });
      }
    }

    let channel = || name.to_string();
    if entry.outbound_connector.is_some() && !entry.consumers.is_empty() {
      warn!(channel = %name, "in-process consumers shadowed by an outbound connector");
      return Err(ConfigurationError::EmptyIncoming { channel: channel() });
    }
    let sources = entry.sources();
    let sinks = entry.sinks();
    if !sinks.is_empty() && sources.is_empty() {
      return Err(ConfigurationError::EmptyIncoming { channel: channel() });
    }
    if entry.inbound_connector.is_some() && !entry.producers.is_empty() {
      warn!(channel = %name, "in-process producers shadowed by an inbound connector");
      return Err(ConfigurationError::EmptyOutgoing { channel: channel() });
    }
    if !sources.is_empty() && sinks.is_empty() {
      return Err(ConfigurationError::EmptyOutgoing { channel: channel() });
    }
    if sources.len() > 1 && !entry.merge {
      return Err(ConfigurationError::AmbiguousProducer {
        channel: channel(),
        count: sources.len(),
      });
    }
    Ok(())
  }

  /// Every mediator must be reachable from a root source and reach a
  /// terminal sink. Only cycles can fail this once channels are complete.
  fn validate_chains(&self) -> Result<(), ConfigurationError> {
    let mut consumers_of: HashMap<&str, Vec<&MediatorId>> = HashMap::new();
    let mut producers_of: HashMap<&str, Vec<&MediatorId>> = HashMap::new();
    for (id, (incoming, outgoing)) in &self.mediators {
      if let Some(channel) = incoming {
        consumers_of.entry(channel.as_str()).or_default().push(id);
      }
      if let Some(channel) = outgoing {
        producers_of.entry(channel.as_str()).or_default().push(id);
      }
    }

    let fed_from_outside = |channel: &str| {
      self
        .channels
        .get(channel)
        .is_some_and(ChannelEntry::is_fed_from_outside)
    };
    let drained_outside = |channel: &str| {
      self
        .channels
        .get(channel)
        .is_some_and(|entry| entry.outbound_connector.is_some())
    };

    let roots = self.mediators.iter().filter(|(_, (incoming, _))| match incoming {
      None => true,
      Some(channel) => fed_from_outside(channel),
    });
    let fed = walk(roots.map(|(id, _)| id), |id| {
      self.mediators[id]
        .1
        .as_deref()
        .and_then(|channel| consumers_of.get(channel))
        .cloned()
        .unwrap_or_default()
    });

    let terminals = self.mediators.iter().filter(|(_, (_, outgoing))| match outgoing {
      None => true,
      Some(channel) => drained_outside(channel),
    });
    let drained = walk(terminals.map(|(id, _)| id), |id| {
      self.mediators[id]
        .0
        .as_deref()
        .and_then(|channel| producers_of.get(channel))
        .cloned()
        .unwrap_or_default()
    });

    let broken: BTreeSet<&str> = self
      .mediators
      .iter()
      .filter(|(id, _)| !fed.contains(id) || !drained.contains(id))
      .filter_map(|(_, (incoming, outgoing))| incoming.as_deref().or(outgoing.as_deref()))
      .collect();
    match broken.into_iter().next() {
      Some(channel) => Err(ConfigurationError::IncompleteChain {
        channel: channel.to_string(),
      }),
      None => self.topological_order().map(|_| ()),
    }
  }

  /// Mediators ordered upstream first (Kahn's algorithm, ties by identity).
  ///
  /// Mediators left over sit on a cycle, which never drains, and are
  /// reported as an incomplete chain on their incoming channel.
  pub fn topological_order(&self) -> Result<Vec<MediatorId>, ConfigurationError> {
    let mut in_degree: BTreeMap<&MediatorId, usize> = BTreeMap::new();
    let mut downstream: BTreeMap<&MediatorId, Vec<&MediatorId>> = BTreeMap::new();
    for id in self.mediators.keys() {
      in_degree.insert(id, 0);
      downstream.insert(id, Vec::new());
    }
    for (producer, (_, outgoing)) in &self.mediators {
      let Some(outgoing) = outgoing else {
        continue;
      };
      for (consumer, (incoming, _)) in &self.mediators {
        if incoming.as_deref() == Some(outgoing.as_str()) {
          downstream.entry(producer).or_default().push(consumer);
          *in_degree.entry(consumer).or_default() += 1;
        }
      }
    }

    let mut queue: VecDeque<&MediatorId> = in_degree
      .iter()
      .filter(|(_, degree)| **degree == 0)
      .map(|(id, _)| *id)
      .collect();
    let mut order = Vec::with_capacity(self.mediators.len());
    while let Some(id) = queue.pop_front() {
      order.push(id.clone());
      for next in downstream.get(id).map(Vec::as_slice).unwrap_or_default() {
        if let Some(degree) = in_degree.get_mut(next) {
          *degree -= 1;
          if *degree == 0 {
            queue.push_back(*next);
          }
        }
      }
    }

    if order.len() == self.mediators.len() {
      return Ok(order);
    }
    let cyclic = self
      .mediators
      .iter()
      .filter(|(id, _)| !order.contains(*id))
      .filter_map(|(_, (incoming, outgoing))| incoming.as_deref().or(outgoing.as_deref()))
      .min()
      .unwrap_or_default();
    Err(ConfigurationError::IncompleteChain {
      channel: cyclic.to_string(),
    })
  }
}

fn walk<'a, I, F>(start: I, next: F) -> HashSet<&'a MediatorId>
where
  I: Iterator<Item = &'a MediatorId>,
  F: Fn(&'a MediatorId) -> Vec<&'a MediatorId>,
{
  let mut seen: HashSet<&MediatorId> = HashSet::new();
  let mut queue: VecDeque<&MediatorId> = start.collect();
  while let Some(id) = queue.pop_front() {
    if seen.insert(id) {
      queue.extend(next(id));
    }
  }
  seen
}
