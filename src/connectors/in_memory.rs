//! # In-Memory Connector
//!
//! A connector that keeps everything in process:
//!
//! - [`InMemoryConnector::source`] returns a handle pushing messages into an
//!   inbound channel.
//! - [`InMemoryConnector::sink`] returns a handle recording every message
//!   reaching an outbound channel, together with its destination topic.
//!
//! Handles can be taken before or after the graph starts; they share state
//! with the connector. The sink acknowledges each message once recorded.
//!
//! ## Example
//!
//! ```rust,no_run
//! use messageweave::config::MessagingConfig;
//! use messageweave::connectors::InMemoryConnector;
//!
//! let connector = InMemoryConnector::new();
//! let prices = connector.source("prices");
//! let sink = connector.sink("sink");
//! let config = MessagingConfig::new()
//!   .incoming("prices", "in-memory")
//!   .outgoing("sink", "in-memory");
//! prices.send(42i32);
//! ```

use crate::acknowledgement::SettlementHandle;
use crate::channel::MessageStream;
use crate::config::ChannelConfig;
use crate::connector::{Connector, ConnectorTask};
use crate::error::ConnectorError;
use crate::message::{Message, MessageMetadata, Payload};
use async_trait::async_trait;
use futures::StreamExt;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

/// Default connector name.
pub const IN_MEMORY: &str = "in-memory";

struct SourceSlot {
  tx: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
  rx: Option<mpsc::UnboundedReceiver<Message>>,
}

impl SourceSlot {
  fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      tx: Arc::new(Mutex::new(Some(tx))),
      rx: Some(rx),
    }
  }
}

#[derive(Default)]
struct State {
  sources: HashMap<String, SourceSlot>,
  sinks: HashMap<String, Arc<SinkState>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Connector keeping channels in process.
#[derive(Clone)]
pub struct InMemoryConnector {
  name: String,
  state: Arc<Mutex<State>>,
}

impl Default for InMemoryConnector {
  fn default() -> Self {
    Self::new()
  }
}

impl InMemoryConnector {
  /// Creates a connector named [`IN_MEMORY`].
  #[must_use]
  pub fn new() -> Self {
    Self::named(IN_MEMORY)
  }

  /// Creates a connector with a custom name.
  #[must_use]
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      state: Arc::new(Mutex::new(State::default())),
    }
  }

  /// Returns the handle feeding inbound channel `channel`.
  #[must_use]
  pub fn source(&self, channel: &str) -> InMemorySource {
    let mut state = lock(&self.state);
    let slot = state
      .sources
      .entry(channel.to_string())
      .or_insert_with(SourceSlot::new);
    InMemorySource {
      channel: channel.to_string(),
      tx: Arc::clone(&slot.tx),
    }
  }

  /// Returns the handle recording outbound channel `channel`.
  #[must_use]
  pub fn sink(&self, channel: &str) -> InMemorySink {
    InMemorySink {
      channel: channel.to_string(),
      state: self.sink_state(channel),
    }
  }

  fn sink_state(&self, channel: &str) -> Arc<SinkState> {
    let mut state = lock(&self.state);
    Arc::clone(
      state
        .sinks
        .entry(channel.to_string())
        .or_insert_with(|| Arc::new(SinkState::new())),
    )
  }
}

#[async_trait]
impl Connector for InMemoryConnector {
  fn name(&self) -> &str {
    &self.name
  }

  async fn inbound(&self, config: &ChannelConfig) -> Result<MessageStream, ConnectorError> {
    let rx = {
      let mut state = lock(&self.state);
      let slot = state
        .sources
        .entry(config.channel.clone())
        .or_insert_with(SourceSlot::new);
      slot.rx.take()
    };
    let rx = rx.ok_or_else(|| {
      ConnectorError::new(&self.name, &config.channel, "channel is already subscribed")
    })?;
    debug!(connector = %self.name, channel = %config.channel, "inbound stream opened");
    let channel = config.channel.clone();
    Ok(Box::pin(UnboundedReceiverStream::new(rx).map(
      move |mut message| {
        if message.metadata().channel.is_none() {
          message.metadata_mut().channel = Some(channel.clone());
        }
        message
      },
    )))
  }

  async fn outbound(
    &self,
    config: &ChannelConfig,
    mut messages: MessageStream,
  ) -> Result<ConnectorTask, ConnectorError> {
    let sink = self.sink_state(&config.channel);
    let default_topic = config.topic();
    let channel = config.channel.clone();
    debug!(connector = %self.name, channel = %channel, topic = %default_topic, "outbound sink opened");
    Ok(Box::pin(async move {
      while let Some(message) = messages.next().await {
        let topic = message
          .metadata()
          .topic
          .clone()
          .unwrap_or_else(|| default_topic.clone());
        sink.record(Received {
          topic,
          message: message.clone(),
        });
        if message.ack().is_err() {
          warn!(channel = %channel, id = %message.id(), "message reached the sink already settled");
        }
      }
      debug!(channel = %channel, "outbound sink completed");
      Ok(())
    }))
  }
}

/// Pushes messages into one inbound channel.
#[derive(Clone)]
pub struct InMemorySource {
  channel: String,
  tx: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
}

impl InMemorySource {
  /// Channel this source feeds.
  #[must_use]
  pub fn channel(&self) -> &str {
    &self.channel
  }

  /// Sends a payload and returns a handle resolving with its settlement.
  pub fn send<T: Any + Send + Sync>(&self, value: T) -> SettlementHandle {
    self.send_message(Message::of(value))
  }

  /// Sends a raw payload, as a broker would deliver it.
  pub fn send_payload(&self, payload: Payload) -> SettlementHandle {
    self.send_message(Message::new(payload))
  }

  /// Sends a whole message. After [`InMemorySource::complete`] the message is
  /// nacked instead.
  pub fn send_message(&self, message: Message) -> SettlementHandle {
    let settlement = message.settlement();
    let guard = lock(&self.tx);
    let rejected = match guard.as_ref() {
      Some(tx) => tx.send(message).err().map(|e| e.0),
      None => Some(message),
    };
    drop(guard);
    if let Some(message) = rejected {
      let _ = message.nack(format!("source of channel '{}' is closed", self.channel));
    }
    settlement
  }

  /// Ends the inbound stream.
  pub fn complete(&self) {
    lock(&self.tx).take();
  }
}

/// One message recorded by a sink.
#[derive(Clone, Debug)]
pub struct Received {
  /// Destination topic: the message's `topic` metadata, else the channel's
  /// configured topic, else the channel name.
  pub topic: String,
  /// The message as it reached the sink.
  pub message: Message,
}

impl Received {
  /// Payload as `T`.
  #[must_use]
  pub fn payload<T: Any>(&self) -> Option<&T> {
    self.message.payload_as::<T>()
  }

  /// Metadata of the message.
  #[must_use]
  pub fn metadata(&self) -> &MessageMetadata {
    self.message.metadata()
  }
}

struct SinkState {
  received: Mutex<Vec<Received>>,
  count: watch::Sender<usize>,
}

impl SinkState {
  fn new() -> Self {
    let (count, _) = watch::channel(0);
    Self {
      received: Mutex::new(Vec::new()),
      count,
    }
  }

  fn record(&self, received: Received) {
    lock(&self.received).push(received);
    self.count.send_modify(|count| *count += 1);
  }
}

/// Reads what reached one outbound channel.
#[derive(Clone)]
pub struct InMemorySink {
  channel: String,
  state: Arc<SinkState>,
}

impl InMemorySink {
  /// Channel this sink records.
  #[must_use]
  pub fn channel(&self) -> &str {
    &self.channel
  }

  /// Everything received so far, in arrival order.
  #[must_use]
  pub fn received(&self) -> Vec<Received> {
    lock(&self.state.received).clone()
  }

  /// Payloads of type `T` received so far.
  #[must_use]
  pub fn payloads<T: Any + Clone>(&self) -> Vec<T> {
    lock(&self.state.received)
      .iter()
      .filter_map(|r| r.payload::<T>().cloned())
      .collect()
  }

  /// Topics of the received messages.
  #[must_use]
  pub fn topics(&self) -> Vec<String> {
    lock(&self.state.received)
      .iter()
      .map(|r| r.topic.clone())
      .collect()
  }

  /// Number of received messages.
  #[must_use]
  pub fn len(&self) -> usize {
    *self.state.count.borrow()
  }

  /// Returns true if nothing was received.
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Waits until at least `count` messages were received.
  pub async fn wait_for(&self, count: usize) {
    let mut rx = self.state.count.subscribe();
    let _ = rx.wait_for(|received| *received >= count).await;
  }

  /// Forgets everything received.
  pub fn clear(&self) {
    lock(&self.state.received).clear();
    self.state.count.send_replace(0);
  }
}
