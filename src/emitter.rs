//! # Emitters
//!
//! An [`Emitter`] lets imperative code push payloads into a channel of a
//! running graph. Emitters are declared on the builder and wired at build
//! time, like any other producer; they are then obtained from the graph.
//!
//! `send` waits for channel capacity, so an emitter is subject to the same
//! back-pressure as in-graph producers. It returns a [`SettlementHandle`]
//! resolving once the message is acked or nacked downstream.
//!
//! A per-message destination can be set through the `topic` metadata field
//! ([`Emitter::send_to`]); outbound connectors honour it over the channel's
//! configured topic.

use crate::acknowledgement::SettlementHandle;
use crate::error::EmitterError;
use crate::message::{Message, MessageMetadata};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tracing::trace;

/// Typed handle pushing payloads into one channel.
pub struct Emitter<T> {
  channel: String,
  tx: mpsc::Sender<Message>,
  _payload: PhantomData<fn(T)>,
}

impl<T> Clone for Emitter<T> {
  fn clone(&self) -> Self {
    Self {
      channel: self.channel.clone(),
      tx: self.tx.clone(),
      _payload: PhantomData,
    }
  }
}

impl<T> fmt::Debug for Emitter<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Emitter")
      .field("channel", &self.channel)
      .field("payload", &std::any::type_name::<T>())
      .finish()
  }
}

impl<T: Any + Send + Sync> Emitter<T> {
  pub(crate) fn new(channel: impl Into<String>, tx: mpsc::Sender<Message>) -> Self {
    Self {
      channel: channel.into(),
      tx,
      _payload: PhantomData,
    }
  }

  /// Channel this emitter feeds.
  #[must_use]
  pub fn channel(&self) -> &str {
    &self.channel
  }

  /// Returns true once the channel no longer accepts messages.
  #[must_use]
  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  /// Sends a payload.
  pub async fn send(&self, value: T) -> Result<SettlementHandle, EmitterError> {
    self.send_message(Message::of(value)).await
  }

  /// Sends a payload to an explicit destination topic.
  pub async fn send_to(
    &self,
    value: T,
    topic: impl Into<String>,
  ) -> Result<SettlementHandle, EmitterError> {
    let metadata = MessageMetadata::with_timestamp_now().topic(topic);
    self
      .send_message(Message::of(value).with_metadata(metadata))
      .await
  }

  /// Sends a whole message. The channel is stamped into its metadata when
  /// missing.
  pub async fn send_message(&self, mut message: Message) -> Result<SettlementHandle, EmitterError> {
    if message.metadata().channel.is_none() {
      message.metadata_mut().channel = Some(self.channel.clone());
    }
    let settlement = message.settlement();
    trace!(channel = %self.channel, id = %message.id(), "emitting");
    match self.tx.send(message).await {
      Ok(()) => Ok(settlement),
      Err(SendError(message)) => {
        let _ = message.nack(format!("channel '{}' is closed", self.channel));
        Err(EmitterError::Closed {
          channel: self.channel.clone(),
        })
      }
    }
  }
}
