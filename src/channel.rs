//! # Channel Hubs
//!
//! Every channel of a running graph is driven by one [`ChannelHub`] task. The
//! hub merges the channel's sources (mediator outputs, emitters, a connector
//! inbound stream) and delivers each message to every sink (mediator inputs
//! or a connector outbound stream).
//!
//! - Merging uses `select_all`: sources are interleaved fairly and the order
//!   within one source is preserved.
//! - With several sinks each one receives a copy carrying a child of the
//!   original acknowledgement (see [`Acknowledgement::split`]): the original
//!   acks once every copy acked and nacks on the first nack.
//! - Sinks are bounded channels, so a slow sink holds the hub, which stops
//!   pulling from its sources.
//!
//! A hub ends when all its sources ended, dropping its sinks so downstream
//! nodes observe the end of their input.
//!
//! [`Acknowledgement::split`]: crate::acknowledgement::Acknowledgement::split

use crate::error::InvocationError;
use crate::message::Message;
use futures::stream::select_all;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tracing::{debug, trace, warn};

/// A stream of messages, as exchanged with connectors and hubs.
pub type MessageStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Drives one channel: sources in, sinks out.
pub(crate) struct ChannelHub {
  channel: String,
  sources: Vec<MessageStream>,
  sinks: Vec<mpsc::Sender<Message>>,
}

impl ChannelHub {
  pub(crate) fn new(channel: impl Into<String>) -> Self {
    Self {
      channel: channel.into(),
      sources: Vec::new(),
      sinks: Vec::new(),
    }
  }

  pub(crate) fn add_source(&mut self, source: MessageStream) {
    self.sources.push(source);
  }

  pub(crate) fn add_sink(&mut self, sink: mpsc::Sender<Message>) {
    self.sinks.push(sink);
  }

  fn reject(&self, message: Message, reason: &str) {
    let error = InvocationError::new(format!("channel '{}': {}", self.channel, reason)).at(&self.channel);
    let _ = message.nack(error);
  }

  /// Runs until every source ended.
  pub(crate) async fn run(mut self) {
    debug!(
      channel = %self.channel,
      sources = self.sources.len(),
      sinks = self.sinks.len(),
      "channel hub started"
    );
    let mut merged = select_all(std::mem::take(&mut self.sources));
    while let Some(message) = merged.next().await {
      trace!(channel = %self.channel, id = %message.id(), "dispatching");
      match self.sinks.len() {
        0 => self.reject(message, "no live subscriber"),
        1 => {
          if let Err(SendError(message)) = self.sinks[0].send(message).await {
            warn!(channel = %self.channel, "subscriber went away");
            self.reject(message, "subscriber went away");
            self.sinks.clear();
          }
        }
        n => self.broadcast(message, n).await,
      }
    }
    debug!(channel = %self.channel, "channel hub completed");
  }

  async fn broadcast(&mut self, message: Message, branches: usize) {
    let children = message.acknowledgement().split(branches);
    let mut closed = Vec::new();
    for (index, (sink, child)) in self.sinks.iter().zip(children).enumerate() {
      let copy = message.clone().with_acknowledgement(child);
      if let Err(SendError(copy)) = sink.send(copy).await {
        closed.push((index, copy));
      }
    }
    for (index, copy) in closed.into_iter().rev() {
      warn!(channel = %self.channel, branch = index, "subscriber went away");
      self.reject(copy, "subscriber went away");
      self.sinks.remove(index);
    }
  }
}
