//! Message envelope flowing through channels.
//!
//! A [`Message`] pairs a type-erased [`Payload`] with [`MessageMetadata`] and an
//! [`Acknowledgement`]. Cloning a message shares its acknowledgement, so every
//! node forwarding a message forwards the same settlement identity.
//!
//! # Example
//!
//! ```rust
//! use messageweave::message::Message;
//!
//! let msg = Message::of(String::from("hello"));
//! assert_eq!(msg.payload_as::<String>().map(String::as_str), Some("hello"));
//! msg.ack().unwrap();
//! assert!(msg.acknowledgement().is_settled());
//! ```

use crate::acknowledgement::{Acknowledgement, SettlementHandle};
use crate::error::{AcknowledgmentError, InvocationError};
use crate::types::TypeTag;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A unique identifier for messages.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum MessageId {
  /// A UUID-based identifier (128-bit).
  Uuid(u128),
  /// A sequence-based identifier (64-bit).
  Sequence(u64),
  /// A custom string identifier, usually assigned by a broker.
  Custom(String),
}

impl MessageId {
  /// Create a new UUIDv4-style message ID.
  #[must_use]
  pub fn new_uuid() -> Self {
    let high: u64 = rand::random();
    let low: u64 = rand::random();
    let uuid = ((high & 0xFFFF_FFFF_FFFF_0FFF) | 0x0000_0000_0000_4000) as u128
      | (((low & 0x3FFF_FFFF_FFFF_FFFF) | 0x8000_0000_0000_0000) as u128) << 64;
    MessageId::Uuid(uuid)
  }

  /// Create a sequence-based message ID.
  #[must_use]
  pub const fn new_sequence(seq: u64) -> Self {
    MessageId::Sequence(seq)
  }

  /// Create a custom message ID.
  #[must_use]
  pub fn new_custom(id: impl Into<String>) -> Self {
    MessageId::Custom(id.into())
  }
}

impl Display for MessageId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      MessageId::Uuid(uuid) => write!(
        f,
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        (uuid >> 96) as u32,
        (uuid >> 80) as u16,
        (uuid >> 64) as u16,
        (uuid >> 48) as u16,
        (uuid & 0xFFFF_FFFF_FFFF) as u64
      ),
      MessageId::Sequence(seq) => write!(f, "seq:{}", seq),
      MessageId::Custom(id) => write!(f, "custom:{}", id),
    }
  }
}

impl Default for MessageId {
  fn default() -> Self {
    MessageId::new_uuid()
  }
}

/// Monotonic sequence of message ids.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
  next: AtomicU64,
}

impl SequenceGenerator {
  /// Starts at zero.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Starts at `start`.
  #[must_use]
  pub fn starting_at(start: u64) -> Self {
    Self {
      next: AtomicU64::new(start),
    }
  }

  /// Returns the next id.
  pub fn next_id(&self) -> MessageId {
    MessageId::Sequence(self.next.fetch_add(1, Ordering::Relaxed))
  }
}

/// Metadata associated with a message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageMetadata {
  /// When the message was created.
  pub timestamp: Option<DateTime<Utc>>,
  /// Channel the message was first seen on.
  pub channel: Option<String>,
  /// Per-message destination override honoured by outbound connectors.
  pub topic: Option<String>,
  /// User-defined key for routing or grouping.
  pub key: Option<String>,
  /// Additional headers.
  pub headers: Vec<(String, String)>,
}

impl MessageMetadata {
  /// Create empty metadata.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Create metadata stamped with the current time.
  #[must_use]
  pub fn with_timestamp_now() -> Self {
    Self {
      timestamp: Some(Utc::now()),
      ..Default::default()
    }
  }

  /// Set the channel.
  #[must_use]
  pub fn channel(mut self, channel: impl Into<String>) -> Self {
    self.channel = Some(channel.into());
    self
  }

  /// Set the destination topic.
  #[must_use]
  pub fn topic(mut self, topic: impl Into<String>) -> Self {
    self.topic = Some(topic.into());
    self
  }

  /// Set the key.
  #[must_use]
  pub fn key(mut self, key: impl Into<String>) -> Self {
    self.key = Some(key.into());
    self
  }

  /// Add a header.
  #[must_use]
  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Get a header value by name.
  #[must_use]
  pub fn get_header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }
}

/// A type-erased, shareable payload.
#[derive(Clone)]
pub struct Payload {
  value: Arc<dyn Any + Send + Sync>,
  tag: TypeTag,
}

impl Payload {
  /// Wraps a value.
  pub fn new<T: Any + Send + Sync>(value: T) -> Self {
    Self {
      value: Arc::new(value),
      tag: TypeTag::of::<T>(),
    }
  }

  /// Returns the payload's concrete type.
  #[must_use]
  pub fn tag(&self) -> TypeTag {
    self.tag
  }

  /// Returns true if the payload is a `T`.
  #[must_use]
  pub fn is<T: Any>(&self) -> bool {
    self.tag.is::<T>()
  }

  /// Borrows the payload as `T`.
  #[must_use]
  pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
    self.value.downcast_ref::<T>()
  }

  /// Takes the payload as `T`, cloning only if it is shared.
  pub fn downcast<T: Any + Clone + Send + Sync>(self) -> Result<T, Payload> {
    let tag = self.tag;
    match self.value.downcast::<T>() {
      Ok(value) => Ok(Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone())),
      Err(value) => Err(Payload { value, tag }),
    }
  }
}

impl fmt::Debug for Payload {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "Payload<{}>", self.tag)
  }
}

/// A message: payload, metadata and acknowledgement.
#[derive(Clone)]
pub struct Message {
  id: MessageId,
  payload: Payload,
  metadata: MessageMetadata,
  ack: Acknowledgement,
}

impl Message {
  /// Creates a message around `value` with a fresh id and acknowledgement.
  pub fn of<T: Any + Send + Sync>(value: T) -> Self {
    Self::new(Payload::new(value))
  }

  /// Creates a message around an erased payload.
  pub fn new(payload: Payload) -> Self {
    Self::with_id(payload, MessageId::new_uuid())
  }

  /// Creates a message with a specific id.
  pub fn with_id(payload: Payload, id: MessageId) -> Self {
    let ack = Acknowledgement::new(id.to_string());
    Self {
      id,
      payload,
      metadata: MessageMetadata::with_timestamp_now(),
      ack,
    }
  }

  /// Replaces the metadata.
  #[must_use]
  pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
    self.metadata = metadata;
    self
  }

  /// Replaces the acknowledgement.
  #[must_use]
  pub fn with_acknowledgement(mut self, ack: Acknowledgement) -> Self {
    self.ack = ack;
    self
  }

  /// Runs `callback` when this message is settled.
  #[must_use]
  pub fn on_settle<F>(self, callback: F) -> Self
  where
    F: FnOnce(&crate::acknowledgement::Settlement) + Send + 'static,
  {
    self.ack.on_settle(callback);
    self
  }

  /// Get the message ID.
  #[must_use]
  pub fn id(&self) -> &MessageId {
    &self.id
  }

  /// Get the payload.
  #[must_use]
  pub fn payload(&self) -> &Payload {
    &self.payload
  }

  /// Borrow the payload as `T`.
  #[must_use]
  pub fn payload_as<T: Any>(&self) -> Option<&T> {
    self.payload.downcast_ref::<T>()
  }

  /// Get the metadata.
  #[must_use]
  pub fn metadata(&self) -> &MessageMetadata {
    &self.metadata
  }

  /// Get a mutable reference to the metadata.
  pub fn metadata_mut(&mut self) -> &mut MessageMetadata {
    &mut self.metadata
  }

  /// Get the acknowledgement.
  #[must_use]
  pub fn acknowledgement(&self) -> &Acknowledgement {
    &self.ack
  }

  /// Returns a waitable view of this message's settlement.
  #[must_use]
  pub fn settlement(&self) -> SettlementHandle {
    self.ack.watch()
  }

  /// Acknowledges the message.
  pub fn ack(&self) -> Result<(), AcknowledgmentError> {
    self.ack.ack()
  }

  /// Rejects the message.
  pub fn nack(&self, reason: impl Into<InvocationError>) -> Result<(), AcknowledgmentError> {
    self.ack.nack(reason.into())
  }

  /// Replaces the payload, keeping id, metadata and acknowledgement.
  #[must_use]
  pub fn with_payload(self, payload: Payload) -> Message {
    Message {
      id: self.id,
      payload,
      metadata: self.metadata,
      ack: self.ack,
    }
  }

  /// Replaces the acknowledgement with one chained to `upstream`: settling
  /// this message also settles `upstream`, and its own settlement is kept.
  #[must_use]
  pub fn chained_to(self, upstream: &Acknowledgement) -> Message {
    let own = self.ack.clone();
    let upstream = upstream.clone();
    let chained = Acknowledgement::with_callback(self.id.to_string(), move |settlement| {
      let _ = own.settle(settlement.clone());
      let _ = upstream.settle(settlement.clone());
    });
    self.with_acknowledgement(chained)
  }

  /// Splits into parts.
  #[must_use]
  pub fn into_parts(self) -> (MessageId, Payload, MessageMetadata, Acknowledgement) {
    (self.id, self.payload, self.metadata, self.ack)
  }
}

impl fmt::Debug for Message {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Message")
      .field("id", &self.id)
      .field("payload", &self.payload)
      .field("metadata", &self.metadata)
      .field("settled", &self.ack.is_settled())
      .finish()
  }
}
