//! # Error Taxonomy
//!
//! Errors raised while assembling and running a messaging graph.
//!
//! - [`SignatureError`]: a mediator's shape cannot be mapped to a node kind.
//!   Fatal at build time; carries the mediator identity.
//! - [`ConfigurationError`]: a channel fails completeness validation. Fatal at
//!   build time; carries the channel name.
//! - [`InvocationError`]: a handler failed on one message. Recovered as a nack;
//!   detaches subscriber-only nodes.
//! - [`AcknowledgmentError`]: a message was settled more than once. Detection
//!   only, never enforced inline.
//! - [`EmitterError`]: an emitter's channel is closed.
//! - [`ConnectorError`]: a connector could not provide a channel endpoint.
//! - [`WeaveError`]: everything `build()` and `start()` can fail with.
//!
//! Build-time errors abort the whole graph. Runtime errors stay scoped to the
//! node and channel they occurred in.

use crate::descriptor::MediatorId;
use crate::types::TypeRef;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// A mediator signature that cannot be mapped to a supported node kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
  /// Outgoing binding on a handler that returns nothing.
  #[error(
    "the method {mediator} does not return a result but has an outgoing binding; the method must return a result"
  )]
  MustReturnResult {
    /// Offending mediator.
    mediator: MediatorId,
  },
  /// Outgoing binding on a generic return type of unknown shape.
  #[error("cannot determine produced type of {mediator}: unsupported return type {returns}")]
  UnknownProducedType {
    /// Offending mediator.
    mediator: MediatorId,
    /// The declared return type.
    returns: TypeRef,
  },
  /// Zero-parameter incoming handler whose return type has no type argument.
  #[error(
    "unable to determine the consumed type for {mediator} - expected a type parameter in the returned type"
  )]
  MissingTypeParameter {
    /// Offending mediator.
    mediator: MediatorId,
  },
  /// Zero-parameter incoming handler returning neither a processor nor a subscriber.
  #[error(
    "unsupported returned type {returns} for {mediator}, supported types are Processor, ProcessorBuilder, Subscriber and SubscriberBuilder"
  )]
  UnsupportedReturnType {
    /// Offending mediator.
    mediator: MediatorId,
    /// The declared return type.
    returns: TypeRef,
  },
  /// More than one parameter.
  #[error("{mediator} declares {count} parameters, at most one is supported")]
  TooManyParameters {
    /// Offending mediator.
    mediator: MediatorId,
    /// Declared parameter count.
    count: usize,
  },
  /// Neither an incoming nor an outgoing binding.
  #[error("{mediator} has neither an incoming nor an outgoing binding")]
  NoBinding {
    /// Offending mediator.
    mediator: MediatorId,
  },
  /// A binding with a blank channel name.
  #[error("{mediator} declares a blank channel name")]
  BlankChannel {
    /// Offending mediator.
    mediator: MediatorId,
  },
  /// A well-typed signature that maps to no node kind.
  #[error("{mediator} has an unsupported shape: {detail}")]
  UnsupportedShape {
    /// Offending mediator.
    mediator: MediatorId,
    /// What was wrong.
    detail: String,
  },
  /// The registered handler cannot drive the node kind selected from the signature.
  #[error("handler of {mediator} does not match its signature: expected {expected}, got {actual}")]
  HandlerMismatch {
    /// Offending mediator.
    mediator: MediatorId,
    /// Handler family the node kind requires.
    expected: &'static str,
    /// Handler family that was registered.
    actual: &'static str,
  },
  /// Two mediators registered under the same identity.
  #[error("mediator {mediator} is registered twice")]
  DuplicateMediator {
    /// Offending mediator.
    mediator: MediatorId,
  },
  /// An interval schedule on a mediator that is not a supplier.
  #[error("{mediator} has an interval schedule but only suppliers can be scheduled")]
  ScheduleWithoutSupplier {
    /// Offending mediator.
    mediator: MediatorId,
  },
}

impl SignatureError {
  /// Returns the identity of the offending mediator.
  #[must_use]
  pub fn mediator(&self) -> &MediatorId {
    match self {
      SignatureError::MustReturnResult { mediator }
      | SignatureError::UnknownProducedType { mediator, .. }
      | SignatureError::MissingTypeParameter { mediator }
      | SignatureError::UnsupportedReturnType { mediator, .. }
      | SignatureError::TooManyParameters { mediator, .. }
      | SignatureError::NoBinding { mediator }
      | SignatureError::BlankChannel { mediator }
      | SignatureError::UnsupportedShape { mediator, .. }
      | SignatureError::HandlerMismatch { mediator, .. }
      | SignatureError::DuplicateMediator { mediator }
      | SignatureError::ScheduleWithoutSupplier { mediator } => mediator,
    }
  }
}

/// A channel that fails completeness validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
  /// Consumers exist but nothing produces to the channel.
  #[error("empty incoming: channel '{channel}' has consumers but no producer and no connector")]
  EmptyIncoming {
    /// Channel name.
    channel: String,
  },
  /// Producers exist but nothing consumes from the channel.
  #[error("empty outgoing: channel '{channel}' has producers but no consumer and no connector")]
  EmptyOutgoing {
    /// Channel name.
    channel: String,
  },
  /// Several producers without a merge declaration.
  #[error("ambiguous producer: channel '{channel}' has {count} producers and no merge policy")]
  AmbiguousProducer {
    /// Channel name.
    channel: String,
    /// Number of producers.
    count: usize,
  },
  /// Bindings that never reach a connector or a terminal subscriber.
  #[error(
    "incomplete chain: channel '{channel}' is neither fed from a source nor drained to a terminal subscriber or connector"
  )]
  IncompleteChain {
    /// Channel name.
    channel: String,
  },
  /// A channel configuration naming a connector nobody registered.
  #[error("channel '{channel}' refers to unknown connector '{connector}'")]
  UnknownConnector {
    /// Channel name.
    channel: String,
    /// Connector name.
    connector: String,
  },
  /// Two emitters declared for the same channel.
  #[error("channel '{channel}' has more than one emitter")]
  DuplicateEmitter {
    /// Channel name.
    channel: String,
  },
  /// A malformed configuration entry.
  #[error("invalid configuration entry '{key}': {reason}")]
  InvalidEntry {
    /// The offending key.
    key: String,
    /// Why it was rejected.
    reason: String,
  },
}

impl ConfigurationError {
  /// Returns the channel name the error refers to, if any.
  #[must_use]
  pub fn channel(&self) -> Option<&str> {
    match self {
      ConfigurationError::EmptyIncoming { channel }
      | ConfigurationError::EmptyOutgoing { channel }
      | ConfigurationError::AmbiguousProducer { channel, .. }
      | ConfigurationError::IncompleteChain { channel }
      | ConfigurationError::UnknownConnector { channel, .. }
      | ConfigurationError::DuplicateEmitter { channel } => Some(channel),
      ConfigurationError::InvalidEntry { .. } => None,
    }
  }
}

/// A handler failure on a single message.
#[derive(Debug, Clone, Error)]
#[error("invocation of {node} failed: {reason}")]
pub struct InvocationError {
  /// Node that failed. Empty until the invoker stamps it.
  pub node: String,
  /// Failure description.
  pub reason: String,
  /// Underlying cause, when the handler surfaced one.
  #[source]
  pub source: Option<Arc<dyn StdError + Send + Sync>>,
  /// When the failure was observed.
  pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InvocationError {
  /// Creates an error with a reason and no cause.
  pub fn new(reason: impl Into<String>) -> Self {
    Self {
      node: String::new(),
      reason: reason.into(),
      source: None,
      timestamp: chrono::Utc::now(),
    }
  }

  /// Wraps any error as the cause.
  pub fn from_error<E>(error: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    Self {
      node: String::new(),
      reason: error.to_string(),
      source: Some(Arc::new(error)),
      timestamp: chrono::Utc::now(),
    }
  }

  /// Sets the node identity.
  #[must_use]
  pub fn at(mut self, node: impl Into<String>) -> Self {
    self.node = node.into();
    self
  }
}

impl From<String> for InvocationError {
  fn from(reason: String) -> Self {
    InvocationError::new(reason)
  }
}

impl From<&str> for InvocationError {
  fn from(reason: &str) -> Self {
    InvocationError::new(reason)
  }
}

/// A settlement rule violation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcknowledgmentError {
  /// Ack or nack on a message that was already settled.
  #[error("message {message} was already settled")]
  AlreadySettled {
    /// Display form of the message id.
    message: String,
  },
}

/// An emitter whose channel no longer accepts messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmitterError {
  /// The graph was shut down or the channel's consumers are gone.
  #[error("channel '{channel}' is closed")]
  Closed {
    /// Channel name.
    channel: String,
  },
}

/// A connector that failed to provide a channel endpoint.
#[derive(Debug, Clone, Error)]
#[error("connector '{connector}' failed on channel '{channel}': {reason}")]
pub struct ConnectorError {
  /// Connector name.
  pub connector: String,
  /// Channel name.
  pub channel: String,
  /// Failure description.
  pub reason: String,
}

impl ConnectorError {
  /// Creates a connector error.
  pub fn new(
    connector: impl Into<String>,
    channel: impl Into<String>,
    reason: impl Into<String>,
  ) -> Self {
    Self {
      connector: connector.into(),
      channel: channel.into(),
      reason: reason.into(),
    }
  }
}

/// Top-level error for graph assembly and start-up.
#[derive(Debug, Clone, Error)]
pub enum WeaveError {
  /// A mediator signature was rejected.
  #[error(transparent)]
  Signature(#[from] SignatureError),
  /// A channel failed validation.
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),
  /// A connector failed while the graph was starting.
  #[error(transparent)]
  Connector(#[from] ConnectorError),
}

impl WeaveError {
  /// Returns the signature error, if that is what this is.
  #[must_use]
  pub fn as_signature(&self) -> Option<&SignatureError> {
    match self {
      WeaveError::Signature(e) => Some(e),
      _ => None,
    }
  }

  /// Returns the configuration error, if that is what this is.
  #[must_use]
  pub fn as_configuration(&self) -> Option<&ConfigurationError> {
    match self {
      WeaveError::Configuration(e) => Some(e),
      _ => None,
    }
  }
}
