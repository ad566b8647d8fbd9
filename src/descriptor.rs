//! # Mediator Descriptor
//!
//! Immutable record of one mediator: its identity, its channel bindings, what
//! the signature analyzer inferred, and the [`NodeKind`] the invoker will run.
//!
//! The node kind is selected once here, at registration, from the declared
//! shapes. Payload-versus-message handling of each side is its [`Flavor`].

use crate::error::SignatureError;
use crate::signature::{self, MethodSignature, SignatureAnalysis};
use crate::types::{Container, TypeRef, TypeTag};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identity of a mediator: the owning bean and the handler name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediatorId {
  /// Owning component.
  pub bean: String,
  /// Handler name.
  pub method: String,
}

impl MediatorId {
  /// Creates an identity.
  pub fn new(bean: impl Into<String>, method: impl Into<String>) -> Self {
    Self {
      bean: bean.into(),
      method: method.into(),
    }
  }
}

impl Display for MediatorId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.bean, self.method)
  }
}

/// Direction of a channel binding, seen from the mediator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  /// The mediator consumes from the channel.
  Inbound,
  /// The mediator produces to the channel.
  Outbound,
}

/// A named channel binding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelBinding {
  /// Channel name, never blank.
  pub name: String,
  /// Direction of the binding.
  pub direction: Direction,
}

/// Declared channel bindings of a mediator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
  /// Channel consumed from.
  pub incoming: Option<String>,
  /// Channel produced to.
  pub outgoing: Option<String>,
  /// Accept several producers on the incoming channel.
  pub merge: bool,
}

impl Bindings {
  /// No binding yet.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Consume from `channel`.
  #[must_use]
  pub fn incoming(mut self, channel: impl Into<String>) -> Self {
    self.incoming = Some(channel.into());
    self
  }

  /// Produce to `channel`.
  #[must_use]
  pub fn outgoing(mut self, channel: impl Into<String>) -> Self {
    self.outgoing = Some(channel.into());
    self
  }

  /// Merge every producer of the incoming channel.
  #[must_use]
  pub fn merge(mut self) -> Self {
    self.merge = true;
    self
  }

  /// Bindings as a list.
  #[must_use]
  pub fn channels(&self) -> Vec<ChannelBinding> {
    let inbound = self.incoming.iter().map(|name| ChannelBinding {
      name: name.clone(),
      direction: Direction::Inbound,
    });
    let outbound = self.outgoing.iter().map(|name| ChannelBinding {
      name: name.clone(),
      direction: Direction::Outbound,
    });
    inbound.chain(outbound).collect()
  }

  fn validate(&self, mediator: &MediatorId) -> Result<(), SignatureError> {
    if self.incoming.is_none() && self.outgoing.is_none() {
      return Err(SignatureError::NoBinding {
        mediator: mediator.clone(),
      });
    }
    let blank = self
      .incoming
      .iter()
      .chain(self.outgoing.iter())
      .any(|name| name.trim().is_empty());
    if blank {
      return Err(SignatureError::BlankChannel {
        mediator: mediator.clone(),
      });
    }
    Ok(())
  }
}

/// Whether a node side handles raw payloads or whole messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flavor {
  /// Raw payloads; the engine wraps and unwraps messages.
  Payload,
  /// Whole messages; the handler sees acknowledgements.
  Message,
}

impl Flavor {
  fn of(declared: &TypeRef) -> Flavor {
    if declared.is_message() {
      Flavor::Message
    } else {
      Flavor::Payload
    }
  }

  fn of_item(stream: &TypeRef) -> Flavor {
    stream.first_argument().map(Flavor::of).unwrap_or(Flavor::Payload)
  }
}

/// Runtime node kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
  /// `() -> T` or `() -> Message<T>`, invoked per downstream request.
  Supplier {
    /// Output flavor.
    output: Flavor,
  },
  /// `() -> AsyncCompletion<T | Message<T>>`.
  AsyncSupplier {
    /// Output flavor.
    output: Flavor,
  },
  /// `() -> Publisher<T | Message<T>>`.
  StreamSupplier {
    /// Output flavor.
    output: Flavor,
  },
  /// `(T | Message<T>) -> U | Message<U>`.
  Function {
    /// Input flavor.
    input: Flavor,
    /// Output flavor.
    output: Flavor,
  },
  /// `(T | Message<T>) -> AsyncCompletion<U | Message<U>>`.
  AsyncFunction {
    /// Input flavor.
    input: Flavor,
    /// Output flavor.
    output: Flavor,
  },
  /// `(T | Message<T>) -> ()`.
  Consumer {
    /// Input flavor.
    input: Flavor,
  },
  /// `(T | Message<T>) -> AsyncCompletion<_>`.
  AsyncConsumer {
    /// Input flavor.
    input: Flavor,
  },
  /// `() -> Subscriber<T>` or `(Publisher<T>) -> ()`.
  StreamSubscriber {
    /// Input flavor.
    input: Flavor,
  },
  /// `() -> Processor<X, Y>`: a stream stage with both types declared up front.
  Processor {
    /// Input flavor.
    input: Flavor,
    /// Output flavor.
    output: Flavor,
  },
  /// `(Publisher<X>) -> Publisher<Y>`: the inbound stream is handed over wholesale.
  StreamTransformer {
    /// Input flavor.
    input: Flavor,
    /// Output flavor.
    output: Flavor,
  },
}

impl NodeKind {
  /// Flavor of the input side, if the kind consumes.
  #[must_use]
  pub fn input(&self) -> Option<Flavor> {
    match self {
      NodeKind::Function { input, .. }
      | NodeKind::AsyncFunction { input, .. }
      | NodeKind::Consumer { input }
      | NodeKind::AsyncConsumer { input }
      | NodeKind::StreamSubscriber { input }
      | NodeKind::Processor { input, .. }
      | NodeKind::StreamTransformer { input, .. } => Some(*input),
      _ => None,
    }
  }

  /// Flavor of the output side, if the kind produces.
  #[must_use]
  pub fn output(&self) -> Option<Flavor> {
    match self {
      NodeKind::Supplier { output }
      | NodeKind::AsyncSupplier { output }
      | NodeKind::StreamSupplier { output }
      | NodeKind::Function { output, .. }
      | NodeKind::AsyncFunction { output, .. }
      | NodeKind::Processor { output, .. }
      | NodeKind::StreamTransformer { output, .. } => Some(*output),
      _ => None,
    }
  }

  /// Handler family able to drive this kind.
  #[must_use]
  pub fn handler_family(&self) -> &'static str {
    match self {
      NodeKind::Supplier { .. } | NodeKind::AsyncSupplier { .. } => "supplier",
      NodeKind::StreamSupplier { .. } => "stream supplier",
      NodeKind::Function { .. } | NodeKind::AsyncFunction { .. } => "function",
      NodeKind::Consumer { .. } | NodeKind::AsyncConsumer { .. } => "consumer",
      NodeKind::StreamSubscriber { .. } => "stream consumer",
      NodeKind::Processor { .. } | NodeKind::StreamTransformer { .. } => "stream transformer",
    }
  }
}

/// Everything the engine knows about one mediator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediatorDescriptor {
  id: MediatorId,
  bindings: Bindings,
  signature: MethodSignature,
  analysis: SignatureAnalysis,
  kind: NodeKind,
}

impl MediatorDescriptor {
  /// Validates bindings, analyzes the signature and selects the node kind.
  pub fn describe(
    id: MediatorId,
    signature: MethodSignature,
    bindings: Bindings,
  ) -> Result<Self, SignatureError> {
    bindings.validate(&id)?;
    let analysis = signature::analyze(&id, &signature, &bindings)?;
    let kind = select_kind(&id, &signature, &bindings, &analysis)?;
    Ok(Self {
      id,
      bindings,
      signature,
      analysis,
      kind,
    })
  }

  /// Mediator identity.
  #[must_use]
  pub fn id(&self) -> &MediatorId {
    &self.id
  }

  /// Declared signature.
  #[must_use]
  pub fn signature(&self) -> &MethodSignature {
    &self.signature
  }

  /// Declared bindings.
  #[must_use]
  pub fn bindings(&self) -> &Bindings {
    &self.bindings
  }

  /// Incoming channel name.
  #[must_use]
  pub fn incoming(&self) -> Option<&str> {
    self.bindings.incoming.as_deref()
  }

  /// Outgoing channel name.
  #[must_use]
  pub fn outgoing(&self) -> Option<&str> {
    self.bindings.outgoing.as_deref()
  }

  /// Selected node kind.
  #[must_use]
  pub fn kind(&self) -> NodeKind {
    self.kind
  }

  /// Has an outgoing binding.
  #[must_use]
  pub fn is_publisher(&self) -> bool {
    self.bindings.outgoing.is_some()
  }

  /// Has an incoming binding.
  #[must_use]
  pub fn is_subscriber(&self) -> bool {
    self.bindings.incoming.is_some()
  }

  /// Is a terminal subscriber stage.
  #[must_use]
  pub fn is_plain_subscriber(&self) -> bool {
    self.analysis.is_plain_subscriber
  }

  /// Receives its input as a whole stream.
  #[must_use]
  pub fn consumes_as_stream(&self) -> bool {
    self.analysis.consumes_as_stream
  }

  /// Emits its output as a stream rather than per invocation.
  #[must_use]
  pub fn produces_as_stream(&self) -> bool {
    self.is_publisher()
      && self
        .signature
        .returns
        .container()
        .is_some_and(|c| c.is_stream() || c.is_processor())
  }

  /// Consumed type is known and is not a message wrapper.
  #[must_use]
  pub fn is_consuming_payloads(&self) -> bool {
    self
      .analysis
      .consumed_payload_type
      .as_ref()
      .is_some_and(|t| !t.is_message())
  }

  /// Produced type is known and is not a message wrapper.
  #[must_use]
  pub fn is_producing_payloads(&self) -> bool {
    self
      .analysis
      .produced_payload_type
      .as_ref()
      .is_some_and(|t| !t.is_message())
  }

  /// Returns an asynchronous completion of a message.
  #[must_use]
  pub fn is_returning_async_message(&self) -> bool {
    signature::is_async_message(&self.signature.returns)
  }

  /// Inferred consumed type.
  #[must_use]
  pub fn consumed_payload_type(&self) -> Option<&TypeRef> {
    self.analysis.consumed_payload_type.as_ref()
  }

  /// Inferred produced type.
  #[must_use]
  pub fn produced_payload_type(&self) -> Option<&TypeRef> {
    self.analysis.produced_payload_type.as_ref()
  }

  /// Concrete payload type handed to the handler, used for converter selection.
  #[must_use]
  pub fn consumed_payload_tag(&self) -> Option<TypeTag> {
    self
      .analysis
      .consumed_payload_type
      .as_ref()
      .and_then(TypeRef::payload_tag)
  }
}

fn select_kind(
  id: &MediatorId,
  signature: &MethodSignature,
  bindings: &Bindings,
  analysis: &SignatureAnalysis,
) -> Result<NodeKind, SignatureError> {
  let unsupported = |detail: &str| SignatureError::UnsupportedShape {
    mediator: id.clone(),
    detail: format!("{} ({})", detail, signature),
  };
  let returns = &signature.returns;
  let returned = returns.container();

  match (bindings.incoming.is_some(), bindings.outgoing.is_some()) {
    (false, true) => {
      if !signature.params.is_empty() {
        return Err(unsupported("a publisher without incoming binding takes no parameter"));
      }
      match returned {
        Some(c) if c.is_stream() => Ok(NodeKind::StreamSupplier {
          output: Flavor::of_item(returns),
        }),
        Some(Container::AsyncCompletion) => Ok(NodeKind::AsyncSupplier {
          output: Flavor::of_item(returns),
        }),
        Some(Container::Message) => Ok(NodeKind::Supplier {
          output: Flavor::Message,
        }),
        Some(c) if c.is_processor() => Err(unsupported("a processor needs an incoming binding")),
        _ => Ok(NodeKind::Supplier {
          output: Flavor::Payload,
        }),
      }
    }
    (true, false) => match signature.params.as_slice() {
      [] => match returned {
        Some(c) if c.is_subscriber() => Ok(NodeKind::StreamSubscriber {
          input: Flavor::of_item(returns),
        }),
        _ => Err(unsupported("a processor needs an outgoing binding")),
      },
      [param] if analysis.consumes_as_stream => {
        if returns.is_void() {
          Ok(NodeKind::StreamSubscriber {
            input: Flavor::of_item(param),
          })
        } else {
          Err(unsupported("a stream consumer without outgoing binding must return nothing"))
        }
      }
      [param] => match returned {
        None if returns.is_void() => Ok(NodeKind::Consumer {
          input: Flavor::of(param),
        }),
        Some(Container::AsyncCompletion) => Ok(NodeKind::AsyncConsumer {
          input: Flavor::of(param),
        }),
        _ => Err(unsupported("a subscriber without outgoing binding returns nothing")),
      },
      params => Err(SignatureError::TooManyParameters {
        mediator: id.clone(),
        count: params.len(),
      }),
    },
    (true, true) => match signature.params.as_slice() {
      [] => match returned {
        Some(c) if c.is_processor() => {
          let input = returns.first_argument().map(Flavor::of).unwrap_or(Flavor::Payload);
          let output = returns.second_argument().map(Flavor::of).unwrap_or(Flavor::Payload);
          Ok(NodeKind::Processor { input, output })
        }
        _ => Err(unsupported("a no-parameter processor returns a processor")),
      },
      [param] if analysis.consumes_as_stream => match returned {
        Some(c) if c.is_stream() => Ok(NodeKind::StreamTransformer {
          input: Flavor::of_item(param),
          output: Flavor::of_item(returns),
        }),
        _ => Err(unsupported("a stream-consuming processor returns a stream")),
      },
      [param] => match returned {
        Some(c) if c.is_stream() => Err(unsupported("one item in, a stream out is not supported")),
        Some(Container::AsyncCompletion) => Ok(NodeKind::AsyncFunction {
          input: Flavor::of(param),
          output: Flavor::of_item(returns),
        }),
        Some(Container::Message) => Ok(NodeKind::Function {
          input: Flavor::of(param),
          output: Flavor::Message,
        }),
        Some(c) if c.is_processor() || c.is_subscriber() => {
          Err(unsupported("a one-parameter processor returns a value"))
        }
        _ => Ok(NodeKind::Function {
          input: Flavor::of(param),
          output: Flavor::Payload,
        }),
      },
      params => Err(SignatureError::TooManyParameters {
        mediator: id.clone(),
        count: params.len(),
      }),
    },
    (false, false) => Err(SignatureError::NoBinding {
      mediator: id.clone(),
    }),
  }
}
