//! # Signature Analyzer
//!
//! Maps a declared [`MethodSignature`] plus the presence of incoming and
//! outgoing bindings to a [`SignatureAnalysis`]: which payload types flow in
//! and out, and whether the input is consumed as a whole stream.
//!
//! ## Outgoing rule
//!
//! - `()` return: rejected, the handler must return a result.
//! - non-generic return `T`: produces `T`.
//! - `Publisher<T>`, `PublisherBuilder<T>`, `Message<T>`, `AsyncCompletion<T>`:
//!   produces `T`.
//! - `Processor<X, Y>`, `ProcessorBuilder<X, Y>`: produces `Y`.
//! - anything else generic: rejected.
//!
//! ## Incoming rule
//!
//! - no parameter: the return must be a processor or subscriber (or their
//!   builders) with a type argument. The first argument is consumed, a second
//!   one is produced, and the input is a stream.
//! - one parameter: consumed as a stream if it is a `Publisher` or
//!   `PublisherBuilder`; the consumed type is its first type argument, or the
//!   parameter type itself when it has none.
//! - more parameters: rejected.

use crate::descriptor::{Bindings, MediatorId};
use crate::error::SignatureError;
use crate::types::{Container, TypeRef};

/// Declared parameter and return types of a mediator handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSignature {
  /// Parameters in declaration order.
  pub params: Vec<TypeRef>,
  /// Return type.
  pub returns: TypeRef,
}

impl MethodSignature {
  /// A signature with no parameter returning `()`.
  #[must_use]
  pub fn new() -> Self {
    Self {
      params: Vec::new(),
      returns: TypeRef::Void,
    }
  }

  /// A no-parameter signature returning `returns`.
  #[must_use]
  pub fn nullary(returns: TypeRef) -> Self {
    Self::new().returns(returns)
  }

  /// A one-parameter signature.
  #[must_use]
  pub fn unary(param: TypeRef, returns: TypeRef) -> Self {
    Self::new().param(param).returns(returns)
  }

  /// Appends a parameter.
  #[must_use]
  pub fn param(mut self, param: TypeRef) -> Self {
    self.params.push(param);
    self
  }

  /// Sets the return type.
  #[must_use]
  pub fn returns(mut self, returns: TypeRef) -> Self {
    self.returns = returns;
    self
  }

  /// Returns the parameter count.
  #[must_use]
  pub fn arity(&self) -> usize {
    self.params.len()
  }
}

impl Default for MethodSignature {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Display for MethodSignature {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("(")?;
    for (i, p) in self.params.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{}", p)?;
    }
    write!(f, ") -> {}", self.returns)
  }
}

/// What the analyzer inferred from a signature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureAnalysis {
  /// Type consumed from the incoming channel.
  pub consumed_payload_type: Option<TypeRef>,
  /// Type produced to the outgoing channel.
  pub produced_payload_type: Option<TypeRef>,
  /// The handler receives the whole inbound stream.
  pub consumes_as_stream: bool,
  /// The handler is a terminal subscriber stage.
  pub is_plain_subscriber: bool,
}

/// Analyzes `signature` for a mediator with the given bindings.
pub fn analyze(
  mediator: &MediatorId,
  signature: &MethodSignature,
  bindings: &Bindings,
) -> Result<SignatureAnalysis, SignatureError> {
  let mut analysis = SignatureAnalysis::default();
  if bindings.outgoing.is_some() {
    analysis.produced_payload_type = Some(produced_type(mediator, signature)?);
  }
  if bindings.incoming.is_some() {
    analyze_incoming(mediator, signature, &mut analysis)?;
  }
  Ok(analysis)
}

fn produced_type(
  mediator: &MediatorId,
  signature: &MethodSignature,
) -> Result<TypeRef, SignatureError> {
  let returns = &signature.returns;
  if returns.is_void() {
    return Err(SignatureError::MustReturnResult {
      mediator: mediator.clone(),
    });
  }
  if !returns.is_parameterized() {
    return Ok(returns.clone());
  }

  let unknown = || SignatureError::UnknownProducedType {
    mediator: mediator.clone(),
    returns: returns.clone(),
  };
  match returns.container() {
    Some(c) if c.is_single_item() => returns.first_argument().cloned().ok_or_else(unknown),
    Some(c) if c.is_processor() => returns.second_argument().cloned().ok_or_else(unknown),
    _ => Err(unknown()),
  }
}

fn analyze_incoming(
  mediator: &MediatorId,
  signature: &MethodSignature,
  analysis: &mut SignatureAnalysis,
) -> Result<(), SignatureError> {
  match signature.params.as_slice() {
    [] => {
      let returns = &signature.returns;
      if !returns.is_parameterized() {
        return Err(SignatureError::MissingTypeParameter {
          mediator: mediator.clone(),
        });
      }
      let container = match returns.container() {
        Some(c) if c.is_processor() || c.is_subscriber() => c,
        _ => {
          return Err(SignatureError::UnsupportedReturnType {
            mediator: mediator.clone(),
            returns: returns.clone(),
          });
        }
      };
      analysis.consumed_payload_type = returns.first_argument().cloned();
      if let Some(second) = returns.second_argument() {
        analysis.produced_payload_type = Some(second.clone());
      }
      analysis.consumes_as_stream = true;
      analysis.is_plain_subscriber = container.is_subscriber() && !container.is_processor();
      Ok(())
    }
    [param] => {
      analysis.consumes_as_stream = param.container().is_some_and(|c| c.is_stream());
      analysis.consumed_payload_type = Some(match param.first_argument() {
        Some(argument) => argument.clone(),
        None => param.clone(),
      });
      Ok(())
    }
    params => Err(SignatureError::TooManyParameters {
      mediator: mediator.clone(),
      count: params.len(),
    }),
  }
}

/// Returns true if `returns` is an asynchronous completion of a message.
pub(crate) fn is_async_message(returns: &TypeRef) -> bool {
  returns.is_container(Container::AsyncCompletion)
    && returns.first_argument().is_some_and(TypeRef::is_message)
}
