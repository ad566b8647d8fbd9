//! # Handlers
//!
//! A [`Handler`] is the invocable half of a mediator: a closure captured at
//! registration together with the [`MethodSignature`] it declares.
//!
//! Typed constructors build both at once, so the declared shape always
//! matches what the closure accepts and returns:
//!
//! ```rust
//! use messageweave::handler::Handler;
//!
//! let double = Handler::function(|x: i32| x * 2);
//! assert_eq!(double.signature().to_string(), "(i32) -> i32");
//! ```
//!
//! Internally every handler is erased to an [`Invocable`] working on
//! [`Input`] and [`Output`] values, and the invoker picks the dispatch policy
//! from the node kind selected for the signature.

use crate::error::InvocationError;
use crate::message::{Message, Payload};
use crate::signature::MethodSignature;
use crate::types::TypeRef;
use futures::future::BoxFuture;
use futures::{Future, Stream, StreamExt};
use std::any::Any;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

/// Future returned by erased handlers.
pub type HandlerFuture<T> = BoxFuture<'static, Result<T, InvocationError>>;

/// A stream of typed items handed to stream handlers.
pub type TypedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Erased inbound stream.
pub type InputStream = TypedStream<Input>;

/// Erased outbound stream.
pub type OutputStream = TypedStream<Output>;

/// What a handler receives for one item.
#[derive(Debug, Clone)]
pub enum Input {
  /// A raw payload; the engine owns the acknowledgement.
  Payload(Payload),
  /// A whole message; the handler owns the acknowledgement.
  Message(Message),
}

impl Input {
  /// Takes the payload as `T`.
  pub fn into_value<T: Any + Clone + Send + Sync>(self) -> Result<T, InvocationError> {
    let payload = match self {
      Input::Payload(payload) => payload,
      Input::Message(message) => message.payload().clone(),
    };
    payload.downcast::<T>().map_err(|payload| {
      InvocationError::new(format!(
        "expected a payload of type {}, got {}",
        std::any::type_name::<T>(),
        payload.tag()
      ))
    })
  }

  /// Takes the whole message, wrapping a bare payload if needed.
  #[must_use]
  pub fn into_message(self) -> Message {
    match self {
      Input::Message(message) => message,
      Input::Payload(payload) => Message::new(payload),
    }
  }
}

/// What a handler produces for one item.
#[derive(Debug, Clone)]
pub enum Output {
  /// A raw payload, wrapped by the engine.
  Payload(Payload),
  /// A whole message, forwarded as is.
  Message(Message),
}

impl Output {
  /// Wraps a typed value.
  pub fn value<T: Any + Send + Sync>(value: T) -> Self {
    Output::Payload(Payload::new(value))
  }
}

type SupplierFn = Arc<dyn Fn() -> HandlerFuture<Output> + Send + Sync>;
type FunctionFn = Arc<dyn Fn(Input) -> HandlerFuture<Output> + Send + Sync>;
type ConsumerFn = Arc<dyn Fn(Input) -> HandlerFuture<()> + Send + Sync>;
type StreamSupplierFn = Arc<dyn Fn() -> OutputStream + Send + Sync>;
type StreamTransformerFn = Arc<dyn Fn(InputStream) -> OutputStream + Send + Sync>;
type StreamConsumerFn = Arc<dyn Fn(InputStream) -> HandlerFuture<()> + Send + Sync>;

/// Type-erased handler families.
#[derive(Clone)]
pub enum Invocable {
  /// Produces one item per call.
  Supplier(SupplierFn),
  /// Maps one item to one item.
  Function(FunctionFn),
  /// Consumes one item per call.
  Consumer(ConsumerFn),
  /// Produces a whole stream.
  StreamSupplier(StreamSupplierFn),
  /// Maps a whole stream to a whole stream.
  StreamTransformer(StreamTransformerFn),
  /// Drains a whole stream.
  StreamConsumer(StreamConsumerFn),
}

impl Invocable {
  /// Family name, used in mismatch diagnostics.
  #[must_use]
  pub fn family(&self) -> &'static str {
    match self {
      Invocable::Supplier(_) => "supplier",
      Invocable::Function(_) => "function",
      Invocable::Consumer(_) => "consumer",
      Invocable::StreamSupplier(_) => "stream supplier",
      Invocable::StreamTransformer(_) => "stream transformer",
      Invocable::StreamConsumer(_) => "stream consumer",
    }
  }
}

impl fmt::Debug for Invocable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Invocable::{}", self.family())
  }
}

/// A declared signature and the closure implementing it.
#[derive(Clone, Debug)]
pub struct Handler {
  signature: MethodSignature,
  invocable: Invocable,
}

fn plain<T: 'static>() -> TypeRef {
  TypeRef::of::<T>()
}

fn message_of<T: 'static>() -> TypeRef {
  TypeRef::message(TypeRef::of::<T>())
}

fn typed_items<T: Any + Clone + Send + Sync>(inputs: InputStream) -> TypedStream<T> {
  Box::pin(inputs.filter_map(|input| async move {
    match input.into_value::<T>() {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(error = %e, "dropping stream item of unexpected type");
        None
      }
    }
  }))
}

fn message_items(inputs: InputStream) -> TypedStream<Message> {
  Box::pin(inputs.map(Input::into_message))
}

impl Handler {
  /// Pairs an erased closure with an explicit signature.
  ///
  /// Used when the typed constructors do not cover a declaration, for example
  /// `PublisherBuilder` or `SubscriberBuilder` shapes.
  #[must_use]
  pub fn raw(signature: MethodSignature, invocable: Invocable) -> Self {
    Self {
      signature,
      invocable,
    }
  }

  /// Declared signature.
  #[must_use]
  pub fn signature(&self) -> &MethodSignature {
    &self.signature
  }

  /// Erased closure.
  #[must_use]
  pub fn invocable(&self) -> &Invocable {
    &self.invocable
  }

  /// `() -> T`.
  pub fn supplier<T, F>(f: F) -> Self
  where
    T: Any + Send + Sync,
    F: Fn() -> T + Send + Sync + 'static,
  {
    Self::raw(
      MethodSignature::nullary(plain::<T>()),
      Invocable::Supplier(Arc::new(move || -> HandlerFuture<Output> {
        let value = f();
        Box::pin(async move { Ok(Output::value(value)) })
      })),
    )
  }

  /// `() -> Message<T>`.
  pub fn message_supplier<T, F>(f: F) -> Self
  where
    T: 'static,
    F: Fn() -> Message + Send + Sync + 'static,
  {
    Self::raw(
      MethodSignature::nullary(message_of::<T>()),
      Invocable::Supplier(Arc::new(move || -> HandlerFuture<Output> {
        let message = f();
        Box::pin(async move { Ok(Output::Message(message)) })
      })),
    )
  }

  /// `() -> AsyncCompletion<T>`.
  pub fn async_supplier<T, F, Fut>(f: F) -> Self
  where
    T: Any + Send + Sync,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, InvocationError>> + Send + 'static,
  {
    Self::raw(
      MethodSignature::nullary(TypeRef::async_completion(plain::<T>())),
      Invocable::Supplier(Arc::new(move || -> HandlerFuture<Output> {
        let pending = f();
        Box::pin(async move { pending.await.map(Output::value) })
      })),
    )
  }

  /// `() -> Publisher<T>`.
  pub fn stream_supplier<T, F, S>(f: F) -> Self
  where
    T: Any + Send + Sync,
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = T> + Send + 'static,
  {
    Self::raw(
      MethodSignature::nullary(TypeRef::publisher(plain::<T>())),
      Invocable::StreamSupplier(Arc::new(move || -> OutputStream {
        Box::pin(f().map(Output::value))
      })),
    )
  }

  /// `() -> Publisher<Message<T>>`.
  pub fn message_stream_supplier<T, F, S>(f: F) -> Self
  where
    T: 'static,
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = Message> + Send + 'static,
  {
    Self::raw(
      MethodSignature::nullary(TypeRef::publisher(message_of::<T>())),
      Invocable::StreamSupplier(Arc::new(move || -> OutputStream {
        Box::pin(f().map(Output::Message))
      })),
    )
  }

  /// `(T) -> U`.
  pub fn function<T, U, F>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    U: Any + Send + Sync,
    F: Fn(T) -> U + Send + Sync + 'static,
  {
    Self::try_function(move |value: T| Ok(f(value)))
  }

  /// `(T) -> U`, failing with an [`InvocationError`].
  pub fn try_function<T, U, F>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    U: Any + Send + Sync,
    F: Fn(T) -> Result<U, InvocationError> + Send + Sync + 'static,
  {
    Self::raw(
      MethodSignature::unary(plain::<T>(), plain::<U>()),
      Invocable::Function(Arc::new(move |input: Input| -> HandlerFuture<Output> {
        let result = input.into_value::<T>().and_then(&f).map(Output::value);
        Box::pin(async move { result })
      })),
    )
  }

  /// `(T) -> AsyncCompletion<U>`.
  pub fn async_function<T, U, F, Fut>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    U: Any + Send + Sync,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, InvocationError>> + Send + 'static,
  {
    Self::raw(
      MethodSignature::unary(plain::<T>(), TypeRef::async_completion(plain::<U>())),
      Invocable::Function(Arc::new(move |input: Input| -> HandlerFuture<Output> {
        match input.into_value::<T>() {
          Ok(value) => {
            let pending = f(value);
            Box::pin(async move { pending.await.map(Output::value) })
          }
          Err(e) => Box::pin(async move { Err(e) }),
        }
      })),
    )
  }

  /// `(T) -> AsyncCompletion<Message<U>>`.
  ///
  /// The returned message is chained to the inbound one: settling it settles
  /// the original.
  pub fn async_message_function<T, U, F, Fut>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    U: 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message, InvocationError>> + Send + 'static,
  {
    Self::raw(
      MethodSignature::unary(plain::<T>(), TypeRef::async_completion(message_of::<U>())),
      Invocable::Function(Arc::new(move |input: Input| -> HandlerFuture<Output> {
        match input.into_value::<T>() {
          Ok(value) => {
            let pending = f(value);
            Box::pin(async move { pending.await.map(Output::Message) })
          }
          Err(e) => Box::pin(async move { Err(e) }),
        }
      })),
    )
  }

  /// `(Message<T>) -> Message<U>`. The handler owns the acknowledgement.
  pub fn message_function<T, U, F>(f: F) -> Self
  where
    T: 'static,
    U: 'static,
    F: Fn(Message) -> Result<Message, InvocationError> + Send + Sync + 'static,
  {
    Self::raw(
      MethodSignature::unary(message_of::<T>(), message_of::<U>()),
      Invocable::Function(Arc::new(move |input: Input| -> HandlerFuture<Output> {
        let result = f(input.into_message()).map(Output::Message);
        Box::pin(async move { result })
      })),
    )
  }

  /// `(T) -> ()`.
  pub fn consumer<T, F>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    F: Fn(T) + Send + Sync + 'static,
  {
    Self::try_consumer(move |value: T| {
      f(value);
      Ok(())
    })
  }

  /// `(T) -> ()`, failing with an [`InvocationError`].
  pub fn try_consumer<T, F>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    F: Fn(T) -> Result<(), InvocationError> + Send + Sync + 'static,
  {
    Self::raw(
      MethodSignature::unary(plain::<T>(), TypeRef::Void),
      Invocable::Consumer(Arc::new(move |input: Input| -> HandlerFuture<()> {
        let result = input.into_value::<T>().and_then(&f);
        Box::pin(async move { result })
      })),
    )
  }

  /// `(T) -> AsyncCompletion<()>`.
  pub fn async_consumer<T, F, Fut>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), InvocationError>> + Send + 'static,
  {
    Self::raw(
      MethodSignature::unary(plain::<T>(), TypeRef::async_completion(TypeRef::Void)),
      Invocable::Consumer(Arc::new(move |input: Input| -> HandlerFuture<()> {
        match input.into_value::<T>() {
          Ok(value) => Box::pin(f(value)),
          Err(e) => Box::pin(async move { Err(e) }),
        }
      })),
    )
  }

  /// `(Message<T>) -> ()`. The engine acks on success unless the handler
  /// already settled the message.
  pub fn message_consumer<T, F>(f: F) -> Self
  where
    T: 'static,
    F: Fn(Message) -> Result<(), InvocationError> + Send + Sync + 'static,
  {
    Self::raw(
      MethodSignature::unary(message_of::<T>(), TypeRef::Void),
      Invocable::Consumer(Arc::new(move |input: Input| -> HandlerFuture<()> {
        let result = f(input.into_message());
        Box::pin(async move { result })
      })),
    )
  }

  /// `() -> Subscriber<T>`: drains the whole inbound stream.
  pub fn subscriber<T, F, Fut>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    F: Fn(TypedStream<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), InvocationError>> + Send + 'static,
  {
    Self::raw(
      MethodSignature::nullary(TypeRef::subscriber(plain::<T>())),
      Invocable::StreamConsumer(Arc::new(move |inputs: InputStream| -> HandlerFuture<()> {
        Box::pin(f(typed_items::<T>(inputs)))
      })),
    )
  }

  /// `(Publisher<T>) -> ()`.
  pub fn stream_consumer<T, F, Fut>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    F: Fn(TypedStream<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), InvocationError>> + Send + 'static,
  {
    Self::raw(
      MethodSignature::unary(TypeRef::publisher(plain::<T>()), TypeRef::Void),
      Invocable::StreamConsumer(Arc::new(move |inputs: InputStream| -> HandlerFuture<()> {
        Box::pin(f(typed_items::<T>(inputs)))
      })),
    )
  }

  /// `() -> Processor<T, U>`.
  pub fn processor<T, U, F, S>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    U: Any + Send + Sync,
    F: Fn(TypedStream<T>) -> S + Send + Sync + 'static,
    S: Stream<Item = U> + Send + 'static,
  {
    Self::raw(
      MethodSignature::nullary(TypeRef::processor(plain::<T>(), plain::<U>())),
      Invocable::StreamTransformer(Arc::new(move |inputs: InputStream| -> OutputStream {
        Box::pin(f(typed_items::<T>(inputs)).map(Output::value))
      })),
    )
  }

  /// `() -> Processor<Message<T>, Message<U>>`.
  pub fn message_processor<T, U, F, S>(f: F) -> Self
  where
    T: 'static,
    U: 'static,
    F: Fn(TypedStream<Message>) -> S + Send + Sync + 'static,
    S: Stream<Item = Message> + Send + 'static,
  {
    Self::raw(
      MethodSignature::nullary(TypeRef::processor(message_of::<T>(), message_of::<U>())),
      Invocable::StreamTransformer(Arc::new(move |inputs: InputStream| -> OutputStream {
        Box::pin(f(message_items(inputs)).map(Output::Message))
      })),
    )
  }

  /// `(Publisher<T>) -> Publisher<U>`.
  pub fn stream_transformer<T, U, F, S>(f: F) -> Self
  where
    T: Any + Clone + Send + Sync,
    U: Any + Send + Sync,
    F: Fn(TypedStream<T>) -> S + Send + Sync + 'static,
    S: Stream<Item = U> + Send + 'static,
  {
    Self::raw(
      MethodSignature::unary(TypeRef::publisher(plain::<T>()), TypeRef::publisher(plain::<U>())),
      Invocable::StreamTransformer(Arc::new(move |inputs: InputStream| -> OutputStream {
        Box::pin(f(typed_items::<T>(inputs)).map(Output::value))
      })),
    )
  }

  /// `(Publisher<Message<T>>) -> Publisher<Message<U>>`.
  pub fn message_stream_transformer<T, U, F, S>(f: F) -> Self
  where
    T: 'static,
    U: 'static,
    F: Fn(TypedStream<Message>) -> S + Send + Sync + 'static,
    S: Stream<Item = Message> + Send + 'static,
  {
    Self::raw(
      MethodSignature::unary(
        TypeRef::publisher(message_of::<T>()),
        TypeRef::publisher(message_of::<U>()),
      ),
      Invocable::StreamTransformer(Arc::new(move |inputs: InputStream| -> OutputStream {
        Box::pin(f(message_items(inputs)).map(Output::Message))
      })),
    )
  }

  /// Returns true if this handler can drive a node of `family`.
  pub(crate) fn drives(&self, family: &str) -> bool {
    self.invocable.family() == family
  }
}
