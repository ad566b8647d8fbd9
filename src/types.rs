//! # Type Shapes
//!
//! Statically declared type vocabulary used to describe mediator signatures.
//!
//! A mediator never has its generic arguments extracted at runtime. Instead it
//! declares the shape of its parameters and return value as [`TypeRef`]s, and
//! the signature analyzer resolves exactly one level of generic argument from
//! that declaration.
//!
//! ## Example
//!
//! ```rust
//! use messageweave::types::{Container, TypeRef};
//!
//! // Publisher<Message<String>>
//! let returns = TypeRef::publisher(TypeRef::message(TypeRef::of::<String>()));
//! assert!(returns.is_container(Container::Publisher));
//! assert!(returns.first_argument().unwrap().is_message());
//! ```

use std::any::TypeId;
use std::fmt::{self, Display, Formatter};

/// Identity of a concrete Rust type.
///
/// Equality is decided by [`TypeId`]; the name is carried for diagnostics only.
#[derive(Clone, Copy, Debug)]
pub struct TypeTag {
  id: TypeId,
  name: &'static str,
}

impl TypeTag {
  /// Returns the tag for `T`.
  #[must_use]
  pub fn of<T: 'static>() -> Self {
    Self {
      id: TypeId::of::<T>(),
      name: std::any::type_name::<T>(),
    }
  }

  /// Returns the underlying [`TypeId`].
  #[must_use]
  pub fn id(&self) -> TypeId {
    self.id
  }

  /// Returns the fully qualified type name.
  #[must_use]
  pub fn name(&self) -> &'static str {
    self.name
  }

  /// Returns true if this tag identifies `T`.
  #[must_use]
  pub fn is<T: 'static>(&self) -> bool {
    self.id == TypeId::of::<T>()
  }
}

impl PartialEq for TypeTag {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for TypeTag {}

impl std::hash::Hash for TypeTag {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

impl Display for TypeTag {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.write_str(self.name)
  }
}

/// Generic containers a mediator signature may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Container {
  /// A stream of items.
  Publisher,
  /// A deferred description of a stream of items.
  PublisherBuilder,
  /// A message envelope around a payload.
  Message,
  /// A value that becomes available later.
  AsyncCompletion,
  /// A stream stage consuming one type and producing another.
  Processor,
  /// A deferred description of a processor stage.
  ProcessorBuilder,
  /// A terminal stream stage.
  Subscriber,
  /// A deferred description of a terminal stage.
  SubscriberBuilder,
  /// Any other generic type, identified by name.
  Other(&'static str),
}

impl Container {
  /// Containers whose first argument is the item they carry.
  #[must_use]
  pub fn is_single_item(&self) -> bool {
    matches!(
      self,
      Container::Publisher
        | Container::Message
        | Container::AsyncCompletion
        | Container::PublisherBuilder
    )
  }

  /// Stream containers (`Publisher` and its builder).
  #[must_use]
  pub fn is_stream(&self) -> bool {
    matches!(self, Container::Publisher | Container::PublisherBuilder)
  }

  /// Processor containers (`Processor` and its builder).
  #[must_use]
  pub fn is_processor(&self) -> bool {
    matches!(self, Container::Processor | Container::ProcessorBuilder)
  }

  /// Subscriber containers (`Subscriber` and its builder).
  #[must_use]
  pub fn is_subscriber(&self) -> bool {
    matches!(self, Container::Subscriber | Container::SubscriberBuilder)
  }
}

impl Display for Container {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Container::Publisher => f.write_str("Publisher"),
      Container::PublisherBuilder => f.write_str("PublisherBuilder"),
      Container::Message => f.write_str("Message"),
      Container::AsyncCompletion => f.write_str("AsyncCompletion"),
      Container::Processor => f.write_str("Processor"),
      Container::ProcessorBuilder => f.write_str("ProcessorBuilder"),
      Container::Subscriber => f.write_str("Subscriber"),
      Container::SubscriberBuilder => f.write_str("SubscriberBuilder"),
      Container::Other(name) => f.write_str(name),
    }
  }
}

/// A declared type in a mediator signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeRef {
  /// No value (`()` in return position).
  Void,
  /// A concrete, non-generic type.
  Plain(TypeTag),
  /// A generic container with its type arguments.
  Generic {
    /// The container.
    container: Container,
    /// Type arguments, in declaration order.
    args: Vec<TypeRef>,
  },
}

impl TypeRef {
  /// A plain `T`.
  #[must_use]
  pub fn of<T: 'static>() -> Self {
    TypeRef::Plain(TypeTag::of::<T>())
  }

  /// A generic container with the given arguments.
  #[must_use]
  pub fn generic(container: Container, args: Vec<TypeRef>) -> Self {
    TypeRef::Generic { container, args }
  }

  /// `Message<inner>`.
  #[must_use]
  pub fn message(inner: TypeRef) -> Self {
    Self::generic(Container::Message, vec![inner])
  }

  /// `Publisher<inner>`.
  #[must_use]
  pub fn publisher(inner: TypeRef) -> Self {
    Self::generic(Container::Publisher, vec![inner])
  }

  /// `AsyncCompletion<inner>`.
  #[must_use]
  pub fn async_completion(inner: TypeRef) -> Self {
    Self::generic(Container::AsyncCompletion, vec![inner])
  }

  /// `Processor<input, output>`.
  #[must_use]
  pub fn processor(input: TypeRef, output: TypeRef) -> Self {
    Self::generic(Container::Processor, vec![input, output])
  }

  /// `Subscriber<inner>`.
  #[must_use]
  pub fn subscriber(inner: TypeRef) -> Self {
    Self::generic(Container::Subscriber, vec![inner])
  }

  /// Returns true for [`TypeRef::Void`].
  #[must_use]
  pub fn is_void(&self) -> bool {
    matches!(self, TypeRef::Void)
  }

  /// Returns the container, if this is a generic type.
  #[must_use]
  pub fn container(&self) -> Option<Container> {
    match self {
      TypeRef::Generic { container, .. } => Some(*container),
      _ => None,
    }
  }

  /// Returns true if this is a generic type using `container`.
  #[must_use]
  pub fn is_container(&self, container: Container) -> bool {
    self.container() == Some(container)
  }

  /// Returns true if this is a `Message<_>`.
  #[must_use]
  pub fn is_message(&self) -> bool {
    self.is_container(Container::Message)
  }

  /// Returns the type arguments (empty for non-generic types).
  #[must_use]
  pub fn arguments(&self) -> &[TypeRef] {
    match self {
      TypeRef::Generic { args, .. } => args,
      _ => &[],
    }
  }

  /// Returns true if the type carries at least one type argument.
  #[must_use]
  pub fn is_parameterized(&self) -> bool {
    !self.arguments().is_empty()
  }

  /// Returns the first type argument.
  #[must_use]
  pub fn first_argument(&self) -> Option<&TypeRef> {
    self.arguments().first()
  }

  /// Returns the second type argument.
  #[must_use]
  pub fn second_argument(&self) -> Option<&TypeRef> {
    self.arguments().get(1)
  }

  /// Returns the payload tag: the type itself when plain, the message's
  /// argument when this is `Message<T>`.
  #[must_use]
  pub fn payload_tag(&self) -> Option<TypeTag> {
    match self {
      TypeRef::Plain(tag) => Some(*tag),
      TypeRef::Generic {
        container: Container::Message,
        args,
      } => args.first().and_then(TypeRef::payload_tag),
      _ => None,
    }
  }
}

impl Display for TypeRef {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      TypeRef::Void => f.write_str("()"),
      TypeRef::Plain(tag) => write!(f, "{}", tag),
      TypeRef::Generic { container, args } => {
        write!(f, "{}<", container)?;
        for (i, arg) in args.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{}", arg)?;
        }
        f.write_str(">")
      }
    }
  }
}
