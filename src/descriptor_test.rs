use crate::descriptor::{Bindings, Direction, Flavor, MediatorDescriptor, MediatorId, NodeKind};
use crate::error::SignatureError;
use crate::signature::MethodSignature;
use crate::types::{Container, TypeRef, TypeTag};

fn describe(signature: MethodSignature, bindings: Bindings) -> Result<MediatorDescriptor, SignatureError> {
  MediatorDescriptor::describe(MediatorId::new("bean", "method"), signature, bindings)
}

fn int() -> TypeRef {
  TypeRef::of::<i32>()
}

fn text() -> TypeRef {
  TypeRef::of::<String>()
}

fn message(inner: TypeRef) -> TypeRef {
  TypeRef::message(inner)
}

fn kind(signature: MethodSignature, bindings: Bindings) -> NodeKind {
  describe(signature, bindings).unwrap().kind()
}

#[test]
fn test_mediator_id_display() {
  assert_eq!(MediatorId::new("Prices", "generate").to_string(), "Prices#generate");
}

#[test]
fn test_bindings_channels() {
  let bindings = Bindings::new().incoming("a").outgoing("b").merge();
  let channels = bindings.channels();
  assert_eq!(channels.len(), 2);
  assert_eq!(channels[0].name, "a");
  assert_eq!(channels[0].direction, Direction::Inbound);
  assert_eq!(channels[1].direction, Direction::Outbound);
  assert!(bindings.merge);
}

#[test]
fn test_no_binding_is_rejected() {
  let err = describe(MethodSignature::nullary(int()), Bindings::new()).unwrap_err();
  assert!(matches!(err, SignatureError::NoBinding { .. }));
}

#[test]
fn test_blank_channel_is_rejected() {
  let err = describe(MethodSignature::nullary(int()), Bindings::new().outgoing("  ")).unwrap_err();
  assert!(matches!(err, SignatureError::BlankChannel { .. }));
}

#[test]
fn test_publisher_kinds() {
  let out = || Bindings::new().outgoing("out");
  assert_eq!(
    kind(MethodSignature::nullary(int()), out()),
    NodeKind::Supplier { output: Flavor::Payload }
  );
  assert_eq!(
    kind(MethodSignature::nullary(message(int())), out()),
    NodeKind::Supplier { output: Flavor::Message }
  );
  assert_eq!(
    kind(MethodSignature::nullary(TypeRef::async_completion(int())), out()),
    NodeKind::AsyncSupplier { output: Flavor::Payload }
  );
  assert_eq!(
    kind(MethodSignature::nullary(TypeRef::publisher(message(int()))), out()),
    NodeKind::StreamSupplier { output: Flavor::Message }
  );
}

#[test]
fn test_processor_kinds() {
  let both = || Bindings::new().incoming("in").outgoing("out");
  assert_eq!(
    kind(MethodSignature::unary(int(), text()), both()),
    NodeKind::Function {
      input: Flavor::Payload,
      output: Flavor::Payload
    }
  );
  assert_eq!(
    kind(MethodSignature::unary(message(int()), message(text())), both()),
    NodeKind::Function {
      input: Flavor::Message,
      output: Flavor::Message
    }
  );
  assert_eq!(
    kind(MethodSignature::unary(int(), TypeRef::async_completion(message(text()))), both()),
    NodeKind::AsyncFunction {
      input: Flavor::Payload,
      output: Flavor::Message
    }
  );
  assert_eq!(
    kind(MethodSignature::nullary(TypeRef::processor(int(), text())), both()),
    NodeKind::Processor {
      input: Flavor::Payload,
      output: Flavor::Payload
    }
  );
  assert_eq!(
    kind(
      MethodSignature::unary(TypeRef::publisher(message(int())), TypeRef::publisher(text())),
      both()
    ),
    NodeKind::StreamTransformer {
      input: Flavor::Message,
      output: Flavor::Payload
    }
  );
}

#[test]
fn test_subscriber_kinds() {
  let inc = || Bindings::new().incoming("in");
  assert_eq!(
    kind(MethodSignature::unary(int(), TypeRef::Void), inc()),
    NodeKind::Consumer { input: Flavor::Payload }
  );
  assert_eq!(
    kind(MethodSignature::unary(message(int()), TypeRef::Void), inc()),
    NodeKind::Consumer { input: Flavor::Message }
  );
  assert_eq!(
    kind(
      MethodSignature::unary(int(), TypeRef::async_completion(TypeRef::Void)),
      inc()
    ),
    NodeKind::AsyncConsumer { input: Flavor::Payload }
  );
  assert_eq!(
    kind(MethodSignature::nullary(TypeRef::subscriber(int())), inc()),
    NodeKind::StreamSubscriber { input: Flavor::Payload }
  );
  assert_eq!(
    kind(MethodSignature::unary(TypeRef::publisher(int()), TypeRef::Void), inc()),
    NodeKind::StreamSubscriber { input: Flavor::Payload }
  );
}

#[test]
fn test_one_item_to_stream_is_unsupported() {
  let err = describe(
    MethodSignature::unary(int(), TypeRef::publisher(text())),
    Bindings::new().incoming("in").outgoing("out"),
  )
  .unwrap_err();
  assert!(matches!(err, SignatureError::UnsupportedShape { .. }));
}

#[test]
fn test_value_returning_subscriber_is_unsupported() {
  let err = describe(MethodSignature::unary(int(), text()), Bindings::new().incoming("in")).unwrap_err();
  assert!(matches!(err, SignatureError::UnsupportedShape { .. }));
}

#[test]
fn test_processor_without_incoming_is_unsupported() {
  let err = describe(
    MethodSignature::nullary(TypeRef::processor(int(), text())),
    Bindings::new().outgoing("out"),
  )
  .unwrap_err();
  assert!(matches!(err, SignatureError::UnsupportedShape { .. }));
}

#[test]
fn test_parameterised_publisher_is_unsupported() {
  let err = describe(MethodSignature::unary(int(), text()), Bindings::new().outgoing("out")).unwrap_err();
  assert!(matches!(err, SignatureError::UnsupportedShape { .. }));
}

#[test]
fn test_descriptor_queries() {
  let descriptor = describe(
    MethodSignature::unary(message(int()), TypeRef::async_completion(message(text()))),
    Bindings::new().incoming("in").outgoing("out"),
  )
  .unwrap();
  assert!(descriptor.is_publisher());
  assert!(descriptor.is_subscriber());
  assert!(!descriptor.consumes_as_stream());
  assert!(!descriptor.produces_as_stream());
  assert!(descriptor.is_consuming_payloads());
  assert!(!descriptor.is_producing_payloads());
  assert!(descriptor.is_returning_async_message());
  assert_eq!(descriptor.incoming(), Some("in"));
  assert_eq!(descriptor.outgoing(), Some("out"));
  assert_eq!(descriptor.consumed_payload_tag(), Some(TypeTag::of::<i32>()));
  assert_eq!(descriptor.produced_payload_type(), Some(&message(text())));
}

#[test]
fn test_stream_descriptor_queries() {
  let descriptor = describe(
    MethodSignature::nullary(TypeRef::generic(Container::SubscriberBuilder, vec![int()])),
    Bindings::new().incoming("in"),
  )
  .unwrap();
  assert!(descriptor.consumes_as_stream());
  assert!(descriptor.is_plain_subscriber());
  assert!(!descriptor.is_publisher());
  assert_eq!(descriptor.kind().handler_family(), "stream consumer");
}

#[test]
fn test_handler_families() {
  assert_eq!(NodeKind::Supplier { output: Flavor::Payload }.handler_family(), "supplier");
  assert_eq!(
    NodeKind::AsyncConsumer { input: Flavor::Payload }.handler_family(),
    "consumer"
  );
  assert_eq!(
    NodeKind::Processor {
      input: Flavor::Payload,
      output: Flavor::Payload
    }
    .handler_family(),
    "stream transformer"
  );
}
