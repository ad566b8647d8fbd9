//! # GraphBuilder Test Suite
//!
//! Build-time behavior: mediator description, handler checks, channel
//! validation and ordering. Running graphs are covered under `tests/`.

use crate::config::{ChannelConfig, EngineConfig, MessagingConfig};
use crate::connectors::InMemoryConnector;
use crate::descriptor::{Direction, MediatorId, NodeKind};
use crate::error::{ConfigurationError, InvocationError, SignatureError, WeaveError};
use crate::graph_builder::{GraphBuilder, MediatorDefinition};
use crate::handler::{Handler, Invocable, TypedStream};
use crate::invoker::Schedule;
use crate::signature::MethodSignature;
use crate::types::TypeRef;
use futures::{StreamExt, stream};
use std::time::Duration;

fn source(bean: &str, channel: &str) -> MediatorDefinition {
  MediatorDefinition::new(bean, "produce", Handler::supplier(|| 1i32)).outgoing(channel)
}

fn doubler(bean: &str, incoming: &str, outgoing: &str) -> MediatorDefinition {
  MediatorDefinition::new(bean, "double", Handler::function(|v: i32| v * 2))
    .incoming(incoming)
    .outgoing(outgoing)
}

fn sink(bean: &str, channel: &str) -> MediatorDefinition {
  MediatorDefinition::new(bean, "consume", Handler::consumer(|_: i32| {})).incoming(channel)
}

#[test]
fn test_build_orders_mediators_upstream_first() {
  let graph = GraphBuilder::new("pipeline")
    .mediator(sink("c", "doubled"))
    .mediator(doubler("b", "numbers", "doubled"))
    .mediator(source("a", "numbers"))
    .build()
    .unwrap();

  assert_eq!(graph.name(), "pipeline");
  assert_eq!(graph.len(), 3);
  assert_eq!(
    graph.execution_order(),
    vec![
      &MediatorId::new("a", "produce"),
      &MediatorId::new("b", "double"),
      &MediatorId::new("c", "consume"),
    ]
  );
  let doubler = graph.descriptor(&MediatorId::new("b", "double")).unwrap();
  assert!(matches!(doubler.kind(), NodeKind::Function { .. }));
}

#[test]
fn test_duplicate_mediator() {
  let err = GraphBuilder::new("dup")
    .mediator(source("a", "numbers"))
    .mediator(source("a", "numbers"))
    .mediator(sink("b", "numbers"))
    .build()
    .unwrap_err();
  assert_eq!(
    err.as_signature(),
    Some(&SignatureError::DuplicateMediator {
      mediator: MediatorId::new("a", "produce")
    })
  );
}

#[test]
fn test_handler_must_match_signature() {
  let mismatched = Handler::raw(
    MethodSignature::unary(TypeRef::of::<i32>(), TypeRef::Void),
    Handler::supplier(|| 1i32).invocable().clone(),
  );
  let err = GraphBuilder::new("mismatch")
    .mediator(source("a", "numbers"))
    .mediator(MediatorDefinition::new("b", "consume", mismatched).incoming("numbers"))
    .build()
    .unwrap_err();
  assert_eq!(
    err.as_signature(),
    Some(&SignatureError::HandlerMismatch {
      mediator: MediatorId::new("b", "consume"),
      expected: "consumer",
      actual: "supplier",
    })
  );
}

#[test]
fn test_signature_errors_surface() {
  let err = GraphBuilder::new("void")
    .mediator(MediatorDefinition::new("a", "consume", Handler::consumer(|_: i32| {})).outgoing("out"))
    .build()
    .unwrap_err();
  assert!(matches!(
    err,
    WeaveError::Signature(SignatureError::MustReturnResult { .. })
  ));
}

#[test]
fn test_configuration_errors_surface() {
  let err = GraphBuilder::new("dangling")
    .mediator(source("a", "numbers"))
    .build()
    .unwrap_err();
  assert_eq!(
    err.as_configuration(),
    Some(&ConfigurationError::EmptyOutgoing {
      channel: "numbers".to_string()
    })
  );
}

#[test]
fn test_connector_must_be_registered() {
  let err = GraphBuilder::new("unknown")
    .with_config(MessagingConfig::new().incoming("numbers", "kafka"))
    .mediator(sink("b", "numbers"))
    .build()
    .unwrap_err();
  assert!(matches!(
    err.as_configuration(),
    Some(ConfigurationError::UnknownConnector { .. })
  ));
}

#[test]
fn test_connector_backed_graph() {
  let graph = GraphBuilder::new("bridged")
    .connector(InMemoryConnector::new())
    .with_config(
      MessagingConfig::new()
        .incoming("numbers", "in-memory")
        .with_channel(
          ChannelConfig::new("doubled", Direction::Outbound, "in-memory").with_attribute("buffer-size", 4),
        ),
    )
    .with_engine_config(EngineConfig::new().with_default_buffer_size(32))
    .mediator(doubler("b", "numbers", "doubled"))
    .build()
    .unwrap();
  assert_eq!(graph.buffer_size("doubled"), 4);
  assert_eq!(graph.buffer_size("numbers"), 32);
}

#[test]
fn test_emitters_are_typed() {
  let graph = GraphBuilder::new("emitting")
    .emitter::<i32>("numbers")
    .mediator(sink("b", "numbers"))
    .build()
    .unwrap();
  assert!(graph.emitter::<i32>("numbers").is_some());
  assert!(graph.emitter::<String>("numbers").is_none());
  assert!(graph.emitter::<i32>("other").is_none());
}

#[test]
fn test_stream_handlers_select_stream_kinds() {
  let graph = GraphBuilder::new("streams")
    .mediator(
      MediatorDefinition::new("a", "produce", Handler::stream_supplier(|| stream::iter(vec![1i32, 2, 3])))
        .outgoing("numbers"),
    )
    .mediator(
      MediatorDefinition::new(
        "b",
        "collect",
        Handler::stream_consumer(|items: TypedStream<i32>| async move {
          let _ = items.collect::<Vec<_>>().await;
          Ok::<(), InvocationError>(())
        }),
      )
      .incoming("numbers"),
    )
    .build()
    .unwrap();
  let kinds: Vec<NodeKind> = graph.descriptors().map(|d| d.kind()).collect();
  assert!(matches!(kinds[0], NodeKind::StreamSupplier { .. }));
  assert!(matches!(kinds[1], NodeKind::StreamSubscriber { .. }));
}

#[test]
fn test_handler_families() {
  assert!(matches!(
    Handler::function(|v: i32| v).invocable(),
    Invocable::Function(_)
  ));
  assert_eq!(Handler::consumer(|_: String| {}).invocable().family(), "consumer");
}

#[test]
fn test_duplicate_emitter_channel() {
  let err = GraphBuilder::new("twice")
    .emitter::<i32>("numbers")
    .emitter::<i32>("numbers")
    .mediator(sink("b", "numbers").merge())
    .build()
    .unwrap_err();
  assert_eq!(
    err.as_configuration(),
    Some(&ConfigurationError::DuplicateEmitter {
      channel: "numbers".to_string()
    })
  );
}

#[test]
fn test_interval_schedule_needs_a_supplier() {
  let err = GraphBuilder::new("scheduled")
    .mediator(source("a", "numbers"))
    .mediator(doubler("b", "numbers", "doubled").with_schedule(Schedule::Interval(Duration::from_millis(10))))
    .mediator(sink("c", "doubled"))
    .build()
    .unwrap_err();
  assert_eq!(
    err.as_signature(),
    Some(&SignatureError::ScheduleWithoutSupplier {
      mediator: MediatorId::new("b", "double")
    })
  );

  let graph = GraphBuilder::new("scheduled")
    .mediator(source("a", "numbers").with_schedule(Schedule::Interval(Duration::from_millis(10))))
    .mediator(sink("c", "numbers"))
    .build();
  assert!(graph.is_ok());
}
