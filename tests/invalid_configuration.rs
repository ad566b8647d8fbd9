use messageweave::config::MessagingConfig;
use messageweave::connectors::{IN_MEMORY, InMemoryConnector};
use messageweave::descriptor::MediatorId;
use messageweave::error::{ConfigurationError, SignatureError, WeaveError};
use messageweave::graph_builder::{GraphBuilder, MediatorDefinition};
use messageweave::handler::Handler;
use messageweave::signature::MethodSignature;
use messageweave::types::TypeRef;

fn producer(bean: &str, channel: &str) -> MediatorDefinition {
  MediatorDefinition::new(bean, "produce", Handler::supplier(|| "hello".to_string())).outgoing(channel)
}

fn consumer(bean: &str, channel: &str) -> MediatorDefinition {
  MediatorDefinition::new(bean, "consume", Handler::consumer(|_: String| {})).incoming(channel)
}

fn configuration_error(result: Result<messageweave::Graph, WeaveError>) -> ConfigurationError {
  match result.unwrap_err() {
    WeaveError::Configuration(e) => e,
    other => panic!("expected a configuration error, got {other}"),
  }
}

#[test]
fn test_empty_incoming() {
  let err = configuration_error(GraphBuilder::new("g").mediator(consumer("sink", "source")).build());
  assert_eq!(
    err,
    ConfigurationError::EmptyIncoming {
      channel: "source".to_string()
    }
  );
}

#[test]
fn test_empty_outgoing() {
  let err = configuration_error(GraphBuilder::new("g").mediator(producer("source", "sink")).build());
  assert_eq!(
    err,
    ConfigurationError::EmptyOutgoing {
      channel: "sink".to_string()
    }
  );
}

#[test]
fn test_void_return_with_outgoing() {
  let handler = Handler::raw(MethodSignature::new(), Handler::supplier(|| 1i32).invocable().clone());
  let err = GraphBuilder::new("g")
    .mediator(MediatorDefinition::new("source", "produce", handler).outgoing("out"))
    .mediator(consumer("sink", "out"))
    .build()
    .unwrap_err();
  assert_eq!(
    err.as_signature(),
    Some(&SignatureError::MustReturnResult {
      mediator: MediatorId::new("source", "produce")
    })
  );
}

#[test]
fn test_incomplete_chain() {
  let err = configuration_error(
    GraphBuilder::new("g")
      .mediator(
        MediatorDefinition::new("ping", "relay", Handler::function(|s: String| s))
          .incoming("a")
          .outgoing("b"),
      )
      .mediator(
        MediatorDefinition::new("pong", "relay", Handler::function(|s: String| s))
          .incoming("b")
          .outgoing("a"),
      )
      .build(),
  );
  assert!(matches!(err, ConfigurationError::IncompleteChain { .. }));
}

#[test]
fn test_ambiguous_producer() {
  let err = configuration_error(
    GraphBuilder::new("g")
      .mediator(producer("one", "shared"))
      .mediator(producer("two", "shared"))
      .mediator(consumer("sink", "shared"))
      .build(),
  );
  assert_eq!(
    err,
    ConfigurationError::AmbiguousProducer {
      channel: "shared".to_string(),
      count: 2
    }
  );
  assert!(err.to_string().contains("shared"));
}

#[test]
fn test_merge_resolves_ambiguity() {
  let graph = GraphBuilder::new("g")
    .mediator(producer("one", "shared"))
    .mediator(producer("two", "shared"))
    .mediator(consumer("sink", "shared").merge())
    .build()
    .unwrap();
  assert_eq!(graph.len(), 3);
}

#[test]
fn test_missing_type_parameter() {
  let handler = Handler::raw(
    MethodSignature::nullary(TypeRef::of::<String>()),
    Handler::subscriber(|_: messageweave::handler::TypedStream<String>| async {
      Ok::<(), messageweave::InvocationError>(())
    })
    .invocable()
    .clone(),
  );
  let err = GraphBuilder::new("g")
    .mediator(producer("source", "in"))
    .mediator(MediatorDefinition::new("sink", "subscribe", handler).incoming("in"))
    .build()
    .unwrap_err();
  assert_eq!(
    err.as_signature(),
    Some(&SignatureError::MissingTypeParameter {
      mediator: MediatorId::new("sink", "subscribe")
    })
  );
}

#[test]
fn test_unknown_connector() {
  let err = configuration_error(
    GraphBuilder::new("g")
      .connector(InMemoryConnector::new())
      .with_config(MessagingConfig::new().incoming("in", "kafka"))
      .mediator(consumer("sink", "in"))
      .build(),
  );
  assert_eq!(
    err,
    ConfigurationError::UnknownConnector {
      channel: "in".to_string(),
      connector: "kafka".to_string()
    }
  );
}

#[test]
fn test_inbound_connector_shadows_mediator_producer() {
  let err = configuration_error(
    GraphBuilder::new("g")
      .connector(InMemoryConnector::new())
      .with_config(MessagingConfig::new().incoming("in", IN_MEMORY))
      .mediator(producer("source", "in"))
      .mediator(consumer("sink", "in"))
      .build(),
  );
  assert_eq!(
    err,
    ConfigurationError::EmptyOutgoing {
      channel: "in".to_string()
    }
  );
}

#[test]
fn test_outbound_connector_shadows_mediator_consumer() {
  let err = configuration_error(
    GraphBuilder::new("g")
      .connector(InMemoryConnector::new())
      .with_config(MessagingConfig::new().outgoing("out", IN_MEMORY))
      .mediator(producer("source", "out"))
      .mediator(consumer("sink", "out"))
      .build(),
  );
  assert_eq!(
    err,
    ConfigurationError::EmptyIncoming {
      channel: "out".to_string()
    }
  );
}

#[test]
fn test_malformed_properties() {
  let err = MessagingConfig::from_properties([("mp.messaging.incoming", "in-memory")]).unwrap_err();
  assert!(matches!(err, ConfigurationError::InvalidEntry { .. }));
}
