use crate::config::{ChannelConfig, EngineConfig, MessagingConfig, DEFAULT_BUFFER_SIZE};
use crate::descriptor::Direction;
use crate::error::ConfigurationError;
use std::time::Duration;

#[test]
fn test_from_properties() {
  let config = MessagingConfig::from_properties([
    ("mp.messaging.incoming.prices.connector", "in-memory"),
    ("mp.messaging.incoming.prices.buffer-size", "16"),
    ("mp.messaging.outgoing.sink.connector", "in-memory"),
    ("mp.messaging.outgoing.sink.topic", "out"),
    ("unrelated.key", "ignored"),
  ])
  .unwrap();

  let prices = config.incoming_channel("prices").unwrap();
  assert_eq!(prices.direction, Direction::Inbound);
  assert_eq!(prices.connector, "in-memory");
  assert_eq!(prices.buffer_size(), Some(16));
  assert_eq!(prices.topic(), "prices");

  let sink = config.outgoing_channel("sink").unwrap();
  assert_eq!(sink.direction, Direction::Outbound);
  assert_eq!(sink.topic(), "out");
  assert!(config.incoming_channel("sink").is_none());
  assert_eq!(config.channels().count(), 2);
}

#[test]
fn test_connector_attributes_apply_unless_overridden() {
  let config = MessagingConfig::from_properties([
    ("mp.messaging.connector.in-memory.buffer-size", "8"),
    ("mp.messaging.connector.in-memory.topic", "shared"),
    ("mp.messaging.outgoing.a.connector", "in-memory"),
    ("mp.messaging.outgoing.b.connector", "in-memory"),
    ("mp.messaging.outgoing.b.topic", "own"),
  ])
  .unwrap();
  let a = config.outgoing_channel("a").unwrap();
  let b = config.outgoing_channel("b").unwrap();
  assert_eq!(a.buffer_size(), Some(8));
  assert_eq!(a.topic(), "shared");
  assert_eq!(b.topic(), "own");
}

#[test]
fn test_missing_connector_is_rejected() {
  let err = MessagingConfig::from_properties([("mp.messaging.incoming.prices.topic", "p")]).unwrap_err();
  assert!(matches!(
    err,
    ConfigurationError::InvalidEntry { ref key, .. } if key == "mp.messaging.incoming.prices.connector"
  ));
}

#[test]
fn test_malformed_keys_are_rejected() {
  let short = MessagingConfig::from_properties([("mp.messaging.incoming.prices", "x")]);
  assert!(matches!(short, Err(ConfigurationError::InvalidEntry { .. })));

  let kind = MessagingConfig::from_properties([("mp.messaging.sideways.prices.connector", "x")]);
  assert!(matches!(kind, Err(ConfigurationError::InvalidEntry { .. })));
}

#[test]
fn test_from_json() {
  let config = MessagingConfig::from_json(
    r#"{
      "incoming": { "prices": { "connector": "in-memory" } },
      "outgoing": { "sink": { "connector": "in-memory", "topic": "out", "buffer-size": 4 } },
      "connector": { "in-memory": { "retries": 3 } }
    }"#,
  )
  .unwrap();
  let sink = config.outgoing_channel("sink").unwrap();
  assert_eq!(sink.buffer_size(), Some(4));
  assert_eq!(sink.get_str("retries").as_deref(), Some("3"));
  assert_eq!(config.incoming_channel("prices").unwrap().get_usize("retries"), Some(3));
}

#[test]
fn test_invalid_json() {
  let err = MessagingConfig::from_json("{ not json").unwrap_err();
  assert!(matches!(err, ConfigurationError::InvalidEntry { ref key, .. } if key == "<json>"));
}

#[test]
fn test_builder_style() {
  let config = MessagingConfig::new()
    .incoming("in", "kafka")
    .with_channel(ChannelConfig::new("out", Direction::Outbound, "kafka").with_attribute("topic", "t"));
  assert_eq!(config.incoming_channel("in").unwrap().connector, "kafka");
  assert_eq!(config.outgoing_channel("out").unwrap().topic(), "t");
}

#[test]
fn test_engine_config() {
  let engine = EngineConfig::default();
  assert_eq!(engine.default_buffer_size, DEFAULT_BUFFER_SIZE);
  assert_eq!(engine.shutdown_grace, Duration::from_secs(5));

  let engine = EngineConfig::new()
    .with_default_buffer_size(0)
    .with_shutdown_grace(Duration::from_millis(50));
  assert_eq!(engine.default_buffer_size, 1);
  assert_eq!(engine.shutdown_grace, Duration::from_millis(50));
}
