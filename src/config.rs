//! # Configuration
//!
//! Two layers:
//!
//! - [`MessagingConfig`]: per-channel connector configuration, read from flat
//!   properties or JSON. Values are opaque [`serde_json::Value`]s handed to
//!   connectors; the engine itself only reads `connector` and `buffer-size`.
//! - [`EngineConfig`]: engine-wide knobs (default buffer size, shutdown grace).
//!
//! ## Property keys
//!
//! ```text
//! mp.messaging.incoming.<channel>.<attribute> = <value>
//! mp.messaging.outgoing.<channel>.<attribute> = <value>
//! mp.messaging.connector.<connector>.<attribute> = <value>
//! ```
//!
//! Connector-level attributes apply to every channel using that connector,
//! unless the channel sets the same attribute itself. Keys outside the
//! `mp.messaging.` namespace are ignored.
//!
//! ## JSON
//!
//! ```json
//! {
//!   "incoming": { "prices": { "connector": "in-memory" } },
//!   "outgoing": { "sink": { "connector": "in-memory", "topic": "out" } },
//!   "connector": { "in-memory": { "buffer-size": 16 } }
//! }
//! ```

use crate::descriptor::Direction;
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Property namespace.
pub const PREFIX: &str = "mp.messaging.";
/// Attribute naming the connector of a channel.
pub const CONNECTOR_ATTRIBUTE: &str = "connector";
/// Attribute overriding the channel buffer size.
pub const BUFFER_SIZE_ATTRIBUTE: &str = "buffer-size";
/// Attribute naming the default destination of an outbound channel.
pub const TOPIC_ATTRIBUTE: &str = "topic";
/// Default number of in-flight messages per channel.
pub const DEFAULT_BUFFER_SIZE: usize = 128;

/// Configuration of one connector-backed channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
  /// Channel name.
  pub channel: String,
  /// Direction, seen from the application.
  pub direction: Direction,
  /// Connector name.
  pub connector: String,
  /// Every attribute, including `connector`.
  pub attributes: Map<String, Value>,
}

impl ChannelConfig {
  /// Creates a channel configuration for `connector`.
  pub fn new(channel: impl Into<String>, direction: Direction, connector: impl Into<String>) -> Self {
    let connector = connector.into();
    let mut attributes = Map::new();
    attributes.insert(CONNECTOR_ATTRIBUTE.to_string(), Value::String(connector.clone()));
    Self {
      channel: channel.into(),
      direction,
      connector,
      attributes,
    }
  }

  /// Sets an attribute.
  #[must_use]
  pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.attributes.insert(key.into(), value.into());
    self
  }

  /// Raw attribute.
  #[must_use]
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.attributes.get(key)
  }

  /// Attribute as a string. Numbers and booleans are rendered.
  #[must_use]
  pub fn get_str(&self, key: &str) -> Option<String> {
    match self.attributes.get(key)? {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      Value::Bool(b) => Some(b.to_string()),
      _ => None,
    }
  }

  /// Attribute as an unsigned integer, accepting numeric strings.
  #[must_use]
  pub fn get_usize(&self, key: &str) -> Option<usize> {
    match self.attributes.get(key)? {
      Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  /// Configured `buffer-size`, if any.
  #[must_use]
  pub fn buffer_size(&self) -> Option<usize> {
    self.get_usize(BUFFER_SIZE_ATTRIBUTE)
  }

  /// Configured `topic`, falling back to the channel name.
  #[must_use]
  pub fn topic(&self) -> String {
    self
      .get_str(TOPIC_ATTRIBUTE)
      .unwrap_or_else(|| self.channel.clone())
  }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
  #[serde(default)]
  incoming: BTreeMap<String, Map<String, Value>>,
  #[serde(default)]
  outgoing: BTreeMap<String, Map<String, Value>>,
  #[serde(default)]
  connector: BTreeMap<String, Map<String, Value>>,
}

/// Connector configuration of every channel, keyed by direction and name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessagingConfig {
  incoming: BTreeMap<String, ChannelConfig>,
  outgoing: BTreeMap<String, ChannelConfig>,
}

impl MessagingConfig {
  /// No connector-backed channel.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Declares an inbound channel fed by `connector`.
  #[must_use]
  pub fn incoming(self, channel: impl Into<String>, connector: impl Into<String>) -> Self {
    self.with_channel(ChannelConfig::new(channel, Direction::Inbound, connector))
  }

  /// Declares an outbound channel drained by `connector`.
  #[must_use]
  pub fn outgoing(self, channel: impl Into<String>, connector: impl Into<String>) -> Self {
    self.with_channel(ChannelConfig::new(channel, Direction::Outbound, connector))
  }

  /// Adds or replaces a channel configuration.
  #[must_use]
  pub fn with_channel(mut self, config: ChannelConfig) -> Self {
    let side = match config.direction {
      Direction::Inbound => &mut self.incoming,
      Direction::Outbound => &mut self.outgoing,
    };
    side.insert(config.channel.clone(), config);
    self
  }

  /// Inbound channel configuration.
  #[must_use]
  pub fn incoming_channel(&self, channel: &str) -> Option<&ChannelConfig> {
    self.incoming.get(channel)
  }

  /// Outbound channel configuration.
  #[must_use]
  pub fn outgoing_channel(&self, channel: &str) -> Option<&ChannelConfig> {
    self.outgoing.get(channel)
  }

  /// Every channel configuration, inbound first, each side in name order.
  pub fn channels(&self) -> impl Iterator<Item = &ChannelConfig> {
    self.incoming.values().chain(self.outgoing.values())
  }

  /// Parses flat `mp.messaging.*` properties.
  pub fn from_properties<I, K, V>(properties: I) -> Result<Self, ConfigurationError>
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
  {
    let mut raw = RawConfig::default();
    for (key, value) in properties {
      let key = key.as_ref();
      let Some(rest) = key.strip_prefix(PREFIX) else {
        continue;
      };
      let invalid = |reason: &str| ConfigurationError::InvalidEntry {
        key: key.to_string(),
        reason: reason.to_string(),
      };
      let mut parts = rest.splitn(3, '.');
      let (Some(kind), Some(name), Some(attribute)) = (parts.next(), parts.next(), parts.next())
      else {
        return Err(invalid("expected <kind>.<name>.<attribute>"));
      };
      if name.trim().is_empty() || attribute.trim().is_empty() {
        return Err(invalid("blank channel or attribute name"));
      }
      let side = match kind {
        "incoming" => &mut raw.incoming,
        "outgoing" => &mut raw.outgoing,
        "connector" => &mut raw.connector,
        _ => return Err(invalid("expected incoming, outgoing or connector")),
      };
      side
        .entry(name.to_string())
        .or_default()
        .insert(attribute.to_string(), Value::String(value.into()));
    }
    Self::from_raw(raw)
  }

  /// Parses the JSON form.
  pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
    let raw: RawConfig = serde_json::from_str(json).map_err(|e| ConfigurationError::InvalidEntry {
      key: "<json>".to_string(),
      reason: e.to_string(),
    })?;
    Self::from_raw(raw)
  }

  fn from_raw(raw: RawConfig) -> Result<Self, ConfigurationError> {
    let mut config = Self::new();
    let sides = [
      (Direction::Inbound, "incoming", raw.incoming),
      (Direction::Outbound, "outgoing", raw.outgoing),
    ];
    for (direction, kind, channels) in sides {
      for (channel, attributes) in channels {
        let connector = match attributes.get(CONNECTOR_ATTRIBUTE) {
          Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
          _ => {
            return Err(ConfigurationError::InvalidEntry {
              key: format!("{}{}.{}.{}", PREFIX, kind, channel, CONNECTOR_ATTRIBUTE),
              reason: "missing connector attribute".to_string(),
            });
          }
        };
        let mut merged = raw.connector.get(&connector).cloned().unwrap_or_default();
        merged.extend(attributes);
        config = config.with_channel(ChannelConfig {
          channel,
          direction,
          connector,
          attributes: merged,
        });
      }
    }
    Ok(config)
  }
}

/// Engine-wide settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
  /// Buffer size of channels without a `buffer-size` attribute.
  pub default_buffer_size: usize,
  /// How long downstream nodes may drain after sources are cancelled.
  pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      default_buffer_size: DEFAULT_BUFFER_SIZE,
      shutdown_grace: Duration::from_secs(5),
    }
  }
}

impl EngineConfig {
  /// Default settings.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the default buffer size. Zero is raised to one.
  #[must_use]
  pub fn with_default_buffer_size(mut self, size: usize) -> Self {
    self.default_buffer_size = size.max(1);
    self
  }

  /// Sets the shutdown grace period.
  #[must_use]
  pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
    self.shutdown_grace = grace;
    self
  }
}
