//! # Connectors
//!
//! A connector bridges a channel to something outside the graph. The engine
//! treats it as a black box that hands out streams:
//!
//! - [`Connector::inbound`]: a stream of messages feeding an inbound channel.
//!   The connector becomes the channel's only source.
//! - [`Connector::outbound`]: takes the channel's stream and returns the task
//!   draining it. The connector becomes the channel's only sink and must
//!   settle every message it receives.
//!
//! Connectors are registered on the graph builder by name and selected per
//! channel through the `connector` attribute of its [`ChannelConfig`].
//! Endpoints are requested when the graph starts; a failure there aborts the
//! start before any task runs.

use crate::channel::MessageStream;
use crate::config::ChannelConfig;
use crate::error::ConnectorError;
use async_trait::async_trait;
use futures::future::BoxFuture;

/// The task draining an outbound channel. Spawned by the lifecycle once every
/// endpoint resolved.
pub type ConnectorTask = BoxFuture<'static, Result<(), ConnectorError>>;

/// Bridge between channels and an external system.
#[async_trait]
pub trait Connector: Send + Sync {
  /// Name referenced by the `connector` attribute.
  fn name(&self) -> &str;

  /// Opens the stream feeding the inbound channel described by `config`.
  async fn inbound(&self, config: &ChannelConfig) -> Result<MessageStream, ConnectorError>;

  /// Prepares the task that drains `messages` into the outbound channel
  /// described by `config`.
  async fn outbound(
    &self,
    config: &ChannelConfig,
    messages: MessageStream,
  ) -> Result<ConnectorTask, ConnectorError>;
}
