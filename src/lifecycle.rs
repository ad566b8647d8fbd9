//! # Lifecycle
//!
//! Starting and stopping a [`Graph`].
//!
//! [`Graph::start`] runs in three phases:
//!
//! 1. **Wiring**: one bounded channel per mediator input and output, one
//!    [`ChannelHub`] per channel, emitter receivers attached as sources.
//! 2. **Connectors**: every inbound stream and outbound task is requested.
//!    Any failure aborts the start; nothing has been spawned yet.
//! 3. **Spawn**: hubs, invokers and connector tasks are spawned.
//!
//! [`RunningGraph::shutdown`] cancels the sources (suppliers, emitters,
//! connector inbound streams) and lets the rest of the graph drain, upstream
//! first, within the engine's grace period. Tasks still running after that
//! are aborted; their unsettled messages are abandoned.

use crate::channel::{ChannelHub, MessageStream};
use crate::config::ChannelConfig;
use crate::connector::ConnectorTask;
use crate::descriptor::Direction;
use crate::emitter::Emitter;
use crate::error::{ConnectorError, InvocationError, WeaveError};
use crate::graph::{buffer_size, Graph};
use crate::invoker::{MediatorInvoker, NodeContext};
use crate::message::Message;
use crate::registry::Endpoint;
use crate::types::TypeTag;
use futures::StreamExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Something that happened to a node of a running graph.
#[derive(Clone, Debug)]
pub enum NodeEvent {
  /// The node's task started.
  Started {
    /// Node name.
    node: String,
  },
  /// The node's input ended and it stopped normally.
  Completed {
    /// Node name.
    node: String,
  },
  /// The node stopped on a failure. Its inbound messages are nacked from now on.
  Detached {
    /// Node name.
    node: String,
    /// Failure that caused it.
    error: InvocationError,
  },
}

impl NodeEvent {
  /// Name of the node concerned.
  #[must_use]
  pub fn node(&self) -> &str {
    match self {
      NodeEvent::Started { node } | NodeEvent::Completed { node } | NodeEvent::Detached { node, .. } => node,
    }
  }
}

/// Outcome of stopping a graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
  /// Tasks that finished within the grace period.
  pub stopped: Vec<String>,
  /// Tasks aborted after the grace period.
  pub timed_out: Vec<String>,
  /// Mediators that detached on a failure while running.
  pub detached: Vec<String>,
}

impl ShutdownReport {
  /// Returns true if every task stopped on its own and no mediator detached.
  #[must_use]
  pub fn is_clean(&self) -> bool {
    self.timed_out.is_empty() && self.detached.is_empty()
  }
}

struct Task {
  name: String,
  handle: JoinHandle<()>,
}

/// A started graph.
pub struct RunningGraph {
  name: String,
  tasks: Vec<Task>,
  sources: CancellationToken,
  events: mpsc::UnboundedReceiver<NodeEvent>,
  emitters: BTreeMap<String, (TypeTag, mpsc::Sender<Message>)>,
  detached: Vec<String>,
  grace: Duration,
}

impl Graph {
  /// Starts the graph.
  ///
  /// Fails with a [`ConnectorError`] if a connector refuses an endpoint; in
  /// that case no task was spawned.
  pub async fn start(self) -> Result<RunningGraph, WeaveError> {
    let Graph {
      name,
      nodes,
      registry,
      emitters,
      connectors,
      config,
      engine,
      converters,
    } = self;
    info!(graph = %name, mediators = nodes.len(), "starting graph");

    let sources = CancellationToken::new();
    let (events_tx, events) = mpsc::unbounded_channel();
    let mut hubs: BTreeMap<String, ChannelHub> = registry
      .channels()
      .map(|(channel, _)| (channel.to_string(), ChannelHub::new(channel)))
      .collect();

    // Wiring
    let mut invokers = Vec::with_capacity(nodes.len());
    for node in nodes {
      let descriptor = node.descriptor;
      let input = descriptor.incoming().map(|channel| {
        let (tx, rx) = mpsc::channel(buffer_size(&config, &engine, channel));
        hub(&mut hubs, channel).add_sink(tx);
        rx
      });
      let output = descriptor.outgoing().map(|channel| {
        let (tx, rx) = mpsc::channel(buffer_size(&config, &engine, channel));
        hub(&mut hubs, channel).add_source(Box::pin(ReceiverStream::new(rx)));
        tx
      });
      let ctx = NodeContext {
        name: descriptor.id().to_string(),
        kind: descriptor.kind(),
        consumed: descriptor.consumed_payload_tag(),
        outgoing: descriptor.outgoing().map(str::to_string),
        converters: Arc::clone(&converters),
        events: events_tx.clone(),
      };
      invokers.push(MediatorInvoker {
        ctx: Arc::new(ctx),
        invocable: node.handler.invocable().clone(),
        schedule: node.schedule,
        input,
        output,
        cancel: sources.clone(),
      });
    }
    drop(events_tx);

    let mut emitter_senders = BTreeMap::new();
    for (channel, slot) in emitters {
      let stream = ReceiverStream::new(slot.rx).take_until(sources.clone().cancelled_owned());
      hub(&mut hubs, &channel).add_source(Box::pin(stream));
      emitter_senders.insert(channel, (slot.tag, slot.tx));
    }

    // Connectors
    let mut sinks: Vec<(String, ConnectorTask)> = Vec::new();
    for channel in config.channels() {
      let connector = connectors.get(&channel.connector).ok_or_else(|| {
        ConnectorError::new(&channel.connector, &channel.channel, "connector is not registered")
      })?;
      match channel.direction {
        Direction::Inbound => {
          let stream = connector.inbound(channel).await?;
          let stream: MessageStream = Box::pin(stream.take_until(sources.clone().cancelled_owned()));
          hub(&mut hubs, &channel.channel).add_source(stream);
        }
        Direction::Outbound => {
          let (tx, rx) = mpsc::channel(buffer_size(&config, &engine, &channel.channel));
          hub(&mut hubs, &channel.channel).add_sink(tx);
          let task = connector
            .outbound(channel, Box::pin(ReceiverStream::new(rx)))
            .await?;
          sinks.push((sink_name(channel), task));
        }
      }
      debug!(channel = %channel.channel, connector = %channel.connector, "connector endpoint ready");
    }

    // Spawn, upstream first.
    let mut tasks = Vec::new();
    let roots: Vec<String> = registry
      .channels()
      .filter(|(_, entry)| {
        !entry
          .producers()
          .iter()
          .any(|p| matches!(p, Endpoint::Mediator(_)))
      })
      .map(|(channel, _)| channel.to_string())
      .collect();
    for channel in roots {
      if let Some(h) = hubs.remove(&channel) {
        tasks.push(spawn_hub(h, &channel));
      }
    }
    for invoker in invokers {
      let node = invoker.ctx.name.clone();
      let outgoing = invoker.ctx.outgoing.clone();
      tasks.push(Task {
        name: node,
        handle: tokio::spawn(invoker.run()),
      });
      if let Some(channel) = outgoing {
        if let Some(h) = hubs.remove(&channel) {
          tasks.push(spawn_hub(h, &channel));
        }
      }
    }
    for (channel, h) in std::mem::take(&mut hubs) {
      tasks.push(spawn_hub(h, &channel));
    }
    for (sink, task) in sinks {
      let label = sink.clone();
      tasks.push(Task {
        name: sink,
        handle: tokio::spawn(async move {
          if let Err(e) = task.await {
            error!(task = %label, error = %e, "connector task failed");
          }
        }),
      });
    }

    info!(graph = %name, tasks = tasks.len(), "graph started");
    Ok(RunningGraph {
      name,
      tasks,
      sources,
      events,
      emitters: emitter_senders,
      detached: Vec::new(),
      grace: engine.shutdown_grace,
    })
  }
}

fn hub<'a>(hubs: &'a mut BTreeMap<String, ChannelHub>, channel: &str) -> &'a mut ChannelHub {
  hubs
    .entry(channel.to_string())
    .or_insert_with(|| ChannelHub::new(channel))
}

fn sink_name(channel: &ChannelConfig) -> String {
  format!("connector {} on {}", channel.connector, channel.channel)
}

fn spawn_hub(hub: ChannelHub, channel: &str) -> Task {
  Task {
    name: format!("channel {channel}"),
    handle: tokio::spawn(hub.run()),
  }
}

impl RunningGraph {
  /// Graph name.
  #[must_use]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Names of the running tasks, upstream first.
  #[must_use]
  pub fn tasks(&self) -> Vec<&str> {
    self.tasks.iter().map(|t| t.name.as_str()).collect()
  }

  /// Emitter for `channel`, if one was declared with payload type `T`.
  #[must_use]
  pub fn emitter<T: Any + Send + Sync>(&self, channel: &str) -> Option<Emitter<T>> {
    let (tag, tx) = self.emitters.get(channel)?;
    (*tag == TypeTag::of::<T>()).then(|| Emitter::new(channel, tx.clone()))
  }

  /// Next node event; `None` once every node finished and events are drained.
  pub async fn next_event(&mut self) -> Option<NodeEvent> {
    let event = self.events.recv().await?;
    self.record(&event);
    Some(event)
  }

  fn record(&mut self, event: &NodeEvent) {
    if let NodeEvent::Detached { node, .. } = event {
      self.detached.push(node.clone());
    }
  }

  fn drain_events(&mut self) {
    while let Ok(event) = self.events.try_recv() {
      self.record(&event);
    }
  }

  /// Waits until every task finished on its own, without cancelling anything.
  ///
  /// Returns once all sources ended: connector streams completed and every
  /// emitter handle dropped. A graph with a supplier never completes.
  pub async fn wait_for_completion(mut self) -> ShutdownReport {
    self.emitters.clear();
    let mut report = ShutdownReport::default();
    for task in std::mem::take(&mut self.tasks) {
      if let Err(e) = task.handle.await {
        warn!(task = %task.name, error = %e, "task panicked");
      }
      report.stopped.push(task.name);
    }
    self.drain_events();
    report.detached = std::mem::take(&mut self.detached);
    info!(graph = %self.name, "graph completed");
    report
  }

  /// Cancels the sources and waits for the graph to drain, then aborts
  /// whatever is still running.
  pub async fn shutdown(mut self) -> ShutdownReport {
    info!(graph = %self.name, grace = ?self.grace, "shutting down graph");
    self.sources.cancel();
    self.emitters.clear();
    let deadline = Instant::now() + self.grace;
    let mut report = ShutdownReport::default();
    for mut task in std::mem::take(&mut self.tasks) {
      match timeout_at(deadline, &mut task.handle).await {
        Ok(result) => {
          if let Err(e) = result {
            warn!(task = %task.name, error = %e, "task panicked");
          }
          report.stopped.push(task.name);
        }
        Err(_) => {
          warn!(task = %task.name, "task did not stop in time, aborting");
          task.handle.abort();
          report.timed_out.push(task.name);
        }
      }
    }
    self.drain_events();
    report.detached = std::mem::take(&mut self.detached);
    info!(
      graph = %self.name,
      stopped = report.stopped.len(),
      timed_out = report.timed_out.len(),
      detached = report.detached.len(),
      "graph stopped"
    );
    report
  }
}

impl Drop for RunningGraph {
  fn drop(&mut self) {
    if !self.tasks.is_empty() {
      debug!(graph = %self.name, "running graph dropped, cancelling sources");
      self.sources.cancel();
    }
  }
}
