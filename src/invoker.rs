//! # Mediator Invoker
//!
//! One running task per mediator. The dispatch policy is chosen once, from the
//! [`NodeKind`] selected for the mediator and the family of its handler:
//!
//! | kind | loop |
//! |---|---|
//! | supplier | reserve downstream capacity, invoke, send |
//! | stream supplier | forward the handler's stream |
//! | function | receive, convert, invoke, forward carrying the original acknowledgement |
//! | consumer | receive, convert, invoke, ack or nack |
//! | stream transformer | hand the inbound stream over, forward the outbound stream |
//! | stream consumer | hand the inbound stream over, await completion |
//!
//! ## Acknowledgement
//!
//! - Payload in, payload out: the result is wrapped in a message sharing the
//!   original acknowledgement.
//! - Payload in, message out: the returned message is chained to the original,
//!   so settling it settles the original.
//! - Message in: the handler owns the acknowledgement. On failure the invoker
//!   nacks, which is a no-op if the handler already settled.
//! - Payload-flavoured stream input is tracked until the handler is done with
//!   it. A stream consumer settles an item when it pulls the next one or
//!   returns. A stream transformer settles the items pulled since its previous
//!   output together with that output.
//!
//! ## Failures
//!
//! A failed invocation nacks the current message. Functions and stream stages
//! carry on with the next item. Consumers, stream consumers and suppliers
//! detach: they stop, reject whatever is still buffered, and report
//! [`NodeEvent::Detached`]. A failing stream consumer nacks the items it had
//! pulled but not finished.

use crate::acknowledgement::{Acknowledgement, Settlement};
use crate::converter::ConverterRegistry;
use crate::descriptor::{Flavor, NodeKind};
use crate::error::InvocationError;
use crate::handler::{Input, InputStream, Invocable, Output};
use crate::lifecycle::NodeEvent;
use crate::message::Message;
use crate::types::TypeTag;
use async_stream::stream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// When a publisher without incoming binding is invoked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Schedule {
  /// Once per downstream request: each invocation waits for channel capacity.
  #[default]
  OnDemand,
  /// On a fixed period, still bounded by channel capacity.
  Interval(Duration),
}

/// Inbound channel shared between a stream handler's input and the invoker.
type SharedReceiver = Arc<Mutex<mpsc::Receiver<Message>>>;

/// Acknowledgements of stream items handed to a handler and not yet settled.
#[derive(Default)]
struct PendingAcks {
  acks: std::sync::Mutex<Vec<Acknowledgement>>,
}

impl PendingAcks {
  fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Acknowledgement>> {
    self.acks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn push(&self, ack: Acknowledgement) {
    self.lock().push(ack);
  }

  fn replace(&self, ack: Acknowledgement) {
    *self.lock() = vec![ack];
  }

  fn take(&self) -> Vec<Acknowledgement> {
    std::mem::take(&mut *self.lock())
  }

  fn settle_all(&self, settlement: &Settlement) {
    for ack in self.take() {
      let _ = ack.settle(settlement.clone());
    }
  }
}

/// Per-node state shared with stream adapters.
pub(crate) struct NodeContext {
  pub(crate) name: String,
  pub(crate) kind: NodeKind,
  pub(crate) consumed: Option<TypeTag>,
  pub(crate) outgoing: Option<String>,
  pub(crate) converters: Arc<ConverterRegistry>,
  pub(crate) events: mpsc::UnboundedSender<NodeEvent>,
}

impl NodeContext {
  fn input_flavor(&self) -> Flavor {
    self.kind.input().unwrap_or(Flavor::Payload)
  }

  fn report(&self, event: NodeEvent) {
    let _ = self.events.send(event);
  }

  fn failure(&self, error: InvocationError) -> InvocationError {
    error.at(&self.name)
  }

  fn reject(&self, message: Message, reason: &str) {
    let _ = message.nack(InvocationError::new(reason).at(&self.name));
  }

  /// Converts the payload to the consumed type; nacks if impossible.
  fn prepare(&self, message: Message) -> Option<Message> {
    let Some(target) = self.consumed else {
      return Some(message);
    };
    if message.payload().tag() == target {
      return Some(message);
    }
    match self.converters.convert(message.payload().clone(), target) {
      Ok(payload) => Some(message.with_payload(payload)),
      Err(e) => {
        let e = self.failure(e);
        warn!(node = %self.name, error = %e, "payload conversion failed, message nacked");
        let _ = message.nack(e);
        None
      }
    }
  }

  fn input_for(&self, message: &Message) -> Input {
    match self.input_flavor() {
      Flavor::Payload => Input::Payload(message.payload().clone()),
      Flavor::Message => Input::Message(message.clone()),
    }
  }

  /// Wraps a handler output produced from `upstream`.
  fn forward(&self, output: Output, upstream: &Message) -> Message {
    match (output, self.input_flavor()) {
      (Output::Payload(payload), _) => upstream.clone().with_payload(payload),
      (Output::Message(message), Flavor::Payload) => {
        if message.acknowledgement().same_as(upstream.acknowledgement()) {
          message
        } else {
          message.chained_to(upstream.acknowledgement())
        }
      }
      (Output::Message(message), Flavor::Message) => message,
    }
  }

  /// Wraps a handler output that has no upstream message.
  fn emit(&self, output: Output) -> Message {
    let mut message = match output {
      Output::Payload(payload) => Message::new(payload),
      Output::Message(message) => message,
    };
    if message.metadata().channel.is_none() {
      if let Some(channel) = &self.outgoing {
        message.metadata_mut().channel = Some(channel.clone());
      }
    }
    message
  }

  /// Turns the inbound channel into the handler's input stream.
  ///
  /// Payload items are recorded in `pending`. With `settle_on_pull` the items
  /// pulled earlier are acked each time the handler asks for the next one.
  fn input_stream(
    self: &Arc<Self>,
    input: SharedReceiver,
    pending: Arc<PendingAcks>,
    settle_on_pull: bool,
  ) -> InputStream {
    let ctx = Arc::clone(self);
    Box::pin(stream! {
      loop {
        let next = input.lock().await.recv().await;
        let Some(message) = next else {
          break;
        };
        let Some(message) = ctx.prepare(message) else {
          continue;
        };
        match ctx.input_flavor() {
          Flavor::Payload => {
            if settle_on_pull {
              pending.settle_all(&Settlement::Acked);
            }
            pending.push(message.acknowledgement().clone());
            yield Input::Payload(message.payload().clone());
          }
          Flavor::Message => {
            pending.replace(message.acknowledgement().clone());
            yield Input::Message(message);
          }
        }
      }
    })
  }

  /// Wraps a stream transformer output. Payload-flavoured inputs pulled since
  /// the previous output are settled with it.
  fn emit_from(&self, output: Output, upstream: Vec<Acknowledgement>) -> Message {
    let message = self.emit(output);
    if upstream.is_empty() || self.input_flavor() == Flavor::Message {
      return message;
    }
    let joined = Acknowledgement::joined(message.id().to_string(), upstream);
    message.on_settle(move |settlement| {
      let _ = joined.settle(settlement.clone());
    })
  }

  /// Stops consuming: rejects everything still buffered and reports.
  fn detach(&self, input: Option<&mut mpsc::Receiver<Message>>, error: InvocationError) {
    match input {
      Some(input) => {
        input.close();
        while let Ok(message) = input.try_recv() {
          self.reject(message, "node detached");
        }
      }
      None => warn!(node = %self.name, "inbound channel still borrowed by the handler, buffered messages left as is"),
    }
    error!(node = %self.name, error = %error, "node detached");
    self.report(NodeEvent::Detached {
      node: self.name.clone(),
      error,
    });
  }
}

/// Runs one mediator.
pub(crate) struct MediatorInvoker {
  pub(crate) ctx: Arc<NodeContext>,
  pub(crate) invocable: Invocable,
  pub(crate) schedule: Schedule,
  pub(crate) input: Option<mpsc::Receiver<Message>>,
  pub(crate) output: Option<mpsc::Sender<Message>>,
  pub(crate) cancel: CancellationToken,
}

impl MediatorInvoker {
  pub(crate) async fn run(self) {
    let MediatorInvoker {
      ctx,
      invocable,
      schedule,
      input,
      output,
      cancel,
    } = self;
    debug!(node = %ctx.name, kind = ?ctx.kind, "node started");
    ctx.report(NodeEvent::Started {
      node: ctx.name.clone(),
    });

    match (invocable, input, output) {
      (Invocable::Supplier(f), None, Some(output)) => {
        let mut ticker = match schedule {
          Schedule::Interval(period) => Some(tokio::time::interval(period)),
          Schedule::OnDemand => None,
        };
        loop {
          if let Some(ticker) = ticker.as_mut() {
            tokio::select! {
              biased;
              _ = cancel.cancelled() => break,
              _ = ticker.tick() => {}
            }
          }
          let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = output.reserve() => match permit {
              Ok(permit) => permit,
              Err(_) => break,
            },
          };
          match f().await {
            Ok(out) => {
              let message = ctx.emit(out);
              trace!(node = %ctx.name, id = %message.id(), "supplied");
              permit.send(message);
            }
            Err(e) => {
              let e = ctx.failure(e);
              error!(node = %ctx.name, error = %e, "supplier failed, node detached");
              ctx.report(NodeEvent::Detached {
                node: ctx.name.clone(),
                error: e,
              });
              return;
            }
          }
        }
      }
      (Invocable::StreamSupplier(f), None, Some(output)) => {
        let mut stream = f();
        loop {
          let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
          };
          let Some(out) = next else {
            break;
          };
          if let Err(SendError(message)) = output.send(ctx.emit(out)).await {
            ctx.reject(message, "downstream closed");
            break;
          }
        }
      }
      (Invocable::Function(f), Some(mut input), Some(output)) => {
        while let Some(message) = input.recv().await {
          let Some(message) = ctx.prepare(message) else {
            continue;
          };
          let permit = match output.reserve().await {
            Ok(permit) => permit,
            Err(_) => {
              ctx.reject(message, "downstream closed");
              break;
            }
          };
          match f(ctx.input_for(&message)).await {
            Ok(out) => permit.send(ctx.forward(out, &message)),
            Err(e) => {
              let e = ctx.failure(e);
              warn!(node = %ctx.name, id = %message.id(), error = %e, "invocation failed, message nacked");
              let _ = message.nack(e);
            }
          }
        }
      }
      (Invocable::Consumer(f), Some(mut input), None) => {
        while let Some(message) = input.recv().await {
          let Some(message) = ctx.prepare(message) else {
            continue;
          };
          match f(ctx.input_for(&message)).await {
            Ok(()) => {
              let _ = message.ack();
            }
            Err(e) => {
              let e = ctx.failure(e);
              let _ = message.nack(e.clone());
              ctx.detach(Some(&mut input), e);
              return;
            }
          }
        }
      }
      (Invocable::StreamTransformer(f), Some(input), Some(output)) => {
        let pending = Arc::new(PendingAcks::default());
        let input = Arc::new(Mutex::new(input));
        let mut outputs = f(ctx.input_stream(input, Arc::clone(&pending), false));
        while let Some(out) = outputs.next().await {
          let message = ctx.emit_from(out, pending.take());
          if let Err(SendError(message)) = output.send(message).await {
            ctx.reject(message, "downstream closed");
            break;
          }
        }
        drop(outputs);
        if ctx.input_flavor() == Flavor::Payload {
          pending.settle_all(&Settlement::Acked);
        }
      }
      (Invocable::StreamConsumer(f), Some(input), None) => {
        let pending = Arc::new(PendingAcks::default());
        let input = Arc::new(Mutex::new(input));
        let result = f(ctx.input_stream(Arc::clone(&input), Arc::clone(&pending), true)).await;
        match result {
          Ok(()) => {
            if ctx.input_flavor() == Flavor::Payload {
              pending.settle_all(&Settlement::Acked);
            }
          }
          Err(e) => {
            let e = ctx.failure(e);
            pending.settle_all(&Settlement::Nacked(Arc::new(e.clone())));
            match input.try_lock() {
              Ok(mut receiver) => ctx.detach(Some(&mut *receiver), e),
              Err(_) => ctx.detach(None, e),
            }
            return;
          }
        }
      }
      (invocable, input, output) => {
        error!(
          node = %ctx.name,
          family = invocable.family(),
          has_input = input.is_some(),
          has_output = output.is_some(),
          "handler cannot be wired to its channels"
        );
        return;
      }
    }

    debug!(node = %ctx.name, "node completed");
    ctx.report(NodeEvent::Completed {
      node: ctx.name.clone(),
    });
  }
}
