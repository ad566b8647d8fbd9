//! # Acknowledgement
//!
//! Every message entering the graph carries an [`Acknowledgement`]. It is
//! settled exactly once, as an ack or a nack, by whichever node terminates the
//! message: a plain subscriber, a connector sink, or a handler that owns the
//! message outright.
//!
//! Settlement is idempotent. The first call wins; later calls return
//! [`AcknowledgmentError::AlreadySettled`] and change nothing, which is how
//! tests detect double settlement.
//!
//! A handle whose last clone is dropped while unsettled resolves as
//! [`Settlement::Abandoned`] and the abandonment is logged. Nothing is dropped
//! silently.
//!
//! ## Composition
//!
//! - [`Acknowledgement::chain`]: a downstream handle whose settlement is
//!   forwarded upstream (async message pass-through).
//! - [`Acknowledgement::split`]: one child per fan-out branch; the parent acks
//!   once every child acked and nacks on the first child nack.

use crate::error::{AcknowledgmentError, InvocationError};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{trace, warn};

/// Outcome of a message.
#[derive(Clone, Debug)]
pub enum Settlement {
  /// Processed successfully.
  Acked,
  /// Rejected, with the failure that caused it.
  Nacked(Arc<InvocationError>),
  /// Dropped without being settled.
  Abandoned,
}

impl Settlement {
  /// Returns true for [`Settlement::Acked`].
  #[must_use]
  pub fn is_acked(&self) -> bool {
    matches!(self, Settlement::Acked)
  }

  /// Returns true for [`Settlement::Nacked`].
  #[must_use]
  pub fn is_nacked(&self) -> bool {
    matches!(self, Settlement::Nacked(_))
  }

  /// Returns true for [`Settlement::Abandoned`].
  #[must_use]
  pub fn is_abandoned(&self) -> bool {
    matches!(self, Settlement::Abandoned)
  }
}

type SettleCallback = Box<dyn FnOnce(&Settlement) + Send>;

#[derive(Default)]
struct Inner {
  outcome: Option<Settlement>,
  callbacks: Vec<SettleCallback>,
}

struct AckState {
  label: String,
  inner: Mutex<Inner>,
  outcome_tx: watch::Sender<Option<Settlement>>,
}

impl AckState {
  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn settle(&self, settlement: Settlement) -> Result<(), AcknowledgmentError> {
    let callbacks = {
      let mut inner = self.lock();
      if inner.outcome.is_some() {
        return Err(AcknowledgmentError::AlreadySettled {
          message: self.label.clone(),
        });
      }
      inner.outcome = Some(settlement.clone());
      std::mem::take(&mut inner.callbacks)
    };
    trace!(message = %self.label, ?settlement, "settled");
    self.outcome_tx.send_replace(Some(settlement.clone()));
    for callback in callbacks {
      callback(&settlement);
    }
    Ok(())
  }
}

impl Drop for AckState {
  fn drop(&mut self) {
    let unsettled = self.lock().outcome.is_none();
    if unsettled {
      warn!(message = %self.label, "message dropped without ack or nack, reporting it as abandoned");
      let _ = self.settle(Settlement::Abandoned);
    }
  }
}

/// Shared settlement handle of one message.
///
/// Clones refer to the same settlement.
#[derive(Clone)]
pub struct Acknowledgement {
  state: Arc<AckState>,
}

impl Acknowledgement {
  /// Creates an unsettled handle labelled for diagnostics.
  pub fn new(label: impl Into<String>) -> Self {
    let (outcome_tx, _) = watch::channel(None);
    Self {
      state: Arc::new(AckState {
        label: label.into(),
        inner: Mutex::new(Inner::default()),
        outcome_tx,
      }),
    }
  }

  /// Creates a handle that runs `callback` once settled.
  pub fn with_callback<F>(label: impl Into<String>, callback: F) -> Self
  where
    F: FnOnce(&Settlement) + Send + 'static,
  {
    let ack = Self::new(label);
    ack.on_settle(callback);
    ack
  }

  /// Diagnostic label (usually the message id).
  #[must_use]
  pub fn label(&self) -> &str {
    &self.state.label
  }

  /// Acknowledges positively.
  pub fn ack(&self) -> Result<(), AcknowledgmentError> {
    self.state.settle(Settlement::Acked)
  }

  /// Acknowledges negatively.
  pub fn nack(&self, reason: InvocationError) -> Result<(), AcknowledgmentError> {
    self.state.settle(Settlement::Nacked(Arc::new(reason)))
  }

  /// Settles with an explicit outcome.
  pub fn settle(&self, settlement: Settlement) -> Result<(), AcknowledgmentError> {
    self.state.settle(settlement)
  }

  /// Returns true once settled.
  #[must_use]
  pub fn is_settled(&self) -> bool {
    self.state.lock().outcome.is_some()
  }

  /// Returns the outcome, if settled.
  #[must_use]
  pub fn outcome(&self) -> Option<Settlement> {
    self.state.lock().outcome.clone()
  }

  /// Registers a callback run on settlement, immediately if already settled.
  pub fn on_settle<F>(&self, callback: F)
  where
    F: FnOnce(&Settlement) + Send + 'static,
  {
    let settled = {
      let mut inner = self.state.lock();
      match &inner.outcome {
        Some(outcome) => Some(outcome.clone()),
        None => {
          inner.callbacks.push(Box::new(callback));
          return;
        }
      }
    };
    if let Some(outcome) = settled {
      callback(&outcome);
    }
  }

  /// Returns a waitable view of the outcome that does not keep the message alive.
  #[must_use]
  pub fn watch(&self) -> SettlementHandle {
    SettlementHandle {
      rx: self.state.outcome_tx.subscribe(),
    }
  }

  /// Creates a downstream handle whose settlement is forwarded to `self`.
  #[must_use]
  pub fn chain(&self, label: impl Into<String>) -> Acknowledgement {
    Acknowledgement::joined(label, vec![self.clone()])
  }

  /// Creates a handle whose settlement is forwarded to every handle in
  /// `upstream`. Handles already settled keep their outcome.
  #[must_use]
  pub fn joined(label: impl Into<String>, upstream: Vec<Acknowledgement>) -> Acknowledgement {
    Acknowledgement::with_callback(label, move |settlement| {
      for ack in upstream {
        let _ = ack.settle(settlement.clone());
      }
    })
  }

  /// Splits into `branches` children for fan-out.
  ///
  /// The parent acks when every child acked and takes the first non-ack
  /// outcome otherwise. Zero branches acks the parent immediately.
  #[must_use]
  pub fn split(&self, branches: usize) -> Vec<Acknowledgement> {
    if branches == 0 {
      let _ = self.ack();
      return Vec::new();
    }
    let remaining = Arc::new(AtomicUsize::new(branches));
    (0..branches)
      .map(|branch| {
        let parent = self.clone();
        let remaining = Arc::clone(&remaining);
        Acknowledgement::with_callback(format!("{}/{}", self.label(), branch), move |settlement| {
          match settlement {
            Settlement::Acked => {
              if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let _ = parent.ack();
              }
            }
            other => {
              let _ = parent.settle(other.clone());
            }
          }
        })
      })
      .collect()
  }

  /// Returns true if both handles share the same settlement.
  #[must_use]
  pub fn same_as(&self, other: &Acknowledgement) -> bool {
    Arc::ptr_eq(&self.state, &other.state)
  }
}

impl fmt::Debug for Acknowledgement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Acknowledgement")
      .field("label", &self.state.label)
      .field("outcome", &self.outcome())
      .finish()
  }
}

/// Waits for a settlement without holding the message.
#[derive(Clone, Debug)]
pub struct SettlementHandle {
  rx: watch::Receiver<Option<Settlement>>,
}

impl SettlementHandle {
  /// Resolves once the message is settled.
  pub async fn wait(mut self) -> Settlement {
    let waited = self
      .rx
      .wait_for(Option::is_some)
      .await
      .map(|outcome| (*outcome).clone());
    match waited {
      Ok(Some(settlement)) => settlement,
      _ => self.rx.borrow().clone().unwrap_or(Settlement::Abandoned),
    }
  }

  /// Returns the outcome if already settled.
  #[must_use]
  pub fn current(&self) -> Option<Settlement> {
    self.rx.borrow().clone()
  }
}
