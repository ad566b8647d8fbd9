use crate::acknowledgement::{Acknowledgement, Settlement};
use crate::error::{AcknowledgmentError, InvocationError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_ack_settles_once() {
  let ack = Acknowledgement::new("m1");
  assert!(!ack.is_settled());
  ack.ack().unwrap();
  assert!(ack.is_settled());
  assert!(ack.outcome().unwrap().is_acked());

  let second = ack.nack(InvocationError::new("late"));
  assert_eq!(
    second,
    Err(AcknowledgmentError::AlreadySettled {
      message: "m1".to_string()
    })
  );
  assert!(ack.outcome().unwrap().is_acked());
}

#[test]
fn test_clones_share_settlement() {
  let ack = Acknowledgement::new("m1");
  let clone = ack.clone();
  clone.nack(InvocationError::new("boom")).unwrap();
  assert!(ack.outcome().unwrap().is_nacked());
  assert!(ack.same_as(&clone));
  assert!(!ack.same_as(&Acknowledgement::new("m2")));
}

#[test]
fn test_callback_runs_exactly_once() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counted = Arc::clone(&calls);
  let ack = Acknowledgement::with_callback("m1", move |_| {
    counted.fetch_add(1, Ordering::SeqCst);
  });
  ack.ack().unwrap();
  let _ = ack.ack();
  let _ = ack.nack(InvocationError::new("again"));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_callback_after_settlement_runs_immediately() {
  let ack = Acknowledgement::new("m1");
  ack.ack().unwrap();
  let seen = Arc::new(AtomicUsize::new(0));
  let counted = Arc::clone(&seen);
  ack.on_settle(move |settlement| {
    assert!(settlement.is_acked());
    counted.fetch_add(1, Ordering::SeqCst);
  });
  assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_drop_unsettled_is_abandoned() {
  let ack = Acknowledgement::new("lost");
  let handle = ack.watch();
  drop(ack);
  assert!(handle.current().unwrap().is_abandoned());
}

#[test]
fn test_chain_forwards_upstream() {
  let upstream = Acknowledgement::new("in");
  let downstream = upstream.chain("out");
  assert!(!upstream.is_settled());
  downstream.ack().unwrap();
  assert!(upstream.outcome().unwrap().is_acked());
}

#[test]
fn test_split_acks_after_every_branch() {
  let parent = Acknowledgement::new("p");
  let children = parent.split(3);
  assert_eq!(children.len(), 3);
  children[0].ack().unwrap();
  children[1].ack().unwrap();
  assert!(!parent.is_settled());
  children[2].ack().unwrap();
  assert!(parent.outcome().unwrap().is_acked());
}

#[test]
fn test_split_nacks_on_first_branch_failure() {
  let parent = Acknowledgement::new("p");
  let children = parent.split(2);
  children[1].nack(InvocationError::new("branch failed")).unwrap();
  match parent.outcome() {
    Some(Settlement::Nacked(error)) => assert_eq!(error.reason, "branch failed"),
    other => panic!("expected a nack, got {:?}", other),
  }
  children[0].ack().unwrap();
  assert!(parent.outcome().unwrap().is_nacked());
}

#[test]
fn test_split_zero_branches_acks() {
  let parent = Acknowledgement::new("p");
  assert!(parent.split(0).is_empty());
  assert!(parent.outcome().unwrap().is_acked());
}

#[tokio::test]
async fn test_settlement_handle_waits() {
  let ack = Acknowledgement::new("m1");
  let handle = ack.watch();
  let settler = ack.clone();
  tokio::spawn(async move {
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    settler.ack().unwrap();
  });
  assert!(handle.wait().await.is_acked());
}

#[test]
fn test_settled_handle_resolves_without_runtime() {
  let ack = Acknowledgement::new("m5");
  let handle = ack.watch();
  ack.nack(InvocationError::new("rejected")).unwrap();
  assert!(tokio_test::block_on(handle.wait()).is_nacked());
}

#[test]
fn test_joined_settles_every_upstream() {
  let first = Acknowledgement::new("a");
  let second = Acknowledgement::new("b");
  let joined = Acknowledgement::joined("a+b", vec![first.clone(), second.clone()]);
  joined.nack(InvocationError::new("downstream failed")).unwrap();
  assert!(first.outcome().unwrap().is_nacked());
  assert!(second.outcome().unwrap().is_nacked());
}

#[test]
fn test_joined_keeps_earlier_outcome() {
  let settled = Acknowledgement::new("early");
  settled.ack().unwrap();
  let joined = Acknowledgement::joined("late", vec![settled.clone()]);
  joined.nack(InvocationError::new("too late")).unwrap();
  assert!(settled.outcome().unwrap().is_acked());
}
