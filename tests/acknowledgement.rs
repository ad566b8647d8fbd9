use futures::StreamExt;
use messageweave::config::{EngineConfig, MessagingConfig};
use messageweave::connectors::{IN_MEMORY, InMemoryConnector};
use messageweave::error::InvocationError;
use messageweave::graph_builder::{GraphBuilder, MediatorDefinition};
use messageweave::handler::{Handler, TypedStream};
use messageweave::lifecycle::NodeEvent;
use messageweave::message::{Message, Payload};
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_consumer_acks_each_message_once() {
  let graph = GraphBuilder::new("acks")
    .emitter::<i32>("numbers")
    .mediator(MediatorDefinition::new("sink", "consume", Handler::consumer(|_: i32| {})).incoming("numbers"))
    .build()
    .unwrap();
  let running = graph.start().await.unwrap();
  let emitter = running.emitter::<i32>("numbers").unwrap();

  let message = Message::of(1i32);
  let ack = message.acknowledgement().clone();
  let settlement = emitter.send_message(message).await.unwrap();
  assert!(timeout(WAIT, settlement.wait()).await.unwrap().is_acked());
  assert!(ack.is_settled());
  assert!(ack.ack().is_err());
  running.shutdown().await;
}

#[tokio::test]
async fn test_failing_consumer_detaches() {
  let graph = GraphBuilder::new("detaching")
    .emitter::<i32>("numbers")
    .mediator(
      MediatorDefinition::new(
        "picky",
        "consume",
        Handler::try_consumer(|v: i32| {
          if v == 2 {
            Err(InvocationError::new("two is not allowed"))
          } else {
            Ok(())
          }
        }),
      )
      .incoming("numbers"),
    )
    .build()
    .unwrap();
  let mut running = graph.start().await.unwrap();
  let emitter = running.emitter::<i32>("numbers").unwrap();

  let first = emitter.send(1).await.unwrap();
  assert!(timeout(WAIT, first.wait()).await.unwrap().is_acked());
  let second = emitter.send(2).await.unwrap();
  match timeout(WAIT, second.wait()).await.unwrap() {
    messageweave::Settlement::Nacked(reason) => {
      assert!(reason.to_string().contains("two is not allowed"));
    }
    other => panic!("expected a nack, got {other:?}"),
  }

  let detached = timeout(WAIT, async {
    loop {
      match running.next_event().await {
        Some(NodeEvent::Detached { node, .. }) => break node,
        Some(_) => continue,
        None => panic!("events ended before the node detached"),
      }
    }
  })
  .await
  .unwrap();
  assert_eq!(detached, "picky#consume");

  let third = emitter.send(3).await.unwrap();
  assert!(timeout(WAIT, third.wait()).await.unwrap().is_nacked());

  let report = running.shutdown().await;
  assert_eq!(report.detached, vec!["picky#consume".to_string()]);
  assert!(!report.is_clean());
}

#[tokio::test]
async fn test_failing_function_nacks_and_continues() {
  let connector = InMemoryConnector::new();
  let sink = connector.sink("out");
  let graph = GraphBuilder::new("lenient")
    .connector(connector.clone())
    .with_config(MessagingConfig::new().outgoing("out", IN_MEMORY))
    .emitter::<i32>("numbers")
    .mediator(
      MediatorDefinition::new(
        "inverse",
        "compute",
        Handler::try_function(|v: i32| {
          if v == 0 {
            Err(InvocationError::new("division by zero"))
          } else {
            Ok(100 / v)
          }
        }),
      )
      .incoming("numbers")
      .outgoing("out"),
    )
    .build()
    .unwrap();
  let running = graph.start().await.unwrap();
  let emitter = running.emitter::<i32>("numbers").unwrap();

  let zero = emitter.send(0).await.unwrap();
  let four = emitter.send(4).await.unwrap();
  assert!(timeout(WAIT, zero.wait()).await.unwrap().is_nacked());
  assert!(timeout(WAIT, four.wait()).await.unwrap().is_acked());
  assert_eq!(sink.payloads::<i32>(), vec![25]);

  let report = running.shutdown().await;
  assert!(report.is_clean(), "{:?}", report);
}

#[tokio::test]
async fn test_message_function_passes_acknowledgement_through() {
  let connector = InMemoryConnector::new();
  let sink = connector.sink("out");
  let graph = GraphBuilder::new("pass-through")
    .connector(connector.clone())
    .with_config(MessagingConfig::new().outgoing("out", IN_MEMORY))
    .emitter::<i32>("numbers")
    .mediator(
      MediatorDefinition::new(
        "enricher",
        "describe",
        Handler::message_function::<i32, String, _>(|message: Message| {
          let value = *message
            .payload_as::<i32>()
            .ok_or_else(|| InvocationError::new("not a number"))?;
          Ok(message.with_payload(Payload::new(format!("value {value}"))))
        }),
      )
      .incoming("numbers")
      .outgoing("out"),
    )
    .build()
    .unwrap();
  let running = graph.start().await.unwrap();
  let emitter = running.emitter::<i32>("numbers").unwrap();

  let settlement = emitter.send(9).await.unwrap();
  assert!(timeout(WAIT, settlement.wait()).await.unwrap().is_acked());
  assert_eq!(sink.payloads::<String>(), vec!["value 9"]);
  running.shutdown().await;
}

#[tokio::test]
async fn test_fan_out_nacks_when_one_branch_fails() {
  let graph = GraphBuilder::new("fan-out")
    .emitter::<i32>("numbers")
    .mediator(MediatorDefinition::new("happy", "consume", Handler::consumer(|_: i32| {})).incoming("numbers"))
    .mediator(
      MediatorDefinition::new(
        "grumpy",
        "consume",
        Handler::try_consumer(|_: i32| Err(InvocationError::new("no thanks"))),
      )
      .incoming("numbers"),
    )
    .build()
    .unwrap();
  let running = graph.start().await.unwrap();
  let emitter = running.emitter::<i32>("numbers").unwrap();

  let settlement = emitter.send(1).await.unwrap();
  assert!(timeout(WAIT, settlement.wait()).await.unwrap().is_nacked());
  running.shutdown().await;
}

#[tokio::test]
async fn test_stuck_consumer_is_aborted_and_message_abandoned() {
  let graph = GraphBuilder::new("stuck")
    .with_engine_config(EngineConfig::new().with_shutdown_grace(Duration::from_millis(50)))
    .emitter::<i32>("numbers")
    .mediator(
      MediatorDefinition::new(
        "sleeper",
        "consume",
        Handler::async_consumer(|_: i32| async {
          futures::future::pending::<()>().await;
          Ok::<(), InvocationError>(())
        }),
      )
      .incoming("numbers"),
    )
    .build()
    .unwrap();
  let running = graph.start().await.unwrap();
  let emitter = running.emitter::<i32>("numbers").unwrap();
  let settlement = emitter.send(1).await.unwrap();
  tokio::time::sleep(Duration::from_millis(20)).await;

  let report = running.shutdown().await;
  assert_eq!(report.timed_out, vec!["sleeper#consume".to_string()]);
  assert!(timeout(WAIT, settlement.wait()).await.unwrap().is_abandoned());
}

async fn outcomes(settlements: Vec<messageweave::SettlementHandle>) -> Vec<&'static str> {
  let mut outcomes = Vec::new();
  for settlement in settlements {
    let outcome = timeout(WAIT, settlement.wait()).await.unwrap();
    outcomes.push(match outcome {
      messageweave::Settlement::Acked => "acked",
      messageweave::Settlement::Nacked(_) => "nacked",
      messageweave::Settlement::Abandoned => "abandoned",
    });
  }
  outcomes
}

#[tokio::test]
async fn test_failing_stream_consumer_nacks_in_flight_and_buffered() {
  let graph = GraphBuilder::new("stream-detach")
    .emitter::<i32>("numbers")
    .mediator(
      MediatorDefinition::new(
        "collector",
        "collect",
        Handler::stream_consumer(|mut items: TypedStream<i32>| async move {
          while let Some(v) = items.next().await {
            if v == 2 {
              return Err(InvocationError::new("two breaks the stream"));
            }
          }
          Ok(())
        }),
      )
      .incoming("numbers"),
    )
    .build()
    .unwrap();
  let running = graph.start().await.unwrap();
  let emitter = running.emitter::<i32>("numbers").unwrap();

  let mut settlements = Vec::new();
  for value in 1..=5 {
    settlements.push(emitter.send(value).await.unwrap());
  }
  assert_eq!(
    outcomes(settlements).await,
    vec!["acked", "nacked", "nacked", "nacked", "nacked"]
  );

  let report = running.shutdown().await;
  assert_eq!(report.detached, vec!["collector#collect".to_string()]);
}

#[tokio::test]
async fn test_stream_consumer_acks_everything_on_success() {
  let graph = GraphBuilder::new("stream-ok")
    .emitter::<i32>("numbers")
    .mediator(
      MediatorDefinition::new(
        "collector",
        "collect",
        Handler::stream_consumer(|mut items: TypedStream<i32>| async move {
          while items.next().await.is_some() {}
          Ok::<(), InvocationError>(())
        }),
      )
      .incoming("numbers"),
    )
    .build()
    .unwrap();
  let running = graph.start().await.unwrap();
  let emitter = running.emitter::<i32>("numbers").unwrap();

  let mut settlements = Vec::new();
  for value in 1..=3 {
    settlements.push(emitter.send(value).await.unwrap());
  }
  drop(emitter);
  let report = timeout(WAIT, running.wait_for_completion()).await.unwrap();
  assert!(report.is_clean(), "{:?}", report);
  assert_eq!(outcomes(settlements).await, vec!["acked", "acked", "acked"]);
}

#[tokio::test]
async fn test_stream_transformer_propagates_downstream_nack() {
  let graph = GraphBuilder::new("transform-nack")
    .emitter::<i32>("numbers")
    .mediator(
      MediatorDefinition::new(
        "increment",
        "apply",
        Handler::stream_transformer(|items: TypedStream<i32>| items.map(|v| v + 1)),
      )
      .incoming("numbers")
      .outgoing("incremented"),
    )
    .mediator(
      MediatorDefinition::new(
        "refuser",
        "consume",
        Handler::try_consumer(|_: i32| Err(InvocationError::new("refused"))),
      )
      .incoming("incremented"),
    )
    .build()
    .unwrap();
  let running = graph.start().await.unwrap();
  let emitter = running.emitter::<i32>("numbers").unwrap();

  let settlement = emitter.send(1).await.unwrap();
  assert_eq!(outcomes(vec![settlement]).await, vec!["nacked"]);
  running.shutdown().await;
}

#[tokio::test]
async fn test_stream_transformer_settles_filtered_items_with_next_output() {
  let connector = InMemoryConnector::new();
  let sink = connector.sink("evens");
  let graph = GraphBuilder::new("transform-ack")
    .connector(connector.clone())
    .with_config(MessagingConfig::new().outgoing("evens", IN_MEMORY))
    .emitter::<i32>("numbers")
    .mediator(
      MediatorDefinition::new(
        "evens",
        "keep",
        Handler::stream_transformer(|items: TypedStream<i32>| {
          items.filter(|v| futures::future::ready(v % 2 == 0))
        }),
      )
      .incoming("numbers")
      .outgoing("evens"),
    )
    .build()
    .unwrap();
  let running = graph.start().await.unwrap();
  let emitter = running.emitter::<i32>("numbers").unwrap();

  let mut settlements = Vec::new();
  for value in 1..=4 {
    settlements.push(emitter.send(value).await.unwrap());
  }
  assert_eq!(
    outcomes(settlements).await,
    vec!["acked", "acked", "acked", "acked"]
  );
  assert_eq!(sink.payloads::<i32>(), vec![2, 4]);
  running.shutdown().await;
}
