use keywarden::models::{StreamEvent, StreamEventKind};
use keywarden::services::logger::Logger;
use keywarden::services::stream::{EventBus, StreamBridge};
use std::sync::Arc;
use tokio::sync::mpsc;

fn bus() -> Arc<EventBus> {
    Arc::new(EventBus::new(Logger::new("test")))
}

#[tokio::test]
async fn every_subscriber_sees_every_event_in_publish_order() {
    let bus = bus();
    let mut first = bus.subscribe("t1");
    let mut second = bus.subscribe("t1");

    bus.publish("t1", StreamEventKind::Progress, "one");
    bus.publish("t1", StreamEventKind::Stdout, "two");
    bus.publish("t1", StreamEventKind::Done, "three");

    for rx in [&mut first, &mut second] {
        let payloads: Vec<String> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .iter()
        .map(|e| e.payload.clone())
        .collect();
        assert_eq!(payloads, vec!["one", "two", "three"]);
    }
}

#[tokio::test]
async fn late_subscribers_do_not_see_history() {
    let bus = bus();
    bus.publish("t1", StreamEventKind::Progress, "early");

    let mut rx = bus.subscribe("t1");
    bus.publish("t1", StreamEventKind::Stdout, "late");

    let event = rx.recv().await.unwrap();
    assert_eq!(event.payload, "late");
    assert!(rx.try_recv().is_err(), "no backlog is replayed");
}

#[tokio::test]
async fn topics_are_independent() {
    let bus = bus();
    let mut rx = bus.subscribe("t1");
    bus.publish("t2", StreamEventKind::Progress, "other task");
    bus.publish("t1", StreamEventKind::Progress, "mine");
    assert_eq!(rx.recv().await.unwrap().payload, "mine");
}

#[tokio::test]
async fn closing_a_topic_ends_its_subscribers() {
    let bus = bus();
    let mut rx = bus.subscribe("t1");
    bus.publish("t1", StreamEventKind::Done, "finished");
    bus.close("t1");
    assert_eq!(bus.topic_count(), 0);

    assert_eq!(rx.recv().await.unwrap().payload, "finished");
    assert!(rx.recv().await.is_err(), "channel closed after drain");
}

#[tokio::test]
async fn bridge_relays_until_the_terminal_event() {
    let bus = bus();
    let bridge = StreamBridge::new(Logger::new("test"), bus.clone());
    let (tx, mut out) = mpsc::channel(16);

    let relay = tokio::spawn(async move { bridge.relay("t1", tx).await });
    // give the relay a moment to subscribe; events published before the
    // subscription would be invisible by design
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    bus.publish("t1", StreamEventKind::Progress, "working");
    bus.publish("t1", StreamEventKind::Done, "finished");
    bus.publish("t1", StreamEventKind::Progress, "after the end");

    relay.await.unwrap();
    let mut relayed = Vec::new();
    while let Some(event) = out.recv().await {
        relayed.push(event);
    }
    assert_eq!(relayed.len(), 2);
    assert_eq!(relayed[0].payload, "working");
    assert_eq!(relayed[1].kind, StreamEventKind::Done);
}

#[test]
fn wire_format_carries_ts_type_and_payload() {
    let event = StreamEvent::new(StreamEventKind::Stderr, "boom");
    let wire: serde_json::Value = serde_json::from_str(&event.to_wire()).unwrap();
    assert_eq!(wire.get("type").unwrap(), "stderr");
    assert_eq!(wire.get("payload").unwrap(), "boom");
    let ts = wire.get("ts").unwrap().as_str().unwrap();
    assert!(ts.contains('T'), "ISO-8601 timestamp: {}", ts);
}
