use crate::constants::stream::TOPIC_CAPACITY;
use crate::models::{StreamEvent, StreamEventKind};
use crate::services::logger::Logger;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Fan-out message bus keyed by task id. Every subscriber of a topic sees
/// every event published after it subscribed, in publish order. There is no
/// backlog: late subscribers receive nothing.
pub struct EventBus {
    logger: Logger,
    topics: DashMap<String, broadcast::Sender<StreamEvent>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("bus"),
            topics: DashMap::new(),
            capacity: TOPIC_CAPACITY,
        }
    }

    fn topic(&self, task_id: &str) -> broadcast::Sender<StreamEvent> {
        self.topics
            .entry(task_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn publish(&self, task_id: &str, kind: StreamEventKind, payload: impl Into<String>) {
        let event = StreamEvent::new(kind, payload);
        self.logger.debug(
            &format!("publish task={} type={}", task_id, kind.as_str()),
            None,
        );
        // send fails only when no observer is connected; events are transient.
        let _ = self.topic(task_id).send(event);
    }

    pub fn subscribe(&self, task_id: &str) -> broadcast::Receiver<StreamEvent> {
        self.topic(task_id).subscribe()
    }

    pub fn close(&self, task_id: &str) {
        self.topics.remove(task_id);
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

/// Relays one task's stream to one observer channel until a terminal event
/// (`done` or `error`) is seen or the observer goes away.
pub struct StreamBridge {
    logger: Logger,
    bus: Arc<EventBus>,
}

impl StreamBridge {
    pub fn new(logger: Logger, bus: Arc<EventBus>) -> Self {
        Self {
            logger: logger.child("bridge"),
            bus,
        }
    }

    pub async fn relay(&self, task_id: &str, out: mpsc::Sender<StreamEvent>) {
        let mut rx = self.bus.subscribe(task_id);
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = event.kind.is_terminal();
                    if out.send(event).await.is_err() {
                        break;
                    }
                    if terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.logger.warn(
                        &format!(
                            "observer lagged on task {}, skipped {} event(s)",
                            task_id, skipped
                        ),
                        None,
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
