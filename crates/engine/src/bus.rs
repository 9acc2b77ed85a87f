//! Message bus abstraction. The engine only depends on this trait; the
//! concrete transport (Kafka today) is a pluggable implementation so the
//! consume loop can be exercised against an in-memory fake in tests.

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use sentinel_core::{error::Result, Error};
use std::time::Duration;
use tracing::{info, warn};

/// A decoded (but not yet JSON-parsed) message pulled from the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Option<Vec<u8>>,
}

#[async_trait]
pub trait Bus: Send + Sync {
    /// Polls the bus for up to `timeout`, returning whatever messages
    /// arrived (possibly none). A connectivity failure is returned as an
    /// error; the caller is expected to sleep and retry.
    async fn poll_batch(&self, timeout: Duration) -> Result<Vec<BusMessage>>;
}

pub struct KafkaBus {
    consumer: StreamConsumer,
    events_topic: String,
    identities_topic: String,
}

impl KafkaBus {
    pub async fn connect(
        bootstrap_servers: &str,
        group_id: &str,
        events_topic: &str,
        identities_topic: &str,
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| Error::bus_connectivity(format!("failed to create Kafka consumer: {e}")))?;

        consumer
            .subscribe(&[events_topic, identities_topic])
            .map_err(|e| Error::bus_connectivity(format!("failed to subscribe to topics: {e}")))?;

        let bus = Self {
            consumer,
            events_topic: events_topic.to_string(),
            identities_topic: identities_topic.to_string(),
        };

        if let Err(e) = bus.ensure_topics_exist(bootstrap_servers).await {
            warn!("continuing without ensuring topics exist: {}", e);
        }

        Ok(bus)
    }

    async fn ensure_topics_exist(&self, bootstrap_servers: &str) -> Result<()> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .create()
            .map_err(|e| Error::bus_connectivity(format!("failed to create admin client: {e}")))?;

        let topics = [
            NewTopic::new(&self.events_topic, 1, TopicReplication::Fixed(1)),
            NewTopic::new(&self.identities_topic, 1, TopicReplication::Fixed(1)),
        ];

        match admin.create_topics(&topics, &AdminOptions::new()).await {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(topic) => info!("ensured Kafka topic exists: {}", topic),
                        Err((topic, err)) => {
                            warn!("could not verify/create topic {}: {:?}", topic, err);
                        }
                    }
                }
                Ok(())
            }
            Err(e) => Err(Error::bus_connectivity(format!("topic creation call failed: {e}"))),
        }
    }
}

#[async_trait]
impl Bus for KafkaBus {
    async fn poll_batch(&self, timeout: Duration) -> Result<Vec<BusMessage>> {
        let mut messages = Vec::new();

        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(msg)) => {
                messages.push(BusMessage {
                    topic: msg.topic().to_string(),
                    payload: msg.payload().map(|p| p.to_vec()),
                });
            }
            Ok(Err(e)) => return Err(Error::bus_connectivity(format!("Kafka fetch error: {e}"))),
            Err(_) => {}
        }

        Ok(messages)
    }
}

/// In-memory bus used by tests and local development without a broker.
#[derive(Default)]
pub struct MockBus {
    queue: tokio::sync::Mutex<std::collections::VecDeque<BusMessage>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, topic: impl Into<String>, payload: Vec<u8>) {
        self.queue.lock().await.push_back(BusMessage {
            topic: topic.into(),
            payload: Some(payload),
        });
    }
}

#[async_trait]
impl Bus for MockBus {
    async fn poll_batch(&self, _timeout: Duration) -> Result<Vec<BusMessage>> {
        let mut guard = self.queue.lock().await;
        Ok(guard.drain(..).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_bus_returns_pushed_messages_in_order() {
        let bus = MockBus::new();
        bus.push("events", b"first".to_vec()).await;
        bus.push("events", b"second".to_vec()).await;

        let messages = bus.poll_batch(Duration::from_millis(10)).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload.as_deref(), Some(b"first".as_slice()));
        assert_eq!(messages[1].payload.as_deref(), Some(b"second".as_slice()));
    }

    #[tokio::test]
    async fn mock_bus_poll_drains_the_queue() {
        let bus = MockBus::new();
        bus.push("events", b"only".to_vec()).await;

        let first_poll = bus.poll_batch(Duration::from_millis(10)).await.unwrap();
        let second_poll = bus.poll_batch(Duration::from_millis(10)).await.unwrap();

        assert_eq!(first_poll.len(), 1);
        assert!(second_poll.is_empty());
    }
}
