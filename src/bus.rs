//! Message-bus client abstraction for production and testing.
//!
//! The pipeline receives its publisher by injection and only sees the
//! [`EventPublisher`] trait, so the NATS connection never becomes process-wide
//! state and tests can capture events without a broker.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::sync::RwLock;

/// NATS header carrying the event key (artefact id or source/date key).
/// NATS subjects have no per-message key the way a partitioned log does, so
/// the key rides along as a header for downstream consumers.
pub const KEY_HEADER: &str = "Msg-Key";

/// A published event, as recorded by [`RecordingPublisher`].
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub payload: Bytes,
}

/// Trait for at-least-once event publishing.
///
/// `publish` returns once the client has accepted the message for delivery.
/// A crash between a store commit and the matching publish can duplicate the
/// event downstream; consumers must be idempotent on the event key.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a keyed payload to a topic.
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()>;
}

/// Serialize `value` as JSON and publish it.
pub async fn publish_json<T: Serialize + Sync>(
    publisher: &dyn EventPublisher,
    topic: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    publisher.publish(topic, key, Bytes::from(payload)).await
}

// Lets callers share one publisher between the pipeline and an inspector
// (tests keep an Arc<RecordingPublisher> while the pipeline owns a clone).
#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for std::sync::Arc<P> {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()> {
        (**self).publish(topic, key, payload).await
    }
}

/// Real NATS client publisher.
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()> {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(KEY_HEADER, key);
        self.client
            .publish_with_headers(topic.to_string(), headers, payload)
            .await?;
        // publish only enqueues; flush waits for the server to take delivery,
        // which is the acknowledgment the at-least-once contract needs.
        self.client.flush().await?;
        Ok(())
    }
}

/// Publisher that records events in memory for testing.
///
/// Lets tests inspect exactly what would have been published without a
/// running broker.
#[derive(Default)]
pub struct RecordingPublisher {
    published: RwLock<Vec<PublishedEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events, in publish order.
    pub fn published_events(&self) -> Vec<PublishedEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Get recorded events for one topic.
    pub fn events_for_topic(&self, topic: &str) -> Vec<PublishedEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Count of events recorded for one topic.
    pub fn publish_count_for(&self, topic: &str) -> usize {
        self.events_for_topic(topic).len()
    }

    /// Deserialize a recorded event's payload as JSON.
    pub fn deserialize_event<T: serde::de::DeserializeOwned>(
        &self,
        event: &PublishedEvent,
    ) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&event.payload)
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()> {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedEvent {
                topic: topic.to_string(),
                key: key.to_string(),
                payload,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_retrieve_events() {
        let bus = RecordingPublisher::new();

        bus.publish("collected_artefacts", "a1", Bytes::from(r#"{"artefactid":"a1"}"#))
            .await
            .unwrap();

        assert_eq!(bus.publish_count_for("collected_artefacts"), 1);
        assert_eq!(bus.publish_count_for("sources"), 0);

        let events = bus.events_for_topic("collected_artefacts");
        assert_eq!(events[0].key, "a1");
    }

    #[tokio::test]
    async fn test_publish_json_serializes_payload() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Payload {
            sourceid: String,
        }

        let bus = RecordingPublisher::new();
        let payload = Payload {
            sourceid: "s1".to_string(),
        };
        publish_json(&bus, "sources", "s1_2024-01-01", &payload)
            .await
            .unwrap();

        let events = bus.events_for_topic("sources");
        let decoded: Payload = bus.deserialize_event(&events[0]).unwrap();
        assert_eq!(decoded.sourceid, "s1");
    }
}
