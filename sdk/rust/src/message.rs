use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An outgoing message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Bytes,
    topic: Option<String>,
    key: Option<String>,
}

/// Builder for creating messages
#[derive(Debug, Default)]
pub struct MessageBuilder {
    topic: Option<String>,
    key: Option<String>,
    payload: Option<Bytes>,
}

impl MessageBuilder {
    /// Create a new message builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set topic
    pub fn topic<T: Into<String>>(mut self, topic: T) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set message key
    pub fn key<T: Into<String>>(mut self, key: T) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set message payload
    pub fn payload<T: Into<Bytes>>(mut self, payload: T) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Build the message. A missing payload is treated as empty.
    pub fn build(self) -> Message {
        Message {
            payload: self.payload.unwrap_or_default(),
            topic: self.topic,
            key: self.key,
        }
    }
}

impl Message {
    /// Message with a payload and nothing else
    pub fn new<T: Into<Bytes>>(payload: T) -> Self {
        Self {
            payload: payload.into(),
            topic: None,
            key: None,
        }
    }

    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// A message pulled off a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub payload: Bytes,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub received_at: DateTime<Utc>,
}

impl ReceivedMessage {
    /// Payload as UTF-8 text, if it is valid UTF-8
    pub fn payload_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Where a new subscription begins reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartPosition {
    /// Oldest retained offset
    Earliest,

    /// Only messages written after the subscription starts
    Latest,
}

/// Broker acknowledgement of a single write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// A raw record as returned by a session fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRecord {
    pub offset: i64,
    pub key: Option<Bytes>,
    /// `None` for records without a value, which the receiver treats as malformed
    pub value: Option<Bytes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let message = Message::builder()
            .topic("test_topic")
            .key("user-1")
            .payload(&b"Hello, Kafka!"[..])
            .build();

        assert_eq!(message.topic(), Some("test_topic"));
        assert_eq!(message.key(), Some("user-1"));
        assert_eq!(message.payload().as_ref(), b"Hello, Kafka!");
    }

    #[test]
    fn test_missing_payload_is_empty() {
        let message = MessageBuilder::new().topic("t").build();
        assert!(message.payload().is_empty());
        assert_eq!(message.key(), None);
    }

    #[test]
    fn test_payload_as_str() {
        let mut received = ReceivedMessage {
            payload: Bytes::from_static(b"hello"),
            topic: "t".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            received_at: Utc::now(),
        };
        assert_eq!(received.payload_as_str(), Some("hello"));

        received.payload = Bytes::from_static(&[0xff, 0xfe]);
        assert_eq!(received.payload_as_str(), None);
    }
}
