//! Kafka Relay Client Library
//!
//! Acknowledged publishing and timeout-bounded receiving against a Kafka
//! broker cluster, plus an in-memory broker for tests.

pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
pub mod message;
pub mod publisher;
pub mod receiver;
pub mod session;

pub use config::{ClientConfig, PublisherConfig, ReceiverConfig};
pub use connection::{BrokerConnection, KafkaSession};
pub use error::{ClientError, ErrorKind, Result};
pub use memory::{MemoryBroker, MemorySession};
pub use message::{Delivery, FetchedRecord, Message, MessageBuilder, ReceivedMessage, StartPosition};
pub use publisher::{PublishResult, Publisher, PublisherMetrics};
pub use receiver::{receive, CloseReason, Receiver, ReceiverState};
pub use session::{Connector, Session};
