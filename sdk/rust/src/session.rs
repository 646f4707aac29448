//! The seam between the relay and whatever broker it talks to.
//!
//! A [`Session`] is one exclusively-owned connection to the broker. Publishers
//! and receivers take a session by value and close it on every exit path, so a
//! session is never shared between two components. [`Connector`] hands out
//! fresh sessions; [`crate::connection::BrokerConnection`] does it for Kafka and
//! [`crate::memory::MemoryBroker`] for tests.

use crate::{
    error::Result,
    message::{Delivery, FetchedRecord, Message, StartPosition},
};
use async_trait::async_trait;
use std::time::Duration;

/// An open session with the broker
#[async_trait]
pub trait Session: Send {
    /// Identifier used in log lines
    fn id(&self) -> &str;

    /// Write one message and wait for the broker to acknowledge it
    async fn produce(&mut self, topic: &str, partition: i32, message: &Message) -> Result<Delivery>;

    /// Resolve the offset a subscription starting at `position` reads first
    async fn resolve_offset(&mut self, topic: &str, partition: i32, position: StartPosition) -> Result<i64>;

    /// Fetch records at or after `offset`, waiting up to `max_wait` for data.
    /// An empty vector means nothing arrived in time.
    async fn fetch(
        &mut self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_wait: Duration,
        max_bytes: i32,
    ) -> Result<Vec<FetchedRecord>>;

    /// Release the session. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Opens new sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Session>>;
}
