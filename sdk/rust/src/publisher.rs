use crate::{
    config::PublisherConfig,
    error::{ClientError, ErrorKind, Result},
    message::{Delivery, Message},
    session::{Connector, Session},
};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Publishes messages one at a time and waits for the broker to acknowledge each
///
/// A publisher owns its session exclusively. `publish` and `send` take
/// `&mut self`, so there is never more than one unacknowledged message in
/// flight.
///
/// # Example
///
/// ```rust,no_run
/// use kafka_relay_client::{BrokerConnection, Publisher, PublisherConfig};
///
/// # async fn run() -> kafka_relay_client::Result<()> {
/// let connection = BrokerConnection::from_connection_string("localhost:9092")?;
/// let mut publisher = Publisher::connect(&connection, PublisherConfig::default()).await?;
///
/// let result = publisher.publish("test_topic", &b"Hello, Kafka!"[..]).await;
/// if result.delivered {
///     println!("stored at offset {:?}", result.offset);
/// }
/// publisher.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Publisher {
    session: Box<dyn Session>,
    config: PublisherConfig,
    cancel: CancellationToken,
    metrics: Arc<PublisherMetrics>,
}

/// Outcome of one publish attempt
///
/// Failures are reported here rather than through `Err`, so a caller wrapping
/// the publisher (a retry loop, the CLI) handles every outcome the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub delivered: bool,
    pub topic: String,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub error: Option<ClientError>,
}

/// Publisher counters
#[derive(Debug, Default)]
pub struct PublisherMetrics {
    pub messages_sent: AtomicU64,
    pub messages_failed: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl PublishResult {
    fn delivered(topic: String, delivery: Delivery) -> Self {
        Self {
            delivered: true,
            topic,
            partition: Some(delivery.partition),
            offset: Some(delivery.offset),
            error: None,
        }
    }

    fn failed(topic: String, error: ClientError) -> Self {
        Self {
            delivered: false,
            topic,
            partition: None,
            offset: None,
            error: Some(error),
        }
    }

    /// Classification of the failure, if any
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(ClientError::kind)
    }

    /// Convert into a `Result` for callers that prefer `?`
    pub fn into_result(self) -> Result<Delivery> {
        match (self.error, self.partition, self.offset) {
            (Some(error), _, _) => Err(error),
            (None, Some(partition), Some(offset)) => Ok(Delivery { partition, offset }),
            _ => Err(ClientError::unknown("publish result", "delivered without an offset")),
        }
    }
}

impl Publisher {
    /// Wrap an already-open session
    pub fn new(session: Box<dyn Session>, config: PublisherConfig) -> Self {
        Self {
            session,
            config,
            cancel: CancellationToken::new(),
            metrics: Arc::new(PublisherMetrics::default()),
        }
    }

    /// Open a fresh session from `connector` and wrap it
    pub async fn connect(connector: &dyn Connector, config: PublisherConfig) -> Result<Self> {
        let session = connector.connect().await?;
        info!("Created publisher on session {}", session.id());
        Ok(Self::new(session, config))
    }

    /// Abort the acknowledgement wait and close the session when `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Publish `payload` to `topic` and wait for the broker acknowledgement
    ///
    /// Returns `delivered=true` with the broker-assigned partition and offset
    /// once the broker has confirmed the write. Any failure comes back as
    /// `delivered=false` with a classified error:
    ///
    /// * `BrokerRejected` - empty topic name, or the broker refused the write
    /// * `ConnectionError` - the session is closed or the broker is unreachable
    /// * `Timeout` - no acknowledgement within `ack_timeout`
    /// * `Cancelled` - the cancellation token fired; the session is closed
    pub async fn publish<T: Into<Bytes>>(&mut self, topic: &str, payload: T) -> PublishResult {
        let message = Message::builder().topic(topic).payload(payload).build();
        self.send(message).await
    }

    /// Publish a prepared message. The message must carry a topic.
    pub async fn send(&mut self, message: Message) -> PublishResult {
        let topic = message.topic().unwrap_or_default().to_string();

        if topic.is_empty() {
            return self.fail(
                topic,
                ClientError::BrokerRejected("topic name must not be empty".to_string()),
            );
        }

        if message.payload().is_empty() {
            warn!("Publishing an empty payload to {}", topic);
        }

        if self.session.is_closed() {
            return self.fail(topic, ClientError::session_closed(self.session.id()));
        }

        let ack_timeout = self.config.ack_timeout;
        let partition = self.config.partition;

        debug!(
            "Publishing {} bytes to {}/{} on session {}",
            message.payload().len(),
            topic,
            partition,
            self.session.id()
        );

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            ack = timeout(ack_timeout, self.session.produce(&topic, partition, &message)) => {
                match ack {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::timeout(ack_timeout)),
                }
            }
        };

        match outcome {
            Ok(delivery) => {
                self.metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .bytes_sent
                    .fetch_add(message.payload().len() as u64, Ordering::Relaxed);
                info!(
                    "Published to {}/{} at offset {}",
                    topic, delivery.partition, delivery.offset
                );
                PublishResult::delivered(topic, delivery)
            }
            Err(ClientError::Cancelled) => {
                if let Err(e) = self.session.close().await {
                    warn!("Failed to close session {} after cancellation: {}", self.session.id(), e);
                }
                self.fail(topic, ClientError::Cancelled)
            }
            Err(e) => self.fail(topic, e),
        }
    }

    fn fail(&self, topic: String, error: ClientError) -> PublishResult {
        self.metrics.messages_failed.fetch_add(1, Ordering::Relaxed);
        error!("Failed to publish to '{}' [{}]: {}", topic, error.kind(), error);
        PublishResult::failed(topic, error)
    }

    /// Close the session. Dropping the publisher releases it as well.
    pub async fn close(mut self) -> Result<()> {
        self.session.close().await?;
        info!("Publisher on session {} closed", self.session.id());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<PublisherMetrics> {
        Arc::clone(&self.metrics)
    }
}
