use crate::{
    config::ClientConfig,
    error::{ClientError, Result},
    message::{Delivery, FetchedRecord, Message, StartPosition},
    session::{Connector, Session},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use rskafka::{
    client::{
        partition::{Compression, OffsetAt, PartitionClient, UnknownTopicHandling},
        Client, ClientBuilder,
    },
    record::Record,
    BackoffConfig,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Connector that opens Kafka sessions against a fixed broker list
#[derive(Debug, Clone)]
pub struct BrokerConnection {
    config: Arc<ClientConfig>,
}

impl BrokerConnection {
    /// Create a connector; no network traffic happens until [`Connector::connect`]
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Shorthand for a comma-separated `host:port` list
    pub fn from_connection_string(brokers: &str) -> Result<Self> {
        Self::new(ClientConfig::from_connection_string(brokers)?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn client_id(&self) -> String {
        self.config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("kafka-relay-{}", Uuid::new_v4()))
    }

    /// Bounded retries, so a broker lost mid-session surfaces as an error
    fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            base: 3.0,
            deadline: Some(self.config.retry_deadline),
        }
    }
}

#[async_trait]
impl Connector for BrokerConnection {
    #[instrument(skip(self), fields(brokers = ?self.config.brokers))]
    async fn connect(&self) -> Result<Box<dyn Session>> {
        let client_id = self.client_id();
        let connect_timeout = self.config.connect_timeout;

        debug!("Connecting to {} broker(s) as {}", self.config.brokers.len(), client_id);

        let builder = ClientBuilder::new(self.config.brokers.clone())
            .client_id(client_id.clone())
            .backoff_config(self.backoff_config());
        let client = match timeout(connect_timeout, builder.build()).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ClientError::Connection(format!(
                    "could not reach {} within {}ms",
                    self.config.brokers.join(","),
                    connect_timeout.as_millis()
                )));
            }
        };

        info!("Opened Kafka session {}", client_id);
        Ok(Box::new(KafkaSession::new(client_id, client)))
    }
}

/// A Kafka session: one client plus the partition clients it has resolved
pub struct KafkaSession {
    id: String,
    client: Option<Client>,
    partitions: HashMap<(String, i32), PartitionClient>,
}

impl KafkaSession {
    fn new(id: String, client: Client) -> Self {
        Self {
            id,
            client: Some(client),
            partitions: HashMap::new(),
        }
    }

    async fn partition_client(&mut self, topic: &str, partition: i32) -> Result<&PartitionClient> {
        let key = (topic.to_string(), partition);

        if !self.partitions.contains_key(&key) {
            let client = self
                .client
                .as_ref()
                .ok_or_else(|| ClientError::session_closed(&self.id))?;

            // Unknown topics are surfaced instead of waited on
            let partition_client = client
                .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error)
                .await?;

            debug!("Session {} resolved {}/{}", self.id, topic, partition);
            self.partitions.insert(key.clone(), partition_client);
        }

        self.partitions
            .get(&key)
            .ok_or_else(|| ClientError::unknown("partition lookup", &key))
    }
}

#[async_trait]
impl Session for KafkaSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn produce(&mut self, topic: &str, partition: i32, message: &Message) -> Result<Delivery> {
        if self.is_closed() {
            return Err(ClientError::session_closed(&self.id));
        }

        let record = Record {
            key: message.key().map(|k| k.as_bytes().to_vec()),
            value: Some(message.payload().to_vec()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let partition_client = self.partition_client(topic, partition).await?;
        let offsets = partition_client
            .produce(vec![record], Compression::NoCompression)
            .await?;

        match offsets.first() {
            Some(&offset) => Ok(Delivery { partition, offset }),
            None => Err(ClientError::unknown("produce", "broker acknowledged without an offset")),
        }
    }

    async fn resolve_offset(&mut self, topic: &str, partition: i32, position: StartPosition) -> Result<i64> {
        if self.is_closed() {
            return Err(ClientError::session_closed(&self.id));
        }

        let at = match position {
            StartPosition::Earliest => OffsetAt::Earliest,
            StartPosition::Latest => OffsetAt::Latest,
        };

        let partition_client = self.partition_client(topic, partition).await?;
        Ok(partition_client.get_offset(at).await?)
    }

    async fn fetch(
        &mut self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_wait: Duration,
        max_bytes: i32,
    ) -> Result<Vec<FetchedRecord>> {
        if self.is_closed() {
            return Err(ClientError::session_closed(&self.id));
        }

        let max_wait_ms = i32::try_from(max_wait.as_millis()).unwrap_or(i32::MAX);
        let partition_client = self.partition_client(topic, partition).await?;
        let (records, high_watermark) = partition_client
            .fetch_records(offset, 1..max_bytes, max_wait_ms)
            .await?;

        debug!(
            "Fetched {} record(s) from {}/{} at offset {} (high watermark {})",
            records.len(),
            topic,
            partition,
            offset,
            high_watermark
        );

        // Batches may start before the requested offset
        Ok(records
            .into_iter()
            .filter(|r| r.offset >= offset)
            .map(|r| FetchedRecord {
                offset: r.offset,
                key: r.record.key.map(Bytes::from),
                value: r.record.value.map(Bytes::from),
            })
            .collect())
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            self.partitions.clear();
            info!("Closed Kafka session {}", self.id);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.is_none()
    }
}

impl Drop for KafkaSession {
    fn drop(&mut self) {
        if self.client.is_some() {
            warn!("Kafka session {} dropped without close, releasing", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_rejects_invalid_broker_list() {
        let result = BrokerConnection::from_connection_string("");
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));

        let result = BrokerConnection::from_connection_string("invalid_address");
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn test_generated_client_id() {
        let connection = BrokerConnection::from_connection_string("localhost:9092").unwrap();
        assert!(connection.client_id().starts_with("kafka-relay-"));

        let connection = BrokerConnection::new(ClientConfig {
            brokers: vec!["localhost:9092".to_string()],
            client_id: Some("relay-test".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(connection.client_id(), "relay-test");
    }

    #[test]
    fn test_retries_are_bounded() {
        let connection = BrokerConnection::new(ClientConfig {
            brokers: vec!["localhost:9092".to_string()],
            retry_deadline: Duration::from_millis(750),
            ..Default::default()
        })
        .unwrap();

        let backoff = connection.backoff_config();
        assert_eq!(backoff.deadline, Some(Duration::from_millis(750)));
        assert!(backoff.init_backoff < Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_a_connection_error() {
        // Nothing listens on port 1
        let connection = BrokerConnection::new(ClientConfig {
            brokers: vec!["127.0.0.1:1".to_string()],
            connect_timeout: Duration::from_millis(300),
            ..Default::default()
        })
        .unwrap();

        let result = connection.connect().await;
        match result {
            Err(e) => assert_eq!(e.kind(), crate::error::ErrorKind::ConnectionError),
            Ok(_) => panic!("expected connection failure"),
        }
    }
}
