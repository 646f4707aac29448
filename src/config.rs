use crate::error::{RelayError, Result};
use kafka_relay_client::{ClientConfig, PublisherConfig, ReceiverConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BROKERS: &str = "localhost:9092";
pub const BROKERS_ENV: &str = "KAFKA_RELAY_BROKERS";
pub const CLIENT_ID_ENV: &str = "KAFKA_RELAY_CLIENT_ID";

/// Relay configuration, usually loaded from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub broker: BrokerSection,
    pub publisher: PublisherSection,
    pub subscriber: SubscriberSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    pub brokers: Vec<String>,
    pub client_id: Option<String>,
    pub connect_timeout_ms: u64,
    pub retry_deadline_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSection {
    pub ack_timeout_ms: u64,
    pub partition: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberSection {
    pub idle_timeout_ms: u64,
    pub from_earliest: bool,
    pub max_messages: Option<usize>,
    pub max_wait_ms: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKERS.to_string()],
            client_id: None,
            connect_timeout_ms: 10_000,
            retry_deadline_ms: 2000,
        }
    }
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 30_000,
            partition: 0,
        }
    }
}

impl Default for SubscriberSection {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 5000,
            from_earliest: false,
            max_messages: None,
            max_wait_ms: 500,
        }
    }
}

impl RelayConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: RelayConfig =
            toml::from_str(&content).map_err(|e| RelayError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load from `path` when given, else start from defaults, then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `KAFKA_RELAY_BROKERS` and `KAFKA_RELAY_CLIENT_ID`
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(brokers) = std::env::var(BROKERS_ENV) {
            self.set_brokers(&brokers)?;
        }
        if let Ok(client_id) = std::env::var(CLIENT_ID_ENV) {
            if !client_id.is_empty() {
                self.broker.client_id = Some(client_id);
            }
        }
        Ok(())
    }

    /// Replace the broker list from a comma-separated connection string
    pub fn set_brokers(&mut self, connection_string: &str) -> Result<()> {
        let parsed = ClientConfig::from_connection_string(connection_string)
            .map_err(|e| RelayError::Config(e.to_string()))?;
        self.broker.brokers = parsed.brokers;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.client_config()
            .validate()
            .map_err(|e| RelayError::Config(e.to_string()))?;

        if self.publisher.ack_timeout_ms == 0 {
            return Err(RelayError::Config(
                "publisher.ack_timeout_ms must be greater than 0".to_string(),
            ));
        }

        self.receiver_config()
            .validate()
            .map_err(|e| RelayError::Config(e.to_string()))?;

        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            brokers: self.broker.brokers.clone(),
            client_id: self.broker.client_id.clone(),
            connect_timeout: Duration::from_millis(self.broker.connect_timeout_ms),
            retry_deadline: Duration::from_millis(self.broker.retry_deadline_ms),
        }
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            ack_timeout: Duration::from_millis(self.publisher.ack_timeout_ms),
            partition: self.publisher.partition,
        }
    }

    /// Receiver settings. Payloads are printed as text, so non-UTF-8 records
    /// are rejected as malformed.
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            from_earliest: self.subscriber.from_earliest,
            idle_timeout: Duration::from_millis(self.subscriber.idle_timeout_ms),
            max_messages: self.subscriber.max_messages,
            partition: self.publisher.partition,
            max_wait: Duration::from_millis(self.subscriber.max_wait_ms),
            require_utf8: true,
            ..Default::default()
        }
    }
}
