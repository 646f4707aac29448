use crate::error::{ClientError, Result};
use crate::message::StartPosition;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for reaching the broker cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Bootstrap broker endpoints (`host:port`)
    pub brokers: Vec<String>,

    /// Client ID reported to the broker
    pub client_id: Option<String>,

    /// Upper bound on establishing a session
    pub connect_timeout: Duration,

    /// How long transient broker failures are retried before they surface as
    /// errors. Keep it below the receiver idle timeout, or a lost broker ends
    /// the sequence as idle instead of failed.
    pub retry_deadline: Duration,
}

/// Publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// How long to wait for the broker to acknowledge a write
    pub ack_timeout: Duration,

    /// Partition every message is written to
    pub partition: i32,
}

/// Receiver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Start from the oldest retained offset instead of only new messages
    pub from_earliest: bool,

    /// End the sequence when nothing arrives within this window
    pub idle_timeout: Duration,

    /// Hard cap on the number of messages handed out
    pub max_messages: Option<usize>,

    /// Partition to read from
    pub partition: i32,

    /// Longest single broker long-poll; clipped to the remaining idle budget
    pub max_wait: Duration,

    /// Upper bound on bytes requested per fetch
    pub fetch_max_bytes: i32,

    /// Treat payloads that are not valid UTF-8 as malformed
    pub require_utf8: bool,
}

impl ClientConfig {
    /// Build a config from a comma-separated broker list such as
    /// `"kafka-1:9092,kafka-2:9092"`.
    pub fn from_connection_string(brokers: &str) -> Result<Self> {
        let brokers: Vec<String> = brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect();

        let config = Self {
            brokers,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the broker list and timeouts
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            return Err(ClientError::InvalidConfig(
                "at least one broker endpoint is required".to_string(),
            ));
        }

        for broker in &self.brokers {
            let valid = broker
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(ClientError::InvalidConfig(format!(
                    "broker endpoint '{}' must be host:port",
                    broker
                )));
            }
        }

        if self.connect_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }

        if self.retry_deadline.is_zero() {
            return Err(ClientError::InvalidConfig(
                "retry_deadline must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "idle_timeout must be greater than 0".to_string(),
            ));
        }
        if self.max_wait.is_zero() {
            return Err(ClientError::InvalidConfig(
                "max_wait must be greater than 0".to_string(),
            ));
        }
        if self.fetch_max_bytes <= 0 {
            return Err(ClientError::InvalidConfig(
                "fetch_max_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Where a fresh subscription starts
    pub fn start_position(&self) -> StartPosition {
        if self.from_earliest {
            StartPosition::Earliest
        } else {
            StartPosition::Latest
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            client_id: None,
            connect_timeout: Duration::from_secs(10),
            retry_deadline: Duration::from_secs(2),
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(30),
            partition: 0,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            from_earliest: false,
            idle_timeout: Duration::from_millis(5000),
            max_messages: None,
            partition: 0,
            max_wait: Duration::from_millis(500),
            fetch_max_bytes: 1024 * 1024,
            require_utf8: false,
        }
    }
}
