use rskafka::client::error::{Error as KafkaError, ProtocolError};
use rskafka::BackoffError;
use std::fmt;
use thiserror::Error;
use tracing::error;

/// Result type alias for relay client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while publishing to or receiving from the broker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Broker unreachable, connection dropped or session already closed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Broker refused the request (unknown topic, invalid request, ...)
    #[error("Broker rejected request: {0}")]
    BrokerRejected(String),

    /// Acknowledgement or fetch wait exceeded its bound
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A record could not be decoded into a message
    #[error("Malformed message at offset {offset}: {reason}")]
    MalformedMessage { offset: i64, reason: String },

    /// The caller's cancellation signal fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Anything that could not be classified
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Coarse classification of a [`ClientError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionError,
    BrokerRejected,
    Timeout,
    MalformedMessage,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Stable name used in log lines and CLI output
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::BrokerRejected => "BrokerRejected",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::MalformedMessage => "MalformedMessage",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClientError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Connection(_) | ClientError::InvalidConfig(_) => ErrorKind::ConnectionError,
            ClientError::BrokerRejected(_) => ErrorKind::BrokerRejected,
            ClientError::Timeout { .. } => ErrorKind::Timeout,
            ClientError::MalformedMessage { .. } => ErrorKind::MalformedMessage,
            ClientError::Cancelled => ErrorKind::Cancelled,
            ClientError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Build an `Unknown` error, logging the full context first
    pub fn unknown(context: &str, err: impl fmt::Debug) -> Self {
        error!("Unclassified failure during {}: {:?}", context, err);
        ClientError::Unknown(format!("{}: {:?}", context, err))
    }

    /// Error returned by every operation on a closed session
    pub(crate) fn session_closed(session_id: &str) -> Self {
        ClientError::Connection(format!("session {} is closed", session_id))
    }

    pub(crate) fn timeout(after: std::time::Duration) -> Self {
        ClientError::Timeout { timeout_ms: after.as_millis() as u64 }
    }
}

impl From<KafkaError> for ClientError {
    fn from(err: KafkaError) -> Self {
        match err {
            KafkaError::Connection(e) => ClientError::Connection(e.to_string()),
            KafkaError::Request(e) => ClientError::Connection(e.to_string()),
            KafkaError::ServerError { protocol_error, .. } => match protocol_error {
                ProtocolError::RequestTimedOut => ClientError::Timeout { timeout_ms: 0 },
                ProtocolError::CorruptMessage => ClientError::MalformedMessage {
                    offset: -1,
                    reason: format!("{:?}", protocol_error),
                },
                other => ClientError::BrokerRejected(format!("{:?}", other)),
            },
            KafkaError::InvalidResponse(reason) => ClientError::MalformedMessage { offset: -1, reason },
            KafkaError::Timeout => ClientError::Timeout { timeout_ms: 0 },
            // An exhausted retry takes the classification of its last failure
            KafkaError::RetryFailed(BackoffError::DeadlineExceded { deadline, source }) => {
                match source.downcast::<KafkaError>() {
                    Ok(last) => ClientError::from(*last),
                    Err(source) => ClientError::Connection(format!(
                        "gave up after {}ms of retries: {}",
                        deadline.as_millis(),
                        source
                    )),
                }
            }
            other => ClientError::unknown("kafka request", other),
        }
    }
}
