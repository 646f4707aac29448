//! Command execution for the `kafka-relay` binary.
//!
//! Commands take any [`Connector`] so they run the same against a Kafka
//! cluster and against [`kafka_relay_client::MemoryBroker`]. Message output
//! goes to `out`; diagnostics go through `tracing`.

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use bytes::Bytes;
use kafka_relay_client::{
    ClientError, CloseReason, Connector, Delivery, Publisher, ReceivedMessage, Receiver,
};
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-invocation overrides for `subscribe`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeOptions {
    pub from_earliest: bool,
    pub idle_timeout: Option<Duration>,
    pub max_messages: Option<usize>,
}

/// Publish one message and wait for the broker acknowledgement
pub async fn publish<W: Write>(
    connector: &dyn Connector,
    config: &RelayConfig,
    topic: &str,
    message: &str,
    cancel: CancellationToken,
    out: &mut W,
) -> Result<Delivery> {
    let mut publisher = Publisher::connect(connector, config.publisher_config())
        .await?
        .with_cancellation(cancel);

    let result = publisher
        .publish(topic, Bytes::copy_from_slice(message.as_bytes()))
        .await;

    if let Err(e) = publisher.close().await {
        warn!("Failed to close publisher session: {}", e);
    }

    let delivery = result.into_result().map_err(RelayError::Delivery)?;
    writeln!(
        out,
        "Message sent successfully: {} (partition {}, offset {})",
        message, delivery.partition, delivery.offset
    )?;
    Ok(delivery)
}

/// Print every message that arrives on `topic` until the receiver closes.
/// Returns the number of messages printed.
pub async fn subscribe<W: Write>(
    connector: &dyn Connector,
    config: &RelayConfig,
    topic: &str,
    options: &SubscribeOptions,
    cancel: CancellationToken,
    out: &mut W,
) -> Result<usize> {
    let mut receiver_config = config.receiver_config();
    receiver_config.from_earliest |= options.from_earliest;
    if let Some(idle_timeout) = options.idle_timeout {
        receiver_config.idle_timeout = idle_timeout;
    }
    if options.max_messages.is_some() {
        receiver_config.max_messages = options.max_messages;
    }
    receiver_config
        .validate()
        .map_err(|e| RelayError::Config(e.to_string()))?;

    let mut receiver = Receiver::connect(connector, topic, receiver_config)
        .await?
        .with_cancellation(cancel);

    let mut count = 0;
    while let Some(item) = receiver.next().await {
        let message = item?;
        print_message(out, &message)?;
        count += 1;
    }

    info!(
        "Subscription to '{}' ended ({:?}) after {} message(s)",
        topic,
        receiver.close_reason(),
        count
    );

    if receiver.close_reason() == Some(CloseReason::Cancelled) {
        return Err(RelayError::Client(ClientError::Cancelled));
    }
    Ok(count)
}

/// Publish `message`, then read `topic` back from the earliest offset
///
/// The receiver is only opened once the broker has acknowledged the write, so
/// the message is guaranteed to be visible to it.
pub async fn relay<W: Write>(
    connector: &dyn Connector,
    config: &RelayConfig,
    topic: &str,
    message: &str,
    cancel: CancellationToken,
    out: &mut W,
) -> Result<usize> {
    let delivery = publish(connector, config, topic, message, cancel.clone(), out).await?;
    debug!(
        "Acknowledged at {}/{}, starting receiver from earliest",
        delivery.partition, delivery.offset
    );

    let options = SubscribeOptions {
        from_earliest: true,
        ..Default::default()
    };
    subscribe(connector, config, topic, &options, cancel, out).await
}

fn print_message<W: Write>(out: &mut W, message: &ReceivedMessage) -> Result<()> {
    let text = message.payload_as_str().ok_or_else(|| ClientError::MalformedMessage {
        offset: message.offset,
        reason: "payload is not valid UTF-8".to_string(),
    })?;
    writeln!(out, "Received message: {}", text)?;
    Ok(())
}

/// Parse `"200ms"`, `"5s"` or a bare millisecond count such as `"1500"`
pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    let value = value.trim();
    let (digits, unit_ms) = if let Some(ms) = value.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = value.strip_suffix('s') {
        (secs, 1000)
    } else {
        (value, 1)
    };

    let amount: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{}', expected e.g. 200ms, 5s or 1500", value))?;
    if amount == 0 {
        return Err("duration must be greater than 0".to_string());
    }
    Ok(Duration::from_millis(amount.saturating_mul(unit_ms)))
}
