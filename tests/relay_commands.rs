//! CLI command flows against the in-memory broker

use kafka_relay::commands::{self, SubscribeOptions};
use kafka_relay::{RelayConfig, RelayError};
use kafka_relay_client::{ClientError, MemoryBroker};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.subscriber.idle_timeout_ms = 200;
    config.subscriber.max_wait_ms = 50;
    config.publisher.ack_timeout_ms = 500;
    config
}

fn output(buffer: Vec<u8>) -> String {
    String::from_utf8(buffer).unwrap()
}

#[tokio::test]
async fn test_relay_prints_sent_and_received() {
    let broker = MemoryBroker::new();
    let mut out = Vec::new();

    let count = commands::relay(
        &broker,
        &test_config(),
        "test_topic",
        "Hello, Kafka!",
        CancellationToken::new(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(count, 1);
    assert_eq!(
        output(out),
        "Message sent successfully: Hello, Kafka! (partition 0, offset 0)\n\
         Received message: Hello, Kafka!\n"
    );
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_publish_command() {
    let broker = MemoryBroker::new();
    let mut out = Vec::new();

    let delivery = commands::publish(
        &broker,
        &test_config(),
        "orders",
        "first",
        CancellationToken::new(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(delivery.offset, 0);
    assert!(output(out).starts_with("Message sent successfully: first"));
    assert_eq!(broker.records("orders").len(), 1);
}

#[tokio::test]
async fn test_subscribe_respects_max() {
    let broker = MemoryBroker::new();
    for i in 0..5 {
        broker.inject_record("events", None, Some(format!("event-{}", i).into()));
    }
    let options = SubscribeOptions {
        from_earliest: true,
        idle_timeout: Some(Duration::from_millis(500)),
        max_messages: Some(3),
    };
    let mut out = Vec::new();

    let count = commands::subscribe(
        &broker,
        &test_config(),
        "events",
        &options,
        CancellationToken::new(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(count, 3);
    assert_eq!(
        output(out),
        "Received message: event-0\nReceived message: event-1\nReceived message: event-2\n"
    );
}

#[tokio::test]
async fn test_subscribe_from_latest_on_quiet_topic() {
    let broker = MemoryBroker::new();
    broker.inject_record("events", None, Some("old".into()));
    let mut out = Vec::new();

    let count = commands::subscribe(
        &broker,
        &test_config(),
        "events",
        &SubscribeOptions::default(),
        CancellationToken::new(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(count, 0);
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_unreachable_broker_exits_with_connection_code() {
    let broker = MemoryBroker::new();
    broker.set_reachable(false);
    let mut out = Vec::new();

    let err = commands::publish(
        &broker,
        &test_config(),
        "t",
        "x",
        CancellationToken::new(),
        &mut out,
    )
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert_eq!(err.classification(), "connection error");
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_rejected_topic_exits_with_message_code() {
    let broker = MemoryBroker::without_auto_create();
    let mut out = Vec::new();

    let err = commands::publish(
        &broker,
        &test_config(),
        "missing",
        "x",
        CancellationToken::new(),
        &mut out,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RelayError::Delivery(ClientError::BrokerRejected(_))));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_malformed_record_stops_subscribe() {
    let broker = MemoryBroker::new();
    broker.inject_record("t", None, Some("good".into()));
    broker.inject_record("t", None, Some(vec![0xffu8, 0xfe].into()));
    broker.inject_record("t", None, Some("after".into()));
    let options = SubscribeOptions {
        from_earliest: true,
        ..Default::default()
    };
    let mut out = Vec::new();

    let err = commands::subscribe(
        &broker,
        &test_config(),
        "t",
        &options,
        CancellationToken::new(),
        &mut out,
    )
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 3);
    assert_eq!(err.classification(), "malformed message");
    assert_eq!(output(out), "Received message: good\n");
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_cancelled_subscribe_exits_130() {
    let broker = MemoryBroker::new();
    let cancel = CancellationToken::new();
    let mut config = test_config();
    config.subscriber.idle_timeout_ms = 30_000;

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let mut out = Vec::new();
    let err = commands::subscribe(
        &broker,
        &config,
        "t",
        &SubscribeOptions::default(),
        cancel,
        &mut out,
    )
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 130);
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_config_file_drives_subscribe() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[broker]
brokers = ["localhost:9092"]

[subscriber]
idle_timeout_ms = 100
from_earliest = true
max_messages = 1
"#
    )
    .unwrap();
    let config = RelayConfig::from_file(file.path()).unwrap();

    let broker = MemoryBroker::new();
    broker.inject_record("t", None, Some("one".into()));
    broker.inject_record("t", None, Some("two".into()));
    let mut out = Vec::new();

    let count = commands::subscribe(
        &broker,
        &config,
        "t",
        &SubscribeOptions::default(),
        CancellationToken::new(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(count, 1);
    assert_eq!(output(out), "Received message: one\n");
}
