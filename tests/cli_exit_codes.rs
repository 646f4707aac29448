//! Exit status of the `kafka-relay` binary

use kafka_relay::USAGE_EXIT_CODE;
use pretty_assertions::assert_eq;
use std::process::{Command, Output};

fn kafka_relay(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kafka-relay"))
        .args(args)
        .env_remove("KAFKA_RELAY_BROKERS")
        .env_remove("KAFKA_RELAY_CLIENT_ID")
        .output()
        .unwrap()
}

#[test]
fn test_help_exits_zero() {
    let output = kafka_relay(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("subscribe"));
}

#[test]
fn test_invalid_flag_value_is_a_usage_error() {
    let output = kafka_relay(&["subscribe", "t", "--max=abc"]);
    assert_eq!(output.status.code(), Some(USAGE_EXIT_CODE));
}

#[test]
fn test_unknown_subcommand_is_a_usage_error() {
    let output = kafka_relay(&["consume", "t"]);
    assert_eq!(output.status.code(), Some(USAGE_EXIT_CODE));
}

#[test]
fn test_bad_broker_list_is_a_config_error() {
    let output = kafka_relay(&["--brokers", "no-port", "publish", "t", "x"]);
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_unreachable_broker_is_a_connection_error() {
    // Nothing listens on port 1
    let output = kafka_relay(&["--brokers", "127.0.0.1:1", "publish", "t", "x"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connection error"));
    assert!(output.stdout.is_empty());
}
