//! Kafka relay: file/env configuration, CLI commands and exit-code mapping on
//! top of the `kafka-relay-client` core.

pub mod commands;
pub mod config;
pub mod error;
pub mod panic_handler;

pub use config::RelayConfig;
pub use error::{usage_exit_code, RelayError, Result, USAGE_EXIT_CODE};
