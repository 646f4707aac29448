use clap::{Parser, Subcommand};
use kafka_relay::commands::{self, parse_duration, SubscribeOptions};
use kafka_relay::{RelayConfig, RelayError, Result};
use kafka_relay_client::BrokerConnection;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "kafka-relay")]
#[command(about = "Publish to and receive from Kafka topics with acknowledged delivery")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Comma-separated broker list, overrides the config file and environment
    #[arg(long, global = true)]
    pub brokers: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish one message and wait for the broker acknowledgement
    Publish {
        topic: String,
        message: String,
    },

    /// Print messages from a topic until it goes quiet
    Subscribe {
        topic: String,

        /// Start from the oldest retained message
        #[arg(long)]
        from_earliest: bool,

        /// Stop after this long without a message (e.g. 200ms, 5s)
        #[arg(long, value_parser = parse_duration)]
        idle_timeout: Option<Duration>,

        /// Stop after this many messages
        #[arg(long = "max")]
        max_messages: Option<usize>,
    },

    /// Publish a message, then read the topic back from the beginning
    Relay {
        #[arg(default_value = "test_topic")]
        topic: String,

        #[arg(default_value = "Hello, Kafka!")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = kafka_relay::usage_exit_code(e.kind());
            // Help and version go to stdout
            let _ = e.print();
            return ExitCode::from(code as u8);
        }
    };

    // stdout carries message output only
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    kafka_relay::panic_handler::install_panic_hook();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error ({}): {}", e.classification(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = RelayConfig::load(cli.config.as_deref())?;
    if let Some(brokers) = &cli.brokers {
        config.set_brokers(brokers)?;
    }
    debug!("Using brokers {:?}", config.broker.brokers);

    let connection = BrokerConnection::new(config.client_config())
        .map_err(|e| RelayError::Config(e.to_string()))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling");
            on_signal.cancel();
        }
    });

    let mut out = std::io::stdout();
    match cli.command {
        Commands::Publish { topic, message } => {
            commands::publish(&connection, &config, &topic, &message, cancel, &mut out).await?;
        }
        Commands::Subscribe {
            topic,
            from_earliest,
            idle_timeout,
            max_messages,
        } => {
            let options = SubscribeOptions {
                from_earliest,
                idle_timeout,
                max_messages,
            };
            commands::subscribe(&connection, &config, &topic, &options, cancel, &mut out).await?;
        }
        Commands::Relay { topic, message } => {
            commands::relay(&connection, &config, &topic, &message, cancel, &mut out).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subscribe_flags() {
        let cli = Cli::parse_from([
            "kafka-relay",
            "--brokers",
            "a:9092",
            "subscribe",
            "events",
            "--from-earliest",
            "--idle-timeout=200ms",
            "--max=3",
        ]);

        assert_eq!(cli.brokers.as_deref(), Some("a:9092"));
        match cli.command {
            Commands::Subscribe {
                topic,
                from_earliest,
                idle_timeout,
                max_messages,
            } => {
                assert_eq!(topic, "events");
                assert!(from_earliest);
                assert_eq!(idle_timeout, Some(Duration::from_millis(200)));
                assert_eq!(max_messages, Some(3));
            }
            _ => panic!("expected subscribe"),
        }
    }

    #[test]
    fn test_bad_flag_value_is_a_usage_error() {
        let err = Cli::try_parse_from(["kafka-relay", "subscribe", "t", "--max=abc"])
            .err()
            .unwrap();
        assert_eq!(kafka_relay::usage_exit_code(err.kind()), kafka_relay::USAGE_EXIT_CODE);

        let err = Cli::try_parse_from(["kafka-relay", "--help"]).err().unwrap();
        assert_eq!(kafka_relay::usage_exit_code(err.kind()), 0);
    }

    #[test]
    fn test_relay_defaults() {
        let cli = Cli::parse_from(["kafka-relay", "relay"]);
        match cli.command {
            Commands::Relay { topic, message } => {
                assert_eq!(topic, "test_topic");
                assert_eq!(message, "Hello, Kafka!");
            }
            _ => panic!("expected relay"),
        }
    }
}
