use kafka_relay_client::{ClientError, ErrorKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Exit status for command-line usage errors (`EX_USAGE`)
pub const USAGE_EXIT_CODE: i32 = 64;

/// Exit status for a command line clap refused to parse. `--help` and
/// `--version` are successful runs.
pub fn usage_exit_code(kind: clap::error::ErrorKind) -> i32 {
    match kind {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
        _ => USAGE_EXIT_CODE,
    }
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("Delivery failed: {0}")]
    Delivery(ClientError),
}

impl RelayError {
    /// Process exit status for this failure
    ///
    /// `2` connection failures, `3` message-level failures (rejected, timed
    /// out, malformed), `4` configuration, `130` cancelled, `1` anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::Config(_) | RelayError::Io(_) => 4,
            RelayError::Client(ClientError::InvalidConfig(_)) => 4,
            RelayError::Client(e) | RelayError::Delivery(e) => match e.kind() {
                ErrorKind::ConnectionError => 2,
                ErrorKind::BrokerRejected | ErrorKind::Timeout | ErrorKind::MalformedMessage => 3,
                ErrorKind::Cancelled => 130,
                ErrorKind::Unknown => 1,
            },
        }
    }

    /// Human-readable classification printed by the CLI
    pub fn classification(&self) -> &'static str {
        match self {
            RelayError::Config(_) | RelayError::Io(_) => "configuration error",
            RelayError::Client(ClientError::InvalidConfig(_)) => "configuration error",
            RelayError::Client(e) | RelayError::Delivery(e) => match e.kind() {
                ErrorKind::ConnectionError => "connection error",
                ErrorKind::BrokerRejected => "rejected by broker",
                ErrorKind::Timeout => "timed out",
                ErrorKind::MalformedMessage => "malformed message",
                ErrorKind::Cancelled => "cancelled",
                ErrorKind::Unknown => "unknown error",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let cases = [
            (RelayError::Client(ClientError::Connection("refused".into())), 2),
            (RelayError::Delivery(ClientError::BrokerRejected("UnknownTopic".into())), 3),
            (RelayError::Delivery(ClientError::Timeout { timeout_ms: 10 }), 3),
            (
                RelayError::Client(ClientError::MalformedMessage {
                    offset: 4,
                    reason: "no value".into(),
                }),
                3,
            ),
            (RelayError::Client(ClientError::Cancelled), 130),
            (RelayError::Client(ClientError::Unknown("?".into())), 1),
            (RelayError::Client(ClientError::InvalidConfig("no brokers".into())), 4),
            (RelayError::Config("bad toml".into()), 4),
        ];

        for (error, code) in cases {
            assert_eq!(error.exit_code(), code, "{}", error);
        }
    }

    #[test]
    fn test_usage_errors_do_not_share_codes() {
        use clap::error::ErrorKind as ClapKind;

        assert_eq!(usage_exit_code(ClapKind::DisplayHelp), 0);
        assert_eq!(usage_exit_code(ClapKind::DisplayVersion), 0);

        let connection = RelayError::Client(ClientError::Connection("refused".into())).exit_code();
        for kind in [
            ClapKind::InvalidValue,
            ClapKind::UnknownArgument,
            ClapKind::MissingRequiredArgument,
            ClapKind::DisplayHelpOnMissingArgumentOrSubcommand,
        ] {
            let code = usage_exit_code(kind);
            assert_eq!(code, USAGE_EXIT_CODE);
            assert_ne!(code, connection);
        }
    }

    #[test]
    fn test_classification() {
        let error = RelayError::Delivery(ClientError::Timeout { timeout_ms: 30_000 });
        assert_eq!(error.classification(), "timed out");
        assert!(error.to_string().contains("Delivery failed"));

        let error = RelayError::Client(ClientError::Connection("refused".into()));
        assert_eq!(error.classification(), "connection error");
    }
}
