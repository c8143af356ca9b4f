use thiserror::Error;
use tickwatch_core::logging::LoggingError;
use tickwatch_core::notification::NotificationError;
use tickwatch_core::{ConfigError, SourceError, StrategyError, WatcherError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("no configured asset is available on {exchange}")]
    NoAssets { exchange: String },

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Strategy(_) | Self::Logging(_) => 2,
            Self::Source(_) | Self::NoAssets { .. } => 3,
            Self::Notification(_) | Self::Watcher(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_category() {
        let config = CliError::from(ConfigError::MissingEnvVar {
            name: String::from("WEBHOOK_URL"),
        });
        assert_eq!(config.exit_code(), 2);
        assert_eq!(CliError::from(SourceError::data_fetch("down")).exit_code(), 3);
        assert_eq!(CliError::from(WatcherError::NoTargets).exit_code(), 4);
        assert_eq!(
            CliError::from(std::io::Error::other("closed")).exit_code(),
            10
        );
    }
}
