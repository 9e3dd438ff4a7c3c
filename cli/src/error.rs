//! CLI error types

use thiserror::Error;
use winlaunch_core::CoreError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Launch failed: {0}")]
    LaunchFailed(#[from] CoreError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::CommandFailed(_) => "CLI001",
            CliError::InvalidArgument(_) => "CLI002",
            CliError::ConfigError(_) => "CLI003",
            CliError::LaunchFailed(_) => "CLI004",
            CliError::SerializationError(_) => "CLI005",
            CliError::IoError(_) => "CLI006",
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CliError::CommandFailed("test".to_string()).code(), "CLI001");
        assert_eq!(CliError::InvalidArgument("test".to_string()).code(), "CLI002");
        assert_eq!(CliError::ConfigError("test".to_string()).code(), "CLI003");
        assert_eq!(
            CliError::LaunchFailed(CoreError::ValidationError("x".to_string())).code(),
            "CLI004"
        );
        assert_eq!(
            CliError::IoError(std::io::Error::other("x")).code(),
            "CLI006"
        );
    }

    #[test]
    fn test_error_display() {
        let error = CliError::InvalidArgument("--env expects KEY=VALUE".to_string());
        assert_eq!(error.to_string(), "Invalid argument: --env expects KEY=VALUE");

        let error = CliError::from(CoreError::ValidationError("shell: nope".to_string()));
        assert_eq!(error.to_string(), "Launch failed: Validation error: shell: nope");
    }
}
