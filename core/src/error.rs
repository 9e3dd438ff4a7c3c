//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// The OS process-creation primitive rejected the request
    #[error("Process creation failed (os error {code}): {message}")]
    ProcessCreation {
        /// Native platform error code
        code: u32,
        /// Program that was being launched and the platform's description
        message: String,
    },

    /// Restricted inheritance was requested in strict mode on a platform
    /// that cannot honor it
    #[error("Restricted handle inheritance unsupported: {0}")]
    InheritanceUnsupported(String),

    #[error("Process wait error: {0}")]
    ProcessWait(String),

    #[error("Process terminate error: {0}")]
    ProcessTerminate(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "WL001",
            CoreError::ValidationError(_) => "WL002",
            CoreError::InitializationError(_) => "WL003",
            CoreError::ProcessCreation { .. } => "WL004",
            CoreError::InheritanceUnsupported(_) => "WL005",
            CoreError::IoError(_) => "WL006",
            CoreError::ProcessWait(_) => "WL008",
            CoreError::ProcessTerminate(_) => "WL009",
        }
    }

    /// Native OS error code carried by a process-creation failure
    pub fn os_code(&self) -> Option<u32> {
        match self {
            CoreError::ProcessCreation { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;
