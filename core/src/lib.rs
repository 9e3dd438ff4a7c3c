//! Core functionality for winlaunch
//!
//! This crate launches child processes on Windows with explicit control over
//! which handles they inherit. The launch algorithm is written against the
//! [`OsApi`] seam so it runs unchanged over the Windows backend and over the
//! recording backend used by tests.

pub mod child;
pub mod closer;
pub mod cmdline;
pub mod config;
pub mod error;
pub mod inheritance;
pub mod launcher;
pub mod process;
pub mod transfer;

#[cfg(test)]
mod error_tests;

// Used by the handle-probe binary only
use serde_json as _;

// Re-export schema types for convenience
pub use schema::*;

pub use child::{ChildProcess, ExitStatus, LaunchStrategy, ParentStream};
pub use config::{LaunchProfileFile, LauncherSettings};
pub use error::{CoreError, Result};
pub use inheritance::{HandleInheritanceAttributeBuilder, InheritanceDirective, InheritancePolicy};
pub use launcher::{ChildIdentity, Launched, ProcessLauncher};
pub use process::{OsApi, RecordingOs};
#[cfg(windows)]
pub use process::WindowsApi;
pub use transfer::{HandleTransfer, PipeHandleTransferNegotiator};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level` when set.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_only_once() {
        // The first call may race other tests installing a subscriber; the
        // second call in this test always sees one installed.
        let _ = utils::init_tracing("debug");
        match utils::init_tracing("debug") {
            Err(CoreError::InitializationError(_)) => {}
            other => panic!("expected InitializationError, got {:?}", other),
        }
    }

    #[test]
    fn test_reexports_cover_a_launch() {
        let os = RecordingOs::new();
        let launcher = ProcessLauncher::new(os.clone());
        let child = ChildProcess::spawn(&launcher, LaunchSpec::new(["tool.exe"])).unwrap();
        assert_eq!(os.create_requests().len(), 1);
        assert!(child.id() > 0);
    }
}
