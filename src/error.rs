//! Crate-wide error type.
//!
//! Variants line up with the error kinds: configuration/open-time errors
//! abort a session before the state machine starts; transmission/protocol
//! errors terminate the relay loop after the failing frame has already been
//! logged; hook errors are treated like a radio-frontend assertion.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type returned by [`crate::session::SessionController`] and
/// the lower-level components it drives.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to open device {connstring:?}: {source}")]
    DriverOpen {
        connstring: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("target selection failed: {0}")]
    Selection(String),

    #[error("transmission error: driver returned {code}")]
    Transmission { code: i32 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("data hook error: {0}")]
    Hook(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed frame log {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RelayError {
    /// Process exit code per the CLI contract: 0 is reserved for clean
    /// completion and is never produced by an error value.
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::Configuration(_) | RelayError::DriverOpen { .. } => 1,
            RelayError::Selection(_) => 1,
            RelayError::Transmission { .. }
            | RelayError::Protocol(_)
            | RelayError::Hook(_)
            | RelayError::Io { .. }
            | RelayError::Json { .. } => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
