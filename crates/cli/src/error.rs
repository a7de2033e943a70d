//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// One or more sinks reported an error when closed
    #[error("{failed} of {total} sinks finished with errors")]
    SinkFailures { failed: usize, total: usize },

    /// Invalid command-line value
    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument { name: String, message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn sink_failures(failed: usize, total: usize) -> Self {
        Self::SinkFailures { failed, total }
    }

    pub fn invalid_argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }
}
