//! Broadcast writer error types

use thiserror::Error;

/// Errors surfaced by [`Tee`](crate::Tee) operations
#[derive(Debug, Error)]
pub enum TeeError {
    /// Target was never added, or was already removed
    #[error("writer was never added, or was already removed")]
    NotFound,

    /// The writer has been closed; no further operations are accepted
    #[error("broadcast writer is closed")]
    Closed,

    /// The coordinator task ended without completing shutdown
    #[error("broadcast coordinator stopped unexpectedly")]
    CoordinatorLost,

    /// Error latched by a sink while writing or closing its target
    #[error("sink error: {0}")]
    Sink(#[from] contracts::ContractError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ContractError;

    #[test]
    fn test_sink_error_display() {
        let err: TeeError = ContractError::sink_write("disk", "no space left").into();
        assert_eq!(err.to_string(), "sink error: sink 'disk' write error: no space left");
    }
}
