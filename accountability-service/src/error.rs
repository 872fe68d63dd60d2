//! Error types for the accountability service.

use {crate::config::ConfigError, thiserror::Error, trv1_accountability::ProofError};

/// Errors that can occur while running the accountability service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A proof could not be encoded for submission.
    #[error("proof encoding failed: {0}")]
    Proof(#[from] ProofError),

    /// The submission sink has been closed.
    #[error("proof submission channel closed")]
    ChannelClosed,

    /// The service was started with an invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Convenience result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
