//! Error types for registry token issuance

use converge_core::ConvergeError;
use thiserror::Error;

/// Registry token error type
#[derive(Debug, Error)]
pub enum TokenError {
    /// Desired token parameters are malformed
    #[error("Invalid token parameters: {0}")]
    Validation(String),

    /// Key material missing or unusable, or signing failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Persisted token could not be decoded or verified
    #[error("Token decode error: {0}")]
    Decode(String),

    /// Artifact could not be encoded
    #[error("Encoding error: {0}")]
    Encode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;

impl TokenError {
    pub(crate) fn invalid(field: &str, reason: impl std::fmt::Display) -> Self {
        Self::Validation(format!("{}: {}", field, reason))
    }
}

impl From<TokenError> for ConvergeError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Validation(msg) => ConvergeError::Validation(msg),
            TokenError::Crypto(msg) => ConvergeError::Crypto(msg),
            TokenError::Decode(msg) => ConvergeError::Decode(msg),
            // nothing is written when the artifact cannot be produced
            TokenError::Encode(msg) => ConvergeError::Crypto(msg),
            TokenError::Io(e) => ConvergeError::Io(e),
        }
    }
}
