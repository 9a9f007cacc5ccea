//! Error taxonomy shared by every resource kind.

use thiserror::Error;

/// Convergence error type.
///
/// Variants follow the failure categories a host needs to tell apart:
/// validation and crypto failures abort the resource's pass, the rest
/// degrade to "not yet satisfied" and are retried on the next pass.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Malformed desired state (scope, name, URL, TTL, tag...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unreadable or invalid key material, signature failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Corrupt, foreign-signed or malformed persisted credential
    #[error("Decode error: {0}")]
    Decode(String),

    /// Remote call failed (timeout, unreachable, redirect loop)
    #[error("Network error: {0}")]
    Network(String),

    /// Persisted document could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Filesystem error while writing state
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for convergence operations
pub type ConvergeResult<T> = Result<T, ConvergeError>;

impl ConvergeError {
    /// Whether this error fails the resource's pass.
    ///
    /// Non-fatal errors are logged and reported as deferred.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConvergeError::Validation(_) | ConvergeError::Crypto(_) | ConvergeError::Io(_)
        )
    }

    /// Short category label used in logs and reports.
    pub fn category(&self) -> &'static str {
        match self {
            ConvergeError::Validation(_) => "validation",
            ConvergeError::Crypto(_) => "crypto",
            ConvergeError::Decode(_) => "decode",
            ConvergeError::Network(_) => "network",
            ConvergeError::Parse(_) => "parse",
            ConvergeError::Io(_) => "io",
        }
    }
}
