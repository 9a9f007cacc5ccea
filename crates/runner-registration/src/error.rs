//! Error types for runner registration

use converge_core::ConvergeError;
use thiserror::Error;

/// Runner registration error type
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Desired runner parameters are malformed
    #[error("Invalid runner parameters: {0}")]
    Validation(String),

    /// Remote API unreachable or timed out
    #[error("Network error: {0}")]
    Network(String),

    /// Config document could not be parsed or rendered
    #[error("Config document error: {0}")]
    Document(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;

impl RunnerError {
    pub(crate) fn invalid(field: &str, reason: impl std::fmt::Display) -> Self {
        Self::Validation(format!("{}: {}", field, reason))
    }
}

impl From<reqwest::Error> for RunnerError {
    fn from(err: reqwest::Error) -> Self {
        RunnerError::Network(err.to_string())
    }
}

impl From<RunnerError> for ConvergeError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Validation(msg) => ConvergeError::Validation(msg),
            RunnerError::Network(msg) => ConvergeError::Network(msg),
            RunnerError::Document(msg) => ConvergeError::Parse(msg),
            RunnerError::Io(e) => ConvergeError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_is_preserved() {
        let err: ConvergeError = RunnerError::Network("refused".into()).into();
        assert!(!err.is_fatal());

        let err: ConvergeError = RunnerError::invalid("gitlab_url", "bad scheme").into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("gitlab_url: bad scheme"));
    }
}
