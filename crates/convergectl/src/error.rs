//! Error types for convergectl

use registry_token::TokenError;
use runner_registration::RunnerError;
use thiserror::Error;

/// Host-level errors; per-resource failures are reported, not raised.
#[derive(Debug, Error)]
pub enum CtlError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Registry token error: {0}")]
    Token(#[from] TokenError),

    #[error("Runner setup error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

pub type CtlResult<T> = Result<T, CtlError>;
