//! Error types for the response-verification oracle

use thiserror::Error;

use crate::poll::ProbeError;
use crate::similarity::ScoreError;

/// Result type alias using the oracle Error
pub type Result<T> = std::result::Result<T, Error>;

/// Oracle error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Scoring error: {0}")]
    Score(#[from] ScoreError),

    #[error("Unsupported question bank format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
