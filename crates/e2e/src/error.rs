//! Error types for scenario runs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Test not found: {0}")]
    TestNotFound(String),

    #[error("No chat surface available: {0}")]
    SurfaceUnavailable(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Oracle error: {0}")]
    Oracle(#[from] chatoracle_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
