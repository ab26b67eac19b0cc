//! Oracle configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level configuration, usually read from `chatoracle.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Polling cadence and deadlines
    pub polling: PollingConfig,

    /// Embedding provider used for semantic scoring
    pub embedding: EmbeddingConfig,

    /// Suite inputs and outputs
    pub run: RunConfig,
}

/// Polling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between probe evaluations
    pub interval_ms: u64,

    /// How long to wait for the chat page to become usable
    pub page_load_timeout_secs: u64,

    /// How long to wait for the loading indicator to clear
    pub loading_timeout_secs: u64,

    /// How long to wait for a new answer block to appear
    pub growth_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            page_load_timeout_secs: 10,
            loading_timeout_secs: 60,
            growth_timeout_secs: 60,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn loading_timeout(&self) -> Duration {
        Duration::from_secs(self.loading_timeout_secs)
    }

    pub fn growth_timeout(&self) -> Duration {
        Duration::from_secs(self.growth_timeout_secs)
    }
}

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Deterministic, offline feature hashing
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
}

/// Embedding provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,

    /// Endpoint for the HTTP provider
    pub endpoint: String,

    /// Model name sent to the HTTP provider
    pub model: String,

    /// Vector length for the hashing provider
    pub dimension: usize,

    /// Environment variable holding the bearer token, if any
    pub api_key_env: Option<String>,

    /// Request timeout for the HTTP provider
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            endpoint: "http://127.0.0.1:8081/v1/embeddings".to_string(),
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            api_key_env: None,
            timeout_secs: 30,
        }
    }
}

/// Suite run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Question bank file (JSON or YAML)
    pub question_bank: PathBuf,

    /// Directory of scenario specs
    pub specs_dir: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,

    /// Maximum number of scenarios executing at once
    pub max_parallel: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            question_bank: PathBuf::from("tests/e2e/question-bank.json"),
            specs_dir: PathBuf::from("tests/e2e/specs"),
            output_dir: PathBuf::from("test-results"),
            max_parallel: 4,
        }
    }
}

impl OracleConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values that would make polling or scoring meaningless
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "polling.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        if self.run.max_parallel == 0 {
            return Err(Error::InvalidConfig(
                "run.max_parallel must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
