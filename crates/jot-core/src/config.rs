//! Pipeline configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration. Secrets never live in the file: only the names of the
//! environment variables holding them.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Items below this confidence are flagged for review
    pub confidence_threshold: f64,
    /// Minimum cosine similarity counted as a duplicate
    pub similarity_threshold: f64,
    /// Use semantic duplicate detection; exact match only when false
    pub embeddings_enabled: bool,
    /// Embedding service
    pub embedding: EmbeddingConfig,
    /// Persisted embedding cache
    pub cache_file: PathBuf,
    /// Task tracker service
    pub tracker: TrackerConfig,
    /// Task creation
    pub upload: UploadConfig,
    /// Idle review sessions older than this are purged
    pub session_max_age_hours: u32,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.9,
            similarity_threshold: 0.8,
            embeddings_enabled: true,
            embedding: EmbeddingConfig::default(),
            cache_file: PathBuf::from("cache/embeddings_cache.json"),
            tracker: TrackerConfig::default(),
            upload: UploadConfig::default(),
            session_max_age_hours: 24,
            log_level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// Returns error on malformed TOML or invalid values
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// With confidence threshold
    #[inline]
    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// With similarity threshold
    #[inline]
    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// With semantic detection switched on or off
    #[inline]
    #[must_use]
    pub fn with_embeddings_enabled(mut self, enabled: bool) -> Self {
        self.embeddings_enabled = enabled;
        self
    }

    /// With cache file
    #[inline]
    #[must_use]
    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = path.into();
        self
    }

    /// With upload concurrency
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.upload.max_concurrency = max;
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns the first invalid field
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("confidence_threshold", self.confidence_threshold)?;
        check_unit("similarity_threshold", self.similarity_threshold)?;
        if self.upload.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "upload.max_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        for (field, secs) in [
            ("upload.create_timeout_secs", self.upload.create_timeout_secs),
            ("embedding.timeout_secs", self.embedding.timeout_secs),
            ("tracker.timeout_secs", self.tracker.timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Session idle limit
    #[must_use]
    pub fn session_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.session_max_age_hours))
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside [0, 1]"),
        })
    }
}

/// Embedding service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Request timeout
    pub timeout_secs: u64,
    /// Requested vector size, model default when unset
    pub dimensions: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            dimensions: None,
        }
    }
}

impl EmbeddingConfig {
    /// Request timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Task tracker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// REST API base URL
    pub base_url: String,
    /// Environment variable holding the bearer token
    pub token_env: String,
    /// Request timeout
    pub timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.todoist.com/rest/v2".to_string(),
            token_env: "TODOIST_API_TOKEN".to_string(),
            timeout_secs: 30,
        }
    }
}

impl TrackerConfig {
    /// Request timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Task creation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Creation calls in flight at once
    pub max_concurrency: usize,
    /// Per-creation timeout
    pub create_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            create_timeout_secs: 30,
        }
    }
}

impl UploadConfig {
    /// Per-creation timeout
    #[inline]
    #[must_use]
    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }
}
