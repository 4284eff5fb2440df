//! Runtime configuration
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.
//!
//! ```toml
//! regenerate = "fresh_descriptor"
//!
//! [retry]
//! max_attempts = 5
//!
//! [subjects]
//! max_subjects = 500
//! ttl_secs = 3600
//!
//! [watermark.output]
//! format = "jpeg"
//! quality = 95
//!
//! [provider]
//! endpoint = "https://images.example.com/v1/generate"
//! api_key_env = "AGELENS_API_KEY"
//! ```

use agelens_synthesis::{ProviderConfig, RetryPolicy};
use agelens_watermark::{LayoutPolicy, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What `regenerate` does with the subject's descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegeneratePolicy {
    /// Re-render with the same descriptor
    #[default]
    KeepDescriptor,
    /// Derive a new salted descriptor ("new face") and keep it from then on
    FreshDescriptor,
}

/// Subject registry bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectLimits {
    /// Subjects kept before the least useful are evicted
    pub max_subjects: u64,
    /// Lifetime of a subject after creation; unlimited when absent
    pub ttl_secs: Option<u64>,
}

impl SubjectLimits {
    /// TTL as a duration
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

impl Default for SubjectLimits {
    fn default() -> Self {
        Self {
            max_subjects: 10_000,
            ttl_secs: None,
        }
    }
}

/// Export appearance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Caption placement
    pub layout: LayoutPolicy,
    /// Output encoding
    pub output: OutputFormat,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgelensConfig {
    /// Descriptor handling on regenerate
    pub regenerate: RegeneratePolicy,
    /// Provider retry and timeout bounds
    pub retry: RetryPolicy,
    /// Subject registry bounds
    pub subjects: SubjectLimits,
    /// Export appearance
    pub watermark: WatermarkConfig,
    /// Remote provider connection
    pub provider: ProviderConfig,
}

/// Configuration loading failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid configuration
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be written out
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl AgelensConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With regenerate policy
    #[inline]
    #[must_use]
    pub fn with_regenerate(mut self, regenerate: RegeneratePolicy) -> Self {
        self.regenerate = regenerate;
        self
    }

    /// With subject limits
    #[inline]
    #[must_use]
    pub fn with_subjects(mut self, subjects: SubjectLimits) -> Self {
        self.subjects = subjects;
        self
    }

    /// Read a TOML file
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if unreadable, [`ConfigError::Parse`] if invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse TOML text
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the text is not valid configuration.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Render as TOML
    ///
    /// # Errors
    ///
    /// [`ConfigError::Serialize`] if a value has no TOML form.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
