//! Error types for AgeLens Core
//!
//! Every crate keeps its own error enum; [`AgelensError`] is what callers of
//! the orchestrator see.

use crate::config::ConfigError;
use agelens_cache::CacheError;
use agelens_model::{AgeStage, IdentityError, SubjectId};
use agelens_synthesis::UpstreamError;
use agelens_watermark::RenderError;

/// Main AgeLens error type
#[derive(Debug, thiserror::Error)]
pub enum AgelensError {
    /// Caller input rejected before any work was done
    #[error("invalid input: {0}")]
    Validation(#[from] IdentityError),

    /// Unknown subject, or a stage that was never generated
    #[error(transparent)]
    NotFound(#[from] NotFound),

    /// Image provider failure
    #[error("generation failed: {0}")]
    Upstream(#[from] UpstreamError),

    /// Stored bytes could not be watermarked
    #[error("export failed: {0}")]
    Render(#[from] RenderError),

    /// Configuration unreadable or invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generating task ended without a result
    #[error("generation aborted: {0}")]
    Generation(String),
}

/// Lookup misses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFound {
    /// No such subject (never created, or evicted)
    #[error("subject not found: {0}")]
    Subject(SubjectId),

    /// Subject exists but the stage has not been generated
    #[error("no {stage} variant for subject {subject}; request it before exporting")]
    Variant {
        /// Subject looked up
        subject: SubjectId,
        /// Stage requested
        stage: AgeStage,
    },
}

impl AgelensError {
    /// Check if retrying the same call could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(err) if err.is_transient())
    }

    /// Check if the error is a lookup miss
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<CacheError> for AgelensError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Upstream(upstream) => Self::Upstream(upstream),
            CacheError::Aborted(reason) => Self::Generation(reason),
        }
    }
}
