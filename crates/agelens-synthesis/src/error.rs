//! Error types for the provider boundary
//!
//! [`UpstreamError`] is `Clone` because a single failed generation is
//! delivered to every waiter of that generation.

/// Failure reported by (or on behalf of) the image provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Timeout, overload or connection trouble; worth retrying
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// Provider refused the request (invalid descriptor, content policy)
    #[error("upstream rejected request: {0}")]
    Permanent(String),

    /// Transient failures persisted through every allowed attempt
    #[error("upstream still failing after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made, including the first
        attempts: u32,
        /// Reason given by the final attempt
        last: String,
    },
}

impl UpstreamError {
    /// Create transient error
    #[inline]
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    /// Create permanent error
    #[inline]
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent(reason.into())
    }

    /// Check if another attempt could succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Exhausted { .. })
    }

    /// Check if the provider rejected the request outright
    #[inline]
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// The provider's reason without the variant prefix
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(reason) | Self::Permanent(reason) => reason,
            Self::Exhausted { last, .. } => last,
        }
    }
}

/// Errors constructing a provider client
#[derive(Debug, thiserror::Error)]
pub enum ProviderSetupError {
    /// No endpoint configured
    #[error("no provider endpoint configured")]
    MissingEndpoint,

    /// Endpoint is not a valid URL
    #[error("invalid provider endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// Configured value
        endpoint: String,
        /// Parser message
        reason: String,
    },

    /// API key environment variable named in config is unset
    #[error("api key environment variable '{0}' is not set")]
    MissingApiKey(String),

    /// HTTP client could not be built
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}
