//! Error types for the variant cache

use agelens_synthesis::UpstreamError;

/// Outcome of a failed generation, delivered identically to every waiter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Provider failure (after retries, if the adapter retries)
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Generating task ended without a result (panic or runtime shutdown)
    #[error("generation task aborted: {0}")]
    Aborted(String),
}

/// Persistence collaborator failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("variant store error: {0}")]
pub struct StoreError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_errors_pass_through() {
        let err: CacheError = UpstreamError::permanent("policy").into();
        assert_eq!(err.to_string(), "upstream rejected request: policy");
        assert!(matches!(err, CacheError::Upstream(UpstreamError::Permanent(_))));
    }

    #[test]
    fn store_error_display() {
        assert_eq!(
            StoreError("disk full".to_string()).to_string(),
            "variant store error: disk full"
        );
    }
}
