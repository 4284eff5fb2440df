//! Error types for subject identity and stage parsing

/// Errors raised while building identities or parsing stage tags
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Subject name was empty or whitespace only
    #[error("subject name must not be empty")]
    EmptyName,

    /// Stage tag is not one of the four known stages
    #[error("unknown age stage: '{0}'")]
    UnknownStage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_error_display() {
        assert_eq!(
            IdentityError::EmptyName.to_string(),
            "subject name must not be empty"
        );
        assert_eq!(
            IdentityError::UnknownStage("elder".to_string()).to_string(),
            "unknown age stage: 'elder'"
        );
    }
}
