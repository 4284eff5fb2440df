//! Cache keys

use agelens_model::{AgeStage, SubjectId};
use std::fmt::{self, Display, Formatter};

/// Composite `(subject, stage)` key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariantKey {
    /// Owning subject
    pub subject: SubjectId,
    /// Stage rendered
    pub stage: AgeStage,
}

impl VariantKey {
    /// Create key
    #[inline]
    #[must_use]
    pub const fn new(subject: SubjectId, stage: AgeStage) -> Self {
        Self { subject, stage }
    }

    /// All four keys belonging to `subject`
    #[must_use]
    pub fn all_stages(subject: SubjectId) -> [Self; 4] {
        AgeStage::ALL.map(|stage| Self::new(subject, stage))
    }
}

impl Display for VariantKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        let subject = SubjectId::new();
        let key = VariantKey::new(subject, AgeStage::Teen);
        assert_eq!(key.to_string(), format!("{subject}/teen"));
    }

    #[test]
    fn all_stages_covers_every_stage_once() {
        let subject = SubjectId::new();
        let keys = VariantKey::all_stages(subject);
        assert_eq!(keys.map(|k| k.stage), AgeStage::ALL);
        assert!(keys.iter().all(|k| k.subject == subject));
    }
}
