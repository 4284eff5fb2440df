//! Age stages
//!
//! The fixed four-value enumeration every variant is keyed by. Each stage
//! carries a lowercase tag (wire/log form), a display label (export form) and
//! the phrase providers receive when asked to render that age.

use crate::error::IdentityError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Life stage a subject is rendered at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeStage {
    /// 0-2 years; the base artifact produced at subject creation
    #[serde(alias = "baby")]
    Infant,
    /// 5-8 years
    Child,
    /// 14-16 years
    Teen,
    /// 20-25 years
    Adult,
}

impl AgeStage {
    /// All stages in life order
    pub const ALL: [AgeStage; 4] = [
        AgeStage::Infant,
        AgeStage::Child,
        AgeStage::Teen,
        AgeStage::Adult,
    ];

    /// Lowercase tag
    #[inline]
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            AgeStage::Infant => "infant",
            AgeStage::Child => "child",
            AgeStage::Teen => "teen",
            AgeStage::Adult => "adult",
        }
    }

    /// Human-facing label used on exports
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            AgeStage::Infant => "Baby",
            AgeStage::Child => "Child",
            AgeStage::Teen => "Teen",
            AgeStage::Adult => "Adult",
        }
    }

    /// Phrase describing the stage to an image provider
    #[inline]
    #[must_use]
    pub const fn prompt_phrase(self) -> &'static str {
        match self {
            AgeStage::Infant => "a cute baby (0-2 years old)",
            AgeStage::Child => "a young child (5-8 years old)",
            AgeStage::Teen => "a teenage person (14-16 years old)",
            AgeStage::Adult => "a young adult (20-25 years old)",
        }
    }
}

impl Display for AgeStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AgeStage {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "infant" | "baby" => Ok(AgeStage::Infant),
            "child" => Ok(AgeStage::Child),
            "teen" => Ok(AgeStage::Teen),
            "adult" => Ok(AgeStage::Adult),
            _ => Err(IdentityError::UnknownStage(s.to_string())),
        }
    }
}
