//! Identity descriptors
//!
//! A [`Descriptor`] is the token that keeps every age stage of one subject
//! visually consistent. It is derived once per subject and then carried
//! forward; callers must never rebuild it from the name to serve a later
//! stage.
//!
//! Derivation hashes the normalized name (trimmed, lowercased, inner
//! whitespace collapsed) with BLAKE3 in key-derivation mode. The first eight
//! output bytes form the seed, the following pairs index the attribute token
//! tables.

use crate::error::IdentityError;
use serde::{Deserialize, Serialize};

const DERIVE_CONTEXT: &str = "agelens identity descriptor v1";

const FACE_SHAPES: &[&str] = &["oval", "round", "heart-shaped", "square", "long"];
const SKIN_TONES: &[&str] = &[
    "fair",
    "light",
    "light olive",
    "medium",
    "olive",
    "tan",
    "brown",
    "deep brown",
];
const HAIR_COLORS: &[&str] = &[
    "black",
    "dark brown",
    "chestnut",
    "light brown",
    "auburn",
    "strawberry blond",
    "blond",
    "red",
];
const HAIR_TEXTURES: &[&str] = &["straight", "wavy", "curly", "coily"];
const EYE_COLORS: &[&str] = &["brown", "dark brown", "hazel", "green", "blue", "gray", "amber"];

/// Structured appearance hints shared by every stage of a subject
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attributes {
    pub face_shape: String,
    pub skin_tone: String,
    pub hair_color: String,
    pub hair_texture: String,
    pub eye_color: String,
}

impl Attributes {
    fn from_digest(bytes: &[u8; 32]) -> Self {
        let pick = |offset: usize, table: &[&str]| -> String {
            let raw = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
            table[usize::from(raw) % table.len()].to_string()
        };

        Self {
            face_shape: pick(8, FACE_SHAPES),
            skin_tone: pick(10, SKIN_TONES),
            hair_color: pick(12, HAIR_COLORS),
            hair_texture: pick(14, HAIR_TEXTURES),
            eye_color: pick(16, EYE_COLORS),
        }
    }

    /// Comma separated description, stable field order
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} face, {} skin, {} {} hair, {} eyes",
            self.face_shape, self.skin_tone, self.hair_texture, self.hair_color, self.eye_color
        )
    }
}

/// Stable seed + attribute set for one subject
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    name: String,
    seed: u64,
    attributes: Attributes,
}

impl Descriptor {
    /// Display name the descriptor was built for (trimmed)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generation seed
    #[inline]
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Appearance attributes
    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Canonical byte encoding
    ///
    /// Fields are NUL separated so adjacent values cannot alias.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.name.len());
        out.extend_from_slice(&self.seed.to_le_bytes());
        for field in [
            self.name.as_str(),
            self.attributes.face_shape.as_str(),
            self.attributes.skin_tone.as_str(),
            self.attributes.hair_color.as_str(),
            self.attributes.hair_texture.as_str(),
            self.attributes.eye_color.as_str(),
        ] {
            out.extend_from_slice(field.as_bytes());
            out.push(0);
        }
        out
    }

    /// Hex BLAKE3 of [`canonical_bytes`](Self::canonical_bytes)
    #[must_use]
    pub fn fingerprint(&self) -> String {
        blake3::hash(&self.canonical_bytes()).to_hex().to_string()
    }

    /// First 16 hex chars of the fingerprint, for logs
    #[must_use]
    pub fn short_fingerprint(&self) -> String {
        let digest = blake3::hash(&self.canonical_bytes());
        hex::encode(&digest.as_bytes()[..8])
    }
}

/// Derives identity descriptors from subject names
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorBuilder;

impl DescriptorBuilder {
    /// Create builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Deterministic descriptor for `name`
    ///
    /// # Errors
    /// [`IdentityError::EmptyName`] if `name` is empty or whitespace only
    pub fn build(&self, name: &str) -> Result<Descriptor, IdentityError> {
        let display = validate_name(name)?;
        let mut hasher = blake3::Hasher::new_derive_key(DERIVE_CONTEXT);
        hasher.update(normalize(display).as_bytes());
        Ok(Self::from_digest(display, hasher.finalize().as_bytes()))
    }

    /// Descriptor for `name` mixed with a random salt
    ///
    /// Two calls with the same name give different faces. The result must be
    /// stored by the caller; it cannot be recomputed.
    ///
    /// # Errors
    /// [`IdentityError::EmptyName`] if `name` is empty or whitespace only
    pub fn build_fresh(&self, name: &str) -> Result<Descriptor, IdentityError> {
        self.build_salted(name, rand::random::<u64>())
    }

    /// Descriptor for `name` mixed with an explicit salt
    ///
    /// # Errors
    /// [`IdentityError::EmptyName`] if `name` is empty or whitespace only
    pub fn build_salted(&self, name: &str, salt: u64) -> Result<Descriptor, IdentityError> {
        let display = validate_name(name)?;
        let mut hasher = blake3::Hasher::new_derive_key(DERIVE_CONTEXT);
        hasher.update(normalize(display).as_bytes());
        hasher.update(&[0]);
        hasher.update(&salt.to_le_bytes());
        Ok(Self::from_digest(display, hasher.finalize().as_bytes()))
    }

    fn from_digest(display: &str, digest: &[u8; 32]) -> Descriptor {
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);

        Descriptor {
            name: display.to_string(),
            seed: u64::from_le_bytes(seed),
            attributes: Attributes::from_digest(digest),
        }
    }
}

fn validate_name(name: &str) -> Result<&str, IdentityError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(IdentityError::EmptyName);
    }
    Ok(trimmed)
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn build_trims_display_name() {
        let d = DescriptorBuilder::new().build("  Ava  ").unwrap();
        assert_eq!(d.name(), "Ava");
    }

    #[test]
    fn build_rejects_blank_names() {
        let builder = DescriptorBuilder::new();
        assert_eq!(builder.build(""), Err(IdentityError::EmptyName));
        assert_eq!(builder.build(" \t\n "), Err(IdentityError::EmptyName));
        assert_eq!(builder.build_fresh("   "), Err(IdentityError::EmptyName));
    }

    #[test]
    fn build_ignores_case_and_spacing_for_identity() {
        let builder = DescriptorBuilder::new();
        let a = builder.build("Mary  Ann").unwrap();
        let b = builder.build("mary ann").unwrap();
        assert_eq!(a.seed(), b.seed());
        assert_eq!(a.attributes(), b.attributes());
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn different_names_get_different_seeds() {
        let builder = DescriptorBuilder::new();
        let a = builder.build("Ava").unwrap();
        let b = builder.build("Noah").unwrap();
        assert_ne!(a.seed(), b.seed());
    }

    #[test]
    fn salted_builds_diverge_from_plain() {
        let builder = DescriptorBuilder::new();
        let plain = builder.build("Ava").unwrap();
        let salted = builder.build_salted("Ava", 7).unwrap();
        assert_ne!(plain.seed(), salted.seed());
        assert_eq!(salted, builder.build_salted("Ava", 7).unwrap());
    }

    #[test]
    fn attributes_come_from_token_tables() {
        let d = DescriptorBuilder::new().build("Ava").unwrap();
        let a = d.attributes();
        assert!(FACE_SHAPES.contains(&a.face_shape.as_str()));
        assert!(SKIN_TONES.contains(&a.skin_tone.as_str()));
        assert!(HAIR_COLORS.contains(&a.hair_color.as_str()));
        assert!(HAIR_TEXTURES.contains(&a.hair_texture.as_str()));
        assert!(EYE_COLORS.contains(&a.eye_color.as_str()));
        assert!(a.describe().contains(&a.eye_color));
    }

    #[test]
    fn fingerprint_is_hex_and_prefixed_by_short() {
        let d = DescriptorBuilder::new().build("Ava").unwrap();
        let fp = d.fingerprint();
        assert_eq!(fp.len(), 64);
        assert!(fp.starts_with(&d.short_fingerprint()));
    }

    #[test]
    fn descriptor_serde_json() {
        let d = DescriptorBuilder::new().build("Ava").unwrap();
        let json = serde_json::to_string(&d).unwrap();
        let decoded: Descriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(d, decoded);
        assert_eq!(d.canonical_bytes(), decoded.canonical_bytes());
    }

    proptest! {
        #[test]
        fn build_is_deterministic(name in "[A-Za-z][A-Za-z ]{0,24}") {
            let builder = DescriptorBuilder::new();
            let a = builder.build(&name).unwrap();
            let b = builder.build(&name).unwrap();
            prop_assert_eq!(a.canonical_bytes(), b.canonical_bytes());
            prop_assert_eq!(a.fingerprint(), b.fingerprint());
        }

        #[test]
        fn padding_does_not_change_identity(name in "[A-Za-z]{1,16}", pad in 0usize..4) {
            let builder = DescriptorBuilder::new();
            let padded = format!("{}{}{}", " ".repeat(pad), name, " ".repeat(pad));
            prop_assert_eq!(builder.build(&name).unwrap(), builder.build(&padded).unwrap());
        }
    }
}
