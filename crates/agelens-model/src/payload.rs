//! Image payloads and generated variants

use crate::descriptor::Descriptor;
use crate::stage::AgeStage;
use chrono::{DateTime, Utc};
use std::fmt::{self, Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// Opaque compressed raster bytes
///
/// Shared, immutable and cheap to clone: every waiter on a generation and
/// every cache hit hands out the same allocation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ImageBytes(Arc<[u8]>);

impl ImageBytes {
    /// Wrap raw bytes
    #[inline]
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the raw bytes
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Copy into an owned vector
    #[inline]
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Whether two handles share one allocation
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for ImageBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ImageBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ImageBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<&[u8]> for ImageBytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl Debug for ImageBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ImageBytes({} bytes)", self.0.len())
    }
}

/// One rendered artifact for a (subject, stage) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Stage this variant depicts
    pub stage: AgeStage,
    /// Fingerprint of the descriptor it was rendered from
    pub fingerprint: String,
    /// Compressed image payload
    pub bytes: ImageBytes,
    /// When the provider produced it
    pub generated_at: DateTime<Utc>,
}

impl Variant {
    /// Create a variant of `descriptor` stamped with the current time
    #[must_use]
    pub fn new(stage: AgeStage, descriptor: &Descriptor, bytes: impl Into<ImageBytes>) -> Self {
        Self {
            stage,
            fingerprint: descriptor.fingerprint(),
            bytes: bytes.into(),
            generated_at: Utc::now(),
        }
    }

    /// Check if this variant was rendered from `descriptor`
    #[inline]
    #[must_use]
    pub fn rendered_from(&self, descriptor: &Descriptor) -> bool {
        self.fingerprint == descriptor.fingerprint()
    }
}
