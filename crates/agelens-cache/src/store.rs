//! Optional persistence behind the cache
//!
//! A store only needs get/put/delete by [`VariantKey`]. Deduplication of
//! in-flight work is the cache's job, not the store's.

use crate::error::StoreError;
use crate::key::VariantKey;
use agelens_model::Variant;
use async_trait::async_trait;
use dashmap::DashMap;

/// Durable (or at least longer-lived) variant storage
#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Fetch a stored variant
    async fn get(&self, key: VariantKey) -> Result<Option<Variant>, StoreError>;

    /// Store or replace a variant
    async fn put(&self, key: VariantKey, variant: Variant) -> Result<(), StoreError>;

    /// Remove a variant; removing an absent key is not an error
    async fn delete(&self, key: VariantKey) -> Result<(), StoreError>;
}

/// In-memory [`VariantStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<VariantKey, Variant>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored variants
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if `key` is stored
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &VariantKey) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl VariantStore for MemoryStore {
    async fn get(&self, key: VariantKey) -> Result<Option<Variant>, StoreError> {
        Ok(self.entries.get(&key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: VariantKey, variant: Variant) -> Result<(), StoreError> {
        self.entries.insert(key, variant);
        Ok(())
    }

    async fn delete(&self, key: VariantKey) -> Result<(), StoreError> {
        self.entries.remove(&key);
        Ok(())
    }
}
