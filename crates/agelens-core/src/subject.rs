//! Subjects and the registry that bounds how many are kept
//!
//! The registry is a `moka` cache: capacity and TTL evictions are reported to
//! a callback so the owner can drop the subject's variants with it. Eviction
//! is least-recently-used, so a subject just created is never the one dropped.

use crate::config::SubjectLimits;
use agelens_model::{Descriptor, SubjectId};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use std::sync::Arc;

/// A named subject and the descriptor every variant is rendered from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Unique identifier
    pub id: SubjectId,
    /// Display name, trimmed
    pub name: String,
    /// Identity descriptor; reused for every stage
    pub descriptor: Descriptor,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Subject {
    /// Create subject with a fresh id
    #[must_use]
    pub fn new(name: &str, descriptor: Descriptor) -> Self {
        Self {
            id: SubjectId::new(),
            name: name.trim().to_string(),
            descriptor,
            created_at: Utc::now(),
        }
    }

    /// Same subject with another descriptor
    #[must_use]
    pub fn with_descriptor(&self, descriptor: Descriptor) -> Self {
        Self {
            descriptor,
            ..self.clone()
        }
    }
}

/// Bounded subject store
#[derive(Clone)]
pub struct SubjectRegistry {
    inner: Cache<SubjectId, Arc<Subject>>,
}

impl SubjectRegistry {
    /// Create registry; `on_evict` runs for subjects dropped by capacity or
    /// TTL, not for explicit removal or replacement
    pub fn new<F>(limits: &SubjectLimits, on_evict: F) -> Self
    where
        F: Fn(SubjectId) + Send + Sync + 'static,
    {
        let mut builder = Cache::<SubjectId, Arc<Subject>>::builder()
            .max_capacity(limits.max_subjects)
            .eviction_policy(EvictionPolicy::lru());
        if let Some(ttl) = limits.ttl() {
            builder = builder.time_to_live(ttl);
        }
        let inner = builder
            .eviction_listener(move |id: Arc<SubjectId>, _subject, cause: RemovalCause| {
                if cause.was_evicted() {
                    tracing::info!(subject = %id, ?cause, "subject evicted");
                    on_evict(*id);
                }
            })
            .build();
        Self { inner }
    }

    /// Insert (or replace) a subject
    pub async fn insert(&self, subject: Subject) -> Arc<Subject> {
        let subject = Arc::new(subject);
        self.inner.insert(subject.id, Arc::clone(&subject)).await;
        subject
    }

    /// Look up a subject
    pub async fn get(&self, id: SubjectId) -> Option<Arc<Subject>> {
        self.inner.get(&id).await
    }

    /// Remove a subject
    pub async fn remove(&self, id: SubjectId) -> Option<Arc<Subject>> {
        self.inner.remove(&id).await
    }

    /// Apply pending evictions now
    ///
    /// Evictions otherwise happen lazily during later reads and writes.
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Approximate number of subjects held
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl std::fmt::Debug for SubjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectRegistry")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agelens_model::DescriptorBuilder;
    use std::sync::Mutex;

    fn subject(name: &str) -> Subject {
        Subject::new(name, DescriptorBuilder::new().build(name).unwrap())
    }

    #[test]
    fn subject_name_is_trimmed() {
        let s = subject("  Ava ");
        assert_eq!(s.name, "Ava");
    }

    #[test]
    fn with_descriptor_keeps_identity() {
        let s = subject("Ava");
        let fresh = DescriptorBuilder::new().build_salted("Ava", 7).unwrap();
        let replaced = s.with_descriptor(fresh.clone());
        assert_eq!(replaced.id, s.id);
        assert_eq!(replaced.created_at, s.created_at);
        assert_eq!(replaced.descriptor, fresh);
    }

    #[tokio::test]
    async fn explicit_removal_is_not_an_eviction() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let registry = SubjectRegistry::new(&SubjectLimits::default(), move |id| {
            sink.lock().unwrap().push(id);
        });

        let s = registry.insert(subject("Ava")).await;
        assert_eq!(registry.get(s.id).await.unwrap().name, "Ava");
        registry.remove(s.id).await;
        registry.run_pending_tasks().await;

        assert!(registry.get(s.id).await.is_none());
        assert!(evicted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_registry_evicts_the_least_recently_used() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let limits = SubjectLimits {
            max_subjects: 2,
            ttl_secs: None,
        };
        let registry = SubjectRegistry::new(&limits, move |id| {
            sink.lock().unwrap().push(id);
        });

        let ava = registry.insert(subject("Ava")).await;
        let ben = registry.insert(subject("Ben")).await;
        registry.run_pending_tasks().await;
        registry.get(ava.id).await.unwrap();
        let cat = registry.insert(subject("Cat")).await;
        registry.run_pending_tasks().await;

        assert!(registry.get(cat.id).await.is_some());
        assert!(registry.get(ava.id).await.is_some());
        assert!(registry.get(ben.id).await.is_none());
        assert_eq!(*evicted.lock().unwrap(), vec![ben.id]);
    }

    #[tokio::test]
    async fn expired_subjects_are_reported() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let limits = SubjectLimits {
            max_subjects: 10,
            ttl_secs: Some(1),
        };
        let registry = SubjectRegistry::new(&limits, move |id| {
            sink.lock().unwrap().push(id);
        });

        let s = registry.insert(subject("Ava")).await;
        tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;
        registry.run_pending_tasks().await;

        assert!(registry.get(s.id).await.is_none());
        assert_eq!(*evicted.lock().unwrap(), vec![s.id]);
    }
}
