//! AgeLens orchestrator
//!
//! Owns the subject registry, the variant cache and the compositor, and
//! exposes the four caller-facing operations:
//! - `create_subject`: derive the descriptor and render the infant stage
//! - `get_variant`: any stage, generated at most once
//! - `export`: watermark a stage that has already been generated
//! - `regenerate`: drop every stage and render the infant again

use crate::config::{AgelensConfig, RegeneratePolicy};
use crate::error::{AgelensError, NotFound};
use crate::subject::{Subject, SubjectRegistry};
use agelens_cache::{CacheStats, VariantCache, VariantStore};
use agelens_model::{AgeStage, DescriptorBuilder, ImageBytes, SubjectId, Variant};
use agelens_synthesis::{RetryingAdapter, SynthesisAdapter};
use agelens_watermark::Compositor;
use futures::future::try_join_all;
use std::sync::Arc;

/// Result of [`Orchestrator::create_subject`]
#[derive(Debug, Clone)]
pub struct CreatedSubject {
    /// Assigned identifier
    pub id: SubjectId,
    /// Display name, trimmed
    pub name: String,
    /// Base artifact
    pub infant: Variant,
}

/// The central coordinator
///
/// Construct once and share; all operations take `&self`.
#[derive(Debug)]
pub struct Orchestrator {
    /// Configuration
    config: AgelensConfig,
    /// Name → descriptor derivation
    descriptors: DescriptorBuilder,
    /// Subject lifetime bounds
    subjects: SubjectRegistry,
    /// Generated variants
    cache: VariantCache,
    /// Export watermarking
    compositor: Compositor,
}

impl Orchestrator {
    /// Create orchestrator in front of `adapter`
    ///
    /// The adapter is wrapped in the configured retry policy.
    #[must_use]
    pub fn new(config: AgelensConfig, adapter: Arc<dyn SynthesisAdapter>) -> Self {
        Self::build(config, adapter, None)
    }

    /// Create orchestrator whose variants are also written to `store`
    #[must_use]
    pub fn with_store(
        config: AgelensConfig,
        adapter: Arc<dyn SynthesisAdapter>,
        store: Arc<dyn VariantStore>,
    ) -> Self {
        Self::build(config, adapter, Some(store))
    }

    fn build(
        config: AgelensConfig,
        adapter: Arc<dyn SynthesisAdapter>,
        store: Option<Arc<dyn VariantStore>>,
    ) -> Self {
        let adapter: Arc<dyn SynthesisAdapter> =
            Arc::new(RetryingAdapter::new(adapter, config.retry));
        let cache = match store {
            Some(store) => VariantCache::with_store(adapter, store),
            None => VariantCache::new(adapter),
        };

        let evicting = cache.clone();
        let subjects =
            SubjectRegistry::new(&config.subjects, move |id| evicting.evict_subject(id));
        let compositor =
            Compositor::new(config.watermark.layout.clone(), config.watermark.output);

        Self {
            config,
            descriptors: DescriptorBuilder::new(),
            subjects,
            cache,
            compositor,
        }
    }

    /// Register a subject and render its infant stage
    ///
    /// # Errors
    ///
    /// `Validation` for an empty name; `Upstream`/`Generation` if the infant
    /// stage cannot be produced, in which case the subject is not kept.
    pub async fn create_subject(&self, name: &str) -> Result<CreatedSubject, AgelensError> {
        let descriptor = self.descriptors.build(name)?;
        let subject = self.subjects.insert(Subject::new(name, descriptor)).await;
        tracing::info!(
            subject = %subject.id,
            name = %subject.name,
            fingerprint = %subject.descriptor.short_fingerprint(),
            "subject created"
        );

        match self
            .cache
            .get_or_generate(subject.id, AgeStage::Infant, &subject.descriptor)
            .await
        {
            Ok(infant) => Ok(CreatedSubject {
                id: subject.id,
                name: subject.name.clone(),
                infant,
            }),
            Err(err) => {
                tracing::warn!(
                    subject = %subject.id,
                    error = %err,
                    "infant generation failed; discarding subject"
                );
                self.subjects.remove(subject.id).await;
                self.cache.invalidate_subject(subject.id).await;
                Err(err.into())
            }
        }
    }

    /// Stored subject
    ///
    /// # Errors
    ///
    /// `NotFound` if the subject was never created or has been evicted.
    pub async fn subject(&self, id: SubjectId) -> Result<Arc<Subject>, AgelensError> {
        self.subjects
            .get(id)
            .await
            .ok_or_else(|| NotFound::Subject(id).into())
    }

    /// Variant for one stage, generating it on first request
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown subject; `Upstream`/`Generation` if
    /// generation fails.
    pub async fn get_variant(
        &self,
        id: SubjectId,
        stage: AgeStage,
    ) -> Result<Variant, AgelensError> {
        self.fresh_variant(id, stage).await
    }

    /// All four stages, in life order, generated concurrently
    ///
    /// # Errors
    ///
    /// As [`get_variant`](Self::get_variant); the first failure is returned.
    pub async fn get_all_variants(&self, id: SubjectId) -> Result<Vec<Variant>, AgelensError> {
        let requests = AgeStage::ALL.map(|stage| self.fresh_variant(id, stage));
        try_join_all(requests).await
    }

    /// Watermarked copy of an already generated stage
    ///
    /// The caption reads `"{name} – {label}"`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown subject or a stage never generated;
    /// `Render` if the stored bytes cannot be watermarked.
    pub async fn export(
        &self,
        id: SubjectId,
        stage: AgeStage,
        label: &str,
    ) -> Result<ImageBytes, AgelensError> {
        let subject = self.subject(id).await?;
        let variant = self
            .cache
            .peek(id, stage)
            .ok_or(NotFound::Variant { subject: id, stage })?;

        let caption = format!("{} – {}", subject.name, label);
        let compositor = self.compositor.clone();
        let rendered =
            tokio::task::spawn_blocking(move || compositor.apply(&variant.bytes, &caption))
                .await
                .map_err(|err| AgelensError::Generation(err.to_string()))?;

        rendered.map_err(|err| {
            tracing::error!(
                subject = %id,
                stage = %stage,
                error = %err,
                "cannot watermark stored variant"
            );
            err.into()
        })
    }

    /// Drop every stage and render the infant again
    ///
    /// With [`RegeneratePolicy::FreshDescriptor`] the subject gets a new
    /// descriptor first, used for all later stages too.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown subject; `Upstream`/`Generation` if the
    /// infant stage cannot be produced.
    pub async fn regenerate(&self, id: SubjectId) -> Result<Variant, AgelensError> {
        let mut subject = self.subject(id).await?;
        // The new descriptor goes in first so nothing generated after the
        // invalidation can be rendered from the old one.
        if self.config.regenerate == RegeneratePolicy::FreshDescriptor {
            let descriptor = self.descriptors.build_fresh(&subject.name)?;
            subject = self.subjects.insert(subject.with_descriptor(descriptor)).await;
        }
        let dropped = self.cache.invalidate_subject(id).await;

        tracing::info!(
            subject = %id,
            dropped,
            policy = ?self.config.regenerate,
            fingerprint = %subject.descriptor.short_fingerprint(),
            "regenerating subject"
        );

        self.fresh_variant(id, AgeStage::Infant).await
    }

    /// Variant rendered from the subject's current descriptor
    ///
    /// A concurrent `regenerate` can swap the descriptor while a generation
    /// is in flight; such a result is dropped and the stage requested again.
    async fn fresh_variant(&self, id: SubjectId, stage: AgeStage) -> Result<Variant, AgelensError> {
        loop {
            let subject = self.subject(id).await?;
            let variant = self
                .cache
                .get_or_generate(id, stage, &subject.descriptor)
                .await?;

            let current = self.subject(id).await?;
            if variant.rendered_from(&current.descriptor) {
                return Ok(variant);
            }
            tracing::debug!(
                subject = %id,
                stage = %stage,
                fingerprint = %current.descriptor.short_fingerprint(),
                "variant outdated by a newer descriptor"
            );
            self.cache
                .invalidate_stale(id, stage, &current.descriptor)
                .await;
        }
    }

    /// Variant cache counters
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &AgelensConfig {
        &self.config
    }

    /// Subject registry
    #[must_use]
    pub fn subjects(&self) -> &SubjectRegistry {
        &self.subjects
    }

    /// Variant cache
    #[must_use]
    pub fn cache(&self) -> &VariantCache {
        &self.cache
    }
}
