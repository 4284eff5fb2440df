//! Single-flight variant cache
//!
//! Each key moves through `absent → pending → {ready | cleared}`. The pending
//! state holds a shared future that every concurrent caller awaits; the future
//! wraps a spawned task, so generation keeps running even when all callers go
//! away.
//!
//! Invalidation never cancels work. A pending key is marked for discard and
//! a ready key with a store behind it is parked as purging while its stored
//! copy is deleted. Callers that meet either state wait for it to clear and
//! then look again, so they never see the invalidated result.

use crate::error::CacheError;
use crate::key::VariantKey;
use crate::store::VariantStore;
use agelens_model::{AgeStage, Descriptor, SubjectId, Variant};
use agelens_synthesis::SynthesisAdapter;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

type Generation = Shared<BoxFuture<'static, Result<Variant, CacheError>>>;
type Purge = Shared<BoxFuture<'static, ()>>;

/// Per-key state
enum Slot {
    Pending {
        token: u64,
        generation: Generation,
        /// Fingerprint of the descriptor being rendered
        fingerprint: String,
        /// Set by invalidation; the result still reaches current waiters but
        /// is not kept
        discard: bool,
    },
    Ready(Variant),
    /// Invalidated; the stored copy is being deleted before the key reopens
    Purging { token: u64, done: Purge },
}

impl Slot {
    fn is_pending(&self, token: u64) -> bool {
        matches!(self, Slot::Pending { token: t, .. } if *t == token)
    }

    fn is_live(&self, token: u64) -> bool {
        matches!(self, Slot::Pending { token: t, discard: false, .. } if *t == token)
    }

    fn is_purging(&self, token: u64) -> bool {
        matches!(self, Slot::Purging { token: t, .. } if *t == token)
    }
}

/// What a caller does after looking at a slot
enum Step {
    Join(Generation),
    WaitAndRetry(BoxFuture<'static, ()>),
}

/// Observable state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Nothing cached, nothing in flight
    Absent,
    /// Generation in flight
    Pending,
    /// Variant available
    Ready,
}

/// What an invalidation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// Nothing was cached
    Absent,
    /// A ready variant was removed
    Evicted,
    /// An in-flight generation will complete for its waiters but not be kept
    PendingDiscarded,
    /// The entry was rendered from the expected descriptor and left alone
    Kept,
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls answered from a ready entry
    pub hits: u64,
    /// Calls that joined an in-flight generation
    pub joins: u64,
    /// Generations started
    pub generations: u64,
    /// Calls made to the synthesis adapter
    pub upstream_calls: u64,
    /// Generations answered by the variant store
    pub store_hits: u64,
    /// Generations that ended in an error
    pub failures: u64,
    /// Ready entries currently held
    pub ready_entries: usize,
    /// Generations currently in flight
    pub pending_entries: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    joins: AtomicU64,
    generations: AtomicU64,
    upstream_calls: AtomicU64,
    store_hits: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Output of one generating task before it is settled
struct Produced {
    variant: Variant,
    /// False when the variant came back from the store
    fresh: bool,
}

struct Inner {
    slots: DashMap<VariantKey, Slot>,
    adapter: Arc<dyn SynthesisAdapter>,
    store: Option<Arc<dyn VariantStore>>,
    next_token: AtomicU64,
    counters: Counters,
}

/// Keyed `(subject, stage) → Variant` cache with at most one upstream call per
/// key in flight
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct VariantCache {
    inner: Arc<Inner>,
}

impl VariantCache {
    /// Create cache in front of `adapter`
    #[must_use]
    pub fn new(adapter: Arc<dyn SynthesisAdapter>) -> Self {
        Self::build(adapter, None)
    }

    /// Create cache that reads through and writes to `store`
    #[must_use]
    pub fn with_store(adapter: Arc<dyn SynthesisAdapter>, store: Arc<dyn VariantStore>) -> Self {
        Self::build(adapter, Some(store))
    }

    fn build(adapter: Arc<dyn SynthesisAdapter>, store: Option<Arc<dyn VariantStore>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: DashMap::new(),
                adapter,
                store,
                next_token: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// Return the cached variant, join the in-flight generation, or start one
    ///
    /// A generation that has been invalidated is not joined: the caller
    /// waits for it to finish and then starts a new one, so there is still
    /// never more than one upstream call for the key.
    ///
    /// # Errors
    ///
    /// Returns the generation's error. Every caller waiting on the same
    /// generation receives the same error, and the key is left absent.
    pub async fn get_or_generate(
        &self,
        subject: SubjectId,
        stage: AgeStage,
        descriptor: &Descriptor,
    ) -> Result<Variant, CacheError> {
        let key = VariantKey::new(subject, stage);

        loop {
            let step = match self.inner.slots.entry(key) {
                Entry::Occupied(occupied) => match occupied.get() {
                    Slot::Ready(variant) => {
                        Counters::bump(&self.inner.counters.hits);
                        debug!(subject = %subject, stage = %stage, "variant cache hit");
                        return Ok(variant.clone());
                    }
                    Slot::Pending {
                        generation,
                        discard: false,
                        ..
                    } => {
                        Counters::bump(&self.inner.counters.joins);
                        debug!(subject = %subject, stage = %stage, "joining in-flight generation");
                        Step::Join(generation.clone())
                    }
                    Slot::Pending { generation, .. } => {
                        debug!(subject = %subject, stage = %stage, "waiting out discarded generation");
                        Step::WaitAndRetry(generation.clone().map(|_| ()).boxed())
                    }
                    Slot::Purging { done, .. } => Step::WaitAndRetry(done.clone().boxed()),
                },
                Entry::Vacant(vacant) => {
                    let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
                    let generation =
                        Inner::spawn_generation(&self.inner, key, token, descriptor.clone());
                    Counters::bump(&self.inner.counters.generations);
                    vacant.insert(Slot::Pending {
                        token,
                        generation: generation.clone(),
                        fingerprint: descriptor.fingerprint(),
                        discard: false,
                    });
                    Step::Join(generation)
                }
            };

            match step {
                Step::Join(generation) => return generation.await,
                Step::WaitAndRetry(settled) => settled.await,
            }
        }
    }

    /// Ready variant for a key, without waiting or generating
    #[must_use]
    pub fn peek(&self, subject: SubjectId, stage: AgeStage) -> Option<Variant> {
        match self.inner.slots.get(&VariantKey::new(subject, stage))?.value() {
            Slot::Ready(variant) => Some(variant.clone()),
            Slot::Pending { .. } | Slot::Purging { .. } => None,
        }
    }

    /// Current state of a key
    #[must_use]
    pub fn state(&self, subject: SubjectId, stage: AgeStage) -> EntryState {
        match self.inner.slots.get(&VariantKey::new(subject, stage)).as_deref() {
            None | Some(Slot::Purging { .. }) => EntryState::Absent,
            Some(Slot::Pending { .. }) => EntryState::Pending,
            Some(Slot::Ready(_)) => EntryState::Ready,
        }
    }

    /// Drop a key so the next request regenerates it
    ///
    /// In-flight generations are not cancelled; their result is delivered to
    /// current waiters and then discarded. Returns once any stored copy is
    /// gone.
    pub async fn invalidate(&self, subject: SubjectId, stage: AgeStage) -> Invalidation {
        let (outcome, purge) = Inner::detach(&self.inner, VariantKey::new(subject, stage), None);
        if let Some(done) = purge {
            done.await;
        }
        outcome
    }

    /// Invalidate a key unless it holds work rendered from `current`
    ///
    /// Used to drop variants of a descriptor the subject no longer has.
    pub async fn invalidate_stale(
        &self,
        subject: SubjectId,
        stage: AgeStage,
        current: &Descriptor,
    ) -> Invalidation {
        let fingerprint = current.fingerprint();
        let key = VariantKey::new(subject, stage);
        let (outcome, purge) = Inner::detach(&self.inner, key, Some(&fingerprint));
        if let Some(done) = purge {
            done.await;
        }
        outcome
    }

    /// Invalidate all four stages of a subject
    ///
    /// Returns the number of keys that held something.
    pub async fn invalidate_subject(&self, subject: SubjectId) -> usize {
        let mut touched = 0;
        let mut purges = Vec::new();
        for key in VariantKey::all_stages(subject) {
            let (outcome, purge) = Inner::detach(&self.inner, key, None);
            if outcome != Invalidation::Absent {
                touched += 1;
            }
            purges.extend(purge);
        }
        join_all(purges).await;
        touched
    }

    /// Synchronous variant of [`invalidate_subject`](Self::invalidate_subject)
    /// for eviction callbacks
    ///
    /// Store deletes run on the current runtime when there is one.
    pub fn evict_subject(&self, subject: SubjectId) {
        for key in VariantKey::all_stages(subject) {
            Inner::detach(&self.inner, key, None);
        }
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (mut ready_entries, mut pending_entries) = (0, 0);
        for slot in self.inner.slots.iter() {
            match slot.value() {
                Slot::Ready(_) => ready_entries += 1,
                Slot::Pending { .. } => pending_entries += 1,
                Slot::Purging { .. } => {}
            }
        }

        let counters = &self.inner.counters;
        CacheStats {
            hits: counters.hits.load(Ordering::Relaxed),
            joins: counters.joins.load(Ordering::Relaxed),
            generations: counters.generations.load(Ordering::Relaxed),
            upstream_calls: counters.upstream_calls.load(Ordering::Relaxed),
            store_hits: counters.store_hits.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            ready_entries,
            pending_entries,
        }
    }

    /// Number of keys held, including ones still being purged
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    /// Check if no key is held
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }
}

impl Debug for VariantCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantCache")
            .field("entries", &self.inner.slots.len())
            .field("store", &self.inner.store.is_some())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Start the generating task and wrap it in a shareable future
    fn spawn_generation(
        this: &Arc<Self>,
        key: VariantKey,
        token: u64,
        descriptor: Descriptor,
    ) -> Generation {
        let task = {
            let inner = Arc::clone(this);
            tokio::spawn(async move {
                let produced = inner.produce(key, &descriptor).await;
                inner.settle(key, token, produced).await
            })
        };

        let weak: Weak<Self> = Arc::downgrade(this);
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.slots.remove_if(&key, |_, slot| slot.is_pending(token));
                        Counters::bump(&inner.counters.failures);
                    }
                    warn!(key = %key, error = %join_error, "generation task aborted");
                    Err(CacheError::Aborted(join_error.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Store read-through, then the adapter
    async fn produce(&self, key: VariantKey, descriptor: &Descriptor) -> Result<Produced, CacheError> {
        if let Some(store) = &self.store {
            match store.get(key).await {
                Ok(Some(variant)) if variant.rendered_from(descriptor) => {
                    Counters::bump(&self.counters.store_hits);
                    debug!(key = %key, "variant restored from store");
                    return Ok(Produced {
                        variant,
                        fresh: false,
                    });
                }
                Ok(Some(_)) => debug!(key = %key, "stored variant belongs to another descriptor"),
                Ok(None) => {}
                Err(err) => warn!(key = %key, error = %err, "variant store read failed"),
            }
        }

        Counters::bump(&self.counters.upstream_calls);
        info!(
            subject = %key.subject,
            stage = %key.stage,
            fingerprint = %descriptor.short_fingerprint(),
            "generating variant"
        );
        let bytes = self.adapter.generate(descriptor, key.stage).await?;
        Ok(Produced {
            variant: Variant::new(key.stage, descriptor, bytes),
            fresh: true,
        })
    }

    /// Keep a live result (writing it through to the store), otherwise clear
    /// the key
    ///
    /// Store writes and deletes both happen while the key is still pending,
    /// so no new generation can read a discarded variant back from the store.
    async fn settle(
        &self,
        key: VariantKey,
        token: u64,
        produced: Result<Produced, CacheError>,
    ) -> Result<Variant, CacheError> {
        let Produced { variant, fresh } = match produced {
            Ok(produced) => produced,
            Err(err) => {
                self.slots.remove_if(&key, |_, slot| slot.is_pending(token));
                Counters::bump(&self.counters.failures);
                warn!(subject = %key.subject, stage = %key.stage, error = %err, "generation failed");
                return Err(err);
            }
        };

        let live = self.slots.get(&key).is_some_and(|slot| slot.is_live(token));
        if live && fresh {
            if let Some(store) = &self.store {
                if let Err(err) = store.put(key, variant.clone()).await {
                    warn!(key = %key, error = %err, "variant store write failed");
                }
            }
        }

        let kept = match self.slots.get_mut(&key) {
            Some(mut slot) if slot.is_live(token) => {
                *slot = Slot::Ready(variant.clone());
                true
            }
            _ => false,
        };

        if kept {
            info!(subject = %key.subject, stage = %key.stage, "variant ready");
        } else {
            debug!(key = %key, "discarding invalidated generation");
            self.delete_stored(key).await;
            self.slots.remove_if(&key, |_, slot| slot.is_pending(token));
        }
        Ok(variant)
    }

    /// Remove a ready entry or mark a pending one for discard
    ///
    /// With `keep` set, entries rendered from that fingerprint are left in
    /// place. When a store is attached the key is parked as purging until
    /// its stored copy is deleted; the returned future resolves then.
    fn detach(
        this: &Arc<Self>,
        key: VariantKey,
        keep: Option<&str>,
    ) -> (Invalidation, Option<Purge>) {
        match this.slots.entry(key) {
            Entry::Vacant(vacant) => {
                if keep.is_some() {
                    return (Invalidation::Absent, None);
                }
                let purge = Self::start_purge(this, key);
                if let Some((token, done)) = &purge {
                    vacant.insert(Slot::Purging {
                        token: *token,
                        done: done.clone(),
                    });
                }
                (Invalidation::Absent, purge.map(|(_, done)| done))
            }
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                Slot::Purging { done, .. } => (Invalidation::Absent, Some(done.clone())),
                Slot::Pending {
                    fingerprint,
                    discard,
                    ..
                } => {
                    if keep == Some(fingerprint.as_str()) {
                        return (Invalidation::Kept, None);
                    }
                    *discard = true;
                    debug!(key = %key, "in-flight generation marked for discard");
                    (Invalidation::PendingDiscarded, None)
                }
                Slot::Ready(variant) => {
                    if keep == Some(variant.fingerprint.as_str()) {
                        return (Invalidation::Kept, None);
                    }
                    debug!(key = %key, "variant evicted");
                    match Self::start_purge(this, key) {
                        Some((token, done)) => {
                            occupied.insert(Slot::Purging {
                                token,
                                done: done.clone(),
                            });
                            (Invalidation::Evicted, Some(done))
                        }
                        None => {
                            occupied.remove();
                            (Invalidation::Evicted, None)
                        }
                    }
                }
            },
        }
    }

    /// Spawn the store delete for an invalidated key
    ///
    /// Called with the key's shard locked; the task removes the purging slot
    /// only after the caller has inserted it.
    fn start_purge(this: &Arc<Self>, key: VariantKey) -> Option<(u64, Purge)> {
        this.store.as_ref()?;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %key, "no runtime available; stored variant left in place");
            return None;
        };

        let token = this.next_token.fetch_add(1, Ordering::Relaxed);
        let task = {
            let inner = Arc::clone(this);
            runtime.spawn(async move {
                inner.delete_stored(key).await;
                inner.slots.remove_if(&key, |_, slot| slot.is_purging(token));
            })
        };

        let weak: Weak<Self> = Arc::downgrade(this);
        let done = async move {
            if let Err(join_error) = task.await {
                if let Some(inner) = weak.upgrade() {
                    inner.slots.remove_if(&key, |_, slot| slot.is_purging(token));
                }
                warn!(key = %key, error = %join_error, "store purge aborted");
            }
        }
        .boxed()
        .shared();
        Some((token, done))
    }

    async fn delete_stored(&self, key: VariantKey) {
        if let Some(store) = &self.store {
            if let Err(err) = store.delete(key).await {
                warn!(key = %key, error = %err, "variant store delete failed");
            }
        }
    }
}
