//! AgeLens Variant Cache
//!
//! Single source of truth for generated variants, and the component that
//! keeps the expensive provider from being called twice for the same work.
//!
//! # Guarantees
//!
//! - **Single-flight**: at most one upstream call per `(subject, stage)` at
//!   any time, regardless of caller concurrency
//! - **Per-key isolation**: the key map is sharded; waiting happens on a
//!   per-key shared future, never on a map-wide lock
//! - **Self-healing failures**: failed generations leave no entry behind
//! - **Cancellation safety**: generation runs on its own task, so a caller
//!   giving up never cancels work other callers are waiting on
//! - **No stale reads**: invalidated results are never joined, kept, or read
//!   back from the store
//!
//! # Architecture
//!
//! ```text
//! get_or_generate ──► slot map ──► Ready ─────────────► Variant
//!                        │
//!                        ├─► Pending ─► join shared ──► Variant | CacheError
//!                        │
//!                        ├─► discarded / Purging ─► wait, look again
//!                        │
//!                        └─► absent ─► spawn: store? ─► adapter ─► settle ─► store put
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod error;
pub mod key;
pub mod store;

pub use cache::{CacheStats, EntryState, Invalidation, VariantCache};
pub use error::{CacheError, StoreError};
pub use key::VariantKey;
pub use store::{MemoryStore, VariantStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
