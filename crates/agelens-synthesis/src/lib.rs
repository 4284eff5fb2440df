//! AgeLens Synthesis
//!
//! The boundary to the external image-generation provider.
//!
//! # Core Operations
//!
//! - [`SynthesisAdapter`]: `(descriptor, stage) -> image bytes | UpstreamError`
//! - [`RetryingAdapter`]: per-attempt timeout + bounded exponential retry
//!   around any adapter; permanent failures pass straight through
//! - [`HttpSynthesisAdapter`]: JSON-over-HTTP provider client
//! - [`prompt::render`]: the text prompt a provider receives for a stage
//!
//! # Example
//!
//! ```rust,ignore
//! use agelens_synthesis::{HttpSynthesisAdapter, ProviderConfig, RetryPolicy, RetryingAdapter};
//!
//! let http = HttpSynthesisAdapter::from_config(&ProviderConfig::default())?;
//! let adapter = RetryingAdapter::new(http, RetryPolicy::default());
//! let png = adapter.generate(&descriptor, AgeStage::Teen).await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod adapter;
pub mod error;
pub mod http;
pub mod prompt;
pub mod retry;

pub use adapter::SynthesisAdapter;
pub use error::{ProviderSetupError, UpstreamError};
pub use http::{HttpSynthesisAdapter, ProviderConfig};
pub use retry::{RetryPolicy, RetryingAdapter};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
