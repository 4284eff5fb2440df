//! AgeLens Core - subject orchestration
//!
//! Ties the workspace together:
//! - Derives one identity descriptor per subject and reuses it for every stage
//! - Routes every variant request through the single-flight cache
//! - Bounds the number and lifetime of subjects, dropping their variants on eviction
//! - Watermarks generated variants for export
//!
//! # Example
//!
//! ```rust,ignore
//! use agelens_core::{AgelensConfig, Orchestrator};
//! use agelens_model::AgeStage;
//!
//! # async fn example(adapter: std::sync::Arc<dyn agelens_synthesis::SynthesisAdapter>)
//! #     -> Result<(), agelens_core::AgelensError> {
//! let orchestrator = Orchestrator::new(AgelensConfig::default(), adapter);
//!
//! let ava = orchestrator.create_subject("Ava").await?;
//! orchestrator.get_variant(ava.id, AgeStage::Child).await?;
//! let png = orchestrator.export(ava.id, AgeStage::Child, "Child").await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod subject;

pub use config::{AgelensConfig, ConfigError, RegeneratePolicy, SubjectLimits, WatermarkConfig};
pub use error::{AgelensError, NotFound};
pub use orchestrator::{CreatedSubject, Orchestrator};
pub use subject::{Subject, SubjectRegistry};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with AgeLens Core
    pub use crate::{AgelensConfig, AgelensError, CreatedSubject, Orchestrator, RegeneratePolicy};
    pub use agelens_model::{AgeStage, ImageBytes, SubjectId, Variant};
    pub use agelens_synthesis::SynthesisAdapter;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
