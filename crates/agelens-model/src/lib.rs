//! AgeLens Model
//!
//! Plain data shared by every layer of the variant pipeline.
//!
//! # Core Concepts
//!
//! - [`AgeStage`]: the four fixed life stages a subject is rendered at
//! - [`Descriptor`]: stable seed + attribute set keeping all stages "the same person"
//! - [`DescriptorBuilder`]: derives a [`Descriptor`] from a subject name
//! - [`SubjectId`]: opaque ULID handle for a generation session
//! - [`ImageBytes`] / [`Variant`]: opaque compressed raster payloads
//!
//! # Example
//!
//! ```rust
//! use agelens_model::{AgeStage, DescriptorBuilder};
//!
//! let builder = DescriptorBuilder::new();
//! let descriptor = builder.build("  Ava ").unwrap();
//!
//! assert_eq!(descriptor.name(), "Ava");
//! assert_eq!(descriptor, builder.build("Ava").unwrap());
//! assert_eq!("baby".parse::<AgeStage>().unwrap(), AgeStage::Infant);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod descriptor;
mod error;
mod ids;
mod payload;
mod stage;

pub use descriptor::{Attributes, Descriptor, DescriptorBuilder};
pub use error::IdentityError;
pub use ids::SubjectId;
pub use payload::{ImageBytes, Variant};
pub use stage::AgeStage;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
