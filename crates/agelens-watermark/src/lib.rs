//! AgeLens Watermark Compositor
//!
//! Burns a `"{name} – {label}"` caption into an exported variant. The caption
//! is described as SVG, rasterized with `resvg` and alpha-composited onto the
//! decoded image, so output is byte-identical for identical inputs.
//!
//! # Example
//!
//! ```no_run
//! use agelens_watermark::{Compositor, LayoutPolicy, OutputFormat};
//!
//! # fn demo(png: &[u8]) -> Result<(), agelens_watermark::RenderError> {
//! let compositor = Compositor::new(LayoutPolicy::default(), OutputFormat::Png);
//! let labeled = compositor.apply(png, "Ava – Child")?;
//! assert!(!labeled.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod compositor;
pub mod error;
pub mod layout;

pub use compositor::{Compositor, OutputFormat};
pub use error::RenderError;
pub use layout::{Corner, LayoutPolicy, Placement};
