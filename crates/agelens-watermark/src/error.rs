//! Error types for the compositor

/// Watermarking failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Input bytes are not a decodable image
    #[error("cannot decode image: {0}")]
    Decode(String),

    /// Caption overlay could not be built
    #[error("cannot build overlay: {0}")]
    Overlay(String),

    /// Composited image could not be encoded
    #[error("cannot encode image: {0}")]
    Encode(String),
}
