//! Caption geometry
//!
//! Everything here is plain arithmetic on the image size and caption length.
//! Glyphs are not measured; the caption width is estimated from the character
//! count, which keeps placement independent of the fonts installed.

use serde::{Deserialize, Serialize};

/// Average advance of a bold sans-serif glyph, in ems
const GLYPH_ADVANCE_EM: f64 = 0.6;

/// Backing box height, in ems
const LINE_HEIGHT_EM: f64 = 1.25;

/// Where the caption box sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    /// Top left
    TopLeft,
    /// Top right
    TopRight,
    /// Bottom left
    BottomLeft,
    /// Bottom right
    #[default]
    BottomRight,
    /// Horizontally centred along the bottom edge
    BottomCenter,
}

/// Fixed layout rules for the caption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutPolicy {
    /// Caption box position
    pub corner: Corner,
    /// Font size as a fraction of image height
    pub font_scale: f64,
    /// Lower bound on font size, in pixels
    pub min_font_px: f64,
    /// Distance from the image edge, in ems
    pub margin_em: f64,
    /// Space between box edge and text, in ems
    pub padding_em: f64,
    /// Opacity of the dark backing box
    pub backing_alpha: u8,
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        Self {
            corner: Corner::BottomRight,
            font_scale: 0.04,
            min_font_px: 20.0,
            margin_em: 1.0,
            padding_em: 0.5,
            backing_alpha: 180,
        }
    }
}

/// Resolved caption box, in image pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Box left edge
    pub x: f64,
    /// Box top edge
    pub y: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
    /// Font size
    pub font_px: f64,
    /// Inner padding
    pub padding: f64,
}

impl Placement {
    /// Left end of the text baseline
    #[must_use]
    pub fn text_origin(&self) -> (f64, f64) {
        // Baseline sits about one em below the top of the line box.
        let line_top = self.y + (self.height - self.font_px * LINE_HEIGHT_EM).max(0.0) / 2.0;
        (self.x + self.padding, line_top + self.font_px)
    }
}

impl LayoutPolicy {
    /// Place a caption of `text` on a `width` x `height` image
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn place(&self, width: u32, height: u32, text: &str) -> Placement {
        let (w, h) = (f64::from(width), f64::from(height));

        let mut font_px = (h * self.font_scale).max(self.min_font_px).min(h / 2.0);
        let margin = (font_px * self.margin_em).min(w.min(h) * 0.05);

        // Shrink the font until the estimated caption fits between the margins.
        let room = (w - 2.0 * margin).max(0.0);
        let caption_em = text.chars().count() as f64 * GLYPH_ADVANCE_EM + 2.0 * self.padding_em;
        if caption_em > 0.0 && font_px * caption_em > room {
            font_px = room / caption_em;
        }
        let padding = font_px * self.padding_em;

        let text_width = text.chars().count() as f64 * font_px * GLYPH_ADVANCE_EM;
        let box_width = (text_width + 2.0 * padding).min(room);
        let box_height = (font_px * LINE_HEIGHT_EM + 2.0 * padding).min((h - 2.0 * margin).max(0.0));

        let left = margin;
        let right = w - margin - box_width;
        let top = margin;
        let bottom = h - margin - box_height;

        let (x, y) = match self.corner {
            Corner::TopLeft => (left, top),
            Corner::TopRight => (right, top),
            Corner::BottomLeft => (left, bottom),
            Corner::BottomRight => (right, bottom),
            Corner::BottomCenter => ((w - box_width) / 2.0, bottom),
        };

        Placement {
            x: x.max(0.0),
            y: y.max(0.0),
            width: box_width,
            height: box_height,
            font_px,
            padding,
        }
    }
}
