//! Overlay rendering and compositing

use crate::error::RenderError;
use crate::layout::{LayoutPolicy, Placement};
use agelens_model::ImageBytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Caption face shipped with the crate
const CAPTION_FONT: &[u8] = include_bytes!("../fonts/DejaVuSans-Bold.ttf");

/// Family name of [`CAPTION_FONT`]
const CAPTION_FAMILY: &str = "DejaVu Sans";

/// Bundled face first, then system fonts for glyphs it lacks
static FONTS: Lazy<Arc<usvg::fontdb::Database>> = Lazy::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_font_data(CAPTION_FONT.to_vec());
    db.set_sans_serif_family(CAPTION_FAMILY);
    db.load_system_fonts();
    debug!(faces = db.len(), "loaded caption fonts");
    Arc::new(db)
});

/// Encoding of watermarked output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum OutputFormat {
    /// Lossless PNG
    #[default]
    Png,
    /// JPEG at the given quality (1-100)
    Jpeg {
        /// Encoder quality
        quality: u8,
    },
}

impl OutputFormat {
    /// Conventional file extension
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }
}

/// Pure `(image bytes, label) → image bytes` transform
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    layout: LayoutPolicy,
    format: OutputFormat,
}

impl Compositor {
    /// Create compositor
    #[must_use]
    pub fn new(layout: LayoutPolicy, format: OutputFormat) -> Self {
        Self { layout, format }
    }

    /// Layout in use
    #[must_use]
    pub fn layout(&self) -> &LayoutPolicy {
        &self.layout
    }

    /// Output encoding in use
    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Burn `label` into `image`
    ///
    /// The result has the input's dimensions and is encoded per
    /// [`OutputFormat`].
    ///
    /// # Errors
    ///
    /// [`RenderError::Decode`] when `image` is not a decodable raster;
    /// [`RenderError::Overlay`] / [`RenderError::Encode`] when the caption
    /// cannot be drawn or the result cannot be written.
    pub fn apply(&self, image: &[u8], label: &str) -> Result<ImageBytes, RenderError> {
        let decoded =
            image::load_from_memory(image).map_err(|e| RenderError::Decode(e.to_string()))?;
        let mut canvas = decoded.to_rgba8();
        let (width, height) = canvas.dimensions();

        let placement = self.layout.place(width, height, label);
        debug!(width, height, ?placement, "placing caption");

        let svg = overlay_svg(width, height, label, &placement, self.layout.backing_alpha);
        let overlay = rasterize(width, height, &svg, !label.trim().is_empty(), &FONTS)?;
        blend_premultiplied(&mut canvas, overlay.data());

        encode(canvas, self.format).map(ImageBytes::from)
    }
}

fn rasterize(
    width: u32,
    height: u32,
    svg: &str,
    expect_text: bool,
    fontdb: &Arc<usvg::fontdb::Database>,
) -> Result<resvg::tiny_skia::Pixmap, RenderError> {
    let options = usvg::Options {
        fontdb: Arc::clone(fontdb),
        ..Default::default()
    };
    let tree =
        usvg::Tree::from_str(svg, &options).map_err(|e| RenderError::Overlay(e.to_string()))?;
    // usvg drops text it cannot shape instead of failing.
    if expect_text && !has_text(tree.root()) {
        return Err(RenderError::Overlay("caption text could not be shaped".to_string()));
    }

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| RenderError::Overlay(format!("cannot allocate {width}x{height} overlay")))?;
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap.as_mut());
    Ok(pixmap)
}

fn has_text(group: &usvg::Group) -> bool {
    group.children().iter().any(|node| match node {
        usvg::Node::Text(_) => true,
        usvg::Node::Group(inner) => has_text(inner),
        _ => false,
    })
}

/// Caption as a standalone SVG document the size of the image
fn overlay_svg(width: u32, height: u32, label: &str, p: &Placement, alpha: u8) -> String {
    let (text_x, text_y) = p.text_origin();
    let mut svg = String::with_capacity(512);
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    let _ = write!(
        svg,
        r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="black" fill-opacity="{:.4}"/>"#,
        p.x,
        p.y,
        p.width,
        p.height,
        f32::from(alpha) / 255.0
    );
    let _ = write!(
        svg,
        r#"<text x="{text_x:.2}" y="{text_y:.2}" font-family="{CAPTION_FAMILY}, sans-serif" font-weight="bold" font-size="{:.2}" fill="white">{}</text>"#,
        p.font_px,
        escape_xml(label)
    );
    svg.push_str("</svg>");
    svg
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Source-over blend of a premultiplied RGBA overlay onto straight RGBA
fn blend_premultiplied(canvas: &mut RgbaImage, overlay: &[u8]) {
    for (dst, src) in canvas.chunks_exact_mut(4).zip(overlay.chunks_exact(4)) {
        let alpha = u16::from(src[3]);
        if alpha == 0 {
            continue;
        }
        let keep = 255 - alpha;
        for i in 0..3 {
            let value = u16::from(src[i]) + u16::from(dst[i]) * keep / 255;
            dst[i] = u8::try_from(value).unwrap_or(u8::MAX);
        }
        let value = alpha + u16::from(dst[3]) * keep / 255;
        dst[3] = u8::try_from(value).unwrap_or(u8::MAX);
    }
}

fn encode(canvas: RgbaImage, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
    let mut out = Vec::new();
    match format {
        OutputFormat::Png => DynamicImage::ImageRgba8(canvas)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .map_err(|e| RenderError::Encode(e.to_string()))?,
        OutputFormat::Jpeg { quality } => {
            let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                .encode_image(&rgb)
                .map_err(|e| RenderError::Encode(e.to_string()))?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_escaped() {
        assert_eq!(escape_xml("Tom & <Jerry>"), "Tom &amp; &lt;Jerry&gt;");
        assert_eq!(escape_xml("O'Neil \"Jr\""), "O&apos;Neil &quot;Jr&quot;");
    }

    #[test]
    fn overlay_svg_parses() {
        let layout = LayoutPolicy::default();
        let p = layout.place(400, 300, "Ava & Co – Teen");
        let svg = overlay_svg(400, 300, "Ava & Co – Teen", &p, layout.backing_alpha);
        assert!(svg.contains("Ava &amp; Co – Teen"));
        assert!(usvg::Tree::from_str(&svg, &usvg::Options::default()).is_ok());
    }

    #[test]
    fn bundled_face_shapes_the_caption() {
        let options = usvg::Options {
            fontdb: Arc::clone(&FONTS),
            ..Default::default()
        };
        let layout = LayoutPolicy::default();
        let p = layout.place(400, 300, "Ava – Teen");
        let svg = overlay_svg(400, 300, "Ava – Teen", &p, layout.backing_alpha);
        let tree = usvg::Tree::from_str(&svg, &options).unwrap();
        assert!(has_text(tree.root()));
    }

    #[test]
    fn missing_fonts_are_an_overlay_error() {
        let svg = overlay_svg(
            100,
            50,
            "Ava",
            &LayoutPolicy::default().place(100, 50, "Ava"),
            180,
        );
        let no_fonts = Arc::new(usvg::fontdb::Database::new());
        assert!(matches!(
            rasterize(100, 50, &svg, true, &no_fonts),
            Err(RenderError::Overlay(_))
        ));
        assert!(rasterize(100, 50, &svg, true, &FONTS).is_ok());
    }

    #[test]
    fn blend_respects_alpha() {
        let mut canvas = RgbaImage::from_pixel(2, 1, image::Rgba([200, 100, 50, 255]));
        // Opaque white, then transparent.
        let overlay = [255, 255, 255, 255, 0, 0, 0, 0];
        blend_premultiplied(&mut canvas, &overlay);
        assert_eq!(canvas.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(canvas.get_pixel(1, 0).0, [200, 100, 50, 255]);
    }

    #[test]
    fn half_black_overlay_darkens() {
        let mut canvas = RgbaImage::from_pixel(1, 1, image::Rgba([200, 200, 200, 255]));
        blend_premultiplied(&mut canvas, &[0, 0, 0, 128]);
        let px = canvas.get_pixel(0, 0).0;
        assert_eq!(u32::from(px[0]), 200 * 127 / 255);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn extensions() {
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert_eq!(OutputFormat::Jpeg { quality: 95 }.extension(), "jpg");
    }
}
