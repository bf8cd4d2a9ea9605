//! Drawing surfaces.
//!
//! Particles need a surface twice: once to measure their text (bounds depend
//! on the surface's font metrics) and once per frame to be drawn. Both needs
//! are traits so the field can run against a real canvas, an off-screen
//! raster, or a fixed-metrics stub in tests.
//!
//! [`RasterSurface`] is the software implementation used by the render loop
//! and the offload worker. Text is shaped through a [`FontBook`], glyph
//! coverage is rasterized with swash and blended into an RGBA image, and
//! encoded frames are PNG.

use std::io::Cursor;

use ciallo_common::SurfaceError;
use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use swash::scale::{Render, ScaleContext, Source};
use swash::zeno::Format;

use crate::fonts::FontBook;

/// Largest surface edge accepted, in pixels.
pub const MAX_SURFACE_DIM: u32 = 8192;

/// Measured extent of a run of text.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TextMetrics {
    /// Advance width of the whole run.
    pub width: f32,
    /// Distance from the top of the tallest glyph to the baseline.
    pub ascent: f32,
    /// Distance from the baseline to the bottom of the lowest glyph.
    pub descent: f32,
}

impl TextMetrics {
    /// Ink height of the run.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.ascent + self.descent
    }
}

/// Anything that can measure text.
pub trait TextMeasure {
    /// Measures `text` drawn at `size` pixels in `font`.
    fn measure_text(&self, text: &str, font: &str, size: u32) -> Result<TextMetrics, SurfaceError>;
}

/// A surface the render loop draws frames onto.
///
/// Text is positioned with a top baseline: `y` is the top of the em box.
pub trait DrawSurface: TextMeasure {
    /// Surface width in pixels.
    fn width(&self) -> u32;

    /// Surface height in pixels.
    fn height(&self) -> u32;

    /// Resizes the surface, discarding its contents.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError>;

    /// Clears the whole surface to transparent.
    fn clear(&mut self);

    /// Draws `text` with the top-left corner of its em box at `(x, y)`.
    fn fill_text(&mut self, text: &str, font: &str, size: u32, color: &str, x: f32, y: f32);

    /// Encodes the current contents for transfer to another context.
    fn encode_frame(&self) -> Result<FrameBlob, SurfaceError>;
}

/// An encoded frame, ready to be blitted by the display context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBlob {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// PNG-encoded pixels.
    pub png: Vec<u8>,
}

/// Parses a `#rrggbb` color into opaque RGBA.
///
/// Shorter digit strings are read as a plain hex number, so `#ff` is the same
/// color as `#0000ff`.
#[must_use]
pub fn parse_color(color: &str) -> Option<[u8; 4]> {
    let digits = color.strip_prefix('#')?;
    if digits.is_empty() || digits.len() > 6 {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    let [_, r, g, b] = value.to_be_bytes();
    Some([r, g, b, 255])
}

/// Software raster surface backed by an RGBA image.
pub struct RasterSurface {
    image: RgbaImage,
    fonts: FontBook,
    scale: ScaleContext,
}

impl RasterSurface {
    /// Creates a transparent surface using the installed system fonts.
    ///
    /// Fails with [`SurfaceError::Unavailable`] when no font can be loaded.
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        check_size(width, height)?;
        Self::with_fonts(width, height, FontBook::system()?)
    }

    /// Creates a transparent surface drawing with `fonts`.
    pub fn with_fonts(width: u32, height: u32, fonts: FontBook) -> Result<Self, SurfaceError> {
        check_size(width, height)?;
        Ok(Self {
            image: RgbaImage::new(width, height),
            fonts,
            scale: ScaleContext::new(),
        })
    }

    /// Reads back a pixel, `None` when out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Number of non-transparent pixels.
    #[must_use]
    pub fn painted_pixels(&self) -> usize {
        self.image.pixels().filter(|p| p.0[3] != 0).count()
    }
}

impl std::fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSurface")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("fonts", &self.fonts)
            .finish_non_exhaustive()
    }
}

fn check_size(width: u32, height: u32) -> Result<(), SurfaceError> {
    if width == 0 || height == 0 || width > MAX_SURFACE_DIM || height > MAX_SURFACE_DIM {
        return Err(SurfaceError::InvalidSize { width, height });
    }
    Ok(())
}

/// Blends an 8-bit coverage mask in `color` over the image, source-over.
fn blend_mask(image: &mut RgbaImage, mask: &[u8], mask_width: u32, left: i32, top: i32, color: [u8; 4]) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    for (i, &coverage) in mask.iter().enumerate() {
        if coverage == 0 {
            continue;
        }
        let px = left + (i as u32 % mask_width) as i32;
        let py = top + (i as u32 / mask_width) as i32;
        if px < 0 || py < 0 || px >= width || py >= height {
            continue;
        }

        let pixel = image.get_pixel_mut(px as u32, py as u32);
        let src_a = f32::from(coverage) / 255.0;
        let dst_a = f32::from(pixel.0[3]) / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        let mut out = [0u8; 4];
        for c in 0..3 {
            let src = f32::from(color[c]) * src_a;
            let dst = f32::from(pixel.0[c]) * dst_a * (1.0 - src_a);
            out[c] = ((src + dst) / out_a).round().clamp(0.0, 255.0) as u8;
        }
        out[3] = (out_a * 255.0).round() as u8;
        *pixel = Rgba(out);
    }
}

impl TextMeasure for RasterSurface {
    fn measure_text(&self, text: &str, font: &str, size: u32) -> Result<TextMetrics, SurfaceError> {
        let run = self.fonts.resolve(font)?.shape(text, size as f32)?;
        Ok(TextMetrics {
            width: run.width,
            ascent: run.ascent,
            descent: run.descent,
        })
    }
}

impl DrawSurface for RasterSurface {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        check_size(width, height)?;
        self.image = RgbaImage::new(width, height);
        Ok(())
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn fill_text(&mut self, text: &str, font: &str, size: u32, color: &str, x: f32, y: f32) {
        let Some(rgba) = parse_color(color) else {
            return;
        };
        if size == 0 {
            return;
        }
        let Ok(face) = self.fonts.resolve(font) else {
            return;
        };
        let size = size as f32;
        let Ok(run) = face.shape(text, size) else {
            return;
        };
        let Some(font_ref) = swash::FontRef::from_index(face.data(), face.index() as usize) else {
            return;
        };

        let Self { image, scale, .. } = self;
        let mut scaler = scale.builder(font_ref).size(size).hint(false).build();
        let baseline = y + face.baseline(size);
        for glyph in &run.glyphs {
            let Some(mask) = Render::new(&[Source::Outline])
                .format(Format::Alpha)
                .render(&mut scaler, glyph.id)
            else {
                continue;
            };
            let left = (x + glyph.x).round() as i32 + mask.placement.left;
            let top = (baseline - glyph.y).round() as i32 - mask.placement.top;
            blend_mask(image, &mask.data, mask.placement.width, left, top, rgba);
        }
    }

    fn encode_frame(&self) -> Result<FrameBlob, SurfaceError> {
        let mut png = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| SurfaceError::Encode(e.to_string()))?;
        Ok(FrameBlob {
            width: self.image.width(),
            height: self.image.height(),
            png,
        })
    }
}
