//! A single floating text particle.

use ciallo_common::{ParticleId, Rect, SurfaceError};
use serde::{Deserialize, Serialize};

use crate::content::ParticleStyle;
use crate::surface::TextMeasure;

/// How far past the left edge a particle may drift before it expires.
pub const EXPIRY_SLACK: f32 = 5.0;

/// Measured text extent of a particle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TextBounds {
    /// Text width in pixels.
    pub width: f32,
    /// Text height in pixels.
    pub height: f32,
}

impl TextBounds {
    /// Creates new bounds.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// A moving run of text.
///
/// Style and speed are fixed at creation. `x` decreases by `speed` on every
/// advance. Bounds are `None` until a surface has measured the text; an
/// unmeasured particle behaves as if it had zero size.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    id: ParticleId,
    style: ParticleStyle,
    x: f32,
    y: f32,
    bounds: Option<TextBounds>,
    /// Margin applied on first measurement when the text would poke above the top edge.
    top_margin: f32,
}

impl Particle {
    /// Creates an unmeasured particle at `(x, y)`.
    #[must_use]
    pub fn new(style: ParticleStyle, x: f32, y: f32) -> Self {
        Self {
            id: ParticleId::new(),
            style,
            x,
            y,
            bounds: None,
            top_margin: 0.0,
        }
    }

    /// Marks the particle as already measured.
    #[must_use]
    pub fn with_bounds(mut self, bounds: TextBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Sets the margin used by the top-edge adjustment.
    #[must_use]
    pub fn with_top_margin(mut self, margin: f32) -> Self {
        self.top_margin = margin;
        self
    }

    /// Unique identity of this particle.
    #[must_use]
    pub const fn id(&self) -> ParticleId {
        self.id
    }

    /// Cosmetic and motion attributes.
    #[must_use]
    pub const fn style(&self) -> &ParticleStyle {
        &self.style
    }

    /// Pixels moved per advance.
    #[must_use]
    pub const fn speed(&self) -> u32 {
        self.style.speed
    }

    /// Left edge.
    #[must_use]
    pub const fn x(&self) -> f32 {
        self.x
    }

    /// Vertical position.
    #[must_use]
    pub const fn y(&self) -> f32 {
        self.y
    }

    /// Whether a surface has measured the text yet.
    #[must_use]
    pub const fn is_measured(&self) -> bool {
        self.bounds.is_some()
    }

    /// Measured bounds, zero until measured.
    #[must_use]
    pub fn bounds(&self) -> TextBounds {
        self.bounds.unwrap_or_default()
    }

    /// Measures the text once.
    ///
    /// Returns `Ok(true)` when bounds were set by this call. On failure the
    /// particle is left unmeasured and may be measured again later. The first
    /// successful measurement pushes a particle that would render above the
    /// top edge down below its own height plus the top margin.
    pub fn measure(&mut self, measure: &dyn TextMeasure) -> Result<bool, SurfaceError> {
        if self.bounds.is_some() {
            return Ok(false);
        }
        let metrics = measure.measure_text(&self.style.content, &self.style.font, self.style.size)?;
        let height = metrics.height();
        if self.y < height {
            self.y = height + self.top_margin;
        }
        self.bounds = Some(TextBounds::new(metrics.width, height));
        Ok(true)
    }

    /// Moves the particle left by its speed.
    pub fn advance(&mut self) {
        self.x -= self.style.speed as f32;
    }

    /// True once the particle has fully scrolled past the left edge.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.x + self.bounds().width < -EXPIRY_SLACK
    }

    /// Pointer hit test.
    ///
    /// The horizontal band is `[x, x + width]`. Vertically the probe is
    /// offset by the text height, so `py + height` must fall in
    /// `[y, y + height]`.
    #[must_use]
    pub fn is_hit(&self, px: f32, py: f32) -> bool {
        let bounds = self.bounds();
        if px < self.x || px > self.x + bounds.width {
            return false;
        }
        let offset_y = py + bounds.height;
        offset_y >= self.y && offset_y <= self.y + bounds.height
    }

    /// Area in which [`Particle::is_hit`] can succeed.
    #[must_use]
    pub fn hit_rect(&self) -> Rect {
        let bounds = self.bounds();
        Rect::new(self.x, self.y - bounds.height, bounds.width, bounds.height)
    }

    /// Read-only copy of the drawable attributes.
    #[must_use]
    pub fn view(&self) -> ParticleView {
        let bounds = self.bounds();
        ParticleView {
            id: self.id,
            content: self.style.content.clone(),
            color: self.style.color.clone(),
            font: self.style.font.clone(),
            size: self.style.size,
            speed: self.style.speed,
            x: self.x,
            y: self.y,
            width: bounds.width,
            height: bounds.height,
        }
    }
}

/// Drawable snapshot of a particle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleView {
    /// Identity of the particle this was taken from.
    pub id: ParticleId,
    /// Display text.
    pub content: String,
    /// `#rrggbb` color.
    pub color: String,
    /// Font family list.
    pub font: String,
    /// Font size in pixels.
    pub size: u32,
    /// Pixels moved per advance.
    pub speed: u32,
    /// Left edge.
    pub x: f32,
    /// Top of the text.
    pub y: f32,
    /// Measured width, zero when unmeasured.
    pub width: f32,
    /// Measured height, zero when unmeasured.
    pub height: f32,
}
