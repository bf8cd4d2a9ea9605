//! Random particle content.
//!
//! Every new particle draws its phrase, font, color, speed and size from a
//! [`ContentSource`]. The source owns its own RNG so a seeded source produces
//! a reproducible field.

use serde::{Deserialize, Serialize};

/// Phrases a particle can display.
pub const PHRASES: [&str; 2] = ["Ciallo～(∠・ω< )⌒★", "Ciallo～(∠・ω< )⌒☆"];

/// Font families a particle can be drawn with.
pub const FONTS: [&str; 3] = [
    "Arial, sans-serif",
    "Georgia, serif",
    "Times New Roman, serif",
];

/// Largest color value produced (`0xFFFFFF` itself is never drawn).
pub const MAX_COLOR: u32 = 0x00FF_FFFE;

/// Speed range in pixels per frame.
pub const SPEED_RANGE: std::ops::RangeInclusive<u32> = 1..=9;

/// Font size range in pixels.
pub const SIZE_RANGE: std::ops::RangeInclusive<u32> = 10..=49;

/// Extra downward margin for particles spawned against the top edge.
pub const TOP_MARGIN_RANGE: std::ops::RangeInclusive<u32> = 4..=15;

/// Formats a 24-bit color as a `#rrggbb` string.
///
/// The value is always zero-padded to six digits.
#[must_use]
pub fn format_color(value: u32) -> String {
    format!("#{:06x}", value & 0x00FF_FFFF)
}

/// Cosmetic and motion attributes of a particle, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticleStyle {
    /// Display text.
    pub content: String,
    /// `#rrggbb` color.
    pub color: String,
    /// Font family list.
    pub font: String,
    /// Font size in pixels.
    pub size: u32,
    /// Horizontal displacement per frame.
    pub speed: u32,
}

/// Text, font and color for a click flourish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flourish {
    /// Display text.
    pub text: String,
    /// Font family list.
    pub font: String,
    /// `#rrggbb` color.
    pub color: String,
}

/// Source of random particle content.
#[derive(Debug, Clone)]
pub struct ContentSource {
    rng: fastrand::Rng,
}

impl Default for ContentSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentSource {
    /// Creates a source seeded from system entropy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    /// Creates a deterministic source.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Picks one of the fixed phrases.
    pub fn next_text(&mut self) -> &'static str {
        PHRASES[self.rng.usize(..PHRASES.len())]
    }

    /// Picks one of the fixed font families.
    pub fn next_font(&mut self) -> &'static str {
        FONTS[self.rng.usize(..FONTS.len())]
    }

    /// Produces a uniformly random color.
    pub fn next_color(&mut self) -> String {
        format_color(self.rng.u32(..=MAX_COLOR))
    }

    /// Produces a speed in [`SPEED_RANGE`].
    pub fn next_duration(&mut self) -> u32 {
        self.rng.u32(SPEED_RANGE)
    }

    /// Produces a font size in [`SIZE_RANGE`].
    pub fn next_size(&mut self) -> u32 {
        self.rng.u32(SIZE_RANGE)
    }

    /// Produces a top-edge margin in [`TOP_MARGIN_RANGE`].
    pub fn next_margin(&mut self) -> f32 {
        self.rng.u32(TOP_MARGIN_RANGE) as f32
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_unit(&mut self) -> f32 {
        self.rng.f32()
    }

    /// Draws a complete particle style.
    pub fn next_style(&mut self) -> ParticleStyle {
        ParticleStyle {
            content: self.next_text().to_owned(),
            color: self.next_color(),
            font: self.next_font().to_owned(),
            size: self.next_size(),
            speed: self.next_duration(),
        }
    }

    /// Draws the text, font and color for a click flourish.
    pub fn next_flourish(&mut self) -> Flourish {
        Flourish {
            font: self.next_font().to_owned(),
            text: self.next_text().to_owned(),
            color: self.next_color(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        let mut source = ContentSource::with_seed(7);
        for _ in 0..2000 {
            assert!(SPEED_RANGE.contains(&source.next_duration()));
            assert!(SIZE_RANGE.contains(&source.next_size()));
            let margin = source.next_margin();
            assert!((4.0..=15.0).contains(&margin));
            assert!(PHRASES.contains(&source.next_text()));
            assert!(FONTS.contains(&source.next_font()));
        }
    }

    #[test]
    fn test_color_format() {
        assert_eq!(format_color(0), "#000000");
        assert_eq!(format_color(0x0a0b0c), "#0a0b0c");
        assert_eq!(format_color(MAX_COLOR), "#fffffe");

        let mut source = ContentSource::with_seed(11);
        for _ in 0..500 {
            let color = source.next_color();
            assert_eq!(color.len(), 7);
            assert!(color.starts_with('#'));
            assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_seeded_sources_agree() {
        let mut a = ContentSource::with_seed(42);
        let mut b = ContentSource::with_seed(42);
        for _ in 0..50 {
            assert_eq!(a.next_style(), b.next_style());
        }
    }

    #[test]
    fn test_all_values_reachable() {
        let mut source = ContentSource::with_seed(3);
        let mut speeds = [false; 10];
        let mut phrases = [false; 2];
        for _ in 0..5000 {
            speeds[source.next_duration() as usize] = true;
            let text = source.next_text();
            phrases[usize::from(text == PHRASES[1])] = true;
        }
        assert!(speeds[1..].iter().all(|&seen| seen));
        assert!(phrases.iter().all(|&seen| seen));
    }
}
