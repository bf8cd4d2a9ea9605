//! Font lookup and text shaping.
//!
//! [`FontBook`] resolves CSS-style family lists such as `"Georgia, serif"`
//! against a fontdb database, caches the loaded faces, and shapes runs of
//! text with rustybuzz. Ink bounds come from the glyph outlines via
//! ttf-parser, so a run's height is the height of what is actually drawn.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use ciallo_common::SurfaceError;
use fontdb::{Database, Family, Query};
use rustybuzz::UnicodeBuffer;
use tracing::debug;

/// Installed families tried for `sans-serif`, in order.
const SANS_SERIF_FAMILIES: [&str; 5] = ["Arial", "Helvetica", "DejaVu Sans", "Liberation Sans", "Noto Sans"];

/// Installed families tried for `serif`, in order.
const SERIF_FAMILIES: [&str; 4] = ["Times New Roman", "DejaVu Serif", "Liberation Serif", "Noto Serif"];

/// Installed families tried for `monospace`, in order.
const MONOSPACE_FAMILIES: [&str; 4] = ["Courier New", "DejaVu Sans Mono", "Liberation Mono", "Noto Sans Mono"];

/// A parsed font face and its vertical metrics in font units.
pub struct FontFace {
    data: Arc<Vec<u8>>,
    index: u32,
    family: String,
    units_per_em: f32,
    ascender: f32,
}

impl FontFace {
    fn from_data(data: Vec<u8>, index: u32, family: String) -> Option<Self> {
        let face = ttf_parser::Face::parse(&data, index).ok()?;
        let units_per_em = f32::from(face.units_per_em());
        let ascender = f32::from(face.ascender());
        if units_per_em <= 0.0 {
            return None;
        }
        Some(Self {
            data: Arc::new(data),
            index,
            family,
            units_per_em,
            ascender,
        })
    }

    /// Family name reported by the font.
    #[must_use]
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Raw font file data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Face index within the font file.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Distance from the top of the em box to the baseline at `size` pixels.
    #[must_use]
    pub fn baseline(&self, size: f32) -> f32 {
        self.ascender * size / self.units_per_em
    }

    /// Shapes `text` at `size` pixels.
    pub fn shape(&self, text: &str, size: f32) -> Result<ShapedRun, SurfaceError> {
        let unreadable = || SurfaceError::Unavailable(format!("font {} cannot be shaped", self.family));
        let shaper = rustybuzz::Face::from_slice(&self.data, self.index).ok_or_else(unreadable)?;
        let outlines = ttf_parser::Face::parse(&self.data, self.index).map_err(|_| unreadable())?;

        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        let output = rustybuzz::shape(&shaper, &[], buffer);

        let scale = size / self.units_per_em;
        let mut glyphs = Vec::with_capacity(output.len());
        let mut pen = 0i32;
        let mut top = f32::NEG_INFINITY;
        let mut bottom = f32::INFINITY;
        for (info, pos) in output.glyph_infos().iter().zip(output.glyph_positions()) {
            let id = info.glyph_id as u16;
            let x = (pen + pos.x_offset) as f32 * scale;
            let y = pos.y_offset as f32 * scale;
            if let Some(bbox) = outlines.glyph_bounding_box(ttf_parser::GlyphId(id)) {
                top = top.max(y + f32::from(bbox.y_max) * scale);
                bottom = bottom.min(y + f32::from(bbox.y_min) * scale);
            }
            glyphs.push(PlacedGlyph { id, x, y });
            pen += pos.x_advance;
        }

        // Blank runs have no ink
        let (ascent, descent) = if top.is_finite() { (top, -bottom) } else { (0.0, 0.0) };
        Ok(ShapedRun {
            glyphs,
            width: pen as f32 * scale,
            ascent,
            descent,
        })
    }
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("family", &self.family)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// A glyph positioned relative to the run origin on the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedGlyph {
    /// Glyph id in the face
    pub id: u16,
    /// Horizontal offset in pixels
    pub x: f32,
    /// Vertical offset in pixels, positive up
    pub y: f32,
}

/// A shaped run of text, in pixels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapedRun {
    /// Glyphs in visual order
    pub glyphs: Vec<PlacedGlyph>,
    /// Total advance width
    pub width: f32,
    /// Highest ink above the baseline
    pub ascent: f32,
    /// Lowest ink below the baseline
    pub descent: f32,
}

/// Font database with a per-family-list cache of loaded faces.
pub struct FontBook {
    db: Database,
    faces: RefCell<HashMap<String, Arc<FontFace>>>,
}

impl FontBook {
    /// Loads every installed system font.
    pub fn system() -> Result<Self, SurfaceError> {
        let mut db = Database::new();
        db.load_system_fonts();
        debug!("Loaded {} system font faces", db.len());
        Self::from_database(db)
    }

    /// Builds a book from raw TTF/OTF files. Unparseable data is skipped.
    pub fn from_fonts<I>(fonts: I) -> Result<Self, SurfaceError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut db = Database::new();
        for data in fonts {
            db.load_font_data(data);
        }
        Self::from_database(db)
    }

    fn from_database(mut db: Database) -> Result<Self, SurfaceError> {
        if db.is_empty() {
            return Err(SurfaceError::Unavailable("no usable fonts found".into()));
        }
        if let Some(name) = first_installed(&db, &SANS_SERIF_FAMILIES) {
            db.set_sans_serif_family(name);
        }
        if let Some(name) = first_installed(&db, &SERIF_FAMILIES) {
            db.set_serif_family(name);
        }
        if let Some(name) = first_installed(&db, &MONOSPACE_FAMILIES) {
            db.set_monospace_family(name);
        }
        Ok(Self {
            db,
            faces: RefCell::default(),
        })
    }

    /// Resolves a CSS-style family list to a loaded face.
    ///
    /// Families are tried in order. When none is installed the book's
    /// sans-serif family is used, then any face at all.
    pub fn resolve(&self, font: &str) -> Result<Arc<FontFace>, SurfaceError> {
        if let Some(face) = self.faces.borrow().get(font) {
            return Ok(Arc::clone(face));
        }
        let face = Arc::new(self.load(font)?);
        debug!(font, family = face.family(), "Resolved font");
        self.faces.borrow_mut().insert(font.to_owned(), Arc::clone(&face));
        Ok(face)
    }

    fn load(&self, font: &str) -> Result<FontFace, SurfaceError> {
        let mut families: Vec<Family<'_>> =
            font.split(',').map(css_family).filter(|f| !matches!(f, Family::Name(""))).collect();
        families.push(Family::SansSerif);

        let query = Query {
            families: &families,
            ..Query::default()
        };
        let id = self
            .db
            .query(&query)
            .or_else(|| self.db.faces().next().map(|info| info.id))
            .ok_or_else(|| SurfaceError::Unavailable(format!("no font matches {font}")))?;
        let family = self
            .db
            .face(id)
            .and_then(|info| info.families.first())
            .map(|(name, _)| name.clone())
            .unwrap_or_default();

        self.db
            .with_face_data(id, |data, index| FontFace::from_data(data.to_vec(), index, family))
            .flatten()
            .ok_or_else(|| SurfaceError::Unavailable(format!("font data for {font} is unreadable")))
    }
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("faces", &self.db.len())
            .field("resolved", &self.faces.borrow().len())
            .finish()
    }
}

fn css_family(name: &str) -> Family<'_> {
    match name.trim().trim_matches(|c| c == '"' || c == '\'') {
        "serif" => Family::Serif,
        "sans-serif" => Family::SansSerif,
        "monospace" => Family::Monospace,
        "cursive" => Family::Cursive,
        "fantasy" => Family::Fantasy,
        other => Family::Name(other),
    }
}

fn first_installed(db: &Database, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|name| db.faces().any(|info| info.families.iter().any(|(family, _)| family == *name)))
        .map(|name| (*name).to_owned())
}
