//! Font resolution
//!
//! Resolution policy: when no [`FontSource`] is configured, the editor's
//! family maps to a PDF standard 14 family and bold/italic pick the variant.
//! When a source is configured, every family collapses onto the source's
//! single Unicode-capable family and only the variant is taken from the
//! style. A variant that still fails after one fresh retry falls back to the
//! standard 14 mapping. The same (family, bold, italic) triple therefore
//! always resolves to the same font within one resolver.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{OverlayError, OverlayResult};
use crate::geometry::{FontFamily, FontVariant, TextStyle};
use crate::metrics::FontProgramMetrics;

/// A parsed TrueType font program
#[derive(Debug, Clone)]
pub struct FontProgram {
    data: Arc<Vec<u8>>,
    pub postscript_name: String,
    pub units_per_em: u16,
    pub ascent: i16,
    pub descent: i16,
    pub cap_height: i16,
    /// [x_min, y_min, x_max, y_max] in font units
    pub bbox: [i16; 4],
    pub is_monospaced: bool,
    pub is_italic: bool,
}

impl FontProgram {
    pub fn parse(data: Vec<u8>) -> OverlayResult<Self> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|e| OverlayError::AssetError(format!("Invalid font program: {}", e)))?;
        let units_per_em = face.units_per_em();
        if units_per_em == 0 {
            return Err(OverlayError::AssetError(
                "Font program has zero units per em".to_string(),
            ));
        }

        let postscript_name = face
            .names()
            .into_iter()
            .find(|name| name.name_id == ttf_parser::name_id::POST_SCRIPT_NAME && name.is_unicode())
            .and_then(|name| name.to_string())
            .map(|name| sanitize_font_name(&name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "EmbeddedFont".to_string());

        let bbox = face.global_bounding_box();
        let ascent = face.ascender();
        let descent = face.descender();
        let cap_height = face.capital_height().unwrap_or(ascent);
        let is_monospaced = face.is_monospaced();
        let is_italic = face.is_italic();

        Ok(Self {
            data: Arc::new(data),
            postscript_name,
            units_per_em,
            ascent,
            descent,
            cap_height,
            bbox: [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max],
            is_monospaced,
            is_italic,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn face(&self) -> Option<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.data, 0).ok()
    }

    /// Sum of advance widths in font units, and the number of characters
    /// that have no glyph in this program
    pub fn text_advance_units(&self, text: &str) -> (f64, usize) {
        let Some(face) = self.face() else {
            return (0.0, text.chars().count());
        };
        let mut units = 0.0;
        let mut missing = 0;
        for ch in text.chars() {
            match face
                .glyph_index(ch)
                .and_then(|gid| face.glyph_hor_advance(gid))
            {
                Some(advance) => units += advance as f64,
                None => missing += 1,
            }
        }
        (units, missing)
    }

    /// Glyph ids for each character; unmapped characters become `.notdef` (0)
    pub fn glyph_ids(&self, text: &str) -> Vec<(u16, char)> {
        let Some(face) = self.face() else {
            return text.chars().map(|ch| (0, ch)).collect();
        };
        text.chars()
            .map(|ch| (face.glyph_index(ch).map(|gid| gid.0).unwrap_or(0), ch))
            .collect()
    }

    /// Advance width of a glyph scaled to a 1000-unit em
    pub fn glyph_width_1000(&self, gid: u16) -> f64 {
        let advance = self
            .face()
            .and_then(|face| face.glyph_hor_advance(ttf_parser::GlyphId(gid)))
            .unwrap_or(0);
        advance as f64 * 1000.0 / self.units_per_em as f64
    }

    /// Scale a font-unit metric to a 1000-unit em
    pub fn to_1000(&self, value: i16) -> i64 {
        (value as f64 * 1000.0 / self.units_per_em as f64).round() as i64
    }
}

fn sanitize_font_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Font chosen for a text run
#[derive(Debug, Clone)]
pub enum ResolvedFont {
    /// One of the PDF standard 14 fonts, referenced by base name
    Standard(&'static str),
    /// A TrueType program to embed
    Embedded(Arc<FontProgram>),
}

impl ResolvedFont {
    /// Stable key used to share one font resource between runs
    pub fn key(&self) -> String {
        match self {
            ResolvedFont::Standard(name) => format!("std:{}", name),
            ResolvedFont::Embedded(program) => format!("ttf:{}", program.postscript_name),
        }
    }
}

/// Map a family and variant to a PDF standard 14 font name
pub fn standard_font_name(family: FontFamily, variant: FontVariant) -> &'static str {
    let base = match family {
        FontFamily::Helvetica | FontFamily::Arial | FontFamily::Verdana => "Helvetica",
        FontFamily::TimesNewRoman => "Times-Roman",
        FontFamily::Courier => "Courier",
    };

    match base {
        "Times-Roman" => match variant {
            FontVariant::BoldItalic => "Times-BoldItalic",
            FontVariant::Bold => "Times-Bold",
            FontVariant::Italic => "Times-Italic",
            FontVariant::Regular => "Times-Roman",
        },
        "Courier" => match variant {
            FontVariant::BoldItalic => "Courier-BoldOblique",
            FontVariant::Bold => "Courier-Bold",
            FontVariant::Italic => "Courier-Oblique",
            FontVariant::Regular => "Courier",
        },
        _ => match variant {
            FontVariant::BoldItalic => "Helvetica-BoldOblique",
            FontVariant::Bold => "Helvetica-Bold",
            FontVariant::Italic => "Helvetica-Oblique",
            FontVariant::Regular => "Helvetica",
        },
    }
}

/// Supplies TrueType font programs, one per variant
#[async_trait]
pub trait FontSource: Send + Sync {
    async fn fetch(&self, variant: FontVariant) -> OverlayResult<Vec<u8>>;
}

/// Loads a font family from files in a directory
#[derive(Debug, Clone)]
pub struct DirFontSource {
    dir: PathBuf,
    files: BTreeMap<FontVariant, String>,
}

impl DirFontSource {
    /// Ubuntu family file names (`Ubuntu-R.ttf`, `Ubuntu-B.ttf`, ...)
    pub fn ubuntu(dir: impl Into<PathBuf>) -> Self {
        let files = BTreeMap::from([
            (FontVariant::Regular, "Ubuntu-R.ttf".to_string()),
            (FontVariant::Bold, "Ubuntu-B.ttf".to_string()),
            (FontVariant::Italic, "Ubuntu-I.ttf".to_string()),
            (FontVariant::BoldItalic, "Ubuntu-BI.ttf".to_string()),
        ]);
        Self {
            dir: dir.into(),
            files,
        }
    }

    pub fn with_file(mut self, variant: FontVariant, file_name: impl Into<String>) -> Self {
        self.files.insert(variant, file_name.into());
        self
    }
}

#[async_trait]
impl FontSource for DirFontSource {
    async fn fetch(&self, variant: FontVariant) -> OverlayResult<Vec<u8>> {
        let file = self.files.get(&variant).ok_or_else(|| {
            OverlayError::AssetError(format!("No font file configured for {:?}", variant))
        })?;
        let path = self.dir.join(file);
        tokio::fs::read(&path)
            .await
            .map_err(|e| OverlayError::AssetError(format!("{}: {}", path.display(), e)))
    }
}

/// Resolves text styles to fonts, caching fetched programs.
///
/// Failed fetches are not cached, so a later export fetches afresh.
pub struct FontResolver {
    source: Option<Arc<dyn FontSource>>,
    cache: Mutex<BTreeMap<FontVariant, Arc<FontProgram>>>,
}

impl Default for FontResolver {
    fn default() -> Self {
        Self::standard()
    }
}

impl FontResolver {
    /// Resolver that only uses the standard 14 fonts
    pub fn standard() -> Self {
        Self {
            source: None,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_source(source: Arc<dyn FontSource>) -> Self {
        Self {
            source: Some(source),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub async fn resolve(&self, style: &TextStyle) -> ResolvedFont {
        let variant = style.variant();
        if self.source.is_some() {
            if let Some(program) = self.program(variant).await {
                return ResolvedFont::Embedded(program);
            }
        }
        ResolvedFont::Standard(standard_font_name(style.font_family, variant))
    }

    /// Fetch (or reuse) the program for a variant, retrying once
    pub async fn program(&self, variant: FontVariant) -> Option<Arc<FontProgram>> {
        let source = self.source.as_ref()?;
        if let Some(program) = self.cached(variant) {
            return Some(program);
        }

        for attempt in 1..=2 {
            match fetch_program(source.as_ref(), variant).await {
                Ok(program) => {
                    let program = Arc::new(program);
                    if let Ok(mut cache) = self.cache.lock() {
                        cache.insert(variant, program.clone());
                    }
                    tracing::debug!(
                        "Loaded font {} for {:?}",
                        program.postscript_name,
                        variant
                    );
                    return Some(program);
                }
                Err(e) if attempt == 1 => {
                    tracing::warn!("Font fetch for {:?} failed, retrying: {}", variant, e);
                }
                Err(e) => {
                    tracing::warn!(
                        "Font fetch for {:?} failed again, using standard font: {}",
                        variant,
                        e
                    );
                }
            }
        }
        None
    }

    fn cached(&self, variant: FontVariant) -> Option<Arc<FontProgram>> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&variant).cloned())
    }

    /// Build measurement metrics from every variant the source can supply
    pub async fn load_metrics(&self) -> FontProgramMetrics {
        let mut metrics = FontProgramMetrics::new();
        if self.source.is_none() {
            return metrics;
        }
        for variant in [
            FontVariant::Regular,
            FontVariant::Bold,
            FontVariant::Italic,
            FontVariant::BoldItalic,
        ] {
            if let Some(program) = self.program(variant).await {
                metrics.insert(variant, program);
            }
        }
        metrics
    }
}

async fn fetch_program(source: &dyn FontSource, variant: FontVariant) -> OverlayResult<FontProgram> {
    let bytes = source.fetch(variant).await?;
    FontProgram::parse(bytes)
}

/// Encode text for a standard 14 font (WinAnsiEncoding).
///
/// Characters outside the encoding become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(ch: char) -> u8 {
    match ch as u32 {
        0x20..=0x7E | 0xA0..=0xFF => ch as u32 as u8,
        0x09 => b' ',
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => b'?',
    }
}
