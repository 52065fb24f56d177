//! Annotation geometry model
//!
//! Annotations live in preview space: the fixed-resolution pixel grid of a
//! page's rasterized preview, origin top-left, Y pointing down. This module
//! is plain data; interaction and export logic live elsewhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(Uuid);

impl AnnotationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AnnotationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Pixel dimensions of one page's rasterized preview
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageDescriptor {
    pub preview_width: f64,
    pub preview_height: f64,
    /// Opaque handle to the rendered preview (e.g. a PNG data URL).
    /// Never read by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl PageDescriptor {
    pub fn new(preview_width: f64, preview_height: f64) -> Self {
        Self {
            preview_width,
            preview_height,
            image: None,
        }
    }
}

/// RGB color with 8-bit channels, serialized as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Parse hex color string (e.g., "#FF0000" or "FF0000")
    pub fn from_hex(color: &str) -> Option<Self> {
        let hex = color.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Channels as PDF color operands (0-1 range)
    pub fn to_unit(self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::from_hex(&value).ok_or_else(|| format!("Invalid hex color: {}", value))
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

/// Font families selectable in the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FontFamily {
    Helvetica,
    Arial,
    #[serde(rename = "Times New Roman")]
    TimesNewRoman,
    Courier,
    Verdana,
}

impl FontFamily {
    pub const ALL: [FontFamily; 5] = [
        FontFamily::Helvetica,
        FontFamily::Arial,
        FontFamily::TimesNewRoman,
        FontFamily::Courier,
        FontFamily::Verdana,
    ];

    /// Name as shown in the font picker
    pub fn display_name(self) -> &'static str {
        match self {
            FontFamily::Helvetica => "Helvetica",
            FontFamily::Arial => "Arial",
            FontFamily::TimesNewRoman => "Times New Roman",
            FontFamily::Courier => "Courier",
            FontFamily::Verdana => "Verdana",
        }
    }
}

/// Weight/slant combination of a font
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontVariant {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontVariant {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (true, true) => FontVariant::BoldItalic,
            (true, false) => FontVariant::Bold,
            (false, true) => FontVariant::Italic,
            (false, false) => FontVariant::Regular,
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(self, FontVariant::Bold | FontVariant::BoldItalic)
    }

    pub fn is_italic(self) -> bool {
        matches!(self, FontVariant::Italic | FontVariant::BoldItalic)
    }
}

/// Font parameters of a text annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_size: f64,
    pub font_family: FontFamily,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

impl TextStyle {
    pub fn variant(&self) -> FontVariant {
        FontVariant::from_flags(self.bold, self.italic)
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            font_family: FontFamily::Helvetica,
            bold: false,
            italic: false,
        }
    }
}

/// One segment of a symbol outline in design units (24x24 box, Y-down)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    MoveTo(f64, f64),
    LineTo(f64, f64),
}

/// Side length of the square design box symbol paths are drawn in
pub const SYMBOL_DESIGN_SIZE: f64 = 24.0;

/// Stroke width of symbol outlines in design units
pub const SYMBOL_STROKE_WIDTH: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Checkmark,
    Cross,
}

impl SymbolKind {
    /// Outline of the glyph inside the 24x24 design box
    pub fn design_path(self) -> &'static [PathSegment] {
        use PathSegment::{LineTo, MoveTo};
        match self {
            // M20 6 L9 17 l-5 -5
            SymbolKind::Checkmark => &[MoveTo(20.0, 6.0), LineTo(9.0, 17.0), LineTo(4.0, 12.0)],
            // M18 6 L6 18 M6 6 l12 12
            SymbolKind::Cross => &[
                MoveTo(18.0, 6.0),
                LineTo(6.0, 18.0),
                MoveTo(6.0, 6.0),
                LineTo(18.0, 18.0),
            ],
        }
    }
}

/// Opaque reference to raster image bytes (a data URL or a file path)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Kind-specific annotation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationKind {
    Text {
        content: String,
        style: TextStyle,
        #[serde(default)]
        color: Rgb,
    },
    Image {
        image_data: ImageRef,
    },
    Symbol {
        symbol_kind: SymbolKind,
        #[serde(default)]
        color: Rgb,
    },
}

impl AnnotationKind {
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationKind::Text { .. } => "text",
            AnnotationKind::Image { .. } => "image",
            AnnotationKind::Symbol { .. } => "symbol",
        }
    }
}

/// An overlay placed on one page, positioned in preview space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub page_index: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(flatten)]
    pub kind: AnnotationKind,
}

impl Annotation {
    /// Whether corner handles may change this annotation's size.
    /// Text boxes size themselves from their content.
    pub fn is_resizable(&self) -> bool {
        match self.kind {
            AnnotationKind::Text { .. } => false,
            AnnotationKind::Image { .. } | AnnotationKind::Symbol { .. } => true,
        }
    }

    pub fn text_style(&self) -> Option<&TextStyle> {
        match &self.kind {
            AnnotationKind::Text { style, .. } => Some(style),
            AnnotationKind::Image { .. } | AnnotationKind::Symbol { .. } => None,
        }
    }
}

/// Resize handle position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub fn is_left(self) -> bool {
        matches!(self, Corner::TopLeft | Corner::BottomLeft)
    }

    pub fn is_top(self) -> bool {
        matches!(self, Corner::TopLeft | Corner::TopRight)
    }
}

/// Partial update applied by [`crate::session::EditSession::update_annotation`].
///
/// Fields that do not apply to the annotation's kind are ignored, as are
/// `width`/`height` on text annotations, whose size is always derived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub content: Option<String>,
    pub font_size: Option<f64>,
    pub font_family: Option<FontFamily>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub color: Option<Rgb>,
    pub symbol_kind: Option<SymbolKind>,
    pub image_data: Option<ImageRef>,
}

impl AnnotationPatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Whether the patch changes anything that affects text layout
    pub fn touches_text_layout(&self) -> bool {
        self.content.is_some()
            || self.font_size.is_some()
            || self.font_family.is_some()
            || self.bold.is_some()
            || self.italic.is_some()
    }
}

/// Insertion-ordered annotation collection for one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, annotation: Annotation) -> AnnotationId {
        let id = annotation.id;
        self.annotations.push(annotation);
        id
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let pos = self.annotations.iter().position(|a| a.id == id)?;
        Some(self.annotations.remove(pos))
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn into_annotations(self) -> Vec<Annotation> {
        self.annotations
    }

    pub fn for_page(&self, page_index: usize) -> impl Iterator<Item = &Annotation> {
        self.annotations
            .iter()
            .filter(move |a| a.page_index == page_index)
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<Vec<Annotation>> for AnnotationStore {
    fn from(annotations: Vec<Annotation>) -> Self {
        Self { annotations }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn symbol(page_index: usize) -> Annotation {
        Annotation {
            id: AnnotationId::new(),
            page_index,
            x: 10.0,
            y: 10.0,
            width: 24.0,
            height: 24.0,
            kind: AnnotationKind::Symbol {
                symbol_kind: SymbolKind::Checkmark,
                color: Rgb::BLACK,
            },
        }
    }

    #[test]
    fn test_store_preserves_insertion_order() {
        let mut store = AnnotationStore::new();
        let a = store.add(symbol(1));
        let b = store.add(symbol(0));
        let c = store.add(symbol(1));

        let ids: Vec<_> = store.annotations().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![a, b, c]);

        let page1: Vec<_> = store.for_page(1).map(|a| a.id).collect();
        assert_eq!(page1, vec![a, c]);
    }

    #[test]
    fn test_store_remove() {
        let mut store = AnnotationStore::new();
        let id = store.add(symbol(0));
        assert!(store.remove(id).is_some());
        assert!(store.remove(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_rgb_hex() {
        assert_eq!(Rgb::from_hex("#FF8000"), Some(Rgb { r: 255, g: 128, b: 0 }));
        assert_eq!(Rgb::from_hex("00ff00"), Some(Rgb { r: 0, g: 255, b: 0 }));
        assert_eq!(Rgb::from_hex("#FFF"), None);
        assert_eq!(Rgb::from_hex("#GG0000"), None);
        assert_eq!(Rgb { r: 1, g: 2, b: 255 }.to_hex(), "#0102FF");
    }

    #[test]
    fn test_annotation_json_shape() {
        let json = r##"{
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "page_index": 0,
            "x": 100.0, "y": 100.0, "width": 40.0, "height": 19.2,
            "type": "text",
            "content": "Hi",
            "style": {"font_size": 16.0, "font_family": "Times New Roman", "bold": true},
            "color": "#000000"
        }"##;
        let annotation: Annotation = serde_json::from_str(json).unwrap();
        match &annotation.kind {
            AnnotationKind::Text { content, style, .. } => {
                assert_eq!(content, "Hi");
                assert_eq!(style.font_family, FontFamily::TimesNewRoman);
                assert!(style.bold);
                assert!(!style.italic);
            }
            other => panic!("Expected text annotation, got {}", other.name()),
        }
        assert!(!annotation.is_resizable());
    }

    #[test]
    fn test_font_variant_flags() {
        assert_eq!(FontVariant::from_flags(false, false), FontVariant::Regular);
        assert_eq!(FontVariant::from_flags(true, true), FontVariant::BoldItalic);
        assert!(FontVariant::Bold.is_bold());
        assert!(!FontVariant::Bold.is_italic());
    }

    #[test]
    fn test_corner_sides() {
        assert!(Corner::TopLeft.is_left() && Corner::TopLeft.is_top());
        assert!(!Corner::BottomRight.is_left() && !Corner::BottomRight.is_top());
    }
}
