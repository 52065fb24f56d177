//! Page previews
//!
//! A preview generator turns source bytes into one [`PageDescriptor`] per
//! page. Raster rendering itself belongs to the host; the engine only needs
//! the preview pixel dimensions, which are fixed once generated.

use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{OverlayError, OverlayResult};
use crate::geometry::PageDescriptor;

/// Produces page descriptors for a source document
#[async_trait]
pub trait PreviewGenerator: Send + Sync {
    /// # Errors
    ///
    /// Returns [`OverlayError::InputError`] when the source cannot be parsed
    /// or contains no pages.
    async fn render_pages(&self, source: &[u8]) -> OverlayResult<Vec<PageDescriptor>>;
}

/// Lower-left origin and size of a page in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x0: f64,
    pub y0: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    fn from_corners(rect: [f64; 4]) -> Self {
        let (x0, x1) = (rect[0].min(rect[2]), rect[0].max(rect[2]));
        let (y0, y1) = (rect[1].min(rect[3]), rect[1].max(rect[3]));
        Self {
            x0,
            y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }
}

/// Descriptors sized from each page's MediaBox times a fixed render scale
#[derive(Debug, Clone)]
pub struct MediaBoxPreview {
    render_scale: f64,
}

impl MediaBoxPreview {
    pub fn new(render_scale: f64) -> Self {
        Self { render_scale }
    }

    pub fn describe(&self, doc: &Document) -> OverlayResult<Vec<PageDescriptor>> {
        let boxes = page_boxes(doc)?;
        Ok(boxes
            .iter()
            .map(|b| PageDescriptor::new(b.width * self.render_scale, b.height * self.render_scale))
            .collect())
    }
}

impl Default for MediaBoxPreview {
    fn default() -> Self {
        Self::new(1.5)
    }
}

#[async_trait]
impl PreviewGenerator for MediaBoxPreview {
    async fn render_pages(&self, source: &[u8]) -> OverlayResult<Vec<PageDescriptor>> {
        let doc = load_document(source)?;
        let pages = self.describe(&doc)?;
        tracing::info!("Generated {} page previews", pages.len());
        Ok(pages)
    }
}

/// Parse a PDF, mapping every failure to an input error
pub fn load_document(source: &[u8]) -> OverlayResult<Document> {
    let doc = Document::load_mem(source)
        .map_err(|e| OverlayError::InputError(format!("Failed to parse PDF: {}", e)))?;
    if doc.get_pages().is_empty() {
        return Err(OverlayError::InputError("Document has no pages".to_string()));
    }
    Ok(doc)
}

/// Page boxes of every page, in page order
pub fn page_boxes(doc: &Document) -> OverlayResult<Vec<PageBox>> {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(OverlayError::InputError("Document has no pages".to_string()));
    }
    pages
        .values()
        .enumerate()
        .map(|(index, page_id)| {
            let rect = media_box(doc, *page_id).map_err(|e| {
                OverlayError::InputError(format!("Page {}: {}", index + 1, e))
            })?;
            let page_box = PageBox::from_corners(rect);
            if page_box.width <= 0.0 || page_box.height <= 0.0 {
                return Err(OverlayError::InputError(format!(
                    "Page {} has an empty MediaBox",
                    index + 1
                )));
            }
            Ok(page_box)
        })
        .collect()
}

/// Maximum depth followed when inheriting attributes through `Parent`
const MAX_INHERIT_DEPTH: usize = 32;

/// Look up a page attribute, inheriting through the page tree if needed
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

/// MediaBox of a page, inheriting from the page tree; US Letter if absent
fn media_box(doc: &Document, page_id: ObjectId) -> Result<[f64; 4], String> {
    let Some(value) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return Ok([0.0, 0.0, 612.0, 792.0]);
    };
    let value = match value {
        Object::Reference(id) => doc
            .get_object(*id)
            .map_err(|e| format!("Broken MediaBox reference: {}", e))?,
        other => other,
    };
    let array = value
        .as_array()
        .map_err(|_| "MediaBox is not an array".to_string())?;
    parse_box_array(doc, array)
}

/// Parse a box array [x1, y1, x2, y2]
fn parse_box_array(doc: &Document, array: &[Object]) -> Result<[f64; 4], String> {
    if array.len() != 4 {
        return Err("MediaBox must have 4 elements".to_string());
    }

    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        let obj = match obj {
            Object::Reference(id) => doc
                .get_object(*id)
                .map_err(|_| format!("MediaBox element {} is a broken reference", i))?,
            other => other,
        };
        result[i] = match obj {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => return Err(format!("MediaBox element {} is not a number", i)),
        };
    }

    Ok(result)
}

/// Resolve a dictionary that may be stored inline or behind a reference
pub(crate) fn resolve_dict<'a>(doc: &'a Document, value: &'a Object) -> Option<&'a Dictionary> {
    match value {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}
