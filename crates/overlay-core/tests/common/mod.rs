//! Shared helpers for overlay-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use overlay_core::{OverlayResult, PageDescriptor, PreviewGenerator};

/// Build a PDF with one page per `(width, height)` pair
pub fn create_test_pdf(sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for (index, (width, height)) in sizes.iter().enumerate() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                Operation::new("Td", vec![Object::Integer(20), Object::Integer(20)]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Original page {}", index + 1))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set("Contents", Object::Reference(content_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(*width),
                Object::Integer(*height),
            ]),
        );
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Decoded content operations of one page
pub fn page_operations(pdf: &[u8], page_index: usize) -> Vec<Operation> {
    let doc = Document::load_mem(pdf).unwrap();
    let page_id = *doc.get_pages().values().nth(page_index).unwrap();
    let content = doc.get_page_content(page_id).unwrap();
    Content::decode(&content).unwrap().operations
}

/// Numeric operands of an operation
pub fn numbers(op: &Operation) -> Vec<f64> {
    op.operands
        .iter()
        .filter_map(|o| match o {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r as f64),
            _ => None,
        })
        .collect()
}

/// A small opaque PNG as a data URL
pub fn png_data_url() -> String {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, 4, 2);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[200u8; 4 * 2 * 3]).unwrap();
    }
    format!("data:image/png;base64,{}", STANDARD.encode(out))
}

/// Preview generator reporting fixed preview sizes, one per page
pub struct FixedPreview(pub Vec<PageDescriptor>);

#[async_trait]
impl PreviewGenerator for FixedPreview {
    async fn render_pages(&self, _source: &[u8]) -> OverlayResult<Vec<PageDescriptor>> {
        Ok(self.0.clone())
    }
}
