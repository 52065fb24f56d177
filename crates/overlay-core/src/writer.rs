//! Output document writer
//!
//! [`DocumentWriter`] is the drawing surface the export pipeline talks to.
//! [`LopdfWriter`] implements it on top of an existing PDF: overlay drawing
//! operations are collected per page and, on [`DocumentWriter::finish`],
//! flattened into the page content as one extra stream. The original
//! content is wrapped in `q ... Q` so graphics state it leaves behind cannot
//! leak into the overlay, and the overlay is translated to the MediaBox
//! origin.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::assets::{deflate, ColorSpace, ImageFilter, RasterImage};
use crate::error::{OverlayError, OverlayResult};
use crate::fonts::{encode_win_ansi, FontProgram, ResolvedFont};
use crate::geometry::Rgb;
use crate::preview::{inherited_attribute, load_document, page_boxes, resolve_dict, PageBox};
use crate::reproject::{OutputPoint, PageSize};

/// Font registered with a writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontHandle(usize);

/// Image registered with a writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(usize);

/// A single line of text in output space
#[derive(Debug, Clone, Copy)]
pub struct TextRun<'a> {
    pub x: f64,
    pub baseline_y: f64,
    pub font_size: f64,
    pub text: &'a str,
    pub color: Rgb,
}

/// Axis-aligned rectangle in output space, lower-left origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Drawing surface for reprojected annotations.
///
/// Coordinates are page-relative output space: points, Y-up, origin at the
/// page's lower-left corner.
pub trait DocumentWriter {
    fn page_count(&self) -> usize;

    fn page_size(&self, page_index: usize) -> OverlayResult<PageSize>;

    /// Register a font; the same font always yields the same handle
    fn resolve_font(&mut self, font: &ResolvedFont) -> OverlayResult<FontHandle>;

    fn embed_font_program(&mut self, program: Arc<FontProgram>) -> OverlayResult<FontHandle>;

    /// Register encoded image bytes (PNG or JPEG)
    fn embed_image_asset(&mut self, bytes: &[u8]) -> OverlayResult<ImageHandle>;

    fn add_text_run(&mut self, page_index: usize, font: FontHandle, run: &TextRun<'_>) -> OverlayResult<()>;

    fn draw_image(&mut self, page_index: usize, image: ImageHandle, rect: Rect) -> OverlayResult<()>;

    /// Stroke each subpath as an open polyline with round caps and joins
    fn draw_vector_path(
        &mut self,
        page_index: usize,
        subpaths: &[Vec<OutputPoint>],
        stroke_width: f64,
        color: Rgb,
    ) -> OverlayResult<()>;

    /// Serialize the finished document
    fn finish(self) -> OverlayResult<Vec<u8>>
    where
        Self: Sized;
}

#[derive(Debug)]
enum FontEncoding {
    /// Standard 14 font, single-byte WinAnsi strings
    WinAnsi,
    /// Embedded TrueType, two-byte glyph ids
    Identity {
        program: Arc<FontProgram>,
        used: BTreeMap<u16, char>,
    },
}

#[derive(Debug)]
struct FontResource {
    name: String,
    id: ObjectId,
    encoding: FontEncoding,
}

#[derive(Debug)]
struct ImageResource {
    name: String,
    id: ObjectId,
}

#[derive(Debug, Default)]
struct PageOverlay {
    operations: Vec<Operation>,
    fonts: BTreeSet<usize>,
    images: BTreeSet<usize>,
}

/// [`DocumentWriter`] that flattens overlays into an existing PDF
#[derive(Debug)]
pub struct LopdfWriter {
    doc: Document,
    page_ids: Vec<ObjectId>,
    boxes: Vec<PageBox>,
    fonts: Vec<FontResource>,
    font_keys: HashMap<String, FontHandle>,
    images: Vec<ImageResource>,
    overlays: BTreeMap<usize, PageOverlay>,
}

impl LopdfWriter {
    /// Open source PDF bytes for overlay writing
    pub fn from_bytes(source: &[u8]) -> OverlayResult<Self> {
        Self::from_document(load_document(source)?)
    }

    pub fn from_document(doc: Document) -> OverlayResult<Self> {
        let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
        let boxes = page_boxes(&doc)?;
        Ok(Self {
            doc,
            page_ids,
            boxes,
            fonts: Vec::new(),
            font_keys: HashMap::new(),
            images: Vec::new(),
            overlays: BTreeMap::new(),
        })
    }

    fn overlay(&mut self, page_index: usize) -> OverlayResult<&mut PageOverlay> {
        if page_index >= self.page_ids.len() {
            return Err(OverlayError::WriterError(format!(
                "No page {} in a {} page document",
                page_index + 1,
                self.page_ids.len()
            )));
        }
        Ok(self.overlays.entry(page_index).or_default())
    }

    fn push_font(&mut self, key: String, id: ObjectId, encoding: FontEncoding) -> FontHandle {
        let handle = FontHandle(self.fonts.len());
        self.fonts.push(FontResource {
            name: format!("OvF{}", self.fonts.len() + 1),
            id,
            encoding,
        });
        self.font_keys.insert(key, handle);
        handle
    }

    /// Write the font dictionaries of every embedded program
    fn write_embedded_fonts(&mut self) -> OverlayResult<()> {
        let mut pending = Vec::new();
        for font in &self.fonts {
            if let FontEncoding::Identity { program, used } = &font.encoding {
                pending.push((font.id, program.clone(), used.clone()));
            }
        }
        for (id, program, used) in pending {
            let type0 = self.type0_font(&program, &used)?;
            self.doc.objects.insert(id, Object::Dictionary(type0));
        }
        Ok(())
    }

    fn type0_font(&mut self, program: &FontProgram, used: &BTreeMap<u16, char>) -> OverlayResult<Dictionary> {
        let base_font = program.postscript_name.clone();

        let mut file = Stream::new(
            dictionary! {
                "Length1" => program.data().len() as i64,
                "Filter" => "FlateDecode",
            },
            deflate(program.data())?,
        );
        file.allows_compression = false;
        let file_id = self.doc.add_object(file);

        let mut flags = 32;
        if program.is_monospaced {
            flags |= 1;
        }
        if program.is_italic {
            flags |= 64;
        }
        let [x_min, y_min, x_max, y_max] = program.bbox;
        let descriptor_id = self.doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(base_font.as_bytes().to_vec()),
            "Flags" => flags,
            "FontBBox" => vec![
                Object::Integer(program.to_1000(x_min)),
                Object::Integer(program.to_1000(y_min)),
                Object::Integer(program.to_1000(x_max)),
                Object::Integer(program.to_1000(y_max)),
            ],
            "ItalicAngle" => if program.is_italic { -12 } else { 0 },
            "Ascent" => program.to_1000(program.ascent),
            "Descent" => program.to_1000(program.descent),
            "CapHeight" => program.to_1000(program.cap_height),
            "StemV" => 80,
            "FontFile2" => file_id,
        });

        let mut widths = Vec::with_capacity(used.len() * 2);
        for gid in used.keys() {
            widths.push(Object::Integer(*gid as i64));
            widths.push(Object::Array(vec![Object::Integer(
                program.glyph_width_1000(*gid).round() as i64,
            )]));
        }

        let cid_font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => Object::Name(base_font.as_bytes().to_vec()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => 1000,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), to_unicode_cmap(used).into_bytes()));

        Ok(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => Object::Name(base_font.as_bytes().to_vec()),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        })
    }

    /// Splice one page's overlay into its content and resources
    fn flatten_overlay(&mut self, page_index: usize, overlay: PageOverlay) -> OverlayResult<()> {
        let page_id = self.page_ids[page_index];
        let origin = self.boxes[page_index];

        let mut operations = vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), real(origin.x0), real(origin.y0)],
            ),
        ];
        operations.extend(overlay.operations);
        operations.push(Operation::new("Q", vec![]));

        // streams are concatenated before parsing, so each one is delimited
        // on both sides; a previous stream may end without whitespace
        let mut encoded = b"\n".to_vec();
        encoded.extend(
            Content { operations }
                .encode()
                .map_err(|e| OverlayError::WriterError(format!("Failed to encode overlay: {}", e)))?,
        );
        encoded.push(b'\n');

        let save_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let overlay_id = self.doc.add_object(Stream::new(Dictionary::new(), encoded));

        let mut contents = vec![Object::Reference(save_id)];
        contents.extend(self.existing_contents(page_id));
        contents.push(Object::Reference(overlay_id));

        let mut resources = inherited_attribute(&self.doc, page_id, b"Resources")
            .and_then(|value| resolve_dict(&self.doc, value))
            .cloned()
            .unwrap_or_else(Dictionary::new);

        if !overlay.fonts.is_empty() {
            let mut font_dict = self.sub_resource(&resources, b"Font");
            for index in &overlay.fonts {
                let font = &self.fonts[*index];
                font_dict.set(font.name.as_bytes().to_vec(), Object::Reference(font.id));
            }
            resources.set("Font", font_dict);
        }
        if !overlay.images.is_empty() {
            let mut xobject_dict = self.sub_resource(&resources, b"XObject");
            for index in &overlay.images {
                let image = &self.images[*index];
                xobject_dict.set(image.name.as_bytes().to_vec(), Object::Reference(image.id));
            }
            resources.set("XObject", xobject_dict);
        }

        let page = self
            .doc
            .get_dictionary_mut(page_id)
            .map_err(|e| OverlayError::WriterError(format!("Page {} is not a dictionary: {}", page_index + 1, e)))?;
        page.set("Contents", Object::Array(contents));
        page.set("Resources", resources);
        Ok(())
    }

    fn existing_contents(&self, page_id: ObjectId) -> Vec<Object> {
        let Ok(page) = self.doc.get_dictionary(page_id) else {
            return Vec::new();
        };
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    fn sub_resource(&self, resources: &Dictionary, key: &[u8]) -> Dictionary {
        resources
            .get(key)
            .ok()
            .and_then(|value| resolve_dict(&self.doc, value))
            .cloned()
            .unwrap_or_else(Dictionary::new)
    }
}

impl DocumentWriter for LopdfWriter {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_size(&self, page_index: usize) -> OverlayResult<PageSize> {
        self.boxes
            .get(page_index)
            .map(|b| PageSize::new(b.width, b.height))
            .ok_or_else(|| OverlayError::WriterError(format!("No page {}", page_index + 1)))
    }

    fn resolve_font(&mut self, font: &ResolvedFont) -> OverlayResult<FontHandle> {
        let key = font.key();
        if let Some(handle) = self.font_keys.get(&key) {
            return Ok(*handle);
        }
        match font {
            ResolvedFont::Standard(base_font) => {
                let id = self.doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => *base_font,
                    "Encoding" => "WinAnsiEncoding",
                });
                tracing::debug!("Registered standard font {}", base_font);
                Ok(self.push_font(key, id, FontEncoding::WinAnsi))
            }
            ResolvedFont::Embedded(program) => self.embed_font_program(program.clone()),
        }
    }

    fn embed_font_program(&mut self, program: Arc<FontProgram>) -> OverlayResult<FontHandle> {
        let key = ResolvedFont::Embedded(program.clone()).key();
        if let Some(handle) = self.font_keys.get(&key) {
            return Ok(*handle);
        }
        // dictionaries are written at finish, once the used glyphs are known
        let id = self.doc.new_object_id();
        tracing::debug!("Registered embedded font {}", program.postscript_name);
        Ok(self.push_font(
            key,
            id,
            FontEncoding::Identity {
                program,
                used: BTreeMap::new(),
            },
        ))
    }

    fn embed_image_asset(&mut self, bytes: &[u8]) -> OverlayResult<ImageHandle> {
        let image = RasterImage::from_bytes(bytes)?;

        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => image.color_space.pdf_name(),
            "BitsPerComponent" => 8,
            "Filter" => image.filter.pdf_name(),
        };
        if image.filter == ImageFilter::Dct && image.color_space == ColorSpace::Cmyk {
            // Adobe CMYK JPEGs store inverted samples
            let decode: Vec<Object> = [1, 0, 1, 0, 1, 0, 1, 0].into_iter().map(Object::Integer).collect();
            dict.set("Decode", decode);
        }
        if let Some(mask) = image.soft_mask {
            let mut mask_stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => image.width as i64,
                    "Height" => image.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                mask,
            );
            mask_stream.allows_compression = false;
            dict.set("SMask", self.doc.add_object(mask_stream));
        }

        let mut stream = Stream::new(dict, image.data);
        stream.allows_compression = false;
        let id = self.doc.add_object(stream);

        let handle = ImageHandle(self.images.len());
        self.images.push(ImageResource {
            name: format!("OvIm{}", self.images.len() + 1),
            id,
        });
        tracing::debug!("Embedded {}x{} image", image.width, image.height);
        Ok(handle)
    }

    fn add_text_run(&mut self, page_index: usize, font: FontHandle, run: &TextRun<'_>) -> OverlayResult<()> {
        let resource = self
            .fonts
            .get_mut(font.0)
            .ok_or_else(|| OverlayError::WriterError("Unknown font handle".to_string()))?;
        let name = resource.name.clone();
        let text = match &mut resource.encoding {
            FontEncoding::WinAnsi => Object::String(encode_win_ansi(run.text), StringFormat::Literal),
            FontEncoding::Identity { program, used } => {
                let mut bytes = Vec::with_capacity(run.text.len() * 2);
                for (gid, ch) in program.glyph_ids(run.text) {
                    if gid != 0 {
                        used.entry(gid).or_insert(ch);
                    }
                    bytes.extend_from_slice(&gid.to_be_bytes());
                }
                Object::String(bytes, StringFormat::Hexadecimal)
            }
        };

        let (r, g, b) = run.color.to_unit();
        let overlay = self.overlay(page_index)?;
        overlay.fonts.insert(font.0);
        overlay.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(name.into_bytes()), real(run.font_size)]),
            Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
            Operation::new("Td", vec![real(run.x), real(run.baseline_y)]),
            Operation::new("Tj", vec![text]),
            Operation::new("ET", vec![]),
        ]);
        Ok(())
    }

    fn draw_image(&mut self, page_index: usize, image: ImageHandle, rect: Rect) -> OverlayResult<()> {
        let name = self
            .images
            .get(image.0)
            .map(|i| i.name.clone())
            .ok_or_else(|| OverlayError::WriterError("Unknown image handle".to_string()))?;
        let overlay = self.overlay(page_index)?;
        overlay.images.insert(image.0);
        overlay.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(rect.width),
                    0.into(),
                    0.into(),
                    real(rect.height),
                    real(rect.x),
                    real(rect.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn draw_vector_path(
        &mut self,
        page_index: usize,
        subpaths: &[Vec<OutputPoint>],
        stroke_width: f64,
        color: Rgb,
    ) -> OverlayResult<()> {
        let (r, g, b) = color.to_unit();
        let overlay = self.overlay(page_index)?;
        overlay.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("RG", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
            Operation::new("w", vec![real(stroke_width)]),
            Operation::new("J", vec![1.into()]),
            Operation::new("j", vec![1.into()]),
        ]);
        for subpath in subpaths {
            let mut points = subpath.iter();
            let Some(first) = points.next() else {
                continue;
            };
            overlay
                .operations
                .push(Operation::new("m", vec![real(first.x), real(first.y)]));
            for point in points {
                overlay
                    .operations
                    .push(Operation::new("l", vec![real(point.x), real(point.y)]));
            }
        }
        overlay.operations.extend([Operation::new("S", vec![]), Operation::new("Q", vec![])]);
        Ok(())
    }

    fn finish(mut self) -> OverlayResult<Vec<u8>> {
        self.write_embedded_fonts()?;
        let overlays = std::mem::take(&mut self.overlays);
        for (page_index, overlay) in overlays {
            self.flatten_overlay(page_index, overlay)?;
        }

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| OverlayError::WriterError(format!("Failed to save PDF: {}", e)))?;
        Ok(buffer)
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn to_unicode_cmap(used: &BTreeMap<u16, char>) -> String {
    let entries: Vec<(u16, char)> = used.iter().map(|(gid, ch)| (*gid, *ch)).collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, ch) in chunk {
            let mut units = [0u16; 2];
            let hex: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|unit| format!("{:04X}", unit))
                .collect();
            out.push_str(&format!("<{:04X}> <{}>\n", gid, hex));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::test_images::{jpeg_header, rgba_png};
    use crate::preview::test_pdf::create_test_pdf;

    fn page_operations(bytes: &[u8], page_index: usize) -> Vec<Operation> {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = *doc.get_pages().values().nth(page_index).unwrap();
        let content = doc.get_page_content(page_id).unwrap();
        Content::decode(&content).unwrap().operations
    }

    fn numbers(op: &Operation) -> Vec<f64> {
        op.operands
            .iter()
            .map(|o| match o {
                Object::Integer(i) => *i as f64,
                Object::Real(r) => *r as f64,
                other => panic!("Expected number, got {:?}", other),
            })
            .collect()
    }

    fn operators(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(|op| op.operator.as_str()).collect()
    }

    #[test]
    fn test_page_sizes_from_media_box() {
        let pdf = create_test_pdf(&[(612, 792), (400, 500)]);
        let writer = LopdfWriter::from_bytes(&pdf).unwrap();
        assert_eq!(writer.page_count(), 2);
        assert_eq!(writer.page_size(1).unwrap(), PageSize::new(400.0, 500.0));
        assert!(writer.page_size(2).is_err());
    }

    #[test]
    fn test_standard_font_is_shared() {
        let pdf = create_test_pdf(&[(612, 792)]);
        let mut writer = LopdfWriter::from_bytes(&pdf).unwrap();
        let a = writer.resolve_font(&ResolvedFont::Standard("Helvetica")).unwrap();
        let b = writer.resolve_font(&ResolvedFont::Standard("Helvetica")).unwrap();
        let c = writer.resolve_font(&ResolvedFont::Standard("Courier")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_text_run_flattened_into_page() {
        let pdf = create_test_pdf(&[(400, 500)]);
        let mut writer = LopdfWriter::from_bytes(&pdf).unwrap();
        let font = writer.resolve_font(&ResolvedFont::Standard("Helvetica")).unwrap();
        writer
            .add_text_run(
                0,
                font,
                &TextRun {
                    x: 50.0,
                    baseline_y: 442.0,
                    font_size: 8.0,
                    text: "Hi",
                    color: Rgb::BLACK,
                },
            )
            .unwrap();
        let output = writer.finish().unwrap();

        let ops = page_operations(&output, 0);
        let names = operators(&ops);
        // original content sits inside its own save/restore pair
        assert_eq!(names.first(), Some(&"q"));
        let tj = ops
            .iter()
            .filter(|op| op.operator == "Tj")
            .last()
            .unwrap();
        match &tj.operands[0] {
            Object::String(bytes, _) => assert_eq!(bytes, b"Hi"),
            other => panic!("Expected string operand, got {:?}", other),
        }
        let td = ops.iter().filter(|op| op.operator == "Td").last().unwrap();
        assert_eq!(numbers(td), vec![50.0, 442.0]);

        let doc = Document::load_mem(&output).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        let font_id = fonts.get(b"OvF1").unwrap().as_reference().unwrap();
        let font = doc.get_dictionary(font_id).unwrap();
        assert_eq!(font.get(b"BaseFont").unwrap().as_name().unwrap(), b"Helvetica");
    }

    #[test]
    fn test_overlay_translated_to_media_box_origin() {
        let pdf = create_test_pdf(&[(400, 500)]);
        let mut doc = Document::load_mem(&pdf).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let media_box: Vec<Object> = [10, 20, 410, 520].into_iter().map(Object::Integer).collect();
        doc.get_dictionary_mut(page_id).unwrap().set("MediaBox", media_box);

        let mut writer = LopdfWriter::from_document(doc).unwrap();
        writer
            .draw_vector_path(
                0,
                &[vec![OutputPoint { x: 0.0, y: 0.0 }, OutputPoint { x: 5.0, y: 5.0 }]],
                2.0,
                Rgb::BLACK,
            )
            .unwrap();
        let output = writer.finish().unwrap();

        let ops = page_operations(&output, 0);
        let cm = ops.iter().find(|op| op.operator == "cm").unwrap();
        assert_eq!(numbers(cm), vec![1.0, 0.0, 0.0, 1.0, 10.0, 20.0]);
        let names = operators(&ops);
        assert!(names.windows(3).any(|w| w == ["m", "l", "S"]));
    }

    #[test]
    fn test_overlay_isolated_from_unterminated_content() {
        let pdf = create_test_pdf(&[(400, 500)]);
        let mut doc = Document::load_mem(&pdf).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let content_id = doc.get_page_contents(page_id)[0];
        // leaves a scaled CTM behind and has no trailing newline
        let raw = b"2 0 0 2 0 0 cm BT /F1 12 Tf (x) Tj ET".to_vec();
        doc.objects
            .insert(content_id, Object::Stream(Stream::new(Dictionary::new(), raw)));

        let mut writer = LopdfWriter::from_document(doc).unwrap();
        writer
            .draw_vector_path(
                0,
                &[vec![OutputPoint { x: 0.0, y: 0.0 }, OutputPoint { x: 5.0, y: 5.0 }]],
                1.0,
                Rgb::BLACK,
            )
            .unwrap();
        let output = writer.finish().unwrap();

        let ops = page_operations(&output, 0);
        let names = operators(&ops);
        let et = names.iter().position(|n| *n == "ET").unwrap();
        assert_eq!(&names[et..et + 3], ["ET", "Q", "q"]);
        let saves = names.iter().filter(|n| **n == "q").count();
        let restores = names.iter().filter(|n| **n == "Q").count();
        assert_eq!(saves, restores);
    }

    #[test]
    fn test_images_registered_as_xobjects() {
        let pdf = create_test_pdf(&[(400, 500)]);
        let mut writer = LopdfWriter::from_bytes(&pdf).unwrap();
        let png = writer.embed_image_asset(&rgba_png(4, 4, [0, 0, 255, 100])).unwrap();
        let jpeg = writer.embed_image_asset(&jpeg_header(8, 8, 3)).unwrap();
        let rect = Rect {
            x: 10.0,
            y: 10.0,
            width: 75.0,
            height: 37.5,
        };
        writer.draw_image(0, png, rect).unwrap();
        writer.draw_image(0, jpeg, rect).unwrap();
        let output = writer.finish().unwrap();

        let doc = Document::load_mem(&output).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.has(b"OvIm1"));
        assert!(xobjects.has(b"OvIm2"));

        let png_id = xobjects.get(b"OvIm1").unwrap().as_reference().unwrap();
        let png_stream = doc.get_object(png_id).unwrap().as_stream().unwrap();
        assert!(png_stream.dict.has(b"SMask"));

        let ops = page_operations(&output, 0);
        assert_eq!(ops.iter().filter(|op| op.operator == "Do").count(), 2);
    }

    #[test]
    fn test_untouched_pages_keep_their_content() {
        let pdf = create_test_pdf(&[(400, 500), (400, 500)]);
        let mut writer = LopdfWriter::from_bytes(&pdf).unwrap();
        writer
            .draw_vector_path(1, &[vec![OutputPoint { x: 1.0, y: 1.0 }]], 1.0, Rgb::BLACK)
            .unwrap();
        let output = writer.finish().unwrap();

        let doc = Document::load_mem(&output).unwrap();
        let first = *doc.get_pages().values().next().unwrap();
        let contents = doc.get_dictionary(first).unwrap().get(b"Contents").unwrap();
        assert!(contents.as_reference().is_ok());
    }

    #[test]
    fn test_drawing_on_missing_page_fails() {
        let pdf = create_test_pdf(&[(400, 500)]);
        let mut writer = LopdfWriter::from_bytes(&pdf).unwrap();
        let err = writer
            .draw_vector_path(3, &[], 1.0, Rgb::BLACK)
            .unwrap_err();
        assert!(matches!(err, OverlayError::WriterError(_)));
    }

    #[test]
    fn test_to_unicode_cmap_entries() {
        let used = BTreeMap::from([(3u16, 'A'), (7u16, '😀')]);
        let cmap = to_unicode_cmap(&used);
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0003> <0041>"));
        assert!(cmap.contains("<0007> <D83DDE00>"));
    }
}
