//! Reprojection from preview space to output space
//!
//! Preview space is Y-down pixels of the rendered page; output space is the
//! PDF page in points, Y-up, origin at the page's lower-left corner. The two
//! axes scale independently because the preview need not have the output
//! page's exact aspect ratio.
//!
//! This module only computes [`DrawCommand`]s. Fetching assets, choosing
//! fonts and writing bytes happen in [`crate::export`].

use crate::error::{OverlayError, OverlayResult};
use crate::geometry::{
    Annotation, AnnotationId, AnnotationKind, ImageRef, PageDescriptor, PathSegment, Rgb,
    TextStyle, SYMBOL_DESIGN_SIZE, SYMBOL_STROKE_WIDTH,
};

/// Default line pitch as a multiple of the font size
pub const DEFAULT_LINE_HEIGHT: f64 = 1.2;

/// Output page size in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Per-page mapping from preview pixels to output points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub output_height: f64,
}

impl PageTransform {
    pub fn new(preview: &PageDescriptor, output: PageSize) -> Self {
        Self {
            scale_x: output.width / preview.preview_width,
            scale_y: output.height / preview.preview_height,
            output_height: output.height,
        }
    }

    pub fn x(&self, preview_x: f64) -> f64 {
        preview_x * self.scale_x
    }

    /// Output Y of a preview-space top edge
    pub fn top_y(&self, preview_y: f64) -> f64 {
        self.output_height - preview_y * self.scale_y
    }
}

/// A point in output space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputPoint {
    pub x: f64,
    pub y: f64,
}

/// One primitive drawing operation in output space
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    TextRun {
        page_index: usize,
        annotation: AnnotationId,
        /// Left edge of the run
        x: f64,
        baseline_y: f64,
        font_size: f64,
        text: String,
        style: TextStyle,
        color: Rgb,
    },
    Image {
        page_index: usize,
        annotation: AnnotationId,
        image: ImageRef,
        /// Lower-left corner
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    VectorPath {
        page_index: usize,
        annotation: AnnotationId,
        /// Subpaths; each is stroked as an open polyline
        subpaths: Vec<Vec<OutputPoint>>,
        stroke_width: f64,
        color: Rgb,
    },
}

impl DrawCommand {
    pub fn page_index(&self) -> usize {
        match self {
            DrawCommand::TextRun { page_index, .. }
            | DrawCommand::Image { page_index, .. }
            | DrawCommand::VectorPath { page_index, .. } => *page_index,
        }
    }
}

/// Build draw commands for every annotation.
///
/// Commands come out ordered by page index, then by insertion order within
/// the page. `previews` and `outputs` are indexed by page. Multi-line text
/// advances `line_height` times the output font size per line.
///
/// # Errors
///
/// Returns [`OverlayError::GeometryError`] for an annotation whose page has
/// no descriptor or no output page.
pub fn build_draw_commands(
    annotations: &[Annotation],
    previews: &[PageDescriptor],
    outputs: &[PageSize],
    line_height: f64,
) -> OverlayResult<Vec<DrawCommand>> {
    let page_count = previews.len().min(outputs.len());

    let mut ordered: Vec<&Annotation> = annotations.iter().collect();
    // stable: insertion order survives within a page
    ordered.sort_by_key(|a| a.page_index);

    let mut commands = Vec::new();
    for annotation in ordered {
        if annotation.page_index >= page_count {
            tracing::error!(
                "Annotation {} references missing page {} ({} pages)",
                annotation.id,
                annotation.page_index,
                page_count
            );
            return Err(OverlayError::GeometryError {
                id: annotation.id.to_string(),
                page_index: annotation.page_index,
                page_count,
            });
        }
        let preview = &previews[annotation.page_index];
        if preview.preview_width <= 0.0 || preview.preview_height <= 0.0 {
            return Err(OverlayError::InputError(format!(
                "Page {} has an empty preview",
                annotation.page_index + 1
            )));
        }
        let transform = PageTransform::new(preview, outputs[annotation.page_index]);
        reproject_annotation(annotation, &transform, line_height, &mut commands);
    }
    Ok(commands)
}

fn reproject_annotation(
    annotation: &Annotation,
    t: &PageTransform,
    line_height: f64,
    out: &mut Vec<DrawCommand>,
) {
    let page_index = annotation.page_index;
    let left = t.x(annotation.x);
    let top = t.top_y(annotation.y);

    match &annotation.kind {
        AnnotationKind::Text {
            content,
            style,
            color,
        } => {
            let font_size = style.font_size * t.scale_y;
            let pitch = font_size * line_height;
            for (i, line) in content.split('\n').enumerate() {
                let line = line.strip_suffix('\r').unwrap_or(line);
                if line.is_empty() {
                    continue;
                }
                out.push(DrawCommand::TextRun {
                    page_index,
                    annotation: annotation.id,
                    x: left,
                    baseline_y: top - font_size - i as f64 * pitch,
                    font_size,
                    text: line.to_string(),
                    style: style.clone(),
                    color: *color,
                });
            }
        }
        AnnotationKind::Image { image_data } => {
            let height = annotation.height * t.scale_y;
            out.push(DrawCommand::Image {
                page_index,
                annotation: annotation.id,
                image: image_data.clone(),
                x: left,
                y: top - height,
                width: annotation.width * t.scale_x,
                height,
            });
        }
        AnnotationKind::Symbol { symbol_kind, color } => {
            let width = annotation.width * t.scale_x;
            let height = annotation.height * t.scale_y;
            let s = (width / SYMBOL_DESIGN_SIZE).min(height / SYMBOL_DESIGN_SIZE);
            let offset_x = (width - SYMBOL_DESIGN_SIZE * s) / 2.0;
            let offset_y = (height - SYMBOL_DESIGN_SIZE * s) / 2.0;

            // design space is Y-down from the box top
            let map = |dx: f64, dy: f64| OutputPoint {
                x: left + offset_x + dx * s,
                y: top - offset_y - dy * s,
            };

            let mut subpaths: Vec<Vec<OutputPoint>> = Vec::new();
            for segment in symbol_kind.design_path() {
                match *segment {
                    PathSegment::MoveTo(dx, dy) => subpaths.push(vec![map(dx, dy)]),
                    PathSegment::LineTo(dx, dy) => match subpaths.last_mut() {
                        Some(current) => current.push(map(dx, dy)),
                        None => subpaths.push(vec![map(dx, dy)]),
                    },
                }
            }

            out.push(DrawCommand::VectorPath {
                page_index,
                annotation: annotation.id,
                subpaths,
                stroke_width: SYMBOL_STROKE_WIDTH * s,
                color: *color,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{FontFamily, SymbolKind};
    use pretty_assertions::assert_eq;

    fn text(page_index: usize, x: f64, y: f64, content: &str, size: f64) -> Annotation {
        Annotation {
            id: AnnotationId::new(),
            page_index,
            x,
            y,
            width: 100.0,
            height: size * 1.2,
            kind: AnnotationKind::Text {
                content: content.to_string(),
                style: TextStyle {
                    font_size: size,
                    font_family: FontFamily::Helvetica,
                    bold: false,
                    italic: false,
                },
                color: Rgb::BLACK,
            },
        }
    }

    fn symbol(page_index: usize, x: f64, y: f64, w: f64, h: f64) -> Annotation {
        Annotation {
            id: AnnotationId::new(),
            page_index,
            x,
            y,
            width: w,
            height: h,
            kind: AnnotationKind::Symbol {
                symbol_kind: SymbolKind::Checkmark,
                color: Rgb::BLACK,
            },
        }
    }

    #[test]
    fn test_hi_scenario() {
        // preview 800x1000 onto a 400x500 page
        let annotation = text(0, 100.0, 100.0, "Hi", 16.0);
        let commands = build_draw_commands(
            &[annotation],
            &[PageDescriptor::new(800.0, 1000.0)],
            &[PageSize::new(400.0, 500.0)],
            DEFAULT_LINE_HEIGHT,
        )
        .unwrap();

        assert_eq!(commands.len(), 1);
        match &commands[0] {
            DrawCommand::TextRun {
                x,
                baseline_y,
                font_size,
                text,
                ..
            } => {
                assert_eq!(*x, 50.0);
                assert_eq!(*font_size, 8.0);
                assert_eq!(*baseline_y, 442.0);
                assert_eq!(text, "Hi");
            }
            other => panic!("Expected text run, got {:?}", other),
        }
    }

    #[test]
    fn test_multiline_text_pitch() {
        let annotation = text(0, 0.0, 0.0, "a\nb\r\n\nc", 10.0);
        let commands = build_draw_commands(
            &[annotation],
            &[PageDescriptor::new(100.0, 100.0)],
            &[PageSize::new(100.0, 100.0)],
            DEFAULT_LINE_HEIGHT,
        )
        .unwrap();

        let baselines: Vec<(String, f64)> = commands
            .iter()
            .map(|c| match c {
                DrawCommand::TextRun {
                    text, baseline_y, ..
                } => (text.clone(), *baseline_y),
                other => panic!("Expected text run, got {:?}", other),
            })
            .collect();
        // empty third line is skipped but still advances the pitch
        assert_eq!(
            baselines,
            vec![
                ("a".to_string(), 90.0),
                ("b".to_string(), 78.0),
                ("c".to_string(), 54.0)
            ]
        );
    }

    #[test]
    fn test_image_placement() {
        let annotation = Annotation {
            id: AnnotationId::new(),
            page_index: 0,
            x: 30.0,
            y: 60.0,
            width: 150.0,
            height: 75.0,
            kind: AnnotationKind::Image {
                image_data: ImageRef::new("sig.png"),
            },
        };
        let commands = build_draw_commands(
            &[annotation],
            &[PageDescriptor::new(300.0, 600.0)],
            &[PageSize::new(600.0, 300.0)],
            DEFAULT_LINE_HEIGHT,
        )
        .unwrap();
        match &commands[0] {
            DrawCommand::Image {
                x,
                y,
                width,
                height,
                ..
            } => {
                assert_eq!(*x, 60.0);
                assert_eq!(*width, 300.0);
                assert_eq!(*height, 37.5);
                // top edge at 300 - 30 = 270, lower-left 37.5 below
                assert_eq!(*y, 232.5);
            }
            other => panic!("Expected image, got {:?}", other),
        }
    }

    #[test]
    fn test_symbol_centered_in_box() {
        // 48x24 output box: s = 1, horizontal residual 12
        let annotation = symbol(0, 0.0, 0.0, 48.0, 24.0);
        let commands = build_draw_commands(
            &[annotation],
            &[PageDescriptor::new(100.0, 100.0)],
            &[PageSize::new(100.0, 100.0)],
            DEFAULT_LINE_HEIGHT,
        )
        .unwrap();
        match &commands[0] {
            DrawCommand::VectorPath {
                subpaths,
                stroke_width,
                ..
            } => {
                assert_eq!(*stroke_width, 2.0);
                assert_eq!(subpaths.len(), 1);
                assert_eq!(
                    subpaths[0],
                    vec![
                        OutputPoint { x: 32.0, y: 94.0 },
                        OutputPoint { x: 21.0, y: 83.0 },
                        OutputPoint { x: 16.0, y: 88.0 },
                    ]
                );
            }
            other => panic!("Expected path, got {:?}", other),
        }
    }

    #[test]
    fn test_cross_has_two_strokes() {
        let mut annotation = symbol(0, 0.0, 0.0, 24.0, 24.0);
        annotation.kind = AnnotationKind::Symbol {
            symbol_kind: SymbolKind::Cross,
            color: Rgb::BLACK,
        };
        let commands = build_draw_commands(
            &[annotation],
            &[PageDescriptor::new(24.0, 24.0)],
            &[PageSize::new(24.0, 24.0)],
            DEFAULT_LINE_HEIGHT,
        )
        .unwrap();
        match &commands[0] {
            DrawCommand::VectorPath { subpaths, .. } => assert_eq!(subpaths.len(), 2),
            other => panic!("Expected path, got {:?}", other),
        }
    }

    #[test]
    fn test_order_is_page_then_insertion() {
        let a = text(1, 0.0, 0.0, "a", 10.0);
        let b = text(0, 0.0, 0.0, "b", 10.0);
        let c = text(1, 0.0, 0.0, "c", 10.0);
        let d = text(0, 0.0, 0.0, "d", 10.0);
        let pages = [PageDescriptor::new(100.0, 100.0), PageDescriptor::new(100.0, 100.0)];
        let sizes = [PageSize::new(100.0, 100.0), PageSize::new(100.0, 100.0)];
        let commands = build_draw_commands(&[a, b, c, d], &pages, &sizes, DEFAULT_LINE_HEIGHT).unwrap();

        let texts: Vec<&str> = commands
            .iter()
            .map(|c| match c {
                DrawCommand::TextRun { text, .. } => text.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(texts, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_line_pitch_follows_line_height() {
        let annotation = text(0, 0.0, 0.0, "a\nb\nc", 16.0);
        let commands = build_draw_commands(
            &[annotation],
            &[PageDescriptor::new(200.0, 200.0)],
            &[PageSize::new(200.0, 200.0)],
            2.0,
        )
        .unwrap();

        let baselines: Vec<f64> = commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::TextRun { baseline_y, .. } => Some(*baseline_y),
                _ => None,
            })
            .collect();
        assert_eq!(baselines, vec![184.0, 152.0, 120.0]);
    }

    #[test]
    fn test_missing_page_is_geometry_error() {
        let annotation = text(2, 0.0, 0.0, "x", 10.0);
        let err = build_draw_commands(
            &[annotation],
            &[PageDescriptor::new(100.0, 100.0)],
            &[PageSize::new(100.0, 100.0)],
            DEFAULT_LINE_HEIGHT,
        )
        .unwrap_err();
        match err {
            OverlayError::GeometryError {
                page_index,
                page_count,
                ..
            } => {
                assert_eq!(page_index, 2);
                assert_eq!(page_count, 1);
            }
            other => panic!("Expected geometry error, got {:?}", other),
        }
    }
}
