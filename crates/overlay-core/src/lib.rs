//! Annotation overlays for PDF documents
//!
//! Annotations (text, signature images, symbol glyphs) are placed on a
//! rasterized page preview and later baked into the real PDF. This crate
//! owns the coordinate reconciliation between the two:
//! - preview space: preview pixels, Y-down, fixed per page
//! - screen space: preview space shrunk by the live display scale
//! - output space: PDF points, Y-up, per-axis scaled from preview space
//!
//! `EditSession` is the host-facing entry point; `export::export_annotations`
//! can also be driven directly with any `DocumentWriter`.

pub mod assets;
pub mod config;
pub mod display_scale;
pub mod error;
pub mod export;
pub mod fonts;
pub mod geometry;
pub mod interaction;
pub mod metrics;
pub mod preview;
pub mod reproject;
pub mod session;
pub mod writer;

pub use assets::{AssetDecoder, DataUrlDecoder};
pub use config::EditorConfig;
pub use display_scale::{DisplayScale, PreviewPoint, ScreenPoint};
pub use error::{OverlayError, OverlayResult};
pub use export::export_annotations;
pub use fonts::{DirFontSource, FontResolver, FontSource};
pub use geometry::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, AnnotationStore, Corner, FontFamily,
    ImageRef, PageDescriptor, Rgb, SymbolKind, TextStyle,
};
pub use interaction::{CanvasFrame, InteractionState, PointerCapture};
pub use metrics::{HeuristicMetrics, MetricsMode, TextMetrics};
pub use preview::{MediaBoxPreview, PreviewGenerator};
pub use reproject::{build_draw_commands, DrawCommand, PageSize, DEFAULT_LINE_HEIGHT};
pub use session::{AnnotationTemplate, EditSession, KeyAction, Tool};
pub use writer::{DocumentWriter, LopdfWriter};
