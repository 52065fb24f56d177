//! Editing session
//!
//! [`EditSession`] is the host-facing surface: it owns the loaded document,
//! the annotation model, selection and tool state, and routes pointer and
//! keyboard events through the interaction controller. Collaborators
//! (preview generation, asset loading, fonts, pointer capture) are injected
//! so hosts can swap them.

use std::sync::Arc;

use crate::assets::{AssetDecoder, DataUrlDecoder};
use crate::config::EditorConfig;
use crate::display_scale::{DisplayScale, PreviewPoint, ScreenPoint};
use crate::error::{OverlayError, OverlayResult};
use crate::export::export_annotations;
use crate::fonts::{FontResolver, FontSource};
use crate::geometry::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, AnnotationStore, Corner, ImageRef,
    PageDescriptor, Rgb, SymbolKind, TextStyle,
};
use crate::interaction::{
    CanvasFrame, InteractionState, NoopCapture, PointerCapture, PointerController, PointerUpdate,
};
use crate::metrics::{
    estimate_content_height, min_text_height, reflow_height, text_box_width, HeuristicMetrics,
    TextMetrics,
};
use crate::preview::{MediaBoxPreview, PreviewGenerator};
use crate::writer::LopdfWriter;

/// Active editor tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Select,
    Text,
    /// Places the current source (signature) image
    Image,
    Symbol,
}

/// What a new annotation should be
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationTemplate {
    Text,
    Image(ImageRef),
    Symbol(SymbolKind),
}

/// Result of a keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Deleted(AnnotationId),
    ToolSelected(Tool),
    Ignored,
}

pub struct EditSession {
    config: EditorConfig,
    source: Option<Vec<u8>>,
    pages: Vec<PageDescriptor>,
    store: AnnotationStore,
    selected: Option<AnnotationId>,
    tool: Tool,
    source_image: Option<ImageRef>,
    current_page: usize,
    display: DisplayScale,
    pointer: PointerController,
    metrics: Arc<dyn TextMetrics>,
    fonts: FontResolver,
    preview: Arc<dyn PreviewGenerator>,
    assets: Arc<dyn AssetDecoder>,
}

impl EditSession {
    pub fn new(config: EditorConfig) -> Self {
        let display = DisplayScale::new(config.display.gutter);
        let pointer = PointerController::new(Arc::new(NoopCapture), config.boxes.min_size);
        let preview = Arc::new(MediaBoxPreview::new(config.preview.render_scale));
        Self {
            config,
            source: None,
            pages: Vec::new(),
            store: AnnotationStore::new(),
            selected: None,
            tool: Tool::Select,
            source_image: None,
            current_page: 0,
            display,
            pointer,
            metrics: Arc::new(HeuristicMetrics),
            fonts: FontResolver::standard(),
            preview,
            assets: Arc::new(DataUrlDecoder::new()),
        }
    }

    pub fn with_font_source(mut self, source: Arc<dyn FontSource>) -> Self {
        self.fonts = FontResolver::with_source(source);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn TextMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_preview_generator(mut self, preview: Arc<dyn PreviewGenerator>) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_asset_decoder(mut self, assets: Arc<dyn AssetDecoder>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_pointer_capture(mut self, capture: Arc<dyn PointerCapture>) -> Self {
        self.pointer = PointerController::new(capture, self.config.boxes.min_size);
        self
    }

    /// Switch text measurement to the font source's programs, if any load
    pub async fn load_font_metrics(&mut self) {
        let metrics = self.fonts.load_metrics().await;
        if metrics.is_empty() {
            tracing::info!("Text metrics: heuristic");
            return;
        }
        tracing::info!("Text metrics: font programs");
        self.metrics = Arc::new(metrics);
    }

    /// Load a source document, replacing the current one.
    ///
    /// # Errors
    ///
    /// On an input error the session is left empty, as after [`Self::reset`].
    pub async fn load(&mut self, source: Vec<u8>) -> OverlayResult<&[PageDescriptor]> {
        self.reset();
        let rendered = self.preview.render_pages(&source).await;
        match rendered {
            Ok(pages) if !pages.is_empty() => {
                tracing::info!("Loaded document with {} pages", pages.len());
                self.display.set_preview_width(pages[0].preview_width);
                self.pages = pages;
                self.source = Some(source);
                Ok(&self.pages)
            }
            Ok(_) => Err(OverlayError::InputError("Document has no pages".to_string())),
            Err(e) => {
                tracing::warn!("Failed to load document: {}", e);
                Err(e)
            }
        }
    }

    /// Drop the document and every annotation
    pub fn reset(&mut self) {
        self.pointer.cancel();
        self.source = None;
        self.pages.clear();
        self.store.clear();
        self.selected = None;
        self.tool = Tool::Select;
        self.current_page = 0;
        self.display.set_preview_width(0.0);
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn pages(&self) -> &[PageDescriptor] {
        &self.pages
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.store.annotations()
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.store.get(id)
    }

    pub fn selected(&self) -> Option<AnnotationId> {
        self.selected
    }

    pub fn select(&mut self, id: Option<AnnotationId>) {
        self.selected = id.filter(|id| self.store.get(*id).is_some());
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        tracing::debug!("Tool: {:?}", tool);
        self.tool = tool;
    }

    pub fn set_source_image(&mut self, image: Option<ImageRef>) {
        self.source_image = image;
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn display_scale(&self) -> f64 {
        self.display.scale()
    }

    pub fn interaction_state(&self) -> InteractionState {
        self.pointer.state()
    }

    pub fn observe_container(&mut self, container_width: f64) -> f64 {
        self.display.observe_container(container_width)
    }

    /// Navigate to another page
    pub fn set_current_page(&mut self, page_index: usize) -> OverlayResult<()> {
        let page = self
            .pages
            .get(page_index)
            .ok_or_else(|| self.missing_page("navigation", page_index))?;
        let preview_width = page.preview_width;
        self.pointer.cancel();
        self.selected = None;
        self.current_page = page_index;
        self.display.set_preview_width(preview_width);
        Ok(())
    }

    /// Replace the annotation model, e.g. with one loaded from JSON.
    ///
    /// Boxes below the minimum size are grown to it and text boxes are
    /// re-measured, so the loaded model obeys the same floors as one built
    /// interactively.
    ///
    /// # Errors
    ///
    /// Rejects the whole model if any annotation references a missing page,
    /// has a non-finite coordinate, a non-positive size or a non-positive
    /// font size. The current model is kept in that case.
    pub fn replace_annotations(&mut self, store: AnnotationStore) -> OverlayResult<()> {
        let mut annotations = store.into_annotations();
        for annotation in &annotations {
            self.validate_loaded(annotation)?;
        }
        for annotation in &mut annotations {
            self.normalize_loaded(annotation);
        }
        self.pointer.cancel();
        self.selected = None;
        self.store = AnnotationStore::from(annotations);
        Ok(())
    }

    fn validate_loaded(&self, annotation: &Annotation) -> OverlayResult<()> {
        if annotation.page_index >= self.pages.len() {
            return Err(self.missing_page(&annotation.id.to_string(), annotation.page_index));
        }
        let finite = [annotation.x, annotation.y, annotation.width, annotation.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(OverlayError::InputError(format!(
                "Annotation {} has a non-finite position or size",
                annotation.id
            )));
        }
        if annotation.width <= 0.0 || annotation.height <= 0.0 {
            return Err(OverlayError::InputError(format!(
                "Annotation {} has an empty box ({} x {})",
                annotation.id, annotation.width, annotation.height
            )));
        }
        if let Some(style) = annotation.text_style() {
            if !style.font_size.is_finite() || style.font_size <= 0.0 {
                return Err(OverlayError::InputError(format!(
                    "Annotation {} has invalid font size {}",
                    annotation.id, style.font_size
                )));
            }
        }
        Ok(())
    }

    fn normalize_loaded(&self, annotation: &mut Annotation) {
        let min_size = self.config.boxes.min_size;
        let text = &self.config.text;
        match &annotation.kind {
            AnnotationKind::Text { content, style, .. } => {
                let metrics = self.metrics.as_ref();
                let width = text_box_width(metrics, content, style, text.padding);
                let natural =
                    estimate_content_height(metrics, content, style, width - text.padding, text.line_height);
                annotation.width = width;
                annotation.height = annotation.height.max(natural);
            }
            AnnotationKind::Image { .. } | AnnotationKind::Symbol { .. } => {
                annotation.width = annotation.width.max(min_size);
                annotation.height = annotation.height.max(min_size);
            }
        }
    }

    fn missing_page(&self, id: &str, page_index: usize) -> OverlayError {
        OverlayError::GeometryError {
            id: id.to_string(),
            page_index,
            page_count: self.pages.len(),
        }
    }

    /// Create an annotation with default size at a preview-space position
    pub fn create_annotation(
        &mut self,
        page_index: usize,
        position: PreviewPoint,
        template: AnnotationTemplate,
    ) -> OverlayResult<AnnotationId> {
        let id = AnnotationId::new();
        if page_index >= self.pages.len() {
            return Err(self.missing_page(&id.to_string(), page_index));
        }

        let (width, height, kind) = match template {
            AnnotationTemplate::Text => {
                let defaults = &self.config.text;
                let style = TextStyle {
                    font_size: defaults.font_size,
                    font_family: defaults.font_family,
                    bold: false,
                    italic: false,
                };
                let content = defaults.content.clone();
                let width = text_box_width(self.metrics.as_ref(), &content, &style, defaults.padding);
                let height = min_text_height(style.font_size, defaults.line_height);
                let kind = AnnotationKind::Text {
                    content,
                    style,
                    color: Rgb::BLACK,
                };
                (width, height, kind)
            }
            AnnotationTemplate::Image(image_data) => (
                self.config.boxes.image_width,
                self.config.boxes.image_height,
                AnnotationKind::Image { image_data },
            ),
            AnnotationTemplate::Symbol(symbol_kind) => (
                self.config.boxes.symbol_size,
                self.config.boxes.symbol_size,
                AnnotationKind::Symbol {
                    symbol_kind,
                    color: Rgb::BLACK,
                },
            ),
        };

        tracing::debug!("Created {} annotation {} on page {}", kind.name(), id, page_index);
        self.store.add(Annotation {
            id,
            page_index,
            x: position.x,
            y: position.y,
            width,
            height,
            kind,
        });
        Ok(id)
    }

    /// Pointer-down on empty canvas.
    ///
    /// With a creation tool active this places a new annotation, selects it
    /// and returns to the select tool; otherwise it clears the selection.
    pub fn click_background(&mut self, pointer: ScreenPoint, frame: CanvasFrame) -> Option<AnnotationId> {
        let template = match self.tool {
            Tool::Select => {
                self.selected = None;
                return None;
            }
            Tool::Text => AnnotationTemplate::Text,
            Tool::Image => match &self.source_image {
                Some(image) => AnnotationTemplate::Image(image.clone()),
                None => {
                    tracing::debug!("Image tool active without a source image");
                    return None;
                }
            },
            Tool::Symbol => AnnotationTemplate::Symbol(SymbolKind::Checkmark),
        };
        let Some(origin) = frame.origin else {
            tracing::debug!("Ignoring canvas click: no canvas rect");
            return None;
        };

        let position = self.display.screen_to_preview(pointer, origin);
        match self.create_annotation(self.current_page, position, template) {
            Ok(id) => {
                self.selected = Some(id);
                self.tool = Tool::Select;
                Some(id)
            }
            Err(e) => {
                tracing::warn!("Could not create annotation: {}", e);
                None
            }
        }
    }

    /// Apply a partial update. Returns `false` for an unknown id.
    ///
    /// Text boxes are re-measured after every layout change; image and
    /// symbol sizes are held to the minimum box size.
    pub fn update_annotation(&mut self, id: AnnotationId, patch: AnnotationPatch) -> bool {
        let min_size = self.config.boxes.min_size;
        let text = self.config.text.clone();
        let metrics = self.metrics.clone();
        let Some(annotation) = self.store.get_mut(id) else {
            return false;
        };

        if let Some(x) = patch.x {
            annotation.x = x;
        }
        if let Some(y) = patch.y {
            annotation.y = y;
        }

        let resizable = annotation.is_resizable();
        match &mut annotation.kind {
            AnnotationKind::Text {
                content,
                style,
                color,
            } => {
                if let Some(new_content) = &patch.content {
                    content.clone_from(new_content);
                }
                if let Some(size) = patch.font_size.filter(|s| s.is_finite() && *s > 0.0) {
                    style.font_size = size;
                }
                if let Some(family) = patch.font_family {
                    style.font_family = family;
                }
                if let Some(bold) = patch.bold {
                    style.bold = bold;
                }
                if let Some(italic) = patch.italic {
                    style.italic = italic;
                }
                if let Some(new_color) = patch.color {
                    *color = new_color;
                }

                if patch.touches_text_layout() {
                    let width = text_box_width(metrics.as_ref(), content, style, text.padding);
                    let natural = estimate_content_height(
                        metrics.as_ref(),
                        content,
                        style,
                        width - text.padding,
                        text.line_height,
                    );
                    let font_size = style.font_size;
                    annotation.width = width;
                    if let Some(height) = reflow_height(
                        annotation.height,
                        natural,
                        font_size,
                        text.line_height,
                        text.reflow_hysteresis,
                    ) {
                        annotation.height = height;
                    }
                }
            }
            AnnotationKind::Image { image_data } => {
                if let Some(new_image) = &patch.image_data {
                    image_data.clone_from(new_image);
                }
            }
            AnnotationKind::Symbol { symbol_kind, color } => {
                if let Some(kind) = patch.symbol_kind {
                    *symbol_kind = kind;
                }
                if let Some(new_color) = patch.color {
                    *color = new_color;
                }
            }
        }

        if resizable {
            if let Some(width) = patch.width {
                annotation.width = width.max(min_size);
            }
            if let Some(height) = patch.height {
                annotation.height = height.max(min_size);
            }
        }
        true
    }

    /// Write back a text box height measured by the host's renderer.
    ///
    /// Returns the new height when it was written.
    pub fn reflow_text_height(&mut self, id: AnnotationId, natural_height: f64) -> Option<f64> {
        let line_height = self.config.text.line_height;
        let hysteresis = self.config.text.reflow_hysteresis;
        let annotation = self.store.get_mut(id)?;
        let font_size = annotation.text_style()?.font_size;
        let height = reflow_height(annotation.height, natural_height, font_size, line_height, hysteresis)?;
        annotation.height = height;
        Some(height)
    }

    /// Remove an annotation. Returns `false` for an unknown id.
    pub fn delete_annotation(&mut self, id: AnnotationId) -> bool {
        if self.pointer.active_id() == Some(id) {
            self.pointer.cancel();
        }
        if self.selected == Some(id) {
            self.selected = None;
        }
        let removed = self.store.remove(id).is_some();
        if removed {
            tracing::debug!("Deleted annotation {}", id);
        }
        removed
    }

    /// Pointer-down on an annotation body.
    ///
    /// Always selects the annotation; a drag only starts with the select
    /// tool active. Returns whether a drag started.
    pub fn begin_drag(&mut self, id: AnnotationId, pointer: ScreenPoint, frame: CanvasFrame) -> bool {
        let Some(annotation) = self.store.get(id) else {
            return false;
        };
        self.selected = Some(id);
        if self.tool != Tool::Select {
            return false;
        }
        self.pointer.begin_drag(annotation, pointer, frame, &self.display)
    }

    /// Pointer-down on a corner handle
    pub fn begin_resize(&mut self, id: AnnotationId, corner: Corner, pointer: ScreenPoint) -> bool {
        let Some(annotation) = self.store.get(id) else {
            return false;
        };
        self.pointer.begin_resize(annotation, corner, pointer)
    }

    /// Global pointer move. Returns whether an annotation changed.
    pub fn on_pointer_move(&mut self, pointer: ScreenPoint, frame: CanvasFrame) -> bool {
        let Some(update) = self.pointer.on_pointer_move(pointer, frame, &self.display) else {
            return false;
        };
        match update {
            PointerUpdate::Move { id, x, y } => match self.store.get_mut(id) {
                Some(annotation) => {
                    annotation.x = x;
                    annotation.y = y;
                    true
                }
                None => false,
            },
            PointerUpdate::Resize { id, geometry } => match self.store.get_mut(id) {
                Some(annotation) => {
                    annotation.x = geometry.x;
                    annotation.y = geometry.y;
                    annotation.width = geometry.width;
                    annotation.height = geometry.height;
                    true
                }
                None => false,
            },
        }
    }

    pub fn on_pointer_up(&mut self) {
        self.pointer.on_pointer_up();
    }

    pub fn cancel_interaction(&mut self) {
        self.pointer.cancel();
    }

    /// Keyboard shortcuts; all ignored while a text input has focus
    pub fn handle_key(&mut self, key: &str, text_input_focused: bool) -> KeyAction {
        if text_input_focused {
            return KeyAction::Ignored;
        }
        let selected = self.selected;
        match key {
            "Delete" | "Backspace" => match selected {
                Some(id) if self.delete_annotation(id) => KeyAction::Deleted(id),
                _ => KeyAction::Ignored,
            },
            "t" | "T" | "т" | "Т" => {
                self.set_tool(Tool::Text);
                KeyAction::ToolSelected(Tool::Text)
            }
            "s" | "S" | "с" | "С" => {
                self.set_tool(Tool::Image);
                KeyAction::ToolSelected(Tool::Image)
            }
            _ => KeyAction::Ignored,
        }
    }

    /// Bake every annotation into the loaded document.
    ///
    /// The session itself is not modified.
    pub async fn export(&self) -> OverlayResult<Vec<u8>> {
        let source = self
            .source
            .as_deref()
            .ok_or_else(|| OverlayError::InputError("No document loaded".to_string()))?;
        let writer = LopdfWriter::from_bytes(source)?;
        export_annotations(
            writer,
            self.store.annotations(),
            &self.pages,
            &self.fonts,
            self.assets.as_ref(),
            self.config.text.line_height,
        )
        .await
    }
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}
