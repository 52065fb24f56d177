//! Pointer interaction state machine
//!
//! The controller turns pointer events into geometry updates. It never reads
//! ambient UI state: the display scale and the canvas rectangle are passed in
//! with every event, and it returns updates instead of mutating annotations
//! itself.
//!
//! While a drag or resize is active the host must route global pointer
//! move/up events to the controller. That subscription is modelled as a
//! [`CaptureGuard`]: acquired when entering `Dragging`/`Resizing`, released
//! when the guard drops, which happens on pointer-up, cancel, or when the
//! controller itself is dropped.

use std::sync::Arc;

use crate::display_scale::{DisplayScale, PreviewPoint, ScreenPoint};
use crate::geometry::{Annotation, AnnotationId, Corner};

/// Host hook for attaching and detaching global pointer listeners
pub trait PointerCapture: Send + Sync {
    fn attach(&self);
    fn detach(&self);
}

/// Capture for hosts that deliver every pointer event anyway
#[derive(Debug, Default)]
pub struct NoopCapture;

impl PointerCapture for NoopCapture {
    fn attach(&self) {}
    fn detach(&self) {}
}

/// Active global pointer subscription; detaches on drop
pub struct CaptureGuard {
    host: Arc<dyn PointerCapture>,
}

impl CaptureGuard {
    fn acquire(host: Arc<dyn PointerCapture>) -> Self {
        host.attach();
        Self { host }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.host.detach();
    }
}

impl std::fmt::Debug for CaptureGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CaptureGuard")
    }
}

/// Where the page canvas currently sits on screen.
///
/// `origin` is `None` when the canvas rectangle could not be measured, in
/// which case drags are neither started nor applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasFrame {
    pub origin: Option<ScreenPoint>,
}

impl CanvasFrame {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            origin: Some(ScreenPoint::new(x, y)),
        }
    }

    pub fn unavailable() -> Self {
        Self { origin: None }
    }
}

/// Position and size of an annotation box in preview space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxGeometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoxGeometry {
    pub fn of(annotation: &Annotation) -> Self {
        Self {
            x: annotation.x,
            y: annotation.y,
            width: annotation.width,
            height: annotation.height,
        }
    }
}

/// Geometry change produced by a pointer move
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerUpdate {
    Move {
        id: AnnotationId,
        x: f64,
        y: f64,
    },
    Resize {
        id: AnnotationId,
        geometry: BoxGeometry,
    },
}

/// Public view of the controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    Dragging,
    Resizing,
}

#[derive(Debug)]
enum Interaction {
    Idle,
    Dragging {
        id: AnnotationId,
        offset: PreviewPoint,
        _capture: CaptureGuard,
    },
    Resizing {
        id: AnnotationId,
        corner: Corner,
        start: ScreenPoint,
        initial: BoxGeometry,
        _capture: CaptureGuard,
    },
}

pub struct PointerController {
    interaction: Interaction,
    capture: Arc<dyn PointerCapture>,
    min_size: f64,
}

impl PointerController {
    pub fn new(capture: Arc<dyn PointerCapture>, min_size: f64) -> Self {
        Self {
            interaction: Interaction::Idle,
            capture,
            min_size,
        }
    }

    pub fn state(&self) -> InteractionState {
        match self.interaction {
            Interaction::Idle => InteractionState::Idle,
            Interaction::Dragging { .. } => InteractionState::Dragging,
            Interaction::Resizing { .. } => InteractionState::Resizing,
        }
    }

    /// The annotation currently being dragged or resized
    pub fn active_id(&self) -> Option<AnnotationId> {
        match &self.interaction {
            Interaction::Idle => None,
            Interaction::Dragging { id, .. } | Interaction::Resizing { id, .. } => Some(*id),
        }
    }

    /// Start dragging `annotation`. Ignored while another interaction is
    /// active or when the canvas rectangle is unavailable.
    pub fn begin_drag(
        &mut self,
        annotation: &Annotation,
        pointer: ScreenPoint,
        frame: CanvasFrame,
        scale: &DisplayScale,
    ) -> bool {
        if !matches!(self.interaction, Interaction::Idle) {
            tracing::debug!("Ignoring drag start for {}: interaction active", annotation.id);
            return false;
        }
        let Some(origin) = frame.origin else {
            tracing::debug!("Ignoring drag start for {}: no canvas rect", annotation.id);
            return false;
        };

        let pointer = scale.screen_to_preview(pointer, origin);
        let offset = PreviewPoint::new(pointer.x - annotation.x, pointer.y - annotation.y);
        self.interaction = Interaction::Dragging {
            id: annotation.id,
            offset,
            _capture: CaptureGuard::acquire(self.capture.clone()),
        };
        tracing::debug!("Drag started for {} with offset {:?}", annotation.id, offset);
        true
    }

    /// Start resizing `annotation` from `corner`. Ignored while another
    /// interaction is active or when the annotation sizes itself.
    pub fn begin_resize(&mut self, annotation: &Annotation, corner: Corner, pointer: ScreenPoint) -> bool {
        if !matches!(self.interaction, Interaction::Idle) {
            tracing::debug!("Ignoring resize start for {}: interaction active", annotation.id);
            return false;
        }
        if !annotation.is_resizable() {
            tracing::debug!("Ignoring resize start for {}: not resizable", annotation.id);
            return false;
        }

        self.interaction = Interaction::Resizing {
            id: annotation.id,
            corner,
            start: pointer,
            initial: BoxGeometry::of(annotation),
            _capture: CaptureGuard::acquire(self.capture.clone()),
        };
        tracing::debug!("Resize started for {} from {:?}", annotation.id, corner);
        true
    }

    pub fn on_pointer_move(
        &self,
        pointer: ScreenPoint,
        frame: CanvasFrame,
        scale: &DisplayScale,
    ) -> Option<PointerUpdate> {
        match &self.interaction {
            Interaction::Idle => None,
            Interaction::Dragging { id, offset, .. } => {
                let origin = frame.origin?;
                let pointer = scale.screen_to_preview(pointer, origin);
                Some(PointerUpdate::Move {
                    id: *id,
                    x: pointer.x - offset.x,
                    y: pointer.y - offset.y,
                })
            }
            Interaction::Resizing {
                id,
                corner,
                start,
                initial,
                ..
            } => {
                let dx = scale.to_preview_space(pointer.x - start.x);
                Some(PointerUpdate::Resize {
                    id: *id,
                    geometry: resize_box(*initial, *corner, dx, self.min_size),
                })
            }
        }
    }

    /// End any interaction, wherever the pointer is
    pub fn on_pointer_up(&mut self) {
        if !matches!(self.interaction, Interaction::Idle) {
            tracing::debug!("Interaction ended");
        }
        self.interaction = Interaction::Idle;
    }

    /// Abort an interaction without a pointer-up (focus loss, reset, delete)
    pub fn cancel(&mut self) {
        if !matches!(self.interaction, Interaction::Idle) {
            tracing::debug!("Interaction cancelled");
        }
        self.interaction = Interaction::Idle;
    }
}

/// Corner resize with locked aspect ratio.
///
/// Horizontal movement drives the width; height follows the initial aspect
/// ratio. Top corners keep the bottom edge fixed, left corners keep the
/// right edge fixed. Each axis is then clamped to `min_size` on its own, so
/// the aspect ratio can break at the floor.
pub fn resize_box(initial: BoxGeometry, corner: Corner, dx: f64, min_size: f64) -> BoxGeometry {
    let (width, x) = if corner.is_left() {
        (initial.width - dx, initial.x + dx)
    } else {
        (initial.width + dx, initial.x)
    };

    let aspect_ratio = initial.width / initial.height;
    let height = width / aspect_ratio;

    let y = if corner.is_top() {
        initial.y + (initial.height - height)
    } else {
        initial.y
    };

    BoxGeometry {
        x,
        y,
        width: width.max(min_size),
        height: height.max(min_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{AnnotationKind, ImageRef};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Default)]
    struct CountingCapture {
        attached: AtomicI32,
    }

    impl PointerCapture for CountingCapture {
        fn attach(&self) {
            self.attached.fetch_add(1, Ordering::SeqCst);
        }
        fn detach(&self) {
            self.attached.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn image(x: f64, y: f64, width: f64, height: f64) -> Annotation {
        Annotation {
            id: AnnotationId::new(),
            page_index: 0,
            x,
            y,
            width,
            height,
            kind: AnnotationKind::Image {
                image_data: ImageRef::new("data:image/png;base64,"),
            },
        }
    }

    fn unit_scale() -> DisplayScale {
        DisplayScale::default()
    }

    #[test]
    fn test_drag_scenario() {
        // grab (10,10) at offset (5,5), move pointer to (60,60) => (55,55)
        let annotation = image(10.0, 10.0, 150.0, 75.0);
        let mut controller = PointerController::new(Arc::new(NoopCapture), 20.0);
        let frame = CanvasFrame::at(0.0, 0.0);
        assert!(controller.begin_drag(&annotation, ScreenPoint::new(15.0, 15.0), frame, &unit_scale()));

        let update = controller.on_pointer_move(ScreenPoint::new(60.0, 60.0), frame, &unit_scale());
        assert_eq!(
            update,
            Some(PointerUpdate::Move {
                id: annotation.id,
                x: 55.0,
                y: 55.0
            })
        );
    }

    #[test]
    fn test_drag_without_canvas_rect_is_not_applied() {
        let annotation = image(10.0, 10.0, 150.0, 75.0);
        let mut controller = PointerController::new(Arc::new(NoopCapture), 20.0);
        assert!(!controller.begin_drag(
            &annotation,
            ScreenPoint::new(15.0, 15.0),
            CanvasFrame::unavailable(),
            &unit_scale()
        ));
        assert_eq!(controller.state(), InteractionState::Idle);

        assert!(controller.begin_drag(&annotation, ScreenPoint::new(15.0, 15.0), CanvasFrame::at(0.0, 0.0), &unit_scale()));
        let update = controller.on_pointer_move(ScreenPoint::new(30.0, 30.0), CanvasFrame::unavailable(), &unit_scale());
        assert_eq!(update, None);
    }

    #[test]
    fn test_resize_scenario_bottom_right() {
        let annotation = image(40.0, 50.0, 150.0, 75.0);
        let mut controller = PointerController::new(Arc::new(NoopCapture), 20.0);
        assert!(controller.begin_resize(&annotation, Corner::BottomRight, ScreenPoint::new(100.0, 100.0)));

        let update = controller.on_pointer_move(ScreenPoint::new(130.0, 140.0), CanvasFrame::unavailable(), &unit_scale());
        assert_eq!(
            update,
            Some(PointerUpdate::Resize {
                id: annotation.id,
                geometry: BoxGeometry {
                    x: 40.0,
                    y: 50.0,
                    width: 180.0,
                    height: 90.0
                }
            })
        );
    }

    #[test]
    fn test_resize_converts_screen_delta() {
        let annotation = image(0.0, 0.0, 150.0, 75.0);
        let mut scale = DisplayScale::new(0.0);
        scale.set_preview_width(1000.0);
        scale.observe_container(500.0);

        let mut controller = PointerController::new(Arc::new(NoopCapture), 20.0);
        controller.begin_resize(&annotation, Corner::BottomRight, ScreenPoint::new(0.0, 0.0));
        // 15 screen px at scale 0.5 is 30 preview px
        match controller.on_pointer_move(ScreenPoint::new(15.0, 0.0), CanvasFrame::unavailable(), &scale) {
            Some(PointerUpdate::Resize { geometry, .. }) => {
                assert!((geometry.width - 180.0).abs() < 1e-9);
                assert!((geometry.height - 90.0).abs() < 1e-9);
            }
            other => panic!("Expected resize update, got {:?}", other),
        }
    }

    #[test]
    fn test_resize_top_left_anchors_bottom_right() {
        let initial = BoxGeometry {
            x: 100.0,
            y: 100.0,
            width: 150.0,
            height: 75.0,
        };
        let g = resize_box(initial, Corner::TopLeft, -30.0, 20.0);
        assert_eq!(g.width, 180.0);
        assert_eq!(g.height, 90.0);
        assert_eq!(g.x, 70.0);
        assert_eq!(g.y, 85.0);
        // right and bottom edges unchanged
        assert_eq!(g.x + g.width, initial.x + initial.width);
        assert_eq!(g.y + g.height, initial.y + initial.height);
    }

    #[test]
    fn test_resize_floor_clamps_each_axis() {
        let initial = BoxGeometry {
            x: 0.0,
            y: 0.0,
            width: 150.0,
            height: 75.0,
        };
        // shrink far below the floor
        let g = resize_box(initial, Corner::BottomRight, -200.0, 20.0);
        assert_eq!(g.width, 20.0);
        assert_eq!(g.height, 20.0);

        // width 30 keeps width but height 15 is clamped alone
        let g = resize_box(initial, Corner::BottomRight, -120.0, 20.0);
        assert_eq!(g.width, 30.0);
        assert_eq!(g.height, 20.0);
    }

    #[test]
    fn test_text_is_not_resizable() {
        let mut annotation = image(0.0, 0.0, 100.0, 20.0);
        annotation.kind = AnnotationKind::Text {
            content: "x".to_string(),
            style: Default::default(),
            color: Default::default(),
        };
        let mut controller = PointerController::new(Arc::new(NoopCapture), 20.0);
        assert!(!controller.begin_resize(&annotation, Corner::BottomRight, ScreenPoint::new(0.0, 0.0)));
    }

    #[test]
    fn test_drag_and_resize_are_exclusive() {
        let annotation = image(0.0, 0.0, 150.0, 75.0);
        let mut controller = PointerController::new(Arc::new(NoopCapture), 20.0);
        let frame = CanvasFrame::at(0.0, 0.0);

        assert!(controller.begin_drag(&annotation, ScreenPoint::new(1.0, 1.0), frame, &unit_scale()));
        assert!(!controller.begin_resize(&annotation, Corner::TopLeft, ScreenPoint::new(1.0, 1.0)));
        assert_eq!(controller.state(), InteractionState::Dragging);

        controller.on_pointer_up();
        assert!(controller.begin_resize(&annotation, Corner::TopLeft, ScreenPoint::new(1.0, 1.0)));
        assert!(!controller.begin_drag(&annotation, ScreenPoint::new(1.0, 1.0), frame, &unit_scale()));
        assert_eq!(controller.state(), InteractionState::Resizing);
    }

    #[test]
    fn test_capture_released_on_every_exit_path() {
        let capture = Arc::new(CountingCapture::default());
        let annotation = image(0.0, 0.0, 150.0, 75.0);
        let frame = CanvasFrame::at(0.0, 0.0);

        let mut controller = PointerController::new(capture.clone(), 20.0);
        controller.begin_drag(&annotation, ScreenPoint::new(1.0, 1.0), frame, &unit_scale());
        assert_eq!(capture.attached.load(Ordering::SeqCst), 1);
        controller.on_pointer_up();
        assert_eq!(capture.attached.load(Ordering::SeqCst), 0);

        controller.begin_resize(&annotation, Corner::BottomLeft, ScreenPoint::new(1.0, 1.0));
        assert_eq!(capture.attached.load(Ordering::SeqCst), 1);
        controller.cancel();
        assert_eq!(capture.attached.load(Ordering::SeqCst), 0);

        controller.begin_drag(&annotation, ScreenPoint::new(1.0, 1.0), frame, &unit_scale());
        drop(controller);
        assert_eq!(capture.attached.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pointer_move_when_idle_does_nothing() {
        let controller = PointerController::new(Arc::new(NoopCapture), 20.0);
        assert_eq!(
            controller.on_pointer_move(ScreenPoint::new(5.0, 5.0), CanvasFrame::at(0.0, 0.0), &unit_scale()),
            None
        );
    }
}
