//! Display scale tracking
//!
//! A page preview is shown shrunk to fit the viewport. The tracker keeps the
//! ratio between on-screen size and preview size current, and is the only
//! place screen measurements are converted into preview space.

/// Smallest scale the tracker reports, so conversions never divide by zero
const MIN_SCALE: f64 = 0.01;

/// Screen position in client pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Position in preview space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewPoint {
    pub x: f64,
    pub y: f64,
}

impl PreviewPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Ratio between on-screen page size and preview size, always <= 1
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayScale {
    gutter: f64,
    container_width: Option<f64>,
    preview_width: f64,
    scale: f64,
}

impl DisplayScale {
    pub fn new(gutter: f64) -> Self {
        Self {
            gutter,
            container_width: None,
            preview_width: 0.0,
            scale: 1.0,
        }
    }

    /// Record a new container width (from a resize observation)
    pub fn observe_container(&mut self, container_width: f64) -> f64 {
        self.container_width = Some(container_width);
        self.recompute()
    }

    /// Record the active page's preview width (on page navigation)
    pub fn set_preview_width(&mut self, preview_width: f64) -> f64 {
        self.preview_width = preview_width;
        self.recompute()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn container_width(&self) -> Option<f64> {
        self.container_width
    }

    fn recompute(&mut self) -> f64 {
        self.scale = match self.container_width {
            Some(container) if self.preview_width > 0.0 => {
                let available = container - self.gutter;
                (available / self.preview_width).clamp(MIN_SCALE, 1.0)
            }
            _ => 1.0,
        };
        tracing::trace!("Display scale recomputed: {}", self.scale);
        self.scale
    }

    /// Convert an on-screen distance to preview pixels
    pub fn to_preview_space(&self, screen_delta: f64) -> f64 {
        screen_delta / self.scale
    }

    /// Convert a screen point to preview space relative to the canvas origin
    pub fn screen_to_preview(&self, point: ScreenPoint, canvas_origin: ScreenPoint) -> PreviewPoint {
        PreviewPoint {
            x: self.to_preview_space(point.x - canvas_origin.x),
            y: self.to_preview_space(point.y - canvas_origin.y),
        }
    }
}

impl Default for DisplayScale {
    fn default() -> Self {
        Self::new(16.0)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: scale stays within (0, 1] for any geometry
        #[test]
        fn scale_is_bounded(container in 0.0f64..5000.0, preview in 1.0f64..5000.0) {
            let mut tracker = DisplayScale::new(16.0);
            tracker.set_preview_width(preview);
            let scale = tracker.observe_container(container);
            prop_assert!(scale > 0.0 && scale <= 1.0);
        }

        /// Property: converting a preview distance to screen and back is lossless
        #[test]
        fn preview_roundtrip(container in 100.0f64..3000.0, preview in 100.0f64..3000.0, d in -500.0f64..500.0) {
            let mut tracker = DisplayScale::new(16.0);
            tracker.set_preview_width(preview);
            tracker.observe_container(container);
            let screen = d * tracker.scale();
            prop_assert!((tracker.to_preview_space(screen) - d).abs() < 1e-9);
        }
    }
}
