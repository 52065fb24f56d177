//! Text measurement
//!
//! Text annotations never have their size set directly: width comes from
//! measuring the longest line, height from the wrapped content height. Both
//! must agree with whatever surface finally renders the text, so a host that
//! has the real font programs should use [`FontProgramMetrics`]; the
//! character-count heuristic exists so sizing degrades instead of failing.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::fonts::FontProgram;
use crate::geometry::{FontVariant, TextStyle};

/// Average glyph advance as a fraction of the font size
const HEURISTIC_ADVANCE: f64 = 0.6;

/// Extra width bold glyphs take in the heuristic
const HEURISTIC_BOLD_FACTOR: f64 = 1.15;

/// Which measurement strategy a provider uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsMode {
    /// `chars x size x 0.6`, +15% when bold
    Heuristic,
    /// Advance widths from loaded TrueType programs
    FontProgram,
}

/// Measures the rendered pixel width of a single line of text
pub trait TextMetrics: Send + Sync {
    fn measure_width(&self, text: &str, style: &TextStyle) -> f64;

    fn mode(&self) -> MetricsMode;
}

/// Deterministic fallback used when no font programs are available
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicMetrics;

impl HeuristicMetrics {
    fn char_width(style: &TextStyle) -> f64 {
        let bold = if style.bold {
            HEURISTIC_BOLD_FACTOR
        } else {
            1.0
        };
        style.font_size * HEURISTIC_ADVANCE * bold
    }
}

impl TextMetrics for HeuristicMetrics {
    fn measure_width(&self, text: &str, style: &TextStyle) -> f64 {
        text.chars().count() as f64 * Self::char_width(style)
    }

    fn mode(&self) -> MetricsMode {
        MetricsMode::Heuristic
    }
}

/// Measures with the same font programs the export embeds.
///
/// Variants without a loaded program, and characters the program has no
/// glyph for, fall back to the heuristic per character.
#[derive(Debug, Clone, Default)]
pub struct FontProgramMetrics {
    programs: BTreeMap<FontVariant, Arc<FontProgram>>,
}

impl FontProgramMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, variant: FontVariant, program: Arc<FontProgram>) -> Self {
        self.programs.insert(variant, program);
        self
    }

    pub fn insert(&mut self, variant: FontVariant, program: Arc<FontProgram>) {
        self.programs.insert(variant, program);
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl TextMetrics for FontProgramMetrics {
    fn measure_width(&self, text: &str, style: &TextStyle) -> f64 {
        let Some(program) = self.programs.get(&style.variant()) else {
            return HeuristicMetrics.measure_width(text, style);
        };
        let (units, missing) = program.text_advance_units(text);
        let scale = style.font_size / program.units_per_em as f64;
        units * scale + missing as f64 * HeuristicMetrics::char_width(style)
    }

    fn mode(&self) -> MetricsMode {
        if self.programs.is_empty() {
            MetricsMode::Heuristic
        } else {
            MetricsMode::FontProgram
        }
    }
}

/// Width of a text box: widest line plus horizontal padding.
///
/// An empty line is measured as a single space so the box never collapses.
pub fn text_box_width(metrics: &dyn TextMetrics, content: &str, style: &TextStyle, padding: f64) -> f64 {
    let widest = content
        .split('\n')
        .map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let line = if line.is_empty() { " " } else { line };
            metrics.measure_width(line, style)
        })
        .fold(0.0_f64, f64::max);
    widest + padding
}

/// Minimum height of a text box with the given font size
pub fn min_text_height(font_size: f64, line_height: f64) -> f64 {
    font_size * line_height
}

/// Natural height of `content` reflowed at `box_width`.
///
/// Hard line breaks always start a new line; within a line words are wrapped
/// greedily. A single word wider than the box occupies its own line.
pub fn estimate_content_height(
    metrics: &dyn TextMetrics,
    content: &str,
    style: &TextStyle,
    box_width: f64,
    line_height: f64,
) -> f64 {
    let mut lines = 0usize;
    for hard_line in content.split('\n') {
        lines += wrapped_line_count(metrics, hard_line, style, box_width);
    }
    lines.max(1) as f64 * style.font_size * line_height
}

fn wrapped_line_count(metrics: &dyn TextMetrics, line: &str, style: &TextStyle, box_width: f64) -> usize {
    let mut count = 1;
    let mut current = String::new();
    for word in line.split(' ') {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if !current.is_empty() && metrics.measure_width(&candidate, style) > box_width {
            count += 1;
            current = word.to_string();
        } else {
            current = candidate;
        }
    }
    count
}

/// Height to write back after a content change, if any.
///
/// The new height is `natural_height` floored at the single-line minimum;
/// changes within `hysteresis` pixels are swallowed to avoid update loops.
pub fn reflow_height(
    current_height: f64,
    natural_height: f64,
    font_size: f64,
    line_height: f64,
    hysteresis: f64,
) -> Option<f64> {
    let new_height = natural_height.max(min_text_height(font_size, line_height));
    if (current_height - new_height).abs() > hysteresis {
        Some(new_height)
    } else {
        None
    }
}
