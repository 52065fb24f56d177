//! Editor configuration
//!
//! All sizing constants used by the interaction controller and the
//! reprojection engine live here so hosts can tune them from a TOML file.
//! Every field has a default, so an empty file is a valid configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::geometry::FontFamily;

/// Main configuration structure loaded from TOML files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Defaults applied to newly created text annotations
    pub text: TextDefaults,
    /// Default box sizes for image and symbol annotations
    pub boxes: BoxDefaults,
    /// Display scale tracking
    pub display: DisplayConfig,
    /// Preview generation
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextDefaults {
    pub content: String,
    pub font_size: f64,
    pub font_family: FontFamily,
    /// Horizontal padding added to the measured longest line
    pub padding: f64,
    /// Line pitch as a multiple of the font size
    pub line_height: f64,
    /// Height changes at or below this many pixels are not written back
    pub reflow_hysteresis: f64,
}

impl Default for TextDefaults {
    fn default() -> Self {
        Self {
            content: "New Text".to_string(),
            font_size: 16.0,
            font_family: FontFamily::Helvetica,
            padding: 20.0,
            line_height: 1.2,
            reflow_hysteresis: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxDefaults {
    pub image_width: f64,
    pub image_height: f64,
    pub symbol_size: f64,
    /// Smallest width or height a resize may produce
    pub min_size: f64,
}

impl Default for BoxDefaults {
    fn default() -> Self {
        Self {
            image_width: 150.0,
            image_height: 75.0,
            symbol_size: 24.0,
            min_size: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Total horizontal padding subtracted from the container width
    pub gutter: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { gutter: 16.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Preview pixels per PDF point
    pub render_scale: f64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { render_scale: 1.5 }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            text: TextDefaults::default(),
            boxes: BoxDefaults::default(),
            display: DisplayConfig::default(),
            preview: PreviewConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML is malformed,
    /// or a value fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that sizes are usable
    pub fn validate(&self) -> anyhow::Result<()> {
        let positive = [
            ("text.font_size", self.text.font_size),
            ("text.line_height", self.text.line_height),
            ("boxes.image_width", self.boxes.image_width),
            ("boxes.image_height", self.boxes.image_height),
            ("boxes.symbol_size", self.boxes.symbol_size),
            ("boxes.min_size", self.boxes.min_size),
            ("preview.render_scale", self.preview.render_scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                anyhow::bail!("{} must be a positive number, got {}", name, value);
            }
        }
        if self.text.padding < 0.0 || self.display.gutter < 0.0 {
            anyhow::bail!("text.padding and display.gutter must not be negative");
        }
        if self.text.reflow_hysteresis < 0.0 {
            anyhow::bail!("text.reflow_hysteresis must not be negative");
        }
        Ok(())
    }
}
