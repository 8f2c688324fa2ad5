//! Configuration for the annotation core
//!
//! Everything has a working default; hosts that want different rendering
//! constants load a TOML document such as:
//!
//! ```toml
//! [export]
//! capture_dpi = 96.0
//! highlight_opacity = 0.3
//!
//! [history]
//! limit = 50
//! ```

use crate::coords::DEFAULT_CAPTURE_DPI;
use crate::error::{AnnotatorError, Result};
use crate::interaction::Tool;
use crate::persistence::DEFAULT_STORAGE_KEY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnotatorConfig {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AnnotatorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AnnotatorError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| AnnotatorError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let export = &self.export;
        if !(export.capture_dpi.is_finite() && export.capture_dpi > 0.0) {
            return Err(AnnotatorError::ConfigError(format!(
                "capture_dpi must be positive, got {}",
                export.capture_dpi
            )));
        }
        if !(0.0..=1.0).contains(&export.highlight_opacity) {
            return Err(AnnotatorError::ConfigError(format!(
                "highlight_opacity must be within 0..=1, got {}",
                export.highlight_opacity
            )));
        }
        if export.comment_box_width <= 2.0 * export.comment_padding {
            return Err(AnnotatorError::ConfigError(
                "comment_box_width leaves no room for text".to_string(),
            ));
        }
        if export.comment_font_size <= 0.0 {
            return Err(AnnotatorError::ConfigError(
                "comment_font_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rendering constants used by the compositor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// DPI the page was rendered at for zoom 100%; normalized px * 72/dpi = points
    pub capture_dpi: f64,
    pub highlight_opacity: f64,
    /// Draw the highlighted source text invisibly so the export stays searchable
    pub searchable_highlights: bool,
    /// Underline thickness in points
    pub underline_thickness: f64,
    /// Stroke width (normalized units) for paths that carry none
    pub default_stroke_width: f64,
    /// Comment marker radius in points
    pub comment_marker_radius: f64,
    /// Comment note box width in points
    pub comment_box_width: f64,
    pub comment_padding: f64,
    pub comment_font_size: f64,
    pub comment_line_height: f64,
    pub comment_box_opacity: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            capture_dpi: DEFAULT_CAPTURE_DPI,
            highlight_opacity: 0.3,
            searchable_highlights: true,
            underline_thickness: 1.5,
            default_stroke_width: 2.0,
            comment_marker_radius: 6.0,
            comment_box_width: 150.0,
            comment_padding: 5.0,
            comment_font_size: 9.0,
            comment_line_height: 11.0,
            comment_box_opacity: 0.9,
        }
    }
}

impl ExportConfig {
    pub fn device_scale(&self) -> f64 {
        crate::coords::device_scale(self.capture_dpi)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum undo depth; `None` keeps every snapshot
    pub limit: Option<usize>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: Some(100) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Key the per-file annotation map is stored under
    pub storage_key: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

/// Per-call tool state supplied by the host with every interaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// 1.0 = 100%
    pub zoom_factor: f64,
    pub active_tool: Tool,
    pub active_color: String,
    pub stroke_width: f64,
    /// 1-based
    pub current_page: u32,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            zoom_factor: 1.0,
            active_tool: Tool::Select,
            active_color: "#000000".to_string(),
            stroke_width: 2.0,
            current_page: 1,
        }
    }
}

impl ToolConfig {
    pub fn new(active_tool: Tool, current_page: u32, zoom_factor: f64) -> Self {
        Self {
            zoom_factor,
            active_tool,
            current_page,
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.active_color = color.into();
        self
    }

    pub fn with_stroke_width(mut self, width: f64) -> Self {
        self.stroke_width = width;
        self
    }
}
