//! Runtime configuration.
//!
//! Loaded from a JSON file by the CLI; every field has a default so a
//! partial file (or none at all) is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::Color;

fn default_min_delay_ms() -> u64 {
    0
}

fn default_poll_interval_ms() -> u64 {
    100
}

/// Loader attach timeout. After this the interpreter stays unavailable.
fn default_init_timeout_ms() -> u64 {
    30_000
}

fn default_max_operations() -> u64 {
    1_000_000
}

fn default_max_call_levels() -> usize {
    64
}

/// Script execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Minimum gap between the end of one run and the start of the next.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// How often to check whether the engine loader has become available.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Rhai operation budget per run (guards against infinite loops).
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,
}

impl RunnerConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_operations == 0 {
            return Err("maxOperations must be positive".to_string());
        }
        if self.max_call_levels == 0 {
            return Err("maxCallLevels must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            init_timeout_ms: default_init_timeout_ms(),
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
        }
    }
}

fn default_palette() -> Vec<Color> {
    vec![
        Color::new(0x3b, 0x82, 0xf6, 0x14),
        Color::new(0x10, 0xb9, 0x81, 0x18),
        Color::new(0xf5, 0x9e, 0x0b, 0x1c),
        Color::new(0xec, 0x48, 0x99, 0x18),
        Color::new(0x8b, 0x5c, 0xf6, 0x18),
        Color::new(0x14, 0xb8, 0xa6, 0x1c),
    ]
}

/// Drawing constants, all in screen pixels unless noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    /// Smallest distance between grid lines.
    pub min_grid_px: f64,
    /// Smallest distance between axis labels.
    pub min_label_gap_px: f64,
    /// Extra margin around the visible area when generating grid lines.
    pub grid_margin_px: f64,
    /// Upper bound on grid lines per direction.
    pub max_grid_lines: usize,
    pub arrow_head_px: f64,
    /// Half-angle of the arrowhead, degrees.
    pub arrow_head_angle_deg: f64,
    pub border_width: f64,
    pub selected_border_width: f64,
    pub label_font_px: f64,
    pub background: Color,
    pub grid_color: Color,
    pub axis_color: Color,
    pub border_color: Color,
    pub selected_color: Color,
    pub base_i_color: Color,
    pub base_j_color: Color,
    pub label_color: Color,
    /// Background tints cycled by nesting depth.
    pub depth_palette: Vec<Color>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            min_grid_px: 24.0,
            min_label_gap_px: 48.0,
            grid_margin_px: 40.0,
            max_grid_lines: 400,
            arrow_head_px: 10.0,
            arrow_head_angle_deg: 25.0,
            border_width: 1.5,
            selected_border_width: 3.0,
            label_font_px: 11.0,
            background: Color::WHITE,
            grid_color: Color::new(0x94, 0xa3, 0xb8, 0x66),
            axis_color: Color::rgb(0x33, 0x41, 0x55),
            border_color: Color::rgb(0x47, 0x55, 0x69),
            selected_color: Color::rgb(0xf9, 0x73, 0x16),
            base_i_color: Color::rgb(0xdc, 0x26, 0x26),
            base_j_color: Color::rgb(0x16, 0xa3, 0x4a),
            label_color: Color::rgb(0x47, 0x55, 0x69),
            depth_palette: default_palette(),
        }
    }
}

impl RenderConfig {
    /// Background tint for a nesting depth. Cycles through the palette.
    pub fn depth_tint(&self, depth: usize) -> Color {
        if self.depth_palette.is_empty() {
            return Color::TRANSPARENT;
        }
        self.depth_palette[depth % self.depth_palette.len()]
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub runner: RunnerConfig,
    pub render: RenderConfig,
}

impl AppConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {:?}: {}", path, e))?;
        let config: AppConfig = serde_json::from_str(&text)
            .map_err(|e| format!("Failed to parse config {:?}: {}", path, e))?;
        config.runner.validate()?;
        Ok(config)
    }
}
