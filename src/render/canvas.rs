//! Drawing surface abstraction.
//!
//! The renderer only talks to [`Canvas`]. Clip regions behave like the HTML
//! canvas: each `clip_polygon` intersects with the current clip, and
//! `restore` pops back to the clip saved by the matching `save`.

use glam::DVec2;
use serde::Serialize;

use crate::color::Color;

/// Line styling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f64,
    /// On/off dash lengths in pixels; empty for a solid line.
    pub dash: Vec<f64>,
}

impl StrokeStyle {
    pub fn solid(color: Color, width: f64) -> Self {
        Self {
            color,
            width,
            dash: Vec::new(),
        }
    }

    pub fn dashed(color: Color, width: f64, on: f64, off: f64) -> Self {
        Self {
            color,
            width,
            dash: vec![on, off],
        }
    }
}

/// Horizontal anchor for text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Start,
    Middle,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    pub color: Color,
    pub size: f64,
    pub align: TextAlign,
}

/// A 2-D drawing target in screen pixels (y down).
pub trait Canvas {
    /// Canvas size in pixels.
    fn size(&self) -> (f64, f64);

    /// Push the current clip state.
    fn save(&mut self);

    /// Pop the clip state pushed by the matching `save`.
    fn restore(&mut self);

    /// Intersect the current clip with a polygon.
    fn clip_polygon(&mut self, points: &[DVec2]);

    fn fill_polygon(&mut self, points: &[DVec2], color: Color);

    /// Stroke an open polyline, or a closed outline when `closed` is set.
    fn stroke_polyline(&mut self, points: &[DVec2], closed: bool, style: &StrokeStyle);

    fn fill_text(&mut self, text: &str, at: DVec2, style: &TextStyle);
}

/// One recorded drawing command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Save,
    Restore,
    Clip { points: Vec<DVec2> },
    Fill { points: Vec<DVec2>, color: Color },
    Stroke { points: Vec<DVec2>, closed: bool, style: StrokeStyle },
    Text { text: String, at: DVec2, style: TextStyle },
}

/// Canvas that records commands instead of drawing them.
///
/// Used by tests and by callers that want to inspect a frame's draw list.
#[derive(Debug, Clone)]
pub struct RecordingCanvas {
    width: f64,
    height: f64,
    pub commands: Vec<DrawCommand>,
    depth: usize,
    max_depth: usize,
}

impl RecordingCanvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
            depth: 0,
            max_depth: 0,
        }
    }

    /// Current save depth; zero when every `save` has been restored.
    pub fn save_depth(&self) -> usize {
        self.depth
    }

    /// Deepest save nesting reached.
    pub fn max_save_depth(&self) -> usize {
        self.max_depth
    }

    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn strokes_with_color(&self, color: Color) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Stroke { style, .. } if style.color == color))
            .count()
    }
}

impl Canvas for RecordingCanvas {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn save(&mut self) {
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
        self.commands.push(DrawCommand::Save);
    }

    fn restore(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.commands.push(DrawCommand::Restore);
    }

    fn clip_polygon(&mut self, points: &[DVec2]) {
        self.commands.push(DrawCommand::Clip { points: points.to_vec() });
    }

    fn fill_polygon(&mut self, points: &[DVec2], color: Color) {
        self.commands.push(DrawCommand::Fill {
            points: points.to_vec(),
            color,
        });
    }

    fn stroke_polyline(&mut self, points: &[DVec2], closed: bool, style: &StrokeStyle) {
        self.commands.push(DrawCommand::Stroke {
            points: points.to_vec(),
            closed,
            style: style.clone(),
        });
    }

    fn fill_text(&mut self, text: &str, at: DVec2, style: &TextStyle) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            at,
            style: style.clone(),
        });
    }
}
