//! Scene files for the command line.
//!
//! A scene is a JSON tree of frames with their geometry, parameters and
//! script. It drives the core from the CLI; it is not a save format.

use std::collections::BTreeMap;
use std::path::Path;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::frame::{FrameId, RootViewport, Viewport};
use crate::geometry::Rect;
use crate::workspace::{FramePatch, Workspace};

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

fn default_base_i() -> DVec2 {
    DVec2::X
}

fn default_base_j() -> DVec2 {
    DVec2::Y
}

/// A whole scene: root viewport, output size and the frame forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSpec {
    #[serde(default)]
    pub viewport: RootViewport,

    /// Output width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Output height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default)]
    pub frames: Vec<FrameSpec>,
}

/// One frame and its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSpec {
    #[serde(default)]
    pub origin: DVec2,

    #[serde(default = "default_base_i")]
    pub base_i: DVec2,

    #[serde(default = "default_base_j")]
    pub base_j: DVec2,

    /// Parent-space extent. Defaults to a square centred on the origin.
    #[serde(default)]
    pub bounds: Option<Rect>,

    #[serde(default)]
    pub viewport: Option<Viewport>,

    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,

    /// Rhai script run for this frame.
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub children: Vec<FrameSpec>,
}

impl SceneSpec {
    /// Load a scene from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path).map_err(|e| format!("Failed to read scene {:?}: {}", path, e))?;
        let spec: SceneSpec =
            serde_json::from_str(&text).map_err(|e| format!("Failed to parse scene {:?}: {}", path, e))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the scene.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("Width and height must be positive".to_string());
        }
        if !(self.viewport.zoom.is_finite() && self.viewport.zoom != 0.0) {
            return Err("Viewport zoom must be a non-zero number".to_string());
        }
        let mut stack: Vec<&FrameSpec> = self.frames.iter().collect();
        while let Some(frame) = stack.pop() {
            if !(frame.origin.is_finite() && frame.base_i.is_finite() && frame.base_j.is_finite()) {
                return Err("Frame origin and basis must be finite".to_string());
            }
            if let Some((name, _)) = frame.parameters.iter().find(|(_, v)| !v.is_finite()) {
                return Err(format!("Parameter '{}' must be finite", name));
            }
            stack.extend(frame.children.iter());
        }
        Ok(())
    }

    /// Number of frames in the scene, nested ones included.
    pub fn frame_count(&self) -> usize {
        fn count(frames: &[FrameSpec]) -> usize {
            frames.iter().map(|f| 1 + count(&f.children)).sum()
        }
        count(&self.frames)
    }

    /// Create every frame in `workspace` and return `(id, code)` for the
    /// frames that have a script, parents before children.
    pub fn build(&self, workspace: &mut Workspace) -> Result<Vec<(FrameId, String)>, FrameError> {
        workspace.set_viewport(self.viewport);
        workspace.set_canvas_size(self.width as f64, self.height as f64);

        let mut scripts = Vec::new();
        let mut pending: Vec<(&FrameSpec, Option<FrameId>)> = self.frames.iter().rev().map(|f| (f, None)).collect();
        while let Some((spec, parent)) = pending.pop() {
            let id = match spec.bounds {
                Some(bounds) => {
                    workspace
                        .create_frame_with_bounds(spec.origin, spec.base_i, spec.base_j, bounds, parent)?
                        .id
                }
                None => workspace.create_frame(spec.origin, spec.base_i, spec.base_j, parent)?.id,
            };
            workspace.update_frame(
                id,
                FramePatch {
                    viewport: spec.viewport,
                    parameters: Some(spec.parameters.clone()),
                    source_code: Some(spec.code.clone()),
                    ..Default::default()
                },
            )?;
            if !spec.code.trim().is_empty() {
                scripts.push((id, spec.code.clone()));
            }
            pending.extend(spec.children.iter().rev().map(|c| (c, Some(id))));
        }
        Ok(scripts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    const SCENE: &str = r#"{
        "viewport": {"zoom": 50},
        "frames": [
            {
                "origin": [0, 0],
                "code": "draw([1, 1]);",
                "children": [
                    {"origin": [1, 1], "baseI": [0.5, 0], "baseJ": [0, 0.5], "viewport": {"zoom": 2}},
                    {"origin": [-2, 0], "bounds": {"min": [-3, -1], "max": [-1, 1]}}
                ]
            },
            {"origin": [6, 0], "baseI": [0, 0], "baseJ": [0, 0]}
        ]
    }"#;

    #[test]
    fn test_scene_defaults() {
        let spec: SceneSpec = serde_json::from_str(SCENE).unwrap();
        assert_eq!(spec.width, 800);
        assert_eq!(spec.viewport.zoom, 50.0);
        assert_eq!(spec.frame_count(), 4);
        assert_eq!(spec.frames[0].base_i, DVec2::X);
        spec.validate().unwrap();
    }

    #[test]
    fn test_scene_validation() {
        let mut spec: SceneSpec = serde_json::from_str(SCENE).unwrap();
        spec.viewport.zoom = 0.0;
        assert!(spec.validate().is_err());
    }

    #[tokio::test]
    async fn test_build_creates_tree() {
        let spec: SceneSpec = serde_json::from_str(SCENE).unwrap();
        let mut ws = Workspace::new(AppConfig::default());
        let scripts = spec.build(&mut ws).unwrap();

        assert_eq!(ws.registry().len(), 4);
        assert_eq!(ws.registry().roots().len(), 2);
        let root = ws.registry().roots()[0];
        assert_eq!(ws.registry().children(root).len(), 2);
        assert_eq!(scripts, vec![(root, "draw([1, 1]);".to_string())]);

        let child = ws.registry().children(root)[0];
        assert_eq!(ws.frame(child).unwrap().viewport.zoom, 2.0);
        let second = ws.registry().children(root)[1];
        assert_eq!(ws.frame(second).unwrap().bounds.min, DVec2::new(-3.0, -1.0));
    }
}
