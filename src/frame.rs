//! Frame data model.
//!
//! A frame is a local 2-D coordinate system (origin + two basis vectors)
//! that lives in its parent's space. Frames reference each other by id only;
//! the [`FrameRegistry`](crate::registry::FrameRegistry) owns the links.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::geometry::{classify_basis, BasisIssue, Rect};

/// Unique identifier for frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Identifier for script-produced artifacts (vectors and plots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub u64);

static NEXT_ARTIFACT_ID: AtomicU64 = AtomicU64::new(1);

impl ArtifactId {
    /// Allocate a fresh, process-unique id.
    pub fn fresh() -> Self {
        ArtifactId(NEXT_ARTIFACT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-frame pan and zoom applied to local coordinates before the basis map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn pan(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }
}

/// Global pan and zoom. Applies to root frames only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RootViewport {
    pub x: f64,
    pub y: f64,
    /// Screen pixels per world unit.
    pub zoom: f64,
    pub grid_step: f64,
}

impl Default for RootViewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 40.0,
            grid_step: 1.0,
        }
    }
}

/// An arrow drawn in a frame's local coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserVector {
    pub id: ArtifactId,
    pub start: DVec2,
    pub end: DVec2,
    pub color: Color,
}

/// How a plot was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    /// `y = f(x)` sampled along x.
    Explicit,
    /// `f(x, y) = 0` traced with the contour extractor.
    Implicit,
    /// A script closure sampled along x.
    Callable,
}

/// A sampled function plot in a frame's local coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionPlot {
    pub id: ArtifactId,
    /// The expression text, or a description of the callable.
    pub source: String,
    pub domain: (f64, f64),
    /// Independent polylines; explicit plots split at non-finite samples.
    pub polylines: Vec<Vec<DVec2>>,
    pub color: Color,
    pub kind: PlotKind,
}

impl FunctionPlot {
    pub fn point_count(&self) -> usize {
        self.polylines.iter().map(Vec::len).sum()
    }
}

/// A frame node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    /// Position of the local origin in parent space.
    pub origin: DVec2,
    pub base_i: DVec2,
    pub base_j: DVec2,
    /// Extent of the frame, in parent space.
    pub bounds: Rect,
    pub viewport: Viewport,
    pub parent: Option<FrameId>,
    pub children: Vec<FrameId>,
    pub vectors: Vec<UserVector>,
    pub plots: Vec<FunctionPlot>,
    pub parameters: BTreeMap<String, f64>,
    pub source_code: String,
}

impl Frame {
    /// New frame with an identity basis at `origin`. The id is assigned by
    /// the registry on insert.
    pub fn new(origin: DVec2, bounds: Rect) -> Self {
        Self::with_basis(origin, DVec2::X, DVec2::Y, bounds)
    }

    pub fn with_basis(origin: DVec2, base_i: DVec2, base_j: DVec2, bounds: Rect) -> Self {
        Self {
            id: FrameId(0),
            origin,
            base_i,
            base_j,
            bounds,
            viewport: Viewport::default(),
            parent: None,
            children: Vec::new(),
            vectors: Vec::new(),
            plots: Vec::new(),
            parameters: BTreeMap::new(),
            source_code: String::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Degenerate-basis classification; `None` for an invertible basis.
    pub fn basis_issue(&self) -> Option<BasisIssue> {
        classify_basis(self.base_i, self.base_j)
    }

    /// Drop everything scripts have produced, keeping geometry and code.
    pub fn clear_artifacts(&mut self) {
        self.vectors.clear();
        self.plots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_identity_basis() {
        let frame = Frame::new(DVec2::new(1.0, 2.0), Rect::from_center(DVec2::ZERO, DVec2::splat(4.0)));
        assert_eq!(frame.base_i, DVec2::X);
        assert_eq!(frame.base_j, DVec2::Y);
        assert!(frame.is_root());
        assert_eq!(frame.basis_issue(), None);
        assert_eq!(frame.viewport.zoom, 1.0);
    }

    #[test]
    fn test_artifact_ids_are_unique() {
        let a = ArtifactId::fresh();
        let b = ArtifactId::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn test_viewport_defaults_from_partial_json() {
        let vp: Viewport = serde_json::from_str(r#"{"zoom": 2.0}"#).unwrap();
        assert_eq!(vp.zoom, 2.0);
        assert_eq!(vp.x, 0.0);
    }
}
