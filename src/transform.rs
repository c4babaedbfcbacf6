//! Coordinate-space conversions.
//!
//! Spaces, innermost first:
//! - **local**: a frame's (u, v) coordinates as scripts see them;
//! - **basis**: local after the frame's viewport (`u' = (u - vx) * zoom`);
//! - **parent**: `origin + u' * base_i + v' * base_j`, i.e. the parent's
//!   local space, or world space for root frames;
//! - **screen**: pixels, y down, after the root viewport.
//!
//! All functions are pure. Degenerate bases invert to the zero vector.

use glam::DVec2;

use crate::frame::{Frame, FrameId, RootViewport, Viewport};
use crate::geometry::{determinant, EPSILON};
use crate::registry::FrameRegistry;

/// The root viewport plus the canvas size it is projected onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSpace {
    pub viewport: RootViewport,
    pub width: f64,
    pub height: f64,
}

impl ScreenSpace {
    pub fn new(viewport: RootViewport, width: f64, height: f64) -> Self {
        Self {
            viewport,
            width,
            height,
        }
    }

    pub fn world_to_screen(&self, p: DVec2) -> DVec2 {
        world_to_screen(p, &self.viewport, self.width, self.height)
    }

    pub fn screen_to_world(&self, s: DVec2) -> DVec2 {
        screen_to_world(s, &self.viewport, self.width, self.height)
    }
}

/// `screen.x = w/2 + (p.x - vx) * zoom`, `screen.y = h/2 - (p.y - vy) * zoom`.
pub fn world_to_screen(p: DVec2, viewport: &RootViewport, w: f64, h: f64) -> DVec2 {
    DVec2::new(
        w / 2.0 + (p.x - viewport.x) * viewport.zoom,
        h / 2.0 - (p.y - viewport.y) * viewport.zoom,
    )
}

/// Inverse of [`world_to_screen`]. A zero zoom maps everything to the pan centre.
pub fn screen_to_world(s: DVec2, viewport: &RootViewport, w: f64, h: f64) -> DVec2 {
    if viewport.zoom.abs() < EPSILON {
        return DVec2::new(viewport.x, viewport.y);
    }
    DVec2::new(
        viewport.x + (s.x - w / 2.0) / viewport.zoom,
        viewport.y - (s.y - h / 2.0) / viewport.zoom,
    )
}

/// Local -> basis coordinates through the frame's own pan and zoom.
pub fn apply_viewport(local: DVec2, viewport: &Viewport) -> DVec2 {
    (local - viewport.pan()) * viewport.zoom
}

/// Basis -> local coordinates. A zero zoom collapses to the pan point.
pub fn invert_viewport(p: DVec2, viewport: &Viewport) -> DVec2 {
    if viewport.zoom.abs() < EPSILON {
        return viewport.pan();
    }
    p / viewport.zoom + viewport.pan()
}

/// Basis coordinates -> parent space: `origin + u * base_i + v * base_j`.
pub fn basis_map(p: DVec2, frame: &Frame) -> DVec2 {
    frame.origin + frame.base_i * p.x + frame.base_j * p.y
}

/// Local -> parent space (viewport, then basis).
pub fn frame_to_parent(local: DVec2, frame: &Frame) -> DVec2 {
    basis_map(apply_viewport(local, &frame.viewport), frame)
}

/// Solve `point - origin = u * base_i + v * base_j` for `(u, v)`.
///
/// Returns the zero vector when `|det| < 1e-10`.
pub fn parent_to_frame(point: DVec2, frame: &Frame) -> DVec2 {
    let det = determinant(frame.base_i, frame.base_j);
    if det.abs() < EPSILON {
        return DVec2::ZERO;
    }
    let d = point - frame.origin;
    // Cramer's rule with columns base_i, base_j.
    DVec2::new(d.perp_dot(frame.base_j) / det, frame.base_i.perp_dot(d) / det)
}

/// Parent space -> local (basis inverse, then viewport inverse).
pub fn parent_to_local(point: DVec2, frame: &Frame) -> DVec2 {
    invert_viewport(parent_to_frame(point, frame), &frame.viewport)
}

/// Local point of `frame` -> screen.
///
/// Root frames go straight through the root viewport; nested frames are
/// composed through their ancestors. A broken parent chain stops at the
/// last resolvable frame and treats its output as world space.
pub fn frame_to_screen(local: DVec2, frame: &Frame, registry: &FrameRegistry, space: &ScreenSpace) -> DVec2 {
    let parent_point = frame_to_parent(local, frame);
    match frame.parent {
        None => space.world_to_screen(parent_point),
        Some(parent) => parent_to_screen(parent_point, Some(parent), registry, space),
    }
}

/// Local point of the frame `id` -> screen, or `None` for an unknown id.
pub fn nested_frame_to_screen(
    local: DVec2,
    id: FrameId,
    registry: &FrameRegistry,
    space: &ScreenSpace,
) -> Option<DVec2> {
    let frame = registry.get(id)?;
    Some(frame_to_screen(local, frame, registry, space))
}

/// A point expressed in the local space of `parent` (world when `None`) -> screen.
///
/// This is the path used for frame bounds, which live in parent space.
pub fn parent_to_screen(
    point: DVec2,
    parent: Option<FrameId>,
    registry: &FrameRegistry,
    space: &ScreenSpace,
) -> DVec2 {
    let mut p = point;
    let mut current = parent;
    let mut steps = 0;
    while let Some(id) = current {
        let Some(frame) = registry.get(id) else {
            break;
        };
        steps += 1;
        if steps > registry.len() {
            log::error!("Cycle detected while composing transforms at {}", id);
            break;
        }
        p = frame_to_parent(p, frame);
        current = frame.parent;
    }
    space.world_to_screen(p)
}

/// Screen point -> the local space of `parent` (world when `None`).
pub fn screen_to_parent_space(
    screen: DVec2,
    parent: Option<FrameId>,
    registry: &FrameRegistry,
    space: &ScreenSpace,
) -> DVec2 {
    let mut p = space.screen_to_world(screen);
    if let Some(id) = parent {
        let mut chain = registry.ancestors(id);
        chain.push(id);
        for ancestor in chain {
            if let Some(frame) = registry.get(ancestor) {
                p = parent_to_local(p, frame);
            }
        }
    }
    p
}

/// Screen point -> the local space of frame `id`.
pub fn screen_to_local(screen: DVec2, id: FrameId, registry: &FrameRegistry, space: &ScreenSpace) -> Option<DVec2> {
    registry.get(id)?;
    Some(screen_to_parent_space(screen, Some(id), registry, space))
}

/// Approximate on-screen length of one local unit along each basis direction.
pub fn local_unit_pixels(frame: &Frame, registry: &FrameRegistry, space: &ScreenSpace) -> (f64, f64) {
    let o = frame_to_screen(DVec2::ZERO, frame, registry, space);
    let i = frame_to_screen(DVec2::X, frame, registry, space);
    let j = frame_to_screen(DVec2::Y, frame, registry, space);
    ((i - o).length(), (j - o).length())
}
