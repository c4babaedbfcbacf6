//! Screen point -> frame resolution.
//!
//! A frame contains a point when the point, mapped into the frame's parent
//! space, lies inside its bounds and every ancestor contains it too. Content
//! outside an ancestor is clipped away on screen, so it can not be hit.

use glam::DVec2;

use crate::frame::FrameId;
use crate::registry::FrameRegistry;
use crate::transform::{parent_to_local, ScreenSpace};

/// A frame under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub frame: FrameId,
    pub depth: usize,
    /// Position in paint order; larger means painted later (on top).
    pub paint_index: usize,
}

/// Every frame containing `screen`, in paint order.
pub fn frames_at(screen: DVec2, registry: &FrameRegistry, space: &ScreenSpace) -> Vec<Hit> {
    let mut hits = Vec::new();
    let mut paint_index = 0;
    // (frame, point in that frame's parent space, depth)
    let mut stack: Vec<(FrameId, DVec2, usize)> = Vec::new();
    let world = space.screen_to_world(screen);
    for root in registry.roots().iter().rev() {
        stack.push((*root, world, 0));
    }

    while let Some((id, point, depth)) = stack.pop() {
        let Some(frame) = registry.get(id) else {
            continue;
        };
        let index = paint_index;
        paint_index += 1;
        if depth > registry.len() {
            log::error!("Hit test depth exceeded registry size at {}", id);
            break;
        }
        if !frame.bounds.contains(point) {
            // Descendants are clipped to this frame; skip them, but keep
            // paint indices aligned with render order.
            paint_index += registry.subtree(id).len() - 1;
            continue;
        }
        hits.push(Hit {
            frame: id,
            depth,
            paint_index: index,
        });
        let local = parent_to_local(point, frame);
        for child in frame.children.iter().rev() {
            stack.push((*child, local, depth + 1));
        }
    }
    hits
}

/// The innermost frame containing `screen`.
///
/// The deepest containing frame wins. Frames at equal depth (unrelated,
/// overlapping) resolve to the one painted last, which is the one visible
/// on top. `None` means the background was hit.
pub fn hit_test(screen: DVec2, registry: &FrameRegistry, space: &ScreenSpace) -> Option<FrameId> {
    frames_at(screen, registry, space)
        .into_iter()
        .max_by_key(|hit| (hit.depth, hit.paint_index))
        .map(|hit| hit.frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, RootViewport, Viewport};
    use crate::geometry::Rect;

    fn space() -> ScreenSpace {
        ScreenSpace::new(RootViewport::default(), 800.0, 600.0)
    }

    fn square(center: DVec2, size: f64) -> Rect {
        Rect::from_center(center, DVec2::splat(size))
    }

    #[test]
    fn test_nested_zoomed_child_wins() {
        let mut reg = FrameRegistry::new();
        let root = reg.insert(Frame::new(DVec2::ZERO, square(DVec2::ZERO, 10.0)), None).unwrap();
        let mut child = Frame::new(DVec2::new(1.0, 1.0), square(DVec2::new(1.0, 1.0), 2.0));
        child.viewport = Viewport {
            x: 0.0,
            y: 0.0,
            zoom: 2.0,
        };
        let child = reg.insert(child, Some(root)).unwrap();

        let space = space();
        let inside_child = space.world_to_screen(DVec2::new(1.2, 0.9));
        assert_eq!(hit_test(inside_child, &reg, &space), Some(child));

        let root_only = space.world_to_screen(DVec2::new(-4.0, -4.0));
        assert_eq!(hit_test(root_only, &reg, &space), Some(root));
    }

    #[test]
    fn test_background_is_none() {
        let mut reg = FrameRegistry::new();
        reg.insert(Frame::new(DVec2::ZERO, square(DVec2::ZERO, 2.0)), None).unwrap();
        let space = space();
        assert_eq!(hit_test(space.world_to_screen(DVec2::new(8.0, 8.0)), &reg, &space), None);
    }

    #[test]
    fn test_child_outside_parent_is_not_hit() {
        let mut reg = FrameRegistry::new();
        let root = reg.insert(Frame::new(DVec2::ZERO, square(DVec2::ZERO, 2.0)), None).unwrap();
        reg.insert(Frame::new(DVec2::ZERO, square(DVec2::new(5.0, 0.0), 2.0)), Some(root)).unwrap();
        let space = space();
        assert_eq!(hit_test(space.world_to_screen(DVec2::new(5.0, 0.0)), &reg, &space), None);
    }

    #[test]
    fn test_overlapping_roots_topmost_wins() {
        let mut reg = FrameRegistry::new();
        reg.insert(Frame::new(DVec2::ZERO, square(DVec2::ZERO, 4.0)), None).unwrap();
        let second = reg.insert(Frame::new(DVec2::ZERO, square(DVec2::new(1.0, 0.0), 4.0)), None).unwrap();
        let space = space();
        let hits = frames_at(space.world_to_screen(DVec2::new(0.5, 0.0)), &reg, &space);
        assert_eq!(hits.len(), 2);
        assert_eq!(hit_test(space.world_to_screen(DVec2::new(0.5, 0.0)), &reg, &space), Some(second));
    }

    #[test]
    fn test_degenerate_frame_still_selectable() {
        let mut reg = FrameRegistry::new();
        let id = reg
            .insert(
                Frame::with_basis(DVec2::ZERO, DVec2::ZERO, DVec2::ZERO, square(DVec2::ZERO, 4.0)),
                None,
            )
            .unwrap();
        let space = space();
        assert_eq!(hit_test(space.world_to_screen(DVec2::new(1.0, 1.0)), &reg, &space), Some(id));
    }

    #[test]
    fn test_paint_index_matches_render_order() {
        let mut reg = FrameRegistry::new();
        let a = reg.insert(Frame::new(DVec2::ZERO, square(DVec2::new(-20.0, 0.0), 2.0)), None).unwrap();
        reg.insert(Frame::new(DVec2::ZERO, square(DVec2::new(-20.0, 0.0), 1.0)), Some(a)).unwrap();
        let b = reg.insert(Frame::new(DVec2::ZERO, square(DVec2::ZERO, 2.0)), None).unwrap();
        let space = space();
        let hits = frames_at(space.world_to_screen(DVec2::ZERO), &reg, &space);
        let order = reg.iter_render_order();
        let expected = order.iter().position(|id| *id == b).unwrap();
        assert_eq!(hits, vec![Hit { frame: b, depth: 0, paint_index: expected }]);
    }
}
