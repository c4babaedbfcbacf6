//! Frame renderer.
//!
//! Draws the frame forest onto any [`Canvas`]. Each frame is drawn inside a
//! clip region equal to its own screen quad intersected with every
//! ancestor's, so nested content never leaks outside its parents.

pub mod canvas;
pub mod pixmap;
pub mod svg;

use glam::DVec2;
use serde::Serialize;

use crate::color::Color;
use crate::config::RenderConfig;
use crate::error::GeometryWarning;
use crate::frame::{Frame, FrameId, RootViewport};
use crate::geometry::{
    clip_convex, format_label, line_polygon_chord, nice_step, normalize_vector, point_in_convex, Rect, EPSILON,
};
use crate::registry::FrameRegistry;
use crate::transform::{frame_to_screen, local_unit_pixels, parent_to_screen, screen_to_local, ScreenSpace};

pub use canvas::{Canvas, DrawCommand, RecordingCanvas, StrokeStyle, TextAlign, TextStyle};
pub use pixmap::PixmapCanvas;
pub use svg::SvgCanvas;

/// Outcome of one render pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderReport {
    pub frames_drawn: usize,
    /// One entry per frame with a degenerate basis.
    pub warnings: Vec<GeometryWarning>,
}

pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Paint the background, the world grid and every frame.
    pub fn render(
        &self,
        canvas: &mut dyn Canvas,
        registry: &FrameRegistry,
        viewport: &RootViewport,
        selected: Option<FrameId>,
    ) -> RenderReport {
        let (width, height) = canvas.size();
        let space = ScreenSpace::new(*viewport, width, height);
        let mut report = RenderReport::default();

        let screen = Rect::from_corners(DVec2::ZERO, DVec2::new(width, height));
        canvas.fill_polygon(&screen.corners(), self.config.background);
        self.draw_world_grid(canvas, &space);

        for root in registry.roots() {
            self.draw_frame(canvas, registry, &space, *root, None, 0, selected, &mut report);
        }
        report
    }

    fn draw_world_grid(&self, canvas: &mut dyn Canvas, space: &ScreenSpace) {
        let zoom = space.viewport.zoom.abs();
        let base = if space.viewport.grid_step > EPSILON {
            space.viewport.grid_step
        } else {
            1.0
        };
        if zoom < EPSILON {
            return;
        }
        let mut step = base;
        while step * zoom < self.config.min_grid_px {
            step *= 2.0;
        }
        let top_left = space.screen_to_world(DVec2::ZERO);
        let bottom_right = space.screen_to_world(DVec2::new(space.width, space.height));
        let range = Rect::from_corners(top_left, bottom_right);

        let style = StrokeStyle::solid(self.config.grid_color.with_alpha(self.config.grid_color.a / 2), 1.0);
        for x in grid_values(range.min.x, range.max.x, step, self.config.max_grid_lines) {
            let a = space.world_to_screen(DVec2::new(x, range.min.y));
            let b = space.world_to_screen(DVec2::new(x, range.max.y));
            canvas.stroke_polyline(&[a, b], false, &style);
        }
        for y in grid_values(range.min.y, range.max.y, step, self.config.max_grid_lines) {
            let a = space.world_to_screen(DVec2::new(range.min.x, y));
            let b = space.world_to_screen(DVec2::new(range.max.x, y));
            canvas.stroke_polyline(&[a, b], false, &style);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_frame(
        &self,
        canvas: &mut dyn Canvas,
        registry: &FrameRegistry,
        space: &ScreenSpace,
        id: FrameId,
        parent_clip: Option<&[DVec2]>,
        depth: usize,
        selected: Option<FrameId>,
        report: &mut RenderReport,
    ) {
        let Some(frame) = registry.get(id) else {
            log::warn!("Skipping unknown frame {} during render", id);
            return;
        };
        if depth > registry.len() {
            log::error!("Render recursion exceeded registry size at {}", id);
            return;
        }
        report.frames_drawn += 1;

        let quad: Vec<DVec2> = frame
            .bounds
            .corners()
            .iter()
            .map(|c| parent_to_screen(*c, frame.parent, registry, space))
            .collect();
        let clip = match parent_clip {
            Some(outer) => clip_convex(&quad, outer),
            None => quad.clone(),
        };

        let issue = frame.basis_issue();
        if let Some(issue) = issue {
            log::debug!("{} has a {}; drawing collapsed geometry", id, issue);
            report.warnings.push(GeometryWarning { frame: id, issue });
        }

        canvas.fill_polygon(&quad, self.config.depth_tint(depth));
        let border = if selected == Some(id) {
            StrokeStyle::solid(self.config.selected_color, self.config.selected_border_width)
        } else {
            StrokeStyle::solid(self.config.border_color, self.config.border_width)
        };
        canvas.stroke_polyline(&quad, true, &border);

        canvas.save();
        canvas.clip_polygon(&quad);

        if clip.len() >= 3 {
            if issue.is_none() {
                self.draw_grid(canvas, frame, registry, space, &clip);
            }
            self.draw_axes(canvas, frame, registry, space, &clip);
            self.draw_contents(canvas, frame, registry, space);
        }

        for child in registry.children(id) {
            self.draw_frame(canvas, registry, space, *child, Some(&clip), depth + 1, selected, report);
        }
        canvas.restore();
    }

    /// Local (u, v) range covered by the clip polygon, or `None` when the
    /// basis can not be inverted.
    fn local_range(&self, frame: &Frame, registry: &FrameRegistry, space: &ScreenSpace, clip: &[DVec2]) -> Option<Rect> {
        let local: Vec<DVec2> = clip
            .iter()
            .filter_map(|p| screen_to_local(*p, frame.id, registry, space))
            .collect();
        Rect::bounding(&local).filter(|r| r.min.is_finite() && r.max.is_finite())
    }

    fn draw_grid(&self, canvas: &mut dyn Canvas, frame: &Frame, registry: &FrameRegistry, space: &ScreenSpace, clip: &[DVec2]) {
        let (pu, pv) = local_unit_pixels(frame, registry, space);
        let ppu = (pu + pv) / 2.0;
        if ppu < 1e-9 {
            return;
        }
        let Some(visible) = self.local_range(frame, registry, space, clip) else {
            return;
        };
        let step = nice_step(self.config.min_grid_px / ppu);
        let pad = 3.0 * self.config.grid_margin_px / ppu;
        let range = Rect {
            min: visible.min - DVec2::splat(pad),
            max: visible.max + DVec2::splat(pad),
        };

        let style = StrokeStyle::solid(self.config.grid_color, 1.0);
        let to_screen = |u: f64, v: f64| frame_to_screen(DVec2::new(u, v), frame, registry, space);
        for u in grid_values(range.min.x, range.max.x, step, self.config.max_grid_lines) {
            canvas.stroke_polyline(&[to_screen(u, range.min.y), to_screen(u, range.max.y)], false, &style);
        }
        for v in grid_values(range.min.y, range.max.y, step, self.config.max_grid_lines) {
            canvas.stroke_polyline(&[to_screen(range.min.x, v), to_screen(range.max.x, v)], false, &style);
        }

        self.draw_labels(canvas, frame, registry, space, clip, visible, step, (pu, pv));
    }

    /// Axis labels, thinned so neighbours stay `min_label_gap_px` apart.
    #[allow(clippy::too_many_arguments)]
    fn draw_labels(
        &self,
        canvas: &mut dyn Canvas,
        frame: &Frame,
        registry: &FrameRegistry,
        space: &ScreenSpace,
        clip: &[DVec2],
        visible: Rect,
        step: f64,
        unit_px: (f64, f64),
    ) {
        let style = TextStyle {
            color: self.config.label_color,
            size: self.config.label_font_px,
            align: TextAlign::Middle,
        };
        let label_step = |unit: f64| {
            let gap = step * unit;
            if gap < self.config.min_label_gap_px && gap > 0.0 {
                step * (self.config.min_label_gap_px / gap).ceil()
            } else {
                step
            }
        };

        let u_step = label_step(unit_px.0);
        for u in grid_values(visible.min.x, visible.max.x, u_step, self.config.max_grid_lines) {
            if u.abs() < u_step * 1e-6 {
                continue;
            }
            let at = frame_to_screen(DVec2::new(u, 0.0), frame, registry, space);
            if point_in_convex(at, clip) {
                canvas.fill_text(&format_label(u), at + DVec2::new(0.0, self.config.label_font_px + 2.0), &style);
            }
        }

        let v_step = label_step(unit_px.1);
        for v in grid_values(visible.min.y, visible.max.y, v_step, self.config.max_grid_lines) {
            if v.abs() < v_step * 1e-6 {
                continue;
            }
            let at = frame_to_screen(DVec2::new(0.0, v), frame, registry, space);
            if point_in_convex(at, clip) {
                let end = TextStyle {
                    align: TextAlign::End,
                    ..style.clone()
                };
                canvas.fill_text(&format_label(v), at + DVec2::new(-4.0, 4.0), &end);
            }
        }
    }

    /// The frame's i and j axes, clipped to the visible polygon.
    fn draw_axes(&self, canvas: &mut dyn Canvas, frame: &Frame, registry: &FrameRegistry, space: &ScreenSpace, clip: &[DVec2]) {
        let origin = frame_to_screen(DVec2::ZERO, frame, registry, space);
        let style = StrokeStyle::solid(self.config.axis_color, 1.0);
        for unit in [DVec2::X, DVec2::Y] {
            let direction = frame_to_screen(unit, frame, registry, space) - origin;
            if let Some((a, b)) = line_polygon_chord(origin, direction, clip) {
                canvas.stroke_polyline(&[a, b], false, &style);
            }
        }
    }

    /// Base-vector arrows, user vectors and plots.
    fn draw_contents(&self, canvas: &mut dyn Canvas, frame: &Frame, registry: &FrameRegistry, space: &ScreenSpace) {
        let to_screen = |p: DVec2| frame_to_screen(p, frame, registry, space);
        let origin = to_screen(DVec2::ZERO);

        self.draw_arrow(canvas, origin, to_screen(DVec2::X), self.config.base_i_color, 2.0);
        self.draw_arrow(canvas, origin, to_screen(DVec2::Y), self.config.base_j_color, 2.0);

        for vector in &frame.vectors {
            self.draw_arrow(canvas, to_screen(vector.start), to_screen(vector.end), vector.color, 2.0);
        }

        for plot in &frame.plots {
            let style = StrokeStyle::solid(plot.color, 2.0);
            for line in &plot.polylines {
                let points: Vec<DVec2> = line.iter().map(|p| to_screen(*p)).collect();
                canvas.stroke_polyline(&points, false, &style);
            }
        }
    }

    fn draw_arrow(&self, canvas: &mut dyn Canvas, from: DVec2, to: DVec2, color: Color, width: f64) {
        let direction = normalize_vector(to - from);
        if direction == DVec2::ZERO {
            return;
        }
        canvas.stroke_polyline(&[from, to], false, &StrokeStyle::solid(color, width));

        let length = self.config.arrow_head_px.min((to - from).length());
        let angle = self.config.arrow_head_angle_deg.to_radians();
        let back = -direction * length;
        let left = to + DVec2::from_angle(angle).rotate(back);
        let right = to + DVec2::from_angle(-angle).rotate(back);
        canvas.fill_polygon(&[to, left, right], color);
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

/// Multiples of `step` within `[lo, hi]`, coarsened by doubling until at
/// most `max_lines` remain.
fn grid_values(lo: f64, hi: f64, step: f64, max_lines: usize) -> Vec<f64> {
    if !(step.is_finite() && step > 0.0 && lo.is_finite() && hi.is_finite()) || max_lines == 0 {
        return Vec::new();
    }
    let mut step = step;
    while (hi - lo) / step > max_lines as f64 {
        step *= 2.0;
    }
    let first = (lo / step).ceil() as i64;
    let last = (hi / step).floor() as i64;
    (first..=last).map(|k| k as f64 * step).collect()
}
