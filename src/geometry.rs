//! Plain 2-D geometry helpers shared by the transform, render and hit-test code.
//!
//! Everything here is `f64` and works on `glam::DVec2`. Degenerate input
//! (zero vectors, collinear bases, empty polygons) is a normal case, not an
//! error: functions return a defined fallback instead of dividing by zero.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Below this magnitude a vector (or determinant) is treated as zero.
pub const EPSILON: f64 = 1e-10;

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub min: DVec2,
    pub max: DVec2,
}

impl Rect {
    /// Build a rectangle from two arbitrary corners.
    pub fn from_corners(a: DVec2, b: DVec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn from_center(center: DVec2, size: DVec2) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Corners in counter-clockwise order starting at `min`.
    pub fn corners(&self) -> [DVec2; 4] {
        [
            self.min,
            DVec2::new(self.max.x, self.min.y),
            self.max,
            DVec2::new(self.min.x, self.max.y),
        ]
    }

    /// Smallest rectangle covering all points, or `None` for an empty slice.
    pub fn bounding(points: &[DVec2]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Some(Self { min, max })
    }
}

/// 2x2 determinant of the matrix with columns `a` and `b`.
pub fn determinant(a: DVec2, b: DVec2) -> f64 {
    a.perp_dot(b)
}

/// True when `a` and `b` span at most a line.
///
/// The zero vector is collinear with everything. The test is scale aware so
/// that very short or very long vectors are judged by angle, not magnitude.
pub fn are_vectors_collinear(a: DVec2, b: DVec2) -> bool {
    let la = a.length();
    let lb = b.length();
    if la <= EPSILON || lb <= EPSILON {
        return true;
    }
    (determinant(a, b) / (la * lb)).abs() <= 1e-9
}

/// Unit vector in the direction of `v`, or zero when `|v| <= 1e-10`.
pub fn normalize_vector(v: DVec2) -> DVec2 {
    let len = v.length();
    if len > EPSILON {
        v / len
    } else {
        DVec2::ZERO
    }
}

/// Which basis problem a frame has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BasisIssue {
    /// At least one basis vector has zero length.
    ZeroBasis,
    /// Both vectors are non-zero but parallel.
    CollinearBasis,
}

impl BasisIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            BasisIssue::ZeroBasis => "zero basis",
            BasisIssue::CollinearBasis => "collinear basis",
        }
    }
}

impl std::fmt::Display for BasisIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a basis. `None` means it is invertible.
pub fn classify_basis(base_i: DVec2, base_j: DVec2) -> Option<BasisIssue> {
    if base_i.length() <= EPSILON || base_j.length() <= EPSILON {
        Some(BasisIssue::ZeroBasis)
    } else if are_vectors_collinear(base_i, base_j) || determinant(base_i, base_j).abs() < EPSILON {
        Some(BasisIssue::CollinearBasis)
    } else {
        None
    }
}

/// Signed area of a polygon (positive when counter-clockwise in y-up space).
pub fn signed_area(poly: &[DVec2]) -> f64 {
    if poly.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, a) in poly.iter().enumerate() {
        let b = poly[(i + 1) % poly.len()];
        sum += a.perp_dot(b);
    }
    sum * 0.5
}

/// Clip `subject` against the convex polygon `clip` (Sutherland-Hodgman).
///
/// Either winding is accepted for `clip`. A clip polygon with no area
/// produces an empty result.
pub fn clip_convex(subject: &[DVec2], clip: &[DVec2]) -> Vec<DVec2> {
    let area = signed_area(clip);
    if area.abs() <= EPSILON || subject.is_empty() {
        return Vec::new();
    }
    let orientation = area.signum();
    let inside = |p: DVec2, a: DVec2, b: DVec2| (b - a).perp_dot(p - a) * orientation >= -EPSILON;

    let mut output: Vec<DVec2> = subject.to_vec();
    for i in 0..clip.len() {
        if output.is_empty() {
            break;
        }
        let a = clip[i];
        let b = clip[(i + 1) % clip.len()];
        let input = std::mem::take(&mut output);
        for j in 0..input.len() {
            let current = input[j];
            let previous = input[(j + input.len() - 1) % input.len()];
            let cur_in = inside(current, a, b);
            let prev_in = inside(previous, a, b);
            if cur_in {
                if !prev_in {
                    if let Some(x) = line_intersection(previous, current, a, b) {
                        output.push(x);
                    }
                }
                output.push(current);
            } else if prev_in {
                if let Some(x) = line_intersection(previous, current, a, b) {
                    output.push(x);
                }
            }
        }
    }
    output
}

/// Intersection of the infinite lines `p1-p2` and `p3-p4`.
fn line_intersection(p1: DVec2, p2: DVec2, p3: DVec2, p4: DVec2) -> Option<DVec2> {
    let d1 = p2 - p1;
    let d2 = p4 - p3;
    let denom = d1.perp_dot(d2);
    if denom.abs() <= EPSILON {
        return None;
    }
    let t = (p3 - p1).perp_dot(d2) / denom;
    Some(p1 + d1 * t)
}

/// Chord of the infinite line through `point` with `direction` across a
/// convex polygon, computed by intersecting the line with every edge.
///
/// Returns `None` when the direction is zero or the line misses the polygon.
pub fn line_polygon_chord(point: DVec2, direction: DVec2, poly: &[DVec2]) -> Option<(DVec2, DVec2)> {
    if direction.length() <= EPSILON || poly.len() < 2 {
        return None;
    }
    let mut t_min = f64::INFINITY;
    let mut t_max = f64::NEG_INFINITY;
    for i in 0..poly.len() {
        let a = poly[i];
        let b = poly[(i + 1) % poly.len()];
        let edge = b - a;
        let denom = direction.perp_dot(edge);
        if denom.abs() <= EPSILON {
            continue;
        }
        let t = (a - point).perp_dot(edge) / denom;
        let s = (a - point).perp_dot(direction) / denom;
        if (-1e-9..=1.0 + 1e-9).contains(&s) {
            t_min = t_min.min(t);
            t_max = t_max.max(t);
        }
    }
    if t_min.is_finite() && t_max.is_finite() && t_max - t_min > EPSILON {
        Some((point + direction * t_min, point + direction * t_max))
    } else {
        None
    }
}

/// Point-in-convex-polygon test, either winding.
pub fn point_in_convex(p: DVec2, poly: &[DVec2]) -> bool {
    if poly.len() < 3 {
        return false;
    }
    let mut sign = 0.0;
    for i in 0..poly.len() {
        let a = poly[i];
        let b = poly[(i + 1) % poly.len()];
        let cross = (b - a).perp_dot(p - a);
        if cross.abs() <= EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Smallest 1-2-5 step (times a power of ten) that is at least `min_step`.
pub fn nice_step(min_step: f64) -> f64 {
    if !min_step.is_finite() || min_step <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(min_step.log10().floor());
    for factor in [1.0, 2.0, 5.0, 10.0] {
        let step = factor * magnitude;
        if step >= min_step * (1.0 - 1e-12) {
            return step;
        }
    }
    10.0 * magnitude
}

/// Format an axis label value without float noise ("0.30000000000000004").
pub fn format_label(value: f64) -> String {
    if value.abs() < 1e-12 {
        return "0".to_string();
    }
    let rounded = (value * 1e6).round() / 1e6;
    let text = format!("{:.6}", rounded);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
