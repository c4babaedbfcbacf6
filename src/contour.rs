//! Zero-set extraction for implicit equations `f(x, y) = 0`.
//!
//! Marching squares over a uniform grid: every cell edge whose endpoints
//! change sign gets a linearly interpolated crossing, crossings in the same
//! cell form segments, and segments are chained into polylines through
//! shared endpoints.

use std::collections::HashMap;

use glam::DVec2;

/// Polylines with fewer points than this are treated as noise.
pub const MIN_POLYLINE_POINTS: usize = 3;

/// Grid resolution bounds for [`adaptive_resolution`].
pub const MIN_RESOLUTION: usize = 40;
pub const MAX_RESOLUTION: usize = 240;

/// Grid resolution for a domain of `span` units shown at `pixels_per_unit`:
/// roughly one sample every four pixels, clamped.
pub fn adaptive_resolution(span: f64, pixels_per_unit: f64) -> usize {
    let samples = (span.abs() * pixels_per_unit.abs() / 4.0).ceil();
    if !samples.is_finite() {
        return MIN_RESOLUTION;
    }
    (samples as usize).clamp(MIN_RESOLUTION, MAX_RESOLUTION)
}

/// Trace `f(x, y) = 0` over `[x_min, x_max] x [y_min, y_max]` sampled on a
/// `resolution x resolution` grid.
///
/// Returns independent polylines, open or closed (a closed polyline repeats
/// its first point at the end). A function with no roots in the domain
/// yields an empty list.
pub fn find_contour_points<F>(
    f: F,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    resolution: usize,
) -> Vec<Vec<DVec2>>
where
    F: FnMut(f64, f64) -> f64,
{
    let segments = march(f, x_min, x_max, y_min, y_max, resolution);
    let cell = DVec2::new(
        (x_max - x_min).abs() / (resolution.max(2) - 1) as f64,
        (y_max - y_min).abs() / (resolution.max(2) - 1) as f64,
    );
    let tolerance = (cell.x.min(cell.y) * 1e-6).max(1e-12);
    stitch(&segments, tolerance)
        .into_iter()
        .filter(|line| line.len() >= MIN_POLYLINE_POINTS)
        .collect()
}

/// Sample the grid and emit one segment per sign-changing cell (two for saddles).
fn march<F>(mut f: F, x_min: f64, x_max: f64, y_min: f64, y_max: f64, resolution: usize) -> Vec<(DVec2, DVec2)>
where
    F: FnMut(f64, f64) -> f64,
{
    let n = resolution.max(2);
    let dx = (x_max - x_min) / (n - 1) as f64;
    let dy = (y_max - y_min) / (n - 1) as f64;
    let xs: Vec<f64> = (0..n).map(|i| x_min + dx * i as f64).collect();
    let ys: Vec<f64> = (0..n).map(|j| y_min + dy * j as f64).collect();

    // values[j * n + i] = f(xs[i], ys[j])
    let mut values = Vec::with_capacity(n * n);
    for y in &ys {
        for x in &xs {
            values.push(f(*x, *y));
        }
    }
    let at = |i: usize, j: usize| values[j * n + i];

    let crossing = |a: DVec2, b: DVec2, va: f64, vb: f64| -> Option<DVec2> {
        if (va < 0.0) == (vb < 0.0) {
            return None;
        }
        let t = va / (va - vb);
        Some(a + (b - a) * t)
    };

    let mut segments = Vec::new();
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let v00 = at(i, j);
            let v10 = at(i + 1, j);
            let v11 = at(i + 1, j + 1);
            let v01 = at(i, j + 1);
            if !(v00.is_finite() && v10.is_finite() && v11.is_finite() && v01.is_finite()) {
                continue;
            }

            let p00 = DVec2::new(xs[i], ys[j]);
            let p10 = DVec2::new(xs[i + 1], ys[j]);
            let p11 = DVec2::new(xs[i + 1], ys[j + 1]);
            let p01 = DVec2::new(xs[i], ys[j + 1]);

            // Edge order: bottom, right, top, left. Shared edges are always
            // interpolated from the same endpoint order so neighbours agree.
            let bottom = crossing(p00, p10, v00, v10);
            let right = crossing(p10, p11, v10, v11);
            let top = crossing(p01, p11, v01, v11);
            let left = crossing(p00, p01, v00, v01);

            match (bottom, right, top, left) {
                (Some(b), Some(r), Some(t), Some(l)) => {
                    // Saddle: pair by the sign of the cell centre.
                    let centre = (v00 + v10 + v11 + v01) / 4.0;
                    if (centre < 0.0) == (v00 < 0.0) {
                        segments.push((b, r));
                        segments.push((t, l));
                    } else {
                        segments.push((b, l));
                        segments.push((r, t));
                    }
                }
                edges => {
                    let points: Vec<DVec2> = [edges.0, edges.1, edges.2, edges.3].into_iter().flatten().collect();
                    if points.len() == 2 {
                        segments.push((points[0], points[1]));
                    }
                }
            }
        }
    }
    segments
}

type PointKey = (i64, i64);

fn key(p: DVec2, tolerance: f64) -> PointKey {
    ((p.x / tolerance).round() as i64, (p.y / tolerance).round() as i64)
}

/// Chain segments sharing endpoints into polylines.
fn stitch(segments: &[(DVec2, DVec2)], tolerance: f64) -> Vec<Vec<DVec2>> {
    let mut by_endpoint: HashMap<PointKey, Vec<usize>> = HashMap::new();
    for (idx, (a, b)) in segments.iter().enumerate() {
        by_endpoint.entry(key(*a, tolerance)).or_default().push(idx);
        by_endpoint.entry(key(*b, tolerance)).or_default().push(idx);
    }

    let mut used = vec![false; segments.len()];
    let mut polylines = Vec::new();

    // Continue from `tail` through unused segments touching it.
    let extend = |line: &mut Vec<DVec2>, used: &mut Vec<bool>| loop {
        let Some(tail) = line.last().copied() else {
            break;
        };
        let next = by_endpoint
            .get(&key(tail, tolerance))
            .and_then(|candidates| candidates.iter().copied().find(|c| !used[*c]));
        let Some(idx) = next else {
            break;
        };
        used[idx] = true;
        let (a, b) = segments[idx];
        let other = if key(a, tolerance) == key(tail, tolerance) { b } else { a };
        line.push(other);
    };

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (a, b) = segments[start];
        let mut forward = vec![a, b];
        extend(&mut forward, &mut used);

        let closed = forward.len() > 2 && key(forward[0], tolerance) == key(forward[forward.len() - 1], tolerance);
        if !closed {
            // Grow the other end too, then splice.
            let mut backward = vec![a];
            extend(&mut backward, &mut used);
            if backward.len() > 1 {
                backward.reverse();
                backward.pop();
                backward.extend(forward);
                forward = backward;
            }
        }
        polylines.push(forward);
    }
    polylines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(x: f64, y: f64) -> f64 {
        x * x + y * y - 16.0
    }

    #[test]
    fn test_circle_points_near_radius() {
        let lines = find_contour_points(circle, -10.0, 10.0, -10.0, 10.0, 100);
        assert!(!lines.is_empty());
        for line in &lines {
            for p in line {
                let r = p.length();
                assert!(r > 3.0 && r < 5.0, "point {:?} at radius {}", p, r);
            }
        }
    }

    #[test]
    fn test_circle_stitches_into_one_closed_loop() {
        let lines = find_contour_points(circle, -10.0, 10.0, -10.0, 10.0, 100);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!((line[0] - line[line.len() - 1]).length() < 1e-6);
        assert!(line.len() > 40);
    }

    #[test]
    fn test_no_real_roots() {
        let lines = find_contour_points(|x, y| x * x + y * y + 100.0, -10.0, 10.0, -10.0, 10.0, 100);
        let total: usize = lines.iter().map(Vec::len).sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_disjoint_curves_give_multiple_polylines() {
        // Two circles of radius 1 centred at (-3, 0) and (3, 0).
        let f = |x: f64, y: f64| ((x + 3.0).powi(2) + y * y - 1.0) * ((x - 3.0).powi(2) + y * y - 1.0);
        let lines = find_contour_points(f, -6.0, 6.0, -3.0, 3.0, 120);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_non_finite_cells_skipped() {
        let lines = find_contour_points(|x, y| (x - y) / x, -5.0, 5.0, -5.0, 5.0, 51);
        for line in &lines {
            for p in line {
                assert!(p.x.is_finite() && p.y.is_finite());
            }
        }
    }

    #[test]
    fn test_adaptive_resolution_clamps() {
        assert_eq!(adaptive_resolution(20.0, 1.0), MIN_RESOLUTION);
        assert_eq!(adaptive_resolution(20.0, 40.0), 200);
        assert_eq!(adaptive_resolution(1e9, 1e9), MAX_RESOLUTION);
        assert_eq!(adaptive_resolution(f64::NAN, 1.0), MIN_RESOLUTION);
    }
}
