//! Raster output backend on `tiny-skia`.
//!
//! The clip stack is a stack of coverage masks; each `clip_polygon`
//! intersects the current mask with the polygon. Text is not rasterised.

use std::path::Path;

use glam::DVec2;
use tiny_skia::{FillRule, LineJoin, Mask, Paint, PathBuilder, Pixmap, Stroke, StrokeDash, Transform};

use super::canvas::{Canvas, StrokeStyle, TextStyle};
use crate::color::Color;

pub struct PixmapCanvas {
    pixmap: Pixmap,
    clip: Option<Mask>,
    saved: Vec<Option<Mask>>,
}

impl PixmapCanvas {
    /// Returns `None` for a zero-sized canvas.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            pixmap: Pixmap::new(width, height)?,
            clip: None,
            saved: Vec::new(),
        })
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Straight-alpha RGBA bytes, row major.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixmap.pixels().len() * 4);
        for px in self.pixmap.pixels() {
            let c = px.demultiply();
            out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        out
    }

    /// Write the canvas as an image; the format follows the file extension.
    pub fn write_image(&self, path: &Path) -> Result<(), String> {
        image::save_buffer(
            path,
            &self.to_rgba(),
            self.pixmap.width(),
            self.pixmap.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| format!("Failed to write {:?}: {}", path, e))
    }

    fn path(points: &[DVec2], close: bool) -> Option<tiny_skia::Path> {
        let (first, rest) = points.split_first()?;
        let mut pb = PathBuilder::new();
        pb.move_to(first.x as f32, first.y as f32);
        for p in rest {
            pb.line_to(p.x as f32, p.y as f32);
        }
        if close {
            pb.close();
        }
        pb.finish()
    }

    fn paint(color: Color) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, color.a);
        paint.anti_alias = true;
        paint
    }
}

impl Canvas for PixmapCanvas {
    fn size(&self) -> (f64, f64) {
        (self.pixmap.width() as f64, self.pixmap.height() as f64)
    }

    fn save(&mut self) {
        self.saved.push(self.clip.clone());
    }

    fn restore(&mut self) {
        self.clip = self.saved.pop().unwrap_or(None);
    }

    fn clip_polygon(&mut self, points: &[DVec2]) {
        let Some(path) = Self::path(points, true) else {
            // Degenerate clip region: nothing remains visible.
            self.clip = Mask::new(self.pixmap.width(), self.pixmap.height());
            return;
        };
        match self.clip.as_mut() {
            Some(mask) => mask.intersect_path(&path, FillRule::Winding, true, Transform::identity()),
            None => {
                if let Some(mut mask) = Mask::new(self.pixmap.width(), self.pixmap.height()) {
                    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
                    self.clip = Some(mask);
                }
            }
        }
    }

    fn fill_polygon(&mut self, points: &[DVec2], color: Color) {
        if points.len() < 3 {
            return;
        }
        if let Some(path) = Self::path(points, true) {
            self.pixmap.fill_path(
                &path,
                &Self::paint(color),
                FillRule::Winding,
                Transform::identity(),
                self.clip.as_ref(),
            );
        }
    }

    fn stroke_polyline(&mut self, points: &[DVec2], closed: bool, style: &StrokeStyle) {
        if points.len() < 2 {
            return;
        }
        let Some(path) = Self::path(points, closed) else {
            return;
        };
        let stroke = Stroke {
            width: style.width as f32,
            line_join: LineJoin::Round,
            dash: if style.dash.is_empty() {
                None
            } else {
                StrokeDash::new(style.dash.iter().map(|d| *d as f32).collect(), 0.0)
            },
            ..Stroke::default()
        };
        self.pixmap.stroke_path(
            &path,
            &Self::paint(style.color),
            &stroke,
            Transform::identity(),
            self.clip.as_ref(),
        );
    }

    fn fill_text(&mut self, _text: &str, _at: DVec2, _style: &TextStyle) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(canvas: &PixmapCanvas, x: u32, y: u32) -> [u8; 4] {
        let rgba = canvas.to_rgba();
        let i = ((y * canvas.pixmap.width() + x) * 4) as usize;
        [rgba[i], rgba[i + 1], rgba[i + 2], rgba[i + 3]]
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<DVec2> {
        vec![
            DVec2::new(x0, y0),
            DVec2::new(x1, y0),
            DVec2::new(x1, y1),
            DVec2::new(x0, y1),
        ]
    }

    #[test]
    fn test_clip_limits_fill_until_restore() {
        let mut canvas = PixmapCanvas::new(20, 20).unwrap();
        canvas.save();
        canvas.clip_polygon(&rect(0.0, 0.0, 10.0, 20.0));
        canvas.fill_polygon(&rect(0.0, 0.0, 20.0, 20.0), Color::rgb(255, 0, 0));
        assert_eq!(pixel(&canvas, 5, 5), [255, 0, 0, 255]);
        assert_eq!(pixel(&canvas, 15, 5)[3], 0);

        canvas.restore();
        canvas.fill_polygon(&rect(0.0, 0.0, 20.0, 20.0), Color::rgb(0, 0, 255));
        assert_eq!(pixel(&canvas, 15, 5), [0, 0, 255, 255]);
    }

    #[test]
    fn test_nested_clips_intersect() {
        let mut canvas = PixmapCanvas::new(20, 20).unwrap();
        canvas.clip_polygon(&rect(0.0, 0.0, 10.0, 20.0));
        canvas.clip_polygon(&rect(0.0, 0.0, 20.0, 10.0));
        canvas.fill_polygon(&rect(0.0, 0.0, 20.0, 20.0), Color::BLACK);
        assert_eq!(pixel(&canvas, 5, 5)[3], 255);
        assert_eq!(pixel(&canvas, 5, 15)[3], 0);
        assert_eq!(pixel(&canvas, 15, 5)[3], 0);
    }

    #[test]
    fn test_write_image_png() {
        let mut canvas = PixmapCanvas::new(4, 3).unwrap();
        canvas.fill_polygon(&rect(0.0, 0.0, 4.0, 3.0), Color::rgb(0, 255, 0));
        let path = std::env::temp_dir().join(format!("frameboard-pixmap-{}.png", std::process::id()));
        canvas.write_image(&path).unwrap();
        let loaded = image::open(&path).unwrap().to_rgba8();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.dimensions(), (4, 3));
        assert_eq!(loaded.get_pixel(1, 1).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_zero_size_is_none() {
        assert!(PixmapCanvas::new(0, 10).is_none());
    }
}
