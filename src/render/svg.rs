//! SVG output backend.
//!
//! Clips become nested `<g clip-path>` groups, so intersection falls out of
//! SVG's own semantics. `save` remembers how many groups are open and
//! `restore` closes back down to that count.

use std::fmt::Write as _;

use glam::DVec2;

use super::canvas::{Canvas, StrokeStyle, TextAlign, TextStyle};
use crate::color::Color;

pub struct SvgCanvas {
    width: f64,
    height: f64,
    body: String,
    defs: String,
    open_groups: usize,
    saved: Vec<usize>,
    next_clip: usize,
}

impl SvgCanvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            body: String::new(),
            defs: String::new(),
            open_groups: 0,
            saved: Vec::new(),
            next_clip: 0,
        }
    }

    /// Close any open groups and return the document.
    pub fn finish(mut self) -> String {
        while self.open_groups > 0 {
            self.body.push_str("</g>\n");
            self.open_groups -= 1;
        }
        format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n<defs>\n{defs}</defs>\n{body}</svg>\n",
            w = self.width,
            h = self.height,
            defs = self.defs,
            body = self.body,
        )
    }

    fn points_attr(points: &[DVec2]) -> String {
        points
            .iter()
            .map(|p| format!("{:.2},{:.2}", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `fill="rgb(..)" fill-opacity=".."` (or the stroke equivalents).
    fn paint_attrs(kind: &str, color: Color) -> String {
        format!(
            "{kind}=\"rgb({},{},{})\" {kind}-opacity=\"{:.3}\"",
            color.r,
            color.g,
            color.b,
            color.opacity()
        )
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Canvas for SvgCanvas {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn save(&mut self) {
        self.saved.push(self.open_groups);
    }

    fn restore(&mut self) {
        let target = self.saved.pop().unwrap_or(0);
        while self.open_groups > target {
            self.body.push_str("</g>\n");
            self.open_groups -= 1;
        }
    }

    fn clip_polygon(&mut self, points: &[DVec2]) {
        let id = self.next_clip;
        self.next_clip += 1;
        let _ = writeln!(
            self.defs,
            "<clipPath id=\"clip{}\"><polygon points=\"{}\"/></clipPath>",
            id,
            Self::points_attr(points)
        );
        let _ = writeln!(self.body, "<g clip-path=\"url(#clip{})\">", id);
        self.open_groups += 1;
    }

    fn fill_polygon(&mut self, points: &[DVec2], color: Color) {
        if points.len() < 3 {
            return;
        }
        let paint = Self::paint_attrs("fill", color);
        let _ = writeln!(
            self.body,
            "<polygon points=\"{}\" {} stroke=\"none\"/>",
            Self::points_attr(points),
            paint
        );
    }

    fn stroke_polyline(&mut self, points: &[DVec2], closed: bool, style: &StrokeStyle) {
        if points.len() < 2 {
            return;
        }
        let tag = if closed { "polygon" } else { "polyline" };
        let paint = Self::paint_attrs("stroke", style.color);
        let dash = if style.dash.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = style.dash.iter().map(|d| format!("{:.1}", d)).collect();
            format!(" stroke-dasharray=\"{}\"", parts.join(","))
        };
        let _ = writeln!(
            self.body,
            "<{} points=\"{}\" fill=\"none\" {} stroke-width=\"{:.2}\" stroke-linejoin=\"round\"{}/>",
            tag,
            Self::points_attr(points),
            paint,
            style.width,
            dash
        );
    }

    fn fill_text(&mut self, text: &str, at: DVec2, style: &TextStyle) {
        let anchor = match style.align {
            TextAlign::Start => "start",
            TextAlign::Middle => "middle",
            TextAlign::End => "end",
        };
        let _ = writeln!(
            self.body,
            "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"{:.1}\" font-family=\"sans-serif\" text-anchor=\"{}\" fill=\"{}\">{}</text>",
            at.x,
            at.y,
            style.size,
            anchor,
            style.color.to_hex(),
            escape(text)
        );
    }
}
