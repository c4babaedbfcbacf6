//! Plot targets given as expression strings.
//!
//! `plot("x**2", ...)` and `plot("y = sin(x)", ...)` are explicit: y is a
//! function of x and is sampled directly. `plot("x**2 + y**2 = 16", ...)` and
//! `plot("x*y - 1", ...)` mention y on the function side and are traced as
//! the zero set with the contour extractor.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use glam::DVec2;
use regex::Regex;
use rhai::{Dynamic, Engine, Scope, AST};

use crate::contour::find_contour_points;

/// Bounds for the number of samples of an explicit plot.
pub const MIN_SAMPLES: usize = 50;
pub const MAX_SAMPLES: usize = 2000;

/// How a plot expression is evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlotEquation {
    /// `y = expr(x)`.
    Explicit(String),
    /// `expr(x, y) = 0`.
    Implicit(String),
}

fn y_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\by\b").expect("y token regex must compile"))
}

fn mentions_y(expr: &str) -> bool {
    y_token().is_match(expr)
}

/// Split `lhs = rhs` on a single assignment-style `=`. Comparison operators
/// (`==`, `<=`, `>=`, `!=`) are not split points.
fn split_equation(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut found = None;
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'=' {
            continue;
        }
        let prev = i.checked_sub(1).map(|p| bytes[p]);
        let next = bytes.get(i + 1).copied();
        if matches!(prev, Some(b'=' | b'<' | b'>' | b'!')) || next == Some(b'=') {
            continue;
        }
        if found.is_some() {
            return None;
        }
        found = Some(i);
    }
    found.map(|i| (text[..i].trim(), text[i + 1..].trim()))
}

/// Decide whether `target` is sampled along x or traced as a zero set.
pub fn classify(target: &str) -> PlotEquation {
    let target = target.trim();
    match split_equation(target) {
        Some((lhs, rhs)) if lhs == "y" && !mentions_y(rhs) => PlotEquation::Explicit(rhs.to_string()),
        Some((lhs, rhs)) if rhs == "y" && !mentions_y(lhs) => PlotEquation::Explicit(lhs.to_string()),
        Some((lhs, rhs)) => PlotEquation::Implicit(format!("({}) - ({})", lhs, rhs)),
        None if mentions_y(target) => PlotEquation::Implicit(target.to_string()),
        None => PlotEquation::Explicit(target.to_string()),
    }
}

/// Default sample count for an explicit plot spanning `span` units at
/// `pixels_per_unit`: about one sample every two pixels, clamped.
pub fn default_num_points(span: f64, pixels_per_unit: f64) -> usize {
    let samples = (span.abs() * pixels_per_unit.abs() / 2.0).ceil();
    if !samples.is_finite() {
        return MIN_SAMPLES;
    }
    (samples as usize).clamp(MIN_SAMPLES, MAX_SAMPLES)
}

/// Sample `f` at `num_points` evenly spaced x values in `[x_min, x_max]`.
///
/// Non-finite samples split the curve; fragments shorter than two points
/// are dropped. An `Err` from `f` aborts sampling.
pub fn sample_polylines<F, E>(mut f: F, x_min: f64, x_max: f64, num_points: usize) -> Result<Vec<Vec<DVec2>>, E>
where
    F: FnMut(f64) -> Result<f64, E>,
{
    let n = num_points.max(2);
    let dx = (x_max - x_min) / (n - 1) as f64;
    let mut lines = Vec::new();
    let mut current = Vec::new();
    for i in 0..n {
        let x = x_min + dx * i as f64;
        let y = f(x)?;
        if y.is_finite() {
            current.push(DVec2::new(x, y));
        } else if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.retain(|line| line.len() >= 2);
    Ok(lines)
}

/// Numeric value of a Rhai result (`INT` or `FLOAT`).
pub fn as_number(value: &Dynamic) -> Option<f64> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|i| i as f64))
}

/// Evaluates plot expressions in `x`, `y` and the frame parameters.
pub struct ExpressionEvaluator {
    engine: Engine,
}

/// A compiled expression bound to its own scope.
pub struct CompiledExpression<'e> {
    engine: &'e Engine,
    ast: AST,
    scope: Scope<'static>,
}

impl CompiledExpression<'_> {
    /// Evaluate at `(x, y)`. Errors and non-numeric results become NaN.
    pub fn eval(&mut self, x: f64, y: f64) -> f64 {
        self.scope.set_value("x", x);
        self.scope.set_value("y", y);
        match self.engine.eval_ast_with_scope::<Dynamic>(&mut self.scope, &self.ast) {
            Ok(value) => as_number(&value).unwrap_or(f64::NAN),
            Err(_) => f64::NAN,
        }
    }
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_expr_depths(64, 64);
        engine.set_max_operations(10_000);
        Self { engine }
    }

    /// Compile `expr` with `x`, `y` and every parameter in scope.
    pub fn compile(&self, expr: &str, parameters: &BTreeMap<String, f64>) -> Result<CompiledExpression<'_>, String> {
        let mut scope = Scope::new();
        scope.push("x", 0.0_f64);
        scope.push("y", 0.0_f64);
        for (name, value) in parameters {
            if name != "x" && name != "y" {
                scope.push_constant(name.clone(), *value);
            }
        }
        let ast = self
            .engine
            .compile_expression_with_scope(&scope, expr)
            .map_err(|e| format!("Invalid plot expression '{}': {}", expr, e))?;
        Ok(CompiledExpression {
            engine: &self.engine,
            ast,
            scope,
        })
    }

    /// Sample `y = expr(x)`.
    pub fn sample_explicit(
        &self,
        expr: &str,
        x_min: f64,
        x_max: f64,
        num_points: usize,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<Vec<Vec<DVec2>>, String> {
        let mut compiled = self.compile(expr, parameters)?;
        sample_polylines(|x| Ok::<f64, String>(compiled.eval(x, 0.0)), x_min, x_max, num_points)
    }

    /// Trace `expr(x, y) = 0` over the given rectangle.
    #[allow(clippy::too_many_arguments)]
    pub fn trace_implicit(
        &self,
        expr: &str,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        resolution: usize,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<Vec<Vec<DVec2>>, String> {
        let mut compiled = self.compile(expr, parameters)?;
        Ok(find_contour_points(
            |x, y| compiled.eval(x, y),
            x_min,
            x_max,
            y_min,
            y_max,
            resolution,
        ))
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Contour of a Rhai expression in `x` and `y`, e.g. `"x**2 + y**2 - 16"`.
pub fn find_contour_points_expr(
    expr: &str,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    resolution: usize,
) -> Result<Vec<Vec<DVec2>>, String> {
    ExpressionEvaluator::new().trace_implicit(expr, x_min, x_max, y_min, y_max, resolution, &BTreeMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_forms() {
        assert_eq!(classify("x**2"), PlotEquation::Explicit("x**2".into()));
        assert_eq!(classify("y = sin(x)"), PlotEquation::Explicit("sin(x)".into()));
        assert_eq!(classify("2*x = y"), PlotEquation::Explicit("2*x".into()));
        assert_eq!(
            classify("x**2 + y**2 = 16"),
            PlotEquation::Implicit("(x**2 + y**2) - (16)".into())
        );
        assert_eq!(classify("x*y - 1"), PlotEquation::Implicit("x*y - 1".into()));
        assert_eq!(classify("y = x + y"), PlotEquation::Implicit("(y) - (x + y)".into()));
    }

    #[test]
    fn test_identifiers_containing_y_are_not_y() {
        assert_eq!(classify("my_y * x"), PlotEquation::Explicit("my_y * x".into()));
    }

    #[test]
    fn test_comparisons_are_not_equations() {
        assert_eq!(split_equation("x == 1"), None);
        assert_eq!(split_equation("a <= b"), None);
        assert_eq!(split_equation("a = b = c"), None);
        assert_eq!(split_equation("y = 2"), Some(("y", "2")));
    }

    #[test]
    fn test_circle_expression_contour() {
        let lines = find_contour_points_expr("x**2 + y**2 - 16", -10.0, 10.0, -10.0, 10.0, 100).unwrap();
        assert!(!lines.is_empty());
        for p in lines.iter().flatten() {
            let r = p.length();
            assert!(r > 3.0 && r < 5.0);
        }
    }

    #[test]
    fn test_no_root_expression_is_empty() {
        let lines = find_contour_points_expr("x**2 + y**2 + 100", -10.0, 10.0, -10.0, 10.0, 100).unwrap();
        assert_eq!(lines.iter().map(Vec::len).sum::<usize>(), 0);
    }

    #[test]
    fn test_explicit_sampling_uses_parameters() {
        let mut params = BTreeMap::new();
        params.insert("a".to_string(), 3.0);
        let lines = ExpressionEvaluator::new()
            .sample_explicit("a * x", 0.0, 1.0, 11, &params)
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 11);
        assert!((lines[0][10].y - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_samples_split_curve() {
        let lines = sample_polylines(
            |x: f64| Ok::<f64, ()>(if x.abs() < 0.05 { f64::NAN } else { 1.0 / x }),
            -1.0,
            1.0,
            41,
        )
        .unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_bad_expression_is_error() {
        assert!(ExpressionEvaluator::new()
            .sample_explicit("x +* 2", 0.0, 1.0, 10, &BTreeMap::new())
            .is_err());
    }

    #[test]
    fn test_default_num_points_clamps() {
        assert_eq!(default_num_points(1.0, 1.0), MIN_SAMPLES);
        assert_eq!(default_num_points(20.0, 40.0), 400);
        assert_eq!(default_num_points(1e9, 1e9), MAX_SAMPLES);
    }
}
