//! Capture of script side effects.
//!
//! Scripts call `draw(...)` and `plot(...)`; those native functions never
//! touch frames. They append typed [`CapturedCall`]s to the capture session
//! installed for the executing thread. After the run the session is drained
//! and the calls are converted into [`UserVector`]s and [`FunctionPlot`]s.
//!
//! Uses thread-local storage so Rhai native functions can reach the session.

use std::cell::RefCell;
use std::collections::BTreeMap;

use glam::DVec2;
use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, Map, NativeCallContext, Scope};
use serde::Serialize;

use crate::color::Color;
use crate::contour::{adaptive_resolution, MAX_RESOLUTION, MIN_RESOLUTION};
use crate::frame::{ArtifactId, Frame, FrameId, FunctionPlot, PlotKind, UserVector};
use crate::plot_target::{as_number, classify, default_num_points, sample_polylines, ExpressionEvaluator, PlotEquation};
use crate::script_log::{reset_run_log_count, stringify_dynamic, LogEntry, LogLevel};

/// Upper bound on an explicit `numPoints` argument.
pub const MAX_NUM_POINTS: usize = 10_000;

/// Names bound by the host; parameters may not shadow them.
const RESERVED_NAMES: &[&str] = &[
    "origin", "base_i", "base_j", "basis", "canvas", "log", "x", "y", "draw", "plot",
];

/// Canvas facts scripts may use for resolution-aware sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasInfo {
    pub width: f64,
    pub height: f64,
    /// Screen pixels per local unit of the target frame.
    pub pixels_per_unit: f64,
}

impl Default for CanvasInfo {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            pixels_per_unit: 40.0,
        }
    }
}

/// Read-only frame data exposed to a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameContext {
    pub frame_id: Option<FrameId>,
    pub origin: DVec2,
    pub base_i: DVec2,
    pub base_j: DVec2,
    pub parameters: BTreeMap<String, f64>,
    pub canvas: CanvasInfo,
}

impl Default for FrameContext {
    fn default() -> Self {
        Self {
            frame_id: None,
            origin: DVec2::ZERO,
            base_i: DVec2::X,
            base_j: DVec2::Y,
            parameters: BTreeMap::new(),
            canvas: CanvasInfo::default(),
        }
    }
}

fn vec2_array(v: DVec2) -> Array {
    vec![Dynamic::from(v.x), Dynamic::from(v.y)]
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FrameContext {
    pub fn for_frame(frame: &Frame, canvas: CanvasInfo) -> Self {
        Self {
            frame_id: Some(frame.id),
            origin: frame.origin,
            base_i: frame.base_i,
            base_j: frame.base_j,
            parameters: frame.parameters.clone(),
            canvas,
        }
    }

    /// Map a local point through this frame's basis into parent space.
    pub fn to_parent(&self, p: DVec2) -> DVec2 {
        self.origin + self.base_i * p.x + self.base_j * p.y
    }

    /// Build the run scope: context values as constants, plus one constant
    /// per parameter with a valid, non-reserved name.
    pub fn to_scope(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        scope.push_constant("origin", vec2_array(self.origin));
        scope.push_constant("base_i", vec2_array(self.base_i));
        scope.push_constant("base_j", vec2_array(self.base_j));
        // Row-major 2x2 whose columns are the basis vectors.
        let basis: Array = vec![
            Dynamic::from(vec2_array(DVec2::new(self.base_i.x, self.base_j.x))),
            Dynamic::from(vec2_array(DVec2::new(self.base_i.y, self.base_j.y))),
        ];
        scope.push_constant("basis", basis);

        let mut canvas = Map::new();
        canvas.insert("width".into(), Dynamic::from(self.canvas.width));
        canvas.insert("height".into(), Dynamic::from(self.canvas.height));
        canvas.insert("pixels_per_unit".into(), Dynamic::from(self.canvas.pixels_per_unit));
        scope.push_constant("canvas", canvas);

        for (name, value) in &self.parameters {
            if !is_identifier(name) || RESERVED_NAMES.contains(&name.as_str()) {
                log::warn!("Parameter '{}' is not a usable script name; skipping", name);
                continue;
            }
            scope.push_constant(name.clone(), *value);
        }
        scope
    }
}

/// What a `plot` call asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotTarget {
    /// Expression text, classified and evaluated after the run.
    Expression(String),
    /// A script closure, already sampled during the run.
    Sampled {
        description: String,
        polylines: Vec<Vec<DVec2>>,
    },
}

/// One recorded primitive call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum CapturedCall {
    Draw {
        start: DVec2,
        end: DVec2,
        color: Color,
    },
    Plot {
        target: PlotTarget,
        x_min: f64,
        x_max: f64,
        color: Color,
        /// Explicit sample count (or contour resolution) if the script gave one.
        num_points: Option<usize>,
    },
}

/// Run-scoped capture buffer.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    context: FrameContext,
    calls: Vec<CapturedCall>,
    warnings: Vec<String>,
    logs: Vec<LogEntry>,
}

impl CaptureSession {
    pub fn new(context: FrameContext) -> Self {
        Self {
            context,
            calls: Vec::new(),
            warnings: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn context(&self) -> &FrameContext {
        &self.context
    }

    pub fn push(&mut self, call: CapturedCall) {
        self.calls.push(call);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("Capture warning: {}", message);
        self.warnings.push(message);
    }

    pub fn record_log(&mut self, level: LogLevel, message: &str) {
        self.logs.push(LogEntry {
            level,
            message: message.to_string(),
        });
    }

    #[cfg(test)]
    pub fn calls(&self) -> &[CapturedCall] {
        &self.calls
    }

    #[cfg(test)]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Split into `(calls, warnings, logs)`.
    pub fn into_parts(self) -> (Vec<CapturedCall>, Vec<String>, Vec<LogEntry>) {
        (self.calls, self.warnings, self.logs)
    }
}

thread_local! {
    static CAPTURE_SESSION: RefCell<Option<CaptureSession>> = const { RefCell::new(None) };
}

/// Install a session in thread-local storage, replacing any previous one.
pub fn install_session(session: CaptureSession) {
    CAPTURE_SESSION.with(|s| *s.borrow_mut() = Some(session));
}

/// Remove and return the session from thread-local storage.
pub fn remove_session() -> Option<CaptureSession> {
    CAPTURE_SESSION.with(|s| s.borrow_mut().take())
}

/// Execute a function with the current session (if installed).
pub fn with_session<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut CaptureSession) -> R,
{
    CAPTURE_SESSION.with(|s| s.borrow_mut().as_mut().map(f))
}

#[cfg(test)]
fn has_session() -> bool {
    CAPTURE_SESSION.with(|s| s.borrow().is_some())
}

/// Installs a fresh session and removes it when dropped, so an error or
/// panic inside the run can not leak calls into the next one.
pub struct SessionGuard {
    _private: (),
}

impl SessionGuard {
    pub fn install(context: FrameContext) -> Self {
        reset_run_log_count();
        install_session(CaptureSession::new(context));
        Self { _private: () }
    }

    /// Take the session out. The guard has nothing left to clear afterwards.
    pub fn finish(self) -> Option<CaptureSession> {
        remove_session()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if remove_session().is_some() {
            log::debug!("Capture session cleared by guard");
        }
    }
}

// Value parsing for the native functions

fn parse_point(value: &Dynamic) -> Option<DVec2> {
    if let Some(arr) = value.read_lock::<Array>() {
        if arr.len() == 2 {
            return Some(DVec2::new(as_number(&arr[0])?, as_number(&arr[1])?));
        }
        return None;
    }
    if let Some(map) = value.read_lock::<Map>() {
        let x = as_number(map.get("x")?)?;
        let y = as_number(map.get("y")?)?;
        return Some(DVec2::new(x, y));
    }
    None
}

/// Accepts `[x, y]`, `[[x0, y0], [x1, y1]]`, `#{x, y}` and `#{start, end}`.
/// Single points are drawn from the local origin.
pub fn parse_vector(value: &Dynamic) -> Option<(DVec2, DVec2)> {
    if let Some(arr) = value.read_lock::<Array>() {
        if arr.len() == 2 && arr[0].is_array() {
            return Some((parse_point(&arr[0])?, parse_point(&arr[1])?));
        }
    }
    if let Some(map) = value.read_lock::<Map>() {
        if let Some(end) = map.get("end") {
            let start = match map.get("start") {
                Some(start) => parse_point(start)?,
                None => DVec2::ZERO,
            };
            return Some((start, parse_point(end)?));
        }
    }
    let end = parse_point(value)?;
    Some((DVec2::ZERO, end))
}

/// Resolve a color argument; `()` means no color. Anything unparseable
/// falls back to the default with a session warning.
fn parse_color(value: &Dynamic) -> Color {
    if value.is_unit() {
        return Color::DEFAULT_ARTIFACT;
    }
    let text = if let Some(map) = value.read_lock::<Map>() {
        map.get("color").map(stringify_dynamic)
    } else if value.is_string() {
        Some(stringify_dynamic(value))
    } else {
        None
    };
    match text.as_deref().and_then(Color::from_hex) {
        Some(color) => color,
        None => {
            let shown = text.unwrap_or_else(|| stringify_dynamic(value));
            with_session(|s| {
                s.warn(format!(
                    "invalid color '{}', using {}",
                    shown,
                    Color::DEFAULT_ARTIFACT.to_hex()
                ))
            });
            Color::DEFAULT_ARTIFACT
        }
    }
}

fn parse_num_points(value: &Dynamic) -> Option<usize> {
    match as_number(value) {
        Some(n) if n.is_finite() && n >= 2.0 => Some((n as usize).min(MAX_NUM_POINTS)),
        _ => {
            with_session(|s| {
                s.warn(format!(
                    "invalid numPoints '{}', using the default",
                    stringify_dynamic(value)
                ))
            });
            None
        }
    }
}

fn draw_impl(vector: Dynamic, color: Option<Dynamic>) -> Result<(), Box<EvalAltResult>> {
    let (start, end) = parse_vector(&vector).ok_or_else(|| {
        format!(
            "draw(): expected [x, y], [[x0, y0], [x1, y1]], #{{x, y}} or #{{start, end}}, got {}",
            stringify_dynamic(&vector)
        )
    })?;
    if !(start.is_finite() && end.is_finite()) {
        return Err("draw(): vector components must be finite".into());
    }
    let color = color.as_ref().map(parse_color).unwrap_or(Color::DEFAULT_ARTIFACT);
    if with_session(|s| s.push(CapturedCall::Draw { start, end, color })).is_none() {
        log::debug!("draw() called with no capture session installed");
    }
    Ok(())
}

fn plot_impl(
    ctx: &NativeCallContext,
    target: Dynamic,
    x_min: Dynamic,
    x_max: Dynamic,
    color: Option<Dynamic>,
    num_points: Option<Dynamic>,
) -> Result<(), Box<EvalAltResult>> {
    let (Some(mut lo), Some(mut hi)) = (as_number(&x_min), as_number(&x_max)) else {
        return Err("plot(): xMin and xMax must be numbers".into());
    };
    if !(lo.is_finite() && hi.is_finite()) || lo == hi {
        return Err(format!("plot(): invalid domain [{}, {}]", lo, hi).into());
    }
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
        with_session(|s| s.warn(format!("plot(): domain reversed, using [{}, {}]", lo, hi)));
    }
    let color = color.as_ref().map(parse_color).unwrap_or(Color::DEFAULT_ARTIFACT);
    let num_points = num_points.as_ref().and_then(parse_num_points);

    let target = if let Some(fn_ptr) = target.clone().try_cast::<FnPtr>() {
        let ppu = with_session(|s| s.context().canvas.pixels_per_unit).unwrap_or(CanvasInfo::default().pixels_per_unit);
        let n = num_points.unwrap_or_else(|| default_num_points(hi - lo, ppu));
        let polylines = sample_polylines(
            |x| {
                let y = fn_ptr.call_within_context::<Dynamic>(ctx, (x,))?;
                Ok::<f64, Box<EvalAltResult>>(as_number(&y).unwrap_or(f64::NAN))
            },
            lo,
            hi,
            n,
        )?;
        PlotTarget::Sampled {
            description: format!("fn {}", fn_ptr.fn_name()),
            polylines,
        }
    } else if target.is_string() {
        PlotTarget::Expression(stringify_dynamic(&target))
    } else {
        return Err(format!(
            "plot(): expected an expression string or a function, got {}",
            target.type_name()
        )
        .into());
    };

    let call = CapturedCall::Plot {
        target,
        x_min: lo,
        x_max: hi,
        color,
        num_points,
    };
    if with_session(|s| s.push(call)).is_none() {
        log::debug!("plot() called with no capture session installed");
    }
    Ok(())
}

fn number_arg(value: &Dynamic, what: &str) -> Result<f64, Box<EvalAltResult>> {
    as_number(value).ok_or_else(|| format!("{}: expected a number, got {}", what, value.type_name()).into())
}

/// Register `draw`, `plot` and the small vector helpers on an engine.
pub fn register_capture_api(engine: &mut Engine) {
    engine
        .register_fn("draw", |vector: Dynamic| draw_impl(vector, None))
        .register_fn("draw", |vector: Dynamic, color: Dynamic| draw_impl(vector, Some(color)));

    engine
        .register_fn(
            "plot",
            |ctx: NativeCallContext, target: Dynamic, x_min: Dynamic, x_max: Dynamic| {
                plot_impl(&ctx, target, x_min, x_max, None, None)
            },
        )
        .register_fn(
            "plot",
            |ctx: NativeCallContext, target: Dynamic, x_min: Dynamic, x_max: Dynamic, color: Dynamic| {
                plot_impl(&ctx, target, x_min, x_max, Some(color), None)
            },
        )
        .register_fn(
            "plot",
            |ctx: NativeCallContext,
             target: Dynamic,
             x_min: Dynamic,
             x_max: Dynamic,
             color: Dynamic,
             num_points: Dynamic| {
                plot_impl(&ctx, target, x_min, x_max, Some(color), Some(num_points))
            },
        );

    engine.register_fn("vec2", |x: Dynamic, y: Dynamic| -> Result<Array, Box<EvalAltResult>> {
        Ok(vec2_array(DVec2::new(number_arg(&x, "vec2()")?, number_arg(&y, "vec2()")?)))
    });

    engine.register_fn("to_parent", |p: Dynamic| -> Result<Array, Box<EvalAltResult>> {
        let point = parse_point(&p).ok_or("to_parent(): expected [x, y] or #{x, y}")?;
        let context = with_session(|s| s.context().clone()).unwrap_or_default();
        Ok(vec2_array(context.to_parent(point)))
    });

    engine.register_fn("det", |m: Array| -> Result<f64, Box<EvalAltResult>> {
        let rows: Vec<DVec2> = m.iter().filter_map(parse_point).collect();
        if rows.len() != 2 || m.len() != 2 {
            return Err("det(): expected a 2x2 matrix [[a, b], [c, d]]".into());
        }
        Ok(rows[0].x * rows[1].y - rows[0].y * rows[1].x)
    });
}

/// Artifacts produced by one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedArtifacts {
    pub vectors: Vec<UserVector>,
    pub plots: Vec<FunctionPlot>,
    pub warnings: Vec<String>,
}

/// Turn recorded calls into frame artifacts with fresh ids.
///
/// Expression plots are classified here: explicit ones are sampled along
/// x, implicit ones are traced over `[x_min, x_max]` in both axes. An
/// expression that fails to compile is skipped with a warning.
pub fn convert_calls(calls: &[CapturedCall], context: &FrameContext) -> CapturedArtifacts {
    let mut out = CapturedArtifacts::default();
    let evaluator = ExpressionEvaluator::new();
    let ppu = context.canvas.pixels_per_unit;

    for call in calls {
        match call {
            CapturedCall::Draw { start, end, color } => out.vectors.push(UserVector {
                id: ArtifactId::fresh(),
                start: *start,
                end: *end,
                color: *color,
            }),
            CapturedCall::Plot {
                target,
                x_min,
                x_max,
                color,
                num_points,
            } => {
                let span = x_max - x_min;
                let converted = match target {
                    PlotTarget::Sampled { description, polylines } => {
                        Ok((description.clone(), polylines.clone(), PlotKind::Callable))
                    }
                    PlotTarget::Expression(text) => match classify(text) {
                        PlotEquation::Explicit(expr) => {
                            let n = num_points.unwrap_or_else(|| default_num_points(span, ppu));
                            evaluator
                                .sample_explicit(&expr, *x_min, *x_max, n, &context.parameters)
                                .map(|lines| (text.clone(), lines, PlotKind::Explicit))
                        }
                        PlotEquation::Implicit(expr) => {
                            let resolution = num_points
                                .map(|n| n.clamp(MIN_RESOLUTION, MAX_RESOLUTION))
                                .unwrap_or_else(|| adaptive_resolution(span, ppu));
                            evaluator
                                .trace_implicit(&expr, *x_min, *x_max, *x_min, *x_max, resolution, &context.parameters)
                                .map(|lines| (text.clone(), lines, PlotKind::Implicit))
                        }
                    },
                };
                match converted {
                    Ok((source, polylines, kind)) => out.plots.push(FunctionPlot {
                        id: ArtifactId::fresh(),
                        source,
                        domain: (*x_min, *x_max),
                        polylines,
                        color: *color,
                        kind,
                    }),
                    Err(message) => out.warnings.push(message),
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        register_capture_api(&mut engine);
        engine
    }

    fn run(code: &str, context: FrameContext) -> (Result<(), String>, CaptureSession) {
        let engine = engine();
        let guard = SessionGuard::install(context.clone());
        let mut scope = context.to_scope();
        let result = engine.run_with_scope(&mut scope, code).map_err(|e| e.to_string());
        (result, guard.finish().unwrap())
    }

    #[test]
    fn test_draw_point_with_color() {
        let (result, session) = run(r##"draw([1, 2], "#ff0000");"##, FrameContext::default());
        result.unwrap();
        assert_eq!(
            session.calls(),
            &[CapturedCall::Draw {
                start: DVec2::ZERO,
                end: DVec2::new(1.0, 2.0),
                color: Color::rgb(255, 0, 0),
            }]
        );
        let artifacts = convert_calls(session.calls(), session.context());
        assert_eq!(artifacts.vectors.len(), 1);
        assert_eq!(artifacts.vectors[0].end, DVec2::new(1.0, 2.0));
        assert_eq!(artifacts.vectors[0].color.to_hex(), "#ff0000");
    }

    #[test]
    fn test_vector_shapes() {
        let code = r#"
            draw([[1, 1], [2, 3]]);
            draw(#{x: 0.5, y: -1});
            draw(#{start: [1, 0], end: #{x: 2, y: 0}});
        "#;
        let (result, session) = run(code, FrameContext::default());
        result.unwrap();
        let ends: Vec<(DVec2, DVec2)> = session
            .calls()
            .iter()
            .filter_map(|c| match c {
                CapturedCall::Draw { start, end, .. } => Some((*start, *end)),
                _ => None,
            })
            .collect();
        assert_eq!(
            ends,
            vec![
                (DVec2::new(1.0, 1.0), DVec2::new(2.0, 3.0)),
                (DVec2::ZERO, DVec2::new(0.5, -1.0)),
                (DVec2::new(1.0, 0.0), DVec2::new(2.0, 0.0)),
            ]
        );
    }

    #[test]
    fn test_bad_color_falls_back_with_warning() {
        let (result, session) = run(r#"draw([1, 0], "chartreuse-ish");"#, FrameContext::default());
        result.unwrap();
        match &session.calls()[0] {
            CapturedCall::Draw { color, .. } => assert_eq!(*color, Color::DEFAULT_ARTIFACT),
            other => panic!("unexpected call {:?}", other),
        }
        assert_eq!(session.warnings().len(), 1);
    }

    #[test]
    fn test_unit_color_means_default_without_warning() {
        let (result, session) = run("plot(|x| x, 0, 1, (), 10); draw([1, 1], ());", FrameContext::default());
        result.unwrap();
        assert!(session.warnings().is_empty(), "{:?}", session.warnings());
        let artifacts = convert_calls(session.calls(), session.context());
        assert_eq!(artifacts.plots[0].color, Color::DEFAULT_ARTIFACT);
        assert_eq!(artifacts.plots[0].polylines[0].len(), 10);
        assert_eq!(artifacts.vectors[0].color, Color::DEFAULT_ARTIFACT);
    }

    #[test]
    fn test_bad_vector_is_script_error() {
        let (result, session) = run(r#"draw("nope");"#, FrameContext::default());
        assert!(result.unwrap_err().contains("draw()"));
        assert!(session.calls().is_empty());
    }

    #[test]
    fn test_plot_closure_is_sampled_during_run() {
        let (result, session) = run("plot(|x| x * 2.0, 0, 1, \"#00ff00\", 5);", FrameContext::default());
        result.unwrap();
        let artifacts = convert_calls(session.calls(), session.context());
        assert_eq!(artifacts.plots.len(), 1);
        let plot = &artifacts.plots[0];
        assert_eq!(plot.kind, PlotKind::Callable);
        assert_eq!(plot.polylines[0].len(), 5);
        assert!((plot.polylines[0][4].y - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_plot_expressions_convert_by_kind() {
        let code = r#"
            plot("y = x * x", -1, 1);
            plot("x**2 + y**2 = 4", -3, 3);
        "#;
        let (result, session) = run(code, FrameContext::default());
        result.unwrap();
        let artifacts = convert_calls(session.calls(), session.context());
        assert!(artifacts.warnings.is_empty());
        assert_eq!(artifacts.plots[0].kind, PlotKind::Explicit);
        assert_eq!(artifacts.plots[1].kind, PlotKind::Implicit);
        for p in artifacts.plots[1].polylines.iter().flatten() {
            assert!((p.length() - 2.0).abs() < 0.1);
        }
    }

    #[test]
    fn test_parameters_and_context_in_scope() {
        let mut context = FrameContext::default();
        context.base_i = DVec2::new(2.0, 0.0);
        context.parameters.insert("k".to_string(), 3.0);
        context.parameters.insert("origin".to_string(), 9.0);
        let code = r#"
            if k != 3.0 { throw "k"; }
            if base_i[0] != 2.0 { throw "base_i"; }
            if basis[0][0] != 2.0 { throw "basis"; }
            if det(basis) != 2.0 { throw "det"; }
            if canvas.pixels_per_unit != 40.0 { throw "canvas"; }
            draw(to_parent([1, 1]));
        "#;
        let (result, session) = run(code, context);
        result.unwrap();
        match &session.calls()[0] {
            CapturedCall::Draw { end, .. } => assert_eq!(*end, DVec2::new(2.0, 1.0)),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_guard_clears_session_on_drop() {
        {
            let _guard = SessionGuard::install(FrameContext::default());
            with_session(|s| s.warn("pending"));
            assert!(has_session());
        }
        assert!(!has_session());
    }

    #[test]
    fn test_bad_expression_becomes_warning() {
        let calls = vec![CapturedCall::Plot {
            target: PlotTarget::Expression("x +* 1".to_string()),
            x_min: 0.0,
            x_max: 1.0,
            color: Color::BLACK,
            num_points: None,
        }];
        let artifacts = convert_calls(&calls, &FrameContext::default());
        assert!(artifacts.plots.is_empty());
        assert_eq!(artifacts.warnings.len(), 1);
    }
}
