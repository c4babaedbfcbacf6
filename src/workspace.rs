//! The workspace facade: frames, selection, rendering and script runs
//! behind one owner.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::DVec2;
use serde_json::Value;

use crate::capture::{CanvasInfo, FrameContext};
use crate::config::AppConfig;
use crate::error::{basis_warnings, FrameError, GeometryWarning};
use crate::frame::{Frame, FrameId, RootViewport, Viewport};
use crate::geometry::Rect;
use crate::hit_test;
use crate::interpreter::Interpreter;
use crate::registry::{FrameRegistry, RemovePolicy};
use crate::render::{Canvas, RenderReport, Renderer};
use crate::script_runner::{ExecutionResult, RunOptions, RunRequest, RunTicket, ScriptError, ScriptErrorKind, ScriptRunner};
use crate::transform::{local_unit_pixels, ScreenSpace};

/// Side length of the bounds given to frames created without explicit bounds.
pub const DEFAULT_FRAME_SIZE: f64 = 10.0;

/// Partial frame update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramePatch {
    pub origin: Option<DVec2>,
    pub base_i: Option<DVec2>,
    pub base_j: Option<DVec2>,
    pub bounds: Option<Rect>,
    pub viewport: Option<Viewport>,
    /// Replaces the parameter map.
    pub parameters: Option<BTreeMap<String, f64>>,
    pub source_code: Option<String>,
    /// `Some(None)` makes the frame a root.
    pub parent: Option<Option<FrameId>>,
}

fn number(value: &Value, field: &str) -> Result<f64, FrameError> {
    let n = value
        .as_f64()
        .ok_or_else(|| FrameError::validation(field, format!("expected a number, got {}", value)))?;
    if !n.is_finite() {
        return Err(FrameError::validation(field, "expected a finite number"));
    }
    Ok(n)
}

/// `[x, y]` or `{"x": .., "y": ..}`.
fn vector(value: &Value, field: &str) -> Result<DVec2, FrameError> {
    match value {
        Value::Array(items) if items.len() == 2 => Ok(DVec2::new(
            number(&items[0], &format!("{field}.x"))?,
            number(&items[1], &format!("{field}.y"))?,
        )),
        Value::Object(map) => {
            let x = map
                .get("x")
                .ok_or_else(|| FrameError::validation(format!("{field}.x"), "missing"))?;
            let y = map
                .get("y")
                .ok_or_else(|| FrameError::validation(format!("{field}.y"), "missing"))?;
            Ok(DVec2::new(number(x, &format!("{field}.x"))?, number(y, &format!("{field}.y"))?))
        }
        _ => Err(FrameError::validation(field, "expected [x, y] or {x, y}")),
    }
}

fn field<'a>(map: &'a serde_json::Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    map.get(camel).or_else(|| map.get(snake))
}

impl FramePatch {
    /// Parse a patch from untyped input (e.g. a property panel).
    ///
    /// Non-numeric or non-finite values are a `Validation` error; a
    /// degenerate basis is accepted.
    pub fn from_json(value: &Value) -> Result<Self, FrameError> {
        let map = value
            .as_object()
            .ok_or_else(|| FrameError::validation("patch", "expected an object"))?;
        let mut patch = FramePatch::default();

        if let Some(v) = map.get("origin") {
            patch.origin = Some(vector(v, "origin")?);
        }
        if let Some(v) = field(map, "baseI", "base_i") {
            patch.base_i = Some(vector(v, "baseI")?);
        }
        if let Some(v) = field(map, "baseJ", "base_j") {
            patch.base_j = Some(vector(v, "baseJ")?);
        }
        if let Some(v) = map.get("bounds") {
            let b = v
                .as_object()
                .ok_or_else(|| FrameError::validation("bounds", "expected {min, max}"))?;
            let min = vector(b.get("min").unwrap_or(&Value::Null), "bounds.min")?;
            let max = vector(b.get("max").unwrap_or(&Value::Null), "bounds.max")?;
            patch.bounds = Some(Rect::from_corners(min, max));
        }
        if let Some(v) = map.get("viewport") {
            let vp = v
                .as_object()
                .ok_or_else(|| FrameError::validation("viewport", "expected {x, y, zoom}"))?;
            let mut viewport = Viewport::default();
            if let Some(x) = vp.get("x") {
                viewport.x = number(x, "viewport.x")?;
            }
            if let Some(y) = vp.get("y") {
                viewport.y = number(y, "viewport.y")?;
            }
            if let Some(zoom) = vp.get("zoom") {
                viewport.zoom = number(zoom, "viewport.zoom")?;
            }
            patch.viewport = Some(viewport);
        }
        if let Some(v) = map.get("parameters") {
            let params = v
                .as_object()
                .ok_or_else(|| FrameError::validation("parameters", "expected an object"))?;
            let mut out = BTreeMap::new();
            for (name, value) in params {
                out.insert(name.clone(), number(value, &format!("parameters.{name}"))?);
            }
            patch.parameters = Some(out);
        }
        if let Some(v) = field(map, "sourceCode", "source_code") {
            let code = v
                .as_str()
                .ok_or_else(|| FrameError::validation("sourceCode", "expected a string"))?;
            patch.source_code = Some(code.to_string());
        }
        if let Some(v) = map.get("parent") {
            patch.parent = Some(match v {
                Value::Null => None,
                other => {
                    let id = other
                        .as_u64()
                        .ok_or_else(|| FrameError::validation("parent", "expected a frame id or null"))?;
                    Some(FrameId(id))
                }
            });
        }
        Ok(patch)
    }

    /// Reject non-finite numbers anywhere in the patch.
    pub fn validate(&self) -> Result<(), FrameError> {
        let vectors = [
            ("origin", self.origin),
            ("baseI", self.base_i),
            ("baseJ", self.base_j),
            ("bounds.min", self.bounds.map(|b| b.min)),
            ("bounds.max", self.bounds.map(|b| b.max)),
        ];
        for (name, v) in vectors {
            if v.is_some_and(|v| !v.is_finite()) {
                return Err(FrameError::validation(name, "expected finite numbers"));
            }
        }
        if let Some(vp) = &self.viewport {
            for (name, n) in [("viewport.x", vp.x), ("viewport.y", vp.y), ("viewport.zoom", vp.zoom)] {
                if !n.is_finite() {
                    return Err(FrameError::validation(name, "expected a finite number"));
                }
            }
        }
        if let Some(params) = &self.parameters {
            if let Some((name, _)) = params.iter().find(|(_, v)| !v.is_finite()) {
                return Err(FrameError::validation(format!("parameters.{name}"), "expected a finite number"));
            }
        }
        Ok(())
    }
}

/// Result of a successful update.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    pub frame: Frame,
    /// Degenerate-geometry warnings; never block the update.
    pub warnings: Vec<GeometryWarning>,
}

/// Owner of the frame forest, root viewport, selection and script runner.
pub struct Workspace {
    registry: FrameRegistry,
    viewport: RootViewport,
    canvas_size: (f64, f64),
    selected: Option<FrameId>,
    renderer: Renderer,
    runner: ScriptRunner,
}

impl Workspace {
    /// New workspace with a fresh interpreter. Must be called within a
    /// Tokio runtime; call [`Workspace::initialize`] before running scripts.
    pub fn new(config: AppConfig) -> Self {
        let interpreter = Interpreter::with_rhai(config.runner.clone());
        Self::with_interpreter(config, interpreter)
    }

    pub fn with_interpreter(config: AppConfig, interpreter: Arc<Interpreter>) -> Self {
        Self {
            registry: FrameRegistry::new(),
            viewport: RootViewport::default(),
            canvas_size: (800.0, 600.0),
            selected: None,
            renderer: Renderer::new(config.render),
            runner: ScriptRunner::spawn(interpreter, config.runner),
        }
    }

    /// Load the interpreter. Idempotent.
    pub async fn initialize(&self) -> Result<(), ScriptError> {
        self.runner
            .interpreter()
            .initialize()
            .await
            .map_err(|e| ScriptError::from_init(&e))
    }

    pub fn registry(&self) -> &FrameRegistry {
        &self.registry
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.registry.get(id)
    }

    pub fn viewport(&self) -> &RootViewport {
        &self.viewport
    }

    pub fn set_viewport(&mut self, viewport: RootViewport) {
        self.viewport = viewport;
    }

    pub fn set_canvas_size(&mut self, width: f64, height: f64) {
        self.canvas_size = (width, height);
    }

    pub fn screen_space(&self) -> ScreenSpace {
        ScreenSpace::new(self.viewport, self.canvas_size.0, self.canvas_size.1)
    }

    pub fn selected(&self) -> Option<FrameId> {
        self.selected
    }

    /// Create a frame with default bounds centred on `origin`.
    pub fn create_frame(
        &mut self,
        origin: DVec2,
        base_i: DVec2,
        base_j: DVec2,
        parent: Option<FrameId>,
    ) -> Result<&Frame, FrameError> {
        let bounds = Rect::from_center(origin, DVec2::splat(DEFAULT_FRAME_SIZE));
        self.create_frame_with_bounds(origin, base_i, base_j, bounds, parent)
    }

    pub fn create_frame_with_bounds(
        &mut self,
        origin: DVec2,
        base_i: DVec2,
        base_j: DVec2,
        bounds: Rect,
        parent: Option<FrameId>,
    ) -> Result<&Frame, FrameError> {
        for (name, v) in [("origin", origin), ("baseI", base_i), ("baseJ", base_j), ("bounds.min", bounds.min), ("bounds.max", bounds.max)] {
            if !v.is_finite() {
                return Err(FrameError::validation(name, "expected finite numbers"));
            }
        }
        let frame = Frame::with_basis(origin, base_i, base_j, bounds);
        let id = self.registry.insert(frame, parent)?;
        log::debug!("Created {} (parent {:?})", id, parent);
        self.registry.get(id).ok_or(FrameError::UnknownFrame(id))
    }

    /// Apply a patch. Values and reparenting are checked before any field
    /// changes.
    pub fn update_frame(&mut self, id: FrameId, patch: FramePatch) -> Result<FrameUpdate, FrameError> {
        if !self.registry.contains(id) {
            return Err(FrameError::UnknownFrame(id));
        }
        patch.validate()?;
        if let Some(new_parent) = patch.parent {
            if self.registry.parent(id) != new_parent {
                self.registry.reparent(id, new_parent)?;
            }
        }

        let frame = self.registry.get_mut(id).ok_or(FrameError::UnknownFrame(id))?;
        if let Some(origin) = patch.origin {
            frame.origin = origin;
        }
        if let Some(base_i) = patch.base_i {
            frame.base_i = base_i;
        }
        if let Some(base_j) = patch.base_j {
            frame.base_j = base_j;
        }
        if let Some(bounds) = patch.bounds {
            frame.bounds = bounds;
        }
        if let Some(viewport) = patch.viewport {
            frame.viewport = viewport;
        }
        if let Some(parameters) = patch.parameters {
            frame.parameters = parameters;
        }
        if let Some(code) = patch.source_code {
            frame.source_code = code;
        }

        let warnings = basis_warnings(frame);
        for warning in &warnings {
            log::debug!("Degenerate geometry after update: {}", warning);
        }
        Ok(FrameUpdate {
            frame: frame.clone(),
            warnings,
        })
    }

    /// Delete a frame and its whole subtree. Queued runs for the removed
    /// frames are cancelled and the selection is cleared if it was removed.
    pub fn delete_frame(&mut self, id: FrameId) -> Result<Vec<FrameId>, FrameError> {
        let removed: Vec<FrameId> = self
            .registry
            .remove(id, RemovePolicy::Cascade)?
            .into_iter()
            .map(|f| f.id)
            .collect();
        for frame_id in &removed {
            self.runner.purge_frame(*frame_id);
        }
        if self.selected.is_some_and(|s| removed.contains(&s)) {
            self.selected = None;
        }
        log::debug!("Deleted {} frame(s) rooted at {}", removed.len(), id);
        Ok(removed)
    }

    /// Read-only script context for a frame at the current zoom.
    pub fn frame_context(&self, id: FrameId) -> Option<FrameContext> {
        let frame = self.registry.get(id)?;
        let (pi, pj) = local_unit_pixels(frame, &self.registry, &self.screen_space());
        let ppu = pi.max(pj);
        let canvas = CanvasInfo {
            width: self.canvas_size.0,
            height: self.canvas_size.1,
            pixels_per_unit: if ppu.is_finite() && ppu > 0.0 { ppu } else { CanvasInfo::default().pixels_per_unit },
        };
        Some(FrameContext::for_frame(frame, canvas))
    }

    /// Queue `code` for frame `id` and return a ticket for the result.
    ///
    /// The frame's source code is updated immediately; artifacts are applied
    /// by [`Workspace::run_frame_code`] / [`Workspace::apply_result`].
    pub fn submit_frame_code(&mut self, id: FrameId, code: &str, options: RunOptions) -> RunTicket {
        let Some(context) = self.frame_context(id) else {
            return RunTicket::rejected(
                Some(id),
                ScriptError::new(ScriptErrorKind::UnknownFrame, format!("unknown frame {}", id)),
            );
        };
        if let Some(frame) = self.registry.get_mut(id) {
            frame.source_code = code.to_string();
        }
        self.runner
            .submit(RunRequest::new(code, context).fast_path(options.fast_path))
    }

    /// Run `code` for frame `id` and apply the produced artifacts.
    pub async fn run_frame_code(&mut self, id: FrameId, code: &str, options: RunOptions) -> ExecutionResult {
        let ticket = self.submit_frame_code(id, code, options);
        let result = ticket.await;
        self.apply_result(&result, options.append);
        result
    }

    /// Put a result's artifacts on its frame.
    ///
    /// Runs that never executed change nothing. Otherwise the frame's
    /// previous artifacts are replaced (or kept, with `append`), also when
    /// the script failed part-way.
    pub fn apply_result(&mut self, result: &ExecutionResult, append: bool) {
        if result.completion_index.is_none() {
            return;
        }
        let Some(frame) = result.frame_id.and_then(|id| self.registry.get_mut(id)) else {
            return;
        };
        if !append {
            frame.clear_artifacts();
        }
        frame.vectors.extend(result.vectors.iter().cloned());
        frame.plots.extend(result.plots.iter().cloned());
        for warning in &result.warnings {
            log::warn!("{}: {}", frame.id, warning);
        }
    }

    /// Re-run a frame's stored code on the fast path, dropping any of its
    /// runs still waiting in the queue.
    pub async fn rerun_frame(&mut self, id: FrameId) -> ExecutionResult {
        self.runner.purge_frame(id);
        let code = self
            .registry
            .get(id)
            .map(|f| f.source_code.clone())
            .unwrap_or_default();
        self.run_frame_code(id, &code, RunOptions::fast()).await
    }

    /// Set a parameter and rerun the frame's code.
    pub async fn set_parameter(&mut self, id: FrameId, name: &str, value: f64) -> Result<ExecutionResult, FrameError> {
        if !value.is_finite() {
            return Err(FrameError::validation(format!("parameters.{name}"), "expected a finite number"));
        }
        let frame = self.registry.get_mut(id).ok_or(FrameError::UnknownFrame(id))?;
        frame.parameters.insert(name.to_string(), value);
        Ok(self.rerun_frame(id).await)
    }

    /// Innermost frame under a screen point.
    pub fn hit_test(&self, screen: DVec2) -> Option<FrameId> {
        hit_test::hit_test(screen, &self.registry, &self.screen_space())
    }

    /// Select the frame under `screen`; clears the selection on a miss.
    pub fn select_at(&mut self, screen: DVec2) -> Option<FrameId> {
        self.selected = self.hit_test(screen);
        self.selected
    }

    pub fn select(&mut self, id: Option<FrameId>) -> Result<(), FrameError> {
        if let Some(id) = id {
            if !self.registry.contains(id) {
                return Err(FrameError::UnknownFrame(id));
            }
        }
        self.selected = id;
        Ok(())
    }

    /// Paint everything onto `canvas`. The canvas size becomes the
    /// workspace's screen size.
    pub fn render(&mut self, canvas: &mut dyn Canvas) -> RenderReport {
        self.canvas_size = canvas.size();
        let report = self
            .renderer
            .render(canvas, &self.registry, &self.viewport, self.selected);
        for warning in &report.warnings {
            log::debug!("Rendered degenerate frame: {}", warning);
        }
        report
    }
}
