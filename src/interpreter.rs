//! The shared script interpreter.
//!
//! [`ScriptHost`] is the synchronous part: a sandboxed Rhai engine with the
//! capture and logging APIs registered, plus a compiled-AST cache for fast
//! reruns. [`Interpreter`] owns the host behind a readiness state machine
//!
//! ```text
//! Uninitialized -> Loading -> Ready
//!                          \-> Failed
//! ```
//!
//! published on a `tokio::sync::watch` channel so any number of callers can
//! await the same in-flight load.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use rhai::{Dynamic, Engine, AST};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::watch;

use crate::capture::{convert_calls, register_capture_api, CapturedArtifacts, CapturedCall, FrameContext, SessionGuard};
use crate::config::RunnerConfig;
use crate::script_diagnostics::{from_eval_error, from_parse_error, panic_message, ScriptDiagnostic};
use crate::script_log::{register_log_api, stringify_dynamic, LogEntry, LOG_PRELUDE};

/// Compiled scripts kept for fast-path reruns.
const MAX_CACHED_ASTS: usize = 64;

/// Everything one execution produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The script's final value (if not unit), or the diagnostic it failed with.
    pub value: Result<Option<String>, ScriptDiagnostic>,
    pub calls: Vec<CapturedCall>,
    pub artifacts: CapturedArtifacts,
    pub logs: Vec<LogEntry>,
}

/// Sandboxed Rhai engine with the frame scripting API.
pub struct ScriptHost {
    engine: Engine,
    /// Number of prelude lines before the user script.
    user_line_offset: usize,
    ast_cache: Mutex<HashMap<[u8; 32], AST>>,
}

impl ScriptHost {
    /// Create a new script host with sandboxed settings.
    pub fn new(config: &RunnerConfig) -> Self {
        let mut engine = Engine::new();

        // Sandbox settings
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(config.max_call_levels);
        engine.set_max_operations(config.max_operations);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(500);

        register_log_api(&mut engine);
        register_capture_api(&mut engine);

        Self {
            engine,
            user_line_offset: LOG_PRELUDE.matches('\n').count(),
            ast_cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(code: &str) -> [u8; 32] {
        let digest = Sha256::digest(code.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        key
    }

    /// Compile user code behind the prelude.
    pub fn compile(&self, code: &str) -> Result<AST, ScriptDiagnostic> {
        let full_script = format!("{LOG_PRELUDE}{code}");
        self.engine
            .compile(&full_script)
            .map_err(|e| from_parse_error(&e, self.user_line_offset))
    }

    /// Compile, reusing the cached AST for identical code when `use_cache` is set.
    fn compile_cached(&self, code: &str, use_cache: bool) -> Result<AST, ScriptDiagnostic> {
        let key = Self::cache_key(code);
        if use_cache {
            if let Ok(cache) = self.ast_cache.lock() {
                if let Some(ast) = cache.get(&key) {
                    return Ok(ast.clone());
                }
            }
        }
        let ast = self.compile(code)?;
        if let Ok(mut cache) = self.ast_cache.lock() {
            if cache.len() >= MAX_CACHED_ASTS && !cache.contains_key(&key) {
                cache.clear();
            }
            cache.insert(key, ast.clone());
        }
        Ok(ast)
    }

    /// Number of compiled scripts currently cached.
    pub fn cached_scripts(&self) -> usize {
        self.ast_cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Syntax-check `code` without running it.
    pub fn check(&self, code: &str) -> Result<(), ScriptDiagnostic> {
        self.compile(code).map(|_| ())
    }

    /// Run `code` against a frame context and convert what it captured.
    ///
    /// Artifacts captured before an error are still returned.
    pub fn execute(&self, code: &str, context: FrameContext, fast_path: bool) -> RunOutcome {
        let frame = context
            .frame_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "detached script".to_string());
        if fast_path {
            log::debug!("Fast-path run for {}", frame);
        } else {
            log::info!(
                "Running script for {} ({} bytes, {} parameters)",
                frame,
                code.len(),
                context.parameters.len()
            );
        }

        let guard = SessionGuard::install(context.clone());
        let value = self.compile_cached(code, fast_path).and_then(|ast| {
            let mut scope = context.to_scope();
            self.engine
                .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
                .map(|v| (!v.is_unit()).then(|| stringify_dynamic(&v)))
                .map_err(|e| from_eval_error(&e, self.user_line_offset))
        });

        let (calls, mut warnings, logs) = match guard.finish() {
            Some(session) => session.into_parts(),
            None => (Vec::new(), Vec::new(), Vec::new()),
        };
        let mut artifacts = convert_calls(&calls, &context);
        warnings.append(&mut artifacts.warnings);
        artifacts.warnings = warnings;

        if let Err(diag) = &value {
            log::debug!("Script for {} failed: {}", frame, diag.message);
        }
        RunOutcome {
            value,
            calls,
            artifacts,
            logs,
        }
    }
}

/// Readiness of the shared interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpreterState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("interpreter did not become available within {0:?}")]
    Timeout(Duration),
    #[error("interpreter failed to load: {0}")]
    LoadFailed(String),
}

/// Source of the script host.
///
/// `is_available` is polled until it reports true (or the init timeout
/// passes); then `load` is called exactly once.
pub trait EngineLoader: Send + Sync + 'static {
    fn is_available(&self) -> bool;
    fn load(&self, config: &RunnerConfig) -> Result<ScriptHost, String>;
}

/// Loader for the built-in Rhai engine. Always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct RhaiLoader;

impl EngineLoader for RhaiLoader {
    fn is_available(&self) -> bool {
        true
    }

    fn load(&self, config: &RunnerConfig) -> Result<ScriptHost, String> {
        config.validate()?;
        Ok(ScriptHost::new(config))
    }
}

/// Owned interpreter resource with a visible state machine.
pub struct Interpreter {
    state: watch::Sender<InterpreterState>,
    host: OnceLock<Arc<ScriptHost>>,
    failure: Mutex<Option<InitError>>,
    loader: Arc<dyn EngineLoader>,
    config: RunnerConfig,
}

impl Interpreter {
    pub fn new(loader: Arc<dyn EngineLoader>, config: RunnerConfig) -> Arc<Self> {
        let (state, _) = watch::channel(InterpreterState::Uninitialized);
        Arc::new(Self {
            state,
            host: OnceLock::new(),
            failure: Mutex::new(None),
            loader,
            config,
        })
    }

    pub fn with_rhai(config: RunnerConfig) -> Arc<Self> {
        Self::new(Arc::new(RhaiLoader), config)
    }

    pub fn state(&self) -> InterpreterState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<InterpreterState> {
        self.state.subscribe()
    }

    /// The loaded host; `None` unless the state is `Ready`.
    pub fn host(&self) -> Option<Arc<ScriptHost>> {
        self.host.get().cloned()
    }

    /// The error that moved the interpreter to `Failed`.
    pub fn failure(&self) -> Option<InitError> {
        self.failure.lock().ok().and_then(|f| f.clone())
    }

    /// Start loading (first caller only) and wait until the interpreter is
    /// `Ready` or `Failed`.
    ///
    /// Idempotent: later and concurrent callers attach to the same load.
    /// The load runs on its own task, so dropping this future does not
    /// strand the state in `Loading`.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), InitError> {
        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if *state == InterpreterState::Uninitialized {
                *state = InterpreterState::Loading;
                claimed = true;
                true
            } else {
                false
            }
        });
        if claimed {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.load().await });
        }

        match self.wait_settled().await {
            InterpreterState::Ready => Ok(()),
            _ => Err(self
                .failure()
                .unwrap_or_else(|| InitError::LoadFailed("unknown failure".to_string()))),
        }
    }

    /// Wait until the state is `Ready` or `Failed` and return it.
    pub async fn wait_settled(&self) -> InterpreterState {
        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(|s| matches!(s, InterpreterState::Ready | InterpreterState::Failed))
            .await
            .map(|state| *state);
        settled.unwrap_or(InterpreterState::Failed)
    }

    async fn load(&self) {
        log::info!("Initializing script interpreter");
        let timeout = self.config.init_timeout();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match catch_unwind(AssertUnwindSafe(|| self.loader.is_available())) {
                Ok(true) => break,
                Ok(false) => {}
                Err(payload) => {
                    let message = format!("availability check panicked: {}", panic_message(payload.as_ref()));
                    log::error!("Script interpreter failed to load: {}", message);
                    self.fail(InitError::LoadFailed(message));
                    return;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                log::error!("Script interpreter not available after {:?}; giving up", timeout);
                self.fail(InitError::Timeout(timeout));
                return;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }

        let loaded = catch_unwind(AssertUnwindSafe(|| self.loader.load(&self.config)))
            .unwrap_or_else(|payload| Err(format!("loader panicked: {}", panic_message(payload.as_ref()))));
        match loaded {
            Ok(host) => {
                let _ = self.host.set(Arc::new(host));
                self.state.send_replace(InterpreterState::Ready);
                log::info!("Script interpreter ready");
            }
            Err(message) => {
                log::error!("Script interpreter failed to load: {}", message);
                self.fail(InitError::LoadFailed(message));
            }
        }
    }

    fn fail(&self, error: InitError) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(error);
        }
        self.state.send_replace(InterpreterState::Failed);
    }
}
