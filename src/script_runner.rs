//! Serialized script execution.
//!
//! All runs go through one FIFO queue drained by a single worker task, so
//! at most one script executes at any time and results complete in
//! submission order. Each run happens on a blocking thread with its own
//! capture session (see [`crate::capture`]).

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::Instant;

use crate::capture::{CapturedCall, FrameContext};
use crate::config::RunnerConfig;
use crate::frame::{FrameId, FunctionPlot, UserVector};
use crate::interpreter::{InitError, Interpreter, InterpreterState, RunOutcome};
use crate::script_diagnostics::{panic_message, ScriptDiagnostic, ScriptDiagnosticKind, ScriptLocation};
use crate::script_log::LogEntry;

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Reuse the compiled script and log at debug level (slider reruns).
    pub fast_path: bool,
    /// Keep the frame's earlier artifacts instead of replacing them.
    pub append: bool,
}

impl RunOptions {
    pub fn fast() -> Self {
        Self {
            fast_path: true,
            append: false,
        }
    }
}

/// Artifact notification sent while results are delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactEvent {
    VectorCreated { frame_id: Option<FrameId>, vector: UserVector },
    PlotCreated { frame_id: Option<FrameId>, plot: FunctionPlot },
}

/// One queued script run.
#[derive(Debug)]
pub struct RunRequest {
    pub code: String,
    pub frame_id: Option<FrameId>,
    pub context: FrameContext,
    pub fast_path: bool,
    pub artifacts: Option<mpsc::UnboundedSender<ArtifactEvent>>,
}

impl RunRequest {
    pub fn new(code: impl Into<String>, context: FrameContext) -> Self {
        Self {
            code: code.into(),
            frame_id: context.frame_id,
            context,
            fast_path: false,
            artifacts: None,
        }
    }

    pub fn fast_path(mut self, fast_path: bool) -> Self {
        self.fast_path = fast_path;
        self
    }

    pub fn with_artifact_channel(mut self, tx: mpsc::UnboundedSender<ArtifactEvent>) -> Self {
        self.artifacts = Some(tx);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScriptErrorKind {
    /// The interpreter is not initialized, or failed to initialize.
    #[serde(rename = "NotReadyError")]
    NotReady,
    /// The script failed (parse, runtime, sandbox limit or host panic).
    #[serde(rename = "ExecutionError")]
    Execution,
    #[serde(rename = "InitTimeoutError")]
    InitTimeout,
    /// Removed from the queue before it started.
    #[serde(rename = "CancelledError")]
    Cancelled,
    #[serde(rename = "UnknownFrameError")]
    UnknownFrame,
    #[serde(rename = "LoadFailedError")]
    LoadFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
    /// Script-level error type, e.g. `RuntimeError` or a thrown map's `type`.
    pub error_type: Option<String>,
    pub diagnostic: Option<ScriptDiagnosticKind>,
    pub traceback: Vec<String>,
    pub location: Option<ScriptLocation>,
}

impl ScriptError {
    pub fn new(kind: ScriptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            error_type: None,
            diagnostic: None,
            traceback: Vec::new(),
            location: None,
        }
    }

    pub fn from_init(error: &InitError) -> Self {
        let kind = match error {
            InitError::Timeout(_) => ScriptErrorKind::InitTimeout,
            InitError::LoadFailed(_) => ScriptErrorKind::LoadFailed,
        };
        Self::new(kind, error.to_string())
    }
}

impl From<ScriptDiagnostic> for ScriptError {
    fn from(diag: ScriptDiagnostic) -> Self {
        Self {
            kind: ScriptErrorKind::Execution,
            message: diag.message,
            error_type: Some(diag.error_type),
            diagnostic: Some(diag.kind),
            traceback: diag.traceback,
            location: diag.location,
        }
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} (line {}, column {})", self.message, loc.line, loc.column),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Outcome of one run. Artifacts captured before an error are kept.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub error: Option<ScriptError>,
    /// Final script value, if not unit.
    pub result: Option<String>,
    pub frame_id: Option<FrameId>,
    pub captured_calls: Vec<CapturedCall>,
    pub vectors: Vec<UserVector>,
    pub plots: Vec<FunctionPlot>,
    pub warnings: Vec<String>,
    pub logs: Vec<LogEntry>,
    /// Submission order.
    pub sequence: u64,
    /// Execution order; `None` for runs that never executed.
    pub completion_index: Option<u64>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Result for a run that did not execute.
    pub fn failed(frame_id: Option<FrameId>, sequence: u64, error: ScriptError) -> Self {
        Self {
            success: false,
            error: Some(error),
            result: None,
            frame_id,
            captured_calls: Vec::new(),
            vectors: Vec::new(),
            plots: Vec::new(),
            warnings: Vec::new(),
            logs: Vec::new(),
            sequence,
            completion_index: None,
            completed_at: Utc::now(),
        }
    }

    fn from_outcome(frame_id: Option<FrameId>, sequence: u64, completion_index: u64, outcome: RunOutcome) -> Self {
        let (success, error, result) = match outcome.value {
            Ok(value) => (true, None, value),
            Err(diag) => (false, Some(ScriptError::from(diag)), None),
        };
        Self {
            success,
            error,
            result,
            frame_id,
            captured_calls: outcome.calls,
            vectors: outcome.artifacts.vectors,
            plots: outcome.artifacts.plots,
            warnings: outcome.artifacts.warnings,
            logs: outcome.logs,
            sequence,
            completion_index: Some(completion_index),
            completed_at: Utc::now(),
        }
    }

    pub fn error_kind(&self) -> Option<ScriptErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

enum TicketState {
    Ready(Option<ExecutionResult>),
    Pending(oneshot::Receiver<ExecutionResult>),
}

/// Resolves to the [`ExecutionResult`] of a submitted run.
///
/// Never fails: if the runner goes away before the run completes the
/// ticket resolves as `Cancelled`.
pub struct RunTicket {
    frame_id: Option<FrameId>,
    sequence: u64,
    state: TicketState,
}

impl RunTicket {
    fn ready(result: ExecutionResult) -> Self {
        Self {
            frame_id: result.frame_id,
            sequence: result.sequence,
            state: TicketState::Ready(Some(result)),
        }
    }

    /// Ticket that is already resolved as a failure.
    pub fn rejected(frame_id: Option<FrameId>, error: ScriptError) -> Self {
        Self::ready(ExecutionResult::failed(frame_id, 0, error))
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn frame_id(&self) -> Option<FrameId> {
        self.frame_id
    }
}

impl Future for RunTicket {
    type Output = ExecutionResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            TicketState::Ready(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                None => Poll::Ready(ExecutionResult::failed(
                    this.frame_id,
                    this.sequence,
                    ScriptError::new(ScriptErrorKind::Cancelled, "ticket polled after completion"),
                )),
            },
            TicketState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(ExecutionResult::failed(
                    this.frame_id,
                    this.sequence,
                    ScriptError::new(ScriptErrorKind::Cancelled, "script runner shut down"),
                )),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

struct Job {
    request: RunRequest,
    sequence: u64,
    reply: oneshot::Sender<ExecutionResult>,
}

impl Job {
    fn resolve(self, error: ScriptError) {
        let result = ExecutionResult::failed(self.request.frame_id, self.sequence, error);
        let _ = self.reply.send(result);
    }
}

struct RunnerInner {
    interpreter: Arc<Interpreter>,
    config: RunnerConfig,
    queue: Mutex<VecDeque<Job>>,
    notify: Notify,
    next_sequence: AtomicU64,
    completions: AtomicU64,
    shutdown: AtomicBool,
}

impl RunnerInner {
    fn queue(&self) -> MutexGuard<'_, VecDeque<Job>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fail_all(&self, error: &ScriptError) -> usize {
        let jobs: Vec<Job> = self.queue().drain(..).collect();
        let count = jobs.len();
        for job in jobs {
            job.resolve(error.clone());
        }
        count
    }
}

/// Stops the worker when the last runner handle is dropped.
struct WorkerHandle {
    inner: Arc<RunnerInner>,
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }
}

/// Handle to the serialized execution queue. Cheap to clone.
#[derive(Clone)]
pub struct ScriptRunner {
    inner: Arc<RunnerInner>,
    _worker: Arc<WorkerHandle>,
}

impl ScriptRunner {
    /// Start the worker. Must be called within a Tokio runtime.
    pub fn spawn(interpreter: Arc<Interpreter>, config: RunnerConfig) -> Self {
        let inner = Arc::new(RunnerInner {
            interpreter,
            config,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            next_sequence: AtomicU64::new(0),
            completions: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        });
        tokio::spawn(worker_loop(Arc::clone(&inner)));
        Self {
            _worker: Arc::new(WorkerHandle {
                inner: Arc::clone(&inner),
            }),
            inner,
        }
    }

    pub fn interpreter(&self) -> &Arc<Interpreter> {
        &self.inner.interpreter
    }

    /// Queue a run.
    ///
    /// Resolves immediately with `NotReady` if the interpreter was never
    /// initialized or has failed; runs submitted while it is loading wait
    /// for it.
    pub fn submit(&self, request: RunRequest) -> RunTicket {
        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);
        let frame_id = request.frame_id;

        let rejection = if self.inner.shutdown.load(Ordering::SeqCst) {
            Some(ScriptError::new(ScriptErrorKind::Cancelled, "script runner shut down"))
        } else {
            match self.inner.interpreter.state() {
                InterpreterState::Uninitialized => Some(ScriptError::new(
                    ScriptErrorKind::NotReady,
                    "script interpreter has not been initialized",
                )),
                InterpreterState::Failed => Some(not_ready_after_failure(&self.inner.interpreter)),
                InterpreterState::Loading | InterpreterState::Ready => None,
            }
        };
        if let Some(error) = rejection {
            log::debug!("Rejecting run #{}: {}", sequence, error.message);
            return RunTicket::ready(ExecutionResult::failed(frame_id, sequence, error));
        }

        let (reply, rx) = oneshot::channel();
        self.inner.queue().push_back(Job {
            request,
            sequence,
            reply,
        });
        self.inner.notify.notify_one();
        RunTicket {
            frame_id,
            sequence,
            state: TicketState::Pending(rx),
        }
    }

    /// Submit and wait for the result.
    pub async fn run(&self, request: RunRequest) -> ExecutionResult {
        self.submit(request).await
    }

    /// Remove every queued, not yet started run for `frame_id`. Their
    /// tickets resolve as `Cancelled`; a run already executing is kept.
    pub fn purge_frame(&self, frame_id: FrameId) -> usize {
        let purged: Vec<Job> = {
            let mut queue = self.inner.queue();
            let (purged, kept): (VecDeque<Job>, VecDeque<Job>) =
                queue.drain(..).partition(|job| job.request.frame_id == Some(frame_id));
            *queue = kept;
            purged.into_iter().collect()
        };
        let count = purged.len();
        for job in purged {
            job.resolve(ScriptError::new(
                ScriptErrorKind::Cancelled,
                format!("superseded run for {}", frame_id),
            ));
        }
        if count > 0 {
            log::debug!("Purged {} queued run(s) for {}", count, frame_id);
        }
        count
    }

    /// Number of queued, not yet started runs.
    pub fn pending(&self) -> usize {
        self.inner.queue().len()
    }

    /// Stop accepting runs. Queued runs resolve as `Cancelled`; a run in
    /// progress completes.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }
}

fn not_ready_after_failure(interpreter: &Interpreter) -> ScriptError {
    let reason = interpreter
        .failure()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "initialization failed".to_string());
    ScriptError::new(ScriptErrorKind::NotReady, format!("script interpreter unavailable: {}", reason))
}

async fn worker_loop(inner: Arc<RunnerInner>) {
    let mut last_completion: Option<Instant> = None;
    loop {
        // Wait for work.
        loop {
            if inner.shutdown.load(Ordering::SeqCst) {
                let cancelled = inner.fail_all(&ScriptError::new(ScriptErrorKind::Cancelled, "script runner shut down"));
                log::debug!("Script runner stopped ({} queued run(s) cancelled)", cancelled);
                return;
            }
            if !inner.queue().is_empty() {
                break;
            }
            inner.notify.notified().await;
        }

        if inner.interpreter.wait_settled().await != InterpreterState::Ready {
            let error = not_ready_after_failure(&inner.interpreter);
            let failed = inner.fail_all(&error);
            log::warn!("Failed {} queued run(s): {}", failed, error.message);
            continue;
        }

        if let Some(last) = last_completion {
            tokio::time::sleep_until(last + inner.config.min_delay()).await;
        }

        // The queue may have been purged while waiting.
        let Some(job) = inner.queue().pop_front() else {
            continue;
        };

        let Some(host) = inner.interpreter.host() else {
            job.resolve(not_ready_after_failure(&inner.interpreter));
            continue;
        };

        let Job {
            request,
            sequence,
            reply,
        } = job;
        let RunRequest {
            code,
            frame_id,
            context,
            fast_path,
            artifacts,
        } = request;

        let joined = tokio::task::spawn_blocking(move || host.execute(&code, context, fast_path)).await;
        let completion_index = inner.completions.fetch_add(1, Ordering::SeqCst);
        let result = match joined {
            Ok(outcome) => ExecutionResult::from_outcome(frame_id, sequence, completion_index, outcome),
            Err(e) => {
                let message = if e.is_panic() {
                    format!("script host panicked: {}", panic_message(e.into_panic().as_ref()))
                } else {
                    "script run was aborted".to_string()
                };
                log::error!("Run #{} failed: {}", sequence, message);
                let mut result =
                    ExecutionResult::failed(frame_id, sequence, ScriptError::new(ScriptErrorKind::Execution, message));
                result.completion_index = Some(completion_index);
                result
            }
        };

        if let Some(tx) = artifacts {
            for vector in &result.vectors {
                let _ = tx.send(ArtifactEvent::VectorCreated {
                    frame_id,
                    vector: vector.clone(),
                });
            }
            for plot in &result.plots {
                let _ = tx.send(ArtifactEvent::PlotCreated {
                    frame_id,
                    plot: plot.clone(),
                });
            }
        }

        log::debug!(
            "Run #{} finished (success={}, {} vectors, {} plots)",
            sequence,
            result.success,
            result.vectors.len(),
            result.plots.len()
        );
        let _ = reply.send(result);
        last_completion = Some(Instant::now());
    }
}
