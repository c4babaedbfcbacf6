//! Queue ordering, purge and interpreter readiness through the public API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use frameboard::capture::FrameContext;
use frameboard::config::RunnerConfig;
use frameboard::frame::FrameId;
use frameboard::interpreter::{EngineLoader, InitError, Interpreter, InterpreterState, ScriptHost};
use frameboard::script_runner::{RunRequest, ScriptErrorKind, ScriptRunner};

/// Loader that stays unavailable until opened.
struct GatedLoader {
    open: AtomicBool,
}

impl GatedLoader {
    fn closed() -> Arc<Self> {
        Arc::new(Self {
            open: AtomicBool::new(false),
        })
    }
}

impl EngineLoader for GatedLoader {
    fn is_available(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn load(&self, config: &RunnerConfig) -> Result<ScriptHost, String> {
        Ok(ScriptHost::new(config))
    }
}

fn fast_polling() -> RunnerConfig {
    RunnerConfig {
        poll_interval_ms: 2,
        ..Default::default()
    }
}

fn request(frame: u64, code: &str) -> RunRequest {
    RunRequest::new(
        code,
        FrameContext {
            frame_id: Some(FrameId(frame)),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_runs_complete_in_submission_order_and_purge_cancels() {
    let loader = GatedLoader::closed();
    let config = fast_polling();
    let interpreter = Interpreter::new(loader.clone(), config.clone());
    let runner = ScriptRunner::spawn(Arc::clone(&interpreter), config);

    let init = tokio::spawn({
        let interpreter = Arc::clone(&interpreter);
        async move { interpreter.initialize().await }
    });
    while interpreter.state() != InterpreterState::Loading {
        tokio::task::yield_now().await;
    }

    let a = runner.submit(request(1, "draw([1, 0]); \"a\""));
    let b = runner.submit(request(2, "draw([2, 0]); \"b\""));
    let c = runner.submit(request(1, "draw([3, 0]); \"c\""));
    let d = runner.submit(request(2, "draw([4, 0]); \"d\""));
    assert_eq!(runner.pending(), 4);

    assert_eq!(runner.purge_frame(FrameId(2)), 2);
    assert_eq!(runner.pending(), 2);

    loader.open.store(true, Ordering::SeqCst);
    init.await.unwrap().unwrap();

    let (a, b, c, d) = tokio::join!(a, b, c, d);
    assert_eq!(b.error_kind(), Some(ScriptErrorKind::Cancelled));
    assert_eq!(d.error_kind(), Some(ScriptErrorKind::Cancelled));
    assert!(b.vectors.is_empty() && d.vectors.is_empty());

    assert!(a.success && c.success);
    assert_eq!(a.result.as_deref(), Some("a"));
    assert_eq!(c.result.as_deref(), Some("c"));
    assert!(a.sequence < c.sequence);
    assert_eq!(a.completion_index, Some(0));
    assert_eq!(c.completion_index, Some(1));
    assert!(a.completed_at <= c.completed_at);
}

#[tokio::test]
async fn test_many_runs_keep_fifo_order() {
    let config = RunnerConfig::default();
    let interpreter = Interpreter::with_rhai(config.clone());
    interpreter.initialize().await.unwrap();
    let runner = ScriptRunner::spawn(interpreter, config);

    let tickets: Vec<_> = (0..20)
        .map(|i| runner.submit(request(i % 3, &format!("draw([{i}, 1]); {i}"))))
        .collect();
    let mut completions = Vec::new();
    for (i, ticket) in tickets.into_iter().enumerate() {
        let result = ticket.await;
        assert!(result.success);
        assert_eq!(result.result, Some(i.to_string()));
        completions.push(result.completion_index.unwrap());
    }
    let mut sorted = completions.clone();
    sorted.sort_unstable();
    assert_eq!(completions, sorted);
}

#[tokio::test]
async fn test_not_ready_before_initialization() {
    let config = RunnerConfig::default();
    let interpreter = Interpreter::with_rhai(config.clone());
    let runner = ScriptRunner::spawn(Arc::clone(&interpreter), config);

    let result = runner.run(request(1, "draw([1, 1]);")).await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ScriptErrorKind::NotReady));
    assert_eq!(result.completion_index, None);
    assert_eq!(interpreter.state(), InterpreterState::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn test_init_timeout_fails_queued_and_later_runs() {
    let loader = GatedLoader::closed();
    let config = RunnerConfig {
        init_timeout_ms: 1_000,
        ..Default::default()
    };
    let interpreter = Interpreter::new(loader, config.clone());
    let runner = ScriptRunner::spawn(Arc::clone(&interpreter), config);

    let init = tokio::spawn({
        let interpreter = Arc::clone(&interpreter);
        async move { interpreter.initialize().await }
    });
    while interpreter.state() != InterpreterState::Loading {
        tokio::task::yield_now().await;
    }
    let queued = runner.submit(request(1, "draw([1, 1]);"));

    let err = init.await.unwrap().unwrap_err();
    assert_eq!(err, InitError::Timeout(Duration::from_secs(1)));
    assert_eq!(interpreter.state(), InterpreterState::Failed);

    let queued = queued.await;
    assert_eq!(queued.error_kind(), Some(ScriptErrorKind::NotReady));

    let later = runner.run(request(1, "draw([1, 1]);")).await;
    assert_eq!(later.error_kind(), Some(ScriptErrorKind::NotReady));
    assert!(later.error.unwrap().message.contains("did not become available"));
}

#[tokio::test]
async fn test_purge_leaves_executing_run_alone() {
    let config = RunnerConfig {
        max_operations: 50_000_000,
        ..Default::default()
    };
    let interpreter = Interpreter::with_rhai(config.clone());
    interpreter.initialize().await.unwrap();
    let runner = ScriptRunner::spawn(interpreter, config);

    let slow = runner.submit(request(
        1,
        "draw([1, 0]); let n = 0; while n < 300000 { n += 1; } draw([0, 1]); n",
    ));
    while runner.pending() > 0 {
        tokio::task::yield_now().await;
    }

    // The slow run has left the queue and is executing.
    assert_eq!(runner.purge_frame(FrameId(1)), 0);
    let follower = runner.submit(request(1, "draw([5, 5]);"));
    let other = runner.submit(request(2, "draw([6, 6]); \"other\""));
    assert_eq!(runner.purge_frame(FrameId(1)), 1);
    assert_eq!(runner.pending(), 1);

    let follower = follower.await;
    assert_eq!(follower.error_kind(), Some(ScriptErrorKind::Cancelled));
    assert!(follower.vectors.is_empty());

    let slow = slow.await;
    assert!(slow.success, "{:?}", slow.error);
    assert_eq!(slow.result.as_deref(), Some("300000"));
    assert_eq!(slow.vectors.len(), 2);
    assert_eq!(slow.completion_index, Some(0));

    let other = other.await;
    assert!(other.success);
    assert_eq!(other.completion_index, Some(1));
}
