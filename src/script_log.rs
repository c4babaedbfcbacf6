//! Script logging for Rhai scripts.
//!
//! Provides a `log` global object to scripts with `info`, `warn`, and `error`
//! methods, and routes `print`/`debug` output the same way. Messages go to
//! the `log` facade under the `script` target and are also recorded on the
//! active capture session so they come back with the run result.

use std::cell::Cell;

use rhai::{Dynamic, Engine};
use serde::Serialize;

use crate::capture;

/// Maximum number of log messages allowed per run to prevent spam.
pub const MAX_LOGS_PER_RUN: u32 = 100;

thread_local! {
    static LOG_COUNT: Cell<u32> = const { Cell::new(0) };
    static WARNED_LIMIT: Cell<bool> = const { Cell::new(false) };
}

/// Log level for script messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_log_level(&self) -> log::Level {
        match self {
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// One message emitted by a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Reset the per-run log counter. Called by the capture session on install.
pub fn reset_run_log_count() {
    LOG_COUNT.with(|c| c.set(0));
    WARNED_LIMIT.with(|w| w.set(false));
}

/// Check if we can log another message this run.
fn can_log() -> bool {
    let count = LOG_COUNT.with(|c| {
        let n = c.get();
        c.set(n.saturating_add(1));
        n
    });
    if count < MAX_LOGS_PER_RUN {
        return true;
    }
    // Only warn once per run about exceeding the limit
    if !WARNED_LIMIT.with(|w| w.replace(true)) {
        emit_log(
            LogLevel::Warn,
            &format!(
                "Script log limit exceeded ({} messages/run). Further logs dropped.",
                MAX_LOGS_PER_RUN
            ),
        );
    }
    false
}

/// Emit a log message at the given level.
pub fn emit_log(level: LogLevel, message: &str) {
    log::log!(target: "script", level.as_log_level(), "{}", message);
    capture::with_session(|session| session.record_log(level, message));
}

/// Log a message from a script, respecting the per-run limit.
pub fn script_log(level: LogLevel, message: &str) {
    if can_log() {
        emit_log(level, message);
    }
}

/// Convert a Rhai Dynamic value to a string safely.
/// Never panics, handles all types gracefully.
pub fn stringify_dynamic(value: &Dynamic) -> String {
    if let Ok(s) = value.clone().into_string() {
        return s;
    }

    if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
        let parts: Vec<String> = arr.iter().map(stringify_dynamic).collect();
        return format!("[{}]", parts.join(", "));
    }

    if let Some(map) = value.clone().try_cast::<rhai::Map>() {
        let parts: Vec<String> = map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, stringify_dynamic(v)))
            .collect();
        return format!("{{{}}}", parts.join(", "));
    }

    if let Ok(i) = value.as_int() {
        return i.to_string();
    }
    if let Ok(f) = value.as_float() {
        return format!("{}", f);
    }
    if let Ok(b) = value.as_bool() {
        return b.to_string();
    }
    if value.is_unit() {
        return "()".to_string();
    }

    // Fallback: debug format
    format!("{:?}", value)
}

/// Register the `__log_*` host functions and route `print`/`debug`.
///
/// The `log` object itself is defined in the script prelude on top of these.
pub fn register_log_api(engine: &mut Engine) {
    engine
        .register_fn("__log_info", |value: Dynamic| {
            script_log(LogLevel::Info, &stringify_dynamic(&value));
        })
        .register_fn("__log_warn", |value: Dynamic| {
            script_log(LogLevel::Warn, &stringify_dynamic(&value));
        })
        .register_fn("__log_error", |value: Dynamic| {
            script_log(LogLevel::Error, &stringify_dynamic(&value));
        });

    engine.on_print(|text| script_log(LogLevel::Info, text));
    engine.on_debug(|text, _source, pos| {
        log::debug!(target: "script", "{:?} {}", pos, text);
    });
}

/// Prelude lines defining the `log` object.
pub const LOG_PRELUDE: &str = r#"let log = #{};
log.info = |msg| { __log_info(msg); };
log.warn = |msg| { __log_warn(msg); };
log.error = |msg| { __log_error(msg); };
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_scalars() {
        assert_eq!(stringify_dynamic(&Dynamic::from("hello")), "hello");
        assert_eq!(stringify_dynamic(&Dynamic::from(42_i64)), "42");
        assert_eq!(stringify_dynamic(&Dynamic::from(2.5_f64)), "2.5");
        assert_eq!(stringify_dynamic(&Dynamic::from(true)), "true");
        assert_eq!(stringify_dynamic(&Dynamic::UNIT), "()");
    }

    #[test]
    fn test_stringify_array() {
        let arr: rhai::Array = vec![Dynamic::from("x"), Dynamic::from(1.5_f64)];
        assert_eq!(stringify_dynamic(&Dynamic::from(arr)), "[x, 1.5]");
    }

    #[test]
    fn test_run_log_limit() {
        reset_run_log_count();
        for _ in 0..MAX_LOGS_PER_RUN {
            assert!(can_log());
        }
        assert!(!can_log());
        assert!(!can_log());

        reset_run_log_count();
        assert!(can_log());
    }

    #[test]
    fn test_log_prelude_compiles() {
        let mut engine = Engine::new();
        register_log_api(&mut engine);
        let script = format!("{}log.info(\"hi\"); log.warn(1); print(\"p\");", LOG_PRELUDE);
        engine.run(&script).unwrap();
    }
}
