//! Structured script diagnostics.
//!
//! Rhai provides rich error types (parse + runtime) with positions. These are
//! wrapped into a stable, JSON-serializable diagnostic that callers can
//! surface without access to Rust logs.
//!
//! Thrown values come in many shapes (`throw "text"`, `throw #{message: ..}`,
//! `throw #{args: [..]}`, arbitrary values). The human-readable message is
//! picked by [`EXTRACTION_STRATEGIES`], tried in order; first match wins.

use std::any::Any;

use rhai::{Dynamic, EvalAltResult, Map};
use serde::Serialize;

use crate::script_log::stringify_dynamic;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDiagnosticKind {
    /// Syntax/parse errors (compile time).
    ParseError,
    /// Runtime errors in user code, including explicit `throw`.
    RuntimeError,
    /// Script attempted to use the host API incorrectly (missing members, wrong types, etc).
    HostApiMisuse,
    /// Sandbox limit hit (operations, call depth, data size).
    LimitExceeded,
    /// Internal/host error (e.g. the injected prelude failed, or a panic).
    HostError,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ScriptLocation {
    /// 1-based line number in the user script (not the injected prelude).
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDiagnostic {
    pub kind: ScriptDiagnosticKind,
    pub message: String,
    /// Engine error variant, or the `type` field of a thrown map.
    pub error_type: String,
    pub location: Option<ScriptLocation>,
    /// Call stack, outermost call first, ending with the root error.
    pub traceback: Vec<String>,
    /// Raw engine error string (useful for bug reports).
    pub raw: String,
}

/// What the extraction strategies look at.
#[derive(Debug, Clone, Copy)]
pub struct ErrorSource<'a> {
    /// The thrown value, for `throw` errors.
    pub payload: Option<&'a Dynamic>,
    /// Textual traceback, one entry per line.
    pub traceback: &'a str,
}

pub type ExtractionStrategy = fn(&ErrorSource<'_>) -> Option<String>;

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn string_payload(source: &ErrorSource<'_>) -> Option<String> {
    let payload = source.payload?;
    if payload.is_string() {
        return non_empty(stringify_dynamic(payload));
    }
    None
}

fn message_field(source: &ErrorSource<'_>) -> Option<String> {
    let map = source.payload?.read_lock::<Map>()?;
    map.get("message").map(stringify_dynamic).and_then(non_empty)
}

fn first_arg(source: &ErrorSource<'_>) -> Option<String> {
    let map = source.payload?.read_lock::<Map>()?;
    let args = map.get("args")?.read_lock::<rhai::Array>()?;
    args.first().map(stringify_dynamic).and_then(non_empty)
}

fn stringified_payload(source: &ErrorSource<'_>) -> Option<String> {
    let payload = source.payload?;
    if payload.is_unit() {
        return None;
    }
    non_empty(stringify_dynamic(payload))
}

fn is_stack_frame(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("at ") || line.starts_with("in call to function") || line.starts_with("in closure")
}

fn traceback_line(source: &ErrorSource<'_>) -> Option<String> {
    source
        .traceback
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty() && !is_stack_frame(line))
        .map(str::to_string)
}

/// Message extraction strategies in priority order.
pub const EXTRACTION_STRATEGIES: &[(&str, ExtractionStrategy)] = &[
    ("string_payload", string_payload),
    ("message_field", message_field),
    ("first_arg", first_arg),
    ("stringified_payload", stringified_payload),
    ("traceback_line", traceback_line),
];

/// Run the strategies in order and return the first message found.
pub fn extract_message(source: &ErrorSource<'_>) -> String {
    EXTRACTION_STRATEGIES
        .iter()
        .find_map(|(_, strategy)| strategy(source))
        .unwrap_or_else(|| "Unknown script error".to_string())
}

fn map_position_to_user(line: u32, column: u32, user_line_offset: usize) -> Option<ScriptLocation> {
    let offset = user_line_offset as u32;
    if line == 0 || line <= offset {
        return None;
    }
    Some(ScriptLocation {
        line: line - offset,
        column: column.max(1),
    })
}

fn location_of(pos: rhai::Position, user_line_offset: usize) -> Option<ScriptLocation> {
    let line = pos.line().unwrap_or(0) as u32;
    let column = pos.position().unwrap_or(0) as u32;
    map_position_to_user(line, column, user_line_offset)
}

fn describe_position(pos: rhai::Position, user_line_offset: usize) -> String {
    match location_of(pos, user_line_offset) {
        Some(loc) => format!("line {}, column {}", loc.line, loc.column),
        None => "prelude".to_string(),
    }
}

pub fn from_parse_error(err: &rhai::ParseError, user_line_offset: usize) -> ScriptDiagnostic {
    let raw = err.to_string();
    let message = err.err_type().to_string();
    let location = location_of(err.position(), user_line_offset);
    ScriptDiagnostic {
        kind: ScriptDiagnosticKind::ParseError,
        message: message.clone(),
        error_type: "ParseError".to_string(),
        location,
        traceback: vec![message],
        raw,
    }
}

/// Engine error variant name and coarse kind.
fn classify(err: &EvalAltResult) -> (&'static str, ScriptDiagnosticKind) {
    use ScriptDiagnosticKind::*;
    match err {
        EvalAltResult::ErrorRuntime(..) => ("RuntimeError", RuntimeError),
        EvalAltResult::ErrorParsing(..) => ("ParseError", ParseError),
        EvalAltResult::ErrorVariableNotFound(..) => ("VariableNotFound", HostApiMisuse),
        EvalAltResult::ErrorPropertyNotFound(..) => ("PropertyNotFound", HostApiMisuse),
        EvalAltResult::ErrorFunctionNotFound(..) => ("FunctionNotFound", HostApiMisuse),
        EvalAltResult::ErrorIndexNotFound(..) | EvalAltResult::ErrorArrayBounds(..) => ("IndexError", HostApiMisuse),
        EvalAltResult::ErrorMismatchDataType(..) | EvalAltResult::ErrorMismatchOutputType(..) => {
            ("TypeMismatch", HostApiMisuse)
        }
        EvalAltResult::ErrorAssignmentToConstant(..) => ("AssignmentToConstant", HostApiMisuse),
        EvalAltResult::ErrorArithmetic(..) => ("ArithmeticError", RuntimeError),
        EvalAltResult::ErrorTooManyOperations(..) => ("TooManyOperations", LimitExceeded),
        EvalAltResult::ErrorStackOverflow(..) => ("StackOverflow", LimitExceeded),
        EvalAltResult::ErrorDataTooLarge(..) => ("DataTooLarge", LimitExceeded),
        EvalAltResult::ErrorTerminated(..) => ("Terminated", LimitExceeded),
        _ => ("EvalError", RuntimeError),
    }
}

pub fn from_eval_error(err: &EvalAltResult, user_line_offset: usize) -> ScriptDiagnostic {
    // Unwind nested function calls down to the root error.
    let mut traceback = Vec::new();
    let mut root = err;
    while let EvalAltResult::ErrorInFunctionCall(name, _source, inner, pos) = root {
        let frame = if name.starts_with("anon$") {
            "in closure".to_string()
        } else {
            format!("in call to function '{}'", name)
        };
        traceback.push(format!("{} ({})", frame, describe_position(*pos, user_line_offset)));
        root = inner.as_ref();
    }

    let payload = match root {
        EvalAltResult::ErrorRuntime(value, _) => Some(value),
        _ => None,
    };
    let root_text = match payload {
        Some(value) => stringify_dynamic(value),
        None => root.to_string(),
    };
    traceback.push(root_text);
    let text = traceback.join("\n");

    let message = extract_message(&ErrorSource {
        payload,
        traceback: &text,
    });

    let (variant, kind) = classify(root);
    let error_type = payload
        .and_then(|p| p.read_lock::<Map>().and_then(|m| m.get("type").map(stringify_dynamic)))
        .unwrap_or_else(|| variant.to_string());

    ScriptDiagnostic {
        kind,
        message,
        error_type,
        location: location_of(root.position(), user_line_offset)
            .or_else(|| location_of(err.position(), user_line_offset)),
        traceback,
        raw: err.to_string(),
    }
}

/// Readable text from a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "script host panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_err(code: &str) -> Box<EvalAltResult> {
        rhai::Engine::new().run(code).unwrap_err()
    }

    #[test]
    fn test_string_throw() {
        let diag = from_eval_error(&eval_err(r#"throw "boom";"#), 0);
        assert_eq!(diag.message, "boom");
        assert_eq!(diag.error_type, "RuntimeError");
        assert_eq!(diag.kind, ScriptDiagnosticKind::RuntimeError);
        assert_eq!(diag.location.map(|l| l.line), Some(1));
    }

    #[test]
    fn test_map_message_and_type() {
        let diag = from_eval_error(&eval_err(r#"throw #{message: "bad input", type: "ValueError"};"#), 0);
        assert_eq!(diag.message, "bad input");
        assert_eq!(diag.error_type, "ValueError");
    }

    #[test]
    fn test_args_first_element() {
        let diag = from_eval_error(&eval_err(r#"throw #{args: ["first", "second"]};"#), 0);
        assert_eq!(diag.message, "first");
    }

    #[test]
    fn test_other_payload_is_stringified() {
        let diag = from_eval_error(&eval_err("throw 42;"), 0);
        assert_eq!(diag.message, "42");
    }

    #[test]
    fn test_traceback_through_functions() {
        let code = "fn inner() { throw \"deep\"; }\nfn outer() { inner() }\nouter();";
        let diag = from_eval_error(&eval_err(code), 0);
        assert_eq!(diag.message, "deep");
        assert!(diag.traceback.len() >= 3);
        assert!(diag.traceback[0].contains("outer"));
        assert_eq!(diag.traceback.last().map(String::as_str), Some("deep"));
    }

    #[test]
    fn test_non_throw_error_uses_traceback_line() {
        let diag = from_eval_error(&eval_err("let a = undefined_var + 1;"), 0);
        assert_eq!(diag.error_type, "VariableNotFound");
        assert_eq!(diag.kind, ScriptDiagnosticKind::HostApiMisuse);
        assert!(diag.message.contains("undefined_var"));
    }

    #[test]
    fn test_strategy_order() {
        let text = "in call to function 'f' (line 1, column 1)\nreal problem\n";
        let source = ErrorSource {
            payload: None,
            traceback: text,
        };
        assert_eq!(extract_message(&source), "real problem");

        let unit = Dynamic::UNIT;
        let source = ErrorSource {
            payload: Some(&unit),
            traceback: "",
        };
        assert_eq!(extract_message(&source), "Unknown script error");
    }

    #[test]
    fn test_prelude_offset() {
        let err = eval_err("let a = 1;\nlet b = 2;\nthrow \"x\";");
        let diag = from_eval_error(&err, 2);
        assert_eq!(diag.location.map(|l| l.line), Some(1));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("kaput");
        assert_eq!(panic_message(payload.as_ref()), "kaput");
    }
}
