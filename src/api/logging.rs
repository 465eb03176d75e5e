use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

const DEFAULT_LOG_PATH: &str = "/tmp/ragline-debug.log";
const DEBUG_STREAM_ENV: &str = "RAGLINE_DEBUG_STREAM";
const LOG_PATH_ENV: &str = "RAGLINE_LOG_PATH";

pub fn debug_stream_enabled() -> bool {
    std::env::var(DEBUG_STREAM_ENV)
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

pub fn emit_request_debug(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message =
        format!("RAGLINE DEBUG request url={request_url}\npayload:\n{formatted_payload}\n");
    emit_log_message(&message);
}

/// Records a malformed event payload. Decode failures are swallowed by the
/// dispatcher, so this log is the only trace they leave.
pub fn emit_decode_failure(event_kind: &str, data: &str, parse_error: &serde_json::Error) {
    if !debug_stream_enabled() {
        return;
    }
    let message = format!(
        "RAGLINE ERROR event_decode_failed error={parse_error}\nevent_type={}\ndata:\n{data}\n",
        if event_kind.is_empty() { "<none>" } else { event_kind }
    );
    emit_log_message(&message);
}

fn emit_log_message(message: &str) {
    if let Some(path) = resolve_log_path() {
        if append_log_file(&path, message).is_ok() {
            return;
        }
    }

    eprintln!("{message}");
}

fn resolve_log_path() -> Option<String> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}
