use crate::api::logging::emit_decode_failure;
use serde::Deserialize;

/// Intent classification sent by the agent endpoint before routing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntentPayload {
    pub intent: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Per-candidate outcome from the evaluate flow. Either `evaluation` or
/// `error` is present, matching the backend's result rows.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CandidateResult {
    pub candidate_id: String,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The evaluator promises these keys but falls back to a raw-text
/// `reasoning` with `meets_requirements: null` when the model strays, so
/// everything except `reasoning` is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Evaluation {
    #[serde(default)]
    pub meets_requirements: Option<bool>,
    pub reasoning: String,
    #[serde(default)]
    pub missing_criteria: Vec<String>,
    #[serde(default)]
    pub codeforces_rating: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct EvaluatedCandidates {
    evaluated_candidates: Vec<CandidateResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProgressPayload {
    current: u64,
    total: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorDetail {
    detail: String,
}

/// A decoded, typed stream event ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Token(String),
    Intent(IntentPayload),
    Results(Vec<CandidateResult>),
    Progress { current: u64, total: u64 },
    Done,
    Error(String),
    Unknown,
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Done | AgentEvent::Error(_))
    }

    /// Maps a framed `(event type, data)` pair to a typed event.
    ///
    /// A malformed JSON payload inside a recognized type folds into
    /// `Unknown` instead of raising: one bad event must never abort the
    /// stream. Failures are recorded through the debug log only.
    pub fn from_wire(kind: &str, data: &str) -> AgentEvent {
        match kind {
            "token" => AgentEvent::Token(data.to_string()),
            "intent" => match serde_json::from_str::<IntentPayload>(data) {
                Ok(payload) => AgentEvent::Intent(payload),
                Err(error) => {
                    emit_decode_failure(kind, data, &error);
                    AgentEvent::Unknown
                }
            },
            "results" => match serde_json::from_str::<EvaluatedCandidates>(data) {
                Ok(payload) => AgentEvent::Results(payload.evaluated_candidates),
                Err(error) => {
                    emit_decode_failure(kind, data, &error);
                    AgentEvent::Unknown
                }
            },
            "progress" => match serde_json::from_str::<ProgressPayload>(data) {
                Ok(payload) => AgentEvent::Progress {
                    current: payload.current,
                    total: payload.total,
                },
                Err(error) => {
                    emit_decode_failure(kind, data, &error);
                    AgentEvent::Unknown
                }
            },
            "done" => AgentEvent::Done,
            // The error payload is plain text on the chat endpoints and
            // {"detail": ...} JSON on the upload endpoint.
            "error" | "sse-error" => {
                let message = serde_json::from_str::<ErrorDetail>(data)
                    .map(|payload| payload.detail)
                    .unwrap_or_else(|_| data.to_string());
                AgentEvent::Error(message)
            }
            _ => AgentEvent::Unknown,
        }
    }
}

/// Normalizes an evaluation `reasoning` field that may arrive as raw text,
/// as JSON, or as JSON wrapped in a markdown code fence.
///
/// Fallback chain: unwrap a ```-fence if present, then try a JSON parse
/// (taking a nested `reasoning` string or a bare JSON string), and finally
/// fall back to the unwrapped text as-is.
pub fn normalize_reasoning(raw: &str) -> String {
    let unfenced = strip_code_fence(raw.trim());

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(unfenced) {
        match value {
            serde_json::Value::String(text) => return text,
            serde_json::Value::Object(map) => {
                if let Some(serde_json::Value::String(text)) = map.get("reasoning") {
                    return text.clone();
                }
            }
            _ => {}
        }
    }

    unfenced.trim().to_string()
}

fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }
    // Drop the opening fence line (``` or ```json) and a trailing fence.
    let body = match text.find('\n') {
        Some(newline) => &text[newline + 1..],
        None => return text,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body)
}
