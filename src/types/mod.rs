pub mod api;
pub mod events;

pub use api::{FileAttachment, StreamRequest};
pub use events::{normalize_reasoning, AgentEvent, CandidateResult, Evaluation, IntentPayload};
