use crate::types::{AgentEvent, CandidateResult};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation. The content of the active assistant
/// turn is append-only while it streams; once a new turn is appended the
/// old one is never touched again.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub files: Vec<String>,
    pub intent: Option<String>,
    pub evaluation_results: Option<Vec<CandidateResult>>,
}

impl Turn {
    fn user(content: String, files: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content,
            files,
            intent: None,
            evaluation_results: None,
        }
    }

    fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            files: Vec::new(),
            intent: None,
            evaluation_results: None,
        }
    }
}

/// Ordered turn list plus the explicit index of the assistant turn that
/// in-flight stream events target. The index is set only at turn creation
/// and cleared on a terminal event; events never scan the list to find
/// their target.
#[derive(Default)]
pub struct Conversation {
    thread_id: Option<String>,
    pub turns: Vec<Turn>,
    active_assistant: Option<usize>,
    pending_intent: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client-generated conversation id, created lazily on first use
    /// and reused for every send in this session. Never persisted.
    pub fn thread_id(&mut self) -> &str {
        self.thread_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
    }

    /// Appends the user turn and its empty assistant placeholder as one
    /// step, and marks the placeholder as the active stream target.
    pub fn begin_turn(&mut self, text: String, files: Vec<String>) {
        self.turns.push(Turn::user(text, files));
        self.turns.push(Turn::assistant_placeholder());
        self.active_assistant = Some(self.turns.len() - 1);
        self.pending_intent = None;
    }

    /// Applies one decoded event to the active assistant turn.
    ///
    /// Everything here is a no-op when no active turn exists or the
    /// addressed turn's role does not match, so a stream that outlives a
    /// reset cannot corrupt state.
    pub fn apply(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::Token(text) => {
                if let Some(turn) = self.active_assistant_mut() {
                    turn.content.push_str(text);
                }
            }
            AgentEvent::Intent(payload) => {
                let intent = payload.intent.clone();
                if let Some(turn) = self.active_assistant_mut() {
                    turn.intent = Some(intent.clone());
                    self.pending_intent = Some(intent);
                }
            }
            AgentEvent::Results(batch) => {
                if let Some(turn) = self.active_assistant_mut() {
                    turn.evaluation_results = Some(batch.clone());
                }
            }
            AgentEvent::Done => {
                self.close_active_turn();
            }
            AgentEvent::Error(message) => {
                if let Some(turn) = self.active_assistant_mut() {
                    if !turn.content.is_empty() {
                        turn.content.push_str("\n\n");
                    }
                    turn.content.push_str("\u{26a0}\u{fe0f} Error: ");
                    turn.content.push_str(message);
                }
                self.close_active_turn();
            }
            AgentEvent::Progress { .. } | AgentEvent::Unknown => {}
        }
    }

    /// The intent currently shown as a transient "working on it" note,
    /// cleared by any terminal event.
    pub fn pending_intent(&self) -> Option<&str> {
        self.pending_intent.as_deref()
    }

    pub fn last_assistant_content(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant)
            .map(|turn| turn.content.as_str())
    }

    fn active_assistant_mut(&mut self) -> Option<&mut Turn> {
        let index = self.active_assistant?;
        let turn = self.turns.get_mut(index)?;
        if turn.role != Role::Assistant {
            return None;
        }
        Some(turn)
    }

    /// Ends streaming into the current assistant turn without touching its
    /// accumulated content. Used by terminal events and by cancellation.
    pub fn close_active_turn(&mut self) {
        self.active_assistant = None;
        self.pending_intent = None;
    }
}
