pub mod ingest;

pub use ingest::{IngestSession, IngestUpdate};

use crate::api::{ApiClient, ByteStream};
use crate::state::Conversation;
use crate::stream::{EventDecoder, LineFramer};
use crate::types::{AgentEvent, FileAttachment, StreamRequest};
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One decoded event from a specific stream. The generation ties the
/// update to the stream that produced it, so events from a superseded or
/// cancelled stream are identifiable after the fact.
#[derive(Debug)]
pub struct StreamUpdate {
    pub generation: u64,
    pub event: AgentEvent,
}

/// The live transport read loop for one in-flight request. Dropping the
/// handle cancels the loop, so teardown can never leave a dangling reader
/// mutating state nobody observes.
pub(crate) struct StreamHandle {
    cancel: CancellationToken,
    generation: u64,
}

impl StreamHandle {
    fn new(cancel: CancellationToken, generation: u64) -> Self {
        Self { cancel, generation }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Owns one conversation and at most one in-flight stream for it.
///
/// The session is the only writer of the loading flag and the only owner
/// of the transport handle. Decoded events travel through the update
/// channel and come back in via [`ChatSession::apply_update`], which is
/// where all state mutation happens; the read loop itself never touches
/// conversation state.
pub struct ChatSession {
    client: Arc<ApiClient>,
    pub conversation: Conversation,
    update_tx: mpsc::UnboundedSender<StreamUpdate>,
    live: Option<StreamHandle>,
    generation: u64,
    loading: bool,
}

impl ChatSession {
    pub fn new(client: ApiClient, update_tx: mpsc::UnboundedSender<StreamUpdate>) -> Self {
        Self {
            client: Arc::new(client),
            conversation: Conversation::new(),
            update_tx,
            live: None,
            generation: 0,
            loading: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(text, Vec::new()).await
    }

    /// Starts a new turn. Any previous live stream is cancelled before the
    /// new turn's state exists, so two streams can never mutate the same
    /// conversation.
    pub async fn send(&mut self, text: String, files: Vec<FileAttachment>) -> Result<()> {
        self.live = None;

        let thread_id = self.conversation.thread_id().to_string();
        let filenames = files.iter().map(|file| file.filename.clone()).collect();
        self.conversation.begin_turn(text.clone(), filenames);
        self.loading = true;
        self.generation += 1;
        let generation = self.generation;

        let opened = if files.is_empty() {
            let request = StreamRequest {
                thread_id,
                text,
                context: None,
            };
            self.client.chat_stream(&request).await
        } else {
            self.client.agent_stream(&text, &thread_id, &files).await
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(error) => {
                // A transport failure before streaming begins funnels into
                // the same error path as a server-sent error event.
                self.live = Some(StreamHandle::new(CancellationToken::new(), generation));
                let _ = self.update_tx.send(StreamUpdate {
                    generation,
                    event: AgentEvent::Error(error.to_string()),
                });
                return Ok(());
            }
        };

        let cancel = CancellationToken::new();
        self.live = Some(StreamHandle::new(cancel.clone(), generation));
        let update_tx = self.update_tx.clone();
        tokio::spawn(run_stream_loop(stream, cancel, move |event| {
            let _ = update_tx.send(StreamUpdate { generation, event });
        }));
        Ok(())
    }

    /// Routes one update back into conversation state. Returns false for
    /// updates from a stream that is no longer live; callers must not
    /// render those.
    pub fn apply_update(&mut self, update: &StreamUpdate) -> bool {
        let live_generation = self.live.as_ref().map(StreamHandle::generation);
        if live_generation != Some(update.generation) {
            return false;
        }

        self.conversation.apply(&update.event);
        if update.event.is_terminal() {
            self.loading = false;
            self.live = None;
        }
        true
    }

    /// Cooperative cancellation. Not an error: the read loop observes the
    /// signal between chunk reads and exits without emitting further
    /// events, and accumulated content stays exactly as it was.
    pub fn cancel(&mut self) {
        if self.live.take().is_some() {
            self.loading = false;
            self.conversation.close_active_turn();
        }
    }
}

/// Drives one transport stream through the framer/decoder pipeline,
/// emitting typed events in decode order.
///
/// Exactly one terminal resolution is guaranteed per stream: a `done` or
/// `error` event from the wire, a transport error, or a clean EOF
/// (resolved as done). Cancellation emits nothing; the owner already
/// knows.
pub async fn run_stream_loop<F>(mut stream: ByteStream, cancel: CancellationToken, mut emit: F)
where
    F: FnMut(AgentEvent) + Send + 'static,
{
    let mut framer = LineFramer::new();
    let mut decoder = EventDecoder::new();

    'read: loop {
        let next_chunk = tokio::select! {
            _ = cancel.cancelled() => return,
            next_chunk = stream.next() => next_chunk,
        };

        match next_chunk {
            None => break 'read,
            Some(Ok(chunk)) => {
                for line in framer.push(&chunk) {
                    if dispatch_line(&mut decoder, &line, &mut emit) {
                        return;
                    }
                }
            }
            Some(Err(error)) => {
                emit(AgentEvent::Error(error.to_string()));
                return;
            }
        }
    }

    // EOF: flush an unterminated final line, then resolve as done if the
    // producer never sent a terminal event.
    if let Some(line) = framer.finish() {
        if dispatch_line(&mut decoder, &line, &mut emit) {
            return;
        }
    }
    emit(AgentEvent::Done);
}

/// Returns true once a terminal event has been emitted.
fn dispatch_line<F>(decoder: &mut EventDecoder, line: &str, emit: &mut F) -> bool
where
    F: FnMut(AgentEvent),
{
    let Some(wire) = decoder.feed(line) else {
        return false;
    };
    let event = AgentEvent::from_wire(&wire.kind, &wire.data);
    if matches!(event, AgentEvent::Unknown) {
        return false;
    }
    let terminal = event.is_terminal();
    emit(event);
    terminal
}
