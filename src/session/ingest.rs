use super::{run_stream_loop, StreamHandle};
use crate::api::ApiClient;
use crate::state::{ProgressEstimator, TICK_PERIOD};
use crate::types::{AgentEvent, FileAttachment};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One update from an in-flight ingest. Carries the generation for the
/// same staleness check the chat flow uses.
#[derive(Debug)]
pub enum IngestUpdate {
    /// Transport byte counters for the upload body.
    Upload {
        generation: u64,
        sent: u64,
        total: u64,
    },
    /// Synthetic processing-estimate tick.
    Tick { generation: u64 },
    /// A decoded server event from the ingest stream.
    Event {
        generation: u64,
        event: AgentEvent,
    },
}

impl IngestUpdate {
    fn generation(&self) -> u64 {
        match self {
            IngestUpdate::Upload { generation, .. }
            | IngestUpdate::Tick { generation }
            | IngestUpdate::Event { generation, .. } => *generation,
        }
    }
}

/// Drives the admin knowledge-base upload flow: true upload progress from
/// the transport, an estimated processing fraction while the server works,
/// and server `progress`/`done`/`error` events taking over when present.
pub struct IngestSession {
    client: Arc<ApiClient>,
    pub estimator: ProgressEstimator,
    update_tx: mpsc::UnboundedSender<IngestUpdate>,
    live: Option<StreamHandle>,
    generation: u64,
    loading: bool,
    last_error: Option<String>,
}

impl IngestSession {
    pub fn new(client: ApiClient, update_tx: mpsc::UnboundedSender<IngestUpdate>) -> Self {
        Self {
            client: Arc::new(client),
            estimator: ProgressEstimator::new(),
            update_tx,
            live: None,
            generation: 0,
            loading: false,
            last_error: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub async fn ingest(&mut self, attachment: FileAttachment) -> Result<()> {
        self.live = None;
        self.estimator = ProgressEstimator::new();
        self.last_error = None;
        self.loading = true;
        self.generation += 1;
        let generation = self.generation;

        let progress_tx = self.update_tx.clone();
        let opened = self
            .client
            .ingest_stream(attachment, move |sent, total| {
                let _ = progress_tx.send(IngestUpdate::Upload {
                    generation,
                    sent,
                    total,
                });
            })
            .await;

        let stream = match opened {
            Ok(stream) => stream,
            Err(error) => {
                self.live = Some(StreamHandle::new(CancellationToken::new(), generation));
                let _ = self.update_tx.send(IngestUpdate::Event {
                    generation,
                    event: AgentEvent::Error(error.to_string()),
                });
                return Ok(());
            }
        };

        let cancel = CancellationToken::new();
        self.live = Some(StreamHandle::new(cancel.clone(), generation));

        // The synthetic estimate ticks until the stream loop's cancel
        // token fires, which the handle does on terminal or teardown.
        let tick_tx = self.update_tx.clone();
        let tick_cancel = cancel.clone();
        tokio::spawn(run_tick_loop(tick_cancel, tick_tx, generation));

        let event_tx = self.update_tx.clone();
        tokio::spawn(run_stream_loop(stream, cancel, move |event| {
            let _ = event_tx.send(IngestUpdate::Event { generation, event });
        }));
        Ok(())
    }

    /// Routes one update into the estimator. Returns false for updates
    /// from a superseded or cancelled ingest.
    pub fn apply_update(&mut self, update: &IngestUpdate) -> bool {
        let live_generation = self.live.as_ref().map(StreamHandle::generation);
        if live_generation != Some(update.generation()) {
            return false;
        }

        match update {
            IngestUpdate::Upload { sent, total, .. } => {
                self.estimator.on_upload_progress(*sent, *total);
            }
            IngestUpdate::Tick { .. } => {
                self.estimator.tick();
            }
            IngestUpdate::Event { event, .. } => match event {
                AgentEvent::Progress { current, total } => {
                    self.estimator.on_server_progress(*current, *total);
                }
                AgentEvent::Done => {
                    self.estimator.on_done();
                    self.loading = false;
                    self.live = None;
                }
                AgentEvent::Error(message) => {
                    self.estimator.on_error();
                    self.last_error = Some(message.clone());
                    self.loading = false;
                    self.live = None;
                }
                _ => {}
            },
        }
        true
    }

    pub fn cancel(&mut self) {
        if self.live.take().is_some() {
            self.loading = false;
            self.estimator.on_error();
        }
    }
}

async fn run_tick_loop(
    cancel: CancellationToken,
    tick_tx: mpsc::UnboundedSender<IngestUpdate>,
    generation: u64,
) {
    let mut interval = tokio::time::interval(TICK_PERIOD);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                if tick_tx.send(IngestUpdate::Tick { generation }).is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::{MockBackend, MockResponse};
    use std::time::Duration;

    fn session_with(mock: MockBackend) -> (IngestSession, mpsc::UnboundedReceiver<IngestUpdate>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let client = ApiClient::new_mock(Arc::new(mock));
        (IngestSession::new(client, update_tx), update_rx)
    }

    async fn pump_until_idle(
        session: &mut IngestSession,
        update_rx: &mut mpsc::UnboundedReceiver<IngestUpdate>,
    ) {
        let deadline = Duration::from_secs(5);
        tokio::time::timeout(deadline, async {
            while session.is_loading() {
                let update = update_rx.recv().await.expect("update channel open");
                session.apply_update(&update);
            }
        })
        .await
        .expect("ingest should reach a terminal state");
    }

    #[tokio::test]
    async fn test_estimate_stays_below_completion_until_done() {
        let (mut session, mut update_rx) = session_with(MockBackend::with_sequence(vec![
            MockResponse::Pending,
        ]));
        let attachment = FileAttachment::new("kb.pdf", vec![0u8; 256]);
        session.ingest(attachment).await.unwrap();

        // The mock reports the upload complete immediately.
        let update = update_rx.recv().await.expect("upload update");
        assert!(matches!(update, IngestUpdate::Upload { .. }));
        session.apply_update(&update);
        assert_eq!(session.estimator.upload_pct(), 100.0);

        let generation = update.generation();
        for _ in 0..100 {
            session.apply_update(&IngestUpdate::Tick { generation });
        }
        assert!(session.estimator.processing_pct() <= 95.0);
        assert!(session.is_loading());

        session.apply_update(&IngestUpdate::Event {
            generation,
            event: AgentEvent::Done,
        });
        assert_eq!(session.estimator.upload_pct(), 100.0);
        assert_eq!(session.estimator.processing_pct(), 100.0);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_server_progress_overrides_estimate() {
        let (mut session, mut update_rx) = session_with(MockBackend::new(vec![vec![
            "event: progress\ndata: {\"current\":3,\"total\":4}\n\n".to_string(),
            "event: done\ndata: [DONE]\n\n".to_string(),
        ]]));
        let attachment = FileAttachment::new("kb.pdf", vec![0u8; 64]);
        session.ingest(attachment).await.unwrap();

        let mut saw_exact_fraction = false;
        let deadline = Duration::from_secs(5);
        tokio::time::timeout(deadline, async {
            while session.is_loading() {
                let update = update_rx.recv().await.expect("update channel open");
                session.apply_update(&update);
                if session.estimator.processing_pct() == 75.0 {
                    saw_exact_fraction = true;
                }
            }
        })
        .await
        .expect("ingest should finish");

        assert!(saw_exact_fraction);
        assert_eq!(session.estimator.processing_pct(), 100.0);
    }

    #[tokio::test]
    async fn test_server_error_records_message_and_resets_progress() {
        let (mut session, mut update_rx) = session_with(MockBackend::new(vec![vec![
            "event: error\ndata: {\"detail\":\"bad admin key\"}\n\n".to_string(),
        ]]));
        let attachment = FileAttachment::new("kb.pdf", vec![0u8; 64]);
        session.ingest(attachment).await.unwrap();
        pump_until_idle(&mut session, &mut update_rx).await;

        assert_eq!(session.last_error(), Some("bad admin key"));
        assert_eq!(session.estimator.upload_pct(), 0.0);
        assert_eq!(session.estimator.processing_pct(), 0.0);
    }

    #[tokio::test]
    async fn test_request_failure_surfaces_as_error() {
        let (mut session, mut update_rx) = session_with(MockBackend::with_sequence(vec![
            MockResponse::Fail("upload rejected".to_string()),
        ]));
        let attachment = FileAttachment::new("kb.pdf", vec![0u8; 64]);
        session.ingest(attachment).await.unwrap();
        pump_until_idle(&mut session, &mut update_rx).await;

        assert!(session.last_error().unwrap().contains("upload rejected"));
    }

    #[tokio::test]
    async fn test_cancel_resets_and_rejects_late_updates() {
        let (mut session, mut update_rx) = session_with(MockBackend::with_sequence(vec![
            MockResponse::Pending,
        ]));
        let attachment = FileAttachment::new("kb.pdf", vec![0u8; 64]);
        session.ingest(attachment).await.unwrap();

        let update = update_rx.recv().await.expect("upload update");
        let generation = update.generation();
        session.apply_update(&update);

        session.cancel();
        assert!(!session.is_loading());
        assert_eq!(session.estimator.processing_pct(), 0.0);

        let applied = session.apply_update(&IngestUpdate::Tick { generation });
        assert!(!applied);
        assert_eq!(session.estimator.processing_pct(), 0.0);
    }
}
