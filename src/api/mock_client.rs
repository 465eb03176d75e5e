use crate::api::client::{ByteStream, MockStreamProducer};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One canned backend response.
pub enum MockResponse {
    /// Raw chunks exactly as the transport would deliver them; chunk
    /// boundaries are preserved so tests can exercise arbitrary splits.
    Chunks(Vec<String>),
    /// A stream that never yields, like a stalled backend. Useful for
    /// cancellation tests.
    Pending,
    /// The request itself fails before any streaming begins.
    Fail(String),
}

/// Scripted stream responses for tests, consumed in order.
#[derive(Clone)]
pub struct MockBackend {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
}

impl MockBackend {
    pub fn new(responses: Vec<Vec<String>>) -> Self {
        Self::with_sequence(responses.into_iter().map(MockResponse::Chunks).collect())
    }

    pub fn with_sequence(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().collect())),
        }
    }
}

impl MockStreamProducer for MockBackend {
    fn create_mock_stream(&self, _endpoint: &str) -> Result<ByteStream> {
        let mut responses_guard = self.responses.lock().unwrap();
        let Some(response) = responses_guard.pop_front() else {
            return Err(anyhow!("MockBackend: no more responses configured"));
        };

        match response {
            MockResponse::Chunks(chunks) => {
                let byte_chunks: Vec<Result<Bytes>> =
                    chunks.into_iter().map(|s| Ok(Bytes::from(s))).collect();
                Ok(Box::pin(stream::iter(byte_chunks)))
            }
            MockResponse::Pending => Ok(Box::pin(stream::pending())),
            MockResponse::Fail(message) => Err(anyhow!(message)),
        }
    }
}
