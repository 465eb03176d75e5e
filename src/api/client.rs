use super::logging::{debug_stream_enabled, emit_request_debug};
use crate::config::Config;
use crate::types::{FileAttachment, StreamRequest};
use anyhow::{anyhow, bail, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::multipart;
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Upload bodies are fed to the transport in fixed-size slices so byte
/// progress is observable while the request is still being written.
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, endpoint: &str) -> Result<ByteStream>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    admin_key: Option<String>,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            admin_key: config.admin_key.clone(),
            #[cfg(test)]
            mock_stream_producer: None,
        })
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "http://localhost:8000".to_string(),
            admin_key: Some("test-admin-key".to_string()),
            mock_stream_producer: Some(mock_producer),
        }
    }

    /// Opens the conversational `/stream` endpoint: JSON request body,
    /// streaming event response.
    pub async fn chat_stream(&self, request: &StreamRequest) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream("/stream");
            }
        }

        let request_url = self.endpoint("/stream");
        if debug_stream_enabled() {
            emit_request_debug(&request_url, &serde_json::to_value(request)?);
        }

        let builder = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .json(request);
        self.open_stream(builder, &request_url).await
    }

    /// Opens the unified `/agent` endpoint: multipart message plus
    /// attached files, streaming event response beginning with an
    /// `intent` classification.
    pub async fn agent_stream(
        &self,
        message: &str,
        thread_id: &str,
        files: &[FileAttachment],
    ) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream("/agent");
            }
        }

        let request_url = self.endpoint("/agent");
        let mut form = multipart::Form::new()
            .text("message", message.to_string())
            .text("thread_id", thread_id.to_string());
        for file in files {
            let part = multipart::Part::bytes(file.bytes.clone())
                .file_name(file.filename.clone())
                .mime_str("application/octet-stream")?;
            form = form.part("files", part);
        }

        let builder = self.http.post(&request_url).multipart(form);
        self.open_stream(builder, &request_url).await
    }

    /// Opens the admin `/upload` endpoint with a byte-counting body.
    /// `on_progress(sent, total)` fires as the transport consumes each
    /// slice of the upload.
    pub async fn ingest_stream(
        &self,
        attachment: FileAttachment,
        mut on_progress: impl FnMut(u64, u64) + Send + 'static,
    ) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                let total = attachment.bytes.len() as u64;
                on_progress(total, total);
                return producer.create_mock_stream("/upload");
            }
        }

        let Some(admin_key) = self.admin_key.clone() else {
            bail!("RAGLINE_ADMIN_KEY not set; the ingest flow requires the admin upload key");
        };

        let request_url = self.endpoint("/upload");
        let total = attachment.bytes.len() as u64;
        let chunks: Vec<Bytes> = attachment
            .bytes
            .chunks(UPLOAD_CHUNK_BYTES)
            .map(Bytes::copy_from_slice)
            .collect();
        let mut sent = 0u64;
        let body_stream = futures::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(sent, total);
            Ok::<Bytes, std::io::Error>(chunk)
        });

        let part = multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(body_stream),
            total,
        )
        .file_name(attachment.filename)
        .mime_str("application/octet-stream")?;
        let form = multipart::Form::new().part("file", part);

        let builder = self
            .http
            .post(&request_url)
            .header("X-Admin-Key", admin_key)
            .multipart(form);
        self.open_stream(builder, &request_url).await
    }

    /// Uploads a document into the session-scoped knowledge base. Plain
    /// request/response, no streaming.
    pub async fn upload_session_file(
        &self,
        attachment: FileAttachment,
        thread_id: &str,
    ) -> Result<String> {
        let request_url = self.endpoint("/upload-session");
        let part = multipart::Part::bytes(attachment.bytes)
            .file_name(attachment.filename)
            .mime_str("application/pdf")?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("thread_id", thread_id.to_string());

        #[derive(serde::Deserialize)]
        struct UploadReply {
            message: String,
        }

        let reply: UploadReply = self
            .http
            .post(&request_url)
            .multipart(form)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?
            .json()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;
        Ok(reply.message)
    }

    pub async fn health(&self) -> Result<()> {
        let request_url = self.endpoint("/health");
        self.http
            .get(&request_url)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        Ok(())
    }

    async fn open_stream(
        &self,
        builder: reqwest::RequestBuilder,
        request_url: &str,
    ) -> Result<ByteStream> {
        let response = builder
            .send()
            .await
            .map_err(|error| map_api_request_error(error, request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, request_url))?;

        let request_url_for_stream = request_url.to_string();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() {
        return anyhow!(
            "cannot reach backend at '{}': {}. Is the server running?",
            request_url,
            error
        );
    }
    if error.is_timeout() {
        return anyhow!("request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!("backend '{}' returned HTTP {}: {}", request_url, status, error);
    }
    anyhow!("request to '{}' failed: {}", request_url, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::MockBackend;

    #[test]
    fn test_endpoint_joins_without_duplicate_slash() {
        let config = Config {
            backend_url: "http://localhost:8000/".to_string(),
            admin_key: None,
        };
        let client = ApiClient::new(&config).expect("client should build");
        assert_eq!(client.endpoint("/stream"), "http://localhost:8000/stream");
    }

    #[tokio::test]
    async fn test_ingest_without_admin_key_fails_up_front() {
        let config = Config {
            backend_url: "http://localhost:8000".to_string(),
            admin_key: None,
        };
        let client = ApiClient::new(&config).expect("client should build");
        let attachment = FileAttachment::new("doc.pdf", vec![0u8; 16]);
        let result = client.ingest_stream(attachment, |_, _| {}).await;
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("RAGLINE_ADMIN_KEY"));
    }

    #[tokio::test]
    async fn test_mock_producer_intercepts_stream_endpoints() {
        let mock = Arc::new(MockBackend::new(vec![vec![
            "event: done\ndata: [DONE]\n\n".to_string(),
        ]]));
        let client = ApiClient::new_mock(mock);
        let request = StreamRequest {
            thread_id: "t1".to_string(),
            text: "hi".to_string(),
            context: None,
        };
        let mut stream = client.chat_stream(&request).await.expect("mock stream");
        let chunk = stream.next().await.expect("one chunk").expect("ok chunk");
        assert!(chunk.starts_with(b"event: done"));
    }
}
