use serde::Serialize;

/// JSON body for the conversational `/stream` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StreamRequest {
    pub thread_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// A file carried on a multipart request. Contents are opaque bytes; any
/// text extraction happens server-side.
#[derive(Debug, Clone)]
pub struct FileAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl FileAttachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}
