/// Reassembles complete newline-delimited lines from arbitrarily split
/// byte chunks.
///
/// Chunk boundaries carry no meaning: a chunk may end mid-line or even
/// mid-UTF-8-sequence, so the carry-over buffer holds raw bytes and text
/// decoding happens only once a full line is available.
#[derive(Default)]
pub struct LineFramer {
    tail: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every complete line it closed off, in
    /// order. The unterminated remainder stays buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.tail.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.tail[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let mut line = &self.tail[start..end];
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
        }

        if start > 0 {
            self.tail.drain(..start);
        }

        lines
    }

    /// Flushes the trailing unterminated line at end-of-stream, if any.
    /// Without this, a producer that omits the final delimiter would have
    /// its last event silently dropped.
    pub fn finish(&mut self) -> Option<String> {
        if self.tail.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.tail);
        let mut line = tail.as_slice();
        if line.ends_with(b"\r") {
            line = &line[..line.len() - 1];
        }
        if line.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(line).into_owned())
    }
}
