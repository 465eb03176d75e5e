/// One framed wire event: the `event:` type in effect plus one `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEvent {
    pub kind: String,
    pub data: String,
}

/// Groups framed lines into `(event type, data)` pairs.
///
/// The backend's framing is looser than real SSE: an `event:` line sets the
/// current type, every `data:` line emits immediately under that type, and
/// no blank-line terminator is required. The type slot persists across data
/// lines until the next `event:` line. A `data:` line seen before any
/// `event:` line carries the empty type, which dispatch treats as unknown.
#[derive(Default)]
pub struct EventDecoder {
    current_kind: String,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> Option<WireEvent> {
        if let Some(kind) = line.strip_prefix("event: ") {
            self.current_kind = kind.trim().to_string();
            return None;
        }
        if let Some(data) = line.strip_prefix("data: ") {
            return Some(WireEvent {
                kind: self.current_kind.clone(),
                data: data.to_string(),
            });
        }
        None
    }
}
