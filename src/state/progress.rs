use std::time::Duration;

/// Processing percentage shown as soon as the upload finishes, before any
/// server signal arrives.
pub const PROCESSING_FLOOR: f32 = 10.0;
/// Synthetic increment applied on each tick while processing is estimated.
pub const PROCESSING_STEP: f32 = 5.0;
/// The synthetic estimate never reaches completion; only a terminal server
/// event may show 100%.
pub const PROCESSING_CAP: f32 = 95.0;
/// Period of the synthetic tick.
pub const TICK_PERIOD: Duration = Duration::from_millis(300);

/// Two-channel progress for upload/ingest flows.
///
/// The upload fraction is ground truth from transport byte counters. The
/// processing fraction is synthesized on a timer because the legacy upload
/// path emits no server-side progress; where the server does emit
/// `progress` events, those override the estimate exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressEstimator {
    upload_pct: f32,
    processing_pct: f32,
    ticking: bool,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_pct(&self) -> f32 {
        self.upload_pct
    }

    pub fn processing_pct(&self) -> f32 {
        self.processing_pct
    }

    /// Transport-level byte progress for the request body.
    pub fn on_upload_progress(&mut self, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let fraction = (sent as f32 / total as f32) * 100.0;
        self.upload_pct = fraction.clamp(0.0, 100.0);
        if sent >= total {
            self.start_processing();
        }
    }

    /// Enters the estimated-processing phase: jump to the floor and start
    /// ticking. Called when the upload completes or response headers
    /// arrive, whichever the flow observes first.
    pub fn start_processing(&mut self) {
        self.upload_pct = 100.0;
        if self.processing_pct < PROCESSING_FLOOR {
            self.processing_pct = PROCESSING_FLOOR;
        }
        self.ticking = true;
    }

    /// One synthetic timer tick. Clamped so the estimate never claims
    /// completion ahead of the terminal event.
    pub fn tick(&mut self) {
        if !self.ticking {
            return;
        }
        self.processing_pct = (self.processing_pct + PROCESSING_STEP).min(PROCESSING_CAP);
    }

    /// Authoritative `progress` event from the server; stops the synthetic
    /// phase for good.
    pub fn on_server_progress(&mut self, current: u64, total: u64) {
        if total == 0 {
            return;
        }
        self.ticking = false;
        self.processing_pct = ((current as f32 / total as f32) * 100.0).clamp(0.0, 100.0);
    }

    pub fn on_done(&mut self) {
        self.upload_pct = 100.0;
        self.processing_pct = 100.0;
        self.ticking = false;
    }

    pub fn on_error(&mut self) {
        self.upload_pct = 0.0;
        self.processing_pct = 0.0;
        self.ticking = false;
    }
}

/// Last-processed-offset cursor over a cumulative text buffer.
///
/// Some transports hand back the entire accumulated response on every
/// callback instead of just the new bytes. `advance` returns only the
/// unseen suffix, so re-delivering an already-processed buffer yields
/// nothing instead of double-applying the prefix.
#[derive(Debug, Default)]
pub struct TailCursor {
    offset: usize,
}

impl TailCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance<'a>(&mut self, cumulative: &'a str) -> &'a str {
        if self.offset > cumulative.len() || !cumulative.is_char_boundary(self.offset) {
            // The source restarted or diverged from a cumulative prefix;
            // treat the whole buffer as unseen.
            self.offset = 0;
        }
        let unseen = &cumulative[self.offset..];
        self.offset = cumulative.len();
        unseen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_fraction_tracks_byte_counters() {
        let mut estimator = ProgressEstimator::new();
        estimator.on_upload_progress(25, 100);
        assert_eq!(estimator.upload_pct(), 25.0);
        assert_eq!(estimator.processing_pct(), 0.0);
    }

    #[test]
    fn test_upload_completion_starts_processing_at_floor() {
        let mut estimator = ProgressEstimator::new();
        estimator.on_upload_progress(100, 100);
        assert_eq!(estimator.upload_pct(), 100.0);
        assert_eq!(estimator.processing_pct(), PROCESSING_FLOOR);
    }

    #[test]
    fn test_processing_is_clamped_below_completion_until_done() {
        let mut estimator = ProgressEstimator::new();
        estimator.on_upload_progress(100, 100);
        for _ in 0..100 {
            estimator.tick();
        }
        assert!(estimator.processing_pct() <= PROCESSING_CAP);

        estimator.on_done();
        assert_eq!(estimator.upload_pct(), 100.0);
        assert_eq!(estimator.processing_pct(), 100.0);
    }

    #[test]
    fn test_tick_before_processing_phase_is_inert() {
        let mut estimator = ProgressEstimator::new();
        estimator.tick();
        assert_eq!(estimator.processing_pct(), 0.0);
    }

    #[test]
    fn test_server_progress_overrides_estimate_and_stops_ticking() {
        let mut estimator = ProgressEstimator::new();
        estimator.on_upload_progress(100, 100);
        estimator.on_server_progress(40, 80);
        assert_eq!(estimator.processing_pct(), 50.0);
        estimator.tick();
        assert_eq!(estimator.processing_pct(), 50.0);
    }

    #[test]
    fn test_error_resets_both_fractions() {
        let mut estimator = ProgressEstimator::new();
        estimator.on_upload_progress(100, 100);
        estimator.tick();
        estimator.on_error();
        assert_eq!(estimator.upload_pct(), 0.0);
        assert_eq!(estimator.processing_pct(), 0.0);
        estimator.tick();
        assert_eq!(estimator.processing_pct(), 0.0);
    }

    #[test]
    fn test_zero_total_upload_is_ignored() {
        let mut estimator = ProgressEstimator::new();
        estimator.on_upload_progress(0, 0);
        assert_eq!(estimator.upload_pct(), 0.0);
    }

    #[test]
    fn test_tail_cursor_returns_only_unseen_suffix() {
        let mut cursor = TailCursor::new();
        assert_eq!(cursor.advance("event: a\n"), "event: a\n");
        assert_eq!(cursor.advance("event: a\ndata: 1\n"), "data: 1\n");
    }

    #[test]
    fn test_tail_cursor_is_idempotent_on_redelivery() {
        let mut cursor = TailCursor::new();
        cursor.advance("abc");
        assert_eq!(cursor.advance("abc"), "");
        assert_eq!(cursor.advance("abcdef"), "def");
    }

    #[test]
    fn test_tail_cursor_resets_when_source_restarts() {
        let mut cursor = TailCursor::new();
        cursor.advance("a long buffer");
        assert_eq!(cursor.advance("new"), "new");
    }

    #[test]
    fn test_tail_cursor_handles_non_boundary_divergence() {
        let mut cursor = TailCursor::new();
        cursor.advance("abc");
        // Offset 3 falls inside the first character here.
        assert_eq!(cursor.advance("\u{1f600}\u{1f600}"), "\u{1f600}\u{1f600}");
    }
}
