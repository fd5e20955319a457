//! Phase-weighted progress and ETA tracking.
//!
//! The tracker is owned by the orchestrator for one document and is the only
//! writer of `ProcessingProgress`. Strategies report page progress through a
//! `PageProgress` channel handle; sinks receive snapshots fire-and-forget.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

// ────────────────────────────────────────────────────────────────────────────
// Phases
// ────────────────────────────────────────────────────────────────────────────

/// Pipeline phases in their only legal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialization,
    Analysis,
    TextExtraction,
    OcrProcessing,
    PostProcessing,
    Validation,
    Complete,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Initialization,
        Phase::Analysis,
        Phase::TextExtraction,
        Phase::OcrProcessing,
        Phase::PostProcessing,
        Phase::Validation,
        Phase::Complete,
    ];

    /// Relative time weight. OCR dominates because it is by far the slowest step.
    pub fn weight(self) -> f64 {
        match self {
            Phase::Initialization => 1.0,
            Phase::Analysis => 2.0,
            Phase::TextExtraction => 5.0,
            Phase::OcrProcessing => 10.0,
            Phase::PostProcessing => 1.0,
            Phase::Validation => 1.0,
            Phase::Complete => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initialization => "initialization",
            Phase::Analysis => "analysis",
            Phase::TextExtraction => "text_extraction",
            Phase::OcrProcessing => "ocr_processing",
            Phase::PostProcessing => "post_processing",
            Phase::Validation => "validation",
            Phase::Complete => "complete",
        }
    }
}

fn total_weight() -> f64 {
    Phase::ALL.iter().map(|p| p.weight()).sum()
}

fn weight_before(phase: Phase) -> f64 {
    Phase::ALL
        .iter()
        .take_while(|p| **p < phase)
        .map(|p| p.weight())
        .sum()
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub phase: Phase,
    /// 0 – 100 within the current phase.
    pub phase_percent: f64,
    /// 0 – 100 across the whole document, never decreasing.
    pub overall_percent: f64,
    pub eta_ms: u64,
    /// Pages per second in the current page-based phase.
    pub rate: f64,
    pub pages_completed: f64,
    pub total_pages: Option<usize>,
    pub status: String,
    pub warnings: Vec<String>,
    pub strategy: Option<String>,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ProcessingProgress {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            phase: Phase::Initialization,
            phase_percent: 0.0,
            overall_percent: 0.0,
            eta_ms: 0,
            rate: 0.0,
            pages_completed: 0.0,
            total_pages: None,
            status: "Starting".to_string(),
            warnings: Vec::new(),
            strategy: None,
            attempt: 0,
            started_at: now,
            updated_at: now,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sinks
// ────────────────────────────────────────────────────────────────────────────

/// Receives progress snapshots in order. Sinks run on their own thread,
/// never on the task driving extraction, so they may be slow.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &ProcessingProgress);
}

pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_progress(&self, progress: &ProcessingProgress) {
        debug!(
            phase = progress.phase.as_str(),
            phase_percent = progress.phase_percent,
            overall_percent = progress.overall_percent,
            eta_ms = progress.eta_ms,
            "{}",
            progress.status
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Page progress handle given to strategies
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageUpdate {
    /// 1-based page currently being processed.
    pub page_number: usize,
    pub total_pages: usize,
    /// Fraction of `page_number` that is done, 0.0 – 1.0.
    pub page_progress: f64,
}

/// Cheap, clonable sender. Reports are dropped silently once the orchestrator
/// has stopped listening to this attempt.
#[derive(Debug, Clone, Default)]
pub struct PageProgress {
    tx: Option<mpsc::UnboundedSender<PageUpdate>>,
}

impl PageProgress {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PageUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, page_number: usize, total_pages: usize, page_progress: f64) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(PageUpdate {
                page_number,
                total_pages,
                page_progress,
            });
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tracker
// ────────────────────────────────────────────────────────────────────────────

pub struct ProgressTracker {
    progress: ProcessingProgress,
    publisher: mpsc::UnboundedSender<ProcessingProgress>,
    page_clock: Option<Instant>,
}

impl ProgressTracker {
    /// Delivers snapshots to `sink` from a dedicated thread. The thread drains
    /// what is queued and exits once the tracker is dropped.
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        let (tracker, mut snapshots) = Self::channel();
        let spawned = std::thread::Builder::new()
            .name("progress-sink".to_string())
            .spawn(move || {
                while let Some(progress) = snapshots.blocking_recv() {
                    sink.on_progress(&progress);
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "could not start progress delivery; snapshots will be dropped");
        }
        tracker
    }

    /// Tracker whose snapshots are queued on the returned receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProcessingProgress>) {
        let (publisher, snapshots) = mpsc::unbounded_channel();
        let tracker = Self {
            progress: ProcessingProgress::default(),
            publisher,
            page_clock: None,
        };
        (tracker, snapshots)
    }

    pub fn snapshot(&self) -> ProcessingProgress {
        self.progress.clone()
    }

    /// Moves forward to `phase`. Earlier phases are never re-entered: the call
    /// then only updates the status line. Returns whether the phase changed.
    pub fn enter_phase(&mut self, phase: Phase, status: impl Into<String>) -> bool {
        self.progress.status = status.into();
        let advanced = phase > self.progress.phase;
        if advanced {
            self.progress.phase = phase;
            self.progress.phase_percent = 0.0;
            self.reset_pages();
        }
        self.recompute_overall();
        self.emit();
        advanced
    }

    /// Marks the start of a strategy attempt inside the current phase.
    pub fn begin_attempt(&mut self, strategy: &str, attempt: u32) {
        self.progress.strategy = Some(strategy.to_string());
        self.progress.attempt = attempt;
        self.progress.status = format!("Attempt {attempt}: extracting with {strategy}");
        self.reset_pages();
        self.emit();
    }

    pub fn set_phase_percent(&mut self, percent: f64) {
        self.progress.phase_percent = clamp_percent(percent);
        self.recompute_overall();
        self.emit();
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.progress.status = status.into();
        self.emit();
    }

    /// Appends a warning. Warnings live for the whole document and are never cleared.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.progress.warnings.contains(&warning) {
            self.progress.warnings.push(warning);
            self.emit();
        }
    }

    pub fn apply(&mut self, update: PageUpdate) {
        if update.total_pages > 0 {
            self.progress.total_pages = Some(update.total_pages);
        }
        self.page_update(update.page_number, update.page_progress);
    }

    /// Converts a per-page report into the phase-local percentage and refreshes rate and ETA.
    pub fn page_update(&mut self, page_number: usize, page_progress: f64) {
        let total = match self.progress.total_pages {
            Some(total) if total > 0 => total,
            _ => return,
        };
        let clock = *self.page_clock.get_or_insert_with(Instant::now);

        let completed = (page_number.saturating_sub(1) as f64 + page_progress.clamp(0.0, 1.0))
            .min(total as f64);
        self.progress.pages_completed = completed;
        self.progress.phase_percent = clamp_percent(completed / total as f64 * 100.0);

        let (rate, eta_ms) = compute_rate_and_eta(completed, total, clock.elapsed().as_secs_f64());
        self.progress.rate = rate;
        self.progress.eta_ms = eta_ms;
        self.progress.status = format!("Processing page {page_number} of {total}");

        self.recompute_overall();
        self.emit();
    }

    pub fn complete(&mut self, status: impl Into<String>) {
        self.progress.phase = Phase::Complete;
        self.progress.phase_percent = 100.0;
        self.progress.overall_percent = 100.0;
        self.progress.eta_ms = 0;
        self.progress.status = status.into();
        self.emit();
    }

    fn reset_pages(&mut self) {
        self.page_clock = None;
        self.progress.pages_completed = 0.0;
        self.progress.total_pages = None;
        self.progress.rate = 0.0;
        self.progress.eta_ms = 0;
    }

    fn recompute_overall(&mut self) {
        let phase = self.progress.phase;
        let done = weight_before(phase) + self.progress.phase_percent / 100.0 * phase.weight();
        let computed = clamp_percent(done / total_weight() * 100.0);
        // A fallback restarting inside the same phase must not pull the bar back.
        self.progress.overall_percent = self.progress.overall_percent.max(computed);
    }

    /// Never waits: a closed or backed-up consumer only loses or queues snapshots.
    fn emit(&mut self) {
        self.progress.updated_at = Utc::now();
        let _ = self.publisher.send(self.progress.clone());
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Returns `(pages_per_second, eta_ms)`. A zero or undefined rate yields a zero ETA.
pub fn compute_rate_and_eta(completed: f64, total_pages: usize, elapsed_secs: f64) -> (f64, u64) {
    if elapsed_secs <= 0.0 || completed <= 0.0 {
        return (0.0, 0);
    }
    let rate = completed / elapsed_secs;
    if !rate.is_finite() || rate <= 0.0 {
        return (0.0, 0);
    }
    let remaining = (total_pages as f64 - completed).max(0.0);
    (rate, (remaining / rate * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn tracker() -> (ProgressTracker, mpsc::UnboundedReceiver<ProcessingProgress>) {
        ProgressTracker::channel()
    }

    fn overall(t: &ProgressTracker) -> f64 {
        t.snapshot().overall_percent
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProcessingProgress>) -> Vec<(Phase, f64)> {
        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push((p.phase, p.overall_percent));
        }
        seen
    }

    #[test]
    fn test_total_weight() {
        assert!((total_weight() - 20.0).abs() < f64::EPSILON);
        assert!((weight_before(Phase::OcrProcessing) - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overall_uses_weights() {
        let (mut t, _) = tracker();
        t.enter_phase(Phase::TextExtraction, "extracting");
        t.set_phase_percent(50.0);
        // (1 + 2 + 0.5 * 5) / 20 = 27.5%
        assert!((overall(&t) - 27.5).abs() < 1e-9);
    }

    #[test]
    fn test_phase_never_moves_backward() {
        let (mut t, _) = tracker();
        t.enter_phase(Phase::OcrProcessing, "ocr");
        assert!(!t.enter_phase(Phase::TextExtraction, "fallback to text"));
        assert_eq!(t.snapshot().phase, Phase::OcrProcessing);
        assert_eq!(t.snapshot().status, "fallback to text");
    }

    #[test]
    fn test_overall_is_monotonic_across_attempts() {
        let (mut t, mut rx) = tracker();
        t.enter_phase(Phase::Analysis, "analyzing");
        t.enter_phase(Phase::TextExtraction, "extracting");
        t.set_phase_percent(80.0);
        t.begin_attempt("second", 2);
        t.set_phase_percent(10.0);
        t.enter_phase(Phase::OcrProcessing, "ocr");
        t.set_phase_percent(30.0);
        t.complete("done");

        let seen = drain(&mut rx);
        assert!(seen.windows(2).all(|w| w[1].1 >= w[0].1), "{seen:?}");
        assert_eq!(seen.last().unwrap().1, 100.0);
    }

    #[test]
    fn test_percent_is_clamped() {
        let (mut t, _) = tracker();
        t.set_phase_percent(250.0);
        assert!(overall(&t) <= 100.0);
        t.set_phase_percent(f64::NAN);
        assert!(overall(&t) >= 0.0);
    }

    #[test]
    fn test_page_update_sets_phase_percent() {
        let (mut t, _) = tracker();
        t.enter_phase(Phase::OcrProcessing, "ocr");
        t.apply(PageUpdate {
            page_number: 3,
            total_pages: 4,
            page_progress: 0.0,
        });
        let snap = t.snapshot();
        assert_eq!(snap.total_pages, Some(4));
        assert!((snap.pages_completed - 2.0).abs() < 1e-9);
        assert!((snap.phase_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_page_update_without_total_is_ignored() {
        let (mut t, _) = tracker();
        t.enter_phase(Phase::OcrProcessing, "ocr");
        let before = overall(&t);
        t.page_update(2, 1.0);
        assert_eq!(overall(&t), before);
    }

    #[test]
    fn test_rate_and_eta() {
        let (rate, eta) = compute_rate_and_eta(2.0, 6, 4.0);
        assert!((rate - 0.5).abs() < 1e-9);
        assert_eq!(eta, 8000);
    }

    #[test]
    fn test_zero_rate_gives_zero_eta() {
        assert_eq!(compute_rate_and_eta(0.0, 5, 3.0), (0.0, 0));
        assert_eq!(compute_rate_and_eta(2.0, 5, 0.0), (0.0, 0));
    }

    #[test]
    fn test_warnings_accumulate_without_duplicates() {
        let (mut t, _) = tracker();
        t.add_warning("low density");
        t.enter_phase(Phase::OcrProcessing, "ocr");
        t.add_warning("low density");
        t.add_warning("timed out");
        assert_eq!(t.snapshot().warnings, vec!["low density", "timed out"]);
    }

    #[test]
    fn test_page_progress_after_receiver_dropped_is_silent() {
        let (handle, rx) = PageProgress::channel();
        drop(rx);
        handle.report(1, 2, 0.5);
        PageProgress::disabled().report(1, 1, 1.0);
    }

    struct SlowSink {
        seen: Mutex<Vec<f64>>,
    }

    impl ProgressSink for SlowSink {
        fn on_progress(&self, progress: &ProcessingProgress) {
            std::thread::sleep(Duration::from_millis(50));
            self.seen.lock().unwrap().push(progress.overall_percent);
        }
    }

    #[tokio::test]
    async fn test_slow_sink_does_not_block_tracker() {
        let sink = Arc::new(SlowSink {
            seen: Mutex::new(Vec::new()),
        });
        let started = Instant::now();
        let mut t = ProgressTracker::new(sink.clone());
        for phase in [Phase::Analysis, Phase::TextExtraction, Phase::Validation] {
            t.enter_phase(phase, phase.as_str());
        }
        t.complete("done");
        assert!(started.elapsed() < Duration::from_millis(50));
        drop(t);

        // Everything queued is still delivered, in order.
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.seen.lock().unwrap().len() < 4 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(sink.seen.lock().unwrap().last().copied(), Some(100.0));
    }
}
