//! Staged progress reporting for export/import operations.
//!
//! A `ProgressTracker` is a value owned by one orchestrator invocation,
//! never shared across calls, that drives an injected `ProgressSink`
//! through the stage machine:
//!
//! `preparing → collecting → processing → generating → [encrypting] →
//! finalizing → complete`, with `error` reachable from any non-terminal
//! stage. Percent is monotonically non-decreasing within one operation and
//! exactly one terminal stage is ever emitted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Operation stages, in order. Skipped stages (e.g. `encrypting` with no
/// password) are simply never emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Preparing,
    Collecting,
    Processing,
    Generating,
    Encrypting,
    Finalizing,
    Complete,
    Error,
}

impl ExportStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStage::Preparing => "preparing",
            ExportStage::Collecting => "collecting",
            ExportStage::Processing => "processing",
            ExportStage::Generating => "generating",
            ExportStage::Encrypting => "encrypting",
            ExportStage::Finalizing => "finalizing",
            ExportStage::Complete => "complete",
            ExportStage::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExportStage::Complete | ExportStage::Error)
    }
}

/// One progress update delivered to the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportProgress {
    pub stage: ExportStage,
    /// 0–100, monotonically non-decreasing within one operation.
    pub percent: u8,
    pub records_processed: usize,
    pub records_total: usize,
    pub eta_seconds: Option<u64>,
}

/// Callback sink. Stateless from the engine's perspective; each operation
/// gets its own tracker, so concurrent operations never interfere.
pub trait ProgressSink {
    fn report(&mut self, progress: &ExportProgress);
}

impl<F: FnMut(&ExportProgress)> ProgressSink for F {
    fn report(&mut self, progress: &ExportProgress) {
        self(progress)
    }
}

/// Sink that discards every update.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&mut self, _progress: &ExportProgress) {}
}

/// Cooperative cancellation signal, checked between category boundaries
/// (never mid-entry).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// Percent anchors for each stage. The generating band is wide because
// serialization dominates wall time.
pub(crate) const PERCENT_PREPARING: u8 = 0;
pub(crate) const PERCENT_COLLECTING: u8 = 10;
pub(crate) const PERCENT_PROCESSING: u8 = 25;
pub(crate) const GENERATING_BAND: (u8, u8) = (30, 80);
pub(crate) const PERCENT_ENCRYPTING: u8 = 85;
pub(crate) const PERCENT_FINALIZING: u8 = 95;

/// Per-invocation progress state. Clamps percent to be monotone and
/// silently drops updates after a terminal stage, so a buggy caller can
/// never observe a regressing or double-terminated stream.
pub struct ProgressTracker<'a> {
    sink: &'a mut dyn ProgressSink,
    percent: u8,
    records_total: usize,
    records_processed: usize,
    started: Instant,
    terminal: bool,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            sink,
            percent: 0,
            records_total: 0,
            records_processed: 0,
            started: Instant::now(),
            terminal: false,
        }
    }

    pub fn set_total(&mut self, total: usize) {
        self.records_total = total;
    }

    /// Emit a stage transition at its anchor percent.
    pub fn stage(&mut self, stage: ExportStage, percent: u8) {
        self.emit(stage, percent, None);
    }

    /// Granular progress inside the `generating` band: `processed` of the
    /// known total, with an ETA from observed throughput.
    pub fn generating_step(&mut self, processed: usize) {
        self.records_processed = processed.min(self.records_total);
        let (low, high) = GENERATING_BAND;
        let span = (high - low) as usize;
        let percent = if self.records_total == 0 {
            high
        } else {
            low + (span * self.records_processed / self.records_total) as u8
        };
        let eta = self.estimate_remaining();
        self.emit(ExportStage::Generating, percent, eta);
    }

    pub fn complete(&mut self) {
        self.records_processed = self.records_total;
        self.emit(ExportStage::Complete, 100, Some(0));
    }

    /// Terminal error at the current percent; the stream never regresses
    /// even while failing.
    pub fn error(&mut self) {
        let percent = self.percent;
        self.emit(ExportStage::Error, percent, None);
    }

    fn estimate_remaining(&self) -> Option<u64> {
        if self.records_processed == 0 || self.records_total == 0 {
            return None;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = self.records_processed as f64 / elapsed.max(0.001);
        let remaining = (self.records_total - self.records_processed) as f64;
        Some((remaining / rate).ceil() as u64)
    }

    fn emit(&mut self, stage: ExportStage, percent: u8, eta_seconds: Option<u64>) {
        if self.terminal {
            return;
        }
        self.percent = self.percent.max(percent.min(100));
        if stage.is_terminal() {
            self.terminal = true;
        }
        self.sink.report(&ExportProgress {
            stage,
            percent: self.percent,
            records_processed: self.records_processed,
            records_total: self.records_total,
            eta_seconds,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_stages(updates: &[ExportProgress]) -> Vec<ExportStage> {
        updates.iter().map(|u| u.stage).collect()
    }

    #[test]
    fn full_export_sequence_is_monotonic() {
        let mut updates = Vec::new();
        let mut sink = |p: &ExportProgress| updates.push(p.clone());
        let mut tracker = ProgressTracker::new(&mut sink);

        tracker.stage(ExportStage::Preparing, PERCENT_PREPARING);
        tracker.stage(ExportStage::Collecting, PERCENT_COLLECTING);
        tracker.set_total(10);
        tracker.stage(ExportStage::Processing, PERCENT_PROCESSING);
        for i in 0..=10 {
            tracker.generating_step(i);
        }
        tracker.stage(ExportStage::Encrypting, PERCENT_ENCRYPTING);
        tracker.stage(ExportStage::Finalizing, PERCENT_FINALIZING);
        tracker.complete();

        let percents: Vec<u8> = updates.iter().map(|u| u.percent).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
        assert_eq!(updates.last().unwrap().stage, ExportStage::Complete);
        assert_eq!(updates.last().unwrap().percent, 100);
    }

    #[test]
    fn exactly_one_terminal_emission() {
        let mut updates = Vec::new();
        let mut sink = |p: &ExportProgress| updates.push(p.clone());
        let mut tracker = ProgressTracker::new(&mut sink);

        tracker.stage(ExportStage::Preparing, PERCENT_PREPARING);
        tracker.complete();
        tracker.error();
        tracker.complete();
        tracker.stage(ExportStage::Finalizing, PERCENT_FINALIZING);

        let terminal_count = updates.iter().filter(|u| u.stage.is_terminal()).count();
        assert_eq!(terminal_count, 1);
        assert_eq!(updates.len(), 2);
    }

    #[test]
    fn error_keeps_current_percent() {
        let mut updates = Vec::new();
        let mut sink = |p: &ExportProgress| updates.push(p.clone());
        let mut tracker = ProgressTracker::new(&mut sink);

        tracker.stage(ExportStage::Processing, PERCENT_PROCESSING);
        tracker.error();

        assert_eq!(
            collect_stages(&updates),
            vec![ExportStage::Processing, ExportStage::Error]
        );
        assert_eq!(updates[1].percent, PERCENT_PROCESSING);
    }

    #[test]
    fn generating_step_never_exceeds_band() {
        let mut updates = Vec::new();
        let mut sink = |p: &ExportProgress| updates.push(p.clone());
        let mut tracker = ProgressTracker::new(&mut sink);
        tracker.set_total(4);
        // Over-reporting processed clamps to the total
        tracker.generating_step(9);
        assert_eq!(updates[0].records_processed, 4);
        assert_eq!(updates[0].percent, GENERATING_BAND.1);
    }

    #[test]
    fn zero_total_generating_jumps_to_band_end() {
        let mut sink = NullSink;
        let mut tracker = ProgressTracker::new(&mut sink);
        tracker.generating_step(0);
        assert_eq!(tracker.percent, GENERATING_BAND.1);
    }

    #[test]
    fn eta_present_once_throughput_observed() {
        let updates = std::cell::RefCell::new(Vec::new());
        let mut sink = |p: &ExportProgress| updates.borrow_mut().push(p.clone());
        let mut tracker = ProgressTracker::new(&mut sink);
        tracker.set_total(100);
        tracker.generating_step(0);
        assert!(updates.borrow()[0].eta_seconds.is_none());
        tracker.generating_step(50);
        assert!(updates.borrow()[1].eta_seconds.is_some());
    }

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let shared = token.clone();
        shared.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn stage_serializes_snake_case() {
        let json = serde_json::to_string(&ExportStage::Encrypting).unwrap();
        assert_eq!(json, "\"encrypting\"");
        assert_eq!(ExportStage::Complete.as_str(), "complete");
    }
}
