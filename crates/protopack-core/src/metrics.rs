//! Atomic counters for packaging observability.
//!
//! One [`Metrics`] instance is created at startup, labelled with the
//! configured language and service name, and shared by `Arc` with every
//! processor and the `/metrics` handler. Counters never allocate or lock.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::domain::{Language, PackagingOutcome, Stage};

const ERROR_TOTAL: &str = "error_total";
const PROCESS_DURATION: &str = "bulk_process_duration_secs";
const RUNS_TOTAL: &str = "packaging_runs_total";

/// Per-stage failure counters, run totals and accumulated run duration.
#[derive(Debug)]
pub struct Metrics {
    language: Language,
    app: String,
    errors: [AtomicU64; Stage::ALL.len()],
    succeeded: AtomicU64,
    cancelled: AtomicU64,
    ignored: AtomicU64,
    duration_micros: AtomicU64,
}

impl Metrics {
    pub fn new(language: Language, app: impl Into<String>) -> Self {
        Self {
            language,
            app: app.into(),
            errors: Default::default(),
            succeeded: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            duration_micros: AtomicU64::new(0),
        }
    }

    fn slot(stage: Stage) -> usize {
        Stage::ALL
            .iter()
            .position(|s| *s == stage)
            .unwrap_or_default()
    }

    /// Count one failure attributed to `stage`.
    pub fn record_failure(&self, stage: Stage) {
        self.errors[Self::slot(stage)].fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = ERROR_TOTAL, stage = %stage, "counter incremented");
    }

    /// Count one successful run and add its wall time to the duration total.
    pub fn record_success(&self, elapsed: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.add_duration(elapsed);
    }

    fn add_duration(&self, elapsed: Duration) {
        self.duration_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        tracing::trace!(metric = PROCESS_DURATION, elapsed_ms = elapsed.as_millis() as u64, "counter incremented");
    }

    /// Count a terminal outcome. Failures must be recorded separately via
    /// [`Metrics::record_failure`] at the point of failure; their wall time
    /// still counts toward the duration total.
    pub fn record_outcome(&self, outcome: PackagingOutcome, elapsed: Duration) {
        if outcome.is_success() {
            self.record_success(elapsed);
        } else if outcome.failed_stage().is_some() {
            self.add_duration(elapsed);
        } else if outcome == PackagingOutcome::Cancelled {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ignored.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn errors(&self, stage: Stage) -> u64 {
        self.errors[Self::slot(stage)].load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Accumulated wall time of succeeded and failed runs, in seconds.
    pub fn process_seconds(&self) -> f64 {
        self.duration_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    /// Emit current values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            language = %self.language,
            errors = self.total_errors(),
            succeeded = self.succeeded(),
            cancelled = self.cancelled(),
            ignored = self.ignored(),
            process_seconds = self.process_seconds(),
        );
    }

    /// Prometheus text exposition of every counter.
    pub fn render_prometheus(&self) -> String {
        let labels = format!("language=\"{}\",app=\"{}\"", self.language, self.app);
        let mut out = String::new();

        let _ = writeln!(out, "# TYPE {ERROR_TOTAL} counter");
        for stage in Stage::ALL {
            let _ = writeln!(
                out,
                "{ERROR_TOTAL}{{{labels},type=\"{}\"}} {}",
                stage.label(),
                self.errors(stage)
            );
        }

        let _ = writeln!(out, "# TYPE {PROCESS_DURATION} counter");
        let _ = writeln!(out, "{PROCESS_DURATION}{{{labels}}} {}", self.process_seconds());

        let _ = writeln!(out, "# TYPE {RUNS_TOTAL} counter");
        for (outcome, value) in [
            ("succeeded", self.succeeded()),
            ("failed", self.total_errors()),
            ("cancelled", self.cancelled()),
            ("ignored", self.ignored()),
        ] {
            let _ = writeln!(out, "{RUNS_TOTAL}{{{labels},outcome=\"{outcome}\"}} {value}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_counted_per_stage() {
        let m = Metrics::new(Language::Ruby, "protopack");
        m.record_failure(Stage::Clone);
        m.record_failure(Stage::Clone);
        m.record_failure(Stage::Publish);
        assert_eq!(m.errors(Stage::Clone), 2);
        assert_eq!(m.errors(Stage::Publish), 1);
        assert_eq!(m.errors(Stage::Mkdir), 0);
        assert_eq!(m.total_errors(), 3);
    }

    #[test]
    fn success_accumulates_duration() {
        let m = Metrics::new(Language::Npm, "protopack");
        m.record_success(Duration::from_millis(1500));
        m.record_outcome(PackagingOutcome::Succeeded, Duration::from_millis(500));
        assert_eq!(m.succeeded(), 2);
        assert!((m.process_seconds() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn outcome_counters() {
        let m = Metrics::new(Language::Release, "protopack");
        m.record_outcome(PackagingOutcome::Ignored, Duration::ZERO);
        m.record_outcome(PackagingOutcome::Cancelled, Duration::ZERO);
        m.record_outcome(PackagingOutcome::Failed(Stage::Build), Duration::ZERO);
        assert_eq!(m.ignored(), 1);
        assert_eq!(m.cancelled(), 1);
        assert_eq!(m.total_errors(), 0);
    }

    #[test]
    fn failed_runs_add_duration_but_not_successes() {
        let m = Metrics::new(Language::Ruby, "protopack");
        m.record_outcome(PackagingOutcome::Failed(Stage::Publish), Duration::from_millis(750));
        m.record_outcome(PackagingOutcome::Cancelled, Duration::from_millis(900));
        m.record_outcome(PackagingOutcome::Ignored, Duration::from_millis(900));
        assert_eq!(m.succeeded(), 0);
        assert!((m.process_seconds() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn prometheus_text_carries_labels() {
        let m = Metrics::new(Language::Scala, "proto-pkg");
        m.record_failure(Stage::Create);
        let text = m.render_prometheus();
        assert!(text.contains("# TYPE error_total counter"));
        assert!(text.contains(
            "error_total{language=\"scala\",app=\"proto-pkg\",type=\"create\"} 1"
        ));
        assert!(text.contains(
            "error_total{language=\"scala\",app=\"proto-pkg\",type=\"mkdir\"} 0"
        ));
        assert!(text.contains("bulk_process_duration_secs{language=\"scala\",app=\"proto-pkg\"} 0"));
    }
}
