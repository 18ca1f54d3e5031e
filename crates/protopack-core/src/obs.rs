//! Structured lifecycle events for packaging runs.
//!
//! Every run executes inside a `packaging.run` span carrying the run id,
//! language and ref, so all events below (and any log line emitted by the
//! collaborators) are attributable to one run.

use std::future::Future;

use tracing::instrument::Instrumented;
use tracing::{info, warn, Instrument, Span};

use crate::domain::{Language, PackagingOutcome, Stage};

/// Run-scoped tracing span.
///
/// Runs hop between worker threads, so the span is attached to the run's
/// future instead of being entered on the current thread.
#[derive(Debug, Clone)]
pub struct RunSpan {
    span: Span,
}

impl RunSpan {
    pub fn new(run_id: &str, language: Language, git_ref: &str) -> Self {
        let span = tracing::info_span!(
            "packaging.run",
            run_id = %run_id,
            language = %language,
            git_ref = %git_ref,
        );
        Self { span }
    }

    /// Attach the span to `fut`.
    pub fn instrument<F: Future>(self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span)
    }
}

pub fn emit_run_started(run_id: &str, repo: &str, head_commit: &str) {
    info!(event = "run.started", run_id = %run_id, repo = %repo, head_commit = %head_commit);
}

/// A stage failed; the run stops after cleanup.
pub fn emit_stage_failed(run_id: &str, stage: Stage, error: &dyn std::fmt::Display) {
    warn!(event = "run.stage_failed", run_id = %run_id, stage = %stage, error = %error);
}

pub fn emit_run_finished(run_id: &str, outcome: PackagingOutcome, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        outcome = %outcome.label(),
        failed_stage = outcome.failed_stage().map(|s| s.label()),
        duration_ms = duration_ms,
    );
}

pub fn emit_run_ignored(run_id: &str, reason: &str) {
    info!(event = "run.ignored", run_id = %run_id, reason = %reason);
}

pub fn emit_run_cancelled(run_id: &str, stage: Stage) {
    info!(event = "run.cancelled", run_id = %run_id, before = %stage);
}

/// Work directory could not be removed. Never changes the run outcome.
pub fn emit_cleanup_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.cleanup_error", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instrumented_future_runs() {
        let span = RunSpan::new("run-1", Language::Npm, "refs/heads/main");
        let value = span.instrument(async { 7 }).await;
        assert_eq!(value, 7);
    }

    #[test]
    fn emitters_do_not_panic_without_subscriber() {
        emit_run_started("run-1", "acme/protos", "abc");
        emit_stage_failed("run-1", Stage::Clone, &"boom");
        emit_run_finished("run-1", PackagingOutcome::Failed(Stage::Build), 12);
        emit_run_ignored("run-1", "tag push");
        emit_run_cancelled("run-1", Stage::Build);
        emit_cleanup_error("run-1", &"denied");
    }
}
