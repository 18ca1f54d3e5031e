//! Shared run lifecycle.
//!
//! `Init -> Staged -> Cloned -> Versioned -> Manifested -> Built -> [Published] -> Cleaned`
//!
//! [`drive`] owns the parts every ecosystem shares: the cancellation check
//! before any work, work-directory allocation, failure accounting and the
//! unconditional cleanup. The ecosystem-specific states run inside
//! [`Pipeline::run_stages`], which reports a stop as an [`Interrupt`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use protopack_core::obs::{
    emit_cleanup_error, emit_run_cancelled, emit_run_finished, emit_run_ignored, emit_run_started,
    emit_stage_failed,
};
use protopack_core::{
    CloneRepo, FsResult, Language, Metrics, PackagingOutcome, PushEvent, ScratchDirs, Stage,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Boxed stage error.
pub type StageError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a run stopped before completing.
#[derive(Debug)]
pub enum Interrupt {
    /// Shutdown was signalled before `before` started.
    Cancelled { before: Stage },

    /// `stage` failed with `error`.
    Failed { stage: Stage, error: StageError },
}

impl Interrupt {
    pub fn failed(stage: Stage, error: impl Into<StageError>) -> Self {
        Interrupt::Failed {
            stage,
            error: error.into(),
        }
    }
}

/// Attribute a fallible step to a stage: `step().await.at(Stage::Clone)?`.
pub trait StageResultExt<T> {
    fn at(self, stage: Stage) -> Result<T, Interrupt>;
}

impl<T, E> StageResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn at(self, stage: Stage) -> Result<T, Interrupt> {
        self.map_err(|e| Interrupt::failed(stage, e))
    }
}

/// A run's private work directory.
///
/// Deleted exactly once: by [`BuildContext::cleanup`] on the normal path,
/// or on drop if the run unwinds before reaching it.
pub struct BuildContext {
    id: String,
    work_dir: PathBuf,
    dirs: Arc<dyn ScratchDirs>,
    released: bool,
}

impl BuildContext {
    /// Create a fresh, uniquely named work directory under `scratch_root`.
    pub fn allocate(dirs: Arc<dyn ScratchDirs>, scratch_root: &Path) -> FsResult<Self> {
        let work_dir = dirs.create_unique_dir(scratch_root)?;
        let id = work_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(build_id = %id, work_dir = %work_dir.display(), "work directory allocated");
        Ok(Self {
            id,
            work_dir,
            dirs,
            released: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Delete the work directory and everything under it.
    pub fn cleanup(mut self) -> FsResult<()> {
        self.released = true;
        let result = self.dirs.delete_dir(&self.work_dir);
        debug!(build_id = %self.id, ok = result.is_ok(), "work directory removed");
        result
    }
}

impl Drop for BuildContext {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.dirs.delete_dir(&self.work_dir) {
            tracing::warn!(build_id = %self.id, error = %e, "work directory left behind");
        }
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("id", &self.id)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

/// Per-run parameters, built once after the work directory exists and
/// passed by reference to every stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub build_id: String,
    pub language: Language,
    pub event: PushEvent,
    pub work_dir: PathBuf,
    pub main_branch: String,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Stop before `next` if shutdown has been signalled.
    pub fn checkpoint(&self, next: Stage) -> Result<(), Interrupt> {
        checkpoint(&self.cancel, next)
    }
}

/// Stop before `next` if `cancel` has fired.
pub fn checkpoint(cancel: &CancellationToken, next: Stage) -> Result<(), Interrupt> {
    if cancel.is_cancelled() {
        return Err(Interrupt::Cancelled { before: next });
    }
    Ok(())
}

/// Process-wide collaborators every pipeline needs for its lifecycle.
#[derive(Clone)]
pub struct Workspace {
    pub scratch_root: PathBuf,
    pub dirs: Arc<dyn ScratchDirs>,
    pub metrics: Arc<Metrics>,
    pub main_branch: String,
}

impl Workspace {
    pub fn new(
        scratch_root: impl Into<PathBuf>,
        dirs: Arc<dyn ScratchDirs>,
        metrics: Arc<Metrics>,
        main_branch: impl Into<String>,
    ) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            dirs,
            metrics,
            main_branch: main_branch.into(),
        }
    }
}

/// The ecosystem-specific part of a packaging run.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn language(&self) -> Language;

    fn workspace(&self) -> &Workspace;

    /// Reason to skip `event` entirely, before anything is allocated.
    fn skip_reason(&self, _event: &PushEvent) -> Option<&'static str> {
        None
    }

    /// Everything between allocation and cleanup.
    async fn run_stages(&self, ctx: &RunContext) -> Result<(), Interrupt>;
}

/// Clone the event's repository into a fresh directory under the work dir.
pub async fn clone_into_work_dir<R>(
    ctx: &RunContext,
    dirs: &dyn ScratchDirs,
    repo: &R,
) -> Result<PathBuf, Interrupt>
where
    R: CloneRepo + ?Sized,
{
    ctx.checkpoint(Stage::Clone)?;
    let clone_dir = dirs.create_unique_dir(&ctx.work_dir).at(Stage::Clone)?;
    repo.clone_with_checkout(&clone_dir, &ctx.event)
        .await
        .at(Stage::Clone)?;
    debug!(
        build_id = %ctx.build_id,
        language = %ctx.language,
        clone_dir = %clone_dir.display(),
        "repository cloned"
    );
    Ok(clone_dir)
}

/// Run `pipeline` for one event, start to finish.
pub async fn drive<P>(
    pipeline: &P,
    run_id: String,
    event: PushEvent,
    cancel: CancellationToken,
) -> PackagingOutcome
where
    P: Pipeline + ?Sized,
{
    let started = Instant::now();
    let workspace = pipeline.workspace();
    let metrics = workspace.metrics.as_ref();
    emit_run_started(&run_id, &event.slug(), &event.head_commit);

    let outcome = if cancel.is_cancelled() {
        emit_run_cancelled(&run_id, Stage::Mkdir);
        PackagingOutcome::Cancelled
    } else if let Some(reason) = pipeline.skip_reason(&event) {
        emit_run_ignored(&run_id, reason);
        PackagingOutcome::Ignored
    } else {
        match BuildContext::allocate(workspace.dirs.clone(), &workspace.scratch_root) {
            Err(e) => {
                metrics.record_failure(Stage::Mkdir);
                emit_stage_failed(&run_id, Stage::Mkdir, &e);
                PackagingOutcome::Failed(Stage::Mkdir)
            }
            Ok(build) => {
                let ctx = RunContext {
                    run_id: run_id.clone(),
                    build_id: build.id().to_string(),
                    language: pipeline.language(),
                    event,
                    work_dir: build.work_dir().to_path_buf(),
                    main_branch: workspace.main_branch.clone(),
                    cancel,
                };
                let outcome = match pipeline.run_stages(&ctx).await {
                    Ok(()) => PackagingOutcome::Succeeded,
                    Err(Interrupt::Cancelled { before }) => {
                        emit_run_cancelled(&run_id, before);
                        PackagingOutcome::Cancelled
                    }
                    Err(Interrupt::Failed { stage, error }) => {
                        metrics.record_failure(stage);
                        emit_stage_failed(&run_id, stage, &error);
                        PackagingOutcome::Failed(stage)
                    }
                };
                if let Err(e) = build.cleanup() {
                    emit_cleanup_error(&run_id, &e);
                }
                outcome
            }
        }
    };

    let elapsed = started.elapsed();
    metrics.record_outcome(outcome, elapsed);
    emit_run_finished(&run_id, outcome, elapsed.as_millis() as u64);
    outcome
}
