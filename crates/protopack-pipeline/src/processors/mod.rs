//! Packaging processors, one per target ecosystem.
//!
//! Each processor implements [`Pipeline`] with its own staging steps; the
//! blanket [`Processor`] impl wraps them in the shared lifecycle and a
//! run-scoped tracing span.

mod npm;
mod release;
mod ruby;
mod scala;

pub use npm::{NpmProcessor, NpmValues};
pub use release::{ReleaseProcessor, RELEASE_BODY, TAG_MESSAGE};
pub use ruby::{RubyProcessor, RubyValues};
pub use scala::{ScalaProcessor, ScalaValues};

use async_trait::async_trait;
use protopack_core::obs::RunSpan;
use protopack_core::{FsError, PackagingOutcome, PushEvent};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::lifecycle::{drive, Pipeline};
use crate::template::ManifestError;

/// Handles one push event to completion. Never fails outward; the outcome
/// only feeds logs, metrics and the dispatcher's run handle.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, event: PushEvent, cancel: CancellationToken) -> PackagingOutcome;
}

#[async_trait]
impl<P> Processor for P
where
    P: Pipeline,
{
    async fn process(&self, event: PushEvent, cancel: CancellationToken) -> PackagingOutcome {
        let run_id = Uuid::new_v4().to_string();
        let span = RunSpan::new(&run_id, self.language(), &event.git_ref);
        span.instrument(drive(self, run_id, event, cancel)).await
    }
}

/// Failure while assembling a build directory.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}
