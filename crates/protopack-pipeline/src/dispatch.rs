//! Event dispatch: one spawned task per push event.
//!
//! [`Dispatcher::dispatch`] returns as soon as the task is spawned, so the
//! HTTP handler never waits on a run. The returned [`RunHandle`] lets tests
//! (and shutdown) await the outcome instead of racing it.

use std::sync::Arc;

use protopack_core::{PackagingOutcome, PushEvent};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::processors::Processor;

/// The run task ended without producing an outcome.
#[derive(Debug, thiserror::Error)]
#[error("packaging task did not complete: {0}")]
pub struct DispatchError(#[from] tokio::task::JoinError);

/// Handle to one spawned run.
#[derive(Debug)]
pub struct RunHandle {
    inner: JoinHandle<PackagingOutcome>,
}

impl RunHandle {
    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<PackagingOutcome, DispatchError> {
        Ok(self.inner.await?)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Hands push events to the configured processor.
#[derive(Clone)]
pub struct Dispatcher {
    processor: Arc<dyn Processor>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(processor: Arc<dyn Processor>, cancel: CancellationToken) -> Self {
        Self {
            processor,
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    /// Start processing `event` in the background.
    pub fn dispatch(&self, event: PushEvent) -> RunHandle {
        let processor = self.processor.clone();
        let cancel = self.cancel.clone();
        let inner = self
            .tracker
            .spawn(async move { processor.process(event, cancel).await });
        RunHandle { inner }
    }

    /// Number of runs still in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal cancellation and wait for every in-flight run to clean up.
    ///
    /// Runs already inside a tool invocation finish that invocation first.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        info!(in_flight = self.tracker.len(), "waiting for packaging runs");
        self.tracker.wait().await;
    }
}
