//! protopack packaging pipelines
//!
//! Turns a push event into a staged, versioned build directory, renders the
//! ecosystem's manifests, runs its native packaging tool and always cleans
//! up. One processor per ecosystem; the dispatcher runs each event as its
//! own task.

pub mod dispatch;
pub mod lifecycle;
pub mod processors;
pub mod runner;
pub mod stage;
pub mod template;

pub use dispatch::{DispatchError, Dispatcher, RunHandle};
pub use lifecycle::{BuildContext, Interrupt, Pipeline, RunContext, StageResultExt, Workspace};
pub use processors::{
    NpmProcessor, Processor, ReleaseProcessor, RubyProcessor, ScalaProcessor, StagingError,
};
pub use runner::{Packager, PackagerError};
pub use stage::Toolchain;
pub use template::{render, BundledTemplates, ManifestError, ManifestPlan, TemplateStore};
