//! protopack core library
//!
//! Domain model, injectable collaborators (filesystem, commands, source
//! control) and the ambient plumbing shared by the pipelines and the daemon.

pub mod command;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod fs;
pub mod metrics;
pub mod obs;
pub mod scm;
pub mod telemetry;

pub use command::{run_checked, CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner};

pub use config::{
    Config, ConfigError, GitConfig, NpmConfig, RubyConfig, ScalaConfig, WebhookConfig,
};

pub use domain::{
    npm_version, release_version, ruby_version, scala_snapshot, CommandError, FsError, Language,
    PackagingOutcome, PushEvent, ReleaseVersion, ScmError, Stage,
};

pub use fs::{FsResult, LocalFs, ScratchDirs, TreeCopier, TreeReader};

pub use metrics::Metrics;

pub use scm::{
    authenticated_url, CloneRepo, CreatedRelease, GitClient, ReleaseApi, ReleaseRequest,
    ScmResult, TagRepo,
};

pub use telemetry::{init_tracing, LogSettings};
