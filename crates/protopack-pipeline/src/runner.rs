//! External packager invocation: an always-run build step and an optional
//! publish step, reported independently.

use std::path::Path;
use std::sync::Arc;

use protopack_core::{run_checked, CommandError, CommandOutput, CommandRunner, CommandSpec};
use tracing::info;

use crate::stage::Toolchain;

/// Build or publish step failure.
#[derive(Debug, thiserror::Error)]
pub enum PackagerError {
    #[error("{tool} build failed: {source}")]
    Build {
        tool: &'static str,
        #[source]
        source: CommandError,
    },

    #[error("{tool} publish failed: {source}")]
    Publish {
        tool: &'static str,
        #[source]
        source: CommandError,
    },
}

impl PackagerError {
    fn command_error(&self) -> &CommandError {
        match self {
            PackagerError::Build { source, .. } | PackagerError::Publish { source, .. } => source,
        }
    }

    /// Exit code of the failed tool, if it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self.command_error() {
            CommandError::Failed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Captured stdout and stderr of the failed tool.
    pub fn output(&self) -> Option<&str> {
        match self.command_error() {
            CommandError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Runs a [`Toolchain`] inside a staged build directory.
#[derive(Clone)]
pub struct Packager {
    toolchain: Toolchain,
    runner: Arc<dyn CommandRunner>,
    secrets: Vec<String>,
}

impl Packager {
    pub fn new(toolchain: Toolchain, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            toolchain,
            runner,
            secrets: Vec::new(),
        }
    }

    /// Mask `secret` in logged commands and captured output.
    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    fn spec(&self, argv: &[String], dir: &Path) -> Result<CommandSpec, CommandError> {
        let spec = CommandSpec::from_argv(argv)?.current_dir(dir);
        Ok(self
            .secrets
            .iter()
            .fold(spec, |spec, secret| spec.redact(secret.clone())))
    }

    /// Build the artifact in `dir`.
    pub async fn build(&self, dir: &Path) -> Result<CommandOutput, PackagerError> {
        let tool = self.toolchain.name();
        let result = async {
            let spec = self.spec(&self.toolchain.build_command(), dir)?;
            run_checked(self.runner.as_ref(), &spec).await
        }
        .await;
        let output = result.map_err(|source| PackagerError::Build { tool, source })?;
        info!(tool, duration_ms = output.duration_ms, "artifact built");
        Ok(output)
    }

    /// Publish the artifact built in `dir` as `version`.
    pub async fn publish(&self, dir: &Path, version: &str) -> Result<CommandOutput, PackagerError> {
        let tool = self.toolchain.name();
        let result = async {
            let spec = self.spec(&self.toolchain.publish_command(version), dir)?;
            run_checked(self.runner.as_ref(), &spec).await
        }
        .await;
        let output = result.map_err(|source| PackagerError::Publish { tool, source })?;
        info!(tool, version, duration_ms = output.duration_ms, "artifact published");
        Ok(output)
    }
}
