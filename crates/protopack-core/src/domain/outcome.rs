//! Run outcomes, failure stages and the ecosystem selector.

use serde::{Deserialize, Serialize};

/// Target ecosystem handled by the configured processor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// JVM jar built and published with sbt.
    Scala,

    /// Ruby gem built and pushed with `gem`.
    Ruby,

    /// npm package packed and published with `npm`.
    Npm,

    /// Annotated tag plus hosted release, no artifact.
    Release,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Scala => "scala",
            Language::Ruby => "ruby",
            Language::Npm => "npm",
            Language::Release => "release",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scala" => Ok(Language::Scala),
            "ruby" => Ok(Language::Ruby),
            "npm" => Ok(Language::Npm),
            "release" => Ok(Language::Release),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Mkdir,
    Clone,
    Create,
    Build,
    Publish,
    Release,
}

impl Stage {
    /// All stages, in lifecycle order.
    pub const ALL: [Stage; 6] = [
        Stage::Mkdir,
        Stage::Clone,
        Stage::Create,
        Stage::Build,
        Stage::Publish,
        Stage::Release,
    ];

    /// Metric and log label.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Mkdir => "mkdir",
            Stage::Clone => "clone",
            Stage::Create => "create",
            Stage::Build => "build",
            Stage::Publish => "publish",
            Stage::Release => "release",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal state of one run. Only observed through logs, metrics and
/// the dispatcher's run handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "stage")]
pub enum PackagingOutcome {
    /// All stages completed.
    Succeeded,

    /// A stage failed; the run stopped there.
    Failed(Stage),

    /// Shutdown was signalled before the run finished.
    Cancelled,

    /// The event was deliberately skipped (e.g. a tag push).
    Ignored,
}

impl PackagingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PackagingOutcome::Succeeded)
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PackagingOutcome::Failed(stage) => Some(*stage),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PackagingOutcome::Succeeded => "succeeded",
            PackagingOutcome::Failed(_) => "failed",
            PackagingOutcome::Cancelled => "cancelled",
            PackagingOutcome::Ignored => "ignored",
        }
    }
}
