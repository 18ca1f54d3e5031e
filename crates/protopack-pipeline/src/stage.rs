//! Native packaging tool definitions.

use serde::{Deserialize, Serialize};

/// The external tool that builds and publishes one ecosystem's artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "tool")]
pub enum Toolchain {
    /// sbt package / sbt publish
    Sbt,

    /// gem build <name>.gemspec / gem push <name>-<version>.gem --host <host>
    Gem { gem_name: String, host: String },

    /// npm pack / npm publish
    Npm,
}

impl Toolchain {
    /// Tool name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Toolchain::Sbt => "sbt",
            Toolchain::Gem { .. } => "gem",
            Toolchain::Npm => "npm",
        }
    }

    /// Command producing the artifact locally (first element is executable).
    pub fn build_command(&self) -> Vec<String> {
        match self {
            Toolchain::Sbt => vec!["sbt".to_string(), "package".to_string()],
            Toolchain::Gem { gem_name, .. } => vec![
                "gem".to_string(),
                "build".to_string(),
                format!("{gem_name}.gemspec"),
            ],
            Toolchain::Npm => vec!["npm".to_string(), "pack".to_string()],
        }
    }

    /// Command pushing the built artifact of `version` to its registry.
    pub fn publish_command(&self, version: &str) -> Vec<String> {
        match self {
            Toolchain::Sbt => vec!["sbt".to_string(), "publish".to_string()],
            Toolchain::Gem { gem_name, host } => vec![
                "gem".to_string(),
                "push".to_string(),
                format!("{gem_name}-{version}.gem"),
                "--host".to_string(),
                host.clone(),
            ],
            Toolchain::Npm => vec!["npm".to_string(), "publish".to_string()],
        }
    }
}
