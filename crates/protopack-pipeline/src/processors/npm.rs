//! npm package pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use protopack_core::{
    npm_version, CloneRepo, CommandRunner, Language, NpmConfig, ScratchDirs, Stage, TreeCopier,
};
use serde::Serialize;
use tracing::debug;

use super::StagingError;
use crate::lifecycle::{clone_into_work_dir, Interrupt, Pipeline, RunContext, StageResultExt, Workspace};
use crate::runner::Packager;
use crate::stage::Toolchain;
use crate::template::{ManifestPlan, TemplateStore};

/// Values available to the npm templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NpmValues {
    pub package_name: String,
    pub version: String,
    pub project_url: String,
    pub registry_url: String,
    /// Registry URL without its scheme, as `.npmrc` auth keys expect.
    pub registry_auth_prefix: String,
    pub protobuf_version: String,
    pub token: String,
    pub email: String,
}

impl NpmValues {
    pub fn new(config: &NpmConfig, version: String) -> Self {
        Self {
            package_name: config.package_name.clone(),
            version,
            project_url: config.project_url.clone(),
            registry_url: config.registry_url.clone(),
            registry_auth_prefix: auth_prefix(&config.registry_url),
            protobuf_version: config.protobuf_version.clone(),
            token: config.token.clone(),
            email: config.email.clone(),
        }
    }
}

/// `https://registry.npmjs.org/` -> `//registry.npmjs.org/`
fn auth_prefix(registry_url: &str) -> String {
    let rest = registry_url
        .strip_prefix("https:")
        .or_else(|| registry_url.strip_prefix("http:"))
        .unwrap_or(registry_url);
    if rest.ends_with('/') {
        rest.to_string()
    } else {
        format!("{rest}/")
    }
}

/// Packs (and optionally publishes) an npm package.
pub struct NpmProcessor<F, R> {
    config: NpmConfig,
    workspace: Workspace,
    fs: Arc<F>,
    repo: Arc<R>,
    templates: Arc<dyn TemplateStore>,
    packager: Packager,
}

impl<F, R> NpmProcessor<F, R>
where
    F: ScratchDirs + TreeCopier + 'static,
    R: CloneRepo + 'static,
{
    pub fn new(
        config: NpmConfig,
        workspace: Workspace,
        fs: Arc<F>,
        repo: Arc<R>,
        templates: Arc<dyn TemplateStore>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let packager = Packager::new(Toolchain::Npm, runner).redact(config.token.clone());
        Self {
            config,
            workspace,
            fs,
            repo,
            templates,
            packager,
        }
    }

    /// `<unique>/` with `package.json`, `.npmrc` and `dist/`.
    fn stage_package(
        &self,
        ctx: &RunContext,
        clone_dir: &Path,
        values: &NpmValues,
    ) -> Result<PathBuf, StagingError> {
        let package_dir = self.fs.create_unique_dir(&ctx.work_dir)?;

        ManifestPlan::new(&package_dir)
            .dir("dist")
            .file("npm/package.json", "package.json")
            .file("npm/.npmrc", ".npmrc")
            .apply(self.templates.as_ref(), values)?;

        self.fs.copy_tree(
            &clone_dir.join(&self.config.source_root),
            &package_dir.join("dist"),
        )?;
        debug!(package_dir = %package_dir.display(), "package staged");
        Ok(package_dir)
    }
}

#[async_trait]
impl<F, R> Pipeline for NpmProcessor<F, R>
where
    F: ScratchDirs + TreeCopier + 'static,
    R: CloneRepo + 'static,
{
    fn language(&self) -> Language {
        Language::Npm
    }

    fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    async fn run_stages(&self, ctx: &RunContext) -> Result<(), Interrupt> {
        let clone_dir = clone_into_work_dir(ctx, self.fs.as_ref(), self.repo.as_ref()).await?;

        let version = npm_version(&ctx.event, &ctx.main_branch);
        debug!(package = %self.config.package_name, version = %version, "package versioned");
        let values = NpmValues::new(&self.config, version);

        ctx.checkpoint(Stage::Create)?;
        let package_dir = self
            .stage_package(ctx, &clone_dir, &values)
            .at(Stage::Create)?;

        ctx.checkpoint(Stage::Build)?;
        self.packager.build(&package_dir).await.at(Stage::Build)?;

        if self.config.publish {
            ctx.checkpoint(Stage::Publish)?;
            self.packager
                .publish(&package_dir, &values.version)
                .await
                .at(Stage::Publish)?;
        }
        Ok(())
    }
}
