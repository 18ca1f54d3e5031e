//! Ruby gem pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use protopack_core::{
    ruby_version, CloneRepo, CommandRunner, Language, RubyConfig, ScratchDirs, Stage, TreeCopier,
};
use serde::Serialize;
use tracing::debug;

use super::StagingError;
use crate::lifecycle::{clone_into_work_dir, Interrupt, Pipeline, RunContext, StageResultExt, Workspace};
use crate::runner::Packager;
use crate::stage::Toolchain;
use crate::template::{ManifestPlan, TemplateStore};

/// Values available to the gem templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RubyValues {
    pub authors: String,
    pub email: String,
    pub gem_name: String,
    pub gem_repo_host: String,
    pub grpc_version: String,
    pub homepage: String,
    pub version: String,
}

impl RubyValues {
    pub fn new(config: &RubyConfig, version: String) -> Self {
        Self {
            authors: config.authors.clone(),
            email: config.email.clone(),
            gem_name: config.gem_name.clone(),
            gem_repo_host: config.gem_repo_host.clone(),
            grpc_version: config.grpc_version.clone(),
            homepage: config.homepage.clone(),
            version,
        }
    }
}

/// Builds (and optionally pushes) a gem.
pub struct RubyProcessor<F, R> {
    config: RubyConfig,
    workspace: Workspace,
    fs: Arc<F>,
    repo: Arc<R>,
    templates: Arc<dyn TemplateStore>,
    packager: Packager,
}

impl<F, R> RubyProcessor<F, R>
where
    F: ScratchDirs + TreeCopier + 'static,
    R: CloneRepo + 'static,
{
    pub fn new(
        config: RubyConfig,
        workspace: Workspace,
        fs: Arc<F>,
        repo: Arc<R>,
        templates: Arc<dyn TemplateStore>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let toolchain = Toolchain::Gem {
            gem_name: config.gem_name.clone(),
            host: config.gem_repo_host.clone(),
        };
        let packager = Packager::new(toolchain, runner).redact(config.gem_repo_pass.clone());
        Self {
            config,
            workspace,
            fs,
            repo,
            templates,
            packager,
        }
    }

    /// `<unique>/<gem_name>/` with the gemspec, Gemfile and `lib/`.
    fn stage_gem(
        &self,
        ctx: &RunContext,
        clone_dir: &Path,
        values: &RubyValues,
    ) -> Result<PathBuf, StagingError> {
        let gem = &self.config.gem_name;
        let gem_dir = self.fs.create_unique_dir(&ctx.work_dir)?.join(gem);

        ManifestPlan::new(&gem_dir)
            .dir("lib")
            .file("ruby/Gemfile", "Gemfile")
            .file("ruby/gem.gemspec", format!("{gem}.gemspec"))
            .file("ruby/gem.rb", format!("lib/{gem}.rb"))
            .apply(self.templates.as_ref(), values)?;

        self.fs
            .copy_tree(&clone_dir.join(&self.config.source_root), &gem_dir.join("lib"))?;
        debug!(gem_dir = %gem_dir.display(), "gem staged");
        Ok(gem_dir)
    }
}

#[async_trait]
impl<F, R> Pipeline for RubyProcessor<F, R>
where
    F: ScratchDirs + TreeCopier + 'static,
    R: CloneRepo + 'static,
{
    fn language(&self) -> Language {
        Language::Ruby
    }

    fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    async fn run_stages(&self, ctx: &RunContext) -> Result<(), Interrupt> {
        let clone_dir = clone_into_work_dir(ctx, self.fs.as_ref(), self.repo.as_ref()).await?;

        let version = ruby_version(&ctx.event, &ctx.main_branch);
        debug!(gem = %self.config.gem_name, version = %version, "gem versioned");
        let values = RubyValues::new(&self.config, version);

        ctx.checkpoint(Stage::Create)?;
        let gem_dir = self
            .stage_gem(ctx, &clone_dir, &values)
            .at(Stage::Create)?;

        ctx.checkpoint(Stage::Build)?;
        self.packager.build(&gem_dir).await.at(Stage::Build)?;

        if self.config.publish {
            ctx.checkpoint(Stage::Publish)?;
            self.packager
                .publish(&gem_dir, &values.version)
                .await
                .at(Stage::Publish)?;
        }
        Ok(())
    }
}
