//! JVM jar pipeline: one sbt project per push, fanning out over every
//! package directory under the generated-code root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use protopack_core::{
    scala_snapshot, CloneRepo, CommandRunner, Language, PushEvent, ScalaConfig, ScratchDirs,
    Stage, TreeCopier, TreeReader,
};
use serde::Serialize;
use tracing::debug;

use super::StagingError;
use crate::lifecycle::{clone_into_work_dir, Interrupt, Pipeline, RunContext, StageResultExt, Workspace};
use crate::runner::Packager;
use crate::stage::Toolchain;
use crate::template::{ManifestPlan, TemplateStore};

const DEFAULT_NAMESPACE: &str = "com";

/// Values available to the sbt templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalaValues {
    pub name: String,
    pub organization: String,
    pub description: String,
    pub jar_dir: String,
    pub build_number: i64,
    pub snapshot: bool,
    pub maven_repo_publish_target: String,
    pub maven_repo_host: String,
    pub maven_repo_user: String,
    pub maven_repo_password: String,
    pub realm: String,
    pub sbt_version: String,
    pub sbt_protoc_plugin_version: String,
    pub scala_version: String,
    pub legacy_scala_version: String,
    pub scalapb_runtime_version: String,
}

impl ScalaValues {
    pub fn new(config: &ScalaConfig, event: &PushEvent, snapshot: bool) -> Self {
        Self {
            name: config.jar_name.clone(),
            organization: config.organization.clone(),
            description: config.description.clone(),
            jar_dir: ".".to_string(),
            build_number: event.pushed_at,
            snapshot,
            maven_repo_publish_target: config.maven_repo_publish_target.clone(),
            maven_repo_host: config.maven_repo_host.clone(),
            maven_repo_user: config.maven_repo_user.clone(),
            maven_repo_password: config.maven_repo_password.clone(),
            realm: config.realm.clone(),
            sbt_version: config.sbt_version.clone(),
            sbt_protoc_plugin_version: config.sbt_protoc_plugin_version.clone(),
            scala_version: config.scala_version.clone(),
            legacy_scala_version: config.legacy_scala_version.clone(),
            scalapb_runtime_version: config.scalapb_runtime_version.clone(),
        }
    }
}

/// Builds (and optionally publishes) a jar with sbt.
pub struct ScalaProcessor<F, R> {
    config: ScalaConfig,
    workspace: Workspace,
    fs: Arc<F>,
    repo: Arc<R>,
    templates: Arc<dyn TemplateStore>,
    packager: Packager,
}

impl<F, R> ScalaProcessor<F, R>
where
    F: ScratchDirs + TreeReader + TreeCopier + 'static,
    R: CloneRepo + 'static,
{
    pub fn new(
        config: ScalaConfig,
        workspace: Workspace,
        fs: Arc<F>,
        repo: Arc<R>,
        templates: Arc<dyn TemplateStore>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let packager =
            Packager::new(Toolchain::Sbt, runner).redact(config.maven_repo_password.clone());
        Self {
            config,
            workspace,
            fs,
            repo,
            templates,
            packager,
        }
    }

    /// Last component of the source root, reproduced inside the jar dir.
    fn namespace(&self) -> PathBuf {
        Path::new(&self.config.source_root)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_NAMESPACE))
    }

    /// Render the sbt project and copy every generated package into it.
    fn stage_jar(
        &self,
        ctx: &RunContext,
        clone_dir: &Path,
        values: &ScalaValues,
    ) -> Result<PathBuf, StagingError> {
        let source_root = clone_dir.join(&self.config.source_root);
        let packages = self.fs.sub_directories(&source_root)?;
        let jar_dir = self.fs.create_unique_dir(&ctx.work_dir)?;

        ManifestPlan::new(&jar_dir)
            .dir("project")
            .file("scala/build.sbt", "build.sbt")
            .file("scala/version.sbt", "version.sbt")
            .file("scala/project/build.properties", "project/build.properties")
            .file("scala/project/plugins.sbt", "project/plugins.sbt")
            .apply(self.templates.as_ref(), values)?;

        let namespace = jar_dir.join(self.namespace());
        for package in &packages {
            self.fs
                .copy_tree(&source_root.join(package), &namespace.join(package))?;
        }
        debug!(packages = ?packages, jar_dir = %jar_dir.display(), "jar staged");
        Ok(jar_dir)
    }
}

#[async_trait]
impl<F, R> Pipeline for ScalaProcessor<F, R>
where
    F: ScratchDirs + TreeReader + TreeCopier + 'static,
    R: CloneRepo + 'static,
{
    fn language(&self) -> Language {
        Language::Scala
    }

    fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    async fn run_stages(&self, ctx: &RunContext) -> Result<(), Interrupt> {
        let clone_dir = clone_into_work_dir(ctx, self.fs.as_ref(), self.repo.as_ref()).await?;

        let snapshot = scala_snapshot(&ctx.event, &ctx.main_branch);
        let values = ScalaValues::new(&self.config, &ctx.event, snapshot);
        debug!(jar = %values.name, build_number = values.build_number, snapshot, "jar versioned");

        ctx.checkpoint(Stage::Create)?;
        let jar_dir = self
            .stage_jar(ctx, &clone_dir, &values)
            .at(Stage::Create)?;

        ctx.checkpoint(Stage::Build)?;
        self.packager.build(&jar_dir).await.at(Stage::Build)?;

        if self.config.publish {
            ctx.checkpoint(Stage::Publish)?;
            let version = format!("1.0.{}", values.build_number);
            self.packager
                .publish(&jar_dir, &version)
                .await
                .at(Stage::Publish)?;
        }
        Ok(())
    }
}
