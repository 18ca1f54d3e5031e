//! Source release pipeline: annotated tag, tag push, hosted release.
//!
//! Tag pushes are skipped outright. The pipeline's own tag push fires a new
//! event, and processing it would loop forever.

use std::sync::Arc;

use async_trait::async_trait;
use protopack_core::{
    release_version, CloneRepo, Language, PushEvent, ReleaseApi, ReleaseRequest, Stage, TagRepo,
};
use tracing::info;

use crate::lifecycle::{clone_into_work_dir, Interrupt, Pipeline, RunContext, StageResultExt, Workspace};

pub const TAG_MESSAGE: &str = "Automated tag by protopack.";
pub const RELEASE_BODY: &str = "Automated release by protopack.";

/// Tags the pushed commit and creates a hosted release for it.
pub struct ReleaseProcessor<R, A> {
    workspace: Workspace,
    repo: Arc<R>,
    api: Arc<A>,
}

impl<R, A> ReleaseProcessor<R, A>
where
    R: CloneRepo + TagRepo + 'static,
    A: ReleaseApi + 'static,
{
    pub fn new(workspace: Workspace, repo: Arc<R>, api: Arc<A>) -> Self {
        Self {
            workspace,
            repo,
            api,
        }
    }
}

#[async_trait]
impl<R, A> Pipeline for ReleaseProcessor<R, A>
where
    R: CloneRepo + TagRepo + 'static,
    A: ReleaseApi + 'static,
{
    fn language(&self) -> Language {
        Language::Release
    }

    fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn skip_reason(&self, event: &PushEvent) -> Option<&'static str> {
        event.is_tag_push().then_some("tag push")
    }

    async fn run_stages(&self, ctx: &RunContext) -> Result<(), Interrupt> {
        let clone_dir =
            clone_into_work_dir(ctx, self.workspace.dirs.as_ref(), self.repo.as_ref()).await?;

        let version = release_version(&ctx.event, &ctx.main_branch);

        ctx.checkpoint(Stage::Release)?;
        self.repo
            .create_tag(&clone_dir, &version.tag, TAG_MESSAGE)
            .await
            .at(Stage::Release)?;
        self.repo.push_tags(&clone_dir).await.at(Stage::Release)?;

        let request = ReleaseRequest {
            tag_name: version.tag.clone(),
            name: version.tag.clone(),
            body: RELEASE_BODY.to_string(),
            prerelease: version.prerelease,
        };
        let created = self
            .api
            .create_release(&ctx.event.owner, &ctx.event.name, &request)
            .await
            .at(Stage::Release)?;
        info!(tag = %version.tag, prerelease = version.prerelease, release_id = created.id, "release published");
        Ok(())
    }
}
