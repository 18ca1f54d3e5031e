//! In-memory fakes for the command runner and source-control traits
//! (testing only).
//!
//! - [`RecordingRunner`]: records every command, fails on demand
//! - [`FixtureRepo`]: "clones" by copying a fixture tree, records tags
//! - [`RecordingReleaseApi`]: records release requests, fails on demand

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::domain::{CommandError, PushEvent, ScmError};
use crate::fs::{LocalFs, TreeCopier};
use crate::scm::{CloneRepo, CreatedRelease, ReleaseApi, ReleaseRequest, ScmResult, TagRepo};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type Hook = Box<dyn Fn(&CommandSpec) + Send + Sync>;

// ---------------------------------------------------------------------------
// RecordingRunner
// ---------------------------------------------------------------------------

/// Command runner that never spawns anything.
///
/// Every command succeeds with empty output unless one of its arguments
/// contains a pattern registered with [`RecordingRunner::fail_on`].
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failures: Vec<(String, String)>,
    hooks: Vec<(String, Hook)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit 1 with `output` for commands with an argument containing `pattern`.
    pub fn fail_on(mut self, pattern: impl Into<String>, output: impl Into<String>) -> Self {
        self.failures.push((pattern.into(), output.into()));
        self
    }

    /// Call `hook` before completing commands with an argument containing `pattern`.
    pub fn on_command<F>(mut self, pattern: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&CommandSpec) + Send + Sync + 'static,
    {
        self.hooks.push((pattern.into(), Box::new(hook)));
        self
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }

    /// Rendered command lines, in order.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.calls).iter().map(CommandSpec::display).collect()
    }

    fn matches(spec: &CommandSpec, pattern: &str) -> bool {
        spec.args.iter().any(|a| a.contains(pattern))
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        if spec.program.is_empty() {
            return Err(CommandError::EmptyCommand);
        }
        lock(&self.calls).push(spec.clone());
        for (pattern, hook) in &self.hooks {
            if Self::matches(spec, pattern) {
                hook(spec);
            }
        }
        let failure = self
            .failures
            .iter()
            .find(|(pattern, _)| Self::matches(spec, pattern));
        Ok(match failure {
            Some((_, output)) => CommandOutput {
                exit_code: 1,
                output: output.clone(),
                duration_ms: 0,
            },
            None => CommandOutput {
                exit_code: 0,
                output: String::new(),
                duration_ms: 0,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// FixtureRepo
// ---------------------------------------------------------------------------

/// Source control backed by a fixture directory on disk.
///
/// Cloning copies the fixture tree into the target directory. Tags are only
/// recorded.
#[derive(Debug, Default)]
pub struct FixtureRepo {
    fixture: PathBuf,
    fail_clone: bool,
    fail_tag: bool,
    fail_push: bool,
    clones: Mutex<Vec<(PathBuf, String)>>,
    tags: Mutex<Vec<(String, String)>>,
    pushes: Mutex<usize>,
}

impl FixtureRepo {
    pub fn new(fixture: impl Into<PathBuf>) -> Self {
        Self {
            fixture: fixture.into(),
            ..Self::default()
        }
    }

    pub fn failing_clone(mut self) -> Self {
        self.fail_clone = true;
        self
    }

    pub fn failing_tag(mut self) -> Self {
        self.fail_tag = true;
        self
    }

    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    /// `(target dir, branch)` of every clone.
    pub fn clones(&self) -> Vec<(PathBuf, String)> {
        lock(&self.clones).clone()
    }

    /// `(tag, message)` of every tag created.
    pub fn tags(&self) -> Vec<(String, String)> {
        lock(&self.tags).clone()
    }

    pub fn pushes(&self) -> usize {
        *lock(&self.pushes)
    }

    fn refused(command: &str) -> CommandError {
        CommandError::Failed {
            command: command.to_string(),
            exit_code: 128,
            output: "fatal: refused by fixture".to_string(),
        }
    }
}

#[async_trait]
impl CloneRepo for FixtureRepo {
    async fn clone_with_checkout(&self, dir: &Path, event: &PushEvent) -> ScmResult<()> {
        lock(&self.clones).push((dir.to_path_buf(), event.branch_name().to_string()));
        if self.fail_clone {
            return Err(ScmError::Clone {
                url: event.clone_url.clone(),
                branch: event.branch_name().to_string(),
                source: Self::refused("git clone"),
            });
        }
        LocalFs::new()
            .copy_tree(&self.fixture, dir)
            .map_err(|e| ScmError::Clone {
                url: event.clone_url.clone(),
                branch: event.branch_name().to_string(),
                source: CommandError::Spawn {
                    program: "git".to_string(),
                    source: std::io::Error::other(e.to_string()),
                },
            })
    }
}

#[async_trait]
impl TagRepo for FixtureRepo {
    async fn create_tag(&self, _dir: &Path, version: &str, message: &str) -> ScmResult<()> {
        if self.fail_tag {
            return Err(ScmError::Tag(Self::refused("git tag")));
        }
        lock(&self.tags).push((version.to_string(), message.to_string()));
        Ok(())
    }

    async fn push_tags(&self, _dir: &Path) -> ScmResult<()> {
        if self.fail_push {
            return Err(ScmError::PushTags(Self::refused("git push")));
        }
        *lock(&self.pushes) += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingReleaseApi
// ---------------------------------------------------------------------------

/// Release API that records `(owner, repo, request)` for every call.
#[derive(Debug, Default)]
pub struct RecordingReleaseApi {
    fail_status: Option<u16>,
    requests: Mutex<Vec<(String, String, ReleaseRequest)>>,
}

impl RecordingReleaseApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with HTTP `status`.
    pub fn failing_with(mut self, status: u16) -> Self {
        self.fail_status = Some(status);
        self
    }

    pub fn requests(&self) -> Vec<(String, String, ReleaseRequest)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ReleaseApi for RecordingReleaseApi {
    async fn create_release(
        &self,
        owner: &str,
        repo: &str,
        request: &ReleaseRequest,
    ) -> ScmResult<CreatedRelease> {
        let mut requests = lock(&self.requests);
        requests.push((owner.to_string(), repo.to_string(), request.clone()));
        if let Some(status) = self.fail_status {
            return Err(ScmError::ReleaseApi {
                status,
                body: "{\"message\":\"Validation Failed\"}".to_string(),
            });
        }
        Ok(CreatedRelease {
            id: requests.len() as u64,
            html_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn recording_runner_fails_on_pattern() {
        let runner = RecordingRunner::new().fail_on("publish", "E403 forbidden");
        let ok = runner
            .run(&CommandSpec::new("npm").arg("pack"))
            .await
            .unwrap();
        let bad = runner
            .run(&CommandSpec::new("npm").arg("publish"))
            .await
            .unwrap();
        assert!(ok.passed());
        assert_eq!(bad.exit_code, 1);
        assert_eq!(bad.output, "E403 forbidden");
        assert_eq!(runner.lines(), vec!["npm pack", "npm publish"]);
    }

    #[tokio::test]
    async fn hooks_fire_for_matching_commands() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let runner = RecordingRunner::new().on_command("build", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        runner
            .run(&CommandSpec::new("gem").arg("build"))
            .await
            .unwrap();
        runner
            .run(&CommandSpec::new("gem").arg("push"))
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fixture_repo_copies_tree() {
        let fixture = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(fixture.path().join("ruby/demo")).unwrap();
        std::fs::write(fixture.path().join("ruby/demo/a_pb.rb"), "x").unwrap();
        let target = tempfile::tempdir().unwrap();

        let repo = FixtureRepo::new(fixture.path());
        let event = crate::domain::push_event::sample("refs/heads/main", 1);
        repo.clone_with_checkout(target.path(), &event).await.unwrap();

        assert!(target.path().join("ruby/demo/a_pb.rb").is_file());
        assert_eq!(repo.clones()[0].1, "main");
    }

    #[tokio::test]
    async fn release_api_failure_status() {
        let api = RecordingReleaseApi::new().failing_with(422);
        let req = ReleaseRequest {
            tag_name: "v1".to_string(),
            name: "v1".to_string(),
            body: String::new(),
            prerelease: false,
        };
        let err = api.create_release("acme", "protos", &req).await.unwrap_err();
        assert!(matches!(err, ScmError::ReleaseApi { status: 422, .. }));
        assert_eq!(api.requests().len(), 1);
    }
}
