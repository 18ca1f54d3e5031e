//! Version derivation rules, one per target ecosystem.
//!
//! Every rule is a pure function of the push event (ref, push timestamp,
//! branch name) and the configured main-branch marker. Main-branch pushes
//! never yield a prerelease; every other branch does.

use serde::{Deserialize, Serialize};

use super::push_event::PushEvent;

/// Prerelease identifier used when a branch name has no usable characters.
const FALLBACK_BRANCH_ID: &str = "branch";

/// Tag name and prerelease flag for a source release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseVersion {
    /// Tag and display name, e.g. `v1.0.1000`.
    pub tag: String,
    pub prerelease: bool,
}

/// Snapshot flag handed to the sbt templates.
///
/// The version string itself is left to sbt, which derives it from this flag
/// and the build number.
pub fn scala_snapshot(event: &PushEvent, main_branch: &str) -> bool {
    !event.is_main_branch(main_branch)
}

/// Gem version: `1.0.<ts>` on main, `1.0.<ts>.pre.<branch>` elsewhere.
///
/// Gem versions only allow dots between alphanumeric segments, so every other
/// character in the branch name acts as a segment separator.
pub fn ruby_version(event: &PushEvent, main_branch: &str) -> String {
    if event.is_main_branch(main_branch) {
        return format!("1.0.{}", event.pushed_at);
    }
    let segments: Vec<&str> = event
        .branch_name()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect();
    let pre = if segments.is_empty() {
        FALLBACK_BRANCH_ID.to_string()
    } else {
        segments.join(".")
    };
    format!("1.0.{}.pre.{}", event.pushed_at, pre)
}

/// npm version: `1.0.<ts>` on main, `1.0.<ts>-<branch>` elsewhere.
///
/// The branch is lower-cased and anything outside `[a-z0-9-]` becomes a dash
/// so the prerelease part stays a single semver identifier. Leading and
/// trailing dashes are trimmed.
pub fn npm_version(event: &PushEvent, main_branch: &str) -> String {
    if event.is_main_branch(main_branch) {
        return format!("1.0.{}", event.pushed_at);
    }
    let branch: String = event
        .branch_name()
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let branch = branch.trim_matches('-');
    let branch = if branch.is_empty() {
        FALLBACK_BRANCH_ID
    } else {
        branch
    };
    format!("1.0.{}-{}", event.pushed_at, branch)
}

/// Release tag: `v1.0.<ts>` on main, `v1.0.<ts>-beta.<branch>` elsewhere.
pub fn release_version(event: &PushEvent, main_branch: &str) -> ReleaseVersion {
    if event.is_main_branch(main_branch) {
        ReleaseVersion {
            tag: format!("v1.0.{}", event.pushed_at),
            prerelease: false,
        }
    } else {
        ReleaseVersion {
            tag: format!("v1.0.{}-beta.{}", event.pushed_at, event.branch_name()),
            prerelease: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::push_event::sample;

    #[test]
    fn scala_snapshot_only_off_main() {
        assert!(!scala_snapshot(&sample("refs/heads/main", 1000), "main"));
        assert!(scala_snapshot(&sample("refs/heads/feature/x", 1000), "main"));
    }

    #[test]
    fn ruby_main_is_plain_release() {
        let v = ruby_version(&sample("refs/heads/main", 1000), "main");
        assert_eq!(v, "1.0.1000");
    }

    #[test]
    fn ruby_branch_is_prerelease_with_dot_segments() {
        let main = ruby_version(&sample("refs/heads/main", 1000), "main");
        let v = ruby_version(&sample("refs/heads/feature/x", 1000), "main");
        assert_eq!(v, "1.0.1000.pre.feature.x");
        assert_ne!(v, main);
        assert!(v.contains(".pre."));
        assert!(!v.contains('/'));
    }

    #[test]
    fn ruby_collapses_repeated_separators() {
        let v = ruby_version(&sample("refs/heads/fix--thing_2", 7), "main");
        assert_eq!(v, "1.0.7.pre.fix.thing.2");
    }

    #[test]
    fn ruby_branch_without_alphanumerics_keeps_prerelease_segment() {
        for branch in ["_", "--", "ü"] {
            let v = ruby_version(&sample(&format!("refs/heads/{branch}"), 7), "main");
            assert_eq!(v, "1.0.7.pre.branch", "{branch}");
        }
    }

    #[test]
    fn npm_main_is_plain_release() {
        assert_eq!(npm_version(&sample("refs/heads/main", 42), "main"), "1.0.42");
    }

    #[test]
    fn npm_branch_is_lowercase_dash_prerelease() {
        let v = npm_version(&sample("refs/heads/Feature/My_Thing", 42), "main");
        assert_eq!(v, "1.0.42-feature-my-thing");
    }

    #[test]
    fn npm_branch_without_alphanumerics_keeps_identifier() {
        for branch in ["_", "--", "ü"] {
            let v = npm_version(&sample(&format!("refs/heads/{branch}"), 7), "main");
            assert_eq!(v, "1.0.7-branch", "{branch}");
        }
        let v = npm_version(&sample("refs/heads/_wip_", 7), "main");
        assert_eq!(v, "1.0.7-wip");
    }

    #[test]
    fn release_main_and_branch() {
        let main = release_version(&sample("refs/heads/main", 5), "main");
        assert_eq!(main.tag, "v1.0.5");
        assert!(!main.prerelease);

        let branch = release_version(&sample("refs/heads/dev", 5), "main");
        assert_eq!(branch.tag, "v1.0.5-beta.dev");
        assert!(branch.prerelease);
    }

    #[test]
    fn derivation_is_deterministic() {
        let event = sample("refs/heads/feature/x", 99);
        assert_eq!(ruby_version(&event, "main"), ruby_version(&event, "main"));
        assert_eq!(npm_version(&event, "main"), npm_version(&event, "main"));
        assert_eq!(
            release_version(&event, "main"),
            release_version(&event, "main")
        );
    }
}
