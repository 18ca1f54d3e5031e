//! Push event record driving a single packaging run.

use serde::{Deserialize, Serialize};

const HEADS_PREFIX: &str = "refs/heads/";
const TAGS_PREFIX: &str = "refs/tags/";

/// A validated push notification.
///
/// Constructed once by the webhook layer and handed, immutably, to exactly
/// one processor run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Full ref that was pushed, e.g. `refs/heads/main`.
    pub git_ref: String,

    /// HTTPS clone URL of the repository.
    pub clone_url: String,

    /// Repository owner login.
    pub owner: String,

    /// Repository name.
    pub name: String,

    /// Head commit of the push.
    pub head_commit: String,

    /// Push timestamp in seconds; doubles as the build number.
    pub pushed_at: i64,
}

impl PushEvent {
    /// Ref with its `refs/heads/` or `refs/tags/` namespace stripped.
    pub fn branch_name(&self) -> &str {
        self.git_ref
            .strip_prefix(HEADS_PREFIX)
            .or_else(|| self.git_ref.strip_prefix(TAGS_PREFIX))
            .unwrap_or(&self.git_ref)
    }

    /// Whether the push created or moved a tag rather than a branch.
    pub fn is_tag_push(&self) -> bool {
        self.git_ref.starts_with(TAGS_PREFIX)
    }

    /// Whether the push is on the main branch.
    ///
    /// A full ref marker (`refs/heads/main`) must match exactly. Any other
    /// marker matches by containment, so `main` also accepts
    /// `refs/heads/maintenance`.
    pub fn is_main_branch(&self, marker: &str) -> bool {
        if marker.starts_with("refs/") {
            self.git_ref == marker
        } else {
            self.git_ref.contains(marker)
        }
    }

    /// `owner/name` slug for log fields.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
pub(crate) fn sample(git_ref: &str, pushed_at: i64) -> PushEvent {
    PushEvent {
        git_ref: git_ref.to_string(),
        clone_url: "https://github.com/acme/protos.git".to_string(),
        owner: "acme".to_string(),
        name: "protos".to_string(),
        head_commit: "6113728f27ae82c7b1a177c8d03f9e96e0adf246".to_string(),
        pushed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_name_strips_heads_prefix() {
        let event = sample("refs/heads/feature/x", 1);
        assert_eq!(event.branch_name(), "feature/x");
        assert!(!event.is_tag_push());
    }

    #[test]
    fn branch_name_strips_tags_prefix() {
        let event = sample("refs/tags/v1.0.5", 1);
        assert_eq!(event.branch_name(), "v1.0.5");
        assert!(event.is_tag_push());
    }

    #[test]
    fn unqualified_ref_is_returned_as_is() {
        let event = sample("main", 1);
        assert_eq!(event.branch_name(), "main");
    }

    #[test]
    fn main_branch_marker_matches_by_containment() {
        assert!(sample("refs/heads/main", 1).is_main_branch("main"));
        assert!(!sample("refs/heads/develop", 1).is_main_branch("main"));
        assert!(sample("refs/heads/master", 1).is_main_branch("master"));
        assert!(sample("refs/heads/maintenance", 1).is_main_branch("main"));
    }

    #[test]
    fn full_ref_marker_matches_exactly() {
        assert!(sample("refs/heads/main", 1).is_main_branch("refs/heads/main"));
        assert!(!sample("refs/heads/maintenance", 1).is_main_branch("refs/heads/main"));
        assert!(!sample("refs/heads/domain-fix", 1).is_main_branch("refs/heads/main"));
    }

    #[test]
    fn slug_joins_owner_and_name() {
        assert_eq!(sample("refs/heads/main", 1).slug(), "acme/protos");
    }
}
