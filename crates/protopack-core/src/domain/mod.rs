//! Domain models for protopack.
//!
//! Canonical definitions for the per-run entities:
//! - `PushEvent`: Immutable push notification driving one run
//! - `version`: Ecosystem version derivation rules
//! - `PackagingOutcome`: Terminal state of a run, used for logs and metrics

pub mod error;
pub mod outcome;
pub mod push_event;
pub mod version;

// Re-export main types
pub use error::{CommandError, FsError, ScmError};
pub use outcome::{Language, PackagingOutcome, Stage};
pub use push_event::PushEvent;
pub use version::{npm_version, release_version, ruby_version, scala_snapshot, ReleaseVersion};
