//! Error taxonomy for the collaborators a run depends on.

use std::path::PathBuf;

/// Filesystem service failures, always carrying the offending path.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("could not create directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not delete directory {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read directory {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// External command failures.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command must not be empty")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {exit_code}: {output}")]
    Failed {
        command: String,
        exit_code: i32,
        output: String,
    },
}

/// Source-control client failures.
#[derive(Debug, thiserror::Error)]
pub enum ScmError {
    #[error("clone url was not valid: {0}")]
    AuthUrl(String),

    #[error("could not clone {url} on branch {branch}: {source}")]
    Clone {
        url: String,
        branch: String,
        #[source]
        source: CommandError,
    },

    #[error("could not configure git identity: {0}")]
    Identity(#[source] CommandError),

    #[error("error tagging git repo: {0}")]
    Tag(#[source] CommandError),

    #[error("error pushing git tags: {0}")]
    PushTags(#[source] CommandError),

    #[error("release api returned {status}: {body}")]
    ReleaseApi { status: u16, body: String },

    #[error("http error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ScmError {
    fn from(err: reqwest::Error) -> Self {
        ScmError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failure_display_includes_output() {
        let err = CommandError::Failed {
            command: "gem build demo.gemspec".to_string(),
            exit_code: 1,
            output: "ERROR: missing files".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("gem build demo.gemspec"));
        assert!(msg.contains("code 1"));
        assert!(msg.contains("missing files"));
    }

    #[test]
    fn fs_error_names_path() {
        let err = FsError::Delete {
            path: PathBuf::from("/tmp/abc"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/tmp/abc"));
    }

    #[test]
    fn release_api_error_display() {
        let err = ScmError::ReleaseApi {
            status: 422,
            body: "already_exists".to_string(),
        };
        assert!(err.to_string().contains("422"));
    }
}
