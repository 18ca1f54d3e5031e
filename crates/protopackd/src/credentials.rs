//! Gem registry credentials bootstrap.
//!
//! `gem push` reads its API key from a credentials file. The daemon fetches
//! the key once at startup so publishing never prompts.

use std::path::{Path, PathBuf};

use protopack_core::RubyConfig;
use tracing::info;

const API_KEY_PATH: &str = "api/v1/api_key.yaml";

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("could not request gem API key from {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("gem API key request to {url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("HOME is not set and ruby.credentials_path is not configured")]
    NoHome,

    #[error("could not write gem credentials to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configured path, or `$HOME/.gem/credentials`.
pub fn credentials_path(config: &RubyConfig) -> Result<PathBuf, CredentialsError> {
    if let Some(path) = &config.credentials_path {
        return Ok(path.clone());
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".gem").join("credentials"))
        .ok_or(CredentialsError::NoHome)
}

/// Fetch the API key with basic auth and store it for `gem push`.
pub async fn bootstrap(config: &RubyConfig) -> Result<PathBuf, CredentialsError> {
    let path = credentials_path(config)?;
    let url = format!("{}/{API_KEY_PATH}", config.gem_repo_host.trim_end_matches('/'));

    let response = reqwest::Client::new()
        .get(&url)
        .basic_auth(&config.gem_repo_user, Some(&config.gem_repo_pass))
        .send()
        .await
        .map_err(|source| CredentialsError::Request {
            url: url.clone(),
            source,
        })?;
    if !response.status().is_success() {
        return Err(CredentialsError::Status {
            url,
            status: response.status().as_u16(),
        });
    }
    let content = response
        .text()
        .await
        .map_err(|source| CredentialsError::Request {
            url: url.clone(),
            source,
        })?;

    write_credentials(&path, &content)?;
    info!(path = %path.display(), host = %config.gem_repo_host, "gem credentials installed");
    Ok(path)
}

/// Write `content` readable by the owner only.
pub fn write_credentials(path: &Path, content: &str) -> Result<(), CredentialsError> {
    let write_err = |source| CredentialsError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, content).map_err(write_err)?;
    restrict(path).map_err(write_err)
}

#[cfg(unix)]
fn restrict(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
