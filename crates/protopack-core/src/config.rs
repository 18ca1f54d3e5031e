//! Service configuration: YAML file with `PF_*` environment overrides.
//!
//! Every leaf key maps to an environment variable named after its path,
//! upper-cased and joined with `_` under the `PF` prefix:
//! `language` -> `PF_LANGUAGE`, `git.username` -> `PF_GIT_USERNAME`,
//! `ruby.publish` -> `PF_RUBY_PUBLISH`. Empty variables never override.
//!
//! Loaded once at startup and read-only afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Language;

const ENV_PREFIX: &str = "PF";

/// Configuration errors, all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable {var} is not valid: {message}")]
    Env { var: String, message: String },

    #[error("could not merge environment values: {0}")]
    Merge(#[from] serde_json::Error),

    #[error("language is not configured (set `language` or PF_LANGUAGE)")]
    MissingLanguage,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ecosystem handled by this instance.
    pub language: Option<Language>,
    pub log_level: String,
    pub log_json: bool,
    /// Service name, used as the `app` metric label.
    pub name: String,
    pub port: u16,
    /// Parent of every per-run work directory. Defaults to the system temp dir.
    pub scratch_root: Option<PathBuf>,
    /// Refs containing this marker are treated as the main branch. A marker
    /// starting with `refs/` must equal the ref instead.
    pub main_branch: String,
    pub webhook: WebhookConfig,
    pub git: GitConfig,
    pub scala: ScalaConfig,
    pub ruby: RubyConfig,
    pub npm: NpmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: None,
            log_level: "info".to_string(),
            log_json: false,
            name: "protopack".to_string(),
            port: 8080,
            scratch_root: None,
            main_branch: "main".to_string(),
            webhook: WebhookConfig::default(),
            git: GitConfig::default(),
            scala: ScalaConfig::default(),
            ruby: RubyConfig::default(),
            npm: NpmConfig::default(),
        }
    }
}

/// Webhook validation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared secret; empty disables signature verification.
    pub secret: String,
}

/// Source-control credentials and identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub username: String,
    pub token: String,
    pub email: String,
    pub committer_name: String,
    pub api_url: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            token: String::new(),
            email: String::new(),
            committer_name: "protopack".to_string(),
            api_url: "https://api.github.com".to_string(),
        }
    }
}

/// JVM/sbt packaging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalaConfig {
    pub description: String,
    pub jar_name: String,
    pub organization: String,
    pub maven_repo_publish_target: String,
    /// Derived from `maven_repo_publish_target` during validation.
    pub maven_repo_host: String,
    pub maven_repo_user: String,
    pub maven_repo_password: String,
    pub realm: String,
    pub sbt_version: String,
    pub sbt_protoc_plugin_version: String,
    pub scala_version: String,
    pub legacy_scala_version: String,
    pub scalapb_runtime_version: String,
    /// Generated-code root inside the clone; each sub-directory is a package.
    pub source_root: String,
    pub publish: bool,
}

impl Default for ScalaConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            jar_name: String::new(),
            organization: String::new(),
            maven_repo_publish_target: String::new(),
            maven_repo_host: String::new(),
            maven_repo_user: String::new(),
            maven_repo_password: String::new(),
            realm: String::new(),
            sbt_version: "1.5.5".to_string(),
            sbt_protoc_plugin_version: "0.99.34".to_string(),
            scala_version: "2.12.10".to_string(),
            legacy_scala_version: "2.11.12".to_string(),
            scalapb_runtime_version: "0.10.0".to_string(),
            source_root: "java/com".to_string(),
            publish: false,
        }
    }
}

/// Ruby gem packaging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RubyConfig {
    pub authors: String,
    pub email: String,
    pub gem_name: String,
    pub gem_repo_host: String,
    pub gem_repo_user: String,
    pub gem_repo_pass: String,
    pub grpc_version: String,
    pub homepage: String,
    /// Where the fetched gem API key is written. Defaults to `$HOME/.gem/credentials`.
    pub credentials_path: Option<PathBuf>,
    pub source_root: String,
    pub publish: bool,
}

impl Default for RubyConfig {
    fn default() -> Self {
        Self {
            authors: String::new(),
            email: String::new(),
            gem_name: String::new(),
            gem_repo_host: String::new(),
            gem_repo_user: String::new(),
            gem_repo_pass: String::new(),
            grpc_version: "1.19.0".to_string(),
            homepage: String::new(),
            credentials_path: None,
            source_root: "ruby".to_string(),
            publish: false,
        }
    }
}

/// npm packaging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpmConfig {
    pub package_name: String,
    pub project_url: String,
    pub registry_url: String,
    pub protobuf_version: String,
    pub token: String,
    pub email: String,
    pub source_root: String,
    pub publish: bool,
}

impl Default for NpmConfig {
    fn default() -> Self {
        Self {
            package_name: String::new(),
            project_url: String::new(),
            registry_url: "https://registry.npmjs.org/".to_string(),
            protobuf_version: "3.11.4".to_string(),
            token: String::new(),
            email: String::new(),
            source_root: "ts".to_string(),
            publish: false,
        }
    }
}

impl Config {
    /// Read the optional YAML file, overlay the process environment, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        base.apply_env_overrides(std::env::vars())?.validate()
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Overlay `PF_*` variables onto this configuration.
    pub fn apply_env_overrides<I>(self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter(|(k, v)| k.starts_with(ENV_PREFIX) && !v.is_empty())
            .collect();
        if vars.is_empty() {
            return Ok(self);
        }
        let mut tree = serde_json::to_value(&self)?;
        overlay(&mut tree, ENV_PREFIX, &vars)?;
        Ok(serde_json::from_value(tree)?)
    }

    /// Check required fields and derive computed ones.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let language = self.language.ok_or(ConfigError::MissingLanguage)?;
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if self.main_branch.is_empty() {
            return Err(ConfigError::Invalid("main_branch must not be empty".to_string()));
        }
        match language {
            Language::Scala => {
                let target = Url::parse(&self.scala.maven_repo_publish_target).map_err(|e| {
                    ConfigError::Invalid(format!(
                        "scala.maven_repo_publish_target {:?}: {e}",
                        self.scala.maven_repo_publish_target
                    ))
                })?;
                self.scala.maven_repo_host = target.host_str().unwrap_or_default().to_string();
                require(&self.scala.jar_name, "scala.jar_name")?;
            }
            Language::Ruby => {
                require(&self.ruby.gem_name, "ruby.gem_name")?;
                if self.ruby.publish {
                    require(&self.ruby.gem_repo_host, "ruby.gem_repo_host")?;
                }
            }
            Language::Npm => require(&self.npm.package_name, "npm.package_name")?,
            Language::Release => {}
        }
        Ok(self)
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn require(value: &str, key: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Invalid(format!("{key} must be set")));
    }
    Ok(())
}

fn overlay(node: &mut Value, prefix: &str, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
    let Value::Object(map) = node else {
        return Ok(());
    };
    for (key, child) in map.iter_mut() {
        let var = format!("{prefix}_{}", key.to_ascii_uppercase());
        if child.is_object() {
            overlay(child, &var, vars)?;
        } else if let Some(raw) = vars.get(&var) {
            *child = coerce(child, raw).map_err(|message| ConfigError::Env {
                var: var.clone(),
                message,
            })?;
        }
    }
    Ok(())
}

/// Parse `raw` into the JSON type of the value it replaces.
fn coerce(current: &Value, raw: &str) -> Result<Value, String> {
    match current {
        Value::Bool(_) => raw
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|e| e.to_string()),
        Value::Number(_) => raw
            .parse::<u64>()
            .map(Value::from)
            .map_err(|e| e.to_string()),
        _ => Ok(Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE: &str = r#"
language: ruby
log_level: debug
git:
  username: user
  token: pass
webhook:
  secret: asupersecretkey
ruby:
  authors: somepeople
  email: dev@dev.com
  gem_repo_user: user
  gem_repo_pass: pass
  gem_repo_host: https://somegemrepo.com
  gem_name: proto-demo
  grpc_version: 1.19.0
  homepage: https://github.com/someorg/somerepo
  publish: false
"#;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reads_complete_file() {
        let conf = Config::from_yaml_str(COMPLETE).unwrap().validate().unwrap();
        assert_eq!(conf.log_level, "debug");
        assert_eq!(conf.language, Some(Language::Ruby));
        assert_eq!(conf.git.username, "user");
        assert_eq!(conf.git.token, "pass");
        assert_eq!(conf.webhook.secret, "asupersecretkey");
        assert_eq!(conf.ruby.gem_name, "proto-demo");
        assert_eq!(conf.ruby.gem_repo_host, "https://somegemrepo.com");
        assert!(!conf.ruby.publish);
        assert_eq!(conf.git.api_url, "https://api.github.com");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let conf = Config::from_yaml_str("language: release\n").unwrap();
        assert_eq!(conf.webhook.secret, "");
        assert_eq!(conf.port, 8080);
        assert_eq!(conf.main_branch, "main");
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Config::from_yaml_str("  \n").unwrap(), Config::default());
    }

    #[test]
    fn env_only_configuration() {
        let conf = Config::default()
            .apply_env_overrides(env(&[
                ("PF_LANGUAGE", "ruby"),
                ("PF_GIT_USERNAME", "envuser"),
                ("PF_RUBY_PUBLISH", "false"),
                ("PF_RUBY_GEM_NAME", "protos"),
                ("PF_PORT", "9000"),
            ]))
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(conf.language, Some(Language::Ruby));
        assert_eq!(conf.git.username, "envuser");
        assert!(!conf.ruby.publish);
        assert_eq!(conf.port, 9000);
    }

    #[test]
    fn env_overrides_file_but_not_with_empty_values() {
        let conf = Config::from_yaml_str(COMPLETE)
            .unwrap()
            .apply_env_overrides(env(&[("PF_GIT_USERNAME", "envuser"), ("PF_GIT_TOKEN", "")]))
            .unwrap();
        assert_eq!(conf.git.username, "envuser");
        assert_eq!(conf.git.token, "pass");
    }

    #[test]
    fn unrelated_env_is_ignored() {
        let conf = Config::default()
            .apply_env_overrides(env(&[("HOME", "/root"), ("PATH", "/bin")]))
            .unwrap();
        assert_eq!(conf, Config::default());
    }

    #[test]
    fn bad_bool_names_variable() {
        let err = Config::default()
            .apply_env_overrides(env(&[("PF_NPM_PUBLISH", "yes")]))
            .unwrap_err();
        match err {
            ConfigError::Env { var, .. } => assert_eq!(var, "PF_NPM_PUBLISH"),
            other => panic!("expected Env error, got {other:?}"),
        }
    }

    #[test]
    fn missing_language_is_rejected() {
        assert!(matches!(
            Config::default().validate(),
            Err(ConfigError::MissingLanguage)
        ));
    }

    #[test]
    fn scala_derives_maven_host() {
        let yaml = r#"
language: scala
scala:
  jar_name: proto-gen-demo
  maven_repo_publish_target: https://repo1.maven.org/maven2
"#;
        let conf = Config::from_yaml_str(yaml).unwrap().validate().unwrap();
        assert_eq!(conf.scala.maven_repo_host, "repo1.maven.org");
    }

    #[test]
    fn scala_with_bad_target_is_invalid() {
        let yaml = "language: scala\nscala:\n  jar_name: x\n  maven_repo_publish_target: nope\n";
        let err = Config::from_yaml_str(yaml).unwrap().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn ruby_publish_requires_host() {
        let yaml = "language: ruby\nruby:\n  gem_name: g\n  publish: true\n";
        let err = Config::from_yaml_str(yaml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("ruby.gem_repo_host"));
    }

    #[test]
    fn scratch_root_defaults_to_temp_dir() {
        assert_eq!(Config::default().scratch_root(), std::env::temp_dir());
    }
}
