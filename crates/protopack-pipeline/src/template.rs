//! Bundled manifest templates and their renderer.
//!
//! Templates are read-only text resources addressed by name
//! (`<ecosystem>/<file>`). Placeholders take the form `{{ key }}` and are
//! filled from the serialized fields of a per-run values record. A
//! [`ManifestPlan`] lists the directories and files one ecosystem needs and
//! writes them in order, directories first.

use std::collections::HashMap;
use std::path::PathBuf;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

const PLACEHOLDER: &str = r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}";

/// Manifest generation failures. The three variants are kept distinct so a
/// missing resource, a values mismatch and a filesystem problem never look
/// alike in logs.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("template {name} not found")]
    TemplateNotFound { name: String },

    #[error("could not render template {template}: {message}")]
    Render { template: String, message: String },

    #[error("could not write {template} to {path}: {source}")]
    Write {
        template: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Named, read-only template lookup.
pub trait TemplateStore: Send + Sync {
    fn get(&self, name: &str) -> Result<&str, ManifestError>;
}

static BUNDLED: &[(&str, &str)] = &[
    ("scala/build.sbt", include_str!("../templates/scala/build.sbt")),
    ("scala/version.sbt", include_str!("../templates/scala/version.sbt")),
    (
        "scala/project/build.properties",
        include_str!("../templates/scala/project/build.properties"),
    ),
    (
        "scala/project/plugins.sbt",
        include_str!("../templates/scala/project/plugins.sbt"),
    ),
    ("ruby/Gemfile", include_str!("../templates/ruby/Gemfile")),
    ("ruby/gem.gemspec", include_str!("../templates/ruby/gem.gemspec")),
    ("ruby/gem.rb", include_str!("../templates/ruby/gem.rb")),
    ("npm/package.json", include_str!("../templates/npm/package.json")),
    ("npm/.npmrc", include_str!("../templates/npm/.npmrc")),
];

/// Templates compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct BundledTemplates;

impl BundledTemplates {
    pub fn new() -> Self {
        Self
    }

    /// Names of every bundled template.
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        BUNDLED.iter().map(|(name, _)| *name)
    }
}

impl TemplateStore for BundledTemplates {
    fn get(&self, name: &str) -> Result<&str, ManifestError> {
        BUNDLED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, body)| *body)
            .ok_or_else(|| ManifestError::TemplateNotFound {
                name: name.to_string(),
            })
    }
}

impl TemplateStore for HashMap<String, String> {
    fn get(&self, name: &str) -> Result<&str, ManifestError> {
        HashMap::get(self, name)
            .map(String::as_str)
            .ok_or_else(|| ManifestError::TemplateNotFound {
                name: name.to_string(),
            })
    }
}

/// Fill every `{{ key }}` in `source` from `values`.
///
/// `values` must be a flat JSON object of scalars. Strings are inserted
/// verbatim, numbers and booleans in their JSON form. An unknown key or a
/// non-scalar value is a render error.
pub fn render(name: &str, source: &str, values: &Value) -> Result<String, ManifestError> {
    let render_err = |message: String| ManifestError::Render {
        template: name.to_string(),
        message,
    };
    let fields = values
        .as_object()
        .ok_or_else(|| render_err("values must be a record".to_string()))?;
    let placeholder = Regex::new(PLACEHOLDER).map_err(|e| render_err(e.to_string()))?;

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for caps in placeholder.captures_iter(source) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = match fields.get(key.as_str()) {
            Some(Value::String(s)) => s.clone(),
            Some(v @ (Value::Bool(_) | Value::Number(_))) => v.to_string(),
            Some(Value::Null) => String::new(),
            Some(_) => return Err(render_err(format!("{} is not a scalar", key.as_str()))),
            None => return Err(render_err(format!("no value for {}", key.as_str()))),
        };
        let literal = &source[last..whole.start()];
        if literal.contains("{{") {
            return Err(render_err("unterminated placeholder".to_string()));
        }
        out.push_str(literal);
        out.push_str(&value);
        last = whole.end();
    }
    let tail = &source[last..];
    if tail.contains("{{") {
        return Err(render_err("unterminated placeholder".to_string()));
    }
    out.push_str(tail);
    Ok(out)
}

/// One rendered file: template name and target path relative to the plan root.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedFile {
    template: String,
    target: PathBuf,
}

/// Ordered set of directories and templated files for one build directory.
#[derive(Debug, Clone)]
pub struct ManifestPlan {
    root: PathBuf,
    dirs: Vec<PathBuf>,
    files: Vec<PlannedFile>,
}

impl ManifestPlan {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dirs: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Directory created (with parents) before any file is written.
    pub fn dir(mut self, relative: impl Into<PathBuf>) -> Self {
        self.dirs.push(relative.into());
        self
    }

    /// Render `template` into `relative`.
    pub fn file(mut self, template: impl Into<String>, relative: impl Into<PathBuf>) -> Self {
        self.files.push(PlannedFile {
            template: template.into(),
            target: relative.into(),
        });
        self
    }

    /// Create the directories, then render and write each file in order.
    ///
    /// Stops at the first failure; later templates are not attempted.
    /// Returns the written paths.
    pub fn apply<S, V>(&self, store: &S, values: &V) -> Result<Vec<PathBuf>, ManifestError>
    where
        S: TemplateStore + ?Sized,
        V: Serialize,
    {
        let values = serde_json::to_value(values).map_err(|e| ManifestError::Render {
            template: self.root.display().to_string(),
            message: e.to_string(),
        })?;

        std::fs::create_dir_all(&self.root).map_err(|source| ManifestError::Write {
            template: ".".to_string(),
            path: self.root.clone(),
            source,
        })?;
        for dir in &self.dirs {
            let path = self.root.join(dir);
            std::fs::create_dir_all(&path).map_err(|source| ManifestError::Write {
                template: dir.display().to_string(),
                path: path.clone(),
                source,
            })?;
        }

        let mut written = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let source = store.get(&file.template)?;
            let rendered = render(&file.template, source, &values)?;
            let path = self.root.join(&file.target);
            std::fs::write(&path, rendered.as_bytes()).map_err(|source| ManifestError::Write {
                template: file.template.clone(),
                path: path.clone(),
                source,
            })?;
            tracing::trace!(template = %file.template, path = %path.display(), bytes = rendered.len(), "rendered manifest");
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn render_substitutes_scalars() {
        let out = render(
            "t",
            "name={{ name }} n={{n}} snap={{ snapshot }}",
            &json!({"name": "demo", "n": 1000, "snapshot": false}),
        )
        .unwrap();
        assert_eq!(out, "name=demo n=1000 snap=false");
    }

    #[test]
    fn render_unknown_key_is_render_error() {
        let err = render("scala/build.sbt", "{{ missing }}", &json!({})).unwrap_err();
        match err {
            ManifestError::Render { template, message } => {
                assert_eq!(template, "scala/build.sbt");
                assert!(message.contains("missing"));
            }
            other => panic!("expected Render, got {other:?}"),
        }
    }

    #[test]
    fn render_rejects_unterminated_placeholder() {
        let err = render("t", "oops {{ name", &json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, ManifestError::Render { .. }));
    }

    #[test]
    fn render_rejects_unterminated_placeholder_before_a_match() {
        let err = render("t", "{{ oops {{ name }}", &json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, ManifestError::Render { .. }));
    }

    #[test]
    fn render_inserts_values_containing_braces_verbatim() {
        let out = render(
            "scala/build.sbt",
            "pw={{ maven_repo_password }}",
            &json!({"maven_repo_password": "ab{{cd}}"}),
        )
        .unwrap();
        assert_eq!(out, "pw=ab{{cd}}");
    }

    #[test]
    fn bundled_templates_are_addressable() {
        let store = BundledTemplates::new();
        for name in store.names() {
            assert!(!store.get(name).unwrap().is_empty(), "{name} is empty");
        }
        assert!(matches!(
            store.get("go/go.mod"),
            Err(ManifestError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn plan_creates_dirs_before_files() {
        let root = tempfile::tempdir().unwrap();
        let templates = store(&[("a", "A={{ a }}"), ("b", "B={{ b }}")]);
        let written = ManifestPlan::new(root.path().join("out"))
            .dir("project")
            .file("a", "top.txt")
            .file("b", "project/inner.txt")
            .apply(&templates, &json!({"a": 1, "b": "two"}))
            .unwrap();

        assert_eq!(written.len(), 2);
        let out = root.path().join("out");
        assert_eq!(std::fs::read_to_string(out.join("top.txt")).unwrap(), "A=1");
        assert_eq!(
            std::fs::read_to_string(out.join("project/inner.txt")).unwrap(),
            "B=two"
        );
    }

    #[test]
    fn plan_stops_at_first_missing_template() {
        let root = tempfile::tempdir().unwrap();
        let templates = store(&[("a", "A"), ("c", "C")]);
        let err = ManifestPlan::new(root.path())
            .file("a", "a.txt")
            .file("b", "b.txt")
            .file("c", "c.txt")
            .apply(&templates, &json!({}))
            .unwrap_err();

        assert!(matches!(err, ManifestError::TemplateNotFound { ref name } if name == "b"));
        assert!(root.path().join("a.txt").exists());
        assert!(!root.path().join("c.txt").exists());
    }

    #[test]
    fn plan_write_failure_is_distinct() {
        let root = tempfile::tempdir().unwrap();
        let templates = store(&[("a", "A")]);
        let err = ManifestPlan::new(root.path())
            .file("a", "no/such/dir/a.txt")
            .apply(&templates, &json!({}))
            .unwrap_err();
        assert!(matches!(err, ManifestError::Write { .. }));
    }

    #[test]
    fn rendering_is_deterministic() {
        let store = BundledTemplates::new();
        let values = json!({
            "package_name": "@acme/protos", "version": "1.0.5", "project_url": "u",
            "registry_url": "r", "protobuf_version": "3.11.4",
        });
        let source = store.get("npm/package.json").unwrap();
        assert_eq!(
            render("npm/package.json", source, &values).unwrap(),
            render("npm/package.json", source, &values).unwrap()
        );
    }
}
