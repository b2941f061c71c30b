//! Template resources: what the compiler is fed and where it comes from.

use crate::error::{CompileError, CompileResult};
use crate::security::{DirList, SecurityPolicy};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    String,
    Eval,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::String => "string",
            Self::Eval => "eval",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    /// Resolved template name.
    pub name: String,
    /// Stable identity used as the file-dependency key.
    pub uid: String,
    pub kind: SourceKind,
    pub filepath: Option<PathBuf>,
    pub exists: bool,
    /// Seconds since the Unix epoch, 0 when unknown.
    pub timestamp: u64,
    pub content: String,
    /// Never cached: compiled afresh on every use.
    pub recompiled: bool,
    /// Rendered directly, never compiled.
    pub uncompiled: bool,
}

impl TemplateSource {
    /// In-memory source with `name` as its display name.
    pub fn string(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            uid: digest(&format!("string:{content}")),
            kind: SourceKind::String,
            filepath: None,
            exists: true,
            timestamp: 0,
            content,
            recompiled: false,
            uncompiled: false,
        }
    }

    fn eval(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            uid: digest(&format!("eval:{content}")),
            kind: SourceKind::Eval,
            filepath: None,
            exists: true,
            timestamp: 0,
            content: content.to_string(),
            recompiled: true,
            uncompiled: false,
        }
    }

    fn missing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uid: digest(&format!("file:{name}")),
            kind: SourceKind::File,
            filepath: None,
            exists: false,
            timestamp: 0,
            content: String::new(),
            recompiled: false,
            uncompiled: false,
        }
    }
}

pub(crate) fn digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Collaborator that resolves template names to source.
pub trait ResourceLoader {
    fn resolve(&self, name: &str) -> CompileResult<TemplateSource>;

    fn is_recompiled_always(&self, source: &TemplateSource) -> bool {
        source.recompiled
    }
}

/// Split `scheme:rest`. Single-letter schemes are drive letters, not schemes.
fn split_scheme(name: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = name.split_once(':')?;
    if scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some((scheme, rest))
    } else {
        None
    }
}

/// Handles the `string:` and `eval:` prefixes shared by every loader.
fn resolve_inline(name: &str) -> Option<TemplateSource> {
    match split_scheme(name)? {
        ("string", content) => Some(TemplateSource::string(name, content)),
        ("eval", content) => Some(TemplateSource::eval(name, content)),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryTemplate {
    content: String,
    timestamp: u64,
    recompiled: bool,
    uncompiled: bool,
}

/// Loader backed by a name → content map.
///
/// Its sources have no file path, so directory trust does not apply.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, MemoryTemplate>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) -> &mut Self {
        self.templates.insert(
            name.into(),
            MemoryTemplate {
                content: content.into(),
                ..MemoryTemplate::default()
            },
        );
        self
    }

    pub fn with(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(name, content);
        self
    }

    pub fn set_timestamp(&mut self, name: &str, timestamp: u64) {
        if let Some(template) = self.templates.get_mut(name) {
            template.timestamp = timestamp;
        }
    }

    pub fn set_recompiled(&mut self, name: &str, recompiled: bool) {
        if let Some(template) = self.templates.get_mut(name) {
            template.recompiled = recompiled;
        }
    }

    pub fn set_uncompiled(&mut self, name: &str, uncompiled: bool) {
        if let Some(template) = self.templates.get_mut(name) {
            template.uncompiled = uncompiled;
        }
    }
}

impl ResourceLoader for MemoryLoader {
    fn resolve(&self, name: &str) -> CompileResult<TemplateSource> {
        if let Some(source) = resolve_inline(name) {
            return Ok(source);
        }
        let key = name.strip_prefix("file:").unwrap_or(name);
        let Some(template) = self.templates.get(key) else {
            return Ok(TemplateSource::missing(key));
        };
        Ok(TemplateSource {
            name: key.to_string(),
            uid: digest(&format!("memory:{key}")),
            kind: SourceKind::File,
            filepath: None,
            exists: true,
            timestamp: template.timestamp,
            content: template.content.clone(),
            recompiled: template.recompiled,
            uncompiled: template.uncompiled,
        })
    }
}

/// Loader that reads templates from a list of directories.
///
/// With a policy installed, other schemes are stream gated and file paths are
/// directory gated.
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    template_dirs: DirList,
    config_dirs: DirList,
    policy: Option<Arc<SecurityPolicy>>,
}

impl FileLoader {
    pub fn new(template_dirs: DirList) -> Self {
        Self {
            template_dirs,
            ..Self::default()
        }
    }

    pub fn with_config_dirs(mut self, config_dirs: DirList) -> Self {
        self.config_dirs = config_dirs;
        self
    }

    pub fn with_policy(mut self, policy: Arc<SecurityPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.template_dirs
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
    }
}

impl ResourceLoader for FileLoader {
    fn resolve(&self, name: &str) -> CompileResult<TemplateSource> {
        if let Some(source) = resolve_inline(name) {
            return Ok(source);
        }
        let file_name = match split_scheme(name) {
            Some(("file", rest)) => rest,
            Some((scheme, _)) => {
                if let Some(policy) = &self.policy {
                    policy.check_stream(scheme)?;
                }
                return Err(CompileError::resource(
                    name,
                    format!("unsupported resource type '{scheme}'"),
                ));
            }
            None => name,
        };

        let Some(path) = self.locate(file_name) else {
            return Ok(TemplateSource::missing(file_name));
        };
        if let Some(policy) = &self.policy {
            policy.check_resource_dir(&path, &self.template_dirs, &self.config_dirs)?;
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|err| CompileError::resource(file_name, err.to_string()))?;
        let timestamp = std::fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);

        Ok(TemplateSource {
            name: file_name.to_string(),
            uid: digest(&path.display().to_string()),
            kind: SourceKind::File,
            filepath: Some(path),
            exists: true,
            timestamp,
            content,
            recompiled: false,
            uncompiled: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyKind;

    #[test]
    fn memory_loader_reports_missing_templates() {
        let loader = MemoryLoader::new().with("a.tpl", "[]");
        let found = loader.resolve("a.tpl").unwrap();
        assert!(found.exists);
        assert!(found.filepath.is_none());
        let missing = loader.resolve("b.tpl").unwrap();
        assert!(!missing.exists);
        assert_eq!(missing.name, "b.tpl");
    }

    #[test]
    fn eval_sources_are_always_recompiled() {
        let loader = MemoryLoader::new();
        let source = loader.resolve("eval:[]").unwrap();
        assert_eq!(source.kind, SourceKind::Eval);
        assert!(loader.is_recompiled_always(&source));

        let source = loader.resolve("string:[]").unwrap();
        assert_eq!(source.kind, SourceKind::String);
        assert_eq!(source.content, "[]");
        assert!(!loader.is_recompiled_always(&source));
    }

    #[test]
    fn file_loader_reads_from_template_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.json"), "[{\"text\": \"hi\"}]").unwrap();
        let loader = FileLoader::new(DirList::new(vec![dir.path().to_path_buf()]));

        let source = loader.resolve("page.json").unwrap();
        assert!(source.exists);
        assert_eq!(source.kind, SourceKind::File);
        assert!(source.timestamp > 0);
        assert!(source.content.contains("hi"));

        let prefixed = loader.resolve("file:page.json").unwrap();
        assert_eq!(prefixed.uid, source.uid);
    }

    #[test]
    fn file_loader_gates_streams_through_policy() {
        let loader = FileLoader::new(DirList::default())
            .with_policy(Arc::new(SecurityPolicy::default()));
        let err = loader.resolve("http://example.com/a.tpl").unwrap_err();
        assert_eq!(
            err,
            CompileError::policy(PolicyKind::Stream, "http")
        );

        let mut open = SecurityPolicy::default();
        open.streams = Some(Vec::new());
        let loader = FileLoader::new(DirList::default()).with_policy(Arc::new(open));
        let err = loader.resolve("http://example.com/a.tpl").unwrap_err();
        assert_eq!(err.code(), "STENCIL_E_RESOURCE");
    }

    #[test]
    fn file_loader_rejects_untrusted_absolute_paths() {
        let trusted = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let outside = other.path().join("x.json");
        std::fs::write(&outside, "[]").unwrap();

        let loader = FileLoader::new(DirList::new(vec![trusted.path().to_path_buf()]))
            .with_policy(Arc::new(SecurityPolicy::default()));
        let err = loader.resolve(&outside.display().to_string()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::PolicyViolation {
                kind: PolicyKind::Directory,
                ..
            }
        ));
    }
}
