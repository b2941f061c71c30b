//! Per-template compiler state.

use crate::error::{CompileError, CompileResult, NestingReason};
use crate::resource::{SourceKind, TemplateSource};
use serde::Serialize;
use std::collections::BTreeMap;

/// Block constructs that live on the open-tag stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    For,
    ForElse,
}

impl TagKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::For => "for",
            Self::ForElse => "forelse",
        }
    }
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTag {
    pub kind: TagKind,
    /// Tag names allowed to close or continue this block.
    pub closers: &'static [&'static str],
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDependency {
    pub path: String,
    pub timestamp: u64,
    pub kind: SourceKind,
}

/// Runtime plugin the compiled code calls into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginRef {
    pub kind: &'static str,
    pub function: String,
}

#[derive(Debug)]
pub struct CompilerState {
    pub source: TemplateSource,
    tags: Vec<OpenTag>,
    pub has_code: bool,
    pub file_dependency: BTreeMap<String, FileDependency>,
    pub required_plugins: BTreeMap<String, PluginRef>,
    /// Compiling inside an inheritance block.
    pub inheritance: bool,
}

impl CompilerState {
    pub fn new(source: TemplateSource, inheritance: bool) -> Self {
        Self {
            source,
            tags: Vec::new(),
            has_code: false,
            file_dependency: BTreeMap::new(),
            required_plugins: BTreeMap::new(),
            inheritance,
        }
    }

    pub fn open_tag(&mut self, kind: TagKind, closers: &'static [&'static str], line: usize) {
        self.tags.push(OpenTag {
            kind,
            closers,
            line,
        });
    }

    /// Pop the innermost block if `closer` may close it and it is one of
    /// `expected`.
    pub fn close_tag(
        &mut self,
        closer: &str,
        expected: &[TagKind],
        line: usize,
    ) -> CompileResult<OpenTag> {
        let nesting = |reason| CompileError::TagNesting {
            tag: closer.to_string(),
            reason,
            line: (line > 0).then_some(line),
        };
        let Some(top) = self.tags.last() else {
            return Err(nesting(NestingReason::NotOpen));
        };
        if !expected.contains(&top.kind) || !top.closers.contains(&closer) {
            return Err(nesting(NestingReason::Mismatched(top.kind)));
        }
        self.tags.pop().ok_or_else(|| nesting(NestingReason::NotOpen))
    }

    pub fn open_tags(&self) -> &[OpenTag] {
        &self.tags
    }

    /// Fail on the innermost block still open at end of template.
    pub fn finish(&self) -> CompileResult<()> {
        match self.tags.last() {
            Some(open) => Err(CompileError::TagNesting {
                tag: open.kind.name().to_string(),
                reason: NestingReason::Unclosed,
                line: (open.line > 0).then_some(open.line),
            }),
            None => Ok(()),
        }
    }

    pub fn add_dependency(&mut self, source: &TemplateSource) {
        let path = match &source.filepath {
            Some(path) => path.display().to_string(),
            None => source.name.clone(),
        };
        self.file_dependency.insert(
            source.uid.clone(),
            FileDependency {
                path,
                timestamp: source.timestamp,
                kind: source.kind,
            },
        );
    }

    pub fn require_plugin(&mut self, name: &str, kind: &'static str, function: impl Into<String>) {
        self.required_plugins
            .entry(name.to_string())
            .or_insert_with(|| PluginRef {
                kind,
                function: function.into(),
            });
    }

    /// Fold a merged sub-template's metadata into this unit.
    pub fn merge_unit(
        &mut self,
        dependencies: BTreeMap<String, FileDependency>,
        plugins: BTreeMap<String, PluginRef>,
    ) {
        self.file_dependency.extend(dependencies);
        for (name, plugin) in plugins {
            self.required_plugins.entry(name).or_insert(plugin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> CompilerState {
        CompilerState::new(TemplateSource::string("t", ""), false)
    }

    #[test]
    fn close_without_open_is_nesting_error() {
        let err = state().close_tag("forclose", &[TagKind::For], 4).unwrap_err();
        assert_eq!(
            err,
            CompileError::TagNesting {
                tag: "forclose".into(),
                reason: NestingReason::NotOpen,
                line: Some(4),
            }
        );
    }

    #[test]
    fn close_of_wrong_kind_is_nesting_error() {
        let mut state = state();
        state.open_tag(TagKind::ForElse, &["forclose"], 1);
        let err = state.close_tag("forelse", &[TagKind::For], 2).unwrap_err();
        assert!(matches!(
            err,
            CompileError::TagNesting {
                reason: NestingReason::Mismatched(TagKind::ForElse),
                ..
            }
        ));
        assert_eq!(state.open_tags().len(), 1);
    }

    #[test]
    fn matched_close_pops_entry() {
        let mut state = state();
        state.open_tag(TagKind::For, &["forelse", "forclose"], 1);
        let open = state
            .close_tag("forclose", &[TagKind::For, TagKind::ForElse], 3)
            .unwrap();
        assert_eq!(open.kind, TagKind::For);
        assert!(state.finish().is_ok());
    }

    #[test]
    fn unclosed_block_reported_at_open_line() {
        let mut state = state();
        state.open_tag(TagKind::For, &["forclose"], 7);
        let err = state.finish().unwrap_err();
        assert_eq!(err.line(), Some(7));
        assert_eq!(err.code(), "STENCIL_E_TAG_NESTING");
    }

    #[test]
    fn merge_unit_keeps_first_plugin_entry() {
        let mut state = state();
        state.require_plugin("escape", "modifier", "tpl_modifier_escape");
        let mut plugins = BTreeMap::new();
        plugins.insert(
            "escape".to_string(),
            PluginRef {
                kind: "modifier",
                function: "other".into(),
            },
        );
        state.merge_unit(BTreeMap::new(), plugins);
        assert_eq!(state.required_plugins["escape"].function, "tpl_modifier_escape");
    }
}
