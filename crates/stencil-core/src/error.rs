//! Compile error taxonomy.
//!
//! Every error is fatal to the compile pass that raised it, including any outer
//! pass that was merging the failing template inline. Each variant carries a
//! stable machine code (see [`CompileError::code`]) and, where the driver knows
//! it, the source line of the offending tag.

use crate::state::TagKind;
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

/// Attribute contract violations reported by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    #[error("missing required attribute '{0}'")]
    MissingRequiredAttribute(String),
    #[error("unexpected attribute '{0}'")]
    UnknownAttribute(String),
    #[error("attribute '{0}' supplied more than once")]
    DuplicateAttribute(String),
    #[error("too many shorthand attributes (at most {max})")]
    TooManyAttributes { max: usize },
    #[error("illegal value '{value}' for attribute '{name}'")]
    InvalidAttributeValue { name: String, value: String },
}

impl AttributeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRequiredAttribute(_) => "STENCIL_E_ATTR_MISSING",
            Self::UnknownAttribute(_) => "STENCIL_E_ATTR_UNKNOWN",
            Self::DuplicateAttribute(_) => "STENCIL_E_ATTR_DUPLICATE",
            Self::TooManyAttributes { .. } => "STENCIL_E_ATTR_TOO_MANY",
            Self::InvalidAttributeValue { .. } => "STENCIL_E_ATTR_VALUE",
        }
    }
}

/// The privileged capability a policy check guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Tag,
    Modifier,
    HostFunction,
    HostModifier,
    StaticClass,
    Stream,
    Directory,
    Uri,
    SuperGlobals,
    Constants,
    ScopedVariables,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Tag => "tag",
            Self::Modifier => "modifier",
            Self::HostFunction => "host function",
            Self::HostModifier => "host modifier",
            Self::StaticClass => "static class",
            Self::Stream => "stream",
            Self::Directory => "directory",
            Self::Uri => "URI",
            Self::SuperGlobals => "super globals",
            Self::Constants => "constants",
            Self::ScopedVariables => "variable passing",
        };
        f.write_str(label)
    }
}

/// Why an open/close pair did not line up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NestingReason {
    #[error("closing tag without a matching open tag")]
    NotOpen,
    #[error("closing tag does not match open '{{{0}}}'")]
    Mismatched(TagKind),
    #[error("tag was never closed")]
    Unclosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("tag '{tag}': {source}{}", at_line(.line))]
    Attribute {
        tag: String,
        source: AttributeError,
        line: Option<usize>,
    },

    #[error("tag '{tag}': {reason}{}", at_line(.line))]
    TagNesting {
        tag: String,
        reason: NestingReason,
        line: Option<usize>,
    },

    #[error("{kind} '{name}' not allowed by security setting{}", at_line(.line))]
    PolicyViolation {
        kind: PolicyKind,
        name: String,
        line: Option<usize>,
    },

    #[error("special variable '{name}' is invalid{}", at_line(.line))]
    UnresolvedSpecialVariable { name: String, line: Option<usize> },

    #[error("cannot merge included template: {reason}{}", at_line(.line))]
    InlineEligibility { reason: String, line: Option<usize> },

    #[error("merged include of '{template}' exceeds depth limit {depth}")]
    InlineRecursionLimit { template: String, depth: usize },

    #[error("expression must end with one of the modifiers [{expected}]{}", at_line(.line))]
    ModifierEnforcement {
        expected: String,
        line: Option<usize>,
    },

    #[error("unknown tag '{tag}'{}", at_line(.line))]
    UnknownTag { tag: String, line: Option<usize> },

    #[error("template '{name}': {message}")]
    Resource { name: String, message: String },

    #[error("{message}")]
    Parse { message: String },
}

fn at_line(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(" (line {line})"),
        None => String::new(),
    }
}

impl CompileError {
    pub fn policy(kind: PolicyKind, name: impl Into<String>) -> Self {
        Self::PolicyViolation {
            kind,
            name: name.into(),
            line: None,
        }
    }

    pub fn resource(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resource {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Attribute { source, .. } => source.code(),
            Self::TagNesting { .. } => "STENCIL_E_TAG_NESTING",
            Self::PolicyViolation { .. } => "STENCIL_E_POLICY",
            Self::UnresolvedSpecialVariable { .. } => "STENCIL_E_SPECIAL_VAR",
            Self::InlineEligibility { .. } => "STENCIL_E_INLINE",
            Self::InlineRecursionLimit { .. } => "STENCIL_E_INLINE_DEPTH",
            Self::ModifierEnforcement { .. } => "STENCIL_E_MODIFIER_ENFORCED",
            Self::UnknownTag { .. } => "STENCIL_E_TAG_UNKNOWN",
            Self::Resource { .. } => "STENCIL_E_RESOURCE",
            Self::Parse { .. } => "STENCIL_E_PARSE",
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Attribute { line, .. }
            | Self::TagNesting { line, .. }
            | Self::PolicyViolation { line, .. }
            | Self::UnresolvedSpecialVariable { line, .. }
            | Self::InlineEligibility { line, .. }
            | Self::ModifierEnforcement { line, .. }
            | Self::UnknownTag { line, .. } => *line,
            Self::InlineRecursionLimit { .. } | Self::Resource { .. } | Self::Parse { .. } => None,
        }
    }

    /// Attach a source line unless one is already recorded.
    ///
    /// Errors raised inside a merged sub-template keep the inner line.
    pub fn at_line(mut self, line: usize) -> Self {
        match &mut self {
            Self::Attribute { line: slot, .. }
            | Self::TagNesting { line: slot, .. }
            | Self::PolicyViolation { line: slot, .. }
            | Self::UnresolvedSpecialVariable { line: slot, .. }
            | Self::InlineEligibility { line: slot, .. }
            | Self::ModifierEnforcement { line: slot, .. }
            | Self::UnknownTag { line: slot, .. } => {
                if slot.is_none() && line > 0 {
                    *slot = Some(line);
                }
            }
            Self::InlineRecursionLimit { .. } | Self::Resource { .. } | Self::Parse { .. } => {}
        }
        self
    }
}
