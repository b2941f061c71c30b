//! Node contract handed to the compiler by the parsing front end.
//!
//! The front end has already tokenized template text. What arrives here is a
//! flat sequence of text runs, print expressions and tags. Tag arguments are
//! lexed expression strings (target-language code). Expressions that need
//! compile-time policy decisions arrive structured rather than as opaque
//! code: special variables, host-function calls, static-class access and
//! modifier chains.
//!
//! All types deserialize from a compact JSON form (see `reader`):
//!
//! ```json
//! [
//!   {"text": "<ul>"},
//!   {"tag": "for", "line": 2, "args": [
//!     {"name": "start", "value": {"var": "i", "value": "0"}},
//!     {"name": "to", "value": "9"}
//!   ]},
//!   {"print": {"value": {"special": "request", "member": "'q'"},
//!              "modifiers": [{"name": "escape"}]}, "line": 3},
//!   {"tag": "forclose", "line": 4}
//! ]
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Text { text: String },
    Print(PrintNode),
    Tag(TagInvocation),
}

/// `{$expr|modifier}` output statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintNode {
    pub print: Expr,
    #[serde(default)]
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagInvocation {
    pub tag: String,
    #[serde(default)]
    pub args: Vec<TagArg>,
    /// Grammar form chosen by the parser for tags with several syntaxes.
    #[serde(default)]
    pub variant: u8,
    #[serde(default)]
    pub line: usize,
}

impl TagInvocation {
    pub fn new(tag: impl Into<String>, args: Vec<TagArg>) -> Self {
        Self {
            tag: tag.into(),
            args,
            variant: 0,
            line: 0,
        }
    }

    pub fn variant(mut self, variant: u8) -> Self {
        self.variant = variant;
        self
    }

    pub fn line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagArg {
    Named { name: String, value: ArgValue },
    /// Bare option flag such as `inline`.
    Flag { flag: String },
    Positional(ArgValue),
}

impl TagArg {
    pub fn named(name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        Self::Named {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn flag(name: impl Into<String>) -> Self {
        Self::Flag { flag: name.into() }
    }

    pub fn positional(value: impl Into<ArgValue>) -> Self {
        Self::Positional(value.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Assign(Assignment),
    AssignList(Vec<Assignment>),
    Bool(bool),
    Expr(Expr),
}

impl From<Expr> for ArgValue {
    fn from(value: Expr) -> Self {
        Self::Expr(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Expr(Expr::code(value))
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Assignment> for ArgValue {
    fn from(value: Assignment) -> Self {
        Self::Assign(value)
    }
}

/// `var = value` statement used by loop initializers.
///
/// `var` is the bare variable name. `value` is an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub var: String,
    pub value: Expr,
}

impl Assignment {
    pub fn new(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            value: Expr::code(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expr {
    /// Already-lexed target-language code, emitted verbatim.
    Code(String),
    /// `$smarty.<special>[.<member>]` pseudo-namespace access.
    Special {
        special: String,
        #[serde(default)]
        member: Option<String>,
    },
    /// Host function call `name(args...)`.
    Call {
        call: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// Static member access `Class::member`.
    Static { class: String, member: String },
    /// Value piped through a modifier chain, left to right.
    Modified {
        value: Box<Expr>,
        modifiers: Vec<ModifierCall>,
    },
}

impl Expr {
    pub fn code(code: impl Into<String>) -> Self {
        Self::Code(code.into())
    }

    pub fn special(name: impl Into<String>, member: Option<&str>) -> Self {
        Self::Special {
            special: name.into(),
            member: member.map(str::to_string),
        }
    }

    pub fn modified(value: Expr, modifiers: Vec<ModifierCall>) -> Self {
        Self::Modified {
            value: Box::new(value),
            modifiers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierCall {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Expr>,
}

impl ModifierCall {
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}
