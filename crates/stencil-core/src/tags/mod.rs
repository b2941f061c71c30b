//! Tag compilers and the name → compiler table the driver dispatches through.
//!
//! Each compiler is a plain function over resolved attributes. It returns the
//! emitted fragment and may touch the compiler state (open-tag stack,
//! has-code flag, required plugins).

pub mod delimiter;
pub mod for_loop;
pub mod include;
pub mod special_variable;

use crate::attributes::{AttributeContract, ResolvedAttributes};
use crate::compiler::{CompileEnv, Session};
use crate::error::{AttributeError, CompileError, CompileResult};
use crate::expr::ExprContext;
use crate::security::SecurityPolicy;
use crate::state::CompilerState;
use std::collections::HashMap;

pub type TagCompileFn =
    fn(&mut TagContext<'_>, &ResolvedAttributes, u8) -> CompileResult<String>;

/// Attribute contract for a grammar variant.
pub type ContractFn = fn(u8) -> AttributeContract;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutput {
    /// Fragment is one or more statements.
    Statement,
    /// Fragment is an expression; printed when the tag stands alone.
    Expression,
}

#[derive(Clone, Copy)]
pub struct TagSpec {
    pub contract: ContractFn,
    pub compile: TagCompileFn,
    pub output: TagOutput,
}

impl TagSpec {
    pub fn statement(contract: ContractFn, compile: TagCompileFn) -> Self {
        Self {
            contract,
            compile,
            output: TagOutput::Statement,
        }
    }

    pub fn expression(contract: ContractFn, compile: TagCompileFn) -> Self {
        Self {
            contract,
            compile,
            output: TagOutput::Expression,
        }
    }
}

impl std::fmt::Debug for TagSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagSpec").field("output", &self.output).finish()
    }
}

/// Contract of tags that take no attributes.
pub fn no_attributes(_variant: u8) -> AttributeContract {
    AttributeContract::EMPTY
}

/// Instance-local tag table.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    tags: HashMap<String, TagSpec>,
}

impl TagRegistry {
    pub fn new() -> Self {
        let mut tags: HashMap<String, TagSpec> = HashMap::new();
        tags.insert(
            "for".into(),
            TagSpec::statement(for_loop::contract, for_loop::compile_for),
        );
        tags.insert(
            "forelse".into(),
            TagSpec::statement(no_attributes, for_loop::compile_forelse),
        );
        tags.insert(
            "forclose".into(),
            TagSpec::statement(no_attributes, for_loop::compile_forclose),
        );
        tags.insert(
            "include".into(),
            TagSpec::statement(include::contract, include::compile_include),
        );
        tags.insert(
            "ldelim".into(),
            TagSpec::statement(no_attributes, delimiter::compile_ldelim),
        );
        tags.insert(
            "rdelim".into(),
            TagSpec::statement(no_attributes, delimiter::compile_rdelim),
        );
        tags.insert(
            "private_special_variable".into(),
            TagSpec::expression(special_variable::contract, special_variable::compile_tag),
        );
        Self { tags }
    }

    pub fn get(&self, name: &str) -> Option<TagSpec> {
        self.tags.get(name).copied()
    }

    /// Register or replace a tag compiler.
    pub fn register(&mut self, name: impl Into<String>, spec: TagSpec) -> Option<TagSpec> {
        self.tags.insert(name.into(), spec)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a tag compiler may read or mutate.
pub struct TagContext<'a> {
    pub env: &'a CompileEnv<'a>,
    pub session: &'a mut Session,
    pub state: &'a mut CompilerState,
    pub tag: &'a str,
    pub line: usize,
}

impl TagContext<'_> {
    pub fn attribute_error(&self, source: AttributeError) -> CompileError {
        CompileError::Attribute {
            tag: self.tag.to_string(),
            source,
            line: (self.line > 0).then_some(self.line),
        }
    }

    /// Lift an attribute accessor result into a compile result.
    pub fn attr<T>(&self, result: Result<T, AttributeError>) -> CompileResult<T> {
        result.map_err(|source| self.attribute_error(source))
    }

    pub fn guard(
        &self,
        check: impl FnOnce(&SecurityPolicy) -> CompileResult<()>,
    ) -> CompileResult<()> {
        match self.env.policy {
            Some(policy) => check(policy),
            None => Ok(()),
        }
    }

    pub fn expr(&mut self) -> ExprContext<'_> {
        ExprContext {
            config: self.env.config,
            policy: self.env.policy,
            state: &mut *self.state,
        }
    }
}
