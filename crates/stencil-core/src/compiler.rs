//! Compiler driver.
//!
//! Walks the node stream of one template, lowers expressions, resolves tag
//! attributes, gates tags through the policy and dispatches to the tag
//! table. `compile_unit` is reentrant: merge-inlined includes call back into
//! it with the same [`Session`].

use crate::ast::{ArgValue, Node, TagArg, TagInvocation};
use crate::attributes::{resolve_attributes, Arg, AttrValue, LoweredAssign};
use crate::config::CompilerConfig;
use crate::emit::{comment_text, echo_text};
use crate::error::{CompileError, CompileResult};
use crate::expr::{compile_print, lower_expr, ExprContext};
use crate::reader::TemplateParser;
use crate::resource::{digest, ResourceLoader, TemplateSource};
use crate::security::SecurityPolicy;
use crate::state::{CompilerState, FileDependency, PluginRef};
use crate::tags::{TagContext, TagOutput, TagRegistry};
use indexmap::IndexMap;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Read-only inputs of a compile pass.
pub struct CompileEnv<'a> {
    pub config: &'a CompilerConfig,
    pub policy: Option<&'a SecurityPolicy>,
    pub loader: &'a dyn ResourceLoader,
    pub parser: &'a dyn TemplateParser,
    pub tags: &'a TagRegistry,
}

impl CompileEnv<'_> {
    fn expr<'s>(&'s self, state: &'s mut CompilerState) -> ExprContext<'s> {
        ExprContext {
            config: self.config,
            policy: self.policy,
            state,
        }
    }
}

/// Merge record key: resolved template name plus compile-identity hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    pub template: String,
    pub uid: String,
}

impl MergeKey {
    pub fn new(template: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            uid: uid.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFunction {
    pub name: String,
    pub template: String,
    /// Empty while the template is still being compiled.
    pub body: String,
}

/// State shared by every unit compiled in one top-level pass.
#[derive(Debug, Default)]
pub struct Session {
    merged: IndexMap<MergeKey, MergedFunction>,
    depth: usize,
}

impl Session {
    pub fn function_for(&self, key: &MergeKey) -> Option<&str> {
        self.merged.get(key).map(|record| record.name.as_str())
    }

    /// Record `key` before its body exists so self-references resolve.
    pub fn reserve(&mut self, key: MergeKey) -> String {
        let name = function_name(&key.template, &key.uid);
        let template = key.template.clone();
        self.merged
            .entry(key)
            .or_insert(MergedFunction {
                name,
                template,
                body: String::new(),
            })
            .name
            .clone()
    }

    pub fn complete(&mut self, key: &MergeKey, body: String) {
        if let Some(record) = self.merged.get_mut(key) {
            record.body = body;
        }
    }

    pub fn merged(&self) -> impl Iterator<Item = &MergedFunction> {
        self.merged.values()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn enter(&mut self) {
        self.depth += 1;
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Stable function name for a template body.
pub fn function_name(template: &str, uid: &str) -> String {
    let hash = digest(&format!("{template}\0{uid}"));
    format!("content_{}", &hash[..16])
}

/// Result of compiling one template body.
#[derive(Debug)]
pub struct CompiledUnit {
    pub body: String,
    pub has_code: bool,
    pub file_dependency: BTreeMap<String, FileDependency>,
    pub required_plugins: BTreeMap<String, PluginRef>,
}

/// Compile one template. Recurses through merged includes.
pub fn compile_unit(
    env: &CompileEnv<'_>,
    session: &mut Session,
    source: TemplateSource,
    inheritance: bool,
) -> CompileResult<CompiledUnit> {
    let nodes = env.parser.parse(&source)?;
    trace!(template = %source.name, nodes = nodes.len(), "compiling template");
    let recompiled = env.loader.is_recompiled_always(&source);
    let mut state = CompilerState::new(source, inheritance);
    if !recompiled {
        let own = state.source.clone();
        state.add_dependency(&own);
    }

    let mut body = String::new();
    let mut text = String::new();
    let mut all_text = String::new();
    for node in &nodes {
        let code = match node {
            Node::Text { text: chunk } => {
                text.push_str(chunk);
                all_text.push_str(chunk);
                continue;
            }
            Node::Print(print) => compile_print(&mut env.expr(&mut state), print)
                .map_err(|err| err.at_line(print.line))?,
            Node::Tag(invocation) => compile_tag(env, session, &mut state, invocation)
                .map_err(|err| err.at_line(invocation.line))?,
        };
        if !text.is_empty() {
            body.push_str(&echo_text(&text));
            text.clear();
        }
        body.push_str(&code);
    }
    state.finish()?;

    if !state.has_code {
        body.clear();
        text = all_text;
    }
    if !text.is_empty() {
        body.push_str(&echo_text(&text));
    }

    Ok(CompiledUnit {
        body,
        has_code: state.has_code,
        file_dependency: state.file_dependency,
        required_plugins: state.required_plugins,
    })
}

/// `{/name}` arrives as `/name` and dispatches as `nameclose`.
fn dispatch_name(tag: &str) -> String {
    match tag.strip_prefix('/') {
        Some(name) => format!("{name}close"),
        None => tag.to_string(),
    }
}

fn compile_tag(
    env: &CompileEnv<'_>,
    session: &mut Session,
    state: &mut CompilerState,
    invocation: &TagInvocation,
) -> CompileResult<String> {
    let name = dispatch_name(&invocation.tag);
    if let Some(policy) = env.policy {
        policy.check_tag(&name)?;
    }
    let spec = env.tags.get(&name).ok_or_else(|| CompileError::UnknownTag {
        tag: invocation.tag.clone(),
        line: None,
    })?;

    let args = lower_args(&mut env.expr(state), &invocation.args)?;
    let contract = (spec.contract)(invocation.variant);
    let attrs = resolve_attributes(args, &contract).map_err(|source| CompileError::Attribute {
        tag: name.clone(),
        source,
        line: None,
    })?;

    debug!(tag = %name, line = invocation.line, variant = invocation.variant, "compiling tag");
    let mut cx = TagContext {
        env,
        session,
        state,
        tag: &name,
        line: invocation.line,
    };
    let code = (spec.compile)(&mut cx, &attrs, invocation.variant)?;
    if !code.is_empty() {
        cx.state.has_code = true;
    }
    Ok(match spec.output {
        TagOutput::Statement => code,
        TagOutput::Expression => format!("echo {code};\n"),
    })
}

fn lower_args(cx: &mut ExprContext<'_>, args: &[TagArg]) -> CompileResult<Vec<Arg>> {
    args.iter()
        .map(|arg| {
            Ok(match arg {
                TagArg::Named { name, value } => Arg::Named(name.clone(), lower_value(cx, value)?),
                TagArg::Flag { flag } => Arg::Flag(flag.clone()),
                TagArg::Positional(value) => Arg::Positional(lower_value(cx, value)?),
            })
        })
        .collect()
}

fn lower_value(cx: &mut ExprContext<'_>, value: &ArgValue) -> CompileResult<AttrValue> {
    Ok(match value {
        ArgValue::Expr(expr) => AttrValue::Code(lower_expr(cx, expr)?),
        ArgValue::Bool(flag) => AttrValue::Flag(*flag),
        ArgValue::Assign(assign) => AttrValue::Assign(LoweredAssign {
            var: assign.var.clone(),
            value: lower_expr(cx, &assign.value)?,
        }),
        ArgValue::AssignList(list) => AttrValue::AssignList(
            list.iter()
                .map(|assign| {
                    Ok(LoweredAssign {
                        var: assign.var.clone(),
                        value: lower_expr(cx, &assign.value)?,
                    })
                })
                .collect::<CompileResult<_>>()?,
        ),
    })
}

/// Final compiled artifact of a top-level template.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub name: String,
    pub unifunc: String,
    pub version: String,
    pub has_code: bool,
    pub file_dependency: BTreeMap<String, FileDependency>,
    pub required_plugins: BTreeMap<String, PluginRef>,
    /// Function name → body, in merge order.
    pub merged_functions: IndexMap<String, String>,
    pub body: String,
}

impl CompiledTemplate {
    /// Properties carried in the artifact header.
    pub fn properties(&self) -> serde_json::Value {
        json!({
            "version": self.version,
            "unifunc": self.unifunc,
            "has_code": self.has_code,
            "file_dependency": self.file_dependency,
            "required_plugins": self.required_plugins,
            "merged_functions": self.merged_functions.keys().collect::<Vec<_>>(),
        })
    }

    /// Header comment, merged functions, then the template's own function.
    pub fn render(&self) -> String {
        let mut out = String::from("<?php\n");
        out.push_str(&format!(
            "/* stencil compiled \"{}\" {} */\n",
            comment_text(&self.name),
            comment_text(&self.properties().to_string())
        ));
        for (function, body) in &self.merged_functions {
            out.push_str(&render_function(function, body));
        }
        out.push_str(&render_function(&self.unifunc, &self.body));
        out
    }
}

fn render_function(name: &str, body: &str) -> String {
    format!("if (!is_callable('{name}')) {{function {name}($_tpl) {{\n{body}}}}}\n")
}

/// Compile `name` and every template it merges inline.
pub fn compile_template(
    env: &CompileEnv<'_>,
    name: &str,
    inheritance: bool,
) -> CompileResult<CompiledTemplate> {
    let source = env.loader.resolve(name)?;
    if !source.exists {
        return Err(CompileError::resource(name, "unable to load template"));
    }
    if let (Some(policy), Some(path)) = (env.policy, &source.filepath) {
        policy.check_resource_dir(path, &env.config.template_dirs, &env.config.config_dirs)?;
    }
    let unifunc = function_name(&source.name, &source.uid);
    let template = source.name.clone();

    let mut session = Session::default();
    let unit = compile_unit(env, &mut session, source, inheritance)?;
    let merged_functions = session
        .merged
        .into_values()
        .map(|record| (record.name, record.body))
        .collect();

    Ok(CompiledTemplate {
        name: template,
        unifunc,
        version: env.config.version.clone(),
        has_code: unit.has_code,
        file_dependency: unit.file_dependency,
        required_plugins: unit.required_plugins,
        merged_functions,
        body: unit.body,
    })
}
