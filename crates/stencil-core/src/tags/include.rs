//! `{include}`: runtime sub-template dispatch or merge-inlining.
//!
//! A merged include compiles the target once per `(name, compile identity)`
//! in the pass, stores its body as a function and calls that function with
//! a fresh template frame pushed around the call.

use super::TagContext;
use crate::attributes::{AttrValue, AttributeContract, ResolvedAttributes, ANY};
use crate::compiler::{compile_unit, MergeKey};
use crate::emit::{comment_text, is_literal_string, quote_str, unquote_literal, var_ref_code};
use crate::error::{AttributeError, CompileError, CompileResult, PolicyKind};
use crate::resource::digest;
use tracing::debug;

pub const CONTRACT: AttributeContract = AttributeContract {
    required: &["file"],
    optional: &["assign", "scope", "compile_id", "cache_id", "cache_lifetime", ANY],
    shorttag_order: &["file"],
    option_flags: &["inline", "caching"],
};

pub fn contract(_variant: u8) -> AttributeContract {
    CONTRACT
}

/// Compile identity used when the tag names none.
const DEFAULT_COMPILE_ID: &str = "$_tpl->compileId";
const DEFAULT_CACHE_ID: &str = "$_tpl->cacheId";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Parent,
    Root,
    Global,
}

impl Scope {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().trim_matches(|c| c == '\'' || c == '"') {
            "local" => Some(Self::Local),
            "parent" => Some(Self::Parent),
            "root" => Some(Self::Root),
            "global" => Some(Self::Global),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Local => 0,
            Self::Parent => 1,
            Self::Root => 2,
            Self::Global => 3,
        }
    }
}

/// Call target of a merged include.
struct Merged {
    template: String,
    function: String,
}

pub fn compile_include(
    cx: &mut TagContext<'_>,
    attrs: &ResolvedAttributes,
    _variant: u8,
) -> CompileResult<String> {
    let file = cx.attr(attrs.require_code("file"))?;
    let assign = attrs.code("assign");
    let scope = match attrs.code("scope") {
        None => Scope::Local,
        Some(code) => Scope::parse(code).ok_or_else(|| {
            cx.attribute_error(AttributeError::InvalidAttributeValue {
                name: "scope".to_string(),
                value: code.to_string(),
            })
        })?,
    };
    let caching = u8::from(attrs.flag("caching"));
    let cache_id = attrs.code("cache_id").unwrap_or(DEFAULT_CACHE_ID);
    let compile_id = attrs.code("compile_id").unwrap_or(DEFAULT_COMPILE_ID);
    let cache_lifetime = attrs.code("cache_lifetime").unwrap_or("null");
    let vars = template_vars(cx, attrs, scope)?;

    let merged = merge_decision(cx, file, attrs.code("compile_id"), attrs.flag("inline"))?;
    cx.state.has_code = true;

    let args = format!(
        "{file}, {cache_id}, {compile_id}, {caching}, {cache_lifetime}, {vars}, {}",
        scope.code()
    );

    let Some(merged) = merged else {
        return Ok(match assign {
            Some(assign) => format!(
                "{} = new TplVar($_tpl->subTemplate({args}));\n",
                var_ref_code(assign)
            ),
            None => format!("echo $_tpl->subTemplate({args});\n"),
        });
    };

    let mut out = format!(
        "/*  Call merged included template \"{}\" */\n",
        comment_text(&merged.template)
    );
    out.push_str("$_tpl_stack[] = $_tpl;\n");
    out.push_str(&format!(" $_tpl = $_tpl->setupInlineSubTemplate({args});\n"));
    if assign.is_some() {
        out.push_str("ob_start(); ");
    }
    out.push_str(&format!("{}($_tpl);\n", merged.function));
    out.push_str("$_tpl = array_pop($_tpl_stack); ");
    if let Some(assign) = assign {
        out.push_str(&format!(
            " {} = new TplVar(ob_get_clean());",
            var_ref_code(assign)
        ));
    }
    out.push_str(&format!(
        "\n/*  End of included template \"{}\" */\n",
        comment_text(&merged.template)
    ));
    Ok(out)
}

/// Remaining attributes become local variables of the sub-template.
fn template_vars(
    cx: &TagContext<'_>,
    attrs: &ResolvedAttributes,
    scope: Scope,
) -> CompileResult<String> {
    let extra = attrs.extra();
    if extra.is_empty() {
        return Ok("array()".to_string());
    }
    if scope != Scope::Local {
        return Err(CompileError::PolicyViolation {
            kind: PolicyKind::ScopedVariables,
            name: "parent/root/global scope".to_string(),
            line: (cx.line > 0).then_some(cx.line),
        });
    }
    let mut pairs = Vec::with_capacity(extra.len());
    for (name, value) in extra {
        let code = match value {
            AttrValue::Code(code) => code.clone(),
            AttrValue::Flag(flag) => flag.to_string(),
            AttrValue::Assign(_) | AttrValue::AssignList(_) => {
                return Err(cx.attribute_error(AttributeError::InvalidAttributeValue {
                    name: name.clone(),
                    value: "assignment".to_string(),
                }));
            }
        };
        pairs.push(format!("{}=>{code}", quote_str(name)));
    }
    Ok(format!("array({})", pairs.join(",")))
}

fn ineligible(cx: &TagContext<'_>, forced: bool, reason: &str) -> CompileResult<Option<Merged>> {
    if forced {
        return Err(CompileError::InlineEligibility {
            reason: format!("{reason} not allowed within inheritance blocks"),
            line: (cx.line > 0).then_some(cx.line),
        });
    }
    debug!(tag = cx.tag, reason, "include falls back to runtime dispatch");
    Ok(None)
}

/// Decide whether to merge the target inline; compile and record it if so.
fn merge_decision(
    cx: &mut TagContext<'_>,
    file: &str,
    compile_id: Option<&str>,
    inline_hint: bool,
) -> CompileResult<Option<Merged>> {
    let env = cx.env;
    let forced = cx.state.inheritance && env.config.inheritance_merge_compiled_includes;
    if !(env.config.merge_compiled_includes || forced || inline_hint) {
        return Ok(None);
    }
    if env.loader.is_recompiled_always(&cx.state.source) {
        debug!(template = %cx.state.source.name, "recompiled template never merges includes");
        return Ok(None);
    }
    if !is_literal_string(file) {
        return ineligible(cx, forced, "variable template file names");
    }
    if let Some(id) = compile_id {
        if !is_literal_string(id) {
            return ineligible(cx, forced, "variable compile_id");
        }
    }
    let Some(template) = unquote_literal(file) else {
        return ineligible(cx, forced, "variable template file names");
    };

    let key = MergeKey::new(&template, digest(compile_id.unwrap_or(DEFAULT_COMPILE_ID)));
    if let Some(function) = cx.session.function_for(&key) {
        return Ok(Some(Merged {
            template,
            function: function.to_string(),
        }));
    }

    let source = env.loader.resolve(&template)?;
    if let Some(path) = &source.filepath {
        cx.guard(|policy| {
            policy.check_resource_dir(path, &env.config.template_dirs, &env.config.config_dirs)
        })?;
    }
    if !source.exists || source.uncompiled || env.loader.is_recompiled_always(&source) {
        debug!(%template, exists = source.exists, "include target cannot be merged");
        return Ok(None);
    }
    if cx.session.depth() >= env.config.max_inline_depth {
        return Err(CompileError::InlineRecursionLimit {
            template,
            depth: env.config.max_inline_depth,
        });
    }

    let function = cx.session.reserve(key.clone());
    debug!(%template, %function, "merging included template");
    cx.session.enter();
    let unit = compile_unit(env, cx.session, source, cx.state.inheritance);
    cx.session.leave();
    let unit = unit?;
    cx.state.merge_unit(unit.file_dependency, unit.required_plugins);
    cx.session.complete(&key, unit.body);
    Ok(Some(Merged { template, function }))
}
