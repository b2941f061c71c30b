//! `$smarty.*` pseudo-namespace.

use super::TagContext;
use crate::attributes::{AttributeContract, ResolvedAttributes};
use crate::config::SafeLookups;
use crate::emit::{quote_str, unquote_literal};
use crate::error::{CompileError, CompileResult};
use crate::expr::ExprContext;

pub const CONTRACT: AttributeContract = AttributeContract {
    required: &["var"],
    optional: &["member"],
    shorttag_order: &["var", "member"],
    option_flags: &[],
};

pub fn contract(_variant: u8) -> AttributeContract {
    CONTRACT
}

fn indexed(base: &str, member: Option<&str>) -> String {
    match member {
        Some(member) => format!("{base}[{member}]"),
        None => base.to_string(),
    }
}

/// Translate `$smarty.<name>[.<member>]`. `member` is code.
pub fn compile_special_variable(
    cx: &ExprContext<'_>,
    name: &str,
    member: Option<&str>,
) -> CompileResult<String> {
    let name = name.trim_matches(|c| c == '\'' || c == '"');
    let code = match name {
        "foreach" | "section" => {
            indexed(&format!("$_tpl->vars['smarty']->value['{name}']"), member)
        }
        "capture" => indexed("$_tpl->captures", member),
        "now" => "time()".to_string(),
        "cookies" | "get" | "post" | "env" | "server" | "session" | "request" => {
            cx.guard(|policy| policy.check_super_globals())?;
            let global = if name == "cookies" {
                "$_COOKIE".to_string()
            } else {
                format!("$_{}", name.to_ascii_uppercase())
            };
            match member {
                Some(member) if cx.config.safe_lookups != SafeLookups::Unsafe => format!(
                    "tpl_safe_lookup({global}, {member}, {})",
                    cx.config.safe_lookups.code()
                ),
                _ => indexed(&global, member),
            }
        }
        "template" => "basename($_tpl->source->filepath)".to_string(),
        "template_object" => indexed("$_tpl", member),
        "current_dir" => "dirname($_tpl->source->filepath)".to_string(),
        "version" => quote_str(&cx.config.version),
        "const" => {
            cx.guard(|policy| policy.check_constants())?;
            match member {
                Some(member) => format!("@constant({member})"),
                None => return Err(unresolved(name)),
            }
        }
        "config" => match member {
            Some(member) => format!("$_tpl->getConfigVariable({member})"),
            None => return Err(unresolved(name)),
        },
        "ldelim" => quote_str(&cx.config.left_delimiter),
        "rdelim" => quote_str(&cx.config.right_delimiter),
        _ => return Err(unresolved(name)),
    };
    Ok(code)
}

fn unresolved(name: &str) -> CompileError {
    CompileError::UnresolvedSpecialVariable {
        name: format!("$smarty.{name}"),
        line: None,
    }
}

/// `private_special_variable` tag: `var` is the quoted name.
pub fn compile_tag(
    cx: &mut TagContext<'_>,
    attrs: &ResolvedAttributes,
    _variant: u8,
) -> CompileResult<String> {
    let var = cx.attr(attrs.require_code("var"))?;
    let name = unquote_literal(var).unwrap_or_else(|| var.to_string());
    let member = attrs.code("member");
    let code = compile_special_variable(&cx.expr(), &name, member)?;
    cx.state.has_code = true;
    Ok(code)
}
