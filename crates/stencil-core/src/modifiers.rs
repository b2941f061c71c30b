//! Modifier chains and print-expression enforcement.

use crate::ast::{Expr, ModifierCall};
use crate::config::CompilerConfig;
use crate::emit::{is_static_literal, quote_str, unquote_literal};
use crate::error::{CompileError, CompileResult};
use crate::expr::{lower_all, ExprContext};
use tracing::trace;

/// Apply `modifiers` to `value` left to right.
pub fn compile_modifier_chain(
    cx: &mut ExprContext<'_>,
    value: String,
    modifiers: &[ModifierCall],
) -> CompileResult<String> {
    let mut code = value;
    for modifier in modifiers {
        code = compile_modifier(cx, code, modifier)?;
    }
    Ok(code)
}

fn compile_modifier(
    cx: &mut ExprContext<'_>,
    value: String,
    modifier: &ModifierCall,
) -> CompileResult<String> {
    let name = modifier.name.as_str();
    cx.guard(|policy| policy.check_modifier(name))?;
    let args = lower_all(cx, &modifier.args)?;

    match name {
        "default" => {
            let fallback = args.first().cloned().unwrap_or_else(|| "''".to_string());
            Ok(format!("tpl_default({value}, {fallback})"))
        }
        "escape" => Ok(compile_escape(cx, value, &args)),
        _ if cx.config.is_plugin_modifier(name) => Ok(plugin_call(cx, name, value, &args)),
        _ => {
            cx.guard(|policy| policy.check_host_modifier(name))?;
            Ok(call_with(name, value, &args))
        }
    }
}

fn call_with(function: &str, value: String, args: &[String]) -> String {
    let mut params = Vec::with_capacity(args.len() + 1);
    params.push(value);
    params.extend(args.iter().cloned());
    format!("{function}({})", params.join(", "))
}

fn plugin_call(cx: &mut ExprContext<'_>, name: &str, value: String, args: &[String]) -> String {
    let function = format!("tpl_modifier_{name}");
    cx.state.require_plugin(name, "modifier", function.clone());
    call_with(&function, value, args)
}

/// Inline `escape` for the well-known types, runtime plugin otherwise.
///
/// Arguments: type (default html), charset, double_encode.
fn compile_escape(cx: &mut ExprContext<'_>, value: String, args: &[String]) -> String {
    let esc_type = match args.first() {
        Some(code) => unquote_literal(code),
        None => Some("html".to_string()),
    };
    let charset = args
        .get(1)
        .filter(|code| code.trim() != "null")
        .cloned()
        .unwrap_or_else(|| quote_str(&cx.config.charset));
    let double_encode = args.get(2).cloned().unwrap_or_else(|| "true".to_string());

    let inline = match esc_type.as_deref() {
        Some("html") => Some(format!(
            "htmlspecialchars({value}, ENT_QUOTES, {charset}, {double_encode})"
        )),
        Some("htmlall") if cx.config.mbstring => Some(format!(
            "mb_convert_encoding(htmlspecialchars({value}, ENT_QUOTES, {charset}, {double_encode}), 'HTML-ENTITIES', {charset})"
        )),
        Some("htmlall") => Some(format!(
            "htmlentities({value}, ENT_QUOTES, {charset}, {double_encode})"
        )),
        Some("url") => Some(format!("rawurlencode({value})")),
        Some("urlpathinfo") => Some(format!("str_replace('%2F', '/', rawurlencode({value}))")),
        Some("quotes") => Some(format!(r#"preg_replace("%(?<!\\\\)'%", "\\'", {value})"#)),
        Some("javascript") => Some(format!(
            r#"strtr({value}, array("\\" => "\\\\", "'" => "\\'", "\"" => "\\\"", "\r" => "\\r", "\n" => "\\n", "</" => "<\/"))"#
        )),
        _ => None,
    };

    match inline {
        Some(code) => code,
        None => {
            trace!(escape_type = ?esc_type, "escape falls back to runtime plugin");
            plugin_call(cx, "escape", value, args)
        }
    }
}

/// Reject print expressions that do not end with an enforced modifier.
///
/// A static expression (literal value, literal modifier arguments) is exempt
/// unless `enforce_modifiers_on_static_expressions` is set.
pub fn enforce_print_modifiers(config: &CompilerConfig, expr: &Expr) -> CompileResult<()> {
    let required = &config.enforce_expression_modifiers;
    if required.is_empty() {
        return Ok(());
    }
    let (value, modifiers) = match expr {
        Expr::Modified { value, modifiers } => (value.as_ref(), modifiers.as_slice()),
        other => (other, &[][..]),
    };
    if is_static(value, modifiers) && !config.enforce_modifiers_on_static_expressions {
        return Ok(());
    }
    let ends_enforced = modifiers
        .last()
        .is_some_and(|last| required.iter().any(|name| *name == last.name));
    if ends_enforced {
        Ok(())
    } else {
        Err(CompileError::ModifierEnforcement {
            expected: required.join(", "),
            line: None,
        })
    }
}

fn is_literal_expr(expr: &Expr) -> bool {
    matches!(expr, Expr::Code(code) if is_static_literal(code))
}

fn is_static(value: &Expr, modifiers: &[ModifierCall]) -> bool {
    is_literal_expr(value)
        && modifiers
            .iter()
            .all(|modifier| modifier.args.iter().all(is_literal_expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyKind;
    use crate::resource::TemplateSource;
    use crate::security::SecurityPolicy;
    use crate::state::CompilerState;

    fn chain(
        config: &CompilerConfig,
        policy: Option<&SecurityPolicy>,
        modifiers: Vec<ModifierCall>,
    ) -> (CompileResult<String>, CompilerState) {
        let mut state = CompilerState::new(TemplateSource::string("t", ""), false);
        let mut cx = ExprContext {
            config,
            policy,
            state: &mut state,
        };
        let result = compile_modifier_chain(&mut cx, "$v".to_string(), &modifiers);
        (result, state)
    }

    fn escape(args: &[&str]) -> ModifierCall {
        ModifierCall::new("escape", args.iter().map(|a| Expr::code(*a)).collect())
    }

    #[test]
    fn escape_html_compiles_inline() {
        let config = CompilerConfig::default();
        let (code, state) = chain(&config, None, vec![escape(&["'html'"])]);
        assert_eq!(
            code.unwrap(),
            "htmlspecialchars($v, ENT_QUOTES, 'UTF-8', true)"
        );
        assert!(state.required_plugins.is_empty());

        let (code, _) = chain(&config, None, vec![escape(&[])]);
        assert!(code.unwrap().starts_with("htmlspecialchars($v"));
    }

    #[test]
    fn escape_url_and_htmlall() {
        let mut config = CompilerConfig::default();
        let (code, _) = chain(&config, None, vec![escape(&["\"url\""])]);
        assert_eq!(code.unwrap(), "rawurlencode($v)");

        config.mbstring = false;
        let (code, _) = chain(&config, None, vec![escape(&["'htmlall'"])]);
        assert_eq!(code.unwrap(), "htmlentities($v, ENT_QUOTES, 'UTF-8', true)");
    }

    #[test]
    fn escape_dynamic_type_falls_back_to_plugin() {
        let config = CompilerConfig::default();
        let (code, state) = chain(
            &config,
            None,
            vec![escape(&["$_tpl->vars['kind']->value"])],
        );
        assert_eq!(
            code.unwrap(),
            "tpl_modifier_escape($v, $_tpl->vars['kind']->value)"
        );
        assert_eq!(state.required_plugins["escape"].function, "tpl_modifier_escape");

        let (code, state) = chain(&config, None, vec![escape(&["'hex'"])]);
        assert_eq!(code.unwrap(), "tpl_modifier_escape($v, 'hex')");
        assert!(state.required_plugins.contains_key("escape"));
    }

    #[test]
    fn host_modifiers_need_policy_approval() {
        let config = CompilerConfig::default();
        let policy = SecurityPolicy::default();
        let (code, _) = chain(&config, Some(&policy), vec![ModifierCall::new("count", vec![])]);
        assert_eq!(code.unwrap(), "count($v)");

        let (err, _) = chain(&config, Some(&policy), vec![ModifierCall::new("md5", vec![])]);
        assert_eq!(
            err.unwrap_err(),
            CompileError::policy(PolicyKind::HostModifier, "md5")
        );
    }

    #[test]
    fn disabled_modifier_rejected_before_lowering() {
        let config = CompilerConfig::default();
        let mut policy = SecurityPolicy::default();
        policy.disabled_modifiers = vec!["escape".into()];
        let (err, _) = chain(&config, Some(&policy), vec![escape(&["'html'"])]);
        assert_eq!(
            err.unwrap_err(),
            CompileError::policy(PolicyKind::Modifier, "escape")
        );
    }

    #[test]
    fn plugin_modifiers_register_plugin() {
        let mut config = CompilerConfig::default();
        config.plugin_modifiers = vec!["capitalize".into()];
        let (code, state) = chain(&config, None, vec![ModifierCall::new("capitalize", vec![])]);
        assert_eq!(code.unwrap(), "tpl_modifier_capitalize($v)");
        assert_eq!(state.required_plugins["capitalize"].kind, "modifier");
    }

    fn enforced(modifiers: &[&str], on_static: bool) -> CompilerConfig {
        CompilerConfig {
            enforce_expression_modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
            enforce_modifiers_on_static_expressions: on_static,
            ..CompilerConfig::default()
        }
    }

    fn modified(value: &str, mods: Vec<ModifierCall>) -> Expr {
        Expr::modified(Expr::code(value), mods)
    }

    #[test]
    fn static_expressions_exempt_by_default() {
        let config = enforced(&["foo"], false);
        assert!(enforce_print_modifiers(&config, &Expr::code("\"foo\"")).is_ok());
        assert!(enforce_print_modifiers(
            &config,
            &modified("\"foo\"", vec![escape(&["\"hex\""])])
        )
        .is_ok());
    }

    #[test]
    fn static_expressions_checked_when_flag_set() {
        let config = enforced(&["foo"], true);
        let err = enforce_print_modifiers(&config, &Expr::code("\"foo\"")).unwrap_err();
        assert_eq!(err.code(), "STENCIL_E_MODIFIER_ENFORCED");

        let config = enforced(&["escape"], true);
        assert!(enforce_print_modifiers(
            &config,
            &modified(
                "\"foo\"",
                vec![escape(&[]), ModifierCall::new("capitalize", vec![])]
            )
        )
        .is_err());
        assert!(enforce_print_modifiers(&config, &modified("\"foo\"", vec![escape(&[])])).is_ok());
    }

    #[test]
    fn dynamic_values_and_arguments_must_end_enforced() {
        let config = enforced(&["escape"], false);
        let request = Expr::special("request", Some("'foo'"));
        assert!(enforce_print_modifiers(&config, &request).is_err());
        assert!(enforce_print_modifiers(
            &config,
            &Expr::modified(request, vec![escape(&[])])
        )
        .is_ok());

        let config = enforced(&["foo"], false);
        assert!(enforce_print_modifiers(
            &config,
            &modified("\"foo\"", vec![escape(&["$_tpl->vars['t']->value"])])
        )
        .is_err());
    }
}
