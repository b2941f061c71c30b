//! Lowering of structured expressions to emitted code.

use crate::ast::{Expr, PrintNode};
use crate::config::CompilerConfig;
use crate::error::CompileResult;
use crate::modifiers::{compile_modifier_chain, enforce_print_modifiers};
use crate::security::SecurityPolicy;
use crate::state::CompilerState;
use crate::tags::special_variable::compile_special_variable;

/// What expression lowering may read and touch.
pub struct ExprContext<'a> {
    pub config: &'a CompilerConfig,
    pub policy: Option<&'a SecurityPolicy>,
    pub state: &'a mut CompilerState,
}

impl ExprContext<'_> {
    /// Run `check` against the installed policy. No policy allows everything.
    pub fn guard(
        &self,
        check: impl FnOnce(&SecurityPolicy) -> CompileResult<()>,
    ) -> CompileResult<()> {
        match self.policy {
            Some(policy) => check(policy),
            None => Ok(()),
        }
    }
}

pub fn lower_expr(cx: &mut ExprContext<'_>, expr: &Expr) -> CompileResult<String> {
    match expr {
        Expr::Code(code) => Ok(code.clone()),
        Expr::Special { special, member } => {
            compile_special_variable(cx, special, member.as_deref())
        }
        Expr::Call { call, args } => {
            cx.guard(|policy| policy.check_host_function(call))?;
            let args = lower_all(cx, args)?;
            Ok(format!("{call}({})", args.join(", ")))
        }
        Expr::Static { class, member } => {
            cx.guard(|policy| policy.check_static_class(class))?;
            Ok(format!("{class}::{member}"))
        }
        Expr::Modified { value, modifiers } => {
            let value = lower_expr(cx, value)?;
            compile_modifier_chain(cx, value, modifiers)
        }
    }
}

pub fn lower_all(cx: &mut ExprContext<'_>, exprs: &[Expr]) -> CompileResult<Vec<String>> {
    exprs.iter().map(|expr| lower_expr(cx, expr)).collect()
}

/// `{expr}` output statement.
pub fn compile_print(cx: &mut ExprContext<'_>, print: &PrintNode) -> CompileResult<String> {
    enforce_print_modifiers(cx.config, &print.print)?;
    let code = lower_expr(cx, &print.print)?;
    cx.state.has_code = true;
    Ok(format!("echo {code};\n"))
}
