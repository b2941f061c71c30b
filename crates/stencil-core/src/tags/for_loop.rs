//! `{for}`, `{forelse}` and `{/for}`.
//!
//! Variant 0 is the counted range form `{for $i = start to end [step n] [max m]}`.
//! Variant 1 is the general form `{for $x = a, $y = b; cond; $x++}`.

use super::TagContext;
use crate::attributes::{AttributeContract, ResolvedAttributes};
use crate::emit::{parse_int_literal, var_ref, var_ref_code};
use crate::error::CompileResult;
use crate::state::TagKind;

pub const RANGE: AttributeContract = AttributeContract {
    required: &["start", "to"],
    optional: &["max", "step"],
    shorttag_order: &[],
    option_flags: &[],
};

pub const GENERAL: AttributeContract = AttributeContract {
    required: &["start", "ifexp", "var", "step"],
    optional: &[],
    shorttag_order: &[],
    option_flags: &[],
};

const FOR_CLOSERS: &[&str] = &["forelse", "forclose"];
const FORELSE_CLOSERS: &[&str] = &["forclose"];

pub fn contract(variant: u8) -> AttributeContract {
    match variant {
        0 => RANGE,
        _ => GENERAL,
    }
}

/// Iteration count of a counted loop, as the emitted code computes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPlan {
    pub start: i64,
    pub end: i64,
    pub step: i64,
    pub max: Option<i64>,
}

impl LoopPlan {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            step: 1,
            max: None,
        }
    }

    pub fn step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    /// `ceil(span / |step|)` clamped to `max`, never negative. A zero step
    /// never iterates.
    pub fn total(&self) -> i64 {
        if self.step == 0 {
            return 0;
        }
        let (start, end, step) = (
            i128::from(self.start),
            i128::from(self.end),
            i128::from(self.step),
        );
        let span = if step > 0 {
            end + 1 - start
        } else {
            start - end + 1
        };
        let divisor = step.abs();
        let mut total = span.div_euclid(divisor);
        if span.rem_euclid(divisor) != 0 {
            total += 1;
        }
        if let Some(max) = self.max {
            total = total.min(i128::from(max));
        }
        i64::try_from(total.max(0)).unwrap_or(i64::MAX)
    }

    fn from_codes(start: &str, end: &str, step: &str, max: Option<&str>) -> Option<Self> {
        let mut plan = LoopPlan::new(parse_int_literal(start)?, parse_int_literal(end)?)
            .step(parse_int_literal(step)?);
        if let Some(max) = max {
            plan = plan.max(parse_int_literal(max)?);
        }
        Some(plan)
    }
}

pub fn compile_for(
    cx: &mut TagContext<'_>,
    attrs: &ResolvedAttributes,
    variant: u8,
) -> CompileResult<String> {
    let output = if variant == 0 {
        compile_range(cx, attrs)?
    } else {
        compile_general(cx, attrs)?
    };
    cx.state.open_tag(TagKind::For, FOR_CLOSERS, cx.line);
    cx.state.has_code = true;
    Ok(output)
}

fn compile_range(cx: &TagContext<'_>, attrs: &ResolvedAttributes) -> CompileResult<String> {
    let start = cx.attr(attrs.require_assign("start"))?;
    let to = cx.attr(attrs.require_code("to"))?;
    let step = attrs.code("step").unwrap_or("1");
    let max = attrs.code("max");
    let var = var_ref(&start.var);
    let from = &start.value;

    let mut out = String::new();
    out.push_str(&format!("{var} = new TplVar;\n"));
    out.push_str(&format!("{var}->step = {step};\n"));
    match LoopPlan::from_codes(from, to, step, max) {
        Some(plan) => out.push_str(&format!("{var}->total = {};\n", plan.total())),
        None => {
            let count = format!(
                "ceil(({var}->step > 0 ? {to}+1 - ({from}) : {from}-({to})+1)/abs({var}->step))"
            );
            let count = match max {
                Some(max) => format!("min({count}, {max})"),
                None => count,
            };
            out.push_str(&format!("{var}->total = (int) {count};\n"));
        }
    }
    out.push_str(&format!("if ({var}->total > 0) {{\n"));
    out.push_str(&format!(
        "  for ({var}->value = {from}, {var}->iteration = 1;{var}->iteration <= {var}->total;{var}->value += {var}->step, {var}->iteration++) {{\n"
    ));
    out.push_str(&format!("{var}->first = {var}->iteration == 1;\n"));
    out.push_str(&format!("{var}->last = {var}->iteration == {var}->total;\n"));
    Ok(out)
}

fn compile_general(cx: &TagContext<'_>, attrs: &ResolvedAttributes) -> CompileResult<String> {
    let starts = cx.attr(attrs.require_assign_list("start"))?;
    let condition = cx.attr(attrs.require_code("ifexp"))?;
    let var = cx.attr(attrs.require_code("var"))?;
    let step = cx.attr(attrs.require_code("step"))?;

    let mut out = String::new();
    for statement in starts {
        let target = var_ref(&statement.var);
        out.push_str(&format!("{target} = new TplVar;\n"));
        out.push_str(&format!("{target}->value = {};\n", statement.value));
    }
    out.push_str(&format!("if ({condition}) {{\n"));
    out.push_str(&format!(
        "  for ($_foo=true;{condition}; {}->value{step}) {{\n",
        var_ref_code(var)
    ));
    Ok(out)
}

pub fn compile_forelse(
    cx: &mut TagContext<'_>,
    _attrs: &ResolvedAttributes,
    _variant: u8,
) -> CompileResult<String> {
    cx.state.close_tag(cx.tag, &[TagKind::For], cx.line)?;
    cx.state.open_tag(TagKind::ForElse, FORELSE_CLOSERS, cx.line);
    cx.state.has_code = true;
    Ok("}\n} else {\n".to_string())
}

pub fn compile_forclose(
    cx: &mut TagContext<'_>,
    _attrs: &ResolvedAttributes,
    _variant: u8,
) -> CompileResult<String> {
    let open = cx
        .state
        .close_tag(cx.tag, &[TagKind::For, TagKind::ForElse], cx.line)?;
    cx.state.has_code = true;
    Ok(match open.kind {
        TagKind::ForElse => "}\n".to_string(),
        TagKind::For => "}\n}\n".to_string(),
    })
}
