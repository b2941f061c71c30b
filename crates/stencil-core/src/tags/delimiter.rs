use super::TagContext;
use crate::attributes::ResolvedAttributes;
use crate::emit::echo_text;
use crate::error::CompileResult;

pub fn compile_ldelim(
    cx: &mut TagContext<'_>,
    _attrs: &ResolvedAttributes,
    _variant: u8,
) -> CompileResult<String> {
    cx.state.has_code = true;
    Ok(echo_text(&cx.env.config.left_delimiter))
}

pub fn compile_rdelim(
    cx: &mut TagContext<'_>,
    _attrs: &ResolvedAttributes,
    _variant: u8,
) -> CompileResult<String> {
    cx.state.has_code = true;
    Ok(echo_text(&cx.env.config.right_delimiter))
}

#[cfg(test)]
mod tests {
    use crate::tags::testing::{named, Harness};

    #[test]
    fn emits_configured_delimiters_and_marks_code() {
        let mut harness = Harness::new();
        harness.config.right_delimiter = "%}".into();
        assert_eq!(harness.run("ldelim", vec![], 0).unwrap(), "echo '{';\n");
        assert_eq!(harness.run("rdelim", vec![], 0).unwrap(), "echo '%}';\n");
        assert!(harness.state.has_code);
    }

    #[test]
    fn takes_no_attributes() {
        let mut harness = Harness::new();
        let err = harness.run("ldelim", vec![named("x", "1")], 0).unwrap_err();
        assert_eq!(err.code(), "STENCIL_E_ATTR_UNKNOWN");
    }
}
