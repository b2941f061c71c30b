use crate::compiler::{compile_template, CompileEnv, CompiledTemplate};
use crate::config::CompilerConfig;
use crate::error::CompileResult;
use crate::reader::{JsonNodeParser, TemplateParser};
use crate::resource::{MemoryLoader, ResourceLoader};
use crate::security::SecurityPolicy;
use crate::tags::{TagRegistry, TagSpec};
use std::sync::Arc;

/// Engine-scoped compile surface.
///
/// Configuration, policy and the tag table are instance-local, so different
/// hosts can run differently configured engines side by side.
pub struct Engine {
    loader: Box<dyn ResourceLoader>,
    parser: Box<dyn TemplateParser>,
    config: CompilerConfig,
    policy: Option<Arc<SecurityPolicy>>,
    tags: TagRegistry,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(MemoryLoader::new())
    }
}

impl Engine {
    /// Create an engine reading JSON node documents from `loader`.
    pub fn new(loader: impl ResourceLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            parser: Box::new(JsonNodeParser),
            config: CompilerConfig::default(),
            policy: None,
            tags: TagRegistry::new(),
        }
    }

    pub fn with_parser(mut self, parser: impl TemplateParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable security checks. The policy may be shared across engines.
    pub fn with_policy(mut self, policy: Arc<SecurityPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Register or replace a tag compiler.
    pub fn register_tag(&mut self, name: impl Into<String>, spec: TagSpec) -> Option<TagSpec> {
        self.tags.register(name, spec)
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut CompilerConfig {
        &mut self.config
    }

    pub fn policy(&self) -> Option<&SecurityPolicy> {
        self.policy.as_deref()
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    /// Compile a top-level template.
    pub fn compile(&self, name: &str) -> CompileResult<CompiledTemplate> {
        compile_template(&self.env(), name, false)
    }

    /// Compile `name` as the body of an inheritance block.
    pub fn compile_in_block(&self, name: &str) -> CompileResult<CompiledTemplate> {
        compile_template(&self.env(), name, true)
    }

    fn env(&self) -> CompileEnv<'_> {
        CompileEnv {
            config: &self.config,
            policy: self.policy.as_deref(),
            loader: self.loader.as_ref(),
            parser: self.parser.as_ref(),
            tags: &self.tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::ResolvedAttributes;
    use crate::emit::echo_text;
    use crate::error::{CompileError, PolicyKind};
    use crate::resource::FileLoader;
    use crate::security::DirList;
    use crate::tags::{no_attributes, TagContext};
    use serde_json::json;
    use std::path::Path;

    fn hello(
        cx: &mut TagContext<'_>,
        _attrs: &ResolvedAttributes,
        _variant: u8,
    ) -> CompileResult<String> {
        cx.state.has_code = true;
        Ok(echo_text("hello"))
    }

    #[test]
    fn custom_tags_are_instance_local() {
        let loader = MemoryLoader::new().with("a", r#"[{"tag": "hello"}]"#);
        let mut engine = Engine::new(loader.clone());
        assert!(engine
            .register_tag("hello", TagSpec::statement(no_attributes, hello))
            .is_none());
        assert_eq!(engine.compile("a").unwrap().body, "echo 'hello';\n");

        let plain = Engine::new(loader);
        assert_eq!(plain.compile("a").unwrap_err().code(), "STENCIL_E_TAG_UNKNOWN");
    }

    #[test]
    fn shared_policy_applies() {
        let loader = MemoryLoader::new().with(
            "a",
            r#"[{"print": {"special": "get", "member": "'q'"}}]"#,
        );
        let mut policy = SecurityPolicy::default();
        policy.allow_super_globals = false;
        let policy = Arc::new(policy);

        let engine = Engine::new(loader.clone()).with_policy(Arc::clone(&policy));
        assert!(engine.compile("a").is_err());
        assert!(Engine::new(loader).compile("a").is_ok());
    }

    fn include_inline(path: &Path) -> String {
        json!([{"tag": "include", "args": [format!("'{}'", path.display()), {"flag": "inline"}]}])
            .to_string()
    }

    fn secured_file_engine(dirs: DirList) -> Engine {
        let mut config = CompilerConfig::default();
        config.template_dirs = dirs.clone();
        Engine::new(FileLoader::new(dirs))
            .with_config(config)
            .with_policy(Arc::new(SecurityPolicy::default()))
    }

    fn is_directory_violation(err: &CompileError) -> bool {
        matches!(
            err,
            CompileError::PolicyViolation {
                kind: PolicyKind::Directory,
                ..
            }
        )
    }

    #[test]
    fn policy_gates_merged_templates_outside_trusted_dirs() {
        let trusted = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let secret = outside.path().join("secret.json");
        std::fs::write(&secret, r#"[{"text": "SECRET"}]"#).unwrap();
        std::fs::write(trusted.path().join("main.json"), include_inline(&secret)).unwrap();

        let engine = secured_file_engine(DirList::new(vec![trusted.path().to_path_buf()]));
        let err = engine.compile("main.json").unwrap_err();
        assert!(is_directory_violation(&err), "{err:?}");
        assert!(is_directory_violation(
            &engine.compile(&secret.display().to_string()).unwrap_err()
        ));
    }

    #[test]
    fn policy_allows_merged_templates_inside_trusted_dirs() {
        let trusted = tempfile::tempdir().unwrap();
        let part = trusted.path().join("part.json");
        std::fs::write(&part, r#"[{"text": "PART"}]"#).unwrap();
        std::fs::write(trusted.path().join("main.json"), include_inline(&part)).unwrap();

        let engine = secured_file_engine(DirList::new(vec![trusted.path().to_path_buf()]));
        let compiled = engine.compile("main.json").unwrap();
        assert_eq!(compiled.merged_functions.len(), 1);
        assert_eq!(
            compiled.merged_functions.values().next().unwrap(),
            "echo 'PART';\n"
        );
    }

    #[test]
    fn block_compile_forces_inline_eligibility() {
        let loader = MemoryLoader::new().with(
            "a",
            r#"[{"tag": "include", "args": ["$_tpl->vars['f']->value"]}]"#,
        );
        let engine = Engine::new(loader);
        assert!(engine.compile("a").is_ok());
        assert_eq!(
            engine.compile_in_block("a").unwrap_err().code(),
            "STENCIL_E_INLINE"
        );
    }
}
