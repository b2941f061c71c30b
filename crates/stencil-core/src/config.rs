use crate::security::DirList;
use serde::{Deserialize, Serialize};

/// How superglobal reads are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeLookups {
    /// Plain array access.
    Unsafe,
    /// Missing keys fall back to an empty value.
    #[default]
    Safe,
    /// Like `Safe`, but the runtime also emits a warning.
    SafeWarn,
}

impl SafeLookups {
    /// Mode argument passed to the runtime lookup helper.
    pub fn code(self) -> u8 {
        match self {
            Self::Unsafe => 0,
            Self::Safe => 1,
            Self::SafeWarn => 2,
        }
    }
}

/// Engine settings threaded through every compile pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default = "default_left_delimiter")]
    pub left_delimiter: String,
    #[serde(default = "default_right_delimiter")]
    pub right_delimiter: String,
    /// Merge every literal include into the including unit.
    #[serde(default)]
    pub merge_compiled_includes: bool,
    /// Merge includes found inside inheritance blocks.
    #[serde(default = "default_true")]
    pub inheritance_merge_compiled_includes: bool,
    #[serde(default)]
    pub safe_lookups: SafeLookups,
    /// Print expressions must end with one of these modifiers.
    #[serde(default)]
    pub enforce_expression_modifiers: Vec<String>,
    #[serde(default)]
    pub enforce_modifiers_on_static_expressions: bool,
    /// Modifiers provided by runtime plugins rather than host functions.
    #[serde(default)]
    pub plugin_modifiers: Vec<String>,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default = "default_true")]
    pub mbstring: bool,
    #[serde(default = "default_max_inline_depth")]
    pub max_inline_depth: usize,
    #[serde(default)]
    pub template_dirs: DirList,
    #[serde(default)]
    pub config_dirs: DirList,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_left_delimiter() -> String {
    "{".to_string()
}

fn default_right_delimiter() -> String {
    "}".to_string()
}

fn default_true() -> bool {
    true
}

fn default_charset() -> String {
    "UTF-8".to_string()
}

fn default_max_inline_depth() -> usize {
    32
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            left_delimiter: default_left_delimiter(),
            right_delimiter: default_right_delimiter(),
            merge_compiled_includes: false,
            inheritance_merge_compiled_includes: true,
            safe_lookups: SafeLookups::default(),
            enforce_expression_modifiers: Vec::new(),
            enforce_modifiers_on_static_expressions: false,
            plugin_modifiers: Vec::new(),
            charset: default_charset(),
            mbstring: true,
            max_inline_depth: default_max_inline_depth(),
            template_dirs: DirList::default(),
            config_dirs: DirList::default(),
            version: default_version(),
        }
    }
}

impl CompilerConfig {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn is_plugin_modifier(&self, name: &str) -> bool {
        self.plugin_modifiers.iter().any(|item| item == name)
    }
}
