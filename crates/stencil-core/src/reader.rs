use crate::ast::Node;
use crate::error::{CompileError, CompileResult};
use crate::resource::TemplateSource;
use serde_json::Value;

/// Front end that turns template source into the node stream.
///
/// Tokenizing real template syntax lives outside this crate. Anything that
/// can produce [`Node`]s plugs in here.
pub trait TemplateParser {
    fn parse(&self, source: &TemplateSource) -> CompileResult<Vec<Node>>;
}

/// Reads pre-parsed node documents stored as JSON.
///
/// Accepts either a bare node array or an envelope `{"nodes": [...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonNodeParser;

impl TemplateParser for JsonNodeParser {
    fn parse(&self, source: &TemplateSource) -> CompileResult<Vec<Node>> {
        read_nodes(&source.content).map_err(|err| CompileError::Parse {
            message: format!("invalid node document '{}': {err}", source.name),
        })
    }
}

pub fn read_nodes(input: &str) -> CompileResult<Vec<Node>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    let root: Value = serde_json::from_str(input).map_err(|err| CompileError::Parse {
        message: err.to_string(),
    })?;
    let nodes = match root {
        Value::Object(mut obj) => obj.remove("nodes").ok_or_else(|| CompileError::Parse {
            message: "node document object must contain \"nodes\"".to_string(),
        })?,
        other => other,
    };
    serde_json::from_value(nodes).map_err(|err| CompileError::Parse {
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    #[test]
    fn test_read_bare_array() {
        let nodes = read_nodes(r#"[{"text": "a"}, {"print": "$b"}]"#).unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_read_envelope() {
        let nodes = read_nodes(r#"{"nodes": [{"print": "$b", "line": 4}]}"#).unwrap();
        match &nodes[0] {
            Node::Print(print) => {
                assert_eq!(print.print, Expr::code("$b"));
                assert_eq!(print.line, 4);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_empty_source_is_empty_stream() {
        assert!(read_nodes("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_parser_names_template_on_error() {
        let source = TemplateSource::string("broken", "[{\"tag\": 1}]");
        let err = JsonNodeParser.parse(&source).unwrap_err();
        assert_eq!(err.code(), "STENCIL_E_PARSE");
        assert!(err.to_string().contains("'broken'"));
    }
}
