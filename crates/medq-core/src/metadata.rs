//! Static description of a remote tool

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of one remote operation, as returned by `list_tools`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON Schema of the call parameters
    #[serde(
        default = "empty_object_schema",
        alias = "inputSchema",
        alias = "input_schema"
    )]
    pub parameter_schema: Value,

    /// JSON Schema of the returned payload, when the backend publishes one
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "outputSchema",
        alias = "output_schema"
    )]
    pub return_schema: Option<Value>,
}

impl ToolMetadata {
    /// Tool accepting any JSON object
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: empty_object_schema(),
            return_schema: None,
        }
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mcp_tool_definition() {
        let tool: ToolMetadata = serde_json::from_value(json!({
            "name": "search_drugs",
            "description": "Search the drug database",
            "inputSchema": {
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }
        }))
        .unwrap();

        assert_eq!(tool.name, "search_drugs");
        assert_eq!(tool.parameter_schema["required"][0], "query");
        assert!(tool.return_schema.is_none());
    }

    #[test]
    fn test_parse_minimal_rest_tool() {
        let tool: ToolMetadata = serde_json::from_value(json!({
            "name": "search",
            "output_schema": {"type": "array"}
        }))
        .unwrap();

        assert_eq!(tool.description, "");
        assert_eq!(tool.parameter_schema, json!({"type": "object"}));
        assert_eq!(tool.return_schema, Some(json!({"type": "array"})));
    }
}
