//! Tool definitions and execution types.

use serde::{Deserialize, Serialize};

/// Where a tool comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Built into the host application
    Builtin,
    /// Provided by the named MCP server
    Mcp(String),
}

/// Definition of a tool available to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (unique identifier)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
    /// Tool category
    pub category: ToolCategory,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            category: ToolCategory::Builtin,
        }
    }

    /// Set the parameters schema.
    pub fn with_parameters(mut self, schema: serde_json::Value) -> Self {
        self.parameters = schema;
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }
}

/// A request to call a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool arguments
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this is responding to
    pub tool_call_id: String,
    /// Whether execution succeeded
    pub success: bool,
    /// Output content
    pub output: String,
    /// Error message if failed
    pub error: Option<String>,
    /// Execution duration in milliseconds
    pub duration_ms: u64,
}

impl ToolResult {
    /// Create a successful result.
    pub fn success(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            success: true,
            output: output.into(),
            error: None,
            duration_ms: 0,
        }
    }

    /// Create a failed result.
    pub fn error(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            success: false,
            output: String::new(),
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Text to hand back to the model: the output on success, the error otherwise.
    pub fn content(&self) -> &str {
        match (&self.error, self.success) {
            (Some(error), false) => error,
            _ => &self.output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_builder() {
        let def = ToolDefinition::new("search", "Search the web")
            .with_parameters(json!({"type": "object", "properties": {"q": {"type": "string"}}}))
            .with_category(ToolCategory::Mcp("web".to_string()));

        assert_eq!(def.name, "search");
        assert_eq!(def.category, ToolCategory::Mcp("web".to_string()));
        assert_eq!(def.parameters["properties"]["q"]["type"], "string");
    }

    #[test]
    fn test_result_content() {
        let ok = ToolResult::success("call_1", "done").with_duration(12);
        assert!(ok.success);
        assert_eq!(ok.content(), "done");
        assert_eq!(ok.duration_ms, 12);

        let failed = ToolResult::error("call_2", "unknown MCP tool: nope");
        assert!(!failed.success);
        assert_eq!(failed.content(), "unknown MCP tool: nope");
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&ToolCategory::Mcp("fs".to_string())).unwrap();
        assert_eq!(json, r#"{"mcp":"fs"}"#);
    }
}
