//! Conversions from MCP tools into the shapes LLM backends consume.
//!
//! [`to_tool_definition`] produces the shared [`ToolDefinition`] and
//! [`FunctionTool`] is the chat-completion "function" tool format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolwire_core::tool::{ToolCategory, ToolDefinition};

use crate::protocol::McpTool;

/// Convert a tool served by `server` into a [`ToolDefinition`].
pub fn to_tool_definition(server: &str, tool: &McpTool) -> ToolDefinition {
    let description = tool
        .description
        .clone()
        .unwrap_or_else(|| format!("MCP tool from {}", server));

    ToolDefinition::new(&tool.name, description)
        .with_parameters(tool.input_schema.clone())
        .with_category(ToolCategory::Mcp(server.to_string()))
}

/// A tool in chat-completion "function" format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: FunctionParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameters {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: BTreeMap<String, PropertySpec>,
    pub required: Vec<String>,
}

/// One parameter; only its type and description survive conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl FunctionTool {
    /// Build the function form of an MCP tool from its input schema.
    ///
    /// Properties that are not objects and non-string `required` entries are
    /// dropped.
    pub fn from_mcp(tool: &McpTool) -> Self {
        let schema = &tool.input_schema;

        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter_map(|(name, def)| {
                        let def = def.as_object()?;
                        let property = PropertySpec {
                            kind: def.get("type").and_then(Value::as_str).map(str::to_string),
                            description: def
                                .get("description")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        };
                        Some((name.clone(), property))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: tool.name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                parameters: FunctionParameters {
                    kind: "object".to_string(),
                    properties,
                    required,
                },
            },
        }
    }
}
