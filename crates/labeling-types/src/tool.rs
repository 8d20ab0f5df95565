//! Tool-call wire shapes shared by `labeling-providers` (what the LLM can
//! call) and `labeling-tools` (what actually runs). A `ToolCall` is a
//! typed `{name, args}` pair rather than a free-form expression string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub desc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fig: Option<String>,
}
