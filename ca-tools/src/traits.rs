use crate::error::{Result, ToolError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// A handler the model can call by name. Arguments arrive as a JSON object and
/// the result is plain text that goes straight back into the conversation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, arguments: serde_json::Value) -> Result<String>;
}

pub fn to_llm_tool_def(tool: &dyn Tool) -> ca_llm::ToolDefinition {
    let spec = tool.spec();
    ca_llm::ToolDefinition {
        name: spec.name,
        description: spec.description,
        parameters: spec.parameters_schema,
    }
}

/// Decodes the whole argument object into a typed struct.
pub(crate) fn parse_args<T: DeserializeOwned>(args: serde_json::Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

pub(crate) fn require_string(args: &serde_json::Value, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        serde_json::Value::String(s) => Ok(s.clone()),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other}"
        ))),
    }
}
