use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
            Self::Tool => "tool",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "ai" => Ok(Self::Ai),
            "tool" => Ok(Self::Tool),
            other => Err(LlmError::ResponseFormat(format!(
                "unknown history role: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub call_id: String,
    /// JSON string.
    pub args: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiMessage {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl AiMessage {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanMessage {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub name: String,
    pub call_id: String,
    pub args: String,
    pub content: String,
}

/// One turn of the conversation with its payload already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEntry {
    Human(HumanMessage),
    Ai(AiMessage),
    Tool(ToolMessage),
}

impl HistoryEntry {
    pub fn human(content: impl Into<String>) -> Self {
        Self::Human(HumanMessage {
            content: content.into(),
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Human(_) => Role::Human,
            Self::Ai(_) => Role::Ai,
            Self::Tool(_) => Role::Tool,
        }
    }

    pub fn as_ai(&self) -> Option<&AiMessage> {
        match self {
            Self::Ai(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn to_wire(&self) -> Result<WireEntry> {
        let raw_json = match self {
            Self::Human(msg) => serde_json::to_string(msg)?,
            Self::Ai(msg) => serde_json::to_string(msg)?,
            Self::Tool(msg) => serde_json::to_string(msg)?,
        };
        Ok(WireEntry {
            role: self.role().as_str().to_string(),
            raw_json,
        })
    }
}

/// Transport shape of a history entry: a role tag plus the payload as a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEntry {
    pub role: String,
    pub raw_json: String,
}

impl WireEntry {
    pub fn decode(&self) -> Result<HistoryEntry> {
        let raw = if self.raw_json.trim().is_empty() {
            "{}"
        } else {
            self.raw_json.as_str()
        };
        match Role::parse(&self.role)? {
            Role::Human => {
                let value: serde_json::Value = serde_json::from_str(raw)?;
                let content = value
                    .get("content")
                    .or_else(|| value.get("output"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                Ok(HistoryEntry::Human(HumanMessage { content }))
            }
            Role::Ai => Ok(HistoryEntry::Ai(serde_json::from_str(raw)?)),
            Role::Tool => Ok(HistoryEntry::Tool(serde_json::from_str(raw)?)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema.
    pub parameters: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_entry_wire_payload_carries_tool_calls() {
        let entry = HistoryEntry::Ai(AiMessage {
            reasoning: String::new(),
            output: "checking".to_string(),
            tool_calls: vec![ToolCall {
                name: "list".to_string(),
                call_id: "call_1".to_string(),
                args: "{}".to_string(),
            }],
        });
        let wire = entry.to_wire().unwrap();
        assert_eq!(wire.role, "ai");
        let raw: serde_json::Value = serde_json::from_str(&wire.raw_json).unwrap();
        assert_eq!(raw["tool_calls"][0]["call_id"], "call_1");
        assert_eq!(wire.decode().unwrap(), entry);
    }

    #[test]
    fn server_ai_payload_with_extra_fields_decodes() {
        let wire = WireEntry {
            role: "ai".to_string(),
            raw_json: r#"{"role":"ai","output":"hi","reasoning":"","tool_calls":[]}"#.to_string(),
        };
        let entry = wire.decode().unwrap();
        assert_eq!(entry.as_ai().unwrap().output, "hi");
        assert!(!entry.as_ai().unwrap().requests_tools());
    }

    #[test]
    fn human_payload_falls_back_to_output_field() {
        let wire = WireEntry {
            role: "human".to_string(),
            raw_json: r#"{"output":"hello"}"#.to_string(),
        };
        assert_eq!(wire.decode().unwrap(), HistoryEntry::human("hello"));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let wire = WireEntry {
            role: "system".to_string(),
            raw_json: "{}".to_string(),
        };
        assert!(wire.decode().unwrap_err().to_string().contains("unknown history role"));
    }
}
