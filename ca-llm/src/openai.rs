use crate::client::{BackendEvent, EventStream, ModelRequest};
use crate::error::{LlmError, Result};
use crate::sse::{SseEvent, decode_sse};
use crate::types::{AiMessage, HistoryEntry, ToolCall, ToolDefinition};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Streaming client for OpenAI-compatible chat completions (OpenAI, OpenRouter).
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    reasoning_effort: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: &str,
        model: &str,
        reasoning_effort: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            reasoning_effort,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn chat_stream(&self, request: &ModelRequest) -> Result<EventStream> {
        let req = OpenAiChatRequest::new(&self.model, self.reasoning_effort.as_deref(), request);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http(format!(
                "openai stream status={status} body={body}"
            )));
        }

        let sse = Box::pin(decode_sse(response.bytes_stream()));
        let stream = futures_util::stream::unfold(
            (sse, OpenAiStreamState::default()),
            |(mut sse, mut state)| async move {
                if state.finished {
                    return None;
                }
                loop {
                    let Some(next) = sse.as_mut().next().await else {
                        state.finished = true;
                        let last = BackendEvent::Final(state.message.clone());
                        return Some((Ok(last), (sse, state)));
                    };
                    match next {
                        Ok(SseEvent::Data(data)) => {
                            if data.trim() == "[DONE]" {
                                state.finished = true;
                                let last = BackendEvent::Final(state.message.clone());
                                return Some((Ok(last), (sse, state)));
                            }

                            let chunk: OpenAiStreamResponseChunk =
                                match serde_json::from_str(&data) {
                                    Ok(v) => v,
                                    Err(e) => {
                                        return Some((
                                            Err(LlmError::StreamParse(format!(
                                                "openai chunk json error={e} data={data}"
                                            ))),
                                            (sse, state),
                                        ));
                                    }
                                };

                            if state.apply(chunk) {
                                let partial = BackendEvent::Partial(state.message.clone());
                                return Some((Ok(partial), (sse, state)));
                            }
                        }
                        Ok(SseEvent::Other) => continue,
                        Err(e) => return Some((Err(e), (sse, state))),
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
    stream: bool,
}

impl OpenAiChatRequest {
    fn new(model: &str, reasoning_effort: Option<&str>, request: &ModelRequest) -> Self {
        let mut messages = Vec::with_capacity(request.history.len() + 1);
        let system = system_content(request);
        if !system.is_empty() {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(system),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }
        messages.extend(request.history.iter().map(to_openai_message));

        let tools: Vec<OpenAiTool> = request.tools.iter().map(to_openai_tool).collect();
        let tool_choice = (!tools.is_empty()).then(|| "auto".to_string());

        Self {
            model: model.to_string(),
            messages,
            tools,
            tool_choice,
            reasoning_effort: reasoning_effort
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            stream: true,
        }
    }
}

fn system_content(request: &ModelRequest) -> String {
    let mut out = request.system_prompt.trim().to_string();
    if !request.working_path.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&format!("Project root: {}", request.working_path));
    }
    if !request.todos.trim().is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(request.todos.trim());
    }
    out
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiToolFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

fn to_openai_tool(t: &ToolDefinition) -> OpenAiTool {
    OpenAiTool {
        r#type: "function".to_string(),
        function: OpenAiToolFunction {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.parameters.clone(),
        },
    }
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiToolFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAiToolFunctionCall {
    name: String,
    arguments: String,
}

fn to_openai_message(entry: &HistoryEntry) -> OpenAiMessage {
    match entry {
        HistoryEntry::Human(msg) => OpenAiMessage {
            role: "user".to_string(),
            content: Some(msg.content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        },
        HistoryEntry::Ai(msg) => OpenAiMessage {
            role: "assistant".to_string(),
            content: Some(msg.output.clone()).filter(|s| !s.is_empty()),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|tc| OpenAiToolCall {
                    id: tc.call_id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAiToolFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.args.clone(),
                    },
                })
                .collect(),
            tool_call_id: None,
        },
        HistoryEntry::Tool(msg) => OpenAiMessage {
            role: "tool".to_string(),
            content: Some(msg.content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: Some(msg.call_id.clone()),
        },
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamResponseChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiStreamDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDeltaToolCall {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAiStreamDeltaToolFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDeltaToolFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct OpenAiStreamState {
    message: AiMessage,
    /// Provider tool-call index -> position in `message.tool_calls`.
    tool_slots: HashMap<u32, usize>,
    finished: bool,
}

impl OpenAiStreamState {
    /// Folds one chunk into the accumulated message; returns whether it changed.
    fn apply(&mut self, chunk: OpenAiStreamResponseChunk) -> bool {
        let Some(choice) = chunk.choices.into_iter().next() else {
            return false;
        };
        let delta = choice.delta;
        let mut changed = false;

        if let Some(content) = delta.content.filter(|s| !s.is_empty()) {
            self.message.output.push_str(&content);
            changed = true;
        }
        if let Some(reasoning) = delta.reasoning.filter(|s| !s.is_empty()) {
            self.message.reasoning.push_str(&reasoning);
            changed = true;
        }

        for tc in delta.tool_calls.unwrap_or_default() {
            let idx = tc.index.unwrap_or(0);
            let slot = *self.tool_slots.entry(idx).or_insert_with(|| {
                self.message.tool_calls.push(ToolCall {
                    name: String::new(),
                    call_id: String::new(),
                    args: String::new(),
                });
                self.message.tool_calls.len() - 1
            });
            let call = &mut self.message.tool_calls[slot];
            if let Some(id) = tc.id.filter(|s| !s.is_empty()) {
                call.call_id = id;
            }
            if let Some(function) = tc.function {
                if let Some(name) = function.name.filter(|s| !s.is_empty()) {
                    call.name = name;
                }
                if let Some(arguments) = function.arguments {
                    call.args.push_str(&arguments);
                }
            }
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolMessage;

    fn chunk(json: serde_json::Value) -> OpenAiStreamResponseChunk {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn stream_state_accumulates_content_and_tool_calls() {
        let mut state = OpenAiStreamState::default();
        assert!(state.apply(chunk(serde_json::json!({
            "choices": [{ "delta": { "content": "Let me look" } }]
        }))));
        assert!(state.apply(chunk(serde_json::json!({
            "choices": [{ "delta": { "tool_calls": [
                { "index": 0, "id": "call_a", "function": { "name": "read_files", "arguments": "{\"filePa" } }
            ] } }]
        }))));
        assert!(state.apply(chunk(serde_json::json!({
            "choices": [{ "delta": { "tool_calls": [
                { "index": 0, "function": { "arguments": "ths\":[\"a.txt\"]}" } }
            ] } }]
        }))));
        assert!(!state.apply(chunk(serde_json::json!({ "choices": [] }))));

        assert_eq!(state.message.output, "Let me look");
        assert_eq!(state.message.tool_calls.len(), 1);
        assert_eq!(state.message.tool_calls[0].call_id, "call_a");
        assert_eq!(state.message.tool_calls[0].name, "read_files");
        assert_eq!(state.message.tool_calls[0].args, r#"{"filePaths":["a.txt"]}"#);
    }

    #[test]
    fn request_maps_history_roles_and_prepends_system() {
        let request = ModelRequest {
            history: vec![
                HistoryEntry::human("hi"),
                HistoryEntry::Ai(AiMessage {
                    reasoning: String::new(),
                    output: String::new(),
                    tool_calls: vec![ToolCall {
                        name: "list".to_string(),
                        call_id: "c1".to_string(),
                        args: "{}".to_string(),
                    }],
                }),
                HistoryEntry::Tool(ToolMessage {
                    name: "list".to_string(),
                    call_id: "c1".to_string(),
                    args: "{}".to_string(),
                    content: "<project-entries>\n</project-entries>".to_string(),
                }),
            ],
            system_prompt: "be brief".to_string(),
            todos: "<current_todo_list>\n[ ] 1. x\n</current_todo_list>".to_string(),
            ..ModelRequest::default()
        };
        let req = OpenAiChatRequest::new("gpt-5-mini", Some("low"), &request);
        let value = serde_json::to_value(&req).unwrap();
        let messages = value["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"].as_str().unwrap().contains("current_todo_list"));
        assert_eq!(messages[2]["role"], "assistant");
        assert!(messages[2].get("content").is_none());
        assert_eq!(messages[2]["tool_calls"][0]["id"], "c1");
        assert_eq!(messages[3]["tool_call_id"], "c1");
        assert_eq!(value["reasoning_effort"], "low");
        assert!(value.get("tools").is_none());
    }
}
