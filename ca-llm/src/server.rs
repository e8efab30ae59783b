use crate::client::{BackendEvent, EventStream, ModelRequest};
use crate::error::{LlmError, Result};
use crate::sse::{SseEvent, decode_sse};
use crate::types::{HistoryEntry, ToolDefinition, WireEntry};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

/// Client for the agent server's `/agent/stream` endpoint.
#[derive(Clone)]
pub struct AgentServerClient {
    http: reqwest::Client,
    base_url: String,
}

impl AgentServerClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn chat_stream(&self, request: &ModelRequest) -> Result<EventStream> {
        let body = ServerChatRequest::new(request)?;
        let url = format!("{}/agent/stream", self.base_url);
        tracing::debug!(
            url = %url,
            message_count = body.messages.len(),
            tool_count = body.tools.len(),
            "posting agent server stream request"
        );

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http(format!(
                "agent server returned status={status} body={body}"
            )));
        }

        let sse = decode_sse(response.bytes_stream());
        let events = sse.filter_map(|item| async move {
            match item {
                Ok(SseEvent::Data(data)) => parse_server_event(&data).map(Ok),
                Ok(SseEvent::Other) => None,
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(events))
    }
}

#[derive(Debug, Serialize)]
struct ServerChatRequest {
    messages: Vec<WireEntry>,
    tools: Vec<ServerTool>,
    todos: String,
    working_path: String,
}

impl ServerChatRequest {
    fn new(request: &ModelRequest) -> Result<Self> {
        let messages = request
            .history
            .iter()
            .map(HistoryEntry::to_wire)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            messages,
            tools: request.tools.iter().map(ServerTool::from).collect(),
            todos: request.todos.clone(),
            working_path: request.working_path.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ServerTool {
    r#type: &'static str,
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDefinition> for ServerTool {
    fn from(t: &ToolDefinition) -> Self {
        Self {
            r#type: "function",
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.parameters.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<WireEntry>,
}

/// Undecodable payloads and unknown event kinds are skipped.
fn parse_server_event(data: &str) -> Option<BackendEvent> {
    let event: ServerEvent = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "skipping undecodable agent server event");
            return None;
        }
    };
    let message = event.message?;
    let ai = match message.decode() {
        Ok(HistoryEntry::Ai(ai)) => ai,
        Ok(other) => {
            tracing::warn!(role = other.role().as_str(), "agent server streamed a non-ai message");
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping agent server message with bad payload");
            return None;
        }
    };
    match event.kind.as_str() {
        "acc" => Some(BackendEvent::Partial(ai)),
        "final" => Some(BackendEvent::Final(ai)),
        other => {
            tracing::debug!(kind = other, "ignoring agent server event kind");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AiMessage;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse_line(kind: &str, output: &str) -> String {
        let raw = serde_json::to_string(&AiMessage::text(output)).unwrap();
        let event = serde_json::json!({
            "type": kind,
            "message": { "role": "ai", "raw_json": raw }
        });
        format!("data: {event}\n\n")
    }

    #[test]
    fn parse_server_event_maps_kinds() {
        let raw = serde_json::to_string(&AiMessage::text("par")).unwrap();
        let data = serde_json::json!({"type": "acc", "message": {"role": "ai", "raw_json": raw}});
        assert_eq!(
            parse_server_event(&data.to_string()),
            Some(BackendEvent::Partial(AiMessage::text("par")))
        );
        assert_eq!(parse_server_event("not json"), None);
        assert_eq!(parse_server_event(r#"{"type":"ping"}"#), None);
    }

    #[tokio::test]
    async fn stream_yields_partials_then_final() {
        let server = MockServer::start().await;
        let body = format!(
            ": comment\n\n{}{}{}",
            sse_line("acc", "He"),
            sse_line("acc", "Hello"),
            sse_line("final", "Hello")
        );
        Mock::given(method("POST"))
            .and(path("/agent/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = AgentServerClient::new(reqwest::Client::new(), &server.uri());
        let request = ModelRequest {
            history: vec![HistoryEntry::human("hi")],
            ..ModelRequest::default()
        };
        let events: Vec<BackendEvent> = client
            .chat_stream(&request)
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                BackendEvent::Partial(AiMessage::text("He")),
                BackendEvent::Partial(AiMessage::text("Hello")),
                BackendEvent::Final(AiMessage::text("Hello")),
            ]
        );
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent/stream"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = AgentServerClient::new(reqwest::Client::new(), &server.uri());
        let err = client
            .chat_stream(&ModelRequest::default())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("502"));
    }
}
