//! The tool-use loop: stream a model turn into the transcript, run the tools
//! it asks for, feed the results back, and repeat.

use crate::session::Transcript;
use crate::signal::UpdateSignal;
use ca_llm::{
    AiMessage, BackendEvent, EventStream, HistoryEntry, LlmError, ModelBackend, ModelRequest,
    ToolMessage,
};
use ca_tools::{TodoStore, ToolRegistry};
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const MAX_LOOP_NOTICE: &str = "Max loop reached! Forcefully shutting down the agent.";
pub const CANCELLED_NOTICE: &str = "Turn cancelled.";
const SKIPPED_TOOL_CONTENT: &str = "Tool call skipped: the turn was cancelled.";

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub system_prompt: String,
    pub max_iterations: usize,
    /// Longest wait for the backend to connect or produce its next event.
    pub request_timeout: Option<Duration>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_iterations: 100,
            request_timeout: None,
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered without requesting tools.
    Done { iterations: usize },
    /// Transport failure, timeout or cancellation. The reason is also the
    /// text of the last AI entry.
    Aborted(String),
    CapReached,
}

#[derive(Debug)]
enum StreamFailure {
    Backend(LlmError),
    Cancelled,
}

impl StreamFailure {
    fn notice(&self) -> String {
        match self {
            Self::Backend(e) => format!("Error contacting agent server: {e}"),
            Self::Cancelled => CANCELLED_NOTICE.to_string(),
        }
    }
}

pub struct Agent {
    backend: Arc<dyn ModelBackend>,
    tools: ToolRegistry,
    todos: Arc<TodoStore>,
    working_path: String,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        tools: ToolRegistry,
        todos: Arc<TodoStore>,
        working_path: impl Into<String>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            backend,
            tools,
            todos,
            working_path: working_path.into(),
            settings,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn todos(&self) -> &TodoStore {
        &self.todos
    }

    pub fn backend_name(&self) -> String {
        self.backend.describe()
    }

    /// Runs one user turn to completion. Every transcript mutation is
    /// followed by a notification on `signal`.
    #[tracing::instrument(level = "info", skip_all, fields(backend = %self.backend.describe()))]
    pub async fn run_turn(
        &self,
        transcript: &Transcript,
        user_text: String,
        signal: &UpdateSignal,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        transcript.push(HistoryEntry::human(user_text));
        signal.notify();

        let tool_defs = self.tools.definitions();
        for iteration in 0..self.settings.max_iterations {
            let placeholder = transcript.push(HistoryEntry::Ai(AiMessage::default()));
            signal.notify();

            let request = ModelRequest {
                history: transcript.prefix(placeholder),
                tools: tool_defs.clone(),
                system_prompt: self.settings.system_prompt.clone(),
                todos: self.todos.rendered().await,
                working_path: self.working_path.clone(),
            };

            let started = Instant::now();
            let finals = match self.stream_reply(request, transcript, signal, cancel).await {
                Ok(finals) => finals,
                Err(failure) => {
                    let notice = failure.notice();
                    tracing::warn!(iteration, error = %notice, "model turn aborted");
                    transcript.set_last(HistoryEntry::Ai(AiMessage::text(notice.clone())));
                    signal.notify();
                    return TurnOutcome::Aborted(notice);
                }
            };

            let mut finals = finals.into_iter();
            if let Some(first) = finals.next() {
                transcript.set_last(HistoryEntry::Ai(first));
            }
            for extra in finals {
                transcript.push(HistoryEntry::Ai(extra));
            }
            signal.notify();

            let reply = transcript
                .last()
                .and_then(|entry| entry.as_ai().cloned())
                .unwrap_or_default();
            tracing::info!(
                iteration,
                latency_ms = started.elapsed().as_millis() as u64,
                tool_calls = reply.tool_calls.len(),
                output_len = reply.output.len(),
                "model turn finished"
            );
            if !reply.requests_tools() {
                return TurnOutcome::Done {
                    iterations: iteration + 1,
                };
            }

            for (idx, call) in reply.tool_calls.iter().enumerate() {
                if cancel.is_cancelled() {
                    for skipped in &reply.tool_calls[idx..] {
                        transcript.push(tool_entry(skipped, SKIPPED_TOOL_CONTENT.to_string()));
                    }
                    transcript.push(HistoryEntry::Ai(AiMessage::text(CANCELLED_NOTICE)));
                    signal.notify();
                    return TurnOutcome::Aborted(CANCELLED_NOTICE.to_string());
                }

                let started = Instant::now();
                let content = self.tools.dispatch(&call.name, &call.args).await;
                tracing::info!(
                    iteration,
                    tool_call_id = %call.call_id,
                    tool_name = %call.name,
                    latency_ms = started.elapsed().as_millis() as u64,
                    output_len = content.len(),
                    "tool call finished"
                );
                transcript.push(tool_entry(call, content));
                signal.notify();
            }
        }

        tracing::warn!(
            max_iterations = self.settings.max_iterations,
            "iteration cap reached"
        );
        // The last entry is a tool result here; the notice gets its own entry.
        transcript.push(HistoryEntry::Ai(AiMessage::text(MAX_LOOP_NOTICE)));
        signal.notify();
        TurnOutcome::CapReached
    }

    /// Streams one model reply into the placeholder and returns the final
    /// messages. A stream that ends without finals yields its last partial.
    async fn stream_reply(
        &self,
        request: ModelRequest,
        transcript: &Transcript,
        signal: &UpdateSignal,
        cancel: &CancellationToken,
    ) -> Result<Vec<AiMessage>, StreamFailure> {
        let limit = self.settings.request_timeout;
        let mut stream: EventStream = guarded(cancel, limit, self.backend.stream(request))
            .await?
            .map_err(StreamFailure::Backend)?;

        let mut finals = Vec::new();
        let mut last_partial = None;
        while let Some(event) = guarded(cancel, limit, stream.next()).await? {
            match event.map_err(StreamFailure::Backend)? {
                BackendEvent::Partial(message) => {
                    transcript.set_last(HistoryEntry::Ai(message.clone()));
                    signal.notify();
                    last_partial = Some(message);
                }
                BackendEvent::Final(message) => finals.push(message),
            }
        }

        if finals.is_empty() {
            finals.extend(last_partial);
        }
        Ok(finals)
    }
}

fn tool_entry(call: &ca_llm::ToolCall, content: String) -> HistoryEntry {
    HistoryEntry::Tool(ToolMessage {
        name: call.name.clone(),
        call_id: call.call_id.clone(),
        args: call.args.clone(),
        content,
    })
}

/// Awaits `fut` unless the turn is cancelled or `limit` elapses first.
async fn guarded<F: Future>(
    cancel: &CancellationToken,
    limit: Option<Duration>,
    fut: F,
) -> Result<F::Output, StreamFailure> {
    let bounded = async {
        match limit {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                StreamFailure::Backend(LlmError::Timeout(format!(
                    "no response from the model backend within {}s",
                    limit.as_secs()
                )))
            }),
            None => Ok(fut.await),
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StreamFailure::Cancelled),
        out = bounded => out,
    }
}
