use crate::error::{LlmError, Result};
use crate::openai::OpenAiClient;
use crate::server::AgentServerClient;
use crate::types::{AiMessage, HistoryEntry, ToolDefinition};
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const AGENT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Everything a backend needs to produce the next AI turn.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// History strictly before the placeholder entry.
    pub history: Vec<HistoryEntry>,
    pub tools: Vec<ToolDefinition>,
    pub system_prompt: String,
    /// Rendered todo list, empty when there are no tasks.
    pub todos: String,
    pub working_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The whole message accumulated so far.
    Partial(AiMessage),
    Final(AiMessage),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<BackendEvent>> + Send>>;

#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn describe(&self) -> String;

    async fn stream(&self, request: ModelRequest) -> Result<EventStream>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    AgentServer,
    OpenAI,
    OpenRouter,
}

impl Provider {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "agent_server" | "server" => Ok(Self::AgentServer),
            "openai" => Ok(Self::OpenAI),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(LlmError::InvalidInput(format!(
                "unknown backend kind {other:?}; expected agent_server, openai or openrouter"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentServer => "agent_server",
            Self::OpenAI => "openai",
            Self::OpenRouter => "openrouter",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::AgentServer => AGENT_SERVER_URL,
            Self::OpenAI => OPENAI_BASE_URL,
            Self::OpenRouter => OPENROUTER_BASE_URL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub provider: Provider,
    pub model: String,
    pub reasoning_effort: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Clone)]
enum Inner {
    Server(AgentServerClient),
    OpenAi(OpenAiClient),
}

#[derive(Clone)]
pub struct LlmClient {
    provider: Provider,
    model: String,
    inner: Inner,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(cfg: ClientConfig) -> Result<Self> {
        if cfg.model.trim().is_empty() {
            return Err(LlmError::InvalidInput("model is required".to_string()));
        }
        // Streams are unbounded; only the connect phase is timed out here.
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        let base_url = cfg
            .base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| cfg.provider.default_base_url().to_string());

        let inner = match cfg.provider {
            Provider::AgentServer => Inner::Server(AgentServerClient::new(http, &base_url)),
            Provider::OpenAI | Provider::OpenRouter => {
                let Some(api_key) = cfg.api_key.as_deref().filter(|k| !k.trim().is_empty())
                else {
                    return Err(LlmError::InvalidInput(format!(
                        "an api key is required for the {} backend",
                        cfg.provider.as_str()
                    )));
                };
                Inner::OpenAi(OpenAiClient::new(
                    http,
                    &base_url,
                    api_key,
                    &cfg.model,
                    cfg.reasoning_effort.clone(),
                ))
            }
        };

        Ok(Self {
            provider: cfg.provider,
            model: cfg.model,
            inner,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelBackend for LlmClient {
    fn describe(&self) -> String {
        format!("{}/{}", self.provider.as_str(), self.model)
    }

    #[tracing::instrument(level = "info", skip_all, fields(provider = self.provider.as_str()))]
    async fn stream(&self, request: ModelRequest) -> Result<EventStream> {
        match &self.inner {
            Inner::Server(c) => c.chat_stream(&request).await,
            Inner::OpenAi(c) => c.chat_stream(&request).await,
        }
    }
}
