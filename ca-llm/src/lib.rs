//! Conversation model and streaming model-backend clients for cli-agent.
//!
//! The agent loop talks to a [`ModelBackend`]; two HTTP implementations are
//! provided: the agent server SSE endpoint and OpenAI-compatible chat
//! completions.

mod client;
mod error;
mod openai;
mod server;
mod sse;
mod types;

pub use client::{
    BackendEvent, ClientConfig, EventStream, LlmClient, ModelBackend, ModelRequest, Provider,
};
pub use error::{LlmError, Result};
pub use types::{
    AiMessage, HistoryEntry, HumanMessage, Role, ToolCall, ToolDefinition, ToolMessage, WireEntry,
};
