use crate::edit::{AppendFileTool, PatchFileTool};
use crate::entity::{CreateEntityTool, RemoveEntityTool};
use crate::error::ToolError;
use crate::project::{ListTool, ReadFilesTool};
use crate::sandbox::Sandbox;
use crate::shell::{BashTool, CommandRunner, GrepTool};
use crate::todo::{AddTodoTool, MarkTodoDoneTool, TodoStore};
use crate::traits::{Tool, to_llm_tool_def};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Name -> handler map, built once at startup and read-only afterwards.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full tool set over one project root.
    pub fn standard(sandbox: Sandbox, todos: Arc<TodoStore>, command_timeout: Duration) -> Self {
        let runner = CommandRunner::new(sandbox.root(), command_timeout);
        let mut registry = Self::new();
        registry.register(Arc::new(ListTool::new(sandbox.clone())));
        registry.register(Arc::new(ReadFilesTool::new(sandbox.clone())));
        registry.register(Arc::new(CreateEntityTool::new(sandbox.clone())));
        registry.register(Arc::new(RemoveEntityTool::new(sandbox.clone())));
        registry.register(Arc::new(AppendFileTool::new(sandbox.clone())));
        registry.register(Arc::new(PatchFileTool::new(sandbox.clone())));
        registry.register(Arc::new(GrepTool::new(runner.clone(), sandbox)));
        registry.register(Arc::new(BashTool::new(runner)));
        registry.register(Arc::new(AddTodoTool::new(todos.clone())));
        registry.register(Arc::new(MarkTodoDoneTool::new(todos)));
        registry
    }

    /// A tool with an already registered name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name;
        match self.index.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.spec().name).collect()
    }

    pub fn definitions(&self) -> Vec<ca_llm::ToolDefinition> {
        self.tools.iter().map(|t| to_llm_tool_def(t.as_ref())).collect()
    }

    /// Runs one tool call. Never fails: unknown tools, undecodable arguments
    /// and handler errors all come back as text for the model to read.
    #[tracing::instrument(level = "info", skip_all, fields(tool_name = name))]
    pub async fn dispatch(&self, name: &str, args_json: &str) -> String {
        let Some(tool) = self.index.get(name).map(|&i| &self.tools[i]) else {
            tracing::warn!("model requested an unknown tool");
            return format!("Tool '{name}' not found");
        };

        let arguments = match decode_arguments(args_json) {
            Ok(v) => v,
            Err(e) => return format!("Error executing tool '{name}': {e}"),
        };

        let started = Instant::now();
        let result = tool.execute(arguments).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(text) => {
                tracing::debug!(latency_ms, output_len = text.len(), "tool finished");
                text
            }
            Err(e) => {
                tracing::info!(latency_ms, error = %e, "tool failed");
                format!("Error executing tool '{name}': {e}")
            }
        }
    }
}

fn decode_arguments(args_json: &str) -> Result<serde_json::Value, ToolError> {
    if args_json.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    let value: serde_json::Value = serde_json::from_str(args_json)?;
    match value {
        serde_json::Value::Object(_) => Ok(value),
        serde_json::Value::Null => Ok(serde_json::json!({})),
        other => Err(ToolError::InvalidArguments(format!(
            "arguments must be a JSON object, got {other}"
        ))),
    }
}
