//! Wires configuration, the project sandbox, tools and the model backend
//! into an [`Agent`].

use crate::agent::{Agent, AgentSettings};
use crate::config::AgentConfig;
use ca_llm::{LlmClient, ModelBackend};
use ca_tools::{IgnoreRules, Sandbox, TodoStore, ToolRegistry, load_gitignores};
use std::path::Path;
use std::sync::Arc;

/// Everything bound to one project root; needs no backend.
pub struct Workspace {
    pub sandbox: Sandbox,
    pub todos: Arc<TodoStore>,
    pub tools: ToolRegistry,
}

impl Workspace {
    pub fn open(cfg: &AgentConfig, root: &Path) -> anyhow::Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|e| anyhow::anyhow!("project root {}: {e}", root.display()))?;
        if !root.is_dir() {
            return Err(anyhow::anyhow!("project root {} is not a directory", root.display()));
        }

        let mut rules = IgnoreRules::with_defaults();
        for dir in &cfg.tools.extra_ignore_dirs {
            rules.add_dir(dir)?;
        }
        for file in &cfg.tools.extra_ignore_files {
            rules.add_file(file)?;
        }
        let gitignore_patterns = load_gitignores(&mut rules, &root)?;

        let sandbox = Sandbox::new(&root, rules)?;
        let todos = Arc::new(TodoStore::for_root(&cfg.todo_dir(), sandbox.root()));
        let tools = ToolRegistry::standard(sandbox.clone(), todos.clone(), cfg.command_timeout());
        tracing::info!(
            root = %sandbox.root().display(),
            gitignore_patterns,
            todo_file = %todos.path().display(),
            tools = tools.names().len(),
            "workspace opened"
        );
        Ok(Self {
            sandbox,
            todos,
            tools,
        })
    }

    pub fn into_agent(self, cfg: &AgentConfig, backend: Arc<dyn ModelBackend>) -> Agent {
        let settings = AgentSettings {
            system_prompt: cfg.general.system_prompt.clone(),
            max_iterations: cfg.agent.max_iterations,
            request_timeout: cfg.request_timeout(),
        };
        let working_path = self.sandbox.root().display().to_string();
        Agent::new(backend, self.tools, self.todos, working_path, settings)
    }
}

pub fn build_backend(cfg: &AgentConfig) -> anyhow::Result<Arc<dyn ModelBackend>> {
    let client = LlmClient::new(cfg.client_config()?)?;
    tracing::info!(
        provider = client.provider().as_str(),
        model = client.model(),
        "model backend ready"
    );
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_applies_extra_and_gitignore_rules() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("proj");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("generated")).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(root.join("secrets.env"), "K=V\n").unwrap();
        std::fs::write(root.join(".gitignore"), "generated/\n").unwrap();

        let mut cfg = AgentConfig::default();
        cfg.paths.data_dir = Some(tmp.path().join("data"));
        cfg.tools.extra_ignore_files = vec!["secrets.env".to_string()];

        let ws = Workspace::open(&cfg, &root).unwrap();
        let entries = ws.sandbox.entries().unwrap();
        assert!(entries.contains(&"./src/main.rs".to_string()), "{entries:?}");
        assert!(!entries.iter().any(|e| e.contains("generated")), "{entries:?}");
        assert!(!entries.iter().any(|e| e.contains("secrets.env")), "{entries:?}");
        assert!(ws.todos.path().starts_with(tmp.path().join("data/todos")));
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Workspace::open(&AgentConfig::default(), &tmp.path().join("absent"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("project root"));
    }
}
