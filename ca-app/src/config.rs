//! cli-agent configuration loader.
//!
//! `~/.cli-agent/config.toml` is optional; every field has a default and a
//! handful of environment variables override the file.

use ca_llm::{ClientConfig, Provider};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding agent working inside the user's project directory. \
Use the tools to inspect the project before changing it, keep edits minimal, \
and track multi-step work with the todo list. Paths are relative to the project root.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub agent: LoopConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            reasoning_effort: None,
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: String,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Overrides the provider's default API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            server_url: default_server_url(),
            base_url: None,
            api_key: None,
        }
    }
}

fn default_backend_kind() -> String {
    "agent_server".to_string()
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Longest wait for the next backend event. Unset waits forever.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            request_timeout_secs: None,
        }
    }
}

fn default_max_iterations() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub extra_ignore_dirs: Vec<String>,
    #[serde(default)]
    pub extra_ignore_files: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
            extra_ignore_dirs: Vec::new(),
            extra_ignore_files: Vec::new(),
        }
    }
}

fn default_command_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl AgentConfig {
    /// An explicit path must exist; the default path may be absent.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(default_config_path);
        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = var("CLI_AGENT_MODEL") {
            self.general.model = v;
        }
        if let Some(v) = var("CLI_AGENT_BACKEND") {
            self.backend.kind = v;
        }
        if let Some(v) = var("CLI_AGENT_SERVER_URL") {
            self.backend.server_url = v;
        }
        if self.backend.api_key.is_none() {
            let key_var = match self.provider() {
                Ok(Provider::OpenAI) => Some("OPENAI_API_KEY"),
                Ok(Provider::OpenRouter) => Some("OPENROUTER_API_KEY"),
                _ => None,
            };
            if let Some(v) = key_var.and_then(var) {
                self.backend.api_key = Some(v);
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.general.model.trim().is_empty() {
            return Err(anyhow::anyhow!("general.model is required"));
        }
        if self.agent.max_iterations == 0 {
            return Err(anyhow::anyhow!("agent.max_iterations must be > 0"));
        }
        if self.tools.command_timeout_secs == 0 {
            return Err(anyhow::anyhow!("tools.command_timeout_secs must be > 0"));
        }
        if self.agent.request_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("agent.request_timeout_secs must be > 0 when set"));
        }
        let provider = self.provider()?;
        let has_key = self
            .backend
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if provider != Provider::AgentServer && !has_key {
            return Err(anyhow::anyhow!(
                "backend.api_key (or {}) is required for the {} backend",
                match provider {
                    Provider::OpenRouter => "OPENROUTER_API_KEY",
                    _ => "OPENAI_API_KEY",
                },
                provider.as_str()
            ));
        }
        Ok(())
    }

    pub fn provider(&self) -> anyhow::Result<Provider> {
        Ok(Provider::parse(&self.backend.kind)?)
    }

    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let provider = self.provider()?;
        let base_url = match provider {
            Provider::AgentServer => Some(self.backend.server_url.clone()),
            _ => self.backend.base_url.clone(),
        };
        Ok(ClientConfig {
            provider,
            model: self.general.model.clone(),
            reasoning_effort: self.general.reasoning_effort.clone(),
            api_key: self.backend.api_key.clone(),
            base_url,
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.agent.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.command_timeout_secs)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.paths.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn log_file(&self) -> PathBuf {
        self.paths
            .log_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join("debug.log"))
    }

    pub fn todo_dir(&self) -> PathBuf {
        self.data_dir().join("todos")
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

pub fn default_config_path() -> PathBuf {
    Path::new(&home_dir()).join(".cli-agent").join("config.toml")
}

pub fn default_data_dir() -> PathBuf {
    Path::new(&home_dir()).join(".cli-agent").join("data")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = AgentConfig::parse("").unwrap();
        assert_eq!(cfg.general.model, "gpt-5-mini");
        assert_eq!(cfg.backend.kind, "agent_server");
        assert_eq!(cfg.agent.max_iterations, 100);
        assert_eq!(cfg.tools.command_timeout_secs, 30);
        assert!(cfg.request_timeout().is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = AgentConfig::parse(
            r#"
[general]
model = "gpt-5"
reasoning_effort = "low"

[agent]
max_iterations = 12
request_timeout_secs = 90

[tools]
extra_ignore_dirs = ["target"]

[paths]
data_dir = "/var/tmp/agent"
"#,
        )
        .unwrap();
        assert_eq!(cfg.general.model, "gpt-5");
        assert_eq!(cfg.agent.max_iterations, 12);
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(cfg.tools.extra_ignore_dirs, vec!["target"]);
        assert_eq!(cfg.log_file(), PathBuf::from("/var/tmp/agent/debug.log"));
        assert_eq!(cfg.todo_dir(), PathBuf::from("/var/tmp/agent/todos"));
    }

    #[test]
    fn env_overrides_pick_provider_key() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CLI_AGENT_BACKEND", "openrouter"),
            ("CLI_AGENT_MODEL", "openai/gpt-5-mini"),
            ("OPENAI_API_KEY", "sk-wrong"),
            ("OPENROUTER_API_KEY", "sk-or"),
        ]);
        let mut cfg = AgentConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.backend.api_key.as_deref(), Some("sk-or"));
        assert_eq!(cfg.general.model, "openai/gpt-5-mini");
        cfg.validate().unwrap();

        let client = cfg.client_config().unwrap();
        assert_eq!(client.provider, Provider::OpenRouter);
        assert!(client.base_url.is_none());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = AgentConfig::default();
        cfg.agent.max_iterations = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("max_iterations"));

        let mut cfg = AgentConfig::default();
        cfg.backend.kind = "openai".to_string();
        assert!(cfg.validate().unwrap_err().to_string().contains("OPENAI_API_KEY"));

        let mut cfg = AgentConfig::default();
        cfg.backend.kind = "smoke-signals".to_string();
        assert!(cfg.validate().is_err());
    }

    #[tokio::test]
    async fn explicit_missing_path_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = AgentConfig::load(Some(tmp.path().join("nope.toml")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read config"));
    }
}
