use crate::error::{Result, ToolError};
use crate::project::project_listing;
use crate::sandbox::Sandbox;
use crate::traits::{Tool, ToolSpec, parse_args, require_string};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Dir,
    File,
}

impl EntityKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dir" | "directory" => Ok(Self::Dir),
            "file" => Ok(Self::File),
            other => Err(ToolError::InvalidArguments(format!(
                "entityType must be 'dir' or 'file', got {other:?}"
            ))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Dir => "directory",
            Self::File => "file",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEntityArgs {
    #[serde(default)]
    entity_path: String,
    entity_type: String,
    #[serde(default)]
    entity_name: String,
    #[serde(default)]
    content: String,
}

impl CreateEntityArgs {
    /// `entityPath` may already name the entity or be its parent directory.
    fn target(&self) -> String {
        let path = self.entity_path.trim().trim_end_matches('/');
        let name = self.entity_name.trim().trim_matches('/');
        if name.is_empty() || path.ends_with(name) {
            return path.to_string();
        }
        if path.is_empty() || path == "." || path == "./" {
            return name.to_string();
        }
        format!("{path}/{name}")
    }
}

pub struct CreateEntityTool {
    sandbox: Sandbox,
}

impl CreateEntityTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for CreateEntityTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_entity".to_string(),
            description: "Create a directory or a file in the project. Parent directories are created as needed. Existing entities are never overwritten.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "entityPath": { "type": "string", "description": "Parent directory of the new entity, or its full path." },
                    "entityType": { "type": "string", "enum": ["dir", "file"] },
                    "entityName": { "type": "string", "description": "Name of the new directory or file." },
                    "content": { "type": "string", "description": "Initial file content. Ignored for directories." }
                },
                "required": ["entityPath", "entityType", "entityName", "content"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<String> {
        let args: CreateEntityArgs = parse_args(arguments)?;
        let kind = EntityKind::parse(&args.entity_type)?;
        let target = args.target();
        if target.is_empty() {
            return Err(ToolError::InvalidArguments(
                "entityPath or entityName is required".to_string(),
            ));
        }
        let full = self.sandbox.resolve(&target)?;
        if full.components().eq(self.sandbox.root().components()) {
            return Err(ToolError::InvalidArguments(
                "the project root already exists".to_string(),
            ));
        }

        if let Ok(meta) = tokio::fs::symlink_metadata(&full).await {
            let existing = if meta.is_dir() { "directory" } else { "file" };
            return Ok(format!("The '{target}' {existing} already exists."));
        }

        match kind {
            EntityKind::Dir => tokio::fs::create_dir_all(&full).await?,
            EntityKind::File => {
                if let Some(parent) = full.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&full, args.content.as_bytes()).await?;
            }
        }
        tracing::debug!(path = %full.display(), kind = kind.as_str(), "created entity");

        let listing = project_listing(&self.sandbox).await?;
        let detail = match kind {
            EntityKind::Dir => "",
            EntityKind::File => " with the content",
        };
        Ok(format!(
            "The '{target}' {} has been created{detail}.\n\n{listing}",
            kind.as_str()
        ))
    }
}

pub struct RemoveEntityTool {
    sandbox: Sandbox,
}

impl RemoveEntityTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    fn resolve_target(&self, raw: &str) -> Result<PathBuf> {
        let full = self.sandbox.resolve(raw)?;
        if full.components().eq(self.sandbox.root().components()) {
            return Err(ToolError::Unauthorized(
                "refusing to remove the project root".to_string(),
            ));
        }
        Ok(full)
    }
}

#[async_trait]
impl Tool for RemoveEntityTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "remove_entity".to_string(),
            description: "Remove a file or a directory (recursively) from the project. Paths come from the 'list' tool.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "entityPath": { "type": "string" }
                },
                "required": ["entityPath"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<String> {
        let entity_path = require_string(&arguments, "entityPath")?;
        let full = self.resolve_target(&entity_path)?;

        let meta = match tokio::fs::symlink_metadata(&full).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(format!("The '{entity_path}' does not exist."));
            }
            Err(e) => return Err(e.into()),
        };
        let kind = if meta.is_dir() {
            tokio::fs::remove_dir_all(&full).await?;
            EntityKind::Dir
        } else {
            tokio::fs::remove_file(&full).await?;
            EntityKind::File
        };
        tracing::debug!(path = %full.display(), kind = kind.as_str(), "removed entity");

        let listing = project_listing(&self.sandbox).await?;
        Ok(format!(
            "The '{entity_path}' {} has been removed.\n\n{listing}",
            kind.as_str()
        ))
    }
}
