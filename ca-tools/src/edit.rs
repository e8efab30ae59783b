use crate::error::{Result, ToolError};
use crate::sandbox::Sandbox;
use crate::text::{
    LineInsert, LinePatch, apply_inserts, apply_patches, detect_eol, numbered_view, split_lines,
    validate_patches,
};
use crate::traits::{Tool, ToolSpec, parse_args};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

async fn write_lines(path: &Path, lines: &[String], eol: &str) -> Result<()> {
    tokio::fs::write(path, lines.join(eol)).await?;
    Ok(())
}

fn updated_view(file_path: &str, lines: &[String]) -> String {
    format!(
        "Here is the updated file:\n\n{}",
        numbered_view(file_path, lines, None)
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendFileArgs {
    file_path: String,
    #[serde(default)]
    inserts: Vec<LineInsert>,
}

pub struct AppendFileTool {
    sandbox: Sandbox,
}

impl AppendFileTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for AppendFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "append_file".to_string(),
            description: "Insert content into a text file. Each insert goes after the given 1-based line of the current file (0 inserts at the top). All line numbers refer to the file before any insert is applied. A missing file is created.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "filePath": { "type": "string" },
                    "inserts": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "insertAfter": { "type": "number", "description": "Line number to insert after." },
                                "content": { "type": "string" }
                            },
                            "required": ["insertAfter", "content"]
                        }
                    }
                },
                "required": ["filePath", "inserts"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<String> {
        let args: AppendFileArgs = parse_args(arguments)?;
        let full = self.sandbox.resolve(&args.file_path)?;
        let fp = args.file_path.as_str();

        let existing = match tokio::fs::read(&full).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = full.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&full, b"").await?;
                tracing::debug!(path = %full.display(), "created missing file before insert");
                String::new()
            }
            Err(e) => {
                tracing::debug!(path = %full.display(), error = %e, "insert target unreadable");
                return Ok(format!("The '{fp}' file does not exist or could not be read."));
            }
        };

        let eol = detect_eol(&existing);
        let lines = apply_inserts(split_lines(&existing), &args.inserts);
        write_lines(&full, &lines, eol).await?;

        Ok(format!(
            "Inserted {} block(s) into '{fp}'.\n\n{}",
            args.inserts.len(),
            updated_view(fp, &lines)
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatchFileArgs {
    file_path: String,
    #[serde(default)]
    patches: Vec<LinePatch>,
}

pub struct PatchFileTool {
    sandbox: Sandbox,
}

impl PatchFileTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for PatchFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "patch_file".to_string(),
            description: "Replace existing 1-based inclusive line ranges of a text file. Empty content deletes the range. If any range is invalid nothing is applied. Use 'append_file' for insertions.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "filePath": { "type": "string" },
                    "patches": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "startLine": { "type": "number" },
                                "endLine": { "type": "number" },
                                "content": { "type": "string" }
                            },
                            "required": ["startLine", "endLine", "content"]
                        }
                    }
                },
                "required": ["filePath", "patches"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<String> {
        let args: PatchFileArgs = parse_args(arguments)?;
        let full = self.sandbox.resolve(&args.file_path)?;
        let fp = args.file_path.as_str();
        if args.patches.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "no patches were given for '{fp}'"
            )));
        }

        let existing = match tokio::fs::read(&full).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
            Err(e) => {
                tracing::debug!(path = %full.display(), error = %e, "patch target unreadable");
                return Ok(format!("The '{fp}' file does not exist or could not be read."));
            }
        };
        let eol = detect_eol(&existing);
        let lines = split_lines(&existing);

        let violations = validate_patches(&args.patches, lines.len());
        if !violations.is_empty() {
            tracing::debug!(path = %full.display(), count = violations.len(), "rejected patch batch");
            return Ok(format!(
                "Could not apply patches for '{fp}':\n{}",
                violations.join("\n")
            ));
        }

        let lines = apply_patches(lines, &args.patches);
        write_lines(&full, &lines, eol).await?;

        Ok(format!(
            "Applied {} patch(es) to '{fp}'.\n\n{}",
            args.patches.len(),
            updated_view(fp, &lines)
        ))
    }
}
