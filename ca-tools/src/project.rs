use crate::error::{Result, ToolError};
use crate::sandbox::Sandbox;
use crate::text::{numbered_view, split_lines};
use crate::traits::{Tool, ToolSpec, parse_args};
use async_trait::async_trait;
use serde::Deserialize;

const FILE_BYTES_MAX: usize = 1_000_000;

/// Lists the project off the async runtime; the walk is blocking IO.
pub(crate) async fn project_listing(sandbox: &Sandbox) -> Result<String> {
    let sb = sandbox.clone();
    tokio::task::spawn_blocking(move || sb.listing())
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("listing task failed: {e}")))?
}

/// Reads a file for display. `Ok(None)` when it is missing or unreadable.
pub(crate) async fn read_text(sandbox: &Sandbox, raw: &str) -> Result<Option<String>> {
    let path = sandbox.resolve(raw)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "read failed");
            return Ok(None);
        }
    };
    if bytes.len() > FILE_BYTES_MAX {
        return Err(ToolError::ExecutionFailed(format!(
            "the '{raw}' file is too large: {} bytes (max {FILE_BYTES_MAX})",
            bytes.len()
        )));
    }
    Ok(Some(String::from_utf8_lossy(&bytes).to_string()))
}

pub struct ListTool {
    sandbox: Sandbox,
}

impl ListTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ListTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list".to_string(),
            description: "List all files, directories and sub directories of the current project. Directories end with '/'.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {}
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, _arguments: serde_json::Value) -> Result<String> {
        project_listing(&self.sandbox).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadRange {
    file_path: String,
    #[serde(default)]
    start_line: Option<f64>,
    #[serde(default)]
    end_line: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReadTarget {
    Path(String),
    Range(ReadRange),
}

impl ReadTarget {
    fn into_range(self) -> ReadRange {
        match self {
            Self::Path(file_path) => ReadRange {
                file_path,
                start_line: None,
                end_line: None,
            },
            Self::Range(r) => r,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadFilesArgs {
    #[serde(default)]
    file_paths: Vec<ReadTarget>,
}

/// Out-of-bounds or non-positive bounds fall back to the file start/end.
fn clamp_range(start: Option<f64>, end: Option<f64>, len: usize) -> (usize, usize) {
    let start = match start.map(|v| v as i64) {
        Some(s) if s >= 1 && (s as usize) <= len => s as usize,
        _ => 1,
    };
    let end = match end.map(|v| v as i64) {
        Some(e) if e >= 1 && (e as usize) <= len => e as usize,
        _ => len,
    };
    if end < start { (start, len) } else { (start, end) }
}

pub struct ReadFilesTool {
    sandbox: Sandbox,
}

impl ReadFilesTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ReadFilesTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "read_files".to_string(),
            description: "Read multiple files in the project with line numbers. Each entry is either a path or {filePath, startLine, endLine} to read a 1-based inclusive line range. Paths come from the 'list' tool.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "filePaths": {
                        "type": "array",
                        "description": "Files to read.",
                        "items": {
                            "anyOf": [
                                { "type": "string" },
                                {
                                    "type": "object",
                                    "properties": {
                                        "filePath": { "type": "string" },
                                        "startLine": { "type": "number" },
                                        "endLine": { "type": "number" }
                                    },
                                    "required": ["filePath"]
                                }
                            ]
                        }
                    }
                },
                "required": ["filePaths"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<String> {
        let args: ReadFilesArgs = parse_args(arguments)?;
        if args.file_paths.is_empty() {
            return Ok("The filePaths list is empty; specify filePaths to read files.".to_string());
        }

        let mut sections = Vec::with_capacity(args.file_paths.len());
        for target in args.file_paths {
            let range = target.into_range();
            let fp = range.file_path.as_str();
            let section = match read_text(&self.sandbox, fp).await {
                Ok(Some(content)) => {
                    let lines = split_lines(&content);
                    let bounds = clamp_range(range.start_line, range.end_line, lines.len());
                    numbered_view(fp, &lines, Some(bounds))
                }
                Ok(None) => format!("The '{fp}' file does not exist or could not be read."),
                Err(e) => format!("Failed to read '{fp}': {e}"),
            };
            sections.push(section);
        }
        Ok(sections.join("\n\n"))
    }
}
