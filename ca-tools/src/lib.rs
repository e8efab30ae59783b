//! Sandboxed file-editing and inspection tools for the coding agent.
//!
//! Every tool is confined to one project root. Results are plain text that
//! goes back to the model verbatim, failures included.

mod edit;
mod entity;
mod error;
mod ignore;
mod project;
mod registry;
mod sandbox;
mod shell;
mod text;
mod todo;
mod traits;

pub use edit::{AppendFileTool, PatchFileTool};
pub use entity::{CreateEntityTool, RemoveEntityTool};
pub use error::{Result, ToolError};
pub use ignore::{DEFAULT_IGNORE_DIRS, DEFAULT_IGNORE_FILES, IgnoreRules, load_gitignores};
pub use project::{ListTool, ReadFilesTool};
pub use registry::ToolRegistry;
pub use sandbox::Sandbox;
pub use shell::{
    ALLOWED_COMMANDS, BashTool, CommandLine, CommandRunner, GrepTool, parse_bash_command,
    parse_search_command,
};
pub use text::{
    LineInsert, LinePatch, apply_inserts, apply_patches, detect_eol, numbered_view, split_lines,
    validate_patches,
};
pub use todo::{AddTodoTool, MarkTodoDoneTool, TodoItem, TodoStore, render_todos};
pub use traits::{Tool, ToolSpec, to_llm_tool_def};
