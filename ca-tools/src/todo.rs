use crate::error::{Result, ToolError};
use crate::traits::{Tool, ToolSpec, parse_args};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: i64,
    pub task: String,
    #[serde(default)]
    pub done: bool,
}

/// `<current_todo_list>` block sent with every model request; empty when
/// there are no tasks.
pub fn render_todos(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut out = String::from("<current_todo_list>\n");
    for item in items {
        let mark = if item.done { "x" } else { " " };
        out.push_str(&format!("[{mark}] {}. {}\n", item.id, item.task));
    }
    out.push_str("</current_todo_list>");
    out
}

/// JSON-backed task list, one file per project root.
#[derive(Debug)]
pub struct TodoStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl TodoStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// `<dir>/<root path with separators and dots replaced by '-'>.json`
    pub fn for_root(dir: &Path, root: &Path) -> Self {
        let slug: String = root
            .to_string_lossy()
            .chars()
            .map(|c| match c {
                '/' | '\\' | '.' | ':' => '-',
                other => other,
            })
            .collect();
        Self::new(dir.join(format!("{slug}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or corrupt file reads as an empty list.
    pub async fn load(&self) -> Vec<TodoItem> {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    pub async fn rendered(&self) -> String {
        render_todos(&self.load().await)
    }

    /// Appends tasks whose trimmed text is not already listed. Ids continue
    /// from the current maximum.
    pub async fn add(&self, tasks: &[String]) -> Result<Vec<TodoItem>> {
        let _guard = self.lock.lock().await;
        let mut items = self.read_unlocked().await;
        let mut next_id = items.iter().map(|t| t.id).max().unwrap_or(0) + 1;

        for task in tasks {
            let trimmed = task.trim();
            if trimmed.is_empty() || items.iter().any(|t| t.task.trim() == trimmed) {
                continue;
            }
            items.push(TodoItem {
                id: next_id,
                task: trimmed.to_string(),
                done: false,
            });
            next_id += 1;
        }
        self.write_unlocked(&items).await?;
        Ok(items)
    }

    /// Unknown ids are skipped.
    pub async fn mark_done(&self, ids: &[i64]) -> Result<Vec<TodoItem>> {
        let _guard = self.lock.lock().await;
        let mut items = self.read_unlocked().await;
        for item in items.iter_mut().filter(|t| ids.contains(&t.id)) {
            item.done = true;
        }
        self.write_unlocked(&items).await?;
        Ok(items)
    }

    async fn read_unlocked(&self) -> Vec<TodoItem> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt todo file; starting empty");
                Vec::new()
            }
        }
    }

    async fn write_unlocked(&self, items: &[TodoItem]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(items)
            .map_err(|e| ToolError::ExecutionFailed(format!("encode todo list: {e}")))?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

fn updated(items: &[TodoItem]) -> String {
    let rendered = render_todos(items);
    if rendered.is_empty() {
        return "Successfully updated the todo list. The list is empty.".to_string();
    }
    format!("Successfully updated the todo list.\n\n{rendered}")
}

#[derive(Debug, Deserialize)]
struct AddTodoArgs {
    #[serde(default, alias = "todos")]
    tasks: Vec<String>,
}

pub struct AddTodoTool {
    store: Arc<TodoStore>,
}

impl AddTodoTool {
    pub fn new(store: Arc<TodoStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddTodoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "add_todo".to_string(),
            description: "Add tasks to the todo list for the current work. Tasks already on the list are skipped.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "tasks": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["tasks"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<String> {
        let args: AddTodoArgs = parse_args(arguments)?;
        let items = self.store.add(&args.tasks).await?;
        Ok(updated(&items))
    }
}

#[derive(Debug, Deserialize)]
struct MarkTodoArgs {
    #[serde(default)]
    ids: Vec<i64>,
}

pub struct MarkTodoDoneTool {
    store: Arc<TodoStore>,
}

impl MarkTodoDoneTool {
    pub fn new(store: Arc<TodoStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MarkTodoDoneTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "mark_todo_as_done".to_string(),
            description: "Mark todo list tasks as done by id.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "ids": { "type": "array", "items": { "type": "integer" } }
                },
                "required": ["ids"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<String> {
        let args: MarkTodoArgs = parse_args(arguments)?;
        let items = self.store.mark_done(&args.ids).await?;
        Ok(updated(&items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> Arc<TodoStore> {
        Arc::new(TodoStore::new(dir.join("todos/project.json")))
    }

    #[test]
    fn for_root_derives_file_name() {
        let store = TodoStore::for_root(Path::new("/tmp/cli-agent/todos"), Path::new("/home/me/my.app"));
        assert_eq!(
            store.path(),
            Path::new("/tmp/cli-agent/todos/-home-me-my-app.json")
        );
    }

    #[test]
    fn render_marks_done_items() {
        let items = vec![
            TodoItem { id: 1, task: "a".to_string(), done: false },
            TodoItem { id: 2, task: "b".to_string(), done: true },
        ];
        assert_eq!(
            render_todos(&items),
            "<current_todo_list>\n[ ] 1. a\n[x] 2. b\n</current_todo_list>"
        );
        assert_eq!(render_todos(&[]), "");
    }

    #[tokio::test]
    async fn add_dedups_and_continues_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let tool = AddTodoTool::new(store.clone());
        tool.execute(serde_json::json!({ "tasks": ["write parser", " write parser ", "test it"] }))
            .await
            .unwrap();
        let out = tool
            .execute(serde_json::json!({ "tasks": ["test it", "ship"] }))
            .await
            .unwrap();
        assert!(out.contains("[ ] 3. ship"), "{out}");

        let items = store.load().await;
        let ids: Vec<i64> = items.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn mark_done_skips_unknown_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        store.add(&["a".to_string(), "b".to_string()]).await.unwrap();
        let out = MarkTodoDoneTool::new(store.clone())
            .execute(serde_json::json!({ "ids": [2, 42] }))
            .await
            .unwrap();
        assert!(out.contains("[x] 2. b"));
        assert!(out.contains("[ ] 1. a"));
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().await.is_empty());
        let items = store.add(&["fresh".to_string()]).await.unwrap();
        assert_eq!(items[0].id, 1);
    }
}
