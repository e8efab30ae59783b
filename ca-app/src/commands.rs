//! Slash commands typed at the prompt instead of a message.

use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Text(String),
    Quit,
}

/// `None` when `input` is a message for the model rather than a command.
pub async fn handle_command(session: &mut Session, input: &str) -> Option<CommandReply> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let reply = match trimmed {
        "/new" => {
            session.reset().await;
            "Session reset.".to_string()
        }
        "/history" => {
            let view = session.view();
            let (human, ai, tool) = view.role_counts();
            format!(
                "entries={} human={human} ai={ai} tool={tool}",
                view.len()
            )
        }
        "/todos" => {
            let rendered = session.agent().todos().rendered().await;
            if rendered.is_empty() {
                "The todo list is empty.".to_string()
            } else {
                rendered
            }
        }
        "/tools" => session.agent().tools().names().join(","),
        "/status" => format!(
            "session={}\nbackend={}\nentries={}",
            session.id,
            session.agent().backend_name(),
            session.view().len()
        ),
        "/quit" | "/exit" => return Some(CommandReply::Quit),
        _ => "Unknown command. Supported: /new /history /todos /tools /status /quit".to_string(),
    };
    Some(CommandReply::Text(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentSettings};
    use async_trait::async_trait;
    use ca_llm::{AiMessage, BackendEvent, EventStream, HistoryEntry, ModelBackend, ModelRequest};
    use ca_tools::{IgnoreRules, Sandbox, TodoStore, ToolRegistry};
    use std::sync::Arc;
    use std::time::Duration;

    struct EchoBackend;

    #[async_trait]
    impl ModelBackend for EchoBackend {
        fn describe(&self) -> String {
            "echo".to_string()
        }

        async fn stream(&self, request: ModelRequest) -> ca_llm::Result<EventStream> {
            let text = match request.history.last() {
                Some(HistoryEntry::Human(h)) => h.content.clone(),
                _ => String::new(),
            };
            let event = BackendEvent::Final(AiMessage::text(text));
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(event)])))
        }
    }

    fn session(dir: &std::path::Path) -> Session {
        let sandbox = Sandbox::new(dir, IgnoreRules::with_defaults()).unwrap();
        let todos = Arc::new(TodoStore::new(dir.join("todos.json")));
        let tools = ToolRegistry::standard(sandbox, todos.clone(), Duration::from_secs(5));
        let agent = Agent::new(
            Arc::new(EchoBackend),
            tools,
            todos,
            dir.display().to_string(),
            AgentSettings::default(),
        );
        Session::new(Arc::new(agent))
    }

    fn text(reply: Option<CommandReply>) -> String {
        match reply {
            Some(CommandReply::Text(t)) => t,
            other => panic!("expected text reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn messages_are_not_commands() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session(tmp.path());
        assert!(handle_command(&mut s, "fix the build").await.is_none());
    }

    #[tokio::test]
    async fn history_counts_and_new_resets() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session(tmp.path());
        s.invoke("hello").finish().await;
        assert_eq!(
            text(handle_command(&mut s, "/history").await),
            "entries=2 human=1 ai=1 tool=0"
        );

        let before = s.id;
        assert_eq!(text(handle_command(&mut s, "/new").await), "Session reset.");
        assert_ne!(s.id, before);
        assert_eq!(
            text(handle_command(&mut s, " /history ").await),
            "entries=0 human=0 ai=0 tool=0"
        );
    }

    #[tokio::test]
    async fn todos_tools_quit_and_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session(tmp.path());
        assert_eq!(
            text(handle_command(&mut s, "/todos").await),
            "The todo list is empty."
        );
        assert!(text(handle_command(&mut s, "/tools").await).starts_with("list,read_files,"));
        assert_eq!(handle_command(&mut s, "/exit").await, Some(CommandReply::Quit));
        assert!(text(handle_command(&mut s, "/nope").await).starts_with("Unknown command."));
    }
}
