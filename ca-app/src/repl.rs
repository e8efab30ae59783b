//! Line-mode front end: read a prompt, stream the turn's transcript changes
//! to stdout as they settle.

use crate::agent::TurnOutcome;
use crate::commands::{CommandReply, handle_command};
use crate::session::{Session, TranscriptView};
use ca_llm::HistoryEntry;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const PREVIEW_CHARS: usize = 120;

/// Prints transcript entries once they can no longer change. The last entry
/// of a running turn may still be streaming, so it waits for the next wake-up.
pub struct Renderer {
    view: TranscriptView,
    printed: usize,
}

impl Renderer {
    /// Entries already in the transcript are treated as printed.
    pub fn new(view: TranscriptView) -> Self {
        let printed = view.len();
        Self { view, printed }
    }

    pub fn flush(&mut self, out: &mut impl Write, settled: bool) -> std::io::Result<()> {
        let entries = self.view.snapshot();
        let upto = if settled {
            entries.len()
        } else {
            entries.len().saturating_sub(1)
        };
        if upto <= self.printed {
            return Ok(());
        }
        for entry in &entries[self.printed..upto] {
            if let Some(text) = format_entry(entry) {
                writeln!(out, "{text}")?;
            }
        }
        out.flush()?;
        self.printed = upto;
        Ok(())
    }
}

/// Human entries are not echoed; the user just typed them.
pub fn format_entry(entry: &HistoryEntry) -> Option<String> {
    match entry {
        HistoryEntry::Human(_) => None,
        HistoryEntry::Ai(ai) => {
            let mut lines = Vec::new();
            if !ai.output.trim().is_empty() {
                lines.push(ai.output.trim_end().to_string());
            }
            for call in &ai.tool_calls {
                lines.push(format!("  -> {}({})", call.name, preview(&call.args)));
            }
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        HistoryEntry::Tool(tool) => {
            let first = tool.content.lines().next().unwrap_or_default();
            let count = tool.content.lines().count();
            Some(format!(
                "  <- {}: {} ({count} line{})",
                tool.name,
                preview(first),
                if count == 1 { "" } else { "s" }
            ))
        }
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Runs one turn, rendering as it goes. Ctrl-C cancels the turn.
pub async fn drive_turn(
    session: &Session,
    text: String,
    out: &mut impl Write,
) -> anyhow::Result<TurnOutcome> {
    let mut renderer = Renderer::new(session.view());
    let mut handle = session.invoke(text);
    let cancel = handle.cancel_token();

    loop {
        tokio::select! {
            changed = handle.updates.changed() => {
                if !changed {
                    break;
                }
                renderer.flush(out, false)?;
            }
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                tracing::info!("turn cancelled by user");
                cancel.cancel();
            }
        }
    }

    renderer.flush(out, true)?;
    Ok(handle.finish().await)
}

pub async fn run_chat(session: &mut Session) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();
    println!(
        "cli-agent ({}). Type /quit to exit, /tools to list tools.",
        session.agent().backend_name()
    );

    loop {
        print!("> ");
        stdout.flush()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(reply) = handle_command(session, &line).await {
            match reply {
                CommandReply::Text(text) => println!("{text}"),
                CommandReply::Quit => break,
            }
            continue;
        }

        let outcome = drive_turn(session, line, &mut stdout).await?;
        tracing::debug!(outcome = ?outcome, "turn rendered");
    }
    Ok(())
}
