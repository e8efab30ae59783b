//! cli-agent: a coding agent for the terminal, confined to one project
//! directory.

mod agent;
mod commands;
mod config;
mod repl;
mod runtime;
mod session;
mod signal;

use agent::TurnOutcome;
use clap::{Parser, Subcommand};
use config::AgentConfig;
use runtime::{Workspace, build_backend};
use session::Session;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Debug, Parser)]
#[command(name = "cli-agent", version, about = "Terminal coding agent")]
struct Cli {
    /// Project root the agent may read and edit. Defaults to the current directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file. Defaults to ~/.cli-agent/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log to stderr instead of the log file.
    #[arg(long, global = true)]
    log_stderr: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session (default).
    Chat,
    /// Run a single prompt and exit.
    Ask { prompt: String },
    /// List the tools offered to the model.
    Tools,
    /// Show the todo list for the project root.
    Todos,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let cfg = AgentConfig::load(cli.config.clone()).await?;
    init_tracing(&cfg, cli.log_stderr)?;
    install_panic_hook();

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let workspace = Workspace::open(&cfg, &root)?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Tools => {
            for def in workspace.tools.definitions() {
                println!("{:<18} {}", def.name, def.description);
            }
            Ok(())
        }
        Command::Todos => {
            let rendered = workspace.todos.rendered().await;
            if rendered.is_empty() {
                println!("The todo list is empty.");
            } else {
                println!("{rendered}");
            }
            Ok(())
        }
        Command::Ask { prompt } => {
            let agent = workspace.into_agent(&cfg, build_backend(&cfg)?);
            let session = Session::new(Arc::new(agent));
            let outcome = repl::drive_turn(&session, prompt, &mut std::io::stdout()).await?;
            match outcome {
                TurnOutcome::Done { .. } => Ok(()),
                other => Err(anyhow::anyhow!("turn did not complete: {other:?}")),
            }
        }
        Command::Chat => {
            let agent = workspace.into_agent(&cfg, build_backend(&cfg)?);
            let mut session = Session::new(Arc::new(agent));
            repl::run_chat(&mut session).await
        }
    }
}

fn init_tracing(cfg: &AgentConfig, to_stderr: bool) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new("info,cli_agent=debug,ca_app=debug,ca_llm=debug,ca_tools=debug"),
    };
    let log_format = std::env::var("CLI_AGENT_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    // stdout carries the conversation.
    let log_file = cfg.log_file();
    let (writer, ansi) = if to_stderr {
        (BoxMakeWriter::new(std::io::stderr), true)
    } else {
        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| anyhow::anyhow!("open log file {}: {e}", log_file.display()))?;
        (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
    };

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(ansi)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(ansi)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported CLI_AGENT_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::info!(
        log_format = %log_format,
        log_file = %log_file.display(),
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
