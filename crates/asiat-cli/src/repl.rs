//! Line-based interactive loop

use anyhow::{Context, Result};
use asiat_core::config::Config;
use asiat_orchestration::{format_execution_result, RuntimeContext};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use uuid::Uuid;

const PROMPT: &str = "asiat> ";
const DEFAULT_HISTORY_LIMIT: usize = 10;

const HELP: &str = "Commands:
  /help              Show this help
  /clear             Forget the conversation so far
  /git-status        Show repository status (alias /status)
  /reindex           Rebuild the code index
  /show-config       Print the active configuration (alias /config)
  /history [n]       List the latest executed actions (default 10)
  /rollback <id>     Undo an executed action by its record id
  /pending           Show the action or patch awaiting approval
  /exit              Leave

Anything else is sent to the assistant. Staged actions wait for \"yes\" or \"no\";
proposed patches wait for \"apply patch\" or \"discard patch\".";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    GitStatus,
    Reindex,
    ShowConfig,
    History(usize),
    Rollback(Uuid),
    Pending,
    Exit,
    /// Recognised command with bad arguments, or an unknown command
    Invalid(String),
}

/// `None` when the line is not a slash command.
pub fn parse_slash(line: &str) -> Option<SlashCommand> {
    let line = line.trim();
    let rest = line.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    let command = match name {
        "help" => SlashCommand::Help,
        "clear" => SlashCommand::Clear,
        "git-status" | "status" => SlashCommand::GitStatus,
        "reindex" => SlashCommand::Reindex,
        "show-config" | "config" => SlashCommand::ShowConfig,
        "pending" => SlashCommand::Pending,
        "exit" | "quit" => SlashCommand::Exit,
        "history" => match arg.map(str::parse::<usize>) {
            None => SlashCommand::History(DEFAULT_HISTORY_LIMIT),
            Some(Ok(n)) if n > 0 => SlashCommand::History(n),
            Some(_) => SlashCommand::Invalid("Usage: /history [n] with n > 0".to_string()),
        },
        "rollback" => match arg.map(Uuid::parse_str) {
            Some(Ok(id)) => SlashCommand::Rollback(id),
            _ => SlashCommand::Invalid("Usage: /rollback <record id>".to_string()),
        },
        other => SlashCommand::Invalid(format!(
            "Unknown command: /{}. Type /help for the list.",
            other
        )),
    };
    Some(command)
}

pub enum Flow {
    Continue(String),
    Exit,
}

pub async fn run(runtime: &mut RuntimeContext) -> Result<()> {
    println!(
        "ASIAT ready in {} ({} files indexed). Type /help for commands.",
        runtime.config.project_root.display(),
        runtime.assistant.index().len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", PROMPT);
        std::io::stdout().flush().context("Failed to write prompt")?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match parse_slash(line) {
            Some(command) => match execute_slash(runtime, command).await {
                Flow::Continue(output) => output,
                Flow::Exit => break,
            },
            None => runtime.assistant.handle_message(line).await,
        };
        println!("{}\n", reply);
    }

    debug!("Input closed");
    Ok(())
}

pub async fn execute_slash(runtime: &mut RuntimeContext, command: SlashCommand) -> Flow {
    let output = match command {
        SlashCommand::Exit => return Flow::Exit,
        SlashCommand::Help => HELP.to_string(),
        SlashCommand::Clear => {
            runtime.assistant.clear_memory();
            "Conversation memory cleared.".to_string()
        }
        SlashCommand::GitStatus => match runtime.assistant.git().status().await {
            Ok(status) => status.summary(),
            Err(e) => format!("Git command failed: {}", e),
        },
        SlashCommand::Reindex => match runtime.assistant.reindex().await {
            Ok(count) => format!("Indexed {} files.", count),
            Err(e) => format!("Reindex failed: {}", e),
        },
        SlashCommand::ShowConfig => match render_config(&runtime.config) {
            Ok(text) => text,
            Err(e) => format!("Could not render configuration: {}", e),
        },
        SlashCommand::History(limit) => render_history(runtime, limit).await,
        SlashCommand::Rollback(id) => {
            let context = runtime.assistant.tool_context().clone();
            let result = runtime.approval.rollback(id, &context).await;
            if result.is_success() {
                if let Err(e) = runtime.assistant.reindex().await {
                    warn!(error = %e, "Reindex after rollback failed");
                }
            }
            format_execution_result(&result)
        }
        SlashCommand::Pending => runtime
            .assistant
            .pending_summary()
            .unwrap_or_else(|| "Nothing is awaiting approval.".to_string()),
        SlashCommand::Invalid(message) => message,
    };
    Flow::Continue(output)
}

async fn render_history(runtime: &RuntimeContext, limit: usize) -> String {
    let records = runtime.approval.history(Some(limit)).await;
    if records.is_empty() {
        return "No actions executed yet.".to_string();
    }

    records
        .iter()
        .map(|record| {
            format!(
                "{}  {}  {:<12} {:?}{}",
                record.id,
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.tool,
                record.result.status,
                if record.can_rollback { "  [rollback]" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// TOML rendering with the API key masked.
fn render_config(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    if shown.provider.api_key.is_some() {
        shown.provider.api_key = Some("********".to_string());
    }
    toml::to_string_pretty(&shown).context("Failed to serialize configuration")
}
