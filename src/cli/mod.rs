//! Command-line interface.
//!
//! Commands:
//!
//! - `serve` (default) - run the HTTP server
//! - `cli [actor]` - interactive chat with a rolling in-process transcript
//! - `inspect` - list the database tables and their columns
//! - `memories [n]` - print the most recent memories
//! - `version`

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::chat::context_window::{TranscriptBuffer, TrimPolicy};
use crate::chat::engine::PersonaEngine;
use crate::memory::storage::{MemoryStore, SqliteStore};

/// Actor name used by the REPL when none is given.
pub const DEFAULT_CLI_ACTOR: &str = "user";

/// Default count for `memories`.
pub const DEFAULT_MEMORIES_SHOWN: usize = 10;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Serve,
    Chat { actor: String },
    Inspect,
    Memories { limit: usize },
    Version,
}

impl std::fmt::Display for CliCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serve => write!(f, "serve"),
            Self::Chat { .. } => write!(f, "cli"),
            Self::Inspect => write!(f, "inspect"),
            Self::Memories { .. } => write!(f, "memories"),
            Self::Version => write!(f, "version"),
        }
    }
}

/// Parse arguments (without the program name).
pub fn parse_command(args: &[String]) -> Result<CliCommand, String> {
    let mut args = args.iter().map(String::as_str);
    let command = match args.next() {
        None | Some("serve") => CliCommand::Serve,
        Some("cli") | Some("chat") => CliCommand::Chat {
            actor: args.next().unwrap_or(DEFAULT_CLI_ACTOR).to_string(),
        },
        Some("inspect") => CliCommand::Inspect,
        Some("memories") => {
            let limit = match args.next() {
                Some(raw) => raw
                    .parse::<usize>()
                    .map_err(|_| format!("invalid memory count '{}'", raw))?,
                None => DEFAULT_MEMORIES_SHOWN,
            };
            CliCommand::Memories { limit }
        }
        Some("version") | Some("--version") | Some("-v") => CliCommand::Version,
        Some(other) => return Err(format!("unknown command '{}'", other)),
    };

    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument '{}' for {}", extra, command));
    }
    Ok(command)
}

/// Interactive chat loop.
///
/// The transcript starts from the log's context window and is then kept in
/// a [`TranscriptBuffer`] that trims itself after every exchange. Each
/// turn's reflection is awaited before the next prompt, so state changes
/// are visible to the following turn.
pub async fn run_repl<R, W>(
    engine: &PersonaEngine,
    actor: &str,
    input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let persona = engine.settings().persona_name.clone();
    let mut buffer = TranscriptBuffer::with_lines(
        persona.clone(),
        TrimPolicy::MaxLines(engine.settings().max_transcript_lines),
        engine.context_window(),
    );

    writeln!(out, "Starting {} CLI (type 'exit' to quit)...", persona)?;
    writeln!(out, "Memory loaded:")?;
    writeln!(out, "{}", buffer.render())?;
    writeln!(out, "\nChat start!\n")?;

    let mut lines = input.lines();
    loop {
        write!(out, "{}: ", actor)?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        if utterance.eq_ignore_ascii_case("exit") || utterance.eq_ignore_ascii_case("quit") {
            writeln!(out, "Goodbye!")?;
            break;
        }

        let turn = engine
            .turn_with_transcript(actor, utterance, buffer.lines().to_vec())
            .await;
        writeln!(out, "{}: {}", persona, turn.reply.prose)?;
        if let Some(code) = &turn.reply.code {
            writeln!(out, "Code ({}):\n{}", turn.reply.language, code)?;
        }

        turn.reflection.wait().await;
        // failed turns stay out of the log, so they stay out of the buffer too
        if !turn.reply.failed {
            buffer.push_exchange(actor, utterance, &turn.reply.raw);
        }
    }
    Ok(())
}

/// Print the schema of every persona table.
pub fn print_schema<W: Write>(store: &SqliteStore, out: &mut W) -> anyhow::Result<()> {
    let schema = store.describe_schema()?;
    let names: Vec<&str> = schema.iter().map(|t| t.name.as_str()).collect();
    writeln!(out, "Database: {}", store.db_path.display())?;
    writeln!(out, "Tables: {}", names.join(", "))?;
    for table in &schema {
        writeln!(out, "\n{}", table.name)?;
        for column in &table.columns {
            let mut flags = Vec::new();
            if column.primary_key {
                flags.push("PRIMARY KEY");
            }
            if column.not_null {
                flags.push("NOT NULL");
            }
            writeln!(
                out,
                "  {:<12} {:<8} {}",
                column.name,
                column.declared_type,
                flags.join(" ")
            )?;
        }
    }
    Ok(())
}

/// Print the most recent memories.
pub fn print_memories<W: Write>(
    store: &dyn MemoryStore,
    limit: usize,
    out: &mut W,
) -> anyhow::Result<()> {
    let memories = store.list_recent_memories(limit)?;
    if memories.is_empty() {
        writeln!(out, "No memories yet.")?;
    }
    for memory in memories {
        writeln!(
            out,
            "[{}] {}: {}",
            memory.created_at.format("%Y-%m-%d %H:%M:%S"),
            memory.label,
            memory.content
        )?;
    }
    Ok(())
}
