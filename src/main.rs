//! Process entry point: resolves configuration, wires up logging and the
//! note-schema registry, opens the store, and runs a minimal
//! line-delimited stdio dispatch loop over [`workitem_engine::tools::Engine`].
//!
//! The wire framing a real deployment would use (JSON-RPC envelopes, an
//! HTTP router, a tool registry) is out of scope here; this loop exists to
//! exercise the engine end to end, not to define the transport contract.

use std::io::{self, BufRead, Write};

use clap::Parser;
use workitem_engine::config::{ServerConfig, Transport, init_note_schema};
use workitem_engine::logging::init_logging;
use workitem_engine::storage::SqliteStorage;
use workitem_engine::tools::{
    AdvanceItemRequest, Engine, GetContextRequest, GetNextStatusRequest, ManageDependenciesRequest,
    ManageItemsRequest, ManageNotesRequest, QueryDependenciesRequest, QueryItemsRequest, QueryNotesRequest,
};
use workitem_engine::compound::{CompleteTreeRequest, CreateWorkTreeRequest};

/// `wie` - hierarchical work-item orchestration engine.
#[derive(Debug, Parser)]
#[command(name = "wie", version, about)]
struct Args {
    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all logging below error level.
    #[arg(short, long)]
    quiet: bool,

    /// Write JSON-formatted logs to this file in addition to stderr.
    #[arg(long, env = "WIE_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet, args.log_file.as_deref())?;

    let config = ServerConfig::from_env();
    init_note_schema(&config.note_schema_path)?;

    let store = SqliteStorage::open(&config.database_path)?;
    let mut engine = Engine::new(store, config.preserve_on_cleanup_tags.clone());

    match config.transport {
        Transport::Stdio => run_stdio_loop(&mut engine),
        Transport::Http => {
            tracing::error!("WIE_TRANSPORT=http requested, but HTTP framing is not wired up in this binary");
            anyhow::bail!("http transport not implemented");
        }
    }
}

/// One JSON object per line on stdin: `{"tool": "<name>", "params": {...}}`.
/// Writes one JSON response line per request to stdout.
#[derive(Debug, serde::Deserialize)]
struct Envelope {
    tool: String,
    #[serde(default)]
    params: serde_json::Value,
}

fn run_stdio_loop(engine: &mut Engine) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatch_line(engine, &line);
        serde_json::to_writer(&mut stdout, &response)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }
    Ok(())
}

fn dispatch_line(engine: &mut Engine, line: &str) -> serde_json::Value {
    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(err) => return serde_json::json!({ "success": false, "message": format!("malformed request: {err}") }),
    };

    let result = dispatch(engine, &envelope.tool, envelope.params);
    match result {
        Ok(response) => serde_json::to_value(response)
            .unwrap_or_else(|err| serde_json::json!({ "success": false, "message": err.to_string() })),
        Err(err) => serde_json::json!({ "success": false, "message": format!("unknown tool or bad params: {err}") }),
    }
}

fn dispatch(
    engine: &mut Engine,
    tool: &str,
    params: serde_json::Value,
) -> Result<workitem_engine::tools::ToolResponse, serde_json::Error> {
    Ok(match tool {
        "manage_items" => engine.manage_items(&serde_json::from_value::<ManageItemsRequest>(params)?),
        "query_items" => engine.query_items(&serde_json::from_value::<QueryItemsRequest>(params)?),
        "manage_notes" => engine.manage_notes(&serde_json::from_value::<ManageNotesRequest>(params)?),
        "query_notes" => engine.query_notes(&serde_json::from_value::<QueryNotesRequest>(params)?),
        "manage_dependencies" => {
            engine.manage_dependencies(&serde_json::from_value::<ManageDependenciesRequest>(params)?)
        }
        "query_dependencies" => {
            engine.query_dependencies(&serde_json::from_value::<QueryDependenciesRequest>(params)?)
        }
        "advance_item" => engine.advance_item(&serde_json::from_value::<AdvanceItemRequest>(params)?),
        "get_next_status" => engine.get_next_status(&serde_json::from_value::<GetNextStatusRequest>(params)?),
        "get_next_item" => engine.get_next_item(),
        "get_blocked_items" => engine.get_blocked_items(),
        "create_work_tree" => engine.create_work_tree(&serde_json::from_value::<CreateWorkTreeRequest>(params)?),
        "complete_tree" => engine.complete_tree(&serde_json::from_value::<CompleteTreeRequest>(params)?),
        "get_context" => engine.get_context(&serde_json::from_value::<GetContextRequest>(params)?),
        other => {
            return Err(serde_json::Error::io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown tool: {other}"),
            )));
        }
    })
}
