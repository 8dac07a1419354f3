//! Scribe console
//!
//! Runs an embedded collaboration engine and drives it with console
//! commands.
//!
//! # Usage
//!
//! ```bash
//! # In-memory engine, interactive
//! scribe
//!
//! # Start as a user
//! scribe --user u1 --name Alice
//!
//! # With persistence
//! scribe --db /var/lib/scribe/scribe.db
//!
//! # Run commands and exit
//! scribe -u u1 -e 'CREATE Notes CONTENT hello' -e LIST
//!
//! # With configuration file
//! scribe --config /etc/scribe/scribe.toml
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::FileConfig;
use scribe_core::{CollaborationService, EngineConfig};
use scribe_protocol::{CommandHandler, Response};
use scribe_storage::SqliteStorage;

/// Scribe - collaborative document engine console
#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "SCRIBE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SCRIBE_LOG_LEVEL")]
    log_level: Option<String>,

    /// SQLite database path for persistence (default: in-memory only)
    #[arg(long, env = "SCRIBE_DB")]
    db: Option<PathBuf>,

    /// Per-session event buffer
    #[arg(long, env = "SCRIBE_CHANNEL_CAPACITY")]
    channel_capacity: Option<usize>,

    /// Act as this user from the start
    #[arg(short, long, env = "SCRIBE_USER")]
    user: Option<String>,

    /// Display name for --user
    #[arg(short, long, requires = "user")]
    name: Option<String>,

    /// Execute a command and exit (repeatable)
    #[arg(short, long)]
    exec: Vec<String>,

    /// Quiet mode (no banner)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let level = args
        .log_level
        .as_deref()
        .or(file.log_level.as_deref())
        .unwrap_or("warn");
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let engine = engine_config(&args, file.engine);
    let db = args.db.clone().or(file.storage.db);

    let service = match &db {
        Some(path) => {
            info!(path = %path.display(), "Initializing SQLite persistence");
            let storage = SqliteStorage::new(path)
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            let service = CollaborationService::with_repository(engine, Arc::new(storage));
            let loaded = service
                .hydrate()
                .await
                .context("Failed to load stored documents")?;
            info!(documents = loaded, "SQLite persistence enabled");
            service
        }
        None => {
            info!("Running in-memory only (no --db specified)");
            CollaborationService::new(engine)
        }
    };
    let service = Arc::new(service);

    let mut handler = CommandHandler::new("console", service.clone());
    if let Some(user) = &args.user {
        let line = match &args.name {
            Some(name) => format!("AS {} \"{}\"", user, name),
            None => format!("AS {}", user),
        };
        let response = handler.execute_line(&line);
        if response.is_error() {
            print_response(&response);
            anyhow::bail!("Could not act as {}", user);
        }
    }

    if !args.exec.is_empty() {
        let mut failed = false;
        for line in &args.exec {
            let response = handler.execute_line(line);
            failed |= response.is_error();
            print_response(&response);
        }
        handler.cleanup();
        service.flush().await;
        if failed {
            anyhow::bail!("One or more commands failed");
        }
        return Ok(());
    }

    if !args.quiet {
        print_banner(db.is_some());
    }

    run_repl(&mut handler)?;

    handler.cleanup();
    service.flush().await;
    Ok(())
}

fn engine_config(args: &Args, mut engine: EngineConfig) -> EngineConfig {
    if let Some(capacity) = args.channel_capacity {
        engine.channel_capacity = capacity;
    }
    engine
}

fn run_repl(handler: &mut CommandHandler) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history = history_path();

    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    loop {
        let prompt = match handler.identity() {
            Some(me) => format!("{}({})> ", "scribe".green(), me.user_id.cyan()),
            None => format!("{}> ", "scribe".green()),
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line.to_uppercase().as_str() {
                    "QUIT" | "EXIT" => {
                        print_response(&handler.execute_line("QUIT"));
                        break;
                    }
                    "HELP" => {
                        print_help();
                        continue;
                    }
                    "CLEAR" => {
                        print!("\x1B[2J\x1B[1;1H");
                        continue;
                    }
                    _ => {}
                }

                print_response(&handler.execute_line(line));
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(path) = &history {
        let _ = rl.save_history(path);
    }
    Ok(())
}

fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".scribe_history"))
}

fn print_response(response: &Response) {
    match response {
        Response::Ok(None) => println!("{}", "OK".green()),
        Response::Ok(Some(msg)) => println!("{} {}", "OK".green(), msg),
        Response::Pong => println!("{}", "PONG".green()),
        Response::Error { code, message } => println!(
            "{} {}",
            format!("ERR {} {}", response.status(), code).red(),
            message
        ),
        Response::Json(value) => match serde_json::to_string_pretty(value) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("{}", value),
        },
    }
}

fn print_banner(persistent: bool) {
    let storage = if persistent { "SQLite" } else { "in-memory" };
    println!(
        "{}",
        format!(
            r#"
  ╔═╗╔═╗╦═╗╦╔╗ ╔═╗
  ╚═╗║  ╠╦╝║╠╩╗║╣    Collaborative documents ({})
  ╚═╝╚═╝╩╚═╩╚═╝╚═╝   Version {}. Type 'help' for commands, 'quit' to exit
"#,
            storage,
            env!("CARGO_PKG_VERSION")
        )
        .cyan()
    );
}

fn print_help() {
    println!(
        r#"
{}

{}
  AS <userId> [name]                        Act as a user

{}
  CREATE <title> [TYPE doc|sheet|slide] [CONTENT <text>]
  GET <doc>                                 Full document
  LIST                                      Documents you can read
  UPDATE <doc> <content>                    Replace content (new version)
  TITLE <doc> <title>                       Rename

{}
  SHARE <doc> <user> [read|write]           Grant access (owner)
  UNSHARE <doc> <user>                      Revoke access (owner)

{}
  COMMENT <doc> [AT <start> <end>] <text>   Add a comment
  REPLY <doc> <comment> <text>              Reply to a comment
  RESOLVE <doc> <comment>                   Resolve a comment
  SUGGEST <doc> <insert|delete|replace> [AT <start> <end>] <content>
  ACCEPT <doc> <suggestion>                 Accept (owner)
  REJECT <doc> <suggestion>                 Reject (owner)

{}
  HISTORY <doc>                             Archived versions
  RESTORE <doc> <version>                   Restore a version (write)
  EXPORT <doc> [pdf|docx|html]              Export locator

{}
  JOIN <doc>                                Open a session
  LEAVE <session>                           Close a session
  CURSOR <session> <json>                   Move your cursor
  WHO <doc>                                 Active sessions
  KICK <doc> <user>                         Close a user's sessions (owner)
  EVENTS [session]                          Drain received events

{}
  PING                                      Check the engine
  INFO                                      Engine statistics
  help / clear / quit                       Local commands
"#,
        "Scribe Commands".cyan().bold(),
        "Identity".yellow().bold(),
        "Documents".yellow().bold(),
        "Sharing".yellow().bold(),
        "Review".yellow().bold(),
        "Versions".yellow().bold(),
        "Sessions".yellow().bold(),
        "Engine".yellow().bold(),
    );
}
