//! # Record Desk CLI (`rdesk`)
//!
//! ## Usage
//!
//! ```bash
//! rdesk --config ./config/rdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rdesk init` | Create the SQLite audit database (sqlite sink only) |
//! | `rdesk sources` | List backends and whether they take part in fan-out |
//! | `rdesk exec --actor-id <id> <text>` | Run one command and print the reply |
//! | `rdesk serve` | Start the HTTP hook for the chat transport |
//!
//! ## Examples
//!
//! ```bash
//! # What a registered user would see for a search
//! rdesk exec --actor-id 111 --name Ana "informe anual"
//!
//! # Identity lookup, saving nothing
//! rdesk exec --actor-id 111 /dni 12345678
//!
//! # Search with attachments written to ./out
//! rdesk exec --actor-id 111 --save-attachments ./out "/buscar contrato"
//! ```
//!
//! Operational logs go to stderr and follow `RUST_LOG` (default `info`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use record_desk::audit::SqliteAuditSink;
use record_desk::config;
use record_desk::dispatch::Dispatcher;
use record_desk::models::Actor;
use record_desk::server;
use record_desk::sources;

/// Record Desk: role-gated lookups over spreadsheets, files, code and
/// identity registries.
#[derive(Parser)]
#[command(name = "rdesk", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the audit database and schema.
    ///
    /// Only meaningful with `audit.sink = "sqlite"`. Idempotent.
    Init,

    /// List backends, their targets and fan-out membership.
    Sources,

    /// Run one command as the given actor and print the reply.
    ///
    /// Goes through the same gate, backends and audit log as the server.
    Exec {
        /// Chat identifier of the acting user.
        #[arg(long)]
        actor_id: String,

        /// Display name recorded in the audit log.
        #[arg(long, default_value = "")]
        name: String,

        /// Username recorded in the audit log.
        #[arg(long)]
        handle: Option<String>,

        /// Write attachments into this directory.
        #[arg(long)]
        save_attachments: Option<PathBuf>,

        /// Message text, e.g. `/dni 12345678` or `informe anual`.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },

    /// Start the HTTP hook (`GET /health`, `POST /commands`).
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            if cfg.audit.sink == "sqlite" {
                SqliteAuditSink::open(&cfg.audit.path).await?;
                println!("Audit database ready at {}", cfg.audit.path.display());
            } else {
                println!("audit.sink is '{}'; nothing to initialize.", cfg.audit.sink);
            }
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Exec {
            actor_id,
            name,
            handle,
            save_attachments,
            text,
        } => {
            let dispatcher = Dispatcher::from_config(&cfg).await?;
            let mut actor = Actor::new(actor_id).named(name);
            if let Some(handle) = handle {
                actor = actor.with_handle(handle);
            }

            let reply = dispatcher.handle(&actor, &text.join(" ")).await;
            println!("{}", reply.messages.join("\n\n"));

            if !reply.attachments.is_empty() {
                match &save_attachments {
                    Some(dir) => {
                        std::fs::create_dir_all(dir).with_context(|| {
                            format!("Failed to create directory: {}", dir.display())
                        })?;
                        for a in &reply.attachments {
                            let file_name = std::path::Path::new(&a.filename)
                                .file_name()
                                .map(|n| n.to_os_string())
                                .unwrap_or_else(|| "attachment".into());
                            let path = dir.join(file_name);
                            std::fs::write(&path, &a.bytes).with_context(|| {
                                format!("Failed to write attachment: {}", path.display())
                            })?;
                            println!("[attachment saved: {}]", path.display());
                        }
                    }
                    None => {
                        for a in &reply.attachments {
                            println!("[attachment: {} ({} bytes)]", a.filename, a.bytes.len());
                        }
                    }
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
