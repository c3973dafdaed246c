//! # PCS Assistant daemon (`pcsd`)
//!
//! The `pcsd` binary runs the chatbot backend and offers a couple of
//! one-shot commands for poking at the pipeline from a terminal.
//!
//! ## Usage
//!
//! ```bash
//! pcsd --config ./config/pcsd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pcsd serve` | Start the HTTP API server |
//! | `pcsd plan "<question>"` | Print the query plan for a question |
//! | `pcsd ask "<question>"` | Run one full chat turn and print the answer |
//!
//! Logging is controlled via `RUST_LOG` (e.g. `RUST_LOG=pcs_assistant=debug`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pcs_assistant::config::{self, Config};
use pcs_assistant::server;

/// PCS Assistant — an AI chatbot backend for professional cycling
/// statistics.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file is not an error; built-in defaults are used
/// (local source, disabled AI provider).
#[derive(Parser)]
#[command(
    name = "pcsd",
    about = "PCS Assistant — AI chatbot backend for professional cycling statistics",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pcsd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// chat and data endpoints until the process is terminated.
    Serve,

    /// Print the query plan for a question without executing it.
    ///
    /// Requires an AI provider to be configured; with `provider =
    /// "disabled"` this always prints the fallback plan.
    Plan {
        /// The question to plan.
        question: String,
    },

    /// Run one full chat turn and print the answer.
    Ask {
        /// The question to answer.
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pcs_assistant=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(path = %cli.config.display(), "no config file, using defaults");
        Config::default()
    };

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Plan { question } => {
            let (_cache, _gateway, chat) = server::build_services(&cfg)?;
            let plan = chat.plan(&question).await;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Ask { question } => {
            let (cache, _gateway, chat) = server::build_services(&cfg)?;
            let response = chat.chat(&question).await;
            println!("{}", response.message);
            if let Some(viz) = &response.visualization {
                println!();
                println!("[chart: {}]", serde_json::to_string(&viz.kind)?);
            }
            cache.close();
        }
    }

    Ok(())
}
