//! # Filing Harness CLI (`fqa`)
//!
//! The `fqa` binary ingests parsed financial filings and answers
//! retrieval queries against them.
//!
//! ## Usage
//!
//! ```bash
//! fqa --config ./config/fqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fqa init` | Create the SQLite database and run schema migrations |
//! | `fqa ingest <file>` | Chunk, index, and graph a parsed filing (JSON) |
//! | `fqa search <doc-id> "<query>"` | Ranked answer context for a query |
//! | `fqa route "<query>"` | Show the retrieval strategy a query routes to |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use filing_harness::{config, db, ingest, migrate, search};

/// Filing Harness CLI — hybrid retrieval over structured financial
/// filings.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/fqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "fqa",
    about = "Filing Harness — hybrid retrieval for financial filing QA",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the graph tables. Idempotent —
    /// running it multiple times is safe.
    Init,

    /// Ingest a parsed filing.
    ///
    /// Reads a JSON file of parsed elements, chunks them with the
    /// configured strategy, fits the sparse index, and replaces the chunk
    /// graph for the filing's document id.
    Ingest {
        /// Path to the parsed filing (JSON).
        file: PathBuf,

        /// Override the document id from the file.
        #[arg(long)]
        document_id: Option<String>,

        /// Show element and chunk counts without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Query an ingested filing.
    ///
    /// Routes the query, runs sparse and (if configured) dense retrieval,
    /// fuses the rankings, and prints graph-enhanced answer context.
    Search {
        /// Document id of the ingested filing.
        document_id: String,

        /// The question to answer.
        query: String,

        /// Maximum number of base results before graph enhancement.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show which retrieval strategy a query routes to.
    Route {
        /// The question to classify.
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            document_id,
            dry_run,
        } => {
            ingest::run_ingest(&cfg, &file, document_id, dry_run).await?;
        }
        Commands::Search {
            document_id,
            query,
            limit,
        } => {
            search::run_search(&cfg, &document_id, &query, limit).await?;
        }
        Commands::Route { query } => {
            search::run_route(&cfg, &query)?;
        }
    }

    Ok(())
}
