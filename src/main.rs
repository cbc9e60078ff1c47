//! # Pagewise CLI (`pagewise`)
//!
//! ## Usage
//!
//! ```bash
//! pagewise --config ./config/pagewise.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pagewise init` | Create the SQLite database and run schema migrations |
//! | `pagewise ingest <path>` | Ingest a layout JSON, PDF, or text file |
//! | `pagewise documents` | List ingested documents |
//! | `pagewise context <id> "<question>"` | Show the context a question would be answered from |
//! | `pagewise ask <id> "<question>"` | Answer a question with the configured model |
//! | `pagewise classify "<text>"` | Classify text against the graph template catalog |
//! | `pagewise templates` | List catalog templates |
//! | `pagewise serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! pagewise init
//! pagewise ingest ./lectures/labor.json --title "Labor Economics"
//! pagewise context 3f2a9c1e-… "Explain the graph on page 7"
//! pagewise serve
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to override the default filter.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pagewise::config::{self, Config};
use pagewise::progress::ProgressMode;
use pagewise::{commands, migrate, server};
use pagewise_core::catalog::Catalog;

const DEFAULT_LOG_FILTER: &str = "pagewise=info,pagewise_core=info";

/// Pagewise: page-aware document ingestion, figure enrichment and context
/// assembly for question answering.
#[derive(Parser)]
#[command(
    name = "pagewise",
    about = "Page-aware document ingestion, figure enrichment and context assembly",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pagewise.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest a document.
    ///
    /// `.json` files hold pre-analysed page layouts, `.pdf` files are read
    /// page by page, anything else is text with pages split on form feeds.
    /// Re-ingesting identical bytes replaces the document's fragments.
    Ingest {
        path: PathBuf,

        /// Document title (defaults to the file name).
        #[arg(long)]
        title: Option<String>,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` on a terminal, otherwise `off`.
        #[arg(long)]
        progress: Option<String>,
    },

    /// List ingested documents.
    Documents,

    /// Print the context assembled for a question, without calling a model.
    Context {
        document_id: String,
        question: String,

        /// Explicit page hint (overrides "page N" in the question).
        #[arg(long)]
        page: Option<u32>,
    },

    /// Answer a question about a document.
    Ask {
        document_id: String,
        question: String,

        #[arg(long)]
        page: Option<u32>,
    },

    /// Classify text against the graph template catalog.
    Classify { text: String },

    /// List the graph template catalog.
    Templates,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The configured catalog, or the built-in one when no config file exists.
fn catalog_for(path: &std::path::Path) -> anyhow::Result<Catalog> {
    if !path.exists() {
        return Ok(Catalog::builtin());
    }
    let cfg: Config = config::load_config(path)?;
    cfg.catalog.load()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require a database
    match &cli.command {
        Commands::Classify { text } => {
            commands::run_classify(&catalog_for(&cli.config)?, text);
            return Ok(());
        }
        Commands::Templates => {
            commands::run_templates(&catalog_for(&cli.config)?);
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            title,
            progress,
        } => {
            let mode = ProgressMode::resolve(progress.as_deref())?;
            commands::run_ingest(&cfg, &path, title, mode).await?;
        }
        Commands::Documents => {
            commands::run_documents(&cfg).await?;
        }
        Commands::Context {
            document_id,
            question,
            page,
        } => {
            commands::run_context(&cfg, &document_id, &question, page).await?;
        }
        Commands::Ask {
            document_id,
            question,
            page,
        } => {
            commands::run_ask(&cfg, &document_id, &question, page).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Classify { .. } | Commands::Templates => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
