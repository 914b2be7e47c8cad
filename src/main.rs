//! # Prompt Docs CLI (`pdocs`)
//!
//! ## Usage
//!
//! ```bash
//! pdocs --config ./config/pdocs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdocs init` | Create the vector index and bind the collection |
//! | `pdocs index` | Index files whose content is not in the hash ledger |
//! | `pdocs verify` | Run the index verification probe |
//! | `pdocs chat` | Ask questions answered from indexed content |
//! | `pdocs status` | Show ledger and index sizes |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use prompt_docs::chat::ChatSession;
use prompt_docs::config::{self, Config};
use prompt_docs::embedding;
use prompt_docs::index::VectorIndex;
use prompt_docs::ingest::{self, IndexOptions};
use prompt_docs::ledger::HashLedger;
use prompt_docs::llm;
use prompt_docs::logging;

/// Prompt Docs: incremental document indexing and question answering over
/// a local directory.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pdocs.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pdocs",
    about = "Prompt Docs: content-addressed document indexing and retrieval-augmented chat",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdocs.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vector index.
    ///
    /// Creates the SQLite file and the configured collection. Existing
    /// content is kept, so running it again is safe.
    Init,

    /// Index new or changed files from the source directory.
    ///
    /// Files are identified by the digest of their content: renaming a
    /// file does not re-index it, editing it does.
    Index {
        /// List the files that would be indexed without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Process at most N new files in this run.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run the index verification probe.
    Verify {
        /// Probe query (defaults to `index.verification_query`).
        #[arg(long)]
        query: Option<String>,
    },

    /// Ask questions interactively. Type `exit`, `quit` or `q` to leave.
    Chat,

    /// Show the number of recorded digests and indexed records.
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    tokio::select! {
        result = run(cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
        _ = shutdown_signal() => {
            // A pending stdin read would block runtime shutdown.
            std::process::exit(0);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let index = open_index(&cfg).await?;
            println!("Index initialized.");
            index.close().await;
        }
        Commands::Index { dry_run, limit } => {
            let index = open_index(&cfg).await?;
            let ledger = HashLedger::from_config(&cfg.ledger);
            let options = IndexOptions { dry_run, limit };

            let report = ingest::run_index(&cfg, &index, &ledger, &options).await?;
            report.print(&cfg.documents.resolved_directory());
            index.close().await;
        }
        Commands::Verify { query } => {
            let index = open_index(&cfg).await?;
            let query = query.unwrap_or_else(|| cfg.index.verification_query.clone());

            let previews = index
                .verify(&query, cfg.index.verification_preview_chars)
                .await?;
            println!("verify \"{}\"", query);
            println!("  matches: {}", previews.len());
            index.close().await;
        }
        Commands::Chat => {
            let index = open_index(&cfg).await?;
            let model = llm::create_model(&cfg.llm)?;
            let session = ChatSession::new(&index, model.as_ref(), &cfg.prompt)?;

            let mut input = tokio::io::BufReader::new(tokio::io::stdin());
            let mut out = std::io::stdout();
            session.run(&mut input, &mut out).await?;
            index.close().await;
        }
        Commands::Status => {
            let ledger = HashLedger::from_config(&cfg.ledger);
            let digests = ledger.list()?.len();
            let index = open_index(&cfg).await?;

            println!("status");
            println!("  ledger: {}", ledger.path().display());
            println!("  digests recorded: {}", digests);
            println!("  collection: {}", index.collection());
            println!("  records: {}", index.count().await?);
            println!("  sources: {}", index.source_count().await?);
            index.close().await;
        }
    }

    Ok(())
}

async fn open_index(cfg: &Config) -> Result<VectorIndex> {
    let embedder = embedding::create_embedder(&cfg.embedding)?;
    VectorIndex::initialize(&cfg.index, embedder)
        .await
        .context("Failed to initialize vector index")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
