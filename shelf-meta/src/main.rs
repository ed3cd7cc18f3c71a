//! shelf-meta - book metadata lookup CLI
//!
//! Subcommands:
//! - `lookup`: subject labels from LoC, FAST and Wikidata, merged by slug
//! - `harvest`: descriptive evidence from OpenLibrary, Google Books, Wikipedia and Wikidata
//! - `resolve`: run one source term through the slug resolver
//! - `review-queue`: list subjects waiting for a mapping
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelf_meta::config::MetaConfig;
use shelf_meta::slugs::ResolveOptions;
use shelf_meta::{AdapterInput, LookupOptions, MetaEngine};

/// Command-line arguments for shelf-meta
#[derive(Parser, Debug)]
#[command(name = "shelf-meta")]
#[command(about = "Book subject and evidence lookup")]
#[command(version)]
struct Cli {
    /// Config file (overrides SHELF_CONFIG and the default location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up subject labels across sources
    Lookup {
        #[command(flatten)]
        book: BookArgs,

        /// Source ids to query, in order (default: all)
        #[arg(short, long = "source")]
        sources: Vec<String>,
    },

    /// Harvest descriptive evidence
    Harvest {
        #[command(flatten)]
        book: BookArgs,

        /// Ignore cached evidence
        #[arg(long)]
        force: bool,
    },

    /// Resolve one source term to a slug
    Resolve {
        #[arg(long)]
        source: String,

        #[arg(long)]
        label: String,

        #[arg(long)]
        id: Option<String>,

        /// Refuse generated slugs
        #[arg(long)]
        strict: bool,
    },

    /// List queued unknown subjects, most frequent first
    ReviewQueue {
        #[arg(long, default_value = "1")]
        min_occurrences: u64,
    },
}

#[derive(Args, Debug)]
struct BookArgs {
    #[arg(long)]
    isbn13: Option<String>,

    #[arg(long)]
    isbn10: Option<String>,

    #[arg(long)]
    oclc: Option<String>,

    #[arg(long)]
    doi: Option<String>,

    #[arg(long)]
    title: Option<String>,

    /// Repeat for multiple authors
    #[arg(long = "author")]
    authors: Vec<String>,
}

impl From<BookArgs> for AdapterInput {
    fn from(args: BookArgs) -> Self {
        AdapterInput {
            isbn10: args.isbn10,
            isbn13: args.isbn13,
            oclc: args.oclc,
            doi: args.doi,
            title: args.title,
            authors: args.authors,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelf_meta=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = MetaConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let engine = MetaEngine::from_config(&config).context("Failed to initialize metadata engine")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let outcome = run(&engine, cli.command, cancel).await;

    // Detached review-queue writes must land before exit
    engine.flush().await;
    outcome
}

async fn run(engine: &MetaEngine, command: Command, cancel: CancellationToken) -> Result<()> {
    match command {
        Command::Lookup { book, sources } => {
            let input = AdapterInput::from(book);
            let options = LookupOptions {
                sources: (!sources.is_empty()).then_some(sources),
                cancel: Some(cancel),
            };
            let result = engine.lookup(&input, options).await.context("Lookup failed")?;
            print_json(&result)
        }
        Command::Harvest { book, force } => {
            let input = AdapterInput::from(book);
            let bundle = engine
                .harvest(&input, force, Some(cancel))
                .await
                .context("Harvest failed")?;
            print_json(&bundle)
        }
        Command::Resolve {
            source,
            label,
            id,
            strict,
        } => {
            let options = ResolveOptions {
                strict,
                ..ResolveOptions::default()
            };
            let resolution = engine.resolver.resolve_slug(&source, &label, id.as_deref(), options);
            if resolution.is_none() {
                info!(source = %source, label = %label, "No slug for term");
            }
            print_json(&resolution)
        }
        Command::ReviewQueue { min_occurrences } => {
            let Some(queue) = engine.resolver.review_queue() else {
                warn!("Review queue disabled");
                return Ok(());
            };
            let mut entries = queue.entries().await.context("Failed to read review queue")?;
            entries.retain(|e| e.occurrences >= min_occurrences);
            entries.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
            print_json(&entries)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// First Ctrl+C cancels in-flight requests; partial results are still printed
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, cancelling lookup");
        cancel.cancel();
    }
}
