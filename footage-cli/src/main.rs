//! Footage similarity pipeline CLI
//!
//! Operator entry point: batch ingestion, single-video ingestion, embedding
//! inspection, similarity queries and collection maintenance. Every command
//! prints a JSON envelope `{ success, data?, error? }`.

mod commands;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use footage_core::ApiResponse;
use footage_services::DedupSource;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::{App, BatchArgs};
use crate::config::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "footage",
    about = "Ingest video embeddings and find similar footage"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every video of the catalog, page by page
    BatchEmbed {
        /// Videos per catalog page (at most 50)
        #[arg(long, env = "FOOTAGE_PAGE_SIZE", default_value_t = 50)]
        page_size: u32,

        /// Stop after this many pages; 0 processes all
        #[arg(long, env = "FOOTAGE_MAX_PAGES", default_value_t = 0)]
        max_pages: u32,

        /// Seconds between catalog pages
        #[arg(long, env = "FOOTAGE_PAGE_DELAY", default_value_t = 2.0)]
        delay: f64,

        /// Seconds between videos
        #[arg(long, env = "FOOTAGE_VIDEO_DELAY", default_value_t = 2.0)]
        video_delay: f64,

        /// Re-ingest videos that are already stored
        #[arg(long)]
        no_skip_existing: bool,

        /// Where the already-ingested set comes from
        #[arg(long, value_enum, default_value_t = DedupArg::VectorStore)]
        dedup_source: DedupArg,
    },

    /// Fetch and store the embedding of one video
    Ingest { video_id: String },

    /// Show the segments of a video's embedding
    Embedding { video_id: String },

    /// Find videos similar to the given one
    Similar {
        video_id: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Explain how a similarity query for this video would run
    Explain { video_id: String },

    /// Drop and recreate the vector collection
    RecreateSchema {
        /// Vector length; sampled from the first catalog video when omitted
        #[arg(long)]
        dimensions: Option<usize>,
    },

    /// Ingestion status from the ledger
    Status {
        /// Show the event log of one video instead of the summary
        #[arg(long)]
        video_id: Option<String>,
    },

    /// Object counts of the vector collection
    Stats {
        #[arg(long, default_value_t = 2000)]
        sample: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DedupArg {
    VectorStore,
    Ledger,
}

impl From<DedupArg> for DedupSource {
    fn from(arg: DedupArg) -> Self {
        match arg {
            DedupArg::VectorStore => DedupSource::VectorStore,
            DedupArg::Ledger => DedupSource::Ledger,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if the file doesn't exist
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,footage=debug")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let app = App::open(&settings).await?;
    info!("Collection {} on {} backend", app.store.collection(), app.store.backend_name());

    let result = match cli.command {
        Command::BatchEmbed {
            page_size,
            max_pages,
            delay,
            video_delay,
            no_skip_existing,
            dedup_source,
        } => {
            let args = BatchArgs {
                page_size,
                max_pages,
                delay_secs: delay,
                video_delay_secs: video_delay,
                skip_existing: !no_skip_existing,
                dedup_source: dedup_source.into(),
            };
            commands::batch_embed(&app, &args).await
        }
        Command::Ingest { video_id } => commands::ingest(&app, &video_id).await,
        Command::Embedding { video_id } => commands::embedding(&app, &video_id).await,
        Command::Similar { video_id, limit } => commands::similar(&app, &video_id, limit).await,
        Command::Explain { video_id } => commands::explain(&app, &video_id).await,
        Command::RecreateSchema { dimensions } => commands::recreate_schema(&app, dimensions).await,
        Command::Status { video_id } => commands::status(&app, video_id.as_deref()),
        Command::Stats { sample } => commands::stats(&app, sample).await,
    };

    if let Err(ref e) = result {
        error!("Command failed: {}", e);
    }
    let response: ApiResponse<Value> = result.into();
    println!("{}", serde_json::to_string_pretty(&response)?);

    // Release store and ledger handles before exit
    let success = response.success;
    drop(app);
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
