use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use newsdesk_storage::{ArtifactStore, MemoryHeadlineStore, PgHeadlineStore};
use newsdesk_sync::{
    report_markdown, CumulativeAggregator, RunOutcome, SyncConfig, SyncPipeline,
    RANKED_ENTITY_LABELS,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "newsdesk-cli")]
#[command(about = "Newsdesk headline sentiment sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Process one daily snapshot end to end.
    Sync {
        /// Run date (YYYY-MM-DD); defaults to today in UTC.
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Persist into an in-memory store instead of PostgreSQL.
        #[arg(long)]
        dry_run: bool,
    },
    Migrate,
    /// Print cumulative top entities from the per-day artifacts.
    Aggregate {
        #[arg(long)]
        top: Option<usize>,
    },
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let cli = Cli::parse();
    let mut config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync {
        date: None,
        snapshot: None,
        dry_run: false,
    }) {
        Commands::Sync {
            date,
            snapshot,
            dry_run,
        } => {
            if let Some(snapshot) = snapshot {
                config.snapshot_path = snapshot;
            }
            let run_date = date.unwrap_or_else(|| Utc::now().date_naive());
            let mut pipeline = SyncPipeline::new(config)?;
            if dry_run {
                info!("dry run: syncing into an in-memory store");
                pipeline = pipeline.with_store(Arc::new(MemoryHeadlineStore::new()));
            }
            match pipeline.run_once(run_date).await? {
                RunOutcome::NothingToDo { reason, snapshot } => {
                    println!(
                        "nothing to do: {reason:?} snapshot={}",
                        snapshot.display()
                    );
                }
                RunOutcome::Completed(summary) => {
                    println!(
                        "sync complete: run_id={} date={} headlines={} inserted={} existing={} \
                         failed={} entities_inserted={} entities_skipped={} rejected={} \
                         reports={}",
                        summary.run_id,
                        summary.run_date,
                        summary.headlines,
                        summary.sync.headlines_inserted,
                        summary.sync.headlines_existing,
                        summary.sync.headlines_failed,
                        summary.sync.entities_inserted,
                        summary.sync.entities_skipped,
                        summary.rejected.len(),
                        summary.reports_dir
                    );
                }
            }
        }
        Commands::Migrate => {
            let store = PgHeadlineStore::connect(&config.store).await?;
            store.migrate().await?;
            store.close().await;
            println!("migrations applied");
        }
        Commands::Aggregate { top } => {
            let store = ArtifactStore::new(&config.artifacts_dir);
            let view = CumulativeAggregator::new(store).history(None);
            let limit = top.unwrap_or(config.top_entities);
            println!(
                "days read={} skipped={} mentions={}",
                view.files_read,
                view.files_skipped,
                view.mentions.len()
            );
            for entry in view.entity_frequencies(&RANKED_ENTITY_LABELS, limit) {
                println!("{:>6}  {}", entry.count, entry.text);
            }
        }
        Commands::Report { runs } => {
            println!("{}", report_markdown(runs, &config.reports_dir)?);
        }
    }

    Ok(())
}
