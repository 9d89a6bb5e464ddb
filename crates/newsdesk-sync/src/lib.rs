//! Daily sync pipeline: snapshot → normalized batch → artifacts, cumulative view,
//! relational store, run report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use newsdesk_core::RecordRejection;
use newsdesk_ingest::{read_snapshot, Normalizer, SnapshotRead, SourceCatalog};
use newsdesk_storage::{ArtifactStore, HeadlineStore, StoreConfig};
use serde::Serialize;
use tokio::fs;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

mod aggregate;
mod artifacts;
mod engine;

pub use aggregate::{
    sentiment_by_source, CumulativeAggregator, CumulativeView, EntityFrequency, SourceSentiment,
    RANKED_ENTITY_LABELS,
};
pub use artifacts::{
    read_entity_mentions, ArtifactManifest, ArtifactManifestFile, ArtifactWriter, WrittenArtifacts,
    ENTITIES_ARTIFACT, HEADLINES_ARTIFACT, MANIFEST_ARTIFACT,
};
pub use engine::{HeadlineOutcome, SyncEngine, SyncError, SyncReport};

pub const CRATE_NAME: &str = "newsdesk-sync";

pub const RUN_SUMMARY_FILE: &str = "run_summary.json";
pub const DAILY_BRIEF_FILE: &str = "daily_brief.md";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub snapshot_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub sources_file: PathBuf,
    pub store: StoreConfig,
    pub top_entities: usize,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let workspace_root = lookup("NEWSDESK_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let defaults = StoreConfig::default();
        Self {
            snapshot_path: lookup("NEWSDESK_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| workspace_root.join("data/raw_headlines_data.csv")),
            artifacts_dir: lookup("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./artifacts")),
            reports_dir: lookup("NEWSDESK_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./reports")),
            sources_file: lookup("NEWSDESK_SOURCES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| workspace_root.join("sources.yaml")),
            store: StoreConfig {
                database_url: lookup("DATABASE_URL"),
                host: lookup("NEWSDESK_DB_HOST").unwrap_or(defaults.host),
                port: lookup("NEWSDESK_DB_PORT")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.port),
                database: lookup("NEWSDESK_DB_NAME").unwrap_or(defaults.database),
                username: lookup("NEWSDESK_DB_USER").unwrap_or(defaults.username),
                password: lookup("NEWSDESK_DB_PASSWORD"),
                connect_timeout: lookup("NEWSDESK_DB_CONNECT_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.connect_timeout),
            },
            top_entities: lookup("NEWSDESK_TOP_ENTITIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            workspace_root,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NothingToDo {
    SnapshotAbsent,
    SnapshotEmpty,
}

#[derive(Debug, Clone, Serialize)]
pub struct CumulativeSummary {
    pub mentions: usize,
    pub files_read: usize,
    pub files_skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub snapshot: String,
    pub snapshot_rows: usize,
    pub headlines: usize,
    pub entities: usize,
    pub rejected: Vec<RecordRejection>,
    pub sync: SyncReport,
    pub cumulative: CumulativeSummary,
    pub top_entities: Vec<EntityFrequency>,
    pub sentiment_by_source: Vec<SourceSentiment>,
    pub artifacts: WrittenArtifacts,
    pub reports_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub enum RunOutcome {
    NothingToDo {
        reason: NothingToDo,
        snapshot: PathBuf,
    },
    Completed(Box<RunSummary>),
}

/// One daily run: read → normalize → write artifacts → aggregate → sync → report.
pub struct SyncPipeline {
    config: SyncConfig,
    normalizer: Normalizer,
    writer: ArtifactWriter,
    aggregator: CumulativeAggregator,
    store: Option<Arc<dyn HeadlineStore>>,
}

impl SyncPipeline {
    /// Loads the source catalog named by the config, or the built-in one.
    pub fn new(config: SyncConfig) -> Result<Self> {
        let catalog = SourceCatalog::load_or_default(&config.sources_file)?;
        Ok(Self::with_catalog(config, catalog))
    }

    pub fn with_catalog(config: SyncConfig, catalog: SourceCatalog) -> Self {
        let artifacts = ArtifactStore::new(&config.artifacts_dir);
        Self {
            normalizer: Normalizer::new(catalog),
            writer: ArtifactWriter::new(artifacts.clone()),
            aggregator: CumulativeAggregator::new(artifacts),
            store: None,
            config,
        }
    }

    /// Sync into `store` instead of connecting to PostgreSQL.
    pub fn with_store(mut self, store: Arc<dyn HeadlineStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn run_once(&self, run_date: NaiveDate) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, %run_date);
        self.run(run_id, run_date).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, run_date: NaiveDate) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let snapshot_path = &self.config.snapshot_path;

        let snapshot = match read_snapshot(snapshot_path, run_date)? {
            SnapshotRead::Absent => {
                return Ok(nothing_to_do(NothingToDo::SnapshotAbsent, snapshot_path))
            }
            SnapshotRead::Empty => {
                return Ok(nothing_to_do(NothingToDo::SnapshotEmpty, snapshot_path))
            }
            SnapshotRead::Loaded(snapshot) => snapshot,
        };
        let snapshot_rows = snapshot.rows.len() + snapshot.rejected.len();

        let batch = self.normalizer.normalize(&snapshot);
        let mentions = batch.mentions();

        let artifacts = self
            .writer
            .write_day(run_date, &batch.headlines, &mentions)
            .await
            .context("writing daily artifacts")?;

        let cumulative = self.aggregator.collect(run_date, &mentions);
        let top_entities =
            cumulative.entity_frequencies(&RANKED_ENTITY_LABELS, self.config.top_entities);
        let sentiment = sentiment_by_source(&batch.headlines);

        let engine = match &self.store {
            Some(store) => SyncEngine::new(Arc::clone(store)),
            None => SyncEngine::connect(&self.config.store).await?,
        };
        let sync = engine.sync(&batch).await.context("syncing headline batch")?;

        let reports_dir = self.config.reports_dir.join(ArtifactStore::day_dir_name(run_date));
        let summary = RunSummary {
            run_id,
            run_date,
            started_at,
            finished_at: Utc::now(),
            snapshot: snapshot_path.display().to_string(),
            snapshot_rows,
            headlines: batch.headlines.len(),
            entities: batch.entities.len(),
            rejected: batch.rejected,
            sync,
            cumulative: CumulativeSummary {
                mentions: cumulative.mentions.len(),
                files_read: cumulative.files_read,
                files_skipped: cumulative.files_skipped,
            },
            top_entities,
            sentiment_by_source: sentiment,
            artifacts,
            reports_dir: reports_dir.display().to_string(),
        };
        write_run_reports(&reports_dir, &summary).await?;

        info!(
            headlines = summary.headlines,
            rejected = summary.rejected.len(),
            inserted = summary.sync.headlines_inserted,
            existing = summary.sync.headlines_existing,
            "run complete"
        );
        Ok(RunOutcome::Completed(Box::new(summary)))
    }
}

fn nothing_to_do(reason: NothingToDo, snapshot: &Path) -> RunOutcome {
    info!(?reason, snapshot = %snapshot.display(), "nothing to process");
    RunOutcome::NothingToDo {
        reason,
        snapshot: snapshot.to_path_buf(),
    }
}

async fn write_run_reports(dir: &Path, summary: &RunSummary) -> Result<()> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    let summary_path = dir.join(RUN_SUMMARY_FILE);
    fs::write(
        &summary_path,
        serde_json::to_vec_pretty(summary).context("serializing run summary")?,
    )
    .await
    .with_context(|| format!("writing {}", summary_path.display()))?;
    let brief_path = dir.join(DAILY_BRIEF_FILE);
    fs::write(&brief_path, daily_brief(summary))
        .await
        .with_context(|| format!("writing {}", brief_path.display()))?;
    Ok(())
}

fn daily_brief(summary: &RunSummary) -> String {
    let sync = &summary.sync;
    let mut lines = vec![
        format!("# Newsdesk Daily Brief {}", summary.run_date),
        String::new(),
        format!("- run_id: `{}`", summary.run_id),
        format!("- snapshot: `{}` ({} rows)", summary.snapshot, summary.snapshot_rows),
        format!(
            "- headlines: {} ({} inserted, {} existing, {} failed)",
            summary.headlines,
            sync.headlines_inserted,
            sync.headlines_existing,
            sync.headlines_failed
        ),
        format!(
            "- entities: {} ({} inserted, {} skipped, {} failed)",
            summary.entities, sync.entities_inserted, sync.entities_skipped, sync.entities_failed
        ),
        format!("- rejected records: {}", summary.rejected.len()),
        format!(
            "- cumulative mentions: {} from {} earlier days ({} skipped)",
            summary.cumulative.mentions,
            summary.cumulative.files_read,
            summary.cumulative.files_skipped
        ),
        String::new(),
        "## Top entities (all days)".to_string(),
        String::new(),
        "| entity | mentions |".to_string(),
        "|---|---|".to_string(),
    ];
    for entry in &summary.top_entities {
        lines.push(format!("| {} | {} |", entry.text, entry.count));
    }
    lines.push(String::new());
    lines.push("## Sentiment by source (today)".to_string());
    lines.push(String::new());
    lines.push("| source | mean polarity | headlines |".to_string());
    lines.push("|---|---|---|".to_string());
    for entry in &summary.sentiment_by_source {
        lines.push(format!(
            "| {} | {:.2} | {} |",
            entry.source_name, entry.mean_polarity, entry.headlines
        ));
    }
    if !summary.rejected.is_empty() {
        lines.push(String::new());
        lines.push("## Rejected records".to_string());
        lines.push(String::new());
        for rejection in &summary.rejected {
            lines.push(format!("- row {}: {}", rejection.position, rejection.reason));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Markdown digest of the `runs` most recent run summaries under `reports_dir`.
pub fn report_markdown(runs: usize, reports_dir: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(reports_dir)
        .with_context(|| format!("reading {}", reports_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    dirs.sort();
    dirs.reverse();

    let mut lines = vec!["# Newsdesk Run Report".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let summary_path = dir.join(RUN_SUMMARY_FILE);
        if !summary_path.exists() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;
        let count = |path: &[&str]| {
            path.iter()
                .try_fold(&value, |v, key| v.get(key))
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
        };
        let day = dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let run_id = value.get("run_id").and_then(|v| v.as_str()).unwrap_or("unknown");
        let rejected = value
            .get("rejected")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);

        lines.push(format!("## {day} (run `{run_id}`)"));
        lines.push(format!("- headlines: {}", count(&["headlines"])));
        lines.push(format!(
            "- inserted / existing / failed: {} / {} / {}",
            count(&["sync", "headlines_inserted"]),
            count(&["sync", "headlines_existing"]),
            count(&["sync", "headlines_failed"])
        ));
        lines.push(format!(
            "- entities inserted / skipped: {} / {}",
            count(&["sync", "entities_inserted"]),
            count(&["sync", "entities_skipped"])
        ));
        lines.push(format!("- rejected records: {rejected}"));
        let brief_path = dir.join(DAILY_BRIEF_FILE);
        if brief_path.exists() {
            lines.push(format!("- daily brief: `{}`", brief_path.display()));
        }
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}
