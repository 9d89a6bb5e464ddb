//! Cross-day aggregation over the per-day entity artifacts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use newsdesk_core::{EntityMention, Headline};
use newsdesk_storage::ArtifactStore;
use serde::Serialize;
use tracing::{debug, warn};

use crate::artifacts::{read_entity_mentions, ENTITIES_ARTIFACT};

/// Entity labels ranked in the daily brief.
pub const RANKED_ENTITY_LABELS: [&str; 3] = ["ORG", "PERSON", "GPE"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CumulativeView {
    pub mentions: Vec<EntityMention>,
    pub files_read: usize,
    pub files_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityFrequency {
    pub text: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSentiment {
    pub source_name: String,
    pub mean_polarity: f64,
    pub headlines: usize,
}

impl CumulativeView {
    /// Mention counts per entity text, restricted to `labels`, most frequent first.
    /// Ties are broken alphabetically.
    pub fn entity_frequencies(&self, labels: &[&str], limit: usize) -> Vec<EntityFrequency> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for mention in &self.mentions {
            if labels.contains(&mention.label.as_str()) {
                *counts.entry(mention.text.as_str()).or_default() += 1;
            }
        }
        let mut ranked: Vec<EntityFrequency> = counts
            .into_iter()
            .map(|(text, count)| EntityFrequency {
                text: text.to_string(),
                count,
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.text.cmp(&b.text)));
        ranked.truncate(limit);
        ranked
    }
}

/// Mean polarity per source label, most negative first.
pub fn sentiment_by_source(headlines: &[Headline]) -> Vec<SourceSentiment> {
    let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for headline in headlines {
        let entry = totals.entry(headline.source_name.as_str()).or_default();
        entry.0 += headline.polarity;
        entry.1 += 1;
    }
    let mut means: Vec<SourceSentiment> = totals
        .into_iter()
        .map(|(source, (sum, n))| SourceSentiment {
            source_name: source.to_string(),
            mean_polarity: sum / n as f64,
            headlines: n,
        })
        .collect();
    means.sort_by(|a, b| {
        a.mean_polarity
            .total_cmp(&b.mean_polarity)
            .then_with(|| a.source_name.cmp(&b.source_name))
    });
    means
}

/// Unions every day's entity artifact under `processed/`.
#[derive(Debug, Clone)]
pub struct CumulativeAggregator {
    store: ArtifactStore,
}

impl CumulativeAggregator {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    /// Historical mentions plus `current`, which stands in for the `current_date` artifact
    /// so a same-day rerun is never counted twice.
    pub fn collect(&self, current_date: NaiveDate, current: &[EntityMention]) -> CumulativeView {
        let mut view = self.history(Some(current_date));
        view.mentions.extend_from_slice(current);
        view
    }

    /// All readable per-day entity artifacts in day order, optionally leaving one day out.
    /// Unreadable artifacts are logged and skipped.
    pub fn history(&self, exclude: Option<NaiveDate>) -> CumulativeView {
        let mut view = CumulativeView::default();
        let excluded = exclude.map(ArtifactStore::day_dir_name);

        for (day, path) in self.day_artifacts() {
            if excluded.as_deref() == Some(day.as_str()) {
                continue;
            }
            if !path.exists() {
                debug!(%day, "no entity artifact for day");
                view.files_skipped += 1;
                continue;
            }
            match read_entity_mentions(&path) {
                Ok(mentions) if mentions.is_empty() => {
                    debug!(%day, "entity artifact is empty");
                    view.files_skipped += 1;
                }
                Ok(mentions) => {
                    view.files_read += 1;
                    view.mentions.extend(mentions);
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %format!("{err:#}"),
                        "skipping unreadable entity artifact"
                    );
                    view.files_skipped += 1;
                }
            }
        }
        view
    }

    fn day_artifacts(&self) -> Vec<(String, PathBuf)> {
        let root = self.store.processed_root();
        let Ok(entries) = std::fs::read_dir(&root) else {
            return Vec::new();
        };
        let mut days = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
            .map(|entry| {
                (
                    entry.file_name().to_string_lossy().to_string(),
                    entry.path().join(ENTITIES_ARTIFACT),
                )
            })
            .collect::<Vec<_>>();
        days.sort();
        days
    }
}
