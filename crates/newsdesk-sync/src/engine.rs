use std::collections::HashMap;
use std::sync::Arc;

use newsdesk_core::{Entity, Headline, NormalizedBatch};
use newsdesk_storage::{HeadlineStore, PgHeadlineStore, StoreConfig, StoreError, StoreTransaction};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("headline store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    #[error("committing sync batch failed: {0}")]
    CommitFailed(#[source] StoreError),
}

/// What happened to one headline of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HeadlineOutcome {
    Inserted { id: i64 },
    Existing { id: i64 },
    Failed { reason: String },
}

impl HeadlineOutcome {
    pub fn headline_id(&self) -> Option<i64> {
        match self {
            Self::Inserted { id } | Self::Existing { id } => Some(*id),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub headlines_inserted: usize,
    pub headlines_existing: usize,
    pub headlines_failed: usize,
    pub entities_inserted: usize,
    /// Entities whose parent headline never resolved to an id.
    pub entities_skipped: usize,
    pub entities_failed: usize,
    /// One outcome per input headline, in batch order.
    pub outcomes: Vec<HeadlineOutcome>,
}

/// Writes normalized batches into a [`HeadlineStore`], one transaction per batch.
///
/// Headlines are upserted on their natural key; entities are always appended, so
/// re-syncing a batch duplicates its entity rows.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn HeadlineStore>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn HeadlineStore>) -> Self {
        Self { store }
    }

    /// Connect to PostgreSQL and bring its schema up to date.
    pub async fn connect(config: &StoreConfig) -> Result<Self, SyncError> {
        let store = PgHeadlineStore::connect(config)
            .await
            .map_err(SyncError::StoreUnavailable)?;
        store
            .migrate()
            .await
            .map_err(|err| {
                SyncError::StoreUnavailable(StoreError::Unavailable(format!("{err:#}")))
            })?;
        Ok(Self::new(Arc::new(store)))
    }

    pub async fn sync(&self, batch: &NormalizedBatch) -> Result<SyncReport, SyncError> {
        self.sync_batch(&batch.headlines, &batch.entities).await
    }

    /// Entities reference their parent by position in `headlines`.
    pub async fn sync_batch(
        &self,
        headlines: &[Headline],
        entities: &[Entity],
    ) -> Result<SyncReport, SyncError> {
        let span = info_span!(
            "sync_batch",
            headlines = headlines.len(),
            entities = entities.len()
        );
        async move {
            let mut tx = self.store.begin().await.map_err(SyncError::StoreUnavailable)?;
            let mut report = SyncReport::default();
            let mut resolved: HashMap<usize, i64> = HashMap::with_capacity(headlines.len());

            for (pos, headline) in headlines.iter().enumerate() {
                let outcome = upsert_headline(&mut *tx, headline).await;
                match &outcome {
                    HeadlineOutcome::Inserted { id } => {
                        report.headlines_inserted += 1;
                        resolved.insert(pos, *id);
                    }
                    HeadlineOutcome::Existing { id } => {
                        report.headlines_existing += 1;
                        resolved.insert(pos, *id);
                    }
                    HeadlineOutcome::Failed { reason } => {
                        report.headlines_failed += 1;
                        warn!(
                            pos,
                            source = %headline.source_name,
                            %reason,
                            "headline write failed; its entities will be skipped"
                        );
                    }
                }
                report.outcomes.push(outcome);
            }

            for entity in entities {
                let Some(&headline_id) = resolved.get(&entity.headline_pos) else {
                    debug!(
                        headline_pos = entity.headline_pos,
                        entity = %entity.text,
                        "parent headline unresolved; skipping entity"
                    );
                    report.entities_skipped += 1;
                    continue;
                };
                match tx.insert_entity(headline_id, entity).await {
                    Ok(_) => report.entities_inserted += 1,
                    Err(err) => {
                        report.entities_failed += 1;
                        warn!(
                            headline_id,
                            entity = %entity.text,
                            error = %err,
                            "entity write failed"
                        );
                    }
                }
            }

            tx.commit().await.map_err(SyncError::CommitFailed)?;
            info!(
                inserted = report.headlines_inserted,
                existing = report.headlines_existing,
                failed = report.headlines_failed,
                entities_inserted = report.entities_inserted,
                entities_skipped = report.entities_skipped,
                entities_failed = report.entities_failed,
                "sync batch committed"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}

async fn upsert_headline(tx: &mut dyn StoreTransaction, headline: &Headline) -> HeadlineOutcome {
    match tx.insert_headline(headline).await {
        Ok(id) => HeadlineOutcome::Inserted { id },
        Err(StoreError::ConstraintConflict(key)) => match tx.find_headline_id(&key).await {
            Ok(Some(id)) => HeadlineOutcome::Existing { id },
            Ok(None) => HeadlineOutcome::Failed {
                reason: "natural key conflict but no stored headline found".to_string(),
            },
            Err(err) => HeadlineOutcome::Failed {
                reason: err.to_string(),
            },
        },
        Err(err) => HeadlineOutcome::Failed {
            reason: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use newsdesk_core::NaturalKey;
    use newsdesk_storage::MemoryHeadlineStore;

    fn headline(source: &str, text: &str) -> Headline {
        Headline {
            source_name: source.to_string(),
            original_text: format!("orig {text}"),
            translated_text: text.to_string(),
            polarity: 0.25,
            scrape_date: NaiveDate::from_ymd_opt(2026, 10, 19).expect("date"),
        }
    }

    fn entity(pos: usize, text: &str, label: &str) -> Entity {
        Entity {
            text: text.to_string(),
            label: label.to_string(),
            headline_pos: pos,
        }
    }

    /// Fails `insert_headline` for the listed translated texts.
    struct FlakyStore {
        inner: MemoryHeadlineStore,
        failing: Vec<String>,
    }

    struct FlakyTransaction {
        inner: Box<dyn StoreTransaction>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl HeadlineStore for FlakyStore {
        async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
            Ok(Box::new(FlakyTransaction {
                inner: self.inner.begin().await?,
                failing: self.failing.clone(),
            }))
        }
    }

    #[async_trait]
    impl StoreTransaction for FlakyTransaction {
        async fn insert_headline(&mut self, headline: &Headline) -> Result<i64, StoreError> {
            if self.failing.contains(&headline.translated_text) {
                return Err(StoreError::WriteFailed("connection reset".to_string()));
            }
            self.inner.insert_headline(headline).await
        }

        async fn find_headline_id(&mut self, key: &NaturalKey) -> Result<Option<i64>, StoreError> {
            self.inner.find_headline_id(key).await
        }

        async fn insert_entity(
            &mut self,
            headline_id: i64,
            entity: &Entity,
        ) -> Result<i64, StoreError> {
            self.inner.insert_entity(headline_id, entity).await
        }

        async fn commit(&mut self) -> Result<(), StoreError> {
            self.inner.commit().await
        }
    }

    struct OfflineStore;

    #[async_trait]
    impl HeadlineStore for OfflineStore {
        async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn sample() -> (Vec<Headline>, Vec<Entity>) {
        (
            vec![
                headline("BBC Russian", "Talks resume in Geneva"),
                headline("BBC Hindi", "Monsoon reaches Delhi"),
            ],
            vec![
                entity(0, "Geneva", "GPE"),
                entity(0, "UN", "ORG"),
                entity(1, "Delhi", "GPE"),
            ],
        )
    }

    #[tokio::test]
    async fn resyncing_a_batch_reuses_headline_ids() {
        let store = MemoryHeadlineStore::new();
        let engine = SyncEngine::new(Arc::new(store.clone()));
        let (headlines, entities) = sample();

        let first = engine.sync_batch(&headlines, &entities).await.expect("first");
        assert_eq!(first.headlines_inserted, 2);
        assert_eq!(first.entities_inserted, 3);

        let second = engine.sync_batch(&headlines, &entities).await.expect("second");
        assert_eq!(second.headlines_inserted, 0);
        assert_eq!(second.headlines_existing, 2);
        let first_ids: Vec<_> = first.outcomes.iter().map(HeadlineOutcome::headline_id).collect();
        let second_ids: Vec<_> = second.outcomes.iter().map(HeadlineOutcome::headline_id).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(store.headlines().await.len(), 2);
    }

    #[tokio::test]
    async fn resyncing_a_batch_appends_entities_again() {
        let store = MemoryHeadlineStore::new();
        let engine = SyncEngine::new(Arc::new(store.clone()));
        let (headlines, entities) = sample();
        engine.sync_batch(&headlines, &entities).await.expect("first");
        engine.sync_batch(&headlines, &entities).await.expect("second");
        assert_eq!(store.entities().await.len(), 6);
    }

    #[tokio::test]
    async fn failed_headline_skips_only_its_own_entities() {
        let store = MemoryHeadlineStore::new();
        let engine = SyncEngine::new(Arc::new(FlakyStore {
            inner: store.clone(),
            failing: vec!["Talks resume in Geneva".to_string()],
        }));
        let (headlines, entities) = sample();

        let report = engine.sync_batch(&headlines, &entities).await.expect("sync");
        assert_eq!(report.headlines_failed, 1);
        assert_eq!(report.headlines_inserted, 1);
        assert_eq!(report.entities_skipped, 2);
        assert_eq!(report.entities_inserted, 1);
        assert!(matches!(report.outcomes[0], HeadlineOutcome::Failed { .. }));

        let rows = store.headlines().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].translated_text, "Monsoon reaches Delhi");
        let entities = store.entities().await;
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].headline_id, rows[0].id);
    }

    #[tokio::test]
    async fn oversized_entity_fails_alone() {
        let store = MemoryHeadlineStore::new();
        let engine = SyncEngine::new(Arc::new(store.clone()));
        let (headlines, mut entities) = sample();
        entities.insert(1, entity(0, &"x".repeat(400), "ORG"));

        let report = engine.sync_batch(&headlines, &entities).await.expect("sync");
        assert_eq!(report.entities_failed, 1);
        assert_eq!(report.entities_inserted, 3);
        assert_eq!(store.entities().await.len(), 3);
    }

    #[tokio::test]
    async fn unavailable_store_writes_nothing() {
        let engine = SyncEngine::new(Arc::new(OfflineStore));
        let (headlines, entities) = sample();
        let err = engine.sync_batch(&headlines, &entities).await.unwrap_err();
        assert!(matches!(err, SyncError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn duplicate_key_within_batch_resolves_to_first_row() {
        let store = MemoryHeadlineStore::new();
        let engine = SyncEngine::new(Arc::new(store.clone()));
        let headlines = vec![
            headline("BBC Hindi", "Monsoon reaches Delhi"),
            headline("BBC Hindi", "Monsoon reaches Delhi"),
        ];
        let entities = vec![entity(0, "Delhi", "GPE"), entity(1, "India", "GPE")];

        let report = engine.sync_batch(&headlines, &entities).await.expect("sync");
        assert_eq!(report.headlines_inserted, 1);
        assert_eq!(report.headlines_existing, 1);
        assert_eq!(report.outcomes[0].headline_id(), report.outcomes[1].headline_id());
        assert_eq!(report.entities_inserted, 2);

        let rows = store.headlines().await;
        assert_eq!(rows.len(), 1);
        assert!(store.entities().await.iter().all(|e| e.headline_id == rows[0].id));
    }

    #[tokio::test]
    async fn headline_without_entities_is_still_persisted() {
        let store = MemoryHeadlineStore::new();
        let engine = SyncEngine::new(Arc::new(store.clone()));
        let report = engine
            .sync_batch(&[headline("Other", "Quiet day")], &[])
            .await
            .expect("sync");
        assert_eq!(report.headlines_inserted, 1);
        assert_eq!(store.headlines().await.len(), 1);
        assert!(store.entities().await.is_empty());
    }

    #[tokio::test]
    async fn every_stored_entity_references_a_stored_headline() {
        let store = MemoryHeadlineStore::new();
        let engine = SyncEngine::new(Arc::new(FlakyStore {
            inner: store.clone(),
            failing: vec!["Monsoon reaches Delhi".to_string()],
        }));
        let (headlines, entities) = sample();
        engine.sync_batch(&headlines, &entities).await.expect("sync");

        let ids: Vec<i64> = store.headlines().await.iter().map(|h| h.id).collect();
        for row in store.entities().await {
            assert!(ids.contains(&row.headline_id));
        }
    }
}
