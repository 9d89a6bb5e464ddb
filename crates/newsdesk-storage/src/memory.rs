use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use newsdesk_core::{Entity, Headline, NaturalKey};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::{
    EntityRow, HeadlineRow, HeadlineStore, StoreError, StoreTransaction, ENTITY_LABEL_MAX_CHARS,
    ENTITY_TEXT_MAX_CHARS,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_headline_id: i64,
    last_entity_id: i64,
    headlines: BTreeMap<i64, HeadlineRow>,
    entities: BTreeMap<i64, EntityRow>,
}

impl MemoryState {
    fn find(&self, key: &NaturalKey) -> Option<i64> {
        self.headlines
            .values()
            .find(|row| {
                row.source_name == key.source_name && row.translated_text == key.translated_text
            })
            .map(|row| row.id)
    }
}

/// Process-local store with the same uniqueness, foreign-key and cascade rules as the
/// PostgreSQL schema.
///
/// A transaction holds the store lock from `begin` until it commits or is dropped, so
/// overlapping transactions run one after another and a later one sees every earlier
/// commit. Its writes go to a private copy that replaces the shared tables on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryHeadlineStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHeadlineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn headlines(&self) -> Vec<HeadlineRow> {
        self.state.lock().await.headlines.values().cloned().collect()
    }

    pub async fn entities(&self) -> Vec<EntityRow> {
        self.state.lock().await.entities.values().cloned().collect()
    }

    /// Remove a headline and every entity referencing it. Returns false if `id` is unknown.
    pub async fn delete_headline(&self, id: i64) -> bool {
        let mut state = self.state.lock().await;
        if state.headlines.remove(&id).is_none() {
            return false;
        }
        state.entities.retain(|_, entity| entity.headline_id != id);
        true
    }
}

#[async_trait]
impl HeadlineStore for MemoryHeadlineStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTransaction {
            open: Some((guard, working)),
        }))
    }
}

struct MemoryTransaction {
    open: Option<(OwnedMutexGuard<MemoryState>, MemoryState)>,
}

impl MemoryTransaction {
    fn working(&mut self) -> Result<&mut MemoryState, StoreError> {
        self.open
            .as_mut()
            .map(|(_, working)| working)
            .ok_or_else(|| StoreError::WriteFailed("transaction already committed".to_string()))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_headline(&mut self, headline: &Headline) -> Result<i64, StoreError> {
        let state = self.working()?;
        let key = headline.natural_key();
        if state.find(&key).is_some() {
            return Err(StoreError::ConstraintConflict(key));
        }
        state.last_headline_id += 1;
        let id = state.last_headline_id;
        state.headlines.insert(
            id,
            HeadlineRow {
                id,
                source_name: headline.source_name.clone(),
                original_text: headline.original_text.clone(),
                translated_text: headline.translated_text.clone(),
                polarity: headline.polarity,
                scrape_date: headline.scrape_date,
            },
        );
        Ok(id)
    }

    async fn find_headline_id(&mut self, key: &NaturalKey) -> Result<Option<i64>, StoreError> {
        Ok(self.working()?.find(key))
    }

    async fn insert_entity(
        &mut self,
        headline_id: i64,
        entity: &Entity,
    ) -> Result<i64, StoreError> {
        let state = self.working()?;
        if !state.headlines.contains_key(&headline_id) {
            return Err(StoreError::WriteFailed(format!(
                "entity references missing headline {headline_id}"
            )));
        }
        if entity.text.chars().count() > ENTITY_TEXT_MAX_CHARS
            || entity.label.chars().count() > ENTITY_LABEL_MAX_CHARS
        {
            return Err(StoreError::WriteFailed(format!(
                "entity {:?} exceeds column width",
                entity.text
            )));
        }
        state.last_entity_id += 1;
        let id = state.last_entity_id;
        state.entities.insert(
            id,
            EntityRow {
                id,
                headline_id,
                text: entity.text.clone(),
                label: entity.label.clone(),
            },
        );
        Ok(id)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let (mut shared, working) = self
            .open
            .take()
            .ok_or_else(|| StoreError::WriteFailed("transaction already committed".to_string()))?;
        *shared = working;
        Ok(())
    }
}
