use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use newsdesk_core::{Entity, Headline, NaturalKey};
use thiserror::Error;

/// Column widths of `entities.entity_text` / `entities.entity_label`.
pub const ENTITY_TEXT_MAX_CHARS: usize = 255;
pub const ENTITY_LABEL_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(
        "headline already stored under natural key ({}, {:?})",
        .0.source_name,
        .0.translated_text
    )]
    ConstraintConflict(NaturalKey),
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// A persisted headline as read back from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlineRow {
    pub id: i64,
    pub source_name: String,
    pub original_text: String,
    pub translated_text: String,
    pub polarity: f64,
    pub scrape_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRow {
    pub id: i64,
    pub headline_id: i64,
    pub text: String,
    pub label: String,
}

/// Relational store holding the `headlines` parent table and `entities` child table.
#[async_trait]
pub trait HeadlineStore: Send + Sync {
    /// Open a transaction. Failure here means the store cannot be reached at all.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// One unit of work against a [`HeadlineStore`]. Nothing is visible to other readers
/// until [`StoreTransaction::commit`]; dropping the transaction discards its writes.
///
/// A failed row write must not poison the transaction: later calls keep working.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Insert a headline and return its surrogate key, or
    /// [`StoreError::ConstraintConflict`] if its natural key is already stored.
    async fn insert_headline(&mut self, headline: &Headline) -> Result<i64, StoreError>;

    async fn find_headline_id(&mut self, key: &NaturalKey) -> Result<Option<i64>, StoreError>;

    async fn insert_entity(
        &mut self,
        headline_id: i64,
        entity: &Entity,
    ) -> Result<i64, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Connection settings for the PostgreSQL store. `database_url`, when set, takes
/// precedence over the individual fields.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "news_analysis".to_string(),
            username: "newsdesk".to_string(),
            password: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
