//! Snapshot reading and normalization: raw CSV rows in, headline/entity relations out.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use newsdesk_core::{
    round_polarity, Entity, Headline, NormalizedBatch, RawRecord, RecordRejection,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

mod catalog;
mod entity_list;

pub use catalog::{SourceCatalog, SourceRule};
pub use entity_list::{parse_entity_list, EntityParseError};

pub const CRATE_NAME: &str = "newsdesk-ingest";

/// One decoded snapshot row and its 1-based data row position.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub position: usize,
    pub record: RawRecord,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub rows: Vec<SnapshotRow>,
    pub rejected: Vec<RecordRejection>,
}

/// Result of reading a snapshot location. `Absent` and `Empty` both mean "nothing to
/// process today" and are not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotRead {
    Absent,
    Empty,
    Loaded(Snapshot),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("reading snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("decoding snapshot {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Scrape_Date", default)]
    scrape_date: Option<NaiveDate>,
    #[serde(rename = "Source_URL")]
    source_url: String,
    #[serde(rename = "Source_Language_Code", default)]
    source_language_code: String,
    #[serde(rename = "Original_Headline")]
    original_headline: String,
    #[serde(rename = "Translated_Headline")]
    translated_headline: String,
    #[serde(rename = "Polarity")]
    polarity: f64,
    #[serde(rename = "Entities_Raw", default)]
    entities_raw: String,
}

impl CsvRow {
    fn into_record(self, default_date: NaiveDate) -> RawRecord {
        RawRecord {
            scrape_date: self.scrape_date.unwrap_or(default_date),
            source_origin: self.source_url,
            source_language_code: self.source_language_code,
            original_text: self.original_headline,
            translated_text: self.translated_headline,
            polarity: self.polarity,
            entities_raw: self.entities_raw,
        }
    }
}

/// Read one daily CSV snapshot. Rows without a `Scrape_Date` take `default_date`.
///
/// Rows that fail to decode are returned as rejections; only I/O failures are fatal.
pub fn read_snapshot(
    path: impl AsRef<Path>,
    default_date: NaiveDate,
) -> Result<SnapshotRead, SnapshotError> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "snapshot absent");
            return Ok(SnapshotRead::Absent);
        }
        Err(source) => {
            return Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut snapshot = Snapshot::default();

    for (idx, result) in reader.deserialize::<CsvRow>().enumerate() {
        let position = idx + 1;
        match result {
            Ok(row) => snapshot.rows.push(SnapshotRow {
                position,
                record: row.into_record(default_date),
            }),
            Err(err) if err.is_io_error() => {
                return Err(SnapshotError::Csv {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    position,
                    error = %err,
                    "rejecting malformed snapshot row"
                );
                snapshot.rejected.push(RecordRejection {
                    position,
                    reason: err.to_string(),
                });
            }
        }
    }

    if snapshot.rows.is_empty() && snapshot.rejected.is_empty() {
        return Ok(SnapshotRead::Empty);
    }
    Ok(SnapshotRead::Loaded(snapshot))
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("malformed entity list: {0}")]
    Entities(#[from] EntityParseError),
    #[error("polarity {0} is outside [-1, 1]")]
    PolarityOutOfRange(f64),
    #[error("translated headline is blank")]
    BlankTranslation,
}

/// Pure `RawRecord -> (Headline, entity pairs)` transformation.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    catalog: SourceCatalog,
}

impl Normalizer {
    pub fn new(catalog: SourceCatalog) -> Self {
        Self { catalog }
    }

    pub fn normalize_record(
        &self,
        record: &RawRecord,
    ) -> Result<(Headline, Vec<(String, String)>), NormalizeError> {
        if !record.polarity.is_finite() || !(-1.0..=1.0).contains(&record.polarity) {
            return Err(NormalizeError::PolarityOutOfRange(record.polarity));
        }
        if record.translated_text.trim().is_empty() {
            return Err(NormalizeError::BlankTranslation);
        }
        let pairs = parse_entity_list(&record.entities_raw)?;

        let headline = Headline {
            source_name: self.catalog.label_for(&record.source_origin).to_string(),
            original_text: record.original_text.clone(),
            translated_text: record.translated_text.clone(),
            polarity: round_polarity(record.polarity),
            scrape_date: record.scrape_date,
        };
        Ok((headline, pairs))
    }

    /// Normalize a snapshot, exploding entity lists into child rows keyed by the parent's
    /// batch position. A malformed row is rejected alone; its siblings are unaffected.
    pub fn normalize(&self, snapshot: &Snapshot) -> NormalizedBatch {
        let mut batch = NormalizedBatch {
            rejected: snapshot.rejected.clone(),
            ..Default::default()
        };

        for row in &snapshot.rows {
            match self.normalize_record(&row.record) {
                Ok((headline, pairs)) => {
                    let headline_pos = batch.headlines.len();
                    batch.headlines.push(headline);
                    batch
                        .entities
                        .extend(pairs.into_iter().map(|(text, label)| Entity {
                            text,
                            label,
                            headline_pos,
                        }));
                }
                Err(err) => {
                    warn!(
                        position = row.position,
                        error = %err,
                        "rejecting record during normalization"
                    );
                    batch.rejected.push(RecordRejection {
                        position: row.position,
                        reason: err.to_string(),
                    });
                }
            }
        }

        batch.rejected.sort_by_key(|r| r.position);
        batch
    }
}
