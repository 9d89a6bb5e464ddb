//! Per-day parquet artifacts: the day's headlines and entity mentions plus a manifest.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{Array, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::NaiveDate;
use newsdesk_core::{EntityMention, Headline};
use newsdesk_storage::{ArtifactStore, StoredArtifact};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const HEADLINES_ARTIFACT: &str = "headlines.parquet";
pub const ENTITIES_ARTIFACT: &str = "entities.parquet";
pub const MANIFEST_ARTIFACT: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub schema_version: u32,
    pub run_date: NaiveDate,
    pub files: Vec<ArtifactManifestFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenArtifacts {
    pub headlines_path: PathBuf,
    pub entities_path: PathBuf,
    pub manifest_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    store: ArtifactStore,
}

impl ArtifactWriter {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    /// Write (or replace) the artifacts for `run_date`.
    pub async fn write_day(
        &self,
        run_date: NaiveDate,
        headlines: &[Headline],
        mentions: &[EntityMention],
    ) -> Result<WrittenArtifacts> {
        let headlines_bytes = encode_parquet(headlines_batch(headlines)?)?;
        let entities_bytes = encode_parquet(entities_batch(mentions)?)?;

        let headlines_file = self
            .store
            .write_bytes(
                self.store.day_relative_path(run_date, HEADLINES_ARTIFACT),
                &headlines_bytes,
            )
            .await?;
        let entities_file = self
            .store
            .write_bytes(
                self.store.day_relative_path(run_date, ENTITIES_ARTIFACT),
                &entities_bytes,
            )
            .await?;

        let manifest = ArtifactManifest {
            schema_version: 1,
            run_date,
            files: vec![
                manifest_entry("headlines", &headlines_file, headlines.len()),
                manifest_entry("entities", &entities_file, mentions.len()),
            ],
        };
        let manifest_bytes =
            serde_json::to_vec_pretty(&manifest).context("serializing artifact manifest")?;
        let manifest_file = self
            .store
            .write_bytes(
                self.store.day_relative_path(run_date, MANIFEST_ARTIFACT),
                &manifest_bytes,
            )
            .await?;

        info!(
            %run_date,
            headlines = headlines.len(),
            entities = mentions.len(),
            replaced = headlines_file.replaced,
            "wrote daily artifacts"
        );

        Ok(WrittenArtifacts {
            headlines_path: headlines_file.absolute_path,
            entities_path: entities_file.absolute_path,
            manifest_path: manifest_file.absolute_path,
        })
    }
}

fn manifest_entry(name: &str, stored: &StoredArtifact, rows: usize) -> ArtifactManifestFile {
    ArtifactManifestFile {
        name: name.to_string(),
        path: stored.relative_path.display().to_string(),
        sha256: stored.content_hash.clone(),
        bytes: stored.byte_size as u64,
        rows,
    }
}

fn encode_parquet(batch: RecordBatch) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None)
        .context("opening parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(buffer)
}

fn headlines_batch(headlines: &[Headline]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("source_name", DataType::Utf8, false),
        ArrowField::new("original_text", DataType::Utf8, false),
        ArrowField::new("translated_text", DataType::Utf8, false),
        ArrowField::new("polarity", DataType::Float64, false),
        ArrowField::new("scrape_date", DataType::Utf8, false),
    ]));

    let source_names = StringArray::from(
        headlines
            .iter()
            .map(|h| Some(h.source_name.as_str()))
            .collect::<Vec<_>>(),
    );
    let original_texts = StringArray::from(
        headlines
            .iter()
            .map(|h| Some(h.original_text.as_str()))
            .collect::<Vec<_>>(),
    );
    let translated_texts = StringArray::from(
        headlines
            .iter()
            .map(|h| Some(h.translated_text.as_str()))
            .collect::<Vec<_>>(),
    );
    let polarities = Float64Array::from(headlines.iter().map(|h| h.polarity).collect::<Vec<_>>());
    let scrape_dates = StringArray::from(
        headlines
            .iter()
            .map(|h| Some(h.scrape_date.to_string()))
            .collect::<Vec<_>>(),
    );

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(source_names),
            Arc::new(original_texts),
            Arc::new(translated_texts),
            Arc::new(polarities),
            Arc::new(scrape_dates),
        ],
    )
    .context("building headlines record batch")
}

fn entities_batch(mentions: &[EntityMention]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("source_name", DataType::Utf8, false),
        ArrowField::new("text", DataType::Utf8, false),
        ArrowField::new("label", DataType::Utf8, false),
    ]));
    let source_names = StringArray::from(
        mentions
            .iter()
            .map(|m| Some(m.source_name.as_str()))
            .collect::<Vec<_>>(),
    );
    let texts = StringArray::from(
        mentions
            .iter()
            .map(|m| Some(m.text.as_str()))
            .collect::<Vec<_>>(),
    );
    let labels = StringArray::from(
        mentions
            .iter()
            .map(|m| Some(m.label.as_str()))
            .collect::<Vec<_>>(),
    );

    RecordBatch::try_new(
        schema,
        vec![Arc::new(source_names), Arc::new(texts), Arc::new(labels)],
    )
    .context("building entities record batch")
}

/// Read an entities artifact back in write order.
pub fn read_entity_mentions(path: &Path) -> Result<Vec<EntityMention>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata {}", path.display()))?
        .build()
        .with_context(|| format!("building parquet reader {}", path.display()))?;

    let mut mentions = Vec::new();
    for batch in reader {
        let batch = batch.with_context(|| format!("decoding record batch {}", path.display()))?;
        let source_names = utf8_column(&batch, "source_name")?;
        let texts = utf8_column(&batch, "text")?;
        let labels = utf8_column(&batch, "label")?;
        for row in 0..batch.num_rows() {
            mentions.push(EntityMention {
                source_name: source_names.value(row).to_string(),
                text: texts.value(row).to_string(),
                label: labels.value(row).to_string(),
            });
        }
    }
    Ok(mentions)
}

fn utf8_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<StringArray>())
        .with_context(|| format!("missing utf8 column {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("date")
    }

    fn headline(text: &str) -> Headline {
        Headline {
            source_name: "BBC Russian".to_string(),
            original_text: format!("orig {text}"),
            translated_text: text.to_string(),
            polarity: 0.12,
            scrape_date: day(),
        }
    }

    fn mention(text: &str, label: &str) -> EntityMention {
        EntityMention {
            source_name: "BBC Russian".to_string(),
            text: text.to_string(),
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn entity_artifact_preserves_write_order() {
        let dir = tempdir().expect("tempdir");
        let writer = ArtifactWriter::new(ArtifactStore::new(dir.path()));
        let mentions = vec![
            mention("Putin", "PERSON"),
            mention("Russia", "GPE"),
            mention("NATO", "ORG"),
        ];
        let written = writer
            .write_day(day(), &[headline("Summit")], &mentions)
            .await
            .expect("write");

        assert!(written
            .entities_path
            .ends_with("processed/2026_10_19/entities.parquet"));
        assert_eq!(read_entity_mentions(&written.entities_path).expect("read"), mentions);
    }

    #[tokio::test]
    async fn rewriting_a_day_replaces_its_artifacts() {
        let dir = tempdir().expect("tempdir");
        let writer = ArtifactWriter::new(ArtifactStore::new(dir.path()));
        writer
            .write_day(
                day(),
                &[headline("a"), headline("b")],
                &[mention("Putin", "PERSON"), mention("Kyiv", "GPE")],
            )
            .await
            .expect("first");
        let written = writer
            .write_day(day(), &[headline("a")], &[mention("Putin", "PERSON")])
            .await
            .expect("second");

        assert_eq!(
            read_entity_mentions(&written.entities_path).expect("read"),
            vec![mention("Putin", "PERSON")]
        );

        let manifest: ArtifactManifest =
            serde_json::from_slice(&std::fs::read(&written.manifest_path).expect("manifest"))
                .expect("parse manifest");
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[0].rows, 1);
        let entities_bytes = std::fs::read(&written.entities_path).expect("entities bytes");
        assert_eq!(manifest.files[1].sha256, ArtifactStore::sha256_hex(&entities_bytes));
        assert_eq!(manifest.files[1].bytes, entities_bytes.len() as u64);
    }

    #[tokio::test]
    async fn empty_day_still_writes_readable_artifacts() {
        let dir = tempdir().expect("tempdir");
        let writer = ArtifactWriter::new(ArtifactStore::new(dir.path()));
        let written = writer.write_day(day(), &[], &[]).await.expect("write");
        assert!(written.headlines_path.exists());
        assert!(read_entity_mentions(&written.entities_path).expect("read").is_empty());
    }
}
