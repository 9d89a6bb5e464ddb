//! Durable storage for newsdesk: atomic per-day artifact files and the relational
//! headline/entity store.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use newsdesk_core::DAY_DIR_FORMAT;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

mod memory;
mod postgres;
mod store;

pub use memory::MemoryHeadlineStore;
pub use postgres::PgHeadlineStore;
pub use store::{
    EntityRow, HeadlineRow, HeadlineStore, StoreConfig, StoreError, StoreTransaction,
};

pub const CRATE_NAME: &str = "newsdesk-storage";

/// Subdirectory of the artifact root that holds one directory per run date.
pub const PROCESSED_DIR: &str = "processed";

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub replaced: bool,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn day_dir_name(date: NaiveDate) -> String {
        date.format(DAY_DIR_FORMAT).to_string()
    }

    /// `processed/<YYYY_MM_DD>/<file_name>` relative to the store root.
    pub fn day_relative_path(&self, date: NaiveDate, file_name: &str) -> PathBuf {
        PathBuf::from(PROCESSED_DIR)
            .join(Self::day_dir_name(date))
            .join(file_name)
    }

    pub fn processed_root(&self) -> PathBuf {
        self.root.join(PROCESSED_DIR)
    }

    /// Write bytes to `relative_path` through a temp file and an atomic rename, replacing
    /// whatever was there before.
    pub async fn write_bytes(
        &self,
        relative_path: impl AsRef<Path>,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let relative_path = relative_path.as_ref().to_path_buf();
        let absolute_path = self.root.join(&relative_path);
        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating artifact directory {}", parent.display()))?;

        let replaced = fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking artifact path {}", absolute_path.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp artifact file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp artifact file {}", temp_path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("syncing temp artifact file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp artifact {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }

        Ok(StoredArtifact {
            content_hash: Self::sha256_hex(bytes),
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            replaced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("date")
    }

    #[test]
    fn artifact_hashing_is_stable() {
        let hash = ArtifactStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn day_paths_use_underscored_dates() {
        let store = ArtifactStore::new("/tmp/artifacts");
        assert_eq!(
            store.day_relative_path(day(), "entities.parquet"),
            PathBuf::from("processed/2026_10_19/entities.parquet")
        );
    }

    #[tokio::test]
    async fn same_day_writes_replace_previous_artifact() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        let rel = store.day_relative_path(day(), "entities.parquet");

        let first = store.write_bytes(&rel, b"first run").await.expect("first write");
        let second = store.write_bytes(&rel, b"second").await.expect("second write");

        assert!(!first.replaced);
        assert!(second.replaced);
        assert_ne!(first.content_hash, second.content_hash);
        let on_disk = std::fs::read(&second.absolute_path).expect("read back");
        assert_eq!(on_disk, b"second");

        let leftovers = std::fs::read_dir(second.absolute_path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
