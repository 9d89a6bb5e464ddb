//! Core domain model for newsdesk: raw snapshot rows and their normalized
//! headline/entity projections.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "newsdesk-core";

/// Label assigned to any source origin that matches no catalog rule.
pub const FALLBACK_SOURCE_LABEL: &str = "Other";

/// Date format used for per-day artifact and report directories.
pub const DAY_DIR_FORMAT: &str = "%Y_%m_%d";

/// One row of a daily snapshot as produced by the acquisition side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub scrape_date: NaiveDate,
    pub source_origin: String,
    pub source_language_code: String,
    pub original_text: String,
    pub translated_text: String,
    pub polarity: f64,
    pub entities_raw: String,
}

/// Normalized parent row. Identity for persistence is [`NaturalKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub source_name: String,
    pub original_text: String,
    pub translated_text: String,
    pub polarity: f64,
    pub scrape_date: NaiveDate,
}

impl Headline {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            source_name: self.source_name.clone(),
            translated_text: self.translated_text.clone(),
        }
    }
}

/// `(source_name, translated_text)`: the only stable cross-run identity of a headline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub source_name: String,
    pub translated_text: String,
}

/// Normalized child row.
///
/// `headline_pos` is the parent's position in [`NormalizedBatch::headlines`]. It is a
/// relation key for the duration of one batch, not ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
    pub headline_pos: usize,
}

/// Batch-independent entity projection written to artifacts and aggregated across days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub source_name: String,
    pub text: String,
    pub label: String,
}

/// A snapshot row isolated as malformed. `position` is the 1-based data row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRejection {
    pub position: usize,
    pub reason: String,
}

/// Output of normalizing one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBatch {
    pub headlines: Vec<Headline>,
    pub entities: Vec<Entity>,
    pub rejected: Vec<RecordRejection>,
}

impl NormalizedBatch {
    /// Entity rows joined with their parent's source name, in batch order.
    pub fn mentions(&self) -> Vec<EntityMention> {
        self.entities
            .iter()
            .filter_map(|entity| {
                self.headlines
                    .get(entity.headline_pos)
                    .map(|headline| EntityMention {
                        source_name: headline.source_name.clone(),
                        text: entity.text.clone(),
                        label: entity.label.clone(),
                    })
            })
            .collect()
    }
}

/// Round a sentiment score to the store's two-decimal fixed-point precision, half away
/// from zero.
///
/// Rounds the shortest decimal representation of `value`, so `0.285` becomes `0.29`
/// even though the nearest `f64` lies just below the midpoint.
pub fn round_polarity(value: f64) -> f64 {
    if !value.is_finite() || value.abs() >= 1e15 {
        return value;
    }
    let text = value.abs().to_string();
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let Ok(whole) = whole.parse::<u64>() else {
        return value;
    };
    let frac = frac.as_bytes();
    let digit = |idx: usize| frac.get(idx).map_or(0, |b| u64::from(b - b'0'));

    let mut hundredths = whole * 100 + digit(0) * 10 + digit(1);
    if digit(2) >= 5 {
        hundredths += 1;
    }
    let rounded = hundredths as f64 / 100.0;
    if value.is_sign_negative() {
        -rounded
    } else {
        rounded
    }
}
