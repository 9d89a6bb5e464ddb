use std::path::Path;

use anyhow::{Context, Result};
use newsdesk_core::FALLBACK_SOURCE_LABEL;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maps one path segment of a source origin to a human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRule {
    pub segment: String,
    pub label: String,
}

/// Ordered source canonicalization rules. The first rule whose segment appears in the
/// origin wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCatalog {
    pub sources: Vec<SourceRule>,
    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,
}

fn default_fallback_label() -> String {
    FALLBACK_SOURCE_LABEL.to_string()
}

impl Default for SourceCatalog {
    fn default() -> Self {
        let rules = [
            ("mundo", "BBC Spanish"),
            ("hindi", "BBC Hindi"),
            ("portuguese", "BBC Portuguese"),
            ("russian", "BBC Russian"),
            ("japanese", "BBC Japanese"),
            ("zhongwen", "BBC Chinese"),
        ];
        Self {
            sources: rules
                .into_iter()
                .map(|(segment, label)| SourceRule {
                    segment: segment.to_string(),
                    label: label.to_string(),
                })
                .collect(),
            fallback_label: default_fallback_label(),
        }
    }
}

impl SourceCatalog {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source catalog yaml")
    }

    /// Load `path`, or fall back to the built-in catalog when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no source catalog file; using built-in rules");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Canonical label for `origin`. Never fails: unmatched origins get the fallback.
    pub fn label_for(&self, origin: &str) -> &str {
        let segments = origin.split('/').collect::<Vec<_>>();
        self.sources
            .iter()
            .find(|rule| segments.contains(&rule.segment.as_str()))
            .map(|rule| rule.label.as_str())
            .unwrap_or(self.fallback_label.as_str())
    }
}
