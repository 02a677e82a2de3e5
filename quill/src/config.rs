//! Search configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all) gives
//! the stock palette behaviour.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Field weights for fuzzy scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub title: f64,
    pub content: f64,
    pub category: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self { title: 0.7, content: 0.3, category: 0.2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Vocabulary and tag threshold (0 = perfect match only, 1 = anything)
    pub threshold: f64,
    /// Article bodies are long and noisy, so they get a looser threshold
    pub article_threshold: f64,
    /// How far from `location` a match may sit before it is fully penalized
    pub distance: usize,
    /// Expected character offset of a match
    pub location: usize,
    /// Threshold for the per-result highlight pass
    pub highlight_threshold: f64,
    pub weights: FieldWeights,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            article_threshold: 0.6,
            distance: 100,
            location: 0,
            highlight_threshold: 0.6,
            weights: FieldWeights::default(),
        }
    }
}

/// Preview window around the first match in an article body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub window: usize,
    pub before: usize,
    pub after: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { window: 150, before: 60, after: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub debounce_ms: u64,
    /// Top-level tag category whose tags hold vocabulary entries
    pub vocabulary_category_id: i64,
    /// Row cap for the storage-side article search
    pub article_limit: usize,
    pub fetch_timeout_ms: u64,
    pub preview: PreviewConfig,
    pub fuzzy: FuzzyConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            vocabulary_category_id: 1,
            article_limit: 50,
            fetch_timeout_ms: 5_000,
            preview: PreviewConfig::default(),
            fuzzy: FuzzyConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Load a JSON config file; absent fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("fuzzy.threshold", self.fuzzy.threshold),
            ("fuzzy.article_threshold", self.fuzzy.article_threshold),
            ("fuzzy.highlight_threshold", self.fuzzy.highlight_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid { field, reason: format!("{} is outside 0..=1", value) });
            }
        }
        if self.article_limit == 0 {
            return Err(ConfigError::Invalid { field: "article_limit", reason: "must be positive".into() });
        }
        if self.preview.window == 0 {
            return Err(ConfigError::Invalid { field: "preview.window", reason: "must be positive".into() });
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
