//! Pipeline configuration loaded from TOML.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Labels substituted for empty categorical values before encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UnknownLabels {
    pub gender: String,
    pub primary_opioid: String,
    pub alcohol_use: String,
}

impl Default for UnknownLabels {
    fn default() -> Self {
        Self {
            gender: "unknown".into(),
            primary_opioid: "unknown".into(),
            alcohol_use: "nan".into(),
        }
    }
}

impl UnknownLabels {
    /// Unknown label for a categorical field.
    pub fn for_field(&self, field: &str) -> &str {
        match field {
            "gender" => &self.gender,
            "primary_opioid" => &self.primary_opioid,
            "alcohol_use" => &self.alcohol_use,
            _ => "unknown",
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding model.json, scaler.json and label_encoders.json
    pub artifact_dir: PathBuf,
    /// Optional SQLite file journaling vocabulary extensions
    pub vocabulary_journal: Option<PathBuf>,
    /// Gender used when the input is neither male nor female
    pub default_gender: String,
    /// Drug used for `primary_opioid` when no medication is named
    pub default_opioid: String,
    /// Enables fuzzy potency lookup for misspelled drug names
    pub fuzzy_match_threshold: Option<f64>,
    pub unknown_labels: UnknownLabels,
    /// Extra or overriding MME conversion factors
    pub potency: BTreeMap<String, f64>,
    /// Extra brand → generic aliases
    pub aliases: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("ml_model"),
            vocabulary_journal: None,
            default_gender: "Female".into(),
            default_opioid: "Morphine".into(),
            fuzzy_match_threshold: None,
            unknown_labels: UnknownLabels::default(),
            potency: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Default configuration pointing at an artifact directory.
    pub fn with_artifact_dir<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            artifact_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. Relative paths resolve against the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Make relative paths absolute with respect to `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        if self.artifact_dir.is_relative() {
            self.artifact_dir = base.join(&self.artifact_dir);
        }
        if let Some(journal) = &self.vocabulary_journal {
            if journal.is_relative() {
                self.vocabulary_journal = Some(base.join(journal));
            }
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if let Some(threshold) = self.fuzzy_match_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "fuzzy_match_threshold must be in (0, 1], got {}",
                    threshold
                )));
            }
        }
        for (drug, factor) in &self.potency {
            if !factor.is_finite() || *factor < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "potency factor for '{}' must be a non-negative number, got {}",
                    drug, factor
                )));
            }
        }
        if self.default_opioid.trim().is_empty() {
            return Err(ConfigError::Invalid("default_opioid must not be empty".into()));
        }
        Ok(())
    }
}
