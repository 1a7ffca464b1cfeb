//! Overdose Risk Core Library
//!
//! Scores free-form clinical and medication input against a pre-trained
//! binary classifier.
//!
//! # Architecture
//!
//! ```text
//! Request body (JSON object)
//!         │
//!         ▼
//!    Normalizer ──── strict flags, finite numbers, training-time labels
//!         │
//!         ▼
//!    Medication Aggregator ──── MME total, per-drug contribution
//!         │
//!         ▼
//!    Categorical Encoder ◄──── VocabularyStore (append-only, journaled)
//!         │
//!         ▼
//!    Feature Vector (22 slots, fixed order)
//!         │
//!         ▼
//!    ┌────────────────────────────┐
//!    │  Artifacts                 │
//!    │  scaler → classifier       │
//!    └─────────────┬──────────────┘
//!                  │
//!                  ▼
//!    Result Shaper ──── {status, prediction{..., aliases}}
//! ```
//!
//! # Modules
//!
//! - [`pipeline`]: Normalizer, aggregator, encoder, feature builder, shaper
//! - [`artifacts`]: Scaler, classifier and artifact loading
//! - [`vocabulary`]: Append-only categorical vocabularies and their journal
//! - [`db`]: SQLite layer backing the vocabulary journal
//! - [`models`]: Domain types
//! - [`config`]: TOML pipeline configuration

pub mod artifacts;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod vocabulary;

// Re-export commonly used types
pub use artifacts::{ArtifactError, ArtifactSource, Artifacts, DirectorySource};
pub use config::{ConfigError, PipelineConfig};
pub use db::Database;
pub use models::{DrugContribution, MedicationSummary, NormalizedInput, PredictionResult};
pub use pipeline::{PipelineError, RiskPipeline, FEATURE_NAMES};
pub use vocabulary::{VocabularyError, VocabularyStore};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum RiskError {
    #[error("Artifact error: {0}")]
    ArtifactError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Vocabulary error: {0}")]
    VocabularyError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<PipelineError> for RiskError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Artifact(_) | PipelineError::ShapeMismatch { .. } => {
                RiskError::ArtifactError(e.to_string())
            }
            PipelineError::Vocabulary(_) => RiskError::VocabularyError(e.to_string()),
            PipelineError::InvalidInput(_) => RiskError::InvalidInput(e.to_string()),
        }
    }
}

impl From<ConfigError> for RiskError {
    fn from(e: ConfigError) -> Self {
        RiskError::ConfigError(e.to_string())
    }
}

impl From<VocabularyError> for RiskError {
    fn from(e: VocabularyError) -> Self {
        RiskError::VocabularyError(e.to_string())
    }
}

impl From<serde_json::Error> for RiskError {
    fn from(e: serde_json::Error) -> Self {
        RiskError::SerializationError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Load the artifacts in a directory with default settings.
#[uniffi::export]
pub fn open_pipeline(artifact_dir: String) -> Result<Arc<RiskScorer>, RiskError> {
    let config = PipelineConfig::with_artifact_dir(artifact_dir);
    let pipeline = RiskPipeline::from_config(&config)?;
    Ok(Arc::new(RiskScorer { pipeline }))
}

/// Load a pipeline from a TOML configuration document.
#[uniffi::export]
pub fn open_pipeline_with_config(config_toml: String) -> Result<Arc<RiskScorer>, RiskError> {
    let config = PipelineConfig::from_toml_str(&config_toml)?;
    let pipeline = RiskPipeline::from_config(&config)?;
    Ok(Arc::new(RiskScorer { pipeline }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe scoring handle for FFI.
#[derive(uniffi::Object)]
pub struct RiskScorer {
    pipeline: RiskPipeline,
}

#[uniffi::export]
impl RiskScorer {
    /// Score a JSON request body and return the response envelope as JSON.
    ///
    /// Failures are reported inside the envelope (`status: "error"`).
    pub fn score_json(&self, body: String) -> String {
        let response = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => self.pipeline.respond(&value),
            Err(e) => pipeline::error_response(&format!("Invalid JSON body: {}", e)),
        };
        response.to_string()
    }

    /// Score a JSON request body into a typed prediction.
    pub fn score(&self, body: String) -> Result<FfiPrediction, RiskError> {
        let value: serde_json::Value = serde_json::from_str(&body)?;
        let result = self.pipeline.score_value(&value)?;
        Ok(result.into())
    }

    /// Number of codes currently assigned for a categorical field.
    pub fn vocabulary_len(&self, field: String) -> Result<u32, RiskError> {
        let len = self.pipeline.artifacts().vocabularies().len(&field)?;
        Ok(len.unwrap_or(0) as u32)
    }

    /// Fingerprint of the loaded artifact set.
    pub fn artifact_fingerprint(&self) -> String {
        self.pipeline.artifacts().fingerprint().to_string()
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe drug contribution.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiContribution {
    pub name: String,
    pub percentage: f64,
}

impl From<DrugContribution> for FfiContribution {
    fn from(c: DrugContribution) -> Self {
        Self {
            name: c.name,
            percentage: c.percentage,
        }
    }
}

/// FFI-safe prediction.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrediction {
    pub label: u8,
    pub probability: f64,
    pub total_mme: f64,
    pub contributions: Vec<FfiContribution>,
    pub primary_opioid: String,
    pub artifact_fingerprint: String,
}

impl From<PredictionResult> for FfiPrediction {
    fn from(result: PredictionResult) -> Self {
        Self {
            label: result.label,
            probability: result.probability,
            total_mme: result.dose_equivalence_total,
            contributions: result
                .per_drug_contribution
                .into_iter()
                .map(|c| c.into())
                .collect(),
            primary_opioid: result.primary_opioid,
            artifact_fingerprint: result.artifact_fingerprint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_errors_map_to_ffi_kinds() {
        let shape = PipelineError::ShapeMismatch {
            stage: "scaler",
            expected: 22,
            actual: 21,
        };
        assert!(matches!(RiskError::from(shape), RiskError::ArtifactError(_)));

        let artifact = PipelineError::Artifact(ArtifactError::Invalid("bad".into()));
        assert!(matches!(RiskError::from(artifact), RiskError::ArtifactError(_)));

        let input = PipelineError::InvalidInput("feature 'daily_mme' is not a finite number".into());
        match RiskError::from(input) {
            RiskError::InvalidInput(msg) => assert!(msg.contains("daily_mme")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_config_errors_map_to_config_kind() {
        let err = ConfigError::Invalid("threshold must be within [0, 1]".into());
        assert!(matches!(RiskError::from(err), RiskError::ConfigError(_)));
    }
}
