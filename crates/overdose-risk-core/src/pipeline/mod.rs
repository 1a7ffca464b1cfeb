//! The scoring pipeline.
//!
//! Normalizer → Aggregator → Encoder → Builder → Scaler → Classifier → Shaper.
//! Each request runs synchronously through every stage; only the artifact
//! set (and its vocabularies) outlives a request.

mod encoder;
mod features;
mod medication;
mod normalizer;
mod shaper;

pub use encoder::*;
pub use features::*;
pub use medication::*;
pub use normalizer::*;
pub use shaper::*;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::artifacts::{ArtifactError, ArtifactSource, Artifacts, DirectorySource};
use crate::config::{PipelineConfig, UnknownLabels};
use crate::models::{
    ClassifierOutput, MedicationSummary, NormalizedInput, PredictionResult, RawInput,
};
use crate::vocabulary::{SqliteJournal, VocabularyError};

/// Pipeline errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Artifact error: {0}")]
    Artifact(ArtifactError),

    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),

    #[error("Shape mismatch in {stage}: expected {expected} features, got {actual}")]
    ShapeMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<ArtifactError> for PipelineError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::ShapeMismatch {
                stage,
                expected,
                actual,
            } => PipelineError::ShapeMismatch {
                stage,
                expected,
                actual,
            },
            ArtifactError::Vocabulary(e) => PipelineError::Vocabulary(e),
            other => PipelineError::Artifact(other),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Intermediate state of one request, up to the feature vector.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub normalized: NormalizedInput,
    pub summary: MedicationSummary,
    pub encoded: EncodedCategories,
    pub features: FeatureVector,
}

/// Scores request bodies against a loaded artifact set.
pub struct RiskPipeline {
    artifacts: Arc<Artifacts>,
    normalizer: Normalizer,
    aggregator: MedicationAggregator,
    unknown_labels: UnknownLabels,
}

impl RiskPipeline {
    /// Build a pipeline over already loaded artifacts.
    pub fn new(artifacts: Arc<Artifacts>, config: &PipelineConfig) -> Self {
        let mut potency = PotencyTable::new();
        for (drug, factor) in &config.potency {
            potency.add_factor(drug, *factor);
        }
        for (alias, generic) in &config.aliases {
            potency.add_alias(alias, generic);
        }
        potency.set_fuzzy_threshold(config.fuzzy_match_threshold);

        Self {
            artifacts,
            normalizer: Normalizer::new().with_default_gender(&config.default_gender),
            aggregator: MedicationAggregator::new(potency, &config.default_opioid),
            unknown_labels: config.unknown_labels.clone(),
        }
    }

    /// Load artifacts from `config.artifact_dir`, attaching the vocabulary
    /// journal when one is configured.
    pub fn from_config(config: &PipelineConfig) -> PipelineResult<Self> {
        let mut artifacts = DirectorySource::new(config.artifact_dir.clone()).load()?;

        if let Some(path) = &config.vocabulary_journal {
            let journal = SqliteJournal::open(path, artifacts.fingerprint())?;
            artifacts = artifacts.with_journal(Box::new(journal))?;
        }

        Ok(Self::new(Arc::new(artifacts), config))
    }

    pub fn artifacts(&self) -> &Arc<Artifacts> {
        &self.artifacts
    }

    /// Run every stage up to the (unscaled) feature vector.
    pub fn prepare(&self, raw: &RawInput) -> PipelineResult<PreparedRequest> {
        let mut normalized = self.normalizer.normalize(raw);
        debug!(
            gender = %normalized.gender,
            alcohol_use = %normalized.alcohol_use,
            risk_factors_count = normalized.risk_factors_count,
            "Normalized input"
        );

        let summary = self.aggregator.aggregate_input(raw, normalized.daily_mme);
        normalized.daily_mme = summary.dose_equivalence_total;
        debug!(
            total = summary.dose_equivalence_total,
            entries = summary.per_drug_contribution.len(),
            primary_opioid = %summary.primary_opioid,
            "Aggregated medications"
        );

        let encoder = CategoricalEncoder::new(self.artifacts.vocabularies(), &self.unknown_labels);
        let encoded = encoder.encode_all(&normalized, &summary.primary_opioid)?;

        let features = FeatureVector::build(&normalized, &encoded);
        if let Some(name) = features.first_non_finite() {
            return Err(PipelineError::InvalidInput(format!(
                "feature '{}' is not a finite number",
                name
            )));
        }
        debug!(width = features.len(), "Built feature vector");

        Ok(PreparedRequest {
            normalized,
            summary,
            encoded,
            features,
        })
    }

    /// Scale and classify a feature vector.
    pub fn classify(&self, features: &[f64]) -> PipelineResult<ClassifierOutput> {
        let output = self.artifacts.score(features)?;
        debug!(
            label = output.label,
            probability = output.probability,
            "Classified"
        );
        Ok(output)
    }

    /// Score one request body.
    pub fn score(&self, raw: &RawInput) -> PipelineResult<PredictionResult> {
        let prepared = self.prepare(raw)?;
        let output = self.classify(prepared.features.values())?;
        Ok(shape_result(
            output,
            prepared.summary,
            self.artifacts.fingerprint(),
        ))
    }

    /// Score a JSON value, which must be an object.
    pub fn score_value(&self, body: &Value) -> PipelineResult<PredictionResult> {
        match body {
            Value::Object(raw) => self.score(raw),
            _ => Err(PipelineError::InvalidInput(
                "request body must be a JSON object".into(),
            )),
        }
    }

    /// Score a JSON value and render the response envelope. Never fails.
    pub fn respond(&self, body: &Value) -> Value {
        match self.score_value(body) {
            Ok(result) => success_envelope(&result),
            Err(e) => error_response(&e.to_string()),
        }
    }
}
