//! Prediction models.

use serde::{Deserialize, Serialize};

use super::DrugContribution;

/// Raw classifier output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassifierOutput {
    /// 0 = low risk, 1 = elevated risk
    pub label: u8,
    /// Probability of the positive class, in [0, 1]
    pub probability: f64,
}

/// Final pipeline result before rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResult {
    pub label: u8,
    pub probability: f64,
    pub dose_equivalence_total: f64,
    pub per_drug_contribution: Vec<DrugContribution>,
    pub primary_opioid: String,
    /// SHA-256 of the artifact set that produced this score
    pub artifact_fingerprint: String,
}

impl PredictionResult {
    /// Whether the classifier flagged elevated risk.
    pub fn is_elevated(&self) -> bool {
        self.label == 1
    }
}
