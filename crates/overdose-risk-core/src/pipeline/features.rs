//! Canonical feature vector.

use serde::{Deserialize, Serialize};

use super::encoder::EncodedCategories;
use crate::models::NormalizedInput;

/// Feature names in the order the model was trained on.
///
/// Encoded categorical codes come last. Never reorder.
pub const FEATURE_NAMES: [&str; 22] = [
    "age",
    "weight_kg",
    "height_cm",
    "has_chronic_pain",
    "has_mental_health_dx",
    "history_of_substance_abuse",
    "liver_disease",
    "kidney_disease",
    "respiratory_disease",
    "daily_dosage_mg",
    "treatment_duration_months",
    "concurrent_benzos",
    "concurrent_muscle_relaxants",
    "concurrent_sleep_meds",
    "concurrent_antidepressants",
    "tobacco_use",
    "previous_overdose",
    "daily_mme",
    "risk_factors_count",
    "gender_encoded",
    "primary_opioid_encoded",
    "alcohol_use_encoded",
];

/// Fixed-width numeric vector fed to the scaler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    /// Assemble the vector from normalized input and encoded categories.
    ///
    /// A name neither source provides is 0.0.
    pub fn build(normalized: &NormalizedInput, encoded: &EncodedCategories) -> Self {
        let values = FEATURE_NAMES
            .iter()
            .map(|name| {
                normalized
                    .numeric(name)
                    .or_else(|| encoded.get(name))
                    .unwrap_or(0.0)
            })
            .collect();
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of a named slot.
    pub fn get(&self, name: &str) -> Option<f64> {
        let index = FEATURE_NAMES.iter().position(|n| *n == name)?;
        self.values.get(index).copied()
    }

    /// Name of the first slot holding NaN or infinity, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        FEATURE_NAMES
            .iter()
            .zip(&self.values)
            .find(|(_, v)| !v.is_finite())
            .map(|(name, _)| *name)
    }

    pub fn names() -> &'static [&'static str] {
        &FEATURE_NAMES
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
