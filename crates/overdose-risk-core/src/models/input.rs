//! Patient input models.

use serde::{Deserialize, Serialize};

/// Untyped request body as received from the caller.
pub type RawInput = serde_json::Map<String, serde_json::Value>;

/// Physiological and behavioral flags, in the order the model was trained on.
pub const RISK_FLAG_FIELDS: [&str; 12] = [
    "has_chronic_pain",
    "has_mental_health_dx",
    "history_of_substance_abuse",
    "liver_disease",
    "kidney_disease",
    "respiratory_disease",
    "concurrent_benzos",
    "concurrent_muscle_relaxants",
    "concurrent_sleep_meds",
    "concurrent_antidepressants",
    "tobacco_use",
    "previous_overdose",
];

/// Strict boolean risk flags after normalization.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskFlags {
    pub has_chronic_pain: bool,
    pub has_mental_health_dx: bool,
    pub history_of_substance_abuse: bool,
    pub liver_disease: bool,
    pub kidney_disease: bool,
    pub respiratory_disease: bool,
    pub concurrent_benzos: bool,
    pub concurrent_muscle_relaxants: bool,
    pub concurrent_sleep_meds: bool,
    pub concurrent_antidepressants: bool,
    pub tobacco_use: bool,
    pub previous_overdose: bool,
}

impl RiskFlags {
    /// Get a flag by its field name.
    pub fn get(&self, field: &str) -> Option<bool> {
        let value = match field {
            "has_chronic_pain" => self.has_chronic_pain,
            "has_mental_health_dx" => self.has_mental_health_dx,
            "history_of_substance_abuse" => self.history_of_substance_abuse,
            "liver_disease" => self.liver_disease,
            "kidney_disease" => self.kidney_disease,
            "respiratory_disease" => self.respiratory_disease,
            "concurrent_benzos" => self.concurrent_benzos,
            "concurrent_muscle_relaxants" => self.concurrent_muscle_relaxants,
            "concurrent_sleep_meds" => self.concurrent_sleep_meds,
            "concurrent_antidepressants" => self.concurrent_antidepressants,
            "tobacco_use" => self.tobacco_use,
            "previous_overdose" => self.previous_overdose,
            _ => return None,
        };
        Some(value)
    }

    /// Set a flag by its field name. Returns false for unknown fields.
    pub fn set(&mut self, field: &str, value: bool) -> bool {
        let slot = match field {
            "has_chronic_pain" => &mut self.has_chronic_pain,
            "has_mental_health_dx" => &mut self.has_mental_health_dx,
            "history_of_substance_abuse" => &mut self.history_of_substance_abuse,
            "liver_disease" => &mut self.liver_disease,
            "kidney_disease" => &mut self.kidney_disease,
            "respiratory_disease" => &mut self.respiratory_disease,
            "concurrent_benzos" => &mut self.concurrent_benzos,
            "concurrent_muscle_relaxants" => &mut self.concurrent_muscle_relaxants,
            "concurrent_sleep_meds" => &mut self.concurrent_sleep_meds,
            "concurrent_antidepressants" => &mut self.concurrent_antidepressants,
            "tobacco_use" => &mut self.tobacco_use,
            "previous_overdose" => &mut self.previous_overdose,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Number of flags that are set.
    pub fn count(&self) -> u32 {
        RISK_FLAG_FIELDS
            .iter()
            .filter(|f| self.get(f).unwrap_or(false))
            .count() as u32
    }
}

/// Input record after normalization. Every numeric field is finite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedInput {
    pub age: f64,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub daily_dosage_mg: f64,
    pub daily_mme: f64,
    pub treatment_duration_months: f64,
    pub risk_factors_count: f64,
    pub flags: RiskFlags,
    /// Training-time label ("Male" / "Female")
    pub gender: String,
    /// Training-time label ("Light", "Moderate", "Heavy" or "nan")
    pub alcohol_use: String,
}

impl NormalizedInput {
    /// Numeric view of a named field; flags read as 0.0 / 1.0.
    pub fn numeric(&self, field: &str) -> Option<f64> {
        let value = match field {
            "age" => self.age,
            "weight_kg" => self.weight_kg,
            "height_cm" => self.height_cm,
            "daily_dosage_mg" => self.daily_dosage_mg,
            "daily_mme" => self.daily_mme,
            "treatment_duration_months" => self.treatment_duration_months,
            "risk_factors_count" => self.risk_factors_count,
            other => return self.flags.get(other).map(|b| if b { 1.0 } else { 0.0 }),
        };
        Some(value)
    }
}
