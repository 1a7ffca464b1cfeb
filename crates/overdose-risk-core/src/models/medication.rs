//! Medication models.

use serde::{Deserialize, Serialize};

/// Dosing frequency as entered by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Once,
    Twice,
    Thrice,
    /// Anything unrecognized; counted as once per day
    Other,
}

impl Frequency {
    /// Parse a frequency loosely (case-insensitive, trimmed).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "once" => Frequency::Once,
            "twice" => Frequency::Twice,
            "thrice" => Frequency::Thrice,
            _ => Frequency::Other,
        }
    }

    /// Administrations per day.
    pub fn times_per_day(self) -> f64 {
        match self {
            Frequency::Once | Frequency::Other => 1.0,
            Frequency::Twice => 2.0,
            Frequency::Thrice => 3.0,
        }
    }
}

/// A single current medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationEntry {
    /// Drug name as entered
    pub name: String,
    /// Dose per administration in mg
    pub dosage_mg: f64,
    pub frequency: Frequency,
}

/// Share of the total dose equivalence contributed by one entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrugContribution {
    pub name: String,
    /// Percentage of the total, rounded to 2 decimals
    pub percentage: f64,
}

/// Output of the medication aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationSummary {
    /// Potency-normalized daily total (MME)
    pub dose_equivalence_total: f64,
    /// Per-entry contribution, in input order
    pub per_drug_contribution: Vec<DrugContribution>,
    /// Representative drug used for the `primary_opioid` category
    pub primary_opioid: String,
}
