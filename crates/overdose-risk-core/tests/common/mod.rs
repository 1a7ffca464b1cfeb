//! Shared fixtures: an artifact directory written to a temp dir.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use overdose_risk::artifacts::{MODEL_FILE, SCALER_FILE, VOCABULARY_FILE};
use overdose_risk::FEATURE_NAMES;
use serde_json::{json, Value};
use tempfile::TempDir;

/// Index of `daily_mme` in the feature vector.
pub const MME_INDEX: usize = 17;
/// Index of `previous_overdose` in the feature vector.
pub const OVERDOSE_INDEX: usize = 16;

/// Logistic model driven by daily MME and previous overdose.
pub fn model_json() -> Value {
    let mut coefficients = vec![0.0; FEATURE_NAMES.len()];
    coefficients[MME_INDEX] = 1.2;
    coefficients[OVERDOSE_INDEX] = 2.0;
    json!({
        "kind": "logistic_regression",
        "coefficients": coefficients,
        "intercept": -2.0,
        "threshold": 0.5,
        "feature_names": FEATURE_NAMES,
    })
}

/// Standard scaler; MME scaled by 100, everything else identity.
pub fn scaler_json() -> Value {
    let mut scale = vec![1.0; FEATURE_NAMES.len()];
    scale[MME_INDEX] = 100.0;
    json!({
        "kind": "standard",
        "mean": vec![0.0; FEATURE_NAMES.len()],
        "scale": scale,
    })
}

pub fn label_encoders_json() -> Value {
    json!({
        "gender": ["Female", "Male"],
        "primary_opioid": ["Codeine", "Fentanyl", "Hydrocodone", "Morphine", "Oxycodone"],
        "alcohol_use": ["Heavy", "Light", "Moderate", "nan"],
    })
}

pub fn write_artifacts(dir: &Path, model: &Value, scaler: &Value, encoders: &Value) {
    fs::write(dir.join(MODEL_FILE), model.to_string()).unwrap();
    fs::write(dir.join(SCALER_FILE), scaler.to_string()).unwrap();
    fs::write(dir.join(VOCABULARY_FILE), encoders.to_string()).unwrap();
}

/// Temp dir holding a complete, valid artifact set.
pub fn artifact_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path(), &model_json(), &scaler_json(), &label_encoders_json());
    dir
}
