//! Result shaping and response envelopes.
//!
//! Canonical keys are written first, then every alias in [`FIELD_ALIASES`]
//! is copied from its canonical key. Supporting a new consumer means adding
//! a row to the table.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::models::{ClassifierOutput, MedicationSummary, PredictionResult};

/// Canonical output key → alias key.
pub const FIELD_ALIASES: [(&str, &str); 2] = [
    ("risk_probability", "overallRisk"),
    ("daily_mme", "totalMME"),
];

/// Combine classifier output with the medication summary.
pub fn shape_result(
    output: ClassifierOutput,
    summary: MedicationSummary,
    artifact_fingerprint: &str,
) -> PredictionResult {
    PredictionResult {
        label: output.label,
        probability: output.probability,
        dose_equivalence_total: summary.dose_equivalence_total,
        per_drug_contribution: summary.per_drug_contribution,
        primary_opioid: summary.primary_opioid,
        artifact_fingerprint: artifact_fingerprint.to_string(),
    }
}

/// Render the `prediction` object, aliases included.
pub fn render_prediction(result: &PredictionResult) -> Value {
    let contributions: Vec<Value> = result
        .per_drug_contribution
        .iter()
        .map(|c| json!({ "name": c.name, "value": c.percentage }))
        .collect();

    let mut map = Map::new();
    map.insert("prediction".into(), json!(result.label));
    map.insert("risk_probability".into(), json!(result.probability));
    map.insert("daily_mme".into(), json!(result.dose_equivalence_total));
    map.insert("medicine_contribution".into(), Value::Array(contributions));
    map.insert("primary_opioid".into(), json!(result.primary_opioid));
    map.insert("artifact_fingerprint".into(), json!(result.artifact_fingerprint));

    apply_aliases(&mut map);
    Value::Object(map)
}

/// Copy each canonical key present in `map` to its alias.
pub fn apply_aliases(map: &mut Map<String, Value>) {
    for (canonical, alias) in FIELD_ALIASES {
        if let Some(value) = map.get(canonical).cloned() {
            map.insert(alias.to_string(), value);
        }
    }
}

/// Success envelope with a fresh request id and the current time.
pub fn success_envelope(result: &PredictionResult) -> Value {
    success_response(result, Uuid::new_v4(), Utc::now())
}

/// Success envelope with explicit identity and timestamp.
pub fn success_response(
    result: &PredictionResult,
    request_id: Uuid,
    scored_at: DateTime<Utc>,
) -> Value {
    json!({
        "status": "success",
        "request_id": request_id.to_string(),
        "scored_at": scored_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        "prediction": render_prediction(result),
    })
}

/// Error envelope.
pub fn error_response(detail: &str) -> Value {
    json!({ "status": "error", "detail": detail })
}
