//! Medication list aggregation into morphine milligram equivalents (MME).
//!
//! Per entry: `dosage_mg × potency_factor × times_per_day`. Malformed
//! entries are skipped, never fatal.

use std::collections::BTreeMap;

use serde_json::Value;
use strsim::{jaro_winkler, normalized_levenshtein};
use tracing::warn;

use crate::models::{DrugContribution, Frequency, MedicationEntry, MedicationSummary, RawInput};

/// Request key holding the medication list.
pub const MEDICATIONS_KEY: &str = "currentMedications";

/// Factor applied to drugs missing from the table.
const UNLISTED_FACTOR: f64 = 1.0;

/// Potency table: drug name → MME conversion factor.
///
/// Lookups are case-insensitive; brand names resolve through aliases.
pub struct PotencyTable {
    /// Lower-cased generic name → factor
    factors: BTreeMap<String, f64>,
    /// Lower-cased brand/alias → lower-cased generic name
    aliases: BTreeMap<String, String>,
    /// Minimum similarity for fuzzy matching; `None` disables it
    fuzzy_threshold: Option<f64>,
}

impl Default for PotencyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PotencyTable {
    /// Create a table with the standard conversion factors.
    pub fn new() -> Self {
        Self {
            factors: Self::default_factors(),
            aliases: Self::default_aliases(),
            fuzzy_threshold: None,
        }
    }

    /// Factor for a drug name; unlisted names get 1.0.
    pub fn factor(&self, name: &str) -> f64 {
        self.resolve(name)
            .and_then(|generic| self.factors.get(&generic).copied())
            .unwrap_or(UNLISTED_FACTOR)
    }

    /// Resolve a name to the generic key it is priced under, if any.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let lower = name.trim().to_lowercase();
        if self.factors.contains_key(&lower) {
            return Some(lower);
        }
        if let Some(generic) = self.aliases.get(&lower) {
            return Some(generic.clone());
        }
        let threshold = self.fuzzy_threshold?;
        self.fuzzy_resolve(&lower, threshold)
    }

    /// Add or override a conversion factor.
    pub fn add_factor(&mut self, name: &str, factor: f64) {
        self.factors.insert(name.trim().to_lowercase(), factor);
    }

    /// Add a brand/alias mapping.
    pub fn add_alias(&mut self, alias: &str, generic: &str) {
        self.aliases
            .insert(alias.trim().to_lowercase(), generic.trim().to_lowercase());
    }

    /// Enable (or disable with `None`) fuzzy matching of misspelled names.
    pub fn set_fuzzy_threshold(&mut self, threshold: Option<f64>) {
        self.fuzzy_threshold = threshold;
    }

    /// Best fuzzy candidate among generics and aliases, ties broken by name.
    fn fuzzy_resolve(&self, query: &str, threshold: f64) -> Option<String> {
        let generics = self.factors.keys().map(|k| (k.as_str(), k.as_str()));
        let aliases = self.aliases.iter().map(|(a, g)| (a.as_str(), g.as_str()));

        let mut best: Option<(f64, &str)> = None;
        for (candidate, generic) in generics.chain(aliases) {
            let score = fuzzy_match(query, candidate);
            if score < threshold {
                continue;
            }
            match best {
                Some((best_score, _)) if best_score >= score => {}
                _ => best = Some((score, generic)),
            }
        }
        best.map(|(_, generic)| generic.to_string())
    }

    /// Standard oral MME conversion factors.
    fn default_factors() -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("morphine".into(), 1.0);
        map.insert("hydrocodone".into(), 1.0);
        map.insert("oxycodone".into(), 1.5);
        map.insert("hydromorphone".into(), 4.0);
        map.insert("fentanyl".into(), 100.0);
        map.insert("codeine".into(), 0.15);
        map.insert("tramadol".into(), 0.1);
        map
    }

    /// Brand names → generic.
    fn default_aliases() -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();

        // Morphine
        map.insert("ms contin".into(), "morphine".into());
        map.insert("kadian".into(), "morphine".into());

        // Hydrocodone
        map.insert("vicodin".into(), "hydrocodone".into());
        map.insert("norco".into(), "hydrocodone".into());
        map.insert("lortab".into(), "hydrocodone".into());
        map.insert("hysingla".into(), "hydrocodone".into());

        // Oxycodone
        map.insert("oxycontin".into(), "oxycodone".into());
        map.insert("percocet".into(), "oxycodone".into());
        map.insert("roxicodone".into(), "oxycodone".into());

        // Hydromorphone
        map.insert("dilaudid".into(), "hydromorphone".into());
        map.insert("exalgo".into(), "hydromorphone".into());

        // Fentanyl
        map.insert("duragesic".into(), "fentanyl".into());
        map.insert("actiq".into(), "fentanyl".into());

        // Codeine
        map.insert("tylenol #3".into(), "codeine".into());
        map.insert("tylenol with codeine".into(), "codeine".into());

        // Tramadol
        map.insert("ultram".into(), "tramadol".into());
        map.insert("conzip".into(), "tramadol".into());

        map
    }
}

/// Aggregates a medication list into dose equivalence and contributions.
pub struct MedicationAggregator {
    potency: PotencyTable,
    /// Representative drug when no entry names one
    default_opioid: String,
}

impl Default for MedicationAggregator {
    fn default() -> Self {
        Self::new(PotencyTable::new(), "Morphine")
    }
}

impl MedicationAggregator {
    pub fn new(potency: PotencyTable, default_opioid: &str) -> Self {
        Self {
            potency,
            default_opioid: default_opioid.to_string(),
        }
    }

    pub fn potency(&self) -> &PotencyTable {
        &self.potency
    }

    /// Aggregate the medication list of a request body.
    ///
    /// When the body has no list, `reported_mme` (the caller-supplied
    /// `daily_mme`) is carried through as the total.
    pub fn aggregate_input(&self, raw: &RawInput, reported_mme: f64) -> MedicationSummary {
        match raw.get(MEDICATIONS_KEY) {
            Some(Value::Array(items)) => self.aggregate(items),
            _ => MedicationSummary {
                dose_equivalence_total: reported_mme,
                per_drug_contribution: Vec::new(),
                primary_opioid: self.default_opioid.clone(),
            },
        }
    }

    /// Aggregate raw medication entries.
    ///
    /// An entry whose equivalence would make the total non-finite is
    /// skipped like a malformed one.
    pub fn aggregate(&self, items: &[Value]) -> MedicationSummary {
        let mut entries: Vec<MedicationEntry> = Vec::with_capacity(items.len());
        let mut running = 0.0;
        for (index, item) in items.iter().enumerate() {
            let entry = match parse_entry(item) {
                Ok(entry) => entry,
                Err(reason) => {
                    warn!(index, reason, "Skipping medication entry");
                    continue;
                }
            };
            let total = running + self.equivalence(&entry);
            if !total.is_finite() {
                warn!(
                    index,
                    reason = "dose equivalence out of range",
                    "Skipping medication entry"
                );
                continue;
            }
            running = total;
            entries.push(entry);
        }

        let (dose_equivalence_total, per_drug_contribution) = self.aggregate_entries(&entries);

        MedicationSummary {
            dose_equivalence_total,
            per_drug_contribution,
            primary_opioid: self.representative_name(items),
        }
    }

    /// Total MME and per-entry percentages for parsed entries.
    pub fn aggregate_entries(&self, entries: &[MedicationEntry]) -> (f64, Vec<DrugContribution>) {
        let equivalences: Vec<f64> = entries.iter().map(|e| self.equivalence(e)).collect();
        let total: f64 = equivalences.iter().sum();

        let contributions = entries
            .iter()
            .zip(&equivalences)
            .map(|(entry, mme)| DrugContribution {
                name: entry.name.clone(),
                percentage: if total > 0.0 {
                    round2(mme / total * 100.0)
                } else {
                    0.0
                },
            })
            .collect();

        (total, contributions)
    }

    /// MME of a single entry.
    pub fn equivalence(&self, entry: &MedicationEntry) -> f64 {
        entry.dosage_mg * self.potency.factor(&entry.name) * entry.frequency.times_per_day()
    }

    /// Last entry's name, else the first entry's, else the default.
    pub fn representative_name(&self, items: &[Value]) -> String {
        items
            .last()
            .and_then(entry_name)
            .or_else(|| items.first().and_then(entry_name))
            .unwrap_or_else(|| self.default_opioid.clone())
    }
}

/// Parse one raw entry; the error says why it was skipped.
pub fn parse_entry(item: &Value) -> Result<MedicationEntry, &'static str> {
    let object = item.as_object().ok_or("entry is not an object")?;
    let name = entry_name(item).ok_or("missing name")?;

    let dosage_mg = match object.get("dosage") {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().ok_or("non-numeric dosage")?,
        Some(Value::String(s)) if s.trim().is_empty() => 0.0,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| "non-numeric dosage")?,
        Some(_) => return Err("non-numeric dosage"),
    };
    if !dosage_mg.is_finite() {
        return Err("non-numeric dosage");
    }
    if dosage_mg < 0.0 {
        return Err("dosage out of range");
    }

    let frequency = match object.get("frequency") {
        Some(Value::String(s)) => Frequency::parse(s),
        _ => Frequency::Other,
    };

    Ok(MedicationEntry {
        name,
        dosage_mg,
        frequency,
    })
}

fn entry_name(item: &Value) -> Option<String> {
    let name = item.get("name")?.as_str()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Blend of Jaro-Winkler (typos, prefixes) and normalized Levenshtein.
fn fuzzy_match(a: &str, b: &str) -> f64 {
    jaro_winkler(a, b) * 0.6 + normalized_levenshtein(a, b) * 0.4
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            _ => panic!("test input must be an array"),
        }
    }

    #[test]
    fn test_potency_lookup() {
        let table = PotencyTable::new();
        assert_eq!(table.factor("Fentanyl"), 100.0);
        assert_eq!(table.factor("fentanyl"), 100.0);
        assert_eq!(table.factor("Oxycodone"), 1.5);
        assert_eq!(table.factor("Codeine"), 0.15);
        assert_eq!(table.factor("Tramadol"), 0.1);
        assert_eq!(table.factor("Ibuprofen"), 1.0);
    }

    #[test]
    fn test_brand_aliases() {
        let table = PotencyTable::new();
        assert_eq!(table.factor("OxyContin"), 1.5);
        assert_eq!(table.factor("Dilaudid"), 4.0);
        assert_eq!(table.factor("Duragesic"), 100.0);
        assert_eq!(table.resolve("Vicodin"), Some("hydrocodone".to_string()));
    }

    #[test]
    fn test_custom_factor_and_alias() {
        let mut table = PotencyTable::new();
        table.add_factor("Tapentadol", 0.4);
        table.add_alias("Nucynta", "Tapentadol");
        assert_eq!(table.factor("nucynta"), 0.4);

        table.add_factor("Morphine", 1.2);
        assert_eq!(table.factor("Morphine"), 1.2);
    }

    #[test]
    fn test_fuzzy_disabled_by_default() {
        let table = PotencyTable::new();
        assert_eq!(table.factor("Fentanil"), 1.0);
    }

    #[test]
    fn test_fuzzy_matches_misspelling() {
        let mut table = PotencyTable::new();
        table.set_fuzzy_threshold(Some(0.85));
        assert_eq!(table.resolve("Fentanil"), Some("fentanyl".to_string()));
        assert_eq!(table.factor("hydromorphon"), 4.0);
        // Nothing close enough
        assert_eq!(table.factor("Acetaminophen"), 1.0);
    }

    #[test]
    fn test_fuzzy_match_scores() {
        assert!(fuzzy_match("fentanyl", "fentanyl") > 0.99);
        assert!(fuzzy_match("fentanyl", "fentanil") > 0.85);
        assert!(fuzzy_match("fentanyl", "codeine") < 0.5);
    }

    #[test]
    fn test_single_fentanyl_entry() {
        let aggregator = MedicationAggregator::default();
        let summary = aggregator.aggregate(&items(json!([
            {"name": "Fentanyl", "dosage": 50, "frequency": "twice"}
        ])));

        assert_eq!(summary.dose_equivalence_total, 10000.0);
        assert_eq!(
            summary.per_drug_contribution,
            vec![DrugContribution {
                name: "Fentanyl".into(),
                percentage: 100.0,
            }]
        );
        assert_eq!(summary.primary_opioid, "Fentanyl");
    }

    #[test]
    fn test_mixed_entries() {
        let aggregator = MedicationAggregator::default();
        let summary = aggregator.aggregate(&items(json!([
            {"name": "Morphine", "dosage": "30", "frequency": "thrice"},
            {"name": "Oxycodone", "dosage": 10, "frequency": "Twice"},
            {"name": "Tramadol", "dosage": 50, "frequency": "as needed"}
        ])));

        // 90 + 30 + 5
        assert_eq!(summary.dose_equivalence_total, 125.0);
        let pct: Vec<f64> = summary.per_drug_contribution.iter().map(|c| c.percentage).collect();
        assert_eq!(pct, vec![72.0, 24.0, 4.0]);
        assert_eq!(summary.primary_opioid, "Tramadol");
    }

    #[test]
    fn test_percentages_rounded() {
        let aggregator = MedicationAggregator::default();
        let summary = aggregator.aggregate(&items(json!([
            {"name": "Morphine", "dosage": 10, "frequency": "once"},
            {"name": "Morphine", "dosage": 10, "frequency": "once"},
            {"name": "Morphine", "dosage": 10, "frequency": "once"}
        ])));
        for c in &summary.per_drug_contribution {
            assert_eq!(c.percentage, 33.33);
        }
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let aggregator = MedicationAggregator::default();
        let summary = aggregator.aggregate(&items(json!([
            {"name": "Morphine", "dosage": "lots", "frequency": "once"},
            {"dosage": 10, "frequency": "once"},
            "Oxycodone 10mg",
            {"name": "Codeine", "dosage": 100, "frequency": "once"}
        ])));

        assert!((summary.dose_equivalence_total - 15.0).abs() < 1e-9);
        assert_eq!(summary.per_drug_contribution.len(), 1);
        assert_eq!(summary.per_drug_contribution[0].name, "Codeine");
        assert_eq!(summary.per_drug_contribution[0].percentage, 100.0);
    }

    #[test]
    fn test_zero_total_gives_zero_percentages() {
        let aggregator = MedicationAggregator::default();
        let summary = aggregator.aggregate(&items(json!([
            {"name": "Morphine", "frequency": "once"},
            {"name": "Codeine", "dosage": "", "frequency": "twice"}
        ])));

        assert_eq!(summary.dose_equivalence_total, 0.0);
        assert!(summary.per_drug_contribution.iter().all(|c| c.percentage == 0.0));
        assert_eq!(summary.per_drug_contribution.len(), 2);
    }

    #[test]
    fn test_empty_list_defaults() {
        let aggregator = MedicationAggregator::default();
        let summary = aggregator.aggregate(&[]);

        assert_eq!(summary.dose_equivalence_total, 0.0);
        assert!(summary.per_drug_contribution.is_empty());
        assert_eq!(summary.primary_opioid, "Morphine");
    }

    #[test]
    fn test_representative_prefers_last_then_first() {
        let aggregator = MedicationAggregator::default();

        let list = items(json!([{"name": "Codeine"}, {"name": "Oxycodone"}]));
        assert_eq!(aggregator.representative_name(&list), "Oxycodone");

        let list = items(json!([{"name": "Codeine"}, {"name": ""}]));
        assert_eq!(aggregator.representative_name(&list), "Codeine");

        let list = items(json!([{"dosage": 5}, {"dosage": 5}]));
        assert_eq!(aggregator.representative_name(&list), "Morphine");
    }

    #[test]
    fn test_missing_list_carries_reported_mme() {
        let aggregator = MedicationAggregator::default();
        let raw = json!({"daily_mme": 45.0});
        let summary = aggregator.aggregate_input(raw.as_object().unwrap(), 45.0);

        assert_eq!(summary.dose_equivalence_total, 45.0);
        assert!(summary.per_drug_contribution.is_empty());
        assert_eq!(summary.primary_opioid, "Morphine");
    }

    #[test]
    fn test_empty_list_overrides_reported_mme() {
        let aggregator = MedicationAggregator::default();
        let raw = json!({"daily_mme": 45.0, "currentMedications": []});
        let summary = aggregator.aggregate_input(raw.as_object().unwrap(), 45.0);

        assert_eq!(summary.dose_equivalence_total, 0.0);
    }

    #[test]
    fn test_negative_dosage_out_of_range() {
        assert_eq!(
            parse_entry(&json!({"name": "Morphine", "dosage": -5})),
            Err("dosage out of range")
        );
        assert_eq!(
            parse_entry(&json!({"name": "Morphine", "dosage": "abc"})),
            Err("non-numeric dosage")
        );
    }

    #[test]
    fn test_overflowing_equivalence_skipped() {
        let aggregator = MedicationAggregator::default();
        let summary = aggregator.aggregate(&items(json!([
            {"name": "Fentanyl", "dosage": 1e307, "frequency": "thrice"},
            {"name": "Morphine", "dosage": 10, "frequency": "once"}
        ])));

        assert_eq!(summary.dose_equivalence_total, 10.0);
        assert_eq!(
            summary.per_drug_contribution,
            vec![DrugContribution {
                name: "Morphine".into(),
                percentage: 100.0,
            }]
        );
    }

    #[test]
    fn test_overflowing_sum_skips_later_entry() {
        let aggregator = MedicationAggregator::default();
        let summary = aggregator.aggregate(&items(json!([
            {"name": "Morphine", "dosage": 1e308, "frequency": "once"},
            {"name": "Hydromorphone", "dosage": 1e308, "frequency": "once"}
        ])));

        assert!(summary.dose_equivalence_total.is_finite());
        assert_eq!(summary.per_drug_contribution.len(), 1);
        assert_eq!(summary.per_drug_contribution[0].percentage, 100.0);
    }
}
