//! Raw input normalizer.
//!
//! Handles:
//! - Numeric coercion (numeric strings, missing or garbage values → 0)
//! - Boolean coercion of the fixed risk-flag list
//! - Fallback recount of `risk_factors_count`
//! - Categorical mapping of `gender` and `alcohol_use` onto training labels

use std::collections::HashMap;

use serde_json::Value;

use crate::models::{NormalizedInput, RawInput, RiskFlags, RISK_FLAG_FIELDS};

/// Strings read as `true` (after trimming and lower-casing).
const TRUTHY_STRINGS: [&str; 5] = ["1", "true", "yes", "y", "t"];

/// Sentinel label the model was trained with for missing alcohol data.
pub const ALCOHOL_SENTINEL: &str = "nan";

/// Normalizer for raw request bodies.
pub struct Normalizer {
    /// Lower-cased input → training-time gender label
    gender_map: HashMap<String, String>,
    /// Lower-cased input → training-time alcohol label
    alcohol_map: HashMap<String, String>,
    /// Gender assigned to anything not in `gender_map`
    default_gender: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Create a normalizer with the training-time mappings.
    pub fn new() -> Self {
        Self {
            gender_map: Self::default_genders(),
            alcohol_map: Self::default_alcohol(),
            default_gender: "Female".into(),
        }
    }

    /// Override the gender used for unrecognized input.
    pub fn with_default_gender(mut self, gender: &str) -> Self {
        self.default_gender = gender.to_string();
        self
    }

    /// Normalize a raw request body. Never fails.
    pub fn normalize(&self, raw: &RawInput) -> NormalizedInput {
        let mut flags = RiskFlags::default();
        for field in RISK_FLAG_FIELDS {
            flags.set(field, coerce_bool(raw.get(field)));
        }

        let explicit_count = coerce_number(raw.get("risk_factors_count")).trunc();
        let risk_factors_count = if explicit_count == 0.0 {
            f64::from(flags.count())
        } else {
            explicit_count
        };

        NormalizedInput {
            age: coerce_number(raw.get("age")),
            weight_kg: prefer_number(raw, "weight_kg", "weight").trunc(),
            height_cm: prefer_number(raw, "height_cm", "height").trunc(),
            daily_dosage_mg: coerce_number(raw.get("daily_dosage_mg")),
            daily_mme: coerce_number(raw.get("daily_mme")),
            treatment_duration_months: coerce_number(raw.get("treatment_duration_months")).trunc(),
            risk_factors_count,
            flags,
            gender: self.normalize_gender(raw.get("gender")),
            alcohol_use: self.normalize_alcohol(raw.get("alcohol_use")),
        }
    }

    /// Map a raw gender onto "Male" / "Female" / the default.
    pub fn normalize_gender(&self, value: Option<&Value>) -> String {
        let key = category_key(value);
        self.gender_map
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default_gender.clone())
    }

    /// Map a raw alcohol-use answer onto the training labels.
    pub fn normalize_alcohol(&self, value: Option<&Value>) -> String {
        let key = category_key(value);
        self.alcohol_map
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ALCOHOL_SENTINEL.to_string())
    }

    fn default_genders() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("male".into(), "Male".into());
        map.insert("female".into(), "Female".into());
        map
    }

    fn default_alcohol() -> HashMap<String, String> {
        let mut map = HashMap::new();

        // No data
        map.insert("none".into(), ALCOHOL_SENTINEL.into());
        map.insert("no".into(), ALCOHOL_SENTINEL.into());
        map.insert("nil".into(), ALCOHOL_SENTINEL.into());
        map.insert("".into(), ALCOHOL_SENTINEL.into());

        // Trained levels
        map.insert("light".into(), "Light".into());
        map.insert("moderate".into(), "Moderate".into());
        map.insert("heavy".into(), "Heavy".into());

        map
    }
}

/// Coerce any JSON value to a finite number; anything unusable is 0.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    };
    if number.is_finite() {
        number
    } else {
        0.0
    }
}

/// Coerce a JSON value to a strict boolean.
///
/// Strings are true only for `1`, `true`, `yes`, `y`, `t` (any case,
/// surrounding whitespace ignored). Other values use truthiness.
pub fn coerce_bool(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => TRUTHY_STRINGS.contains(&s.trim().to_lowercase().as_str()),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// First nonzero of the preferred and fallback keys.
fn prefer_number(raw: &RawInput, preferred: &str, fallback: &str) -> f64 {
    let primary = coerce_number(raw.get(preferred));
    if primary != 0.0 {
        primary
    } else {
        coerce_number(raw.get(fallback))
    }
}

/// Lower-cased, trimmed text of a categorical value; missing/null is "".
fn category_key(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_lowercase(),
        Some(other) => other.to_string().trim().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawInput {
        match value {
            Value::Object(map) => map,
            _ => panic!("test input must be an object"),
        }
    }

    #[test]
    fn test_truthy_strings() {
        for s in ["1", "true", "TRUE", " yes ", "Y", "t", "\tTrue\n"] {
            assert!(coerce_bool(Some(&json!(s))), "{:?} should be true", s);
        }
        for s in ["0", "false", "no", "", "maybe", "2", "on"] {
            assert!(!coerce_bool(Some(&json!(s))), "{:?} should be false", s);
        }
    }

    #[test]
    fn test_non_string_truthiness() {
        assert!(coerce_bool(Some(&json!(true))));
        assert!(coerce_bool(Some(&json!(1))));
        assert!(coerce_bool(Some(&json!(0.5))));
        assert!(coerce_bool(Some(&json!([1]))));
        assert!(!coerce_bool(Some(&json!(false))));
        assert!(!coerce_bool(Some(&json!(0))));
        assert!(!coerce_bool(Some(&json!([]))));
        assert!(!coerce_bool(Some(&json!({}))));
        assert!(!coerce_bool(Some(&Value::Null)));
        assert!(!coerce_bool(None));
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(Some(&json!(42))), 42.0);
        assert_eq!(coerce_number(Some(&json!("  12.5 "))), 12.5);
        assert_eq!(coerce_number(Some(&json!("abc"))), 0.0);
        assert_eq!(coerce_number(Some(&json!("NaN"))), 0.0);
        assert_eq!(coerce_number(Some(&json!("inf"))), 0.0);
        assert_eq!(coerce_number(Some(&json!(true))), 1.0);
        assert_eq!(coerce_number(Some(&json!([3]))), 0.0);
        assert_eq!(coerce_number(None), 0.0);
    }

    #[test]
    fn test_weight_prefers_explicit_kg() {
        let normalizer = Normalizer::new();

        let input = normalizer.normalize(&raw(json!({"weight_kg": 70, "weight": "90"})));
        assert_eq!(input.weight_kg, 70.0);

        let input = normalizer.normalize(&raw(json!({"weight": "90"})));
        assert_eq!(input.weight_kg, 90.0);

        let input = normalizer.normalize(&raw(json!({"weight_kg": "", "weight": 81.7})));
        assert_eq!(input.weight_kg, 81.0);

        let input = normalizer.normalize(&raw(json!({"height": "x"})));
        assert_eq!(input.height_cm, 0.0);
    }

    #[test]
    fn test_missing_numerics_default_to_zero() {
        let input = Normalizer::new().normalize(&RawInput::new());

        assert_eq!(input.age, 0.0);
        assert_eq!(input.daily_dosage_mg, 0.0);
        assert_eq!(input.daily_mme, 0.0);
        assert_eq!(input.treatment_duration_months, 0.0);
        assert_eq!(input.risk_factors_count, 0.0);
        assert_eq!(input.flags, RiskFlags::default());
    }

    #[test]
    fn test_invalid_duration_defaults_to_zero() {
        let input = Normalizer::new()
            .normalize(&raw(json!({"treatment_duration_months": "six", "daily_dosage_mg": {}})));
        assert_eq!(input.treatment_duration_months, 0.0);
        assert_eq!(input.daily_dosage_mg, 0.0);
    }

    #[test]
    fn test_risk_factor_recount() {
        let input = Normalizer::new().normalize(&raw(json!({
            "has_chronic_pain": "yes",
            "tobacco_use": true,
            "previous_overdose": "0",
            "liver_disease": 1,
            "risk_factors_count": 0
        })));
        assert_eq!(input.risk_factors_count, 3.0);
    }

    #[test]
    fn test_explicit_risk_factor_count_kept() {
        let input = Normalizer::new().normalize(&raw(json!({
            "has_chronic_pain": true,
            "risk_factors_count": "5"
        })));
        assert_eq!(input.risk_factors_count, 5.0);
    }

    #[test]
    fn test_gender_mapping() {
        let normalizer = Normalizer::new();
        assert_eq!(normalizer.normalize_gender(Some(&json!("male"))), "Male");
        assert_eq!(normalizer.normalize_gender(Some(&json!(" MALE "))), "Male");
        assert_eq!(normalizer.normalize_gender(Some(&json!("Female"))), "Female");
        assert_eq!(normalizer.normalize_gender(Some(&json!("other"))), "Female");
        assert_eq!(normalizer.normalize_gender(None), "Female");

        let custom = Normalizer::new().with_default_gender("Male");
        assert_eq!(custom.normalize_gender(Some(&json!("x"))), "Male");
    }

    #[test]
    fn test_alcohol_mapping() {
        let normalizer = Normalizer::new();
        assert_eq!(normalizer.normalize_alcohol(Some(&json!("none"))), "nan");
        assert_eq!(normalizer.normalize_alcohol(Some(&json!("No"))), "nan");
        assert_eq!(normalizer.normalize_alcohol(Some(&json!("NIL"))), "nan");
        assert_eq!(normalizer.normalize_alcohol(Some(&json!(""))), "nan");
        assert_eq!(normalizer.normalize_alcohol(None), "nan");
        assert_eq!(normalizer.normalize_alcohol(Some(&json!("light"))), "Light");
        assert_eq!(normalizer.normalize_alcohol(Some(&json!("Moderate"))), "Moderate");
        assert_eq!(normalizer.normalize_alcohol(Some(&json!(" HEAVY"))), "Heavy");
        assert_eq!(normalizer.normalize_alcohol(Some(&json!("daily"))), "nan");
        assert_eq!(normalizer.normalize_alcohol(Some(&json!(3))), "nan");
    }
}
