//! Categorical encoding against the shared vocabulary store.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::UnknownLabels;
use crate::models::NormalizedInput;
use crate::vocabulary::{VocabularyResult, VocabularyStore};

/// Categorical fields, in feature-vector order.
pub const CATEGORICAL_FIELDS: [&str; 3] = ["gender", "primary_opioid", "alcohol_use"];

/// Integer codes of one request's categorical values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncodedCategories {
    pub gender: i64,
    pub primary_opioid: i64,
    pub alcohol_use: i64,
}

impl EncodedCategories {
    /// Code by feature name (`gender_encoded`, ...).
    pub fn get(&self, feature: &str) -> Option<f64> {
        let code = match feature {
            "gender_encoded" => self.gender,
            "primary_opioid_encoded" => self.primary_opioid,
            "alcohol_use_encoded" => self.alcohol_use,
            _ => return None,
        };
        Some(code as f64)
    }
}

/// Encodes categorical values, extending vocabularies with unseen values.
pub struct CategoricalEncoder<'a> {
    store: &'a VocabularyStore,
    unknown_labels: &'a UnknownLabels,
}

impl<'a> CategoricalEncoder<'a> {
    pub fn new(store: &'a VocabularyStore, unknown_labels: &'a UnknownLabels) -> Self {
        Self {
            store,
            unknown_labels,
        }
    }

    /// Code for `value` in `field`.
    ///
    /// Empty values and fields without fitted classes encode the field's
    /// unknown label.
    pub fn encode(&self, field: &str, value: &str) -> VocabularyResult<i64> {
        let value = value.trim();
        let label = if value.is_empty() || !self.store.is_fitted(field) {
            self.unknown_labels.for_field(field)
        } else {
            value
        };

        let code = self.store.lookup_or_insert(field, label)?;
        debug!(field, label, code, "Encoded categorical value");
        Ok(code)
    }

    /// Encode every categorical field of a request.
    pub fn encode_all(
        &self,
        normalized: &NormalizedInput,
        primary_opioid: &str,
    ) -> VocabularyResult<EncodedCategories> {
        Ok(EncodedCategories {
            gender: self.encode("gender", &normalized.gender)?,
            primary_opioid: self.encode("primary_opioid", primary_opioid)?,
            alcohol_use: self.encode("alcohol_use", &normalized.alcohol_use)?,
        })
    }

    pub fn store(&self) -> &VocabularyStore {
        self.store
    }
}
