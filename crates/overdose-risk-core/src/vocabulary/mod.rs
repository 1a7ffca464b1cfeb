//! Append-only categorical vocabularies.
//!
//! Each categorical field owns a vocabulary mapping a value to a dense
//! integer code (`0..n`, in insertion order). Fitted classes come from the
//! artifact set; values first seen at inference time are appended through
//! [`VocabularyStore::lookup_or_insert`]. Codes are never reassigned.
//!
//! Concurrency: the store-level map and each vocabulary sit behind their own
//! `RwLock`. Lookups take read locks only. An insertion re-checks under the
//! vocabulary's write lock, so two requests racing on the same unseen value
//! observe a single code.

mod journal;

pub use journal::*;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, info};

use crate::db::DbError;

/// Vocabulary errors.
#[derive(Error, Debug)]
pub enum VocabularyError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Duplicate class {value:?} in fitted vocabulary for '{field}'")]
    DuplicateClass { field: String, value: String },

    #[error("Journal entry {field}={value:?} has code {found}, expected {expected}")]
    JournalMismatch {
        field: String,
        value: String,
        expected: i64,
        found: i64,
    },

    #[error("Vocabulary lock poisoned: {0}")]
    Poisoned(String),
}

impl<T> From<PoisonError<T>> for VocabularyError {
    fn from(e: PoisonError<T>) -> Self {
        VocabularyError::Poisoned(e.to_string())
    }
}

pub type VocabularyResult<T> = Result<T, VocabularyError>;

#[derive(Debug, Default)]
struct VocabularyInner {
    codes: HashMap<String, i64>,
    labels: Vec<String>,
}

impl VocabularyInner {
    fn push(&mut self, value: &str) -> i64 {
        let code = self.labels.len() as i64;
        self.labels.push(value.to_string());
        self.codes.insert(value.to_string(), code);
        code
    }
}

/// A single field's vocabulary.
#[derive(Debug, Default)]
pub struct Vocabulary {
    inner: RwLock<VocabularyInner>,
}

impl Vocabulary {
    /// Build from fitted classes; code = position.
    pub fn from_classes(field: &str, classes: &[String]) -> VocabularyResult<Self> {
        let mut inner = VocabularyInner::default();
        for class in classes {
            if inner.codes.contains_key(class) {
                return Err(VocabularyError::DuplicateClass {
                    field: field.to_string(),
                    value: class.clone(),
                });
            }
            inner.push(class);
        }
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Code for a known value.
    pub fn get(&self, value: &str) -> VocabularyResult<Option<i64>> {
        Ok(self.inner.read()?.codes.get(value).copied())
    }

    /// Number of codes assigned.
    pub fn len(&self) -> VocabularyResult<usize> {
        Ok(self.inner.read()?.labels.len())
    }

    /// Whether no code has been assigned yet.
    pub fn is_empty(&self) -> VocabularyResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Labels in code order.
    pub fn labels(&self) -> VocabularyResult<Vec<String>> {
        Ok(self.inner.read()?.labels.clone())
    }
}

/// Process-wide store of per-field vocabularies.
pub struct VocabularyStore {
    fields: RwLock<HashMap<String, Arc<Vocabulary>>>,
    /// Fields whose classes came from the artifact set
    fitted: HashSet<String>,
    journal: Option<Box<dyn VocabularyJournal>>,
}

impl std::fmt::Debug for VocabularyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VocabularyStore")
            .field("fields", &self.fields)
            .field("fitted", &self.fitted)
            .field("journaled", &self.journal.is_some())
            .finish()
    }
}

impl VocabularyStore {
    /// Build from fitted classes per field.
    pub fn new(classes: &HashMap<String, Vec<String>>) -> VocabularyResult<Self> {
        let mut fields = HashMap::new();
        for (field, values) in classes {
            fields.insert(field.clone(), Arc::new(Vocabulary::from_classes(field, values)?));
        }
        Ok(Self {
            fitted: classes.keys().cloned().collect(),
            fields: RwLock::new(fields),
            journal: None,
        })
    }

    /// Attach a journal: replay its entries, then record every new extension.
    pub fn with_journal(mut self, journal: Box<dyn VocabularyJournal>) -> VocabularyResult<Self> {
        let entries = journal.replay()?;
        let replayed = entries.len();
        for entry in entries {
            self.replay_entry(&entry)?;
        }
        if replayed > 0 {
            info!(replayed, "Replayed vocabulary journal");
        }
        self.journal = Some(journal);
        Ok(self)
    }

    /// Whether the artifacts (or an extension) defined a vocabulary for `field`.
    pub fn has_field(&self, field: &str) -> VocabularyResult<bool> {
        Ok(self.fields.read()?.contains_key(field))
    }

    /// Whether `field` had fitted classes in the artifact set.
    pub fn is_fitted(&self, field: &str) -> bool {
        self.fitted.contains(field)
    }

    /// Code for a known value, without inserting.
    pub fn lookup(&self, field: &str, value: &str) -> VocabularyResult<Option<i64>> {
        match self.vocabulary(field)? {
            Some(vocab) => vocab.get(value),
            None => Ok(None),
        }
    }

    /// Code for `value`, appending it with the next unused code if unseen.
    ///
    /// A field without a vocabulary gets an empty one first.
    pub fn lookup_or_insert(&self, field: &str, value: &str) -> VocabularyResult<i64> {
        let vocab = self.vocabulary_or_create(field)?;

        if let Some(code) = vocab.get(value)? {
            return Ok(code);
        }

        let mut inner = vocab.inner.write()?;
        if let Some(code) = inner.codes.get(value) {
            // Another request inserted it between our read and write lock.
            return Ok(*code);
        }

        let code = inner.labels.len() as i64;
        if let Some(journal) = &self.journal {
            journal.record(field, value, code)?;
        }
        inner.push(value);

        info!(field, value, code, "Extended vocabulary with unseen value");
        Ok(code)
    }

    /// Number of codes in a field's vocabulary.
    pub fn len(&self, field: &str) -> VocabularyResult<Option<usize>> {
        match self.vocabulary(field)? {
            Some(vocab) => vocab.len().map(Some),
            None => Ok(None),
        }
    }

    /// Labels of a field in code order.
    pub fn labels(&self, field: &str) -> VocabularyResult<Option<Vec<String>>> {
        match self.vocabulary(field)? {
            Some(vocab) => vocab.labels().map(Some),
            None => Ok(None),
        }
    }

    /// Field names, sorted.
    pub fn fields(&self) -> VocabularyResult<Vec<String>> {
        let mut names: Vec<String> = self.fields.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn vocabulary(&self, field: &str) -> VocabularyResult<Option<Arc<Vocabulary>>> {
        Ok(self.fields.read()?.get(field).cloned())
    }

    fn vocabulary_or_create(&self, field: &str) -> VocabularyResult<Arc<Vocabulary>> {
        if let Some(vocab) = self.vocabulary(field)? {
            return Ok(vocab);
        }
        let mut fields = self.fields.write()?;
        let vocab = fields.entry(field.to_string()).or_insert_with(|| {
            debug!(field, "Creating vocabulary for field without fitted classes");
            Arc::new(Vocabulary::default())
        });
        Ok(Arc::clone(vocab))
    }

    fn replay_entry(&self, entry: &JournalEntry) -> VocabularyResult<()> {
        let vocab = self.vocabulary_or_create(&entry.field)?;
        let mut inner = vocab.inner.write()?;

        let expected = match inner.codes.get(&entry.value) {
            Some(code) => *code,
            None => inner.labels.len() as i64,
        };
        if expected != entry.code {
            return Err(VocabularyError::JournalMismatch {
                field: entry.field.clone(),
                value: entry.value.clone(),
                expected,
                found: entry.code,
            });
        }
        if !inner.codes.contains_key(&entry.value) {
            inner.push(&entry.value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn fitted() -> HashMap<String, Vec<String>> {
        let mut classes = HashMap::new();
        classes.insert("gender".to_string(), vec!["Female".to_string(), "Male".to_string()]);
        classes.insert(
            "alcohol_use".to_string(),
            vec!["Heavy".into(), "Light".into(), "Moderate".into(), "nan".into()],
        );
        classes
    }

    #[test]
    fn test_fitted_codes_are_positions() {
        let store = VocabularyStore::new(&fitted()).unwrap();
        assert_eq!(store.lookup("gender", "Female").unwrap(), Some(0));
        assert_eq!(store.lookup("gender", "Male").unwrap(), Some(1));
        assert_eq!(store.lookup("alcohol_use", "nan").unwrap(), Some(3));
        assert_eq!(store.lookup("gender", "Other").unwrap(), None);
        assert_eq!(store.lookup("primary_opioid", "Morphine").unwrap(), None);
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let mut classes = HashMap::new();
        classes.insert("gender".to_string(), vec!["Male".to_string(), "Male".to_string()]);
        let err = VocabularyStore::new(&classes).unwrap_err();
        assert!(matches!(err, VocabularyError::DuplicateClass { .. }));
    }

    #[test]
    fn test_unseen_value_appended_once() {
        let store = VocabularyStore::new(&fitted()).unwrap();

        let first = store.lookup_or_insert("gender", "unknown").unwrap();
        let second = store.lookup_or_insert("gender", "unknown").unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 2);
        assert_eq!(store.len("gender").unwrap(), Some(3));
        // Existing codes untouched
        assert_eq!(store.lookup("gender", "Female").unwrap(), Some(0));
        assert_eq!(store.lookup("gender", "Male").unwrap(), Some(1));
    }

    #[test]
    fn test_missing_field_created_on_insert() {
        let store = VocabularyStore::new(&fitted()).unwrap();
        assert!(!store.has_field("primary_opioid").unwrap());
        assert!(store.is_fitted("gender"));
        assert!(!store.is_fitted("primary_opioid"));

        assert_eq!(store.lookup_or_insert("primary_opioid", "unknown").unwrap(), 0);
        assert!(store.has_field("primary_opioid").unwrap());
        assert!(!store.is_fitted("primary_opioid"));
        assert_eq!(store.labels("primary_opioid").unwrap(), Some(vec!["unknown".to_string()]));
    }

    #[test]
    fn test_concurrent_insert_single_code() {
        let store = Arc::new(VocabularyStore::new(&fitted()).unwrap());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.lookup_or_insert("gender", "Nonbinary").unwrap())
            })
            .collect();

        let codes: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(codes.iter().all(|c| *c == 2), "codes: {:?}", codes);
        assert_eq!(store.len("gender").unwrap(), Some(3));
    }

    #[test]
    fn test_fields_sorted() {
        let store = VocabularyStore::new(&fitted()).unwrap();
        assert_eq!(store.fields().unwrap(), vec!["alcohol_use", "gender"]);
    }
}
