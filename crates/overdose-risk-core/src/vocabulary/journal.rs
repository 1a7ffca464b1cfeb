//! Durable journal of vocabulary extensions.

use std::path::Path;
use std::sync::Mutex;

use crate::db::Database;

use super::VocabularyResult;

/// One journaled extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub field: String,
    pub value: String,
    pub code: i64,
}

/// Sink for vocabulary extensions.
///
/// `record` is called while the field's write lock is held, so entries for
/// one field arrive in code order.
pub trait VocabularyJournal: Send + Sync {
    /// Persist a new extension.
    fn record(&self, field: &str, value: &str, code: i64) -> VocabularyResult<()>;

    /// Entries to re-apply on startup, ordered by field then code.
    fn replay(&self) -> VocabularyResult<Vec<JournalEntry>>;
}

/// SQLite-backed journal scoped to one artifact fingerprint.
pub struct SqliteJournal {
    db: Mutex<Database>,
    artifact_fingerprint: String,
}

impl SqliteJournal {
    /// Open (or create) a journal file.
    pub fn open<P: AsRef<Path>>(path: P, artifact_fingerprint: &str) -> VocabularyResult<Self> {
        Ok(Self::new(Database::open(path)?, artifact_fingerprint))
    }

    /// Wrap an existing database.
    pub fn new(db: Database, artifact_fingerprint: &str) -> Self {
        Self {
            db: Mutex::new(db),
            artifact_fingerprint: artifact_fingerprint.to_string(),
        }
    }
}

impl VocabularyJournal for SqliteJournal {
    fn record(&self, field: &str, value: &str, code: i64) -> VocabularyResult<()> {
        let db = self.db.lock()?;
        db.insert_vocabulary_extension(&self.artifact_fingerprint, field, value, code)?;
        Ok(())
    }

    fn replay(&self) -> VocabularyResult<Vec<JournalEntry>> {
        let db = self.db.lock()?;
        let entries = db
            .list_vocabulary_extensions(&self.artifact_fingerprint)?
            .into_iter()
            .map(|e| JournalEntry {
                field: e.field,
                value: e.value,
                code: e.code,
            })
            .collect();
        Ok(entries)
    }
}
