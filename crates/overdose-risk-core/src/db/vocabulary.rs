//! Vocabulary journal database operations.

use rusqlite::{params, ErrorCode};

use super::{Database, DbError, DbResult};

/// A journaled vocabulary extension.
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyExtension {
    pub field: String,
    pub value: String,
    pub code: i64,
    pub created_at: String,
}

impl Database {
    /// Append an extension. Fails with `Constraint` if the value or code is taken.
    pub fn insert_vocabulary_extension(
        &self,
        artifact_fingerprint: &str,
        field: &str,
        value: &str,
        code: i64,
    ) -> DbResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO vocabulary_extensions (artifact_fingerprint, field, value, code)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![artifact_fingerprint, field, value, code],
            )
            .map_err(|e| {
                if let rusqlite::Error::SqliteFailure(err, _) = &e {
                    if err.code == ErrorCode::ConstraintViolation {
                        return DbError::Constraint(format!(
                            "{}={:?} (code {}) already journaled: {}",
                            field, value, code, e
                        ));
                    }
                }
                DbError::Sqlite(e)
            })?;
        Ok(())
    }

    /// All extensions for an artifact set, ordered by field then code.
    pub fn list_vocabulary_extensions(
        &self,
        artifact_fingerprint: &str,
    ) -> DbResult<Vec<VocabularyExtension>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT field, value, code, created_at
            FROM vocabulary_extensions
            WHERE artifact_fingerprint = ?
            ORDER BY field, code
            "#,
        )?;

        let rows = stmt.query_map([artifact_fingerprint], |row| {
            Ok(VocabularyExtension {
                field: row.get(0)?,
                value: row.get(1)?,
                code: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;

        let mut extensions = Vec::new();
        for row in rows {
            extensions.push(row?);
        }
        Ok(extensions)
    }

    /// Number of extensions journaled for an artifact set.
    pub fn count_vocabulary_extensions(&self, artifact_fingerprint: &str) -> DbResult<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM vocabulary_extensions WHERE artifact_fingerprint = ?",
            [artifact_fingerprint],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_list() {
        let db = Database::open_in_memory().unwrap();

        db.insert_vocabulary_extension("abc", "primary_opioid", "Tapentadol", 7).unwrap();
        db.insert_vocabulary_extension("abc", "gender", "unknown", 2).unwrap();
        db.insert_vocabulary_extension("abc", "primary_opioid", "Methadone", 8).unwrap();
        db.insert_vocabulary_extension("other", "gender", "unknown", 2).unwrap();

        let extensions = db.list_vocabulary_extensions("abc").unwrap();
        let listed: Vec<_> = extensions
            .iter()
            .map(|e| (e.field.as_str(), e.value.as_str(), e.code))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("gender", "unknown", 2),
                ("primary_opioid", "Tapentadol", 7),
                ("primary_opioid", "Methadone", 8),
            ]
        );
        assert_eq!(db.count_vocabulary_extensions("abc").unwrap(), 3);
        assert_eq!(db.count_vocabulary_extensions("other").unwrap(), 1);
    }

    #[test]
    fn test_duplicate_value_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_vocabulary_extension("abc", "gender", "Other", 2).unwrap();

        let err = db.insert_vocabulary_extension("abc", "gender", "Other", 3).unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_vocabulary_extension("abc", "gender", "Other", 2).unwrap();

        let err = db.insert_vocabulary_extension("abc", "gender", "X", 2).unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[test]
    fn test_extensions_are_append_only() {
        let db = Database::open_in_memory().unwrap();
        db.insert_vocabulary_extension("abc", "gender", "Other", 2).unwrap();

        assert!(db
            .conn()
            .execute("UPDATE vocabulary_extensions SET code = 9", [])
            .is_err());
        assert!(db
            .conn()
            .execute("DELETE FROM vocabulary_extensions", [])
            .is_err());
        assert_eq!(db.count_vocabulary_extensions("abc").unwrap(), 1);
    }
}
