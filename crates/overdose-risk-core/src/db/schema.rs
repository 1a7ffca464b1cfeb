//! SQLite schema definition.

/// Schema for the vocabulary journal.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Vocabulary Extensions (Append-Only)
-- ============================================================================

-- Codes appended at inference time for categorical values the fitted
-- vocabularies had never seen. Scoped to the artifact set that was loaded.
CREATE TABLE IF NOT EXISTS vocabulary_extensions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    artifact_fingerprint TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    code INTEGER NOT NULL CHECK (code >= 0),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (artifact_fingerprint, field, value),
    UNIQUE (artifact_fingerprint, field, code)
);

CREATE TRIGGER IF NOT EXISTS vocabulary_extensions_no_update BEFORE UPDATE ON vocabulary_extensions
BEGIN
    SELECT RAISE(ABORT, 'Vocabulary extensions are append-only');
END;

CREATE TRIGGER IF NOT EXISTS vocabulary_extensions_no_delete BEFORE DELETE ON vocabulary_extensions
BEGIN
    SELECT RAISE(ABORT, 'Vocabulary extensions are append-only');
END;

CREATE INDEX IF NOT EXISTS idx_vocab_fingerprint
    ON vocabulary_extensions(artifact_fingerprint, field, code);
"#;
