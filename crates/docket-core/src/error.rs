//! Error Taxonomy
//!
//! One error enum for the whole core. Recoverable conditions are surfaced
//! to wire callers as `{error: string}`; fatal ones propagate as these
//! typed variants.

/// Core error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database file, document, entity, node, edge, or OCR result absent
    #[error("Not found: {0}")]
    NotFound(String),
    /// Database file present at create time, or id collision
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    /// Database name violates `[A-Za-z0-9_-]+`
    #[error("Invalid database name: {0}")]
    InvalidName(String),
    /// Required table/index/column missing after migration
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Write referenced a non-existent parent row
    #[error("Foreign key violation on {column}: {detail}")]
    ForeignKeyViolation { column: String, detail: String },
    /// CHECK or uniqueness constraint broken, or corrupted invariant
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
    /// LLM or embedding call failed after all retries and recovery paths
    #[error("Oracle failure: {0}")]
    OracleFailure(String),
    /// Request failed validation at the caller boundary
    #[error("Invalid input: {0}")]
    InputInvalid(String),
    /// Filesystem refused create/chmod/open
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Vector index error
    #[error("Vector index error: {0}")]
    VectorIndex(String),
}

/// Core result type
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Wrap a rusqlite error, naming the FK column when the engine reports a
    /// foreign-key failure. Call sites use this around single-row inserts so
    /// the offending reference is visible to the caller.
    pub fn from_sqlite(column: &str, err: rusqlite::Error) -> Self {
        let is_fk = matches!(
            &err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
        );
        if is_fk {
            StoreError::ForeignKeyViolation {
                column: column.to_string(),
                detail: err.to_string(),
            }
        } else if let rusqlite::Error::SqliteFailure(e, _) = &err {
            if e.code == rusqlite::ErrorCode::ConstraintViolation {
                StoreError::IntegrityViolation(err.to_string())
            } else {
                StoreError::Database(err)
            }
        } else {
            StoreError::Database(err)
        }
    }
}
