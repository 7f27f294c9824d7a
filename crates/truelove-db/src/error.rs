//! Database-specific error types and conversions.

use truelove_core::error::TrueLoveError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Stored record could not be decoded: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: String, key: String },
}

impl DbError {
    /// Classify a failed statement, recognizing unique index violations.
    pub(crate) fn from_statement(err: surrealdb::Error, entity: &str, key: &str) -> Self {
        let message = err.to_string();
        if message.contains("already contains") {
            DbError::Duplicate {
                entity: entity.into(),
                key: key.into(),
            }
        } else {
            DbError::Query(message)
        }
    }
}

impl From<DbError> for TrueLoveError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => TrueLoveError::NotFound { entity, id },
            DbError::Duplicate { entity, key } => TrueLoveError::AlreadyExists {
                entity: format!("{entity} {key}"),
            },
            DbError::Decode(msg) => TrueLoveError::Internal(msg),
            other => TrueLoveError::StoreUnavailable(other.to_string()),
        }
    }
}
