//! Database-specific error types and conversions.

use ucam_core::error::UcamError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt row in {table}: {reason}")]
    Decode { table: &'static str, reason: String },

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl DbError {
    pub(crate) fn decode(table: &'static str, reason: impl ToString) -> Self {
        DbError::Decode {
            table,
            reason: reason.to_string(),
        }
    }
}

impl From<DbError> for UcamError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => UcamError::NotFound { entity, id },
            other => UcamError::Database(other.to_string()),
        }
    }
}
