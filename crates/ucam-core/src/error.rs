//! Error types for UCAM.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UcamError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    /// The warehouse rejected or failed a read or write.
    #[error("Database error: {0}")]
    Database(String),

    /// An audit entry could not be written. Inserts, updates and expiries
    /// have already landed and are not rolled back; deletes write their
    /// tombstone first and leave the rule in place.
    #[error("Audit write failed for mutation {mutation_id} on {object_name}: {reason}")]
    AuditWriteFailed {
        mutation_id: Uuid,
        object_name: String,
        reason: String,
    },

    /// The rule store and the audit log disagree, e.g. a delete tombstone
    /// exists for a rule that is still present.
    #[error("Inconsistent state detected: {0}")]
    Inconsistency(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UcamError {
    /// Shorthand for a [`UcamError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        UcamError::Validation {
            message: message.into(),
        }
    }

    /// Whether this error belongs to the consistency class (a mutation
    /// landed without its audit trail).
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            UcamError::AuditWriteFailed { .. } | UcamError::Inconsistency(_)
        )
    }
}

pub type UcamResult<T> = Result<T, UcamError>;
