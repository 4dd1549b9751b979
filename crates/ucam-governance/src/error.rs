//! Governance error types.

use thiserror::Error;
use ucam_core::error::UcamError;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("{principal} is not a member of {group}")]
    NotAdmin { principal: String, group: String },

    #[error("no authenticated user; admin operations require an identity")]
    AnonymousPrincipal,

    #[error("{group} already has members; ask an existing admin to add {principal}")]
    AdminGroupNotEmpty { principal: String, group: String },

    #[error("Rules can only be deleted after expiration.")]
    RuleNotExpired { rule_id: Uuid },

    #[error("Rule {rule_id} is already expired.")]
    RuleAlreadyExpired { rule_id: Uuid },

    #[error("audit entry for mutation {mutation_id} on {object_name} not written: {reason}")]
    AuditWrite {
        mutation_id: Uuid,
        object_name: String,
        reason: String,
    },
}

impl From<GovernanceError> for UcamError {
    fn from(err: GovernanceError) -> Self {
        match err {
            GovernanceError::NotAdmin { .. }
            | GovernanceError::AnonymousPrincipal
            | GovernanceError::AdminGroupNotEmpty { .. } => {
                UcamError::AuthorizationDenied {
                    reason: err.to_string(),
                }
            }
            GovernanceError::RuleNotExpired { .. } | GovernanceError::RuleAlreadyExpired { .. } => {
                UcamError::validation(err.to_string())
            }
            GovernanceError::AuditWrite {
                mutation_id,
                object_name,
                reason,
            } => UcamError::AuditWriteFailed {
                mutation_id,
                object_name,
                reason,
            },
        }
    }
}
