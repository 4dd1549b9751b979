//! Audit recording with bounded retry.
//!
//! Appends are keyed by the mutation id, so a retried append after an
//! ambiguous failure cannot duplicate the entry.

use std::time::Duration;

use tracing::{info, warn};
use ucam_core::error::{UcamError, UcamResult};
use ucam_core::models::audit::{AuditLogEntry, AuditLogFilter, CreateAuditLogEntry};
use ucam_core::repository::AuditLogRepository;

use crate::config::GovernanceConfig;
use crate::error::GovernanceError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self {
            max_attempts: config.audit_retry_attempts,
            initial_backoff: Duration::from_millis(config.audit_retry_backoff_ms),
        }
    }

    /// Backoff after the zero-based failed `attempt`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&GovernanceConfig::default())
    }
}

#[derive(Clone)]
pub struct AuditRecorder<A: AuditLogRepository> {
    repo: A,
    retry: RetryPolicy,
}

impl<A: AuditLogRepository> AuditRecorder<A> {
    pub fn new(repo: A, retry: RetryPolicy) -> Self {
        Self { repo, retry }
    }

    pub fn repository(&self) -> &A {
        &self.repo
    }

    /// Append `entry`, retrying store failures with exponential backoff.
    ///
    /// Exhausting the retries yields [`UcamError::AuditWriteFailed`]
    /// carrying the entry id, which is the id of the mutation it records.
    pub async fn record(&self, entry: CreateAuditLogEntry) -> UcamResult<AuditLogEntry> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.repo.append(entry.clone()).await {
                Ok(stored) => {
                    info!(
                        audit_id = %stored.id,
                        action = %stored.action_type,
                        object = %stored.object_name,
                        "audit entry recorded"
                    );
                    return Ok(stored);
                }
                Err(e @ UcamError::Validation { .. }) => {
                    last_error = e.to_string();
                    break;
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        let backoff = self.retry.backoff_for_attempt(attempt);
                        warn!(
                            audit_id = %entry.id,
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "audit append failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        warn!(
            audit_id = %entry.id,
            object = %entry.object_name,
            error = %last_error,
            "audit append gave up"
        );
        Err(GovernanceError::AuditWrite {
            mutation_id: entry.id,
            object_name: entry.object_name,
            reason: last_error,
        }
        .into())
    }

    pub async fn list(&self, filter: AuditLogFilter) -> UcamResult<Vec<AuditLogEntry>> {
        self.repo.list(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(50),
        };
        assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(50));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(200));
    }

    #[test]
    fn default_policy_follows_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
    }
}
