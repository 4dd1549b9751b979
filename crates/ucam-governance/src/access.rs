//! Access rule service: audited CRUD over the access table plus
//! evaluation against stored rules.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};
use ucam_core::error::{UcamError, UcamResult};
use ucam_core::evaluator::{self, Evaluation};
use ucam_core::models::access_rule::{
    AccessRule, AccessRuleFilter, CreateAccessRule, UpdateAccessRule,
};
use ucam_core::models::audit::{AuditAction, AuditObjectType, CreateAuditLogEntry};
use ucam_core::models::principal::Principal;
use ucam_core::repository::{AccessRuleRepository, AuditLogRepository, MembershipRepository};
use ucam_core::validation::RuleDraft;
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::authz::AdminCapability;
use crate::error::GovernanceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// The rule's latest mutation never reached the audit log.
    MissingAudit,
    /// A delete tombstone was recorded but the rule is still stored.
    DeletedButPresent,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::MissingAudit => "missing_audit",
            FindingKind::DeletedButPresent => "deleted_but_present",
        }
    }
}

/// A stored rule that disagrees with the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditFinding {
    pub kind: FindingKind,
    pub rule_id: Uuid,
    pub mutation_id: Uuid,
    pub group_name: String,
    pub modified_by: String,
}

pub struct AccessService<R, A, M>
where
    R: AccessRuleRepository,
    A: AuditLogRepository,
    M: MembershipRepository,
{
    rules: R,
    audit: AuditRecorder<A>,
    memberships: M,
}

impl<R, A, M> AccessService<R, A, M>
where
    R: AccessRuleRepository,
    A: AuditLogRepository,
    M: MembershipRepository,
{
    pub fn new(rules: R, audit: AuditRecorder<A>, memberships: M) -> Self {
        Self {
            rules,
            audit,
            memberships,
        }
    }

    pub async fn list_rules(&self, filter: AccessRuleFilter) -> UcamResult<Vec<AccessRule>> {
        self.rules.list(filter).await
    }

    pub async fn get_rule(&self, id: Uuid) -> UcamResult<AccessRule> {
        self.rules.get_by_id(id).await
    }

    /// Validate and insert a rule, then record an INSERT audit entry.
    pub async fn add_rule(&self, cap: &AdminCapability, draft: RuleDraft) -> UcamResult<AccessRule> {
        let input = draft.validate()?;
        let mutation_id = Uuid::new_v4();

        let rule = self
            .rules
            .create(CreateAccessRule {
                group_name: input.group_name,
                customer_ids: input.customer_ids,
                access_type: input.access_type,
                effective_date: input.effective_date,
                expiration_date: input.expiration_date,
                notes: input.notes,
                created_by: cap.user().to_string(),
                mutation_id,
            })
            .await?;
        info!(rule_id = %rule.id, group = %rule.group_name, user = cap.user(), "access rule created");

        self.audit
            .record(rule_entry(
                cap,
                mutation_id,
                AuditAction::Insert,
                &rule,
                None,
                Some(rule.audit_value()),
                rule.notes.clone(),
            ))
            .await?;
        Ok(rule)
    }

    /// Replace a rule's editable fields, auditing the before and after values.
    pub async fn update_rule(
        &self,
        cap: &AdminCapability,
        id: Uuid,
        draft: RuleDraft,
    ) -> UcamResult<AccessRule> {
        let input = draft.validate()?;
        let before = self.rules.get_by_id(id).await?;
        let mutation_id = Uuid::new_v4();

        let after = self
            .rules
            .update(
                id,
                UpdateAccessRule {
                    group_name: input.group_name,
                    customer_ids: input.customer_ids,
                    access_type: input.access_type,
                    effective_date: input.effective_date,
                    expiration_date: input.expiration_date,
                    notes: input.notes,
                    modified_by: cap.user().to_string(),
                    mutation_id,
                },
            )
            .await?;
        info!(rule_id = %id, user = cap.user(), "access rule updated");

        self.audit
            .record(rule_entry(
                cap,
                mutation_id,
                AuditAction::Update,
                &after,
                Some(before.audit_value()),
                Some(after.audit_value()),
                after.notes.clone(),
            ))
            .await?;
        Ok(after)
    }

    /// End a rule's validity. The expiration becomes `today`, or the
    /// effective date for rules that have not started yet.
    pub async fn expire_rule(
        &self,
        cap: &AdminCapability,
        id: Uuid,
        today: NaiveDate,
    ) -> UcamResult<AccessRule> {
        let before = self.rules.get_by_id(id).await?;
        if before.is_expired(today) {
            return Err(GovernanceError::RuleAlreadyExpired { rule_id: id }.into());
        }

        let expiration = today.max(before.effective_date);
        let mutation_id = Uuid::new_v4();
        let after = self
            .rules
            .expire(id, expiration, cap.user(), mutation_id)
            .await?;
        info!(rule_id = %id, expiration = %expiration, user = cap.user(), "access rule expired");

        self.audit
            .record(rule_entry(
                cap,
                mutation_id,
                AuditAction::Expire,
                &after,
                Some(before.audit_value()),
                Some(after.audit_value()),
                Some("Manually expired".into()),
            ))
            .await?;
        Ok(after)
    }

    /// Delete a rule that is already expired at `today`.
    ///
    /// The tombstone (an audit entry keeping the deleted values) is written
    /// first, so a failed audit write leaves the rule in place. A delete that
    /// fails after its tombstone landed is reported as an inconsistency and
    /// shows up in [`AccessService::reconcile`].
    pub async fn delete_rule(
        &self,
        cap: &AdminCapability,
        id: Uuid,
        today: NaiveDate,
    ) -> UcamResult<AccessRule> {
        let before = self.rules.get_by_id(id).await?;
        if !before.is_expired(today) {
            return Err(GovernanceError::RuleNotExpired { rule_id: id }.into());
        }

        let mutation_id = Uuid::new_v4();
        self.audit
            .record(rule_entry(
                cap,
                mutation_id,
                AuditAction::Delete,
                &before,
                Some(before.audit_value()),
                None,
                Some("Deleted after expiration".into()),
            ))
            .await?;

        // The repository re-checks expiry so a concurrent edit cannot slip through.
        let reason = match self.rules.delete_expired(id, today).await {
            Ok(true) => {
                info!(rule_id = %id, user = cap.user(), "access rule deleted");
                return Ok(before);
            }
            Ok(false) => "rule was no longer expired".to_string(),
            Err(e) => e.to_string(),
        };
        warn!(
            rule_id = %id,
            mutation_id = %mutation_id,
            error = %reason,
            "delete tombstone recorded but rule not deleted"
        );
        Err(UcamError::Inconsistency(format!(
            "access rule {id} has delete tombstone {mutation_id} but was not deleted: {reason}"
        )))
    }

    /// Decide access for `customer_id` given explicit group memberships.
    pub async fn evaluate(
        &self,
        customer_id: i64,
        groups: &BTreeSet<String>,
        as_of: NaiveDate,
    ) -> UcamResult<Evaluation> {
        let rules = self.rules.list_for_groups(groups).await?;
        Ok(evaluator::explain(customer_id, groups, &rules, as_of))
    }

    /// Decide access for `customer_id` using the principal's stored memberships.
    pub async fn check_access(
        &self,
        principal: &Principal,
        customer_id: i64,
        as_of: NaiveDate,
    ) -> UcamResult<Evaluation> {
        let groups = self.memberships.groups_for(principal).await?;
        self.evaluate(customer_id, &groups, as_of).await
    }

    /// Rules whose state disagrees with the audit log: the last mutation
    /// has no audit entry, or a delete tombstone exists but the rule is
    /// still stored.
    pub async fn reconcile(&self) -> UcamResult<Vec<AuditFinding>> {
        let rules = self.rules.list(AccessRuleFilter::default()).await?;
        let ids: Vec<Uuid> = rules.iter().map(|r| r.last_mutation_id).collect();
        let names: Vec<String> = rules.iter().map(|r| r.id.to_string()).collect();

        let repo = self.audit.repository();
        let missing: BTreeSet<Uuid> = repo.missing(&ids).await?.into_iter().collect();
        let tombstoned: BTreeSet<String> = repo
            .tombstoned(AuditObjectType::GroupAccess, &names)
            .await?
            .into_iter()
            .collect();

        let mut findings = Vec::new();
        for rule in rules {
            let kind = if tombstoned.contains(&rule.id.to_string()) {
                FindingKind::DeletedButPresent
            } else if missing.contains(&rule.last_mutation_id) {
                FindingKind::MissingAudit
            } else {
                continue;
            };
            warn!(
                rule_id = %rule.id,
                mutation_id = %rule.last_mutation_id,
                kind = kind.as_str(),
                "access rule disagrees with the audit log"
            );
            findings.push(AuditFinding {
                kind,
                rule_id: rule.id,
                mutation_id: rule.last_mutation_id,
                group_name: rule.group_name,
                modified_by: rule.modified_by,
            });
        }
        Ok(findings)
    }
}

fn rule_entry(
    cap: &AdminCapability,
    mutation_id: Uuid,
    action: AuditAction,
    rule: &AccessRule,
    old_value: Option<String>,
    new_value: Option<String>,
    notes: Option<String>,
) -> CreateAuditLogEntry {
    CreateAuditLogEntry {
        id: mutation_id,
        user: cap.user().to_string(),
        action_type: action,
        object_type: AuditObjectType::GroupAccess,
        object_name: rule.id.to_string(),
        old_value,
        new_value,
        notes,
    }
}
