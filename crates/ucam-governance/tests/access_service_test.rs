//! Integration tests for the admin gate and the audited access rule service.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use ucam_core::error::{UcamError, UcamResult};
use ucam_core::evaluator::{Decision, DecisionReason};
use ucam_core::models::access_rule::{
    AccessRule, AccessRuleFilter, AccessType, CreateAccessRule, UpdateAccessRule,
};
use ucam_core::models::audit::{
    AuditAction, AuditLogEntry, AuditLogFilter, AuditObjectType, CreateAuditLogEntry,
};
use ucam_core::models::principal::Principal;
use ucam_core::repository::{AccessRuleRepository, AuditLogRepository, MembershipRepository};
use ucam_core::validation::RuleDraft;
use ucam_db::repository::{
    SurrealAccessRuleRepository, SurrealAuditLogRepository, SurrealMembershipRepository,
};
use ucam_governance::{
    AccessService, AdminCapability, AuditRecorder, Authorizer, FindingKind, RetryPolicy,
};
use uuid::Uuid;

const ADMIN_GROUP: &str = "uc_admins";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
    }
}

/// Audit repository that can be switched into a failing state.
#[derive(Clone)]
struct FlakyAudit {
    inner: SurrealAuditLogRepository<Db>,
    failing: Arc<AtomicBool>,
    attempts: Arc<AtomicU32>,
}

impl AuditLogRepository for FlakyAudit {
    async fn append(&self, input: CreateAuditLogEntry) -> UcamResult<AuditLogEntry> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(UcamError::Database("audit table unavailable".into()));
        }
        self.inner.append(input).await
    }

    async fn get_by_id(&self, id: Uuid) -> UcamResult<AuditLogEntry> {
        self.inner.get_by_id(id).await
    }

    async fn missing(&self, ids: &[Uuid]) -> UcamResult<Vec<Uuid>> {
        self.inner.missing(ids).await
    }

    async fn tombstoned(
        &self,
        object_type: AuditObjectType,
        object_names: &[String],
    ) -> UcamResult<Vec<String>> {
        self.inner.tombstoned(object_type, object_names).await
    }

    async fn list(&self, filter: AuditLogFilter) -> UcamResult<Vec<AuditLogEntry>> {
        self.inner.list(filter).await
    }
}

type Service =
    AccessService<SurrealAccessRuleRepository<Db>, FlakyAudit, SurrealMembershipRepository<Db>>;

struct Harness {
    service: Service,
    authorizer: Authorizer<SurrealMembershipRepository<Db>>,
    memberships: SurrealMembershipRepository<Db>,
    audit: FlakyAudit,
}

async fn setup() -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    ucam_db::run_migrations(&db).await.unwrap();

    let memberships = SurrealMembershipRepository::new(db.clone());
    let audit = FlakyAudit {
        inner: SurrealAuditLogRepository::new(db.clone()),
        failing: Arc::new(AtomicBool::new(false)),
        attempts: Arc::new(AtomicU32::new(0)),
    };
    let service = AccessService::new(
        SurrealAccessRuleRepository::new(db.clone()),
        AuditRecorder::new(audit.clone(), fast_retry()),
        memberships.clone(),
    );
    let authorizer = Authorizer::new(memberships.clone(), ADMIN_GROUP);

    memberships
        .add_member(&Principal::new("admin@example.com"), ADMIN_GROUP)
        .await
        .unwrap();

    Harness {
        service,
        authorizer,
        memberships,
        audit,
    }
}

async fn admin(h: &Harness) -> AdminCapability {
    h.authorizer
        .authorize_admin(&Principal::new("admin@example.com"))
        .await
        .unwrap()
}

fn draft(group: &str, ids: &str, access_type: &str, effective: NaiveDate) -> RuleDraft {
    RuleDraft {
        group_name: group.into(),
        customer_ids: ids.into(),
        access_type: access_type.into(),
        effective_date: effective,
        expiration_date: None,
        notes: Some("contract 42".into()),
    }
}

async fn audit_entries(h: &Harness) -> Vec<AuditLogEntry> {
    h.audit.list(AuditLogFilter::default()).await.unwrap()
}

#[tokio::test]
async fn non_admins_are_denied() {
    let h = setup().await;
    let err = h
        .authorizer
        .authorize_admin(&Principal::new("analyst@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, UcamError::AuthorizationDenied { .. }));

    let err = h
        .authorizer
        .authorize_admin(&Principal::unknown())
        .await
        .unwrap_err();
    assert!(matches!(err, UcamError::AuthorizationDenied { .. }));

    let cap = admin(&h).await;
    assert_eq!(cap.user(), "admin@example.com");
}

#[tokio::test]
async fn first_admin_is_bootstrapped_only_into_an_empty_group() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    ucam_db::run_migrations(&db).await.unwrap();
    let memberships = SurrealMembershipRepository::new(db);
    let authorizer = Authorizer::new(memberships.clone(), ADMIN_GROUP);
    let first = Principal::new("owner@example.com");

    let err = authorizer
        .bootstrap_admin(&Principal::unknown())
        .await
        .unwrap_err();
    assert!(matches!(err, UcamError::AuthorizationDenied { .. }));
    assert!(!memberships.has_members(ADMIN_GROUP).await.unwrap());

    let cap = authorizer.bootstrap_admin(&first).await.unwrap();
    assert_eq!(cap.user(), "owner@example.com");
    assert!(memberships.is_member(&first, ADMIN_GROUP).await.unwrap());
    authorizer.authorize_admin(&first).await.unwrap();

    let intruder = Principal::new("intruder@example.com");
    let err = authorizer.bootstrap_admin(&intruder).await.unwrap_err();
    assert!(matches!(err, UcamError::AuthorizationDenied { .. }));
    assert!(!memberships.is_member(&intruder, ADMIN_GROUP).await.unwrap());
    assert!(authorizer.bootstrap_admin(&first).await.is_err());
}

#[tokio::test]
async fn add_rule_writes_one_audit_entry_keyed_by_mutation() {
    let h = setup().await;
    let cap = admin(&h).await;

    let rule = h
        .service
        .add_rule(&cap, draft("G1", "102, 101", "include", date(2024, 1, 1)))
        .await
        .unwrap();
    assert_eq!(rule.customer_ids, BTreeSet::from([101, 102]));
    assert_eq!(rule.access_type, AccessType::Include);
    assert_eq!(rule.created_by, "admin@example.com");

    let entries = audit_entries(&h).await;
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.id, rule.last_mutation_id);
    assert_eq!(entry.action_type, AuditAction::Insert);
    assert_eq!(entry.object_type, AuditObjectType::GroupAccess);
    assert_eq!(entry.object_name, rule.id.to_string());
    assert_eq!(entry.new_value.as_deref(), Some(rule.audit_value().as_str()));
    assert_eq!(entry.notes.as_deref(), Some("contract 42"));
}

#[tokio::test]
async fn invalid_drafts_touch_nothing() {
    let h = setup().await;
    let cap = admin(&h).await;

    let mut bad = draft("G1", "1", "ALLOW", date(2024, 6, 1));
    bad.expiration_date = Some(date(2024, 1, 1));
    let err = h.service.add_rule(&cap, bad).await.unwrap_err();
    assert!(matches!(err, UcamError::Validation { .. }));

    assert!(
        h.service
            .list_rules(AccessRuleFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
    assert!(audit_entries(&h).await.is_empty());
}

#[tokio::test]
async fn update_records_before_and_after() {
    let h = setup().await;
    let cap = admin(&h).await;
    let rule = h
        .service
        .add_rule(&cap, draft("G1", "1", "INCLUDE", date(2024, 1, 1)))
        .await
        .unwrap();

    let updated = h
        .service
        .update_rule(&cap, rule.id, draft("G1", "1-3", "INCLUDE", date(2024, 1, 1)))
        .await
        .unwrap();
    assert_eq!(updated.customer_ids, BTreeSet::from([1, 2, 3]));

    let update = h.audit.get_by_id(updated.last_mutation_id).await.unwrap();
    assert_eq!(update.action_type, AuditAction::Update);
    assert_eq!(update.old_value.as_deref(), Some(rule.audit_value().as_str()));
    assert_eq!(update.new_value.as_deref(), Some(updated.audit_value().as_str()));
    assert_eq!(audit_entries(&h).await.len(), 2);
}

#[tokio::test]
async fn updating_a_missing_rule_is_not_found() {
    let h = setup().await;
    let cap = admin(&h).await;
    let err = h
        .service
        .update_rule(&cap, Uuid::new_v4(), draft("G1", "1", "INCLUDE", date(2024, 1, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, UcamError::NotFound { .. }));
    assert!(audit_entries(&h).await.is_empty());
}

#[tokio::test]
async fn expire_uses_today_or_the_effective_date() {
    let h = setup().await;
    let cap = admin(&h).await;
    let today = date(2024, 6, 1);

    let running = h
        .service
        .add_rule(&cap, draft("G1", "1", "INCLUDE", date(2024, 1, 1)))
        .await
        .unwrap();
    let future = h
        .service
        .add_rule(&cap, draft("G1", "2", "INCLUDE", date(2024, 9, 1)))
        .await
        .unwrap();

    let expired = h.service.expire_rule(&cap, running.id, today).await.unwrap();
    assert_eq!(expired.expiration_date, Some(today));
    let expired_future = h.service.expire_rule(&cap, future.id, today).await.unwrap();
    assert_eq!(expired_future.expiration_date, Some(date(2024, 9, 1)));

    let entry = h.audit.get_by_id(expired.last_mutation_id).await.unwrap();
    assert_eq!(entry.action_type, AuditAction::Expire);
    assert_eq!(entry.notes.as_deref(), Some("Manually expired"));

    let err = h
        .service
        .expire_rule(&cap, running.id, today)
        .await
        .unwrap_err();
    assert!(matches!(err, UcamError::Validation { .. }));
}

#[tokio::test]
async fn only_expired_rules_can_be_deleted() {
    let h = setup().await;
    let cap = admin(&h).await;
    let today = date(2024, 6, 1);
    let rule = h
        .service
        .add_rule(&cap, draft("G1", "1", "EXCLUDE", date(2024, 1, 1)))
        .await
        .unwrap();

    let err = h.service.delete_rule(&cap, rule.id, today).await.unwrap_err();
    assert!(matches!(err, UcamError::Validation { .. }));

    h.service.expire_rule(&cap, rule.id, today).await.unwrap();
    let deleted = h.service.delete_rule(&cap, rule.id, today).await.unwrap();
    assert_eq!(deleted.id, rule.id);
    assert!(matches!(
        h.service.get_rule(rule.id).await,
        Err(UcamError::NotFound { .. })
    ));

    let tombstone = h
        .audit
        .list(AuditLogFilter {
            action_types: vec![AuditAction::Delete],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(tombstone.len(), 1);
    assert_eq!(tombstone[0].object_name, rule.id.to_string());
    assert!(tombstone[0].old_value.is_some());
    assert_eq!(tombstone[0].new_value, None);
    assert_eq!(tombstone[0].notes.as_deref(), Some("Deleted after expiration"));
}

#[tokio::test]
async fn exclude_in_another_group_wins_over_include_all() {
    let h = setup().await;
    let cap = admin(&h).await;
    let today = date(2025, 3, 10);
    h.service
        .add_rule(&cap, draft("G1", "", "INCLUDE", date(2024, 1, 1)))
        .await
        .unwrap();
    let exclude = h
        .service
        .add_rule(&cap, draft("G2", "101", "EXCLUDE", date(2024, 1, 1)))
        .await
        .unwrap();

    let analyst = Principal::new("analyst@example.com");
    h.memberships.add_member(&analyst, "G1").await.unwrap();
    h.memberships.add_member(&analyst, "G2").await.unwrap();

    let denied = h.service.check_access(&analyst, 101, today).await.unwrap();
    assert_eq!(denied.decision, Decision::Deny);
    assert_eq!(denied.reason, DecisionReason::Excluded);
    assert_eq!(denied.deciding_rules, vec![exclude.id]);

    let granted = h.service.check_access(&analyst, 202, today).await.unwrap();
    assert_eq!(granted.decision, Decision::Grant);

    let stranger = Principal::new("stranger@example.com");
    let nobody = h.service.check_access(&stranger, 202, today).await.unwrap();
    assert_eq!(nobody.reason, DecisionReason::NoMemberships);
}

#[tokio::test]
async fn evaluate_respects_the_effective_window() {
    let h = setup().await;
    let cap = admin(&h).await;
    let mut bounded = draft("G1", "101,102", "INCLUDE", date(2024, 1, 1));
    bounded.expiration_date = Some(date(2024, 7, 1));
    h.service.add_rule(&cap, bounded).await.unwrap();

    let groups = BTreeSet::from(["G1".to_string()]);
    for (as_of, expected) in [
        (date(2024, 6, 1), Decision::Grant),
        (date(2023, 12, 31), Decision::Deny),
        (date(2024, 7, 1), Decision::Deny),
    ] {
        let evaluation = h.service.evaluate(101, &groups, as_of).await.unwrap();
        assert_eq!(evaluation.decision, expected, "as of {as_of}");
    }
}

#[tokio::test]
async fn failed_audit_write_is_reported_and_reconcilable() {
    let h = setup().await;
    let cap = admin(&h).await;
    let audited = h
        .service
        .add_rule(&cap, draft("G1", "1", "INCLUDE", date(2024, 1, 1)))
        .await
        .unwrap();
    assert!(h.service.reconcile().await.unwrap().is_empty());

    h.audit.failing.store(true, Ordering::SeqCst);
    h.audit.attempts.store(0, Ordering::SeqCst);
    let err = h
        .service
        .add_rule(&cap, draft("G2", "2", "INCLUDE", date(2024, 1, 1)))
        .await
        .unwrap_err();
    assert!(err.is_consistency_error());
    let mutation_id = match err {
        UcamError::AuditWriteFailed { mutation_id, .. } => mutation_id,
        other => panic!("expected AuditWriteFailed, got {other:?}"),
    };
    assert_eq!(h.audit.attempts.load(Ordering::SeqCst), 3);

    // The rule itself was written.
    let rules = h
        .service
        .list_rules(AccessRuleFilter {
            group_name: Some("G2".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].last_mutation_id, mutation_id);

    h.audit.failing.store(false, Ordering::SeqCst);
    let findings = h.service.reconcile().await.unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, FindingKind::MissingAudit);
    assert_eq!(findings[0].rule_id, rules[0].id);
    assert_eq!(findings[0].mutation_id, mutation_id);
    assert_ne!(findings[0].rule_id, audited.id);
}

#[tokio::test]
async fn failed_tombstone_leaves_the_rule_in_place() {
    let h = setup().await;
    let cap = admin(&h).await;
    let today = date(2024, 6, 1);
    let rule = h
        .service
        .add_rule(&cap, draft("G1", "1", "INCLUDE", date(2024, 1, 1)))
        .await
        .unwrap();
    h.service.expire_rule(&cap, rule.id, today).await.unwrap();

    h.audit.failing.store(true, Ordering::SeqCst);
    let err = h.service.delete_rule(&cap, rule.id, today).await.unwrap_err();
    assert!(matches!(err, UcamError::AuditWriteFailed { .. }));
    h.audit.failing.store(false, Ordering::SeqCst);

    // Nothing was deleted and every stored mutation is still audited.
    assert_eq!(h.service.get_rule(rule.id).await.unwrap().id, rule.id);
    let tombstones = h
        .audit
        .list(AuditLogFilter {
            action_types: vec![AuditAction::Delete],
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(tombstones.is_empty());
    assert!(h.service.reconcile().await.unwrap().is_empty());

    // Retrying once the audit log is back completes the delete.
    h.service.delete_rule(&cap, rule.id, today).await.unwrap();
    assert!(matches!(
        h.service.get_rule(rule.id).await,
        Err(UcamError::NotFound { .. })
    ));
}

/// Rule repository whose deletes fail after everything else succeeded.
#[derive(Clone)]
struct FailingDeletes {
    inner: SurrealAccessRuleRepository<Db>,
}

impl AccessRuleRepository for FailingDeletes {
    async fn create(&self, input: CreateAccessRule) -> UcamResult<AccessRule> {
        self.inner.create(input).await
    }

    async fn get_by_id(&self, id: Uuid) -> UcamResult<AccessRule> {
        self.inner.get_by_id(id).await
    }

    async fn update(&self, id: Uuid, input: UpdateAccessRule) -> UcamResult<AccessRule> {
        self.inner.update(id, input).await
    }

    async fn expire(
        &self,
        id: Uuid,
        expiration_date: NaiveDate,
        modified_by: &str,
        mutation_id: Uuid,
    ) -> UcamResult<AccessRule> {
        self.inner
            .expire(id, expiration_date, modified_by, mutation_id)
            .await
    }

    async fn delete_expired(&self, _id: Uuid, _as_of: NaiveDate) -> UcamResult<bool> {
        Err(UcamError::Database("connection reset".into()))
    }

    async fn list(&self, filter: AccessRuleFilter) -> UcamResult<Vec<AccessRule>> {
        self.inner.list(filter).await
    }

    async fn list_for_groups(&self, groups: &BTreeSet<String>) -> UcamResult<Vec<AccessRule>> {
        self.inner.list_for_groups(groups).await
    }
}

#[tokio::test]
async fn delete_failing_after_its_tombstone_is_an_inconsistency() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    ucam_db::run_migrations(&db).await.unwrap();

    let memberships = SurrealMembershipRepository::new(db.clone());
    memberships
        .add_member(&Principal::new("admin@example.com"), ADMIN_GROUP)
        .await
        .unwrap();
    let cap = Authorizer::new(memberships.clone(), ADMIN_GROUP)
        .authorize_admin(&Principal::new("admin@example.com"))
        .await
        .unwrap();
    let service = AccessService::new(
        FailingDeletes {
            inner: SurrealAccessRuleRepository::new(db.clone()),
        },
        AuditRecorder::new(SurrealAuditLogRepository::new(db.clone()), fast_retry()),
        memberships,
    );

    let today = date(2024, 6, 1);
    let rule = service
        .add_rule(&cap, draft("G1", "1", "INCLUDE", date(2024, 1, 1)))
        .await
        .unwrap();
    service.expire_rule(&cap, rule.id, today).await.unwrap();

    let err = service.delete_rule(&cap, rule.id, today).await.unwrap_err();
    assert!(matches!(err, UcamError::Inconsistency(_)));
    assert!(err.is_consistency_error());

    let findings = service.reconcile().await.unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, FindingKind::DeletedButPresent);
    assert_eq!(findings[0].rule_id, rule.id);
}
