//! Read-only reports over access rules, tags and the audit log.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use ucam_core::error::{UcamError, UcamResult};
use ucam_core::models::access_rule::{AccessRule, AccessRuleFilter, AccessType};
use ucam_core::models::audit::{AuditAction, AuditLogEntry, AuditLogFilter};
use ucam_core::models::catalog::{TagCoverage, TagOption};
use ucam_core::repository::{AccessRuleRepository, AuditLogRepository, CatalogRepository};
use uuid::Uuid;

use crate::config::GovernanceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleMetrics {
    pub total: usize,
    pub active: usize,
    pub expiring_soon: usize,
}

impl RuleMetrics {
    pub fn labelled(&self) -> [(&'static str, usize); 3] {
        [
            ("Total Rules", self.total),
            ("Active Rules", self.active),
            ("Expiring Soon (7d)", self.expiring_soon),
        ]
    }
}

/// Count rules, active rules, and active rules whose expiration falls
/// within `soon_days` of `as_of`.
pub fn rule_metrics(rules: &[AccessRule], as_of: NaiveDate, soon_days: i64) -> RuleMetrics {
    let horizon = as_of + Duration::days(soon_days);
    let active: Vec<&AccessRule> = rules.iter().filter(|r| r.is_active(as_of)).collect();
    let expiring_soon = active
        .iter()
        .filter(|r| r.expiration_date.is_some_and(|exp| exp <= horizon))
        .count();
    RuleMetrics {
        total: rules.len(),
        active: active.len(),
        expiring_soon,
    }
}

/// One-line description of what a rule does to its group's visibility.
pub fn access_summary(rule: &AccessRule) -> String {
    let n = rule.customer_count();
    match (rule.access_type, rule.applies_to_all_customers()) {
        (AccessType::Include, true) => "Access given as ADMIN, all customers available".into(),
        (AccessType::Include, false) => {
            format!("Access INCLUDED for {n} customers, EXCLUDED for all others")
        }
        (AccessType::Exclude, true) => "Access EXCLUDED for all customers".into(),
        (AccessType::Exclude, false) => {
            format!("Access EXCLUDED for {n} customers, PROVIDED for all others")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixRow {
    pub rule_id: Uuid,
    pub group_name: String,
    pub access_type: AccessType,
    pub customer_count: usize,
    pub access_summary: String,
    pub effective_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl From<&AccessRule> for MatrixRow {
    fn from(rule: &AccessRule) -> Self {
        Self {
            rule_id: rule.id,
            group_name: rule.group_name.clone(),
            access_type: rule.access_type,
            customer_count: rule.customer_count(),
            access_summary: access_summary(rule),
            effective_date: rule.effective_date,
            expiration_date: rule.expiration_date,
            notes: rule.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapCell {
    pub group_name: String,
    pub access_type: AccessType,
    pub customer_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessMatrix {
    /// Rules not expired at the report date.
    pub current: Vec<MatrixRow>,
    /// Rules that expired within the lookback window.
    pub recently_expired: Vec<MatrixRow>,
    pub heatmap: Vec<HeatmapCell>,
}

pub fn access_matrix(rules: &[AccessRule], as_of: NaiveDate, lookback_days: i64) -> AccessMatrix {
    let cutoff = as_of - Duration::days(lookback_days);
    let current: Vec<MatrixRow> = rules
        .iter()
        .filter(|r| !r.is_expired(as_of))
        .map(MatrixRow::from)
        .collect();
    let recently_expired = rules
        .iter()
        .filter(|r| {
            r.expiration_date
                .is_some_and(|exp| exp <= as_of && exp >= cutoff)
        })
        .map(MatrixRow::from)
        .collect();
    let heatmap = heatmap(&current);
    AccessMatrix {
        current,
        recently_expired,
        heatmap,
    }
}

/// Customer counts summed per (group, access type).
pub fn heatmap(rows: &[MatrixRow]) -> Vec<HeatmapCell> {
    let mut cells: BTreeMap<(&str, &str), (AccessType, usize)> = BTreeMap::new();
    for row in rows {
        let cell = cells
            .entry((row.group_name.as_str(), row.access_type.as_str()))
            .or_insert((row.access_type, 0));
        cell.1 += row.customer_count;
    }
    cells
        .into_iter()
        .map(|((group, _), (access_type, customer_count))| HeatmapCell {
            group_name: group.to_string(),
            access_type,
            customer_count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub tag: TagOption,
    pub tables: TagCoverage,
    pub columns: TagCoverage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub total_changes: usize,
    pub unique_users: usize,
    pub most_common_action: Option<AuditAction>,
}

impl ChangeSummary {
    pub fn most_common_action_label(&self) -> &'static str {
        self.most_common_action.map_or("N/A", |a| a.as_str())
    }
}

pub fn change_summary(entries: &[AuditLogEntry]) -> ChangeSummary {
    let users: BTreeSet<&str> = entries.iter().map(|e| e.user.as_str()).collect();
    let mut counts: BTreeMap<AuditAction, usize> = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.action_type).or_default() += 1;
    }
    // Ties go to the action listed first.
    let most_common_action = counts
        .iter()
        .fold(None, |best: Option<(AuditAction, usize)>, (&action, &n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((action, n)),
        })
        .map(|(action, _)| action);
    ChangeSummary {
        total_changes: entries.len(),
        unique_users: users.len(),
        most_common_action,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeHistory {
    pub summary: ChangeSummary,
    pub entries: Vec<AuditLogEntry>,
}

#[derive(Serialize)]
struct AuditCsvRow<'a> {
    id: String,
    timestamp: String,
    user: &'a str,
    action_type: &'static str,
    object_type: &'static str,
    object_name: &'a str,
    old_value: &'a str,
    new_value: &'a str,
    notes: &'a str,
}

/// Render audit entries as CSV with a header row.
pub fn audit_csv(entries: &[AuditLogEntry]) -> UcamResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for e in entries {
        writer
            .serialize(AuditCsvRow {
                id: e.id.to_string(),
                timestamp: e.timestamp.to_rfc3339(),
                user: &e.user,
                action_type: e.action_type.as_str(),
                object_type: e.object_type.as_str(),
                object_name: &e.object_name,
                old_value: e.old_value.as_deref().unwrap_or_default(),
                new_value: e.new_value.as_deref().unwrap_or_default(),
                notes: e.notes.as_deref().unwrap_or_default(),
            })
            .map_err(|e| UcamError::Internal(format!("csv: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| UcamError::Internal(format!("csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| UcamError::Internal(format!("csv: {e}")))
}

pub struct ReportService<R, A, C>
where
    R: AccessRuleRepository,
    A: AuditLogRepository,
    C: CatalogRepository,
{
    rules: R,
    audit: A,
    catalog: C,
    config: GovernanceConfig,
}

impl<R, A, C> ReportService<R, A, C>
where
    R: AccessRuleRepository,
    A: AuditLogRepository,
    C: CatalogRepository,
{
    pub fn new(rules: R, audit: A, catalog: C, config: GovernanceConfig) -> Self {
        Self {
            rules,
            audit,
            catalog,
            config,
        }
    }

    pub async fn rule_metrics(&self, as_of: NaiveDate) -> UcamResult<RuleMetrics> {
        let rules = self.rules.list(AccessRuleFilter::default()).await?;
        Ok(rule_metrics(&rules, as_of, self.config.expiring_soon_days))
    }

    pub async fn access_matrix(&self, as_of: NaiveDate) -> UcamResult<AccessMatrix> {
        let rules = self.rules.list(AccessRuleFilter::default()).await?;
        Ok(access_matrix(&rules, as_of, self.config.expired_lookback_days))
    }

    pub async fn tag_coverage(
        &self,
        catalog: &str,
        schema: &str,
        tag: &TagOption,
    ) -> UcamResult<CoverageReport> {
        let (total, tagged) = self.catalog.table_tag_coverage(catalog, schema, tag).await?;
        let tables = TagCoverage { total, tagged };
        let (total, tagged) = self.catalog.column_tag_coverage(catalog, schema, tag).await?;
        let columns = TagCoverage { total, tagged };
        Ok(CoverageReport {
            tag: tag.clone(),
            tables,
            columns,
        })
    }

    pub async fn change_history(&self, mut filter: AuditLogFilter) -> UcamResult<ChangeHistory> {
        filter.limit = filter.limit.or(Some(self.config.audit_limit));
        let entries = self.audit.list(filter).await?;
        Ok(ChangeHistory {
            summary: change_summary(&entries),
            entries,
        })
    }

    pub async fn export_csv(&self, filter: AuditLogFilter) -> UcamResult<String> {
        let history = self.change_history(filter).await?;
        audit_csv(&history.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ucam_core::models::audit::AuditObjectType;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(
        group: &str,
        access_type: AccessType,
        ids: &[i64],
        effective: NaiveDate,
        expiration: Option<NaiveDate>,
    ) -> AccessRule {
        AccessRule {
            id: Uuid::new_v4(),
            group_name: group.into(),
            customer_ids: ids.iter().copied().collect(),
            access_type,
            effective_date: effective,
            expiration_date: expiration,
            notes: None,
            created_by: "admin@example.com".into(),
            created_at: Utc::now(),
            modified_by: "admin@example.com".into(),
            modified_at: Utc::now(),
            last_mutation_id: Uuid::new_v4(),
        }
    }

    fn entry(user: &str, action: AuditAction) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user: user.into(),
            action_type: action,
            object_type: AuditObjectType::GroupAccess,
            object_name: "rule".into(),
            old_value: None,
            new_value: Some("group_name=G1, note \"quoted\"".into()),
            notes: None,
        }
    }

    #[test]
    fn summaries_cover_all_four_shapes() {
        let today = date(2024, 1, 1);
        let cases: [(AccessType, Vec<i64>, &str); 4] = [
            (AccessType::Include, vec![], "Access given as ADMIN, all customers available"),
            (
                AccessType::Include,
                vec![1, 2],
                "Access INCLUDED for 2 customers, EXCLUDED for all others",
            ),
            (AccessType::Exclude, vec![], "Access EXCLUDED for all customers"),
            (
                AccessType::Exclude,
                vec![3],
                "Access EXCLUDED for 1 customers, PROVIDED for all others",
            ),
        ];
        for (access_type, ids, expected) in cases {
            assert_eq!(access_summary(&rule("G", access_type, &ids, today, None)), expected);
        }
    }

    #[test]
    fn metrics_count_active_and_expiring() {
        let today = date(2024, 6, 1);
        let rules = vec![
            rule("A", AccessType::Include, &[1], date(2024, 1, 1), None),
            rule("A", AccessType::Include, &[2], date(2024, 1, 1), Some(date(2024, 6, 5))),
            rule("B", AccessType::Exclude, &[3], date(2024, 1, 1), Some(date(2024, 7, 1))),
            rule("B", AccessType::Exclude, &[4], date(2024, 1, 1), Some(date(2024, 5, 1))),
            rule("C", AccessType::Include, &[5], date(2024, 9, 1), None),
        ];
        let metrics = rule_metrics(&rules, today, 7);
        assert_eq!(
            metrics,
            RuleMetrics {
                total: 5,
                active: 3,
                expiring_soon: 1
            }
        );
        assert_eq!(metrics.labelled()[2], ("Expiring Soon (7d)", 1));
    }

    #[test]
    fn matrix_splits_current_and_recently_expired() {
        let today = date(2024, 6, 1);
        let rules = vec![
            rule("A", AccessType::Include, &[1, 2], date(2024, 1, 1), None),
            rule("A", AccessType::Include, &[3], date(2024, 7, 1), None),
            rule("B", AccessType::Exclude, &[4], date(2024, 1, 1), Some(date(2024, 5, 1))),
            rule("B", AccessType::Exclude, &[5], date(2023, 1, 1), Some(date(2023, 6, 1))),
        ];
        let matrix = access_matrix(&rules, today, 60);
        assert_eq!(matrix.current.len(), 2);
        assert_eq!(matrix.recently_expired.len(), 1);
        assert_eq!(
            matrix.heatmap,
            vec![HeatmapCell {
                group_name: "A".into(),
                access_type: AccessType::Include,
                customer_count: 3,
            }]
        );
    }

    #[test]
    fn change_summary_reports_most_common_action() {
        let entries = vec![
            entry("a@example.com", AuditAction::Update),
            entry("b@example.com", AuditAction::Insert),
            entry("a@example.com", AuditAction::Update),
        ];
        let summary = change_summary(&entries);
        assert_eq!(summary.total_changes, 3);
        assert_eq!(summary.unique_users, 2);
        assert_eq!(summary.most_common_action, Some(AuditAction::Update));

        let empty = change_summary(&[]);
        assert_eq!(empty.most_common_action_label(), "N/A");
    }

    #[test]
    fn csv_has_header_and_quotes_values() {
        let csv = audit_csv(&[entry("a@example.com", AuditAction::Insert)]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("id,timestamp,user,action_type,object_type,object_name,old_value,new_value,notes")
        );
        let row = lines.next().unwrap();
        assert!(row.contains(",INSERT,GROUP_ACCESS,rule,,"));
        assert!(row.contains("\"group_name=G1, note \"\"quoted\"\"\""));
    }
}
