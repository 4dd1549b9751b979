//! Group customer access rule domain model.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UcamError;

/// Whether a rule grants or withholds visibility of its customers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    Include,
    Exclude,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Include => "INCLUDE",
            AccessType::Exclude => "EXCLUDE",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = UcamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INCLUDE" => Ok(AccessType::Include),
            "EXCLUDE" => Ok(AccessType::Exclude),
            other => Err(UcamError::validation(format!(
                "unknown access type: {other:?} (expected INCLUDE or EXCLUDE)"
            ))),
        }
    }
}

/// A time-bounded INCLUDE/EXCLUDE rule for one group.
///
/// An empty `customer_ids` set is a wildcard over every customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessRule {
    pub id: Uuid,
    pub group_name: String,
    pub customer_ids: BTreeSet<i64>,
    pub access_type: AccessType,
    pub effective_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub modified_by: String,
    pub modified_at: DateTime<Utc>,
    /// Id of the most recent mutation; its audit entry carries the same id.
    pub last_mutation_id: Uuid,
}

impl AccessRule {
    /// Active iff `effective_date <= as_of` and the rule has not reached
    /// its (exclusive) expiration date.
    pub fn is_active(&self, as_of: NaiveDate) -> bool {
        self.effective_date <= as_of && self.expiration_date.is_none_or(|exp| as_of < exp)
    }

    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        self.expiration_date.is_some_and(|exp| exp <= as_of)
    }

    pub fn applies_to_all_customers(&self) -> bool {
        self.customer_ids.is_empty()
    }

    /// Whether the rule's customer scope covers `customer_id`.
    pub fn matches_customer(&self, customer_id: i64) -> bool {
        self.customer_ids.is_empty() || self.customer_ids.contains(&customer_id)
    }

    pub fn customer_count(&self) -> usize {
        self.customer_ids.len()
    }

    /// Compact `key=value` rendering used for audit before/after values.
    pub fn audit_value(&self) -> String {
        let ids: Vec<String> = self.customer_ids.iter().map(i64::to_string).collect();
        format!(
            "group_name={}, customer_ids=[{}], access_type={}, effective_date={}, expiration_date={}",
            self.group_name,
            ids.join(","),
            self.access_type,
            self.effective_date,
            self.expiration_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "none".into()),
        )
    }
}

/// Validated input for a new rule. Build it through
/// [`crate::validation::RuleDraft::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccessRule {
    pub group_name: String,
    pub customer_ids: BTreeSet<i64>,
    pub access_type: AccessType,
    pub effective_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_by: String,
    pub mutation_id: Uuid,
}

/// Full replacement of a rule's editable fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAccessRule {
    pub group_name: String,
    pub customer_ids: BTreeSet<i64>,
    pub access_type: AccessType,
    pub effective_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub modified_by: String,
    pub mutation_id: Uuid,
}

/// Lifecycle filter for rule listings, relative to an `as_of` date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    #[default]
    All,
    Active,
    Expired,
}

impl FromStr for RuleStatus {
    type Err = UcamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(RuleStatus::All),
            "active" => Ok(RuleStatus::Active),
            "expired" => Ok(RuleStatus::Expired),
            other => Err(UcamError::validation(format!("unknown rule status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessRuleFilter {
    pub group_name: Option<String>,
    pub customer_id: Option<i64>,
    pub status: RuleStatus,
    /// Reference date for `status`; callers pass "today".
    pub as_of: Option<NaiveDate>,
}
