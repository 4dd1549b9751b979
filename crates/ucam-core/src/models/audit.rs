//! Audit log domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UcamError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Insert,
    Update,
    Expire,
    Delete,
    TagApply,
    TagRemove,
    FunctionCreate,
    PolicyCreate,
}

impl AuditAction {
    pub const ALL: [AuditAction; 8] = [
        AuditAction::Insert,
        AuditAction::Update,
        AuditAction::Expire,
        AuditAction::Delete,
        AuditAction::TagApply,
        AuditAction::TagRemove,
        AuditAction::FunctionCreate,
        AuditAction::PolicyCreate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Insert => "INSERT",
            AuditAction::Update => "UPDATE",
            AuditAction::Expire => "EXPIRE",
            AuditAction::Delete => "DELETE",
            AuditAction::TagApply => "TAG_APPLY",
            AuditAction::TagRemove => "TAG_REMOVE",
            AuditAction::FunctionCreate => "FUNCTION_CREATE",
            AuditAction::PolicyCreate => "POLICY_CREATE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = UcamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| UcamError::validation(format!("unknown audit action: {s}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditObjectType {
    GroupAccess,
    TableTag,
    ColumnTag,
    FilterFunction,
    RowFilterPolicy,
}

impl AuditObjectType {
    pub const ALL: [AuditObjectType; 5] = [
        AuditObjectType::GroupAccess,
        AuditObjectType::TableTag,
        AuditObjectType::ColumnTag,
        AuditObjectType::FilterFunction,
        AuditObjectType::RowFilterPolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditObjectType::GroupAccess => "GROUP_ACCESS",
            AuditObjectType::TableTag => "TABLE_TAG",
            AuditObjectType::ColumnTag => "COLUMN_TAG",
            AuditObjectType::FilterFunction => "FILTER_FUNCTION",
            AuditObjectType::RowFilterPolicy => "ROW_FILTER_POLICY",
        }
    }
}

impl fmt::Display for AuditObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditObjectType {
    type Err = UcamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        AuditObjectType::ALL
            .into_iter()
            .find(|o| o.as_str() == wanted)
            .ok_or_else(|| UcamError::validation(format!("unknown audit object type: {s}")))
    }
}

/// One immutable row of the append-only audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditLogEntry {
    /// Equal to the id of the mutation that produced it.
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action_type: AuditAction,
    pub object_type: AuditObjectType,
    pub object_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateAuditLogEntry {
    /// Record id. Appending the same id twice is a no-op.
    pub id: Uuid,
    pub user: String,
    pub action_type: AuditAction,
    pub object_type: AuditObjectType,
    pub object_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notes: Option<String>,
}

/// Query filters for audit log entries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub user: Option<String>,
    /// Empty means any action.
    pub action_types: Vec<AuditAction>,
    pub object_type: Option<AuditObjectType>,
    pub limit: Option<u64>,
}
