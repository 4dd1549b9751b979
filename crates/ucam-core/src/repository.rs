//! Repository trait definitions for warehouse access abstraction.
//!
//! All repository operations are async. Implementations hold no state
//! beyond their client handle; the warehouse is the single source of truth.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::UcamResult;
use crate::models::{
    access_rule::{AccessRule, AccessRuleFilter, CreateAccessRule, UpdateAccessRule},
    audit::{AuditLogEntry, AuditLogFilter, AuditObjectType, CreateAuditLogEntry},
    catalog::{ColumnInfo, GovernedTag, Securable, TableRef, TagOption},
    principal::Principal,
    statement::IssuedStatement,
};
use crate::statement::{AlterTags, Statement};

/// Default cap on audit log listings.
pub const DEFAULT_AUDIT_LIMIT: u64 = 1000;

// ---------------------------------------------------------------------------
// Access rules (group_customer_access)
// ---------------------------------------------------------------------------

pub trait AccessRuleRepository: Send + Sync {
    fn create(&self, input: CreateAccessRule)
    -> impl Future<Output = UcamResult<AccessRule>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = UcamResult<AccessRule>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateAccessRule,
    ) -> impl Future<Output = UcamResult<AccessRule>> + Send;
    /// Set the expiration date and stamp the mutation.
    fn expire(
        &self,
        id: Uuid,
        expiration_date: NaiveDate,
        modified_by: &str,
        mutation_id: Uuid,
    ) -> impl Future<Output = UcamResult<AccessRule>> + Send;
    /// Delete the rule only if it is expired at `as_of`. Returns whether a
    /// row was removed.
    fn delete_expired(
        &self,
        id: Uuid,
        as_of: NaiveDate,
    ) -> impl Future<Output = UcamResult<bool>> + Send;
    /// Ordered by group name, then most recent effective date first.
    fn list(
        &self,
        filter: AccessRuleFilter,
    ) -> impl Future<Output = UcamResult<Vec<AccessRule>>> + Send;
    /// All rules of the given groups, regardless of lifecycle.
    fn list_for_groups(
        &self,
        groups: &BTreeSet<String>,
    ) -> impl Future<Output = UcamResult<Vec<AccessRule>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit log entry. Appending an id that already exists
    /// returns the stored entry unchanged. No update or delete operations
    /// exist.
    fn append(
        &self,
        input: CreateAuditLogEntry,
    ) -> impl Future<Output = UcamResult<AuditLogEntry>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = UcamResult<AuditLogEntry>> + Send;
    /// Which of `ids` have no audit entry.
    fn missing(&self, ids: &[Uuid]) -> impl Future<Output = UcamResult<Vec<Uuid>>> + Send;
    /// Which of `object_names` of `object_type` have a DELETE entry.
    fn tombstoned(
        &self,
        object_type: AuditObjectType,
        object_names: &[String],
    ) -> impl Future<Output = UcamResult<Vec<String>>> + Send;
    /// Newest first, capped at `filter.limit` or [`DEFAULT_AUDIT_LIMIT`].
    fn list(
        &self,
        filter: AuditLogFilter,
    ) -> impl Future<Output = UcamResult<Vec<AuditLogEntry>>> + Send;
}

// ---------------------------------------------------------------------------
// Governance catalog
// ---------------------------------------------------------------------------

/// A securable carrying a given tag, with that tag's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSecurable {
    pub securable: Securable,
    pub tag_value: String,
}

pub trait CatalogRepository: Send + Sync {
    fn register_catalog(&self, catalog: &str) -> impl Future<Output = UcamResult<()>> + Send;
    fn register_schema(
        &self,
        catalog: &str,
        schema: &str,
    ) -> impl Future<Output = UcamResult<()>> + Send;
    /// Register a table (and its catalog and schema) with its columns,
    /// replacing any previously registered columns.
    fn register_table(
        &self,
        table: &TableRef,
        columns: &[ColumnInfo],
    ) -> impl Future<Output = UcamResult<()>> + Send;

    fn list_catalogs(&self) -> impl Future<Output = UcamResult<Vec<String>>> + Send;
    fn list_schemas(&self, catalog: &str) -> impl Future<Output = UcamResult<Vec<String>>> + Send;
    fn list_tables(
        &self,
        catalog: &str,
        schema: &str,
    ) -> impl Future<Output = UcamResult<Vec<String>>> + Send;
    /// Ordered by column name.
    fn list_columns(
        &self,
        table: &TableRef,
    ) -> impl Future<Output = UcamResult<Vec<ColumnInfo>>> + Send;
    fn tables_in_catalog(
        &self,
        catalog: &str,
    ) -> impl Future<Output = UcamResult<Vec<TableRef>>> + Send;
    fn tables_in_schema(
        &self,
        catalog: &str,
        schema: &str,
    ) -> impl Future<Output = UcamResult<Vec<TableRef>>> + Send;

    fn table_tags(
        &self,
        table: &TableRef,
    ) -> impl Future<Output = UcamResult<Vec<GovernedTag>>> + Send;
    /// Tags on every column of `table`, ordered by column then tag name.
    fn column_tags(
        &self,
        table: &TableRef,
    ) -> impl Future<Output = UcamResult<Vec<GovernedTag>>> + Send;
    /// Tags currently set directly on `securable`, ordered by tag name.
    fn tags_on(
        &self,
        securable: &Securable,
    ) -> impl Future<Output = UcamResult<Vec<TagOption>>> + Send;
    /// Distinct table and column tag pairs within a schema.
    fn tag_options(
        &self,
        catalog: &str,
        schema: &str,
    ) -> impl Future<Output = UcamResult<Vec<TagOption>>> + Send;
    /// (total tables, tables tagged with `tag`) in a schema.
    fn table_tag_coverage(
        &self,
        catalog: &str,
        schema: &str,
        tag: &TagOption,
    ) -> impl Future<Output = UcamResult<(u64, u64)>> + Send;
    /// (total columns, columns tagged with `tag`) in a schema.
    fn column_tag_coverage(
        &self,
        catalog: &str,
        schema: &str,
        tag: &TagOption,
    ) -> impl Future<Output = UcamResult<(u64, u64)>> + Send;

    /// Catalogs, schemas and tables carrying `tag_name`, optionally narrowed
    /// to a catalog and schema.
    fn tagged_securables(
        &self,
        tag_name: &str,
        catalog: Option<&str>,
        schema: Option<&str>,
    ) -> impl Future<Output = UcamResult<Vec<TaggedSecurable>>> + Send;

    /// Apply a tag statement to the governance catalog.
    fn apply_tags(&self, statement: &AlterTags) -> impl Future<Output = UcamResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Principals
// ---------------------------------------------------------------------------

pub trait MembershipRepository: Send + Sync {
    fn add_member(
        &self,
        principal: &Principal,
        group_name: &str,
    ) -> impl Future<Output = UcamResult<()>> + Send;
    fn remove_member(
        &self,
        principal: &Principal,
        group_name: &str,
    ) -> impl Future<Output = UcamResult<()>> + Send;
    fn is_member(
        &self,
        principal: &Principal,
        group_name: &str,
    ) -> impl Future<Output = UcamResult<bool>> + Send;
    fn groups_for(
        &self,
        principal: &Principal,
    ) -> impl Future<Output = UcamResult<BTreeSet<String>>> + Send;
    fn has_members(&self, group_name: &str) -> impl Future<Output = UcamResult<bool>> + Send;
}

// ---------------------------------------------------------------------------
// Issued statements
// ---------------------------------------------------------------------------

/// Hand-off point for generated DDL.
pub trait StatementRegistry: Send + Sync {
    fn submit(
        &self,
        statement: &Statement,
        issued_by: &Principal,
    ) -> impl Future<Output = UcamResult<IssuedStatement>> + Send;
    /// Newest first.
    fn list(&self, limit: u64) -> impl Future<Output = UcamResult<Vec<IssuedStatement>>> + Send;
}
