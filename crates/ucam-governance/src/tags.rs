//! Catalog browsing and audited table/column tag changes.

use tracing::info;
use ucam_core::error::{UcamError, UcamResult};
use ucam_core::models::audit::{AuditAction, AuditObjectType, CreateAuditLogEntry};
use ucam_core::models::catalog::{ColumnInfo, GovernedTag, Securable, TableRef, TagOption};
use ucam_core::repository::{AuditLogRepository, CatalogRepository};
use ucam_core::statement::{AlterTags, TagChange};
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::authz::AdminCapability;

pub struct TagService<C: CatalogRepository, A: AuditLogRepository> {
    catalog: C,
    audit: AuditRecorder<A>,
}

impl<C: CatalogRepository, A: AuditLogRepository> TagService<C, A> {
    pub fn new(catalog: C, audit: AuditRecorder<A>) -> Self {
        Self { catalog, audit }
    }

    pub(crate) fn catalog(&self) -> &C {
        &self.catalog
    }

    pub async fn list_catalogs(&self) -> UcamResult<Vec<String>> {
        self.catalog.list_catalogs().await
    }

    pub async fn list_schemas(&self, catalog: &str) -> UcamResult<Vec<String>> {
        self.catalog.list_schemas(catalog).await
    }

    pub async fn list_tables(&self, catalog: &str, schema: &str) -> UcamResult<Vec<String>> {
        self.catalog.list_tables(catalog, schema).await
    }

    pub async fn list_columns(&self, table: &TableRef) -> UcamResult<Vec<ColumnInfo>> {
        self.catalog.list_columns(table).await
    }

    pub async fn table_tags(&self, table: &TableRef) -> UcamResult<Vec<GovernedTag>> {
        self.catalog.table_tags(table).await
    }

    pub async fn column_tags(&self, table: &TableRef) -> UcamResult<Vec<GovernedTag>> {
        self.catalog.column_tags(table).await
    }

    pub async fn tag_options(&self, catalog: &str, schema: &str) -> UcamResult<Vec<TagOption>> {
        self.catalog.tag_options(catalog, schema).await
    }

    pub async fn apply_table_tag(
        &self,
        cap: &AdminCapability,
        table: &TableRef,
        tag_name: &str,
        tag_value: &str,
    ) -> UcamResult<AlterTags> {
        let statement = AlterTags::set(Securable::Table(table.clone()), tag_name, tag_value)?;
        self.execute(cap, statement, None).await
    }

    pub async fn remove_table_tag(
        &self,
        cap: &AdminCapability,
        table: &TableRef,
        tag_name: &str,
    ) -> UcamResult<AlterTags> {
        let statement = AlterTags::unset(Securable::Table(table.clone()), tag_name)?;
        self.execute(cap, statement, None).await
    }

    pub async fn apply_column_tag(
        &self,
        cap: &AdminCapability,
        table: &TableRef,
        column: &str,
        tag_name: &str,
        tag_value: &str,
    ) -> UcamResult<AlterTags> {
        let statement = AlterTags::set(column_of(table, column), tag_name, tag_value)?;
        self.execute(cap, statement, None).await
    }

    pub async fn remove_column_tag(
        &self,
        cap: &AdminCapability,
        table: &TableRef,
        column: &str,
        tag_name: &str,
    ) -> UcamResult<AlterTags> {
        let statement = AlterTags::unset(column_of(table, column), tag_name)?;
        self.execute(cap, statement, None).await
    }

    /// Apply a tag statement and record one audit entry for it, with the
    /// prior values of the touched tags as `old_value`.
    /// `notes` overrides the default "Applied by"/"Removed by" note.
    pub(crate) async fn execute(
        &self,
        cap: &AdminCapability,
        statement: AlterTags,
        notes: Option<String>,
    ) -> UcamResult<AlterTags> {
        let touched = touched_names(&statement);
        let prior: Vec<TagOption> = self
            .catalog
            .tags_on(statement.securable())
            .await?
            .into_iter()
            .filter(|tag| touched.contains(&tag.tag_name.as_str()))
            .collect();
        if matches!(statement.change(), TagChange::Unset(_)) && prior.is_empty() {
            return Err(UcamError::validation(format!(
                "Tag {} is not set on {}",
                touched.join(", "),
                statement.securable().full_name()
            )));
        }

        self.catalog.apply_tags(&statement).await?;
        info!(
            target_name = %statement.securable().full_name(),
            user = cap.user(),
            sql = %statement,
            "tags changed"
        );

        self.audit
            .record(tag_entry(cap, &statement, &prior, notes))
            .await?;
        Ok(statement)
    }
}

fn column_of(table: &TableRef, column: &str) -> Securable {
    Securable::Column {
        table: table.clone(),
        column: column.to_string(),
    }
}

fn touched_names(statement: &AlterTags) -> Vec<&str> {
    match statement.change() {
        TagChange::Set(pairs) => pairs.iter().map(|(name, _)| name.as_str()).collect(),
        TagChange::Unset(names) => names.iter().map(|name| name.as_str()).collect(),
    }
}

fn tag_entry(
    cap: &AdminCapability,
    statement: &AlterTags,
    prior: &[TagOption],
    notes: Option<String>,
) -> CreateAuditLogEntry {
    let object_type = match statement.securable() {
        Securable::Column { .. } => AuditObjectType::ColumnTag,
        _ => AuditObjectType::TableTag,
    };
    let (action, new_value, default_note) = match statement.change() {
        TagChange::Set(pairs) => (
            AuditAction::TagApply,
            pairs
                .iter()
                .map(|(name, value)| format!("{}={value}", name.as_str()))
                .collect::<Vec<_>>()
                .join(", "),
            format!("Applied by {}", cap.user()),
        ),
        TagChange::Unset(names) => (
            AuditAction::TagRemove,
            names
                .iter()
                .map(|name| name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            format!("Removed by {}", cap.user()),
        ),
    };

    CreateAuditLogEntry {
        id: Uuid::new_v4(),
        user: cap.user().to_string(),
        action_type: action,
        object_type,
        object_name: statement.securable().full_name(),
        old_value: (!prior.is_empty()).then(|| {
            prior
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }),
        new_value: Some(new_value),
        notes: Some(notes.unwrap_or(default_note)),
    }
}
