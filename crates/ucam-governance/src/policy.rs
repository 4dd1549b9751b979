//! Row-filter function and policy generation, and tag propagation from
//! parent securables down to matching columns.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;
use ucam_core::error::{UcamError, UcamResult};
use ucam_core::models::audit::{AuditAction, AuditObjectType, CreateAuditLogEntry};
use ucam_core::models::catalog::{Securable, TableRef};
use ucam_core::models::statement::IssuedStatement;
use ucam_core::repository::{AuditLogRepository, CatalogRepository, StatementRegistry};
use ucam_core::statement::{
    AlterTags, CreateFilterFunction, CreateRowFilterPolicy, GroupCheck, QualifiedName,
    RowFilterPolicyParams, Statement,
};
use ucam_core::validation::validate_identifier;
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::authz::AdminCapability;
use crate::config::GovernanceConfig;
use crate::tags::TagService;

pub const DEFAULT_FUNCTION_NAME: &str = "customer_access_filter";
pub const DEFAULT_POLICY_NAME: &str = "customer_access_policy";
pub const DEFAULT_POLICY_COMMENT: &str = "Apply customer_id row filtering to tagged columns";
pub const DEFAULT_POLICY_PRINCIPAL: &str = "account users";
pub const DEFAULT_POLICY_TAG: &str = "secure_contracts";
pub const DEFAULT_POLICY_TAG_VALUE: &str = "true";
pub const DEFAULT_TARGET_COLUMN: &str = "customer_id";

#[derive(Debug, Clone, Serialize)]
pub struct FilterFunctionRequest {
    pub catalog: String,
    pub schema: String,
    pub function_name: String,
    /// Qualified `catalog.schema.table` of the access table.
    pub access_table: String,
    pub group_check: GroupCheck,
}

impl FilterFunctionRequest {
    /// Request targeting the configured catalog, schema and access table.
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self {
            catalog: config.catalog.clone(),
            schema: config.schema.clone(),
            function_name: DEFAULT_FUNCTION_NAME.into(),
            access_table: config.qualified_access_table(),
            group_check: GroupCheck::default(),
        }
    }

    pub fn qualified_function(&self) -> String {
        format!("{}.{}.{}", self.catalog, self.schema, self.function_name)
    }

    pub fn build(&self) -> UcamResult<CreateFilterFunction> {
        let function = QualifiedName::new(&[
            self.catalog.as_str(),
            self.schema.as_str(),
            self.function_name.as_str(),
        ])?;
        CreateFilterFunction::new(
            function,
            QualifiedName::parse(&self.access_table)?,
            self.group_check,
        )
    }
}

/// Policy parameters preset for the configured schema and the default filter
/// function.
pub fn default_policy_params(config: &GovernanceConfig) -> RowFilterPolicyParams {
    RowFilterPolicyParams {
        catalog: config.catalog.clone(),
        schema: config.schema.clone(),
        policy_name: DEFAULT_POLICY_NAME.into(),
        comment: DEFAULT_POLICY_COMMENT.into(),
        function: FilterFunctionRequest::from_config(config).qualified_function(),
        principal: DEFAULT_POLICY_PRINCIPAL.into(),
        tag_name: DEFAULT_POLICY_TAG.into(),
        tag_value: DEFAULT_POLICY_TAG_VALUE.into(),
    }
}

/// Copy a parent-level tag onto a column of every table below it.
#[derive(Debug, Clone, Serialize)]
pub struct PropagationRequest {
    /// Tag looked up on catalogs, schemas and tables.
    pub parent_tag: String,
    /// Value that must appear in the parent tag's comma-separated values.
    pub required_value: String,
    pub column_name: String,
    pub column_tag: String,
    pub column_tag_value: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropagationAction {
    pub table: TableRef,
    pub column_name: String,
    /// Full name of the tagged securable that selected this table.
    pub source: String,
    pub statement: AlterTags,
}

impl PropagationAction {
    pub fn sql(&self) -> String {
        self.statement.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PropagationOutcome {
    pub dry_run: bool,
    pub actions: Vec<PropagationAction>,
}

pub struct PolicyTools<S, C, A>
where
    S: StatementRegistry,
    C: CatalogRepository,
    A: AuditLogRepository,
{
    statements: S,
    tags: TagService<C, A>,
    audit: AuditRecorder<A>,
}

impl<S, C, A> PolicyTools<S, C, A>
where
    S: StatementRegistry,
    C: CatalogRepository,
    A: AuditLogRepository + Clone,
{
    pub fn new(statements: S, catalog: C, audit: AuditRecorder<A>) -> Self {
        Self {
            statements,
            tags: TagService::new(catalog, audit.clone()),
            audit,
        }
    }
}

impl<S, C, A> PolicyTools<S, C, A>
where
    S: StatementRegistry,
    C: CatalogRepository,
    A: AuditLogRepository,
{
    pub async fn create_filter_function(
        &self,
        cap: &AdminCapability,
        request: &FilterFunctionRequest,
    ) -> UcamResult<IssuedStatement> {
        let statement = request.build()?;
        self.submit(
            cap,
            statement.into(),
            AuditAction::FunctionCreate,
            AuditObjectType::FilterFunction,
        )
        .await
    }

    pub async fn create_row_filter_policy(
        &self,
        cap: &AdminCapability,
        params: &RowFilterPolicyParams,
    ) -> UcamResult<IssuedStatement> {
        let statement = CreateRowFilterPolicy::from_params(params)?;
        self.submit(
            cap,
            statement.into(),
            AuditAction::PolicyCreate,
            AuditObjectType::RowFilterPolicy,
        )
        .await
    }

    pub async fn issued_statements(&self, limit: u64) -> UcamResult<Vec<IssuedStatement>> {
        self.statements.list(limit).await
    }

    async fn submit(
        &self,
        cap: &AdminCapability,
        statement: Statement,
        action: AuditAction,
        object_type: AuditObjectType,
    ) -> UcamResult<IssuedStatement> {
        let issued = self.statements.submit(&statement, cap.principal()).await?;
        info!(kind = issued.kind.as_str(), object = %issued.target, user = cap.user(), "statement issued");

        self.audit
            .record(CreateAuditLogEntry {
                id: Uuid::new_v4(),
                user: cap.user().to_string(),
                action_type: action,
                object_type,
                object_name: issued.target.clone(),
                old_value: None,
                new_value: Some(issued.sql.clone()),
                notes: Some(format!("Created by {}", cap.user())),
            })
            .await?;
        Ok(issued)
    }

    /// Tables under a securable tagged `parent_tag` containing
    /// `required_value`, that also have `column_name`, one action each.
    pub async fn plan_propagation(
        &self,
        request: &PropagationRequest,
    ) -> UcamResult<Vec<PropagationAction>> {
        validate_identifier("Tag name", &request.parent_tag)?;
        validate_identifier("Tag name", &request.column_tag)?;
        validate_identifier("Column name", &request.column_name)?;
        let required = request.required_value.trim();
        if required.is_empty() {
            return Err(UcamError::validation("Required tag value cannot be empty"));
        }

        let catalog = self.tags.catalog();
        let tagged = catalog
            .tagged_securables(
                &request.parent_tag,
                request.catalog.as_deref(),
                request.schema.as_deref(),
            )
            .await?;

        // Table -> first securable that selected it.
        let mut selected: BTreeMap<TableRef, String> = BTreeMap::new();
        for entry in tagged {
            if !tag_values(&entry.tag_value).any(|v| v == required) {
                continue;
            }
            let tables = match &entry.securable {
                Securable::Catalog { catalog: name } => match request.schema.as_deref() {
                    Some(schema) => catalog.tables_in_schema(name, schema).await?,
                    None => catalog.tables_in_catalog(name).await?,
                },
                Securable::Schema {
                    catalog: name,
                    schema,
                } => catalog.tables_in_schema(name, schema).await?,
                Securable::Table(table) => vec![table.clone()],
                Securable::Column { .. } => Vec::new(),
            };
            let source = entry.securable.full_name();
            for table in tables {
                selected.entry(table).or_insert_with(|| source.clone());
            }
        }

        let mut actions = Vec::new();
        for (table, source) in selected {
            let columns = catalog.list_columns(&table).await?;
            let Some(column) = columns
                .into_iter()
                .find(|c| c.name == request.column_name)
            else {
                continue;
            };
            let statement = AlterTags::set(
                Securable::Column {
                    table: table.clone(),
                    column: column.name.clone(),
                },
                &request.column_tag,
                &request.column_tag_value,
            )?;
            actions.push(PropagationAction {
                table,
                column_name: column.name,
                source,
                statement,
            });
        }
        Ok(actions)
    }

    /// Plan, then apply every action unless `dry_run`.
    pub async fn propagate(
        &self,
        cap: &AdminCapability,
        request: &PropagationRequest,
        dry_run: bool,
    ) -> UcamResult<PropagationOutcome> {
        let actions = self.plan_propagation(request).await?;
        if dry_run {
            info!(planned = actions.len(), "tag propagation dry run");
            return Ok(PropagationOutcome { dry_run, actions });
        }

        let note = format!(
            "Propagated from {}={}",
            request.parent_tag,
            request.required_value.trim()
        );
        for action in &actions {
            self.tags
                .execute(cap, action.statement.clone(), Some(note.clone()))
                .await?;
        }
        info!(applied = actions.len(), user = cap.user(), "tag propagation applied");
        Ok(PropagationOutcome { dry_run, actions })
    }
}

fn tag_values(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|v| !v.is_empty())
}
