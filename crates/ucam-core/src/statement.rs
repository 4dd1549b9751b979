//! Typed warehouse statement builders.
//!
//! Each statement kind is a struct whose parts are already validated:
//! identifiers are checked on construction and rendered back-quoted,
//! literals are single-quote escaped. Rendering never splices raw user
//! text into SQL.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{UcamError, UcamResult};
use crate::models::catalog::{Securable, TableRef};
use crate::validation::validate_identifier;

/// A validated, back-quoted SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: &str) -> UcamResult<Self> {
        validate_identifier("Identifier", value)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.0)
    }
}

/// Dotted name of one to four identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName(Vec<Identifier>);

impl QualifiedName {
    pub fn new(parts: &[&str]) -> UcamResult<Self> {
        if parts.is_empty() || parts.len() > 4 {
            return Err(UcamError::validation(format!(
                "qualified name must have 1 to 4 parts, got {}",
                parts.len()
            )));
        }
        parts
            .iter()
            .map(|p| Identifier::new(p))
            .collect::<UcamResult<Vec<_>>>()
            .map(Self)
    }

    /// Parse `a.b.c`. Parts are validated individually, so quoting is not
    /// accepted in the input.
    pub fn parse(dotted: &str) -> UcamResult<Self> {
        let parts: Vec<&str> = dotted.split('.').map(str::trim).collect();
        Self::new(&parts)
    }

    pub fn table(table: &TableRef) -> UcamResult<Self> {
        Self::new(&[table.catalog.as_str(), table.schema.as_str(), table.table.as_str()])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unquoted dotted form, for audit object names.
    pub fn dotted(&self) -> String {
        self.0
            .iter()
            .map(Identifier::as_str)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

/// A single-quoted SQL string literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlString(String);

impl SqlString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0.replace('\\', "\\\\").replace('\'', "''"))
    }
}

/// Principal name rendered back-quoted (e.g. `` `account users` ``).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalName(String);

impl PrincipalName {
    pub fn new(value: &str) -> UcamResult<Self> {
        let value = value.trim();
        if value.is_empty() || value.chars().any(char::is_control) {
            return Err(UcamError::validation(format!(
                "invalid principal name: {value:?}"
            )));
        }
        Ok(Self(value.to_string()))
    }
}

impl fmt::Display for PrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.0.replace('`', "``"))
    }
}

/// Function used inside generated predicates to test group membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupCheck {
    #[default]
    IsMember,
    IsAccountGroupMember,
}

impl GroupCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupCheck::IsMember => "is_member",
            GroupCheck::IsAccountGroupMember => "is_account_group_member",
        }
    }
}

// ---------------------------------------------------------------------------
// CREATE FUNCTION
// ---------------------------------------------------------------------------

/// Row-filter predicate over the access table.
///
/// The generated body mirrors [`crate::evaluator`]: only active rules of
/// groups the caller belongs to count; a group makes the customer eligible
/// when it has no active INCLUDE rule or one covering the customer; any
/// active EXCLUDE covering the customer denies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFilterFunction {
    pub function: QualifiedName,
    pub access_table: QualifiedName,
    pub group_check: GroupCheck,
}

impl CreateFilterFunction {
    pub fn new(
        function: QualifiedName,
        access_table: QualifiedName,
        group_check: GroupCheck,
    ) -> UcamResult<Self> {
        if function.len() != 3 {
            return Err(UcamError::validation(
                "function name must be catalog.schema.function",
            ));
        }
        if access_table.len() != 3 {
            return Err(UcamError::validation(
                "access table must be catalog.schema.table",
            ));
        }
        Ok(Self {
            function,
            access_table,
            group_check,
        })
    }
}

fn active_window(alias: &str) -> String {
    format!(
        "{alias}.effective_date <= current_date() \
         AND ({alias}.expiration_date IS NULL OR {alias}.expiration_date > current_date())"
    )
}

fn covers_customer(alias: &str) -> String {
    format!(
        "({alias}.customer_ids IS NULL OR size({alias}.customer_ids) = 0 \
         OR array_contains({alias}.customer_ids, customer_id))"
    )
}

impl fmt::Display for CreateFilterFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = self.group_check.as_str();
        let table = &self.access_table;
        writeln!(
            f,
            "CREATE OR REPLACE FUNCTION {}(customer_id INT)",
            self.function
        )?;
        writeln!(f, "RETURN NOT EXISTS (")?;
        writeln!(f, "  SELECT 1 FROM {table} x")?;
        writeln!(f, "  WHERE {check}(x.group_name)")?;
        writeln!(f, "    AND {}", active_window("x"))?;
        writeln!(f, "    AND x.access_type = 'EXCLUDE'")?;
        writeln!(f, "    AND {}", covers_customer("x"))?;
        writeln!(f, ") AND EXISTS (")?;
        writeln!(f, "  SELECT 1 FROM {table} g")?;
        writeln!(f, "  WHERE {check}(g.group_name)")?;
        writeln!(f, "    AND {}", active_window("g"))?;
        writeln!(f, "    AND (")?;
        writeln!(
            f,
            "      (g.access_type = 'INCLUDE' AND {})",
            covers_customer("g")
        )?;
        writeln!(f, "      OR (g.access_type = 'EXCLUDE' AND NOT EXISTS (")?;
        writeln!(f, "        SELECT 1 FROM {table} i")?;
        writeln!(f, "        WHERE i.group_name = g.group_name")?;
        writeln!(f, "          AND i.access_type = 'INCLUDE'")?;
        writeln!(f, "          AND {}", active_window("i"))?;
        writeln!(f, "      ))")?;
        writeln!(f, "    )")?;
        write!(f, ")")
    }
}

// ---------------------------------------------------------------------------
// CREATE POLICY ... ROW FILTER
// ---------------------------------------------------------------------------

/// Tag-matched row filter policy over every table of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRowFilterPolicy {
    pub policy: QualifiedName,
    pub schema: QualifiedName,
    pub comment: SqlString,
    pub function: QualifiedName,
    pub principal: PrincipalName,
    pub tag_name: SqlString,
    pub tag_value: SqlString,
    pub column_alias: Identifier,
}

/// Unvalidated policy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFilterPolicyParams {
    pub catalog: String,
    pub schema: String,
    pub policy_name: String,
    pub comment: String,
    pub function: String,
    pub principal: String,
    pub tag_name: String,
    pub tag_value: String,
}

impl CreateRowFilterPolicy {
    pub const DEFAULT_COLUMN_ALIAS: &'static str = "cust_col";

    pub fn from_params(params: &RowFilterPolicyParams) -> UcamResult<Self> {
        validate_identifier("Tag name", &params.tag_name)?;
        let function = QualifiedName::parse(&params.function)?;
        if function.len() != 3 {
            return Err(UcamError::validation(
                "filter function must be catalog.schema.function",
            ));
        }
        Ok(Self {
            policy: QualifiedName::new(&[
                params.catalog.as_str(),
                params.schema.as_str(),
                params.policy_name.as_str(),
            ])?,
            schema: QualifiedName::new(&[params.catalog.as_str(), params.schema.as_str()])?,
            comment: SqlString::new(params.comment.clone()),
            function,
            principal: PrincipalName::new(&params.principal)?,
            tag_name: SqlString::new(params.tag_name.clone()),
            tag_value: SqlString::new(params.tag_value.clone()),
            column_alias: Identifier::new(Self::DEFAULT_COLUMN_ALIAS)?,
        })
    }
}

impl fmt::Display for CreateRowFilterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CREATE OR REPLACE POLICY {}", self.policy)?;
        writeln!(f, "ON SCHEMA {}", self.schema)?;
        writeln!(f, "COMMENT {}", self.comment)?;
        writeln!(f, "ROW FILTER {}", self.function)?;
        writeln!(f, "TO {}", self.principal)?;
        writeln!(f, "FOR TABLES")?;
        writeln!(
            f,
            "MATCH COLUMNS hasTagValue({}, {}) AS {}",
            self.tag_name, self.tag_value, self.column_alias
        )?;
        write!(f, "USING COLUMNS ({})", self.column_alias)
    }
}

// ---------------------------------------------------------------------------
// ALTER ... SET / UNSET TAGS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagChange {
    Set(Vec<(Identifier, String)>),
    Unset(Vec<Identifier>),
}

/// Tag assignment on a catalog, schema, table or column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterTags {
    securable: Securable,
    change: TagChange,
}

impl AlterTags {
    pub fn set(securable: Securable, tag_name: &str, tag_value: &str) -> UcamResult<Self> {
        validate_identifier("Tag name", tag_name)?;
        Self::build(
            securable,
            TagChange::Set(vec![(Identifier::new(tag_name)?, tag_value.to_string())]),
        )
    }

    pub fn unset(securable: Securable, tag_name: &str) -> UcamResult<Self> {
        validate_identifier("Tag name", tag_name)?;
        Self::build(securable, TagChange::Unset(vec![Identifier::new(tag_name)?]))
    }

    fn build(securable: Securable, change: TagChange) -> UcamResult<Self> {
        validate_identifier("Catalog name", securable.catalog())?;
        if let Some(schema) = securable.schema() {
            validate_identifier("Schema name", schema)?;
        }
        if let Some(table) = securable.table() {
            validate_identifier("Table name", table)?;
        }
        if let Some(column) = securable.column() {
            validate_identifier("Column name", column)?;
        }
        Ok(Self { securable, change })
    }

    pub fn securable(&self) -> &Securable {
        &self.securable
    }

    pub fn change(&self) -> &TagChange {
        &self.change
    }

    fn object_clause(&self) -> String {
        // Parts were validated in `build`, so wrapping cannot fail.
        let quote = |s: &str| Identifier(s.to_string()).to_string();
        match &self.securable {
            Securable::Catalog { catalog } => format!("ALTER CATALOG {}", quote(catalog)),
            Securable::Schema { catalog, schema } => {
                format!("ALTER SCHEMA {}.{}", quote(catalog), quote(schema))
            }
            Securable::Table(t) => format!(
                "ALTER TABLE {}.{}.{}",
                quote(&t.catalog),
                quote(&t.schema),
                quote(&t.table)
            ),
            Securable::Column { table: t, column } => format!(
                "ALTER TABLE {}.{}.{} ALTER COLUMN {}",
                quote(&t.catalog),
                quote(&t.schema),
                quote(&t.table),
                quote(column)
            ),
        }
    }
}

impl fmt::Display for AlterTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.object_clause())?;
        match &self.change {
            TagChange::Set(pairs) => {
                let rendered: Vec<String> = pairs
                    .iter()
                    .map(|(name, value)| {
                        format!("{} = {}", SqlString::new(name.as_str()), SqlString::new(value.as_str()))
                    })
                    .collect();
                write!(f, "SET TAGS ({})", rendered.join(", "))
            }
            TagChange::Unset(names) => {
                let rendered: Vec<String> = names
                    .iter()
                    .map(|name| SqlString::new(name.as_str()).to_string())
                    .collect();
                write!(f, "UNSET TAGS ({})", rendered.join(", "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Statement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementKind {
    CreateFunction,
    CreatePolicy,
    AlterTags,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::CreateFunction => "CREATE_FUNCTION",
            StatementKind::CreatePolicy => "CREATE_POLICY",
            StatementKind::AlterTags => "ALTER_TAGS",
        }
    }

    pub fn parse(value: &str) -> UcamResult<Self> {
        match value {
            "CREATE_FUNCTION" => Ok(StatementKind::CreateFunction),
            "CREATE_POLICY" => Ok(StatementKind::CreatePolicy),
            "ALTER_TAGS" => Ok(StatementKind::AlterTags),
            other => Err(UcamError::Internal(format!("unknown statement kind: {other}"))),
        }
    }
}

/// Any statement UCAM hands to the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    CreateFunction(CreateFilterFunction),
    CreatePolicy(CreateRowFilterPolicy),
    AlterTags(AlterTags),
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::CreateFunction(_) => StatementKind::CreateFunction,
            Statement::CreatePolicy(_) => StatementKind::CreatePolicy,
            Statement::AlterTags(_) => StatementKind::AlterTags,
        }
    }

    /// Dotted name of the object the statement creates or alters.
    pub fn target(&self) -> String {
        match self {
            Statement::CreateFunction(s) => s.function.dotted(),
            Statement::CreatePolicy(s) => s.policy.dotted(),
            Statement::AlterTags(s) => s.securable.full_name(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::CreateFunction(s) => fmt::Display::fmt(s, f),
            Statement::CreatePolicy(s) => fmt::Display::fmt(s, f),
            Statement::AlterTags(s) => fmt::Display::fmt(s, f),
        }
    }
}

impl From<CreateFilterFunction> for Statement {
    fn from(s: CreateFilterFunction) -> Self {
        Statement::CreateFunction(s)
    }
}

impl From<CreateRowFilterPolicy> for Statement {
    fn from(s: CreateRowFilterPolicy) -> Self {
        Statement::CreatePolicy(s)
    }
}

impl From<AlterTags> for Statement {
    fn from(s: AlterTags) -> Self {
        Statement::AlterTags(s)
    }
}
