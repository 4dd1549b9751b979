//! Table definitions and the migration runner.
//!
//! Tables are SCHEMAFULL. UUIDs and calendar dates are stored as strings;
//! ISO dates compare correctly as text. Enumerations are strings guarded
//! by ASSERT clauses.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};

use crate::error::DbError;

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "access_and_audit",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "governance_catalog",
        sql: SCHEMA_V2,
    },
];

/// Latest schema version known to this build.
pub const SCHEMA_VERSION: u32 = 2;

// -----------------------------------------------------------------------
// v1: the access table and its audit log
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
DEFINE TABLE group_customer_access SCHEMAFULL;
DEFINE FIELD group_name ON TABLE group_customer_access TYPE string;
DEFINE FIELD customer_ids ON TABLE group_customer_access TYPE array<int>;
DEFINE FIELD access_type ON TABLE group_customer_access TYPE string \
    ASSERT $value IN ['INCLUDE', 'EXCLUDE'];
DEFINE FIELD effective_date ON TABLE group_customer_access TYPE string;
DEFINE FIELD expiration_date ON TABLE group_customer_access \
    TYPE option<string>;
DEFINE FIELD notes ON TABLE group_customer_access TYPE option<string>;
DEFINE FIELD created_by ON TABLE group_customer_access TYPE string;
DEFINE FIELD created_at ON TABLE group_customer_access TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD modified_by ON TABLE group_customer_access TYPE string;
DEFINE FIELD modified_at ON TABLE group_customer_access TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD last_mutation_id ON TABLE group_customer_access TYPE string;
DEFINE INDEX idx_access_group ON TABLE group_customer_access \
    COLUMNS group_name;
DEFINE INDEX idx_access_mutation ON TABLE group_customer_access \
    COLUMNS last_mutation_id UNIQUE;

DEFINE TABLE access_audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD timestamp ON TABLE access_audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD user ON TABLE access_audit_log TYPE string;
DEFINE FIELD action_type ON TABLE access_audit_log TYPE string \
    ASSERT $value IN ['INSERT', 'UPDATE', 'EXPIRE', 'DELETE', \
    'TAG_APPLY', 'TAG_REMOVE', 'FUNCTION_CREATE', 'POLICY_CREATE'];
DEFINE FIELD object_type ON TABLE access_audit_log TYPE string \
    ASSERT $value IN ['GROUP_ACCESS', 'TABLE_TAG', 'COLUMN_TAG', \
    'FILTER_FUNCTION', 'ROW_FILTER_POLICY'];
DEFINE FIELD object_name ON TABLE access_audit_log TYPE string;
DEFINE FIELD old_value ON TABLE access_audit_log TYPE option<string>;
DEFINE FIELD new_value ON TABLE access_audit_log TYPE option<string>;
DEFINE FIELD notes ON TABLE access_audit_log TYPE option<string>;
DEFINE INDEX idx_audit_time ON TABLE access_audit_log COLUMNS timestamp;
DEFINE INDEX idx_audit_user ON TABLE access_audit_log COLUMNS user;
";

// -----------------------------------------------------------------------
// v2: governance catalog mirror, memberships, issued statements
// -----------------------------------------------------------------------

const SCHEMA_V2: &str = "\
DEFINE TABLE uc_catalog SCHEMAFULL;
DEFINE FIELD catalog_name ON TABLE uc_catalog TYPE string;
DEFINE INDEX idx_uc_catalog_name ON TABLE uc_catalog \
    COLUMNS catalog_name UNIQUE;

DEFINE TABLE uc_schema SCHEMAFULL;
DEFINE FIELD catalog_name ON TABLE uc_schema TYPE string;
DEFINE FIELD schema_name ON TABLE uc_schema TYPE string;
DEFINE INDEX idx_uc_schema_name ON TABLE uc_schema \
    COLUMNS catalog_name, schema_name UNIQUE;

DEFINE TABLE uc_table SCHEMAFULL;
DEFINE FIELD catalog_name ON TABLE uc_table TYPE string;
DEFINE FIELD schema_name ON TABLE uc_table TYPE string;
DEFINE FIELD table_name ON TABLE uc_table TYPE string;
DEFINE INDEX idx_uc_table_name ON TABLE uc_table \
    COLUMNS catalog_name, schema_name, table_name UNIQUE;

DEFINE TABLE uc_column SCHEMAFULL;
DEFINE FIELD catalog_name ON TABLE uc_column TYPE string;
DEFINE FIELD schema_name ON TABLE uc_column TYPE string;
DEFINE FIELD table_name ON TABLE uc_column TYPE string;
DEFINE FIELD column_name ON TABLE uc_column TYPE string;
DEFINE FIELD data_type ON TABLE uc_column TYPE string;
DEFINE FIELD position ON TABLE uc_column TYPE int;
DEFINE INDEX idx_uc_column_table ON TABLE uc_column \
    COLUMNS catalog_name, schema_name, table_name;

DEFINE TABLE governed_tag SCHEMAFULL;
DEFINE FIELD securable_key ON TABLE governed_tag TYPE string;
DEFINE FIELD kind ON TABLE governed_tag TYPE string \
    ASSERT $value IN ['CATALOG', 'SCHEMA', 'TABLE', 'COLUMN'];
DEFINE FIELD catalog_name ON TABLE governed_tag TYPE string;
DEFINE FIELD schema_name ON TABLE governed_tag TYPE option<string>;
DEFINE FIELD table_name ON TABLE governed_tag TYPE option<string>;
DEFINE FIELD column_name ON TABLE governed_tag TYPE option<string>;
DEFINE FIELD tag_name ON TABLE governed_tag TYPE string;
DEFINE FIELD tag_value ON TABLE governed_tag TYPE string;
DEFINE INDEX idx_governed_tag_name ON TABLE governed_tag COLUMNS tag_name;
DEFINE INDEX idx_governed_tag_securable ON TABLE governed_tag \
    COLUMNS securable_key, tag_name UNIQUE;

DEFINE TABLE principal_group SCHEMAFULL;
DEFINE FIELD principal ON TABLE principal_group TYPE string;
DEFINE FIELD group_name ON TABLE principal_group TYPE string;
DEFINE INDEX idx_principal_group ON TABLE principal_group \
    COLUMNS principal, group_name UNIQUE;

DEFINE TABLE issued_statement SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD kind ON TABLE issued_statement TYPE string \
    ASSERT $value IN ['CREATE_FUNCTION', 'CREATE_POLICY', 'ALTER_TAGS'];
DEFINE FIELD target ON TABLE issued_statement TYPE string;
DEFINE FIELD sql ON TABLE issued_statement TYPE string;
DEFINE FIELD issued_by ON TABLE issued_statement TYPE string;
DEFINE FIELD issued_at ON TABLE issued_statement TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_issued_statement_time ON TABLE issued_statement \
    COLUMNS issued_at;
";

/// Highest applied migration version, `0` on a fresh database.
pub async fn current_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

/// Apply every migration newer than the recorded version and return the
/// resulting schema version. Safe to call repeatedly.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let start = current_version(db).await?;
    debug!(version = start, "Current schema version");

    let mut version = start;
    for migration in MIGRATIONS.iter().filter(|m| m.version > start) {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "v{} '{}' failed: {e}",
                migration.version, migration.name,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "could not record v{}: {e}",
                    migration.version
                ))
            })?;

        version = migration.version;
    }

    Ok(version)
}

/// DDL for the access table and audit log.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

/// DDL for the governance catalog mirror, memberships and statements.
pub fn schema_v2() -> &'static str {
    SCHEMA_V2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_end_at_current_version() {
        for window in MIGRATIONS.windows(2) {
            assert!(window[0].version < window[1].version);
        }
        assert_eq!(MIGRATIONS.last().map(|m| m.version), Some(SCHEMA_VERSION));
    }

    #[test]
    fn v1_defines_both_application_tables() {
        assert!(SCHEMA_V1.contains("DEFINE TABLE group_customer_access"));
        assert!(SCHEMA_V1.contains("DEFINE TABLE access_audit_log"));
    }

    #[test]
    fn audit_log_forbids_update_and_delete() {
        let audit = &SCHEMA_V1[SCHEMA_V1.find("access_audit_log").unwrap_or(0)..];
        assert!(audit.contains("FOR update NONE"));
        assert!(audit.contains("FOR delete NONE"));
    }
}
