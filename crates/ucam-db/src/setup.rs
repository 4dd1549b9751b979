//! Provisioning check run before the tool is used.

use chrono::{DateTime, Utc};
use serde::Serialize;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{error, info};

use crate::schema::{SCHEMA_VERSION, current_version, run_migrations};

/// Tables every installation must be able to read.
const REQUIRED_TABLES: [&str; 2] = ["group_customer_access", "access_audit_log"];

/// Outcome of [`ensure_setup`]. Failures are collected, not returned.
#[derive(Debug, Clone, Serialize)]
pub struct SetupStatus {
    pub setup_complete: bool,
    pub schema_version: u32,
    pub tables_ready: bool,
    pub permissions_ready: bool,
    /// Migrations applied by this run, as `v<N>`.
    pub applied: Vec<String>,
    pub errors: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Bring the schema up to date, then confirm both application tables
/// answer a count query.
pub async fn ensure_setup<C: Connection>(db: &Surreal<C>) -> SetupStatus {
    let mut status = SetupStatus {
        setup_complete: false,
        schema_version: 0,
        tables_ready: false,
        permissions_ready: true,
        applied: Vec::new(),
        errors: Vec::new(),
        checked_at: Utc::now(),
    };

    let before = match current_version(db).await {
        Ok(v) => v,
        Err(e) => {
            status.errors.push(format!("Could not read schema version: {e}"));
            status.permissions_ready = false;
            return status;
        }
    };

    match run_migrations(db).await {
        Ok(after) => {
            status.schema_version = after;
            status.applied = (before + 1..=after).map(|v| format!("v{v}")).collect();
            status.tables_ready = after == SCHEMA_VERSION;
        }
        Err(e) => {
            error!(error = %e, "Schema migration failed");
            status.errors.push(e.to_string());
        }
    }

    for table in REQUIRED_TABLES {
        let query = format!("SELECT count() AS total FROM {table} GROUP ALL");
        let checked = match db.query(query).await {
            Ok(mut response) => response.take::<Vec<CountRow>>(0).map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = checked {
            status.permissions_ready = false;
            status
                .errors
                .push(format!("Permission check failed for {table}: {e}"));
        }
    }

    status.setup_complete = status.tables_ready && status.permissions_ready;
    info!(
        setup_complete = status.setup_complete,
        schema_version = status.schema_version,
        applied = status.applied.len(),
        "Setup check finished"
    );
    status
}
