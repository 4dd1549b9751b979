//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! The table is append-only: its PERMISSIONS forbid update and delete, and
//! this repository exposes neither.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use ucam_core::error::UcamResult;
use ucam_core::models::audit::{
    AuditAction, AuditLogEntry, AuditLogFilter, AuditObjectType, CreateAuditLogEntry,
};
use ucam_core::repository::{AuditLogRepository, DEFAULT_AUDIT_LIMIT};
use uuid::Uuid;

use crate::error::DbError;

const TABLE: &str = "access_audit_log";

const SELECT_ONE: &str = "SELECT meta::id(id) AS record_id, * \
     FROM type::record('access_audit_log', $id)";

#[derive(Debug, SurrealValue)]
struct AuditRow {
    record_id: String,
    timestamp: DateTime<Utc>,
    user: String,
    action_type: String,
    object_type: String,
    object_name: String,
    old_value: Option<String>,
    new_value: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, SurrealValue)]
struct IdRow {
    record_id: String,
}

#[derive(Debug, SurrealValue)]
struct ObjectNameRow {
    object_name: String,
}

impl AuditRow {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        Ok(AuditLogEntry {
            id: Uuid::parse_str(&self.record_id)
                .map_err(|e| DbError::decode(TABLE, format!("invalid UUID: {e}")))?,
            timestamp: self.timestamp,
            user: self.user,
            action_type: self
                .action_type
                .parse::<AuditAction>()
                .map_err(|e| DbError::decode(TABLE, e))?,
            object_type: self
                .object_type
                .parse::<AuditObjectType>()
                .map_err(|e| DbError::decode(TABLE, e))?,
            object_name: self.object_name,
            old_value: self.old_value,
            new_value: self.new_value,
            notes: self.notes,
        })
    }
}

/// SurrealDB implementation of the audit log repository.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find(&self, id: &str) -> Result<Option<AuditLogEntry>, DbError> {
        let mut response = self
            .db
            .query(SELECT_ONE)
            .bind(("id", id.to_string()))
            .await?;
        let rows: Vec<AuditRow> = response.take(0)?;
        rows.into_iter().next().map(AuditRow::try_into_entry).transpose()
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditLogEntry) -> UcamResult<AuditLogEntry> {
        let id_str = input.id.to_string();

        if let Some(existing) = self.find(&id_str).await? {
            debug!(id = %id_str, "Audit entry already recorded");
            return Ok(existing);
        }

        let response = self
            .db
            .query(format!(
                "CREATE type::record('access_audit_log', $id) SET \
                 user = $user, action_type = $action_type, \
                 object_type = $object_type, object_name = $object_name, \
                 old_value = $old_value, new_value = $new_value, \
                 notes = $notes; {SELECT_ONE};"
            ))
            .bind(("id", id_str.clone()))
            .bind(("user", input.user))
            .bind(("action_type", input.action_type.as_str()))
            .bind(("object_type", input.object_type.as_str()))
            .bind(("object_name", input.object_name))
            .bind(("old_value", input.old_value))
            .bind(("new_value", input.new_value))
            .bind(("notes", input.notes))
            .await
            .map_err(DbError::from)?;

        let mut response = response
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<AuditRow> = response.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit entry".into(),
            id: id_str,
        })?;
        Ok(row.try_into_entry()?)
    }

    async fn get_by_id(&self, id: Uuid) -> UcamResult<AuditLogEntry> {
        let id_str = id.to_string();
        match self.find(&id_str).await? {
            Some(entry) => Ok(entry),
            None => Err(DbError::NotFound {
                entity: "audit entry".into(),
                id: id_str,
            }
            .into()),
        }
    }

    async fn missing(&self, ids: &[Uuid]) -> UcamResult<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: Vec<String> = ids.iter().map(Uuid::to_string).collect();

        let mut response = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id FROM access_audit_log \
                 WHERE meta::id(id) IN $ids",
            )
            .bind(("ids", wanted))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<IdRow> = response.take(0).map_err(DbError::from)?;
        let present: BTreeSet<String> = rows.into_iter().map(|r| r.record_id).collect();

        Ok(ids
            .iter()
            .filter(|id| !present.contains(&id.to_string()))
            .copied()
            .collect())
    }

    async fn tombstoned(
        &self,
        object_type: AuditObjectType,
        object_names: &[String],
    ) -> UcamResult<Vec<String>> {
        if object_names.is_empty() {
            return Ok(Vec::new());
        }

        let mut response = self
            .db
            .query(
                "SELECT object_name FROM access_audit_log \
                 WHERE action_type = 'DELETE' AND object_type = $object_type \
                 AND object_name IN $names",
            )
            .bind(("object_type", object_type.as_str()))
            .bind(("names", object_names.to_vec()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ObjectNameRow> = response.take(0).map_err(DbError::from)?;
        let found: BTreeSet<String> = rows.into_iter().map(|r| r.object_name).collect();
        Ok(found.into_iter().collect())
    }

    async fn list(&self, filter: AuditLogFilter) -> UcamResult<Vec<AuditLogEntry>> {
        let mut conditions = Vec::new();
        if filter.start.is_some() {
            conditions.push("timestamp >= $start");
        }
        if filter.end.is_some() {
            conditions.push("timestamp <= $end");
        }
        if filter.user.is_some() {
            conditions.push("user = $user");
        }
        if !filter.action_types.is_empty() {
            conditions.push("action_type IN $action_types");
        }
        if filter.object_type.is_some() {
            conditions.push("object_type = $object_type");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM access_audit_log \
             {where_clause} ORDER BY timestamp DESC LIMIT $limit"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("limit", filter.limit.unwrap_or(DEFAULT_AUDIT_LIMIT)));
        if let Some(start) = filter.start {
            builder = builder.bind(("start", start));
        }
        if let Some(end) = filter.end {
            builder = builder.bind(("end", end));
        }
        if let Some(user) = filter.user {
            builder = builder.bind(("user", user));
        }
        if !filter.action_types.is_empty() {
            let actions: Vec<&'static str> =
                filter.action_types.iter().map(AuditAction::as_str).collect();
            builder = builder.bind(("action_types", actions));
        }
        if let Some(object_type) = filter.object_type {
            builder = builder.bind(("object_type", object_type.as_str()));
        }

        let mut response = builder.await.map_err(DbError::from)?;
        let rows: Vec<AuditRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(AuditRow::try_into_entry)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
