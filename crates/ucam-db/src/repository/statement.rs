//! SurrealDB implementation of [`StatementRegistry`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use ucam_core::error::UcamResult;
use ucam_core::models::principal::Principal;
use ucam_core::models::statement::IssuedStatement;
use ucam_core::repository::StatementRegistry;
use ucam_core::statement::{Statement, StatementKind};
use uuid::Uuid;

use crate::error::DbError;

const TABLE: &str = "issued_statement";

#[derive(Debug, SurrealValue)]
struct IssuedRow {
    record_id: String,
    kind: String,
    target: String,
    sql: String,
    issued_by: String,
    issued_at: DateTime<Utc>,
}

impl IssuedRow {
    fn try_into_issued(self) -> Result<IssuedStatement, DbError> {
        Ok(IssuedStatement {
            id: Uuid::parse_str(&self.record_id)
                .map_err(|e| DbError::decode(TABLE, format!("invalid UUID: {e}")))?,
            kind: StatementKind::parse(&self.kind).map_err(|e| DbError::decode(TABLE, e))?,
            target: self.target,
            sql: self.sql,
            issued_by: self.issued_by,
            issued_at: self.issued_at,
        })
    }
}

/// Records generated DDL in `issued_statement` for the warehouse to run.
#[derive(Clone)]
pub struct SurrealStatementRegistry<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealStatementRegistry<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> StatementRegistry for SurrealStatementRegistry<C> {
    async fn submit(
        &self,
        statement: &Statement,
        issued_by: &Principal,
    ) -> UcamResult<IssuedStatement> {
        let id_str = Uuid::new_v4().to_string();
        let kind = statement.kind();
        let target = statement.target();

        let response = self
            .db
            .query(
                "CREATE type::record('issued_statement', $id) SET \
                 kind = $kind, target = $target, sql = $sql, issued_by = $issued_by; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('issued_statement', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("kind", kind.as_str()))
            .bind(("target", target.clone()))
            .bind(("sql", statement.to_string()))
            .bind(("issued_by", issued_by.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let mut response = response
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<IssuedRow> = response.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "issued statement".into(),
            id: id_str,
        })?;

        info!(kind = kind.as_str(), target = %target, "Statement issued");
        Ok(row.try_into_issued()?)
    }

    async fn list(&self, limit: u64) -> UcamResult<Vec<IssuedStatement>> {
        let mut response = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM issued_statement \
                 ORDER BY issued_at DESC LIMIT $limit",
            )
            .bind(("limit", limit))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<IssuedRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(IssuedRow::try_into_issued)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
