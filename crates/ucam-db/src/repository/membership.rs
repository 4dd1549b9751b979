//! SurrealDB implementation of [`MembershipRepository`].

use std::collections::BTreeSet;

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use ucam_core::error::UcamResult;
use ucam_core::models::principal::Principal;
use ucam_core::repository::MembershipRepository;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct GroupRow {
    group_name: String,
}

fn membership_key(principal: &Principal, group_name: &str) -> String {
    format!("{}|{group_name}", principal.as_str())
}

/// Principal to group mapping backed by the `principal_group` table.
#[derive(Clone)]
pub struct SurrealMembershipRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealMembershipRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> MembershipRepository for SurrealMembershipRepository<C> {
    async fn add_member(&self, principal: &Principal, group_name: &str) -> UcamResult<()> {
        self.db
            .query(
                "UPSERT type::record('principal_group', $id) SET \
                 principal = $principal, group_name = $group_name",
            )
            .bind(("id", membership_key(principal, group_name)))
            .bind(("principal", principal.as_str().to_string()))
            .bind(("group_name", group_name.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }

    async fn remove_member(&self, principal: &Principal, group_name: &str) -> UcamResult<()> {
        self.db
            .query("DELETE type::record('principal_group', $id)")
            .bind(("id", membership_key(principal, group_name)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }

    async fn is_member(&self, principal: &Principal, group_name: &str) -> UcamResult<bool> {
        let mut response = self
            .db
            .query("SELECT group_name FROM type::record('principal_group', $id)")
            .bind(("id", membership_key(principal, group_name)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<GroupRow> = response.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn groups_for(&self, principal: &Principal) -> UcamResult<BTreeSet<String>> {
        let mut response = self
            .db
            .query("SELECT group_name FROM principal_group WHERE principal = $principal")
            .bind(("principal", principal.as_str().to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<GroupRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().map(|r| r.group_name).collect())
    }

    async fn has_members(&self, group_name: &str) -> UcamResult<bool> {
        let mut response = self
            .db
            .query("SELECT group_name FROM principal_group WHERE group_name = $group_name LIMIT 1")
            .bind(("group_name", group_name.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<GroupRow> = response.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }
}
