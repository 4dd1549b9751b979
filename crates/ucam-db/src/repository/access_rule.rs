//! SurrealDB implementation of [`AccessRuleRepository`].

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use ucam_core::error::UcamResult;
use ucam_core::models::access_rule::{
    AccessRule, AccessRuleFilter, AccessType, CreateAccessRule, RuleStatus, UpdateAccessRule,
};
use ucam_core::repository::AccessRuleRepository;
use uuid::Uuid;

use crate::error::DbError;

const TABLE: &str = "group_customer_access";

const SELECT_ONE: &str = "SELECT meta::id(id) AS record_id, * \
     FROM type::record('group_customer_access', $id)";

#[derive(Debug, SurrealValue)]
struct AccessRuleRow {
    record_id: String,
    group_name: String,
    customer_ids: Vec<i64>,
    access_type: String,
    effective_date: String,
    expiration_date: Option<String>,
    notes: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
    modified_by: String,
    modified_at: DateTime<Utc>,
    last_mutation_id: String,
}

/// Row shape returned by `DELETE ... RETURN BEFORE`.
#[derive(Debug, SurrealValue)]
struct DeletedRow {
    #[allow(dead_code)]
    group_name: String,
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, DbError> {
    raw.parse::<NaiveDate>()
        .map_err(|e| DbError::decode(TABLE, format!("invalid {field} {raw:?}: {e}")))
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::decode(TABLE, format!("invalid {field}: {e}")))
}

impl AccessRuleRow {
    fn try_into_rule(self) -> Result<AccessRule, DbError> {
        let access_type = self
            .access_type
            .parse::<AccessType>()
            .map_err(|e| DbError::decode(TABLE, e))?;
        Ok(AccessRule {
            id: parse_uuid("record id", &self.record_id)?,
            group_name: self.group_name,
            customer_ids: self.customer_ids.into_iter().collect(),
            access_type,
            effective_date: parse_date("effective_date", &self.effective_date)?,
            expiration_date: self
                .expiration_date
                .as_deref()
                .map(|d| parse_date("expiration_date", d))
                .transpose()?,
            notes: self.notes,
            created_by: self.created_by,
            created_at: self.created_at,
            modified_by: self.modified_by,
            modified_at: self.modified_at,
            last_mutation_id: parse_uuid("last_mutation_id", &self.last_mutation_id)?,
        })
    }
}

fn ids_vec(ids: &BTreeSet<i64>) -> Vec<i64> {
    ids.iter().copied().collect()
}

/// The first row of a write-then-select response, or `NotFound`.
fn single(rows: Vec<AccessRuleRow>, id: String) -> Result<AccessRule, DbError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| DbError::NotFound {
            entity: "access rule".into(),
            id,
        })?
        .try_into_rule()
}

/// SurrealDB implementation of the access rule repository.
#[derive(Clone)]
pub struct SurrealAccessRuleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAccessRuleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AccessRuleRepository for SurrealAccessRuleRepository<C> {
    async fn create(&self, input: CreateAccessRule) -> UcamResult<AccessRule> {
        let id_str = Uuid::new_v4().to_string();

        let response = self
            .db
            .query(format!(
                "CREATE type::record('group_customer_access', $id) SET \
                 group_name = $group_name, customer_ids = $customer_ids, \
                 access_type = $access_type, effective_date = $effective_date, \
                 expiration_date = $expiration_date, notes = $notes, \
                 created_by = $actor, modified_by = $actor, \
                 last_mutation_id = $mutation_id; {SELECT_ONE};"
            ))
            .bind(("id", id_str.clone()))
            .bind(("group_name", input.group_name))
            .bind(("customer_ids", ids_vec(&input.customer_ids)))
            .bind(("access_type", input.access_type.as_str()))
            .bind(("effective_date", input.effective_date.to_string()))
            .bind((
                "expiration_date",
                input.expiration_date.map(|d| d.to_string()),
            ))
            .bind(("notes", input.notes))
            .bind(("actor", input.created_by))
            .bind(("mutation_id", input.mutation_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut response = response
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<AccessRuleRow> = response.take(1).map_err(DbError::from)?;
        Ok(single(rows, id_str)?)
    }

    async fn get_by_id(&self, id: Uuid) -> UcamResult<AccessRule> {
        let id_str = id.to_string();
        let mut response = self
            .db
            .query(SELECT_ONE)
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AccessRuleRow> = response.take(0).map_err(DbError::from)?;
        Ok(single(rows, id_str)?)
    }

    async fn update(&self, id: Uuid, input: UpdateAccessRule) -> UcamResult<AccessRule> {
        let id_str = id.to_string();

        let response = self
            .db
            .query(format!(
                "UPDATE type::record('group_customer_access', $id) SET \
                 group_name = $group_name, customer_ids = $customer_ids, \
                 access_type = $access_type, effective_date = $effective_date, \
                 expiration_date = $expiration_date, notes = $notes, \
                 modified_by = $actor, modified_at = time::now(), \
                 last_mutation_id = $mutation_id; {SELECT_ONE};"
            ))
            .bind(("id", id_str.clone()))
            .bind(("group_name", input.group_name))
            .bind(("customer_ids", ids_vec(&input.customer_ids)))
            .bind(("access_type", input.access_type.as_str()))
            .bind(("effective_date", input.effective_date.to_string()))
            .bind((
                "expiration_date",
                input.expiration_date.map(|d| d.to_string()),
            ))
            .bind(("notes", input.notes))
            .bind(("actor", input.modified_by))
            .bind(("mutation_id", input.mutation_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut response = response
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<AccessRuleRow> = response.take(1).map_err(DbError::from)?;
        Ok(single(rows, id_str)?)
    }

    async fn expire(
        &self,
        id: Uuid,
        expiration_date: NaiveDate,
        modified_by: &str,
        mutation_id: Uuid,
    ) -> UcamResult<AccessRule> {
        let id_str = id.to_string();

        let response = self
            .db
            .query(format!(
                "UPDATE type::record('group_customer_access', $id) SET \
                 expiration_date = $expiration_date, modified_by = $actor, \
                 modified_at = time::now(), last_mutation_id = $mutation_id; \
                 {SELECT_ONE};"
            ))
            .bind(("id", id_str.clone()))
            .bind(("expiration_date", expiration_date.to_string()))
            .bind(("actor", modified_by.to_string()))
            .bind(("mutation_id", mutation_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut response = response
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<AccessRuleRow> = response.take(1).map_err(DbError::from)?;
        Ok(single(rows, id_str)?)
    }

    async fn delete_expired(&self, id: Uuid, as_of: NaiveDate) -> UcamResult<bool> {
        let response = self
            .db
            .query(
                "DELETE type::record('group_customer_access', $id) \
                 WHERE expiration_date != NONE AND expiration_date <= $as_of \
                 RETURN BEFORE",
            )
            .bind(("id", id.to_string()))
            .bind(("as_of", as_of.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut response = response
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        let removed: Vec<DeletedRow> = response.take(0).map_err(DbError::from)?;
        Ok(!removed.is_empty())
    }

    async fn list(&self, filter: AccessRuleFilter) -> UcamResult<Vec<AccessRule>> {
        let mut conditions = Vec::new();
        if filter.group_name.is_some() {
            conditions.push("group_name = $group_name");
        }
        if filter.customer_id.is_some() {
            conditions.push("(array::len(customer_ids) = 0 OR $customer_id IN customer_ids)");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM group_customer_access \
             {where_clause} ORDER BY group_name ASC, effective_date DESC"
        );

        let mut builder = self.db.query(&query);
        if let Some(group_name) = filter.group_name {
            builder = builder.bind(("group_name", group_name));
        }
        if let Some(customer_id) = filter.customer_id {
            builder = builder.bind(("customer_id", customer_id));
        }

        let mut response = builder.await.map_err(DbError::from)?;
        let rows: Vec<AccessRuleRow> = response.take(0).map_err(DbError::from)?;
        let rules = rows
            .into_iter()
            .map(AccessRuleRow::try_into_rule)
            .collect::<Result<Vec<_>, DbError>>()?;

        // Same lifecycle predicates as the evaluator.
        let as_of = filter.as_of.unwrap_or_else(|| Utc::now().date_naive());
        Ok(rules
            .into_iter()
            .filter(|rule| match filter.status {
                RuleStatus::All => true,
                RuleStatus::Active => rule.is_active(as_of),
                RuleStatus::Expired => rule.is_expired(as_of),
            })
            .collect())
    }

    async fn list_for_groups(&self, groups: &BTreeSet<String>) -> UcamResult<Vec<AccessRule>> {
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let mut response = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM group_customer_access \
                 WHERE group_name IN $groups \
                 ORDER BY group_name ASC, effective_date DESC",
            )
            .bind(("groups", groups.iter().cloned().collect::<Vec<_>>()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccessRuleRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(AccessRuleRow::try_into_rule)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
