//! SurrealDB implementation of [`CatalogRepository`].
//!
//! Catalogs, schemas, tables and columns are keyed by their dotted full
//! name. A governed tag is keyed by its securable and tag name, so setting
//! a tag twice overwrites the value.

use std::collections::BTreeSet;

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use ucam_core::error::UcamResult;
use ucam_core::models::catalog::{
    ColumnInfo, GovernedTag, Securable, SecurableKind, TableRef, TagOption,
};
use ucam_core::repository::{CatalogRepository, TaggedSecurable};
use ucam_core::statement::{AlterTags, TagChange};

use crate::error::DbError;

const TAG_TABLE: &str = "governed_tag";

#[derive(Debug, SurrealValue)]
struct CatalogRow {
    catalog_name: String,
}

#[derive(Debug, SurrealValue)]
struct SchemaRow {
    schema_name: String,
}

#[derive(Debug, SurrealValue)]
struct TableRow {
    catalog_name: String,
    schema_name: String,
    table_name: String,
}

#[derive(Debug, SurrealValue)]
struct ColumnRow {
    column_name: String,
    data_type: String,
    position: u32,
}

#[derive(Debug, SurrealValue)]
struct TagRow {
    kind: String,
    catalog_name: String,
    schema_name: Option<String>,
    table_name: Option<String>,
    column_name: Option<String>,
    tag_name: String,
    tag_value: String,
}

#[derive(Debug, SurrealValue)]
struct TagPairRow {
    tag_name: String,
    tag_value: String,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn missing(field: &str) -> DbError {
    DbError::decode(TAG_TABLE, format!("{field} missing"))
}

impl TagRow {
    fn securable(&self) -> Result<Securable, DbError> {
        let catalog = self.catalog_name.clone();
        let schema = || self.schema_name.clone().ok_or_else(|| missing("schema_name"));
        let table = || -> Result<TableRef, DbError> {
            Ok(TableRef::new(
                catalog.clone(),
                schema()?,
                self.table_name.clone().ok_or_else(|| missing("table_name"))?,
            ))
        };
        match self.kind.as_str() {
            "CATALOG" => Ok(Securable::Catalog {
                catalog: catalog.clone(),
            }),
            "SCHEMA" => Ok(Securable::Schema {
                catalog: catalog.clone(),
                schema: schema()?,
            }),
            "TABLE" => Ok(Securable::Table(table()?)),
            "COLUMN" => Ok(Securable::Column {
                table: table()?,
                column: self.column_name.clone().ok_or_else(|| missing("column_name"))?,
            }),
            other => Err(DbError::decode(
                TAG_TABLE,
                format!("unknown securable kind: {other}"),
            )),
        }
    }

    fn try_into_tag(self) -> Result<GovernedTag, DbError> {
        Ok(GovernedTag {
            securable: self.securable()?,
            tag_name: self.tag_name,
            tag_value: self.tag_value,
        })
    }
}

fn securable_key(securable: &Securable) -> String {
    format!("{}:{}", securable.kind().as_str(), securable.full_name())
}

fn column_key(table: &TableRef, column: &str) -> String {
    format!("{table}.{column}")
}

fn count_of(rows: Vec<CountRow>) -> u64 {
    rows.first().map(|r| r.total).unwrap_or(0)
}

/// SurrealDB implementation of the governance catalog repository.
#[derive(Clone)]
pub struct SurrealCatalogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCatalogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Fail with `NotFound` unless the securable is registered.
    async fn require(&self, securable: &Securable) -> Result<(), DbError> {
        let (table, key) = match securable {
            Securable::Catalog { catalog } => ("uc_catalog", catalog.clone()),
            Securable::Schema { catalog, schema } => ("uc_schema", format!("{catalog}.{schema}")),
            Securable::Table(t) => ("uc_table", t.to_string()),
            Securable::Column { table, column } => ("uc_column", column_key(table, column)),
        };
        let mut response = self
            .db
            .query(
                "SELECT count() AS total FROM type::record($table, $key) GROUP ALL",
            )
            .bind(("table", table))
            .bind(("key", key))
            .await?;
        let rows: Vec<CountRow> = response.take(0)?;
        if count_of(rows) == 0 {
            return Err(DbError::NotFound {
                entity: securable.kind().as_str().to_ascii_lowercase(),
                id: securable.full_name(),
            });
        }
        Ok(())
    }

    async fn tags_where(
        &self,
        condition: &str,
        order: &str,
        table: &TableRef,
    ) -> Result<Vec<GovernedTag>, DbError> {
        let mut response = self
            .db
            .query(format!(
                "SELECT * FROM governed_tag WHERE {condition} \
                 AND catalog_name = $catalog AND schema_name = $schema \
                 AND table_name = $table ORDER BY {order}"
            ))
            .bind(("catalog", table.catalog.clone()))
            .bind(("schema", table.schema.clone()))
            .bind(("table", table.table.clone()))
            .await?;
        let rows: Vec<TagRow> = response.take(0)?;
        rows.into_iter().map(TagRow::try_into_tag).collect()
    }

    async fn coverage(
        &self,
        object_table: &str,
        kind: SecurableKind,
        catalog: &str,
        schema: &str,
        tag: &TagOption,
    ) -> Result<(u64, u64), DbError> {
        let mut response = self
            .db
            .query(format!(
                "SELECT count() AS total FROM {object_table} \
                 WHERE catalog_name = $catalog AND schema_name = $schema GROUP ALL; \
                 SELECT count() AS total FROM governed_tag \
                 WHERE kind = $kind AND catalog_name = $catalog \
                 AND schema_name = $schema AND tag_name = $tag_name \
                 AND tag_value = $tag_value GROUP ALL;"
            ))
            .bind(("catalog", catalog.to_string()))
            .bind(("schema", schema.to_string()))
            .bind(("kind", kind.as_str()))
            .bind(("tag_name", tag.tag_name.clone()))
            .bind(("tag_value", tag.tag_value.clone()))
            .await?;
        let total: Vec<CountRow> = response.take(0)?;
        let tagged: Vec<CountRow> = response.take(1)?;
        Ok((count_of(total), count_of(tagged)))
    }
}

impl<C: Connection> CatalogRepository for SurrealCatalogRepository<C> {
    async fn register_catalog(&self, catalog: &str) -> UcamResult<()> {
        self.db
            .query("UPSERT type::record('uc_catalog', $catalog) SET catalog_name = $catalog")
            .bind(("catalog", catalog.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }

    async fn register_schema(&self, catalog: &str, schema: &str) -> UcamResult<()> {
        self.register_catalog(catalog).await?;
        self.db
            .query(
                "UPSERT type::record('uc_schema', $key) SET \
                 catalog_name = $catalog, schema_name = $schema",
            )
            .bind(("key", format!("{catalog}.{schema}")))
            .bind(("catalog", catalog.to_string()))
            .bind(("schema", schema.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }

    async fn register_table(&self, table: &TableRef, columns: &[ColumnInfo]) -> UcamResult<()> {
        self.register_schema(&table.catalog, &table.schema).await?;
        self.db
            .query(
                "UPSERT type::record('uc_table', $key) SET \
                 catalog_name = $catalog, schema_name = $schema, table_name = $table; \
                 DELETE uc_column WHERE catalog_name = $catalog \
                 AND schema_name = $schema AND table_name = $table;",
            )
            .bind(("key", table.to_string()))
            .bind(("catalog", table.catalog.clone()))
            .bind(("schema", table.schema.clone()))
            .bind(("table", table.table.clone()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        for column in columns {
            self.db
                .query(
                    "UPSERT type::record('uc_column', $key) SET \
                     catalog_name = $catalog, schema_name = $schema, \
                     table_name = $table, column_name = $column, \
                     data_type = $data_type, position = $position",
                )
                .bind(("key", column_key(table, &column.name)))
                .bind(("catalog", table.catalog.clone()))
                .bind(("schema", table.schema.clone()))
                .bind(("table", table.table.clone()))
                .bind(("column", column.name.clone()))
                .bind(("data_type", column.data_type.clone()))
                .bind(("position", column.position))
                .await
                .map_err(DbError::from)?
                .check()
                .map_err(|e| DbError::Query(e.to_string()))?;
        }

        info!(table = %table, columns = columns.len(), "Registered table");
        Ok(())
    }

    async fn list_catalogs(&self) -> UcamResult<Vec<String>> {
        let mut response = self
            .db
            .query("SELECT catalog_name FROM uc_catalog ORDER BY catalog_name ASC")
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CatalogRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().map(|r| r.catalog_name).collect())
    }

    async fn list_schemas(&self, catalog: &str) -> UcamResult<Vec<String>> {
        let mut response = self
            .db
            .query(
                "SELECT schema_name FROM uc_schema WHERE catalog_name = $catalog \
                 ORDER BY schema_name ASC",
            )
            .bind(("catalog", catalog.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SchemaRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().map(|r| r.schema_name).collect())
    }

    async fn list_tables(&self, catalog: &str, schema: &str) -> UcamResult<Vec<String>> {
        Ok(self
            .tables_in_schema(catalog, schema)
            .await?
            .into_iter()
            .map(|t| t.table)
            .collect())
    }

    async fn list_columns(&self, table: &TableRef) -> UcamResult<Vec<ColumnInfo>> {
        let mut response = self
            .db
            .query(
                "SELECT column_name, data_type, position FROM uc_column \
                 WHERE catalog_name = $catalog AND schema_name = $schema \
                 AND table_name = $table ORDER BY column_name ASC",
            )
            .bind(("catalog", table.catalog.clone()))
            .bind(("schema", table.schema.clone()))
            .bind(("table", table.table.clone()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ColumnRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| ColumnInfo {
                name: r.column_name,
                data_type: r.data_type,
                position: r.position,
            })
            .collect())
    }

    async fn tables_in_catalog(&self, catalog: &str) -> UcamResult<Vec<TableRef>> {
        let mut response = self
            .db
            .query(
                "SELECT catalog_name, schema_name, table_name FROM uc_table \
                 WHERE catalog_name = $catalog \
                 ORDER BY schema_name ASC, table_name ASC",
            )
            .bind(("catalog", catalog.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TableRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| TableRef::new(r.catalog_name, r.schema_name, r.table_name))
            .collect())
    }

    async fn tables_in_schema(&self, catalog: &str, schema: &str) -> UcamResult<Vec<TableRef>> {
        let mut response = self
            .db
            .query(
                "SELECT catalog_name, schema_name, table_name FROM uc_table \
                 WHERE catalog_name = $catalog AND schema_name = $schema \
                 ORDER BY table_name ASC",
            )
            .bind(("catalog", catalog.to_string()))
            .bind(("schema", schema.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TableRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| TableRef::new(r.catalog_name, r.schema_name, r.table_name))
            .collect())
    }

    async fn table_tags(&self, table: &TableRef) -> UcamResult<Vec<GovernedTag>> {
        Ok(self
            .tags_where("kind = 'TABLE'", "tag_name ASC", table)
            .await?)
    }

    async fn column_tags(&self, table: &TableRef) -> UcamResult<Vec<GovernedTag>> {
        Ok(self
            .tags_where("kind = 'COLUMN'", "column_name ASC, tag_name ASC", table)
            .await?)
    }

    async fn tags_on(&self, securable: &Securable) -> UcamResult<Vec<TagOption>> {
        let mut response = self
            .db
            .query(
                "SELECT tag_name, tag_value FROM governed_tag \
                 WHERE securable_key = $key ORDER BY tag_name ASC",
            )
            .bind(("key", securable_key(securable)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TagPairRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| TagOption {
                tag_name: r.tag_name,
                tag_value: r.tag_value,
            })
            .collect())
    }

    async fn tag_options(&self, catalog: &str, schema: &str) -> UcamResult<Vec<TagOption>> {
        let mut response = self
            .db
            .query(
                "SELECT tag_name, tag_value FROM governed_tag \
                 WHERE kind IN ['TABLE', 'COLUMN'] \
                 AND catalog_name = $catalog AND schema_name = $schema",
            )
            .bind(("catalog", catalog.to_string()))
            .bind(("schema", schema.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TagPairRow> = response.take(0).map_err(DbError::from)?;
        let options: BTreeSet<TagOption> = rows
            .into_iter()
            .map(|r| TagOption {
                tag_name: r.tag_name,
                tag_value: r.tag_value,
            })
            .collect();
        Ok(options.into_iter().collect())
    }

    async fn table_tag_coverage(
        &self,
        catalog: &str,
        schema: &str,
        tag: &TagOption,
    ) -> UcamResult<(u64, u64)> {
        Ok(self
            .coverage("uc_table", SecurableKind::Table, catalog, schema, tag)
            .await?)
    }

    async fn column_tag_coverage(
        &self,
        catalog: &str,
        schema: &str,
        tag: &TagOption,
    ) -> UcamResult<(u64, u64)> {
        Ok(self
            .coverage("uc_column", SecurableKind::Column, catalog, schema, tag)
            .await?)
    }

    async fn tagged_securables(
        &self,
        tag_name: &str,
        catalog: Option<&str>,
        schema: Option<&str>,
    ) -> UcamResult<Vec<TaggedSecurable>> {
        let mut conditions = vec![
            "kind IN ['CATALOG', 'SCHEMA', 'TABLE']",
            "tag_name = $tag_name",
        ];
        if catalog.is_some() {
            conditions.push("catalog_name = $catalog");
        }
        // A catalog-level tag still covers every schema inside it.
        if schema.is_some() {
            conditions.push("(schema_name = NONE OR schema_name = $schema)");
        }

        let query = format!(
            "SELECT * FROM governed_tag WHERE {} \
             ORDER BY catalog_name ASC, schema_name ASC, table_name ASC",
            conditions.join(" AND ")
        );
        let mut builder = self
            .db
            .query(&query)
            .bind(("tag_name", tag_name.to_string()));
        if let Some(catalog) = catalog {
            builder = builder.bind(("catalog", catalog.to_string()));
        }
        if let Some(schema) = schema {
            builder = builder.bind(("schema", schema.to_string()));
        }

        let mut response = builder.await.map_err(DbError::from)?;
        let rows: Vec<TagRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                Ok(TaggedSecurable {
                    securable: row.securable()?,
                    tag_value: row.tag_value,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn apply_tags(&self, statement: &AlterTags) -> UcamResult<()> {
        let securable = statement.securable();
        self.require(securable).await?;
        let key = securable_key(securable);

        match statement.change() {
            TagChange::Set(pairs) => {
                for (name, value) in pairs {
                    self.db
                        .query(
                            "UPSERT type::record('governed_tag', $id) SET \
                             securable_key = $key, kind = $kind, \
                             catalog_name = $catalog, schema_name = $schema, \
                             table_name = $table, column_name = $column, \
                             tag_name = $tag_name, tag_value = $tag_value",
                        )
                        .bind(("id", format!("{key}#{}", name.as_str())))
                        .bind(("key", key.clone()))
                        .bind(("kind", securable.kind().as_str()))
                        .bind(("catalog", securable.catalog().to_string()))
                        .bind(("schema", securable.schema().map(str::to_string)))
                        .bind(("table", securable.table().map(str::to_string)))
                        .bind(("column", securable.column().map(str::to_string)))
                        .bind(("tag_name", name.as_str().to_string()))
                        .bind(("tag_value", value.clone()))
                        .await
                        .map_err(DbError::from)?
                        .check()
                        .map_err(|e| DbError::Query(e.to_string()))?;
                }
            }
            TagChange::Unset(names) => {
                for name in names {
                    self.db
                        .query("DELETE type::record('governed_tag', $id)")
                        .bind(("id", format!("{key}#{}", name.as_str())))
                        .await
                        .map_err(DbError::from)?
                        .check()
                        .map_err(|e| DbError::Query(e.to_string()))?;
                }
            }
        }

        info!(securable = %securable.full_name(), "Applied tag statement");
        Ok(())
    }
}
