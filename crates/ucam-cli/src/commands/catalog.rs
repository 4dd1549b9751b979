//! Catalog browsing, tag and membership commands.

use anyhow::{Context, bail};
use clap::Subcommand;
use serde_json::json;
use ucam_core::models::catalog::{ColumnInfo, TableRef};
use ucam_core::models::principal::Principal;
use ucam_core::repository::{CatalogRepository, MembershipRepository};

use crate::app::{App, print_json};

#[derive(Subcommand)]
pub enum BrowseCommand {
    /// List catalogs
    Catalogs,

    /// List schemas of a catalog
    Schemas { catalog: String },

    /// List tables of a schema
    Tables { catalog: String, schema: String },

    /// List columns of a table
    Columns {
        /// catalog.schema.table
        table: String,
    },

    /// Register a table and its columns in the governance catalog
    RegisterTable {
        /// catalog.schema.table
        table: String,

        /// Column as name:TYPE, repeatable
        #[arg(long = "column", required = true)]
        columns: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum TagsCommand {
    /// Show table and column tags of a table
    List {
        /// catalog.schema.table
        table: String,
    },

    /// Distinct tag name/value pairs used in a schema
    Options { catalog: String, schema: String },

    /// Set a table tag
    Apply {
        table: String,
        name: String,
        value: String,
    },

    /// Unset a table tag
    Remove { table: String, name: String },

    /// Set a column tag
    ApplyColumn {
        table: String,
        column: String,
        name: String,
        value: String,
    },

    /// Unset a column tag
    RemoveColumn {
        table: String,
        column: String,
        name: String,
    },
}

#[derive(Subcommand)]
pub enum MembersCommand {
    /// Add a principal to a group
    Add { principal: String, group: String },

    /// Remove a principal from a group
    Remove { principal: String, group: String },

    /// Groups of a principal
    List { principal: String },
}

/// Parse `catalog.schema.table`.
pub fn parse_table(value: &str) -> anyhow::Result<TableRef> {
    let parts: Vec<&str> = value.split('.').map(str::trim).collect();
    match parts.as_slice() {
        [catalog, schema, table] if !catalog.is_empty() && !schema.is_empty() && !table.is_empty() => {
            Ok(TableRef::new(*catalog, *schema, *table))
        }
        _ => bail!("expected catalog.schema.table, got {value:?}"),
    }
}

/// Parse `name:TYPE` column specs, numbering them in order.
fn parse_columns(specs: &[String]) -> anyhow::Result<Vec<ColumnInfo>> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let (name, data_type) = spec
                .split_once(':')
                .with_context(|| format!("expected name:TYPE, got {spec:?}"))?;
            Ok(ColumnInfo {
                name: name.trim().to_string(),
                data_type: data_type.trim().to_string(),
                position: u32::try_from(i)?,
            })
        })
        .collect()
}

pub async fn handle_browse_command(app: &App, command: BrowseCommand) -> anyhow::Result<()> {
    let tags = app.tags();
    match command {
        BrowseCommand::Catalogs => print_json(&tags.list_catalogs().await?),
        BrowseCommand::Schemas { catalog } => print_json(&tags.list_schemas(&catalog).await?),
        BrowseCommand::Tables { catalog, schema } => {
            print_json(&tags.list_tables(&catalog, &schema).await?)
        }
        BrowseCommand::Columns { table } => {
            print_json(&tags.list_columns(&parse_table(&table)?).await?)
        }
        BrowseCommand::RegisterTable { table, columns } => {
            app.admin().await?;
            let table = parse_table(&table)?;
            let columns = parse_columns(&columns)?;
            app.catalog().register_table(&table, &columns).await?;
            print_json(&json!({ "registered": table.to_string(), "columns": columns.len() }))
        }
    }
}

pub async fn handle_tags_command(app: &App, command: TagsCommand) -> anyhow::Result<()> {
    let tags = app.tags();
    match command {
        TagsCommand::List { table } => {
            let table = parse_table(&table)?;
            let table_tags = tags.table_tags(&table).await?;
            let column_tags = tags.column_tags(&table).await?;
            print_json(&json!({ "table": table_tags, "columns": column_tags }))
        }
        TagsCommand::Options { catalog, schema } => {
            print_json(&tags.tag_options(&catalog, &schema).await?)
        }
        TagsCommand::Apply { table, name, value } => {
            let cap = app.admin().await?;
            let statement = tags
                .apply_table_tag(&cap, &parse_table(&table)?, &name, &value)
                .await?;
            println!("{statement}");
            Ok(())
        }
        TagsCommand::Remove { table, name } => {
            let cap = app.admin().await?;
            let statement = tags
                .remove_table_tag(&cap, &parse_table(&table)?, &name)
                .await?;
            println!("{statement}");
            Ok(())
        }
        TagsCommand::ApplyColumn {
            table,
            column,
            name,
            value,
        } => {
            let cap = app.admin().await?;
            let statement = tags
                .apply_column_tag(&cap, &parse_table(&table)?, &column, &name, &value)
                .await?;
            println!("{statement}");
            Ok(())
        }
        TagsCommand::RemoveColumn {
            table,
            column,
            name,
        } => {
            let cap = app.admin().await?;
            let statement = tags
                .remove_column_tag(&cap, &parse_table(&table)?, &column, &name)
                .await?;
            println!("{statement}");
            Ok(())
        }
    }
}

pub async fn handle_members_command(app: &App, command: MembersCommand) -> anyhow::Result<()> {
    let memberships = app.memberships();
    match command {
        MembersCommand::Add { principal, group } => {
            app.admin().await?;
            memberships
                .add_member(&Principal::new(principal), &group)
                .await?;
            Ok(())
        }
        MembersCommand::Remove { principal, group } => {
            app.admin().await?;
            memberships
                .remove_member(&Principal::new(principal), &group)
                .await?;
            Ok(())
        }
        MembersCommand::List { principal } => {
            print_json(&memberships.groups_for(&Principal::new(principal)).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_need_three_parts() {
        let table = parse_table("main.sales.orders").unwrap();
        assert_eq!(table, TableRef::new("main", "sales", "orders"));
        assert!(parse_table("sales.orders").is_err());
        assert!(parse_table("main..orders").is_err());
    }

    #[test]
    fn column_specs_are_numbered() {
        let columns =
            parse_columns(&["customer_id:BIGINT".to_string(), "name : STRING".to_string()])
                .unwrap();
        assert_eq!(columns[1].name, "name");
        assert_eq!(columns[1].data_type, "STRING");
        assert_eq!(columns[1].position, 1);
        assert!(parse_columns(&["broken".to_string()]).is_err());
    }
}
