//! Integration tests for the governance catalog mirror, memberships and the
//! statement registry on in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use ucam_core::UcamError;
use ucam_core::models::catalog::{ColumnInfo, Securable, TableRef, TagOption};
use ucam_core::models::principal::Principal;
use ucam_core::repository::{CatalogRepository, MembershipRepository, StatementRegistry};
use ucam_core::statement::{AlterTags, Statement, StatementKind};
use ucam_db::repository::{
    SurrealCatalogRepository, SurrealMembershipRepository, SurrealStatementRegistry,
};

async fn db() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    ucam_db::run_migrations(&db).await.unwrap();
    db
}

fn columns(names: &[&str]) -> Vec<ColumnInfo> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| ColumnInfo {
            name: (*name).into(),
            data_type: "INT".into(),
            position: i as u32,
        })
        .collect()
}

/// main.sales.{orders, invoices}, main.hr.staff
async fn seeded() -> SurrealCatalogRepository<Db> {
    let repo = SurrealCatalogRepository::new(db().await);
    repo.register_table(
        &TableRef::new("main", "sales", "orders"),
        &columns(&["order_id", "customer_id"]),
    )
    .await
    .unwrap();
    repo.register_table(
        &TableRef::new("main", "sales", "invoices"),
        &columns(&["invoice_id", "amount"]),
    )
    .await
    .unwrap();
    repo.register_table(&TableRef::new("main", "hr", "staff"), &columns(&["name"]))
        .await
        .unwrap();
    repo
}

#[tokio::test]
async fn browse_catalog_hierarchy() {
    let repo = seeded().await;
    repo.register_catalog("archive").await.unwrap();

    assert_eq!(repo.list_catalogs().await.unwrap(), vec!["archive", "main"]);
    assert_eq!(repo.list_schemas("main").await.unwrap(), vec!["hr", "sales"]);
    assert_eq!(
        repo.list_tables("main", "sales").await.unwrap(),
        vec!["invoices", "orders"]
    );

    let cols = repo
        .list_columns(&TableRef::new("main", "sales", "orders"))
        .await
        .unwrap();
    let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["customer_id", "order_id"]);

    assert_eq!(repo.tables_in_catalog("main").await.unwrap().len(), 3);
    assert_eq!(repo.tables_in_schema("main", "hr").await.unwrap().len(), 1);
}

#[tokio::test]
async fn reregistering_a_table_replaces_columns() {
    let repo = seeded().await;
    let orders = TableRef::new("main", "sales", "orders");
    repo.register_table(&orders, &columns(&["only"])).await.unwrap();

    let cols = repo.list_columns(&orders).await.unwrap();
    assert_eq!(cols.len(), 1);
    assert_eq!(cols[0].name, "only");
}

#[tokio::test]
async fn set_and_unset_table_tags() {
    let repo = seeded().await;
    let orders = TableRef::new("main", "sales", "orders");

    repo.apply_tags(&AlterTags::set(Securable::Table(orders.clone()), "pii", "low").unwrap())
        .await
        .unwrap();
    repo.apply_tags(&AlterTags::set(Securable::Table(orders.clone()), "pii", "high").unwrap())
        .await
        .unwrap();

    let tags = repo.table_tags(&orders).await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag_value, "high");
    assert_eq!(tags[0].securable, Securable::Table(orders.clone()));

    repo.apply_tags(&AlterTags::unset(Securable::Table(orders.clone()), "pii").unwrap())
        .await
        .unwrap();
    assert!(repo.table_tags(&orders).await.unwrap().is_empty());
}

#[tokio::test]
async fn column_tags_and_coverage() {
    let repo = seeded().await;
    let orders = TableRef::new("main", "sales", "orders");
    let column = Securable::Column {
        table: orders.clone(),
        column: "customer_id".into(),
    };
    repo.apply_tags(&AlterTags::set(column.clone(), "customer_key", "true").unwrap())
        .await
        .unwrap();
    repo.apply_tags(
        &AlterTags::set(Securable::Table(orders.clone()), "domain", "sales").unwrap(),
    )
    .await
    .unwrap();

    let tags = repo.column_tags(&orders).await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].securable, column);

    let options = repo.tag_options("main", "sales").await.unwrap();
    assert_eq!(
        options,
        vec![
            TagOption {
                tag_name: "customer_key".into(),
                tag_value: "true".into()
            },
            TagOption {
                tag_name: "domain".into(),
                tag_value: "sales".into()
            },
        ]
    );

    let (total, tagged) = repo
        .column_tag_coverage("main", "sales", &options[0])
        .await
        .unwrap();
    assert_eq!((total, tagged), (4, 1));

    let (total, tagged) = repo
        .table_tag_coverage("main", "sales", &options[1])
        .await
        .unwrap();
    assert_eq!((total, tagged), (2, 1));
}

#[tokio::test]
async fn tagging_an_unregistered_table_is_not_found() {
    let repo = seeded().await;
    let ghost = Securable::Table(TableRef::new("main", "sales", "ghost"));
    let err = repo
        .apply_tags(&AlterTags::set(ghost, "pii", "high").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, UcamError::NotFound { .. }));
}

#[tokio::test]
async fn tagged_securables_include_parent_levels() {
    let repo = seeded().await;
    repo.apply_tags(
        &AlterTags::set(
            Securable::Catalog {
                catalog: "main".into(),
            },
            "region",
            "emea",
        )
        .unwrap(),
    )
    .await
    .unwrap();
    repo.apply_tags(
        &AlterTags::set(
            Securable::Schema {
                catalog: "main".into(),
                schema: "hr".into(),
            },
            "region",
            "us",
        )
        .unwrap(),
    )
    .await
    .unwrap();

    let everywhere = repo.tagged_securables("region", None, None).await.unwrap();
    assert_eq!(everywhere.len(), 2);

    // The catalog tag still applies when narrowing to the sales schema.
    let sales = repo
        .tagged_securables("region", Some("main"), Some("sales"))
        .await
        .unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].tag_value, "emea");
}

#[tokio::test]
async fn memberships() {
    let repo = SurrealMembershipRepository::new(db().await);
    let alice = Principal::new("alice@example.com");
    assert!(!repo.has_members("uc_admins").await.unwrap());

    repo.add_member(&alice, "uc_admins").await.unwrap();
    assert!(repo.has_members("uc_admins").await.unwrap());
    assert!(!repo.has_members("auditors").await.unwrap());
    repo.add_member(&alice, "analysts").await.unwrap();
    repo.add_member(&alice, "analysts").await.unwrap();

    assert!(repo.is_member(&alice, "uc_admins").await.unwrap());
    assert_eq!(repo.groups_for(&alice).await.unwrap().len(), 2);

    repo.remove_member(&alice, "uc_admins").await.unwrap();
    assert!(!repo.is_member(&alice, "uc_admins").await.unwrap());
    assert!(!repo.has_members("uc_admins").await.unwrap());
    assert!(
        repo.groups_for(&Principal::new("bob@example.com"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn statement_registry_records_sql() {
    let registry = SurrealStatementRegistry::new(db().await);
    let statement: Statement = AlterTags::set(
        Securable::Table(TableRef::new("main", "sales", "orders")),
        "pii",
        "high",
    )
    .unwrap()
    .into();

    let issued = registry
        .submit(&statement, &Principal::new("admin@example.com"))
        .await
        .unwrap();
    assert_eq!(issued.kind, StatementKind::AlterTags);
    assert_eq!(issued.target, "main.sales.orders");
    assert_eq!(issued.sql, statement.to_string());

    let listed = registry.list(10).await.unwrap();
    assert_eq!(listed, vec![issued]);
}
