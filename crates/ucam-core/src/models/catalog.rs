//! Governance catalog model: securables and their governed tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fully qualified `catalog.schema.table` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub position: u32,
}

/// An object that can carry governed tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Securable {
    Catalog {
        catalog: String,
    },
    Schema {
        catalog: String,
        schema: String,
    },
    Table(TableRef),
    Column {
        table: TableRef,
        column: String,
    },
}

impl Securable {
    pub fn kind(&self) -> SecurableKind {
        match self {
            Securable::Catalog { .. } => SecurableKind::Catalog,
            Securable::Schema { .. } => SecurableKind::Schema,
            Securable::Table(_) => SecurableKind::Table,
            Securable::Column { .. } => SecurableKind::Column,
        }
    }

    pub fn catalog(&self) -> &str {
        match self {
            Securable::Catalog { catalog } | Securable::Schema { catalog, .. } => catalog,
            Securable::Table(t) | Securable::Column { table: t, .. } => &t.catalog,
        }
    }

    pub fn schema(&self) -> Option<&str> {
        match self {
            Securable::Catalog { .. } => None,
            Securable::Schema { schema, .. } => Some(schema),
            Securable::Table(t) | Securable::Column { table: t, .. } => Some(&t.schema),
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            Securable::Table(t) | Securable::Column { table: t, .. } => Some(&t.table),
            _ => None,
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            Securable::Column { column, .. } => Some(column),
            _ => None,
        }
    }

    /// Dotted name, e.g. `main.sales.orders.customer_id`.
    pub fn full_name(&self) -> String {
        match self {
            Securable::Catalog { catalog } => catalog.clone(),
            Securable::Schema { catalog, schema } => format!("{catalog}.{schema}"),
            Securable::Table(t) => t.to_string(),
            Securable::Column { table, column } => format!("{table}.{column}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurableKind {
    Catalog,
    Schema,
    Table,
    Column,
}

impl SecurableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurableKind::Catalog => "CATALOG",
            SecurableKind::Schema => "SCHEMA",
            SecurableKind::Table => "TABLE",
            SecurableKind::Column => "COLUMN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernedTag {
    pub securable: Securable,
    pub tag_name: String,
    pub tag_value: String,
}

/// A distinct `tag_name=tag_value` pair seen in a schema.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagOption {
    pub tag_name: String,
    pub tag_value: String,
}

impl fmt::Display for TagOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.tag_name, self.tag_value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCoverage {
    pub total: u64,
    pub tagged: u64,
}

impl TagCoverage {
    /// Tagged share in percent; zero when there is nothing to cover.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.tagged as f64 / self.total as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_full_name_is_dotted() {
        let s = Securable::Column {
            table: TableRef::new("main", "sales", "orders"),
            column: "customer_id".into(),
        };
        assert_eq!(s.full_name(), "main.sales.orders.customer_id");
        assert_eq!(s.kind(), SecurableKind::Column);
        assert_eq!(s.schema(), Some("sales"));
    }

    #[test]
    fn coverage_percent_handles_empty_scope() {
        assert_eq!(TagCoverage::default().percent(), 0.0);
        let c = TagCoverage { total: 4, tagged: 1 };
        assert!((c.percent() - 25.0).abs() < f64::EPSILON);
    }
}
