//! Settings resolved from the process environment.

use std::env;

use serde::Serialize;
use ucam_core::models::principal::Principal;
use ucam_core::validation::normalize_hostname;
use ucam_db::DbConfig;
use ucam_governance::GovernanceConfig;

/// Warehouse the generated SQL is meant for. Informational only; UCAM
/// hands statements to its registry instead of executing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseSettings {
    pub server_hostname: String,
    pub warehouse_id: String,
    pub http_path: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub db: DbConfig,
    pub governance: GovernanceConfig,
    pub warehouse: Option<WarehouseSettings>,
    /// Acting user, from `UCAM_PRINCIPAL`.
    pub principal: Principal,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let db_defaults = DbConfig::default();
        let db = DbConfig {
            url: get("UCAM_DB_URL").unwrap_or(db_defaults.url),
            namespace: get("UCAM_DB_NAMESPACE").unwrap_or(db_defaults.namespace),
            database: get("UCAM_DB_DATABASE").unwrap_or(db_defaults.database),
            username: get("UCAM_DB_USER").unwrap_or(db_defaults.username),
            password: get("UCAM_DB_PASSWORD").unwrap_or(db_defaults.password),
        };

        let defaults = GovernanceConfig::default();
        let governance = GovernanceConfig {
            catalog: get("CATALOG_NAME").unwrap_or(defaults.catalog),
            schema: get("SCHEMA_NAME").unwrap_or(defaults.schema),
            access_table: get("ACCESS_TABLE").unwrap_or(defaults.access_table),
            audit_table: get("AUDIT_TABLE").unwrap_or(defaults.audit_table),
            admin_group: get("ADMIN_GROUP").unwrap_or(defaults.admin_group),
            ..defaults
        };

        let warehouse = match (get("DATABRICKS_SERVER_HOSTNAME"), get("DATABRICKS_WAREHOUSE_ID")) {
            (Some(host), Some(warehouse_id)) => Some(WarehouseSettings {
                server_hostname: normalize_hostname(&host),
                http_path: get("DATABRICKS_HTTP_PATH")
                    .unwrap_or_else(|| format!("/sql/1.0/warehouses/{warehouse_id}")),
                warehouse_id,
            }),
            _ => None,
        };

        Self {
            db,
            governance,
            warehouse,
            principal: Principal::new(get("UCAM_PRINCIPAL").unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]);
        assert_eq!(s.db.namespace, "ucam");
        assert_eq!(s.governance.access_table, "group_customer_access");
        assert!(s.warehouse.is_none());
        assert!(s.principal.is_unknown());
    }

    #[test]
    fn overrides_and_qualification() {
        let s = settings(&[
            ("CATALOG_NAME", "prod"),
            ("SCHEMA_NAME", "acl"),
            ("AUDIT_TABLE", "other.schema.audit"),
            ("ADMIN_GROUP", " governance_admins "),
            ("UCAM_PRINCIPAL", "ops@example.com"),
        ]);
        assert_eq!(
            s.governance.qualified_access_table(),
            "prod.acl.group_customer_access"
        );
        assert_eq!(s.governance.qualified_audit_table(), "other.schema.audit");
        assert_eq!(s.governance.admin_group, "governance_admins");
        assert_eq!(s.principal.as_str(), "ops@example.com");
    }

    #[test]
    fn warehouse_hostname_is_normalized_and_path_derived() {
        let s = settings(&[
            ("DATABRICKS_SERVER_HOSTNAME", "https://adb-123.azuredatabricks.net/"),
            ("DATABRICKS_WAREHOUSE_ID", "abc123"),
        ]);
        let warehouse = s.warehouse.unwrap();
        assert_eq!(warehouse.server_hostname, "adb-123.azuredatabricks.net");
        assert_eq!(warehouse.http_path, "/sql/1.0/warehouses/abc123");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let s = settings(&[("CATALOG_NAME", "  "), ("DATABRICKS_WAREHOUSE_ID", "x")]);
        assert_eq!(s.governance.catalog, "main");
        assert!(s.warehouse.is_none());
    }
}
