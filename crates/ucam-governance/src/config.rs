//! Governance service configuration.

/// Configuration shared by the governance services.
#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    /// Catalog holding the access and audit tables.
    pub catalog: String,
    /// Schema holding the access and audit tables.
    pub schema: String,
    /// Access table name, bare or fully qualified.
    pub access_table: String,
    /// Audit table name, bare or fully qualified.
    pub audit_table: String,
    /// Members of this group receive an [`AdminCapability`](crate::AdminCapability).
    pub admin_group: String,
    /// Attempts made for each audit append before giving up (default: 3).
    pub audit_retry_attempts: u32,
    /// Delay before the first audit retry, doubled per attempt (default: 100).
    pub audit_retry_backoff_ms: u64,
    /// Window for the "expiring soon" metric in days (default: 7).
    pub expiring_soon_days: i64,
    /// How far back the access matrix lists expired rules (default: 60).
    pub expired_lookback_days: i64,
    /// Cap on audit listings (default: 1000).
    pub audit_limit: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            catalog: "main".into(),
            schema: "governance".into(),
            access_table: "group_customer_access".into(),
            audit_table: "access_audit_log".into(),
            admin_group: "uc_admins".into(),
            audit_retry_attempts: 3,
            audit_retry_backoff_ms: 100,
            expiring_soon_days: 7,
            expired_lookback_days: 60,
            audit_limit: 1000,
        }
    }
}

impl GovernanceConfig {
    /// Prefix a bare table name with the configured catalog and schema.
    /// Names that already contain a dot are returned unchanged.
    pub fn qualify_table(&self, table: &str) -> String {
        if table.contains('.') {
            table.to_string()
        } else {
            format!("{}.{}.{table}", self.catalog, self.schema)
        }
    }

    pub fn qualified_access_table(&self) -> String {
        self.qualify_table(&self.access_table)
    }

    pub fn qualified_audit_table(&self) -> String {
        self.qualify_table(&self.audit_table)
    }
}
