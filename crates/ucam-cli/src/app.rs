//! Service wiring over one store connection.

use anyhow::Context;
use serde::Serialize;
use surrealdb::engine::remote::ws::Client;
use ucam_core::models::principal::Principal;
use ucam_db::DbManager;
use ucam_db::repository::{
    SurrealAccessRuleRepository, SurrealAuditLogRepository, SurrealCatalogRepository,
    SurrealMembershipRepository, SurrealStatementRegistry,
};
use ucam_governance::{
    AccessService, AdminCapability, AuditRecorder, Authorizer, PolicyTools, ReportService,
    RetryPolicy, TagService,
};

use crate::settings::Settings;

pub type Access = AccessService<
    SurrealAccessRuleRepository<Client>,
    SurrealAuditLogRepository<Client>,
    SurrealMembershipRepository<Client>,
>;
pub type Tags = TagService<SurrealCatalogRepository<Client>, SurrealAuditLogRepository<Client>>;
pub type Policy = PolicyTools<
    SurrealStatementRegistry<Client>,
    SurrealCatalogRepository<Client>,
    SurrealAuditLogRepository<Client>,
>;
pub type Reports = ReportService<
    SurrealAccessRuleRepository<Client>,
    SurrealAuditLogRepository<Client>,
    SurrealCatalogRepository<Client>,
>;

pub struct App {
    pub settings: Settings,
    db: DbManager,
}

impl App {
    pub async fn connect(settings: Settings) -> anyhow::Result<Self> {
        let db = DbManager::connect(&settings.db)
            .await
            .with_context(|| format!("failed to connect to {}", settings.db.url))?;
        Ok(Self { settings, db })
    }

    pub fn db(&self) -> &DbManager {
        &self.db
    }

    fn recorder(&self) -> AuditRecorder<SurrealAuditLogRepository<Client>> {
        AuditRecorder::new(
            SurrealAuditLogRepository::new(self.db.client().clone()),
            RetryPolicy::from_config(&self.settings.governance),
        )
    }

    pub fn memberships(&self) -> SurrealMembershipRepository<Client> {
        SurrealMembershipRepository::new(self.db.client().clone())
    }

    pub fn catalog(&self) -> SurrealCatalogRepository<Client> {
        SurrealCatalogRepository::new(self.db.client().clone())
    }

    pub fn access(&self) -> Access {
        AccessService::new(
            SurrealAccessRuleRepository::new(self.db.client().clone()),
            self.recorder(),
            self.memberships(),
        )
    }

    pub fn tags(&self) -> Tags {
        TagService::new(self.catalog(), self.recorder())
    }

    pub fn policy(&self) -> Policy {
        PolicyTools::new(
            SurrealStatementRegistry::new(self.db.client().clone()),
            self.catalog(),
            self.recorder(),
        )
    }

    pub fn reports(&self) -> Reports {
        ReportService::new(
            SurrealAccessRuleRepository::new(self.db.client().clone()),
            SurrealAuditLogRepository::new(self.db.client().clone()),
            self.catalog(),
            self.settings.governance.clone(),
        )
    }

    /// Admin capability for the configured principal.
    pub async fn admin(&self) -> anyhow::Result<AdminCapability> {
        let authorizer = Authorizer::new(self.memberships(), &self.settings.governance.admin_group);
        Ok(authorizer.authorize_admin(&self.settings.principal).await?)
    }

    /// Seed the admin group with its first member.
    pub async fn bootstrap_admin(&self, principal: &Principal) -> anyhow::Result<AdminCapability> {
        let authorizer = Authorizer::new(self.memberships(), &self.settings.governance.admin_group);
        Ok(authorizer.bootstrap_admin(principal).await?)
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
