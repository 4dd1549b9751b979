//! SurrealDB repository implementations.

mod access_rule;
mod audit;
mod catalog;
mod membership;
mod statement;

pub use access_rule::SurrealAccessRuleRepository;
pub use audit::SurrealAuditLogRepository;
pub use catalog::SurrealCatalogRepository;
pub use membership::SurrealMembershipRepository;
pub use statement::SurrealStatementRegistry;
