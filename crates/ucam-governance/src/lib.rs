//! UCAM governance services: the admin gate, audited access rule and tag
//! mutations, row-filter policy tooling and reports.

pub mod access;
pub mod audit;
pub mod authz;
pub mod config;
pub mod error;
pub mod policy;
pub mod reports;
pub mod tags;

pub use access::{AccessService, AuditFinding, FindingKind};
pub use audit::{AuditRecorder, RetryPolicy};
pub use authz::{AdminCapability, Authorizer};
pub use config::GovernanceConfig;
pub use error::GovernanceError;
pub use policy::{
    FilterFunctionRequest, PolicyTools, PropagationAction, PropagationOutcome, PropagationRequest,
};
pub use reports::ReportService;
pub use tags::TagService;
