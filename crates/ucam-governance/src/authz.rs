//! Admin gate.
//!
//! Every mutating service call takes an [`AdminCapability`]. The only way
//! to obtain one is [`Authorizer::authorize_admin`], which performs a
//! single membership check against the configured admin group, or
//! [`Authorizer::bootstrap_admin`] while that group is still empty.

use tracing::{info, warn};
use ucam_core::error::UcamResult;
use ucam_core::models::principal::Principal;
use ucam_core::repository::MembershipRepository;

use crate::error::GovernanceError;

/// Proof that `principal` passed the admin check.
#[derive(Debug, Clone)]
pub struct AdminCapability {
    principal: Principal,
}

impl AdminCapability {
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Attribution string written to `created_by`, `modified_by` and audit rows.
    pub fn user(&self) -> &str {
        self.principal.as_str()
    }
}

pub struct Authorizer<M: MembershipRepository> {
    memberships: M,
    admin_group: String,
}

impl<M: MembershipRepository> Authorizer<M> {
    pub fn new(memberships: M, admin_group: impl Into<String>) -> Self {
        Self {
            memberships,
            admin_group: admin_group.into(),
        }
    }

    pub fn admin_group(&self) -> &str {
        &self.admin_group
    }

    /// Whether `principal` belongs to the admin group. Store errors are
    /// propagated, never read as "not an admin".
    pub async fn is_admin(&self, principal: &Principal) -> UcamResult<bool> {
        if principal.is_unknown() {
            return Ok(false);
        }
        self.memberships
            .is_member(principal, &self.admin_group)
            .await
    }

    pub async fn authorize_admin(&self, principal: &Principal) -> UcamResult<AdminCapability> {
        if principal.is_unknown() {
            warn!("admin check without an authenticated principal");
            return Err(GovernanceError::AnonymousPrincipal.into());
        }

        if !self.is_admin(principal).await? {
            warn!(principal = %principal, group = %self.admin_group, "admin check denied");
            return Err(GovernanceError::NotAdmin {
                principal: principal.to_string(),
                group: self.admin_group.clone(),
            }
            .into());
        }

        info!(principal = %principal, "admin check passed");
        Ok(AdminCapability {
            principal: principal.clone(),
        })
    }

    /// Make `principal` the first admin. Denied once the admin group has
    /// any member.
    pub async fn bootstrap_admin(&self, principal: &Principal) -> UcamResult<AdminCapability> {
        if principal.is_unknown() {
            warn!("admin bootstrap without an authenticated principal");
            return Err(GovernanceError::AnonymousPrincipal.into());
        }

        if self.memberships.has_members(&self.admin_group).await? {
            warn!(principal = %principal, group = %self.admin_group, "admin bootstrap denied");
            return Err(GovernanceError::AdminGroupNotEmpty {
                principal: principal.to_string(),
                group: self.admin_group.clone(),
            }
            .into());
        }

        self.memberships
            .add_member(principal, &self.admin_group)
            .await?;
        info!(principal = %principal, group = %self.admin_group, "first admin added");
        Ok(AdminCapability {
            principal: principal.clone(),
        })
    }
}
