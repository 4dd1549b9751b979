//! Access rule commands.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use tracing::info;
use ucam_core::error::UcamError;
use ucam_core::models::access_rule::{AccessRuleFilter, RuleStatus};
use ucam_core::models::principal::Principal;
use ucam_core::validation::RuleDraft;
use uuid::Uuid;

use crate::app::{App, print_json};

#[derive(Subcommand)]
pub enum RulesCommand {
    /// List access rules
    List {
        /// Only rules of this group
        #[arg(long)]
        group: Option<String>,

        /// Only rules covering this customer (wildcard rules included)
        #[arg(long)]
        customer: Option<i64>,

        /// all, active or expired
        #[arg(long, default_value = "all")]
        status: RuleStatus,
    },

    /// Add a rule
    Add(RuleArgs),

    /// Replace the fields of an existing rule
    Update {
        id: Uuid,

        #[command(flatten)]
        rule: RuleArgs,
    },

    /// Expire a rule today (or at its effective date if it has not started)
    Expire { id: Uuid },

    /// Delete an expired rule
    Delete { id: Uuid },
}

#[derive(Args)]
pub struct RuleArgs {
    #[arg(long)]
    group: String,

    /// Comma separated ids and ranges (e.g. "101,200-210"); omit for all customers
    #[arg(long, default_value = "")]
    customers: String,

    /// INCLUDE or EXCLUDE
    #[arg(long, default_value = "INCLUDE")]
    access_type: String,

    /// First day the rule applies (defaults to today)
    #[arg(long)]
    effective: Option<NaiveDate>,

    /// First day the rule no longer applies
    #[arg(long)]
    expires: Option<NaiveDate>,

    #[arg(long)]
    notes: Option<String>,
}

impl RuleArgs {
    fn into_draft(self, today: NaiveDate) -> RuleDraft {
        RuleDraft {
            group_name: self.group,
            customer_ids: self.customers,
            access_type: self.access_type,
            effective_date: self.effective.unwrap_or(today),
            expiration_date: self.expires,
            notes: self.notes,
        }
    }
}

pub async fn handle_rules_command(app: &App, command: RulesCommand) -> anyhow::Result<()> {
    let access = app.access();
    let today = Utc::now().date_naive();

    match command {
        RulesCommand::List {
            group,
            customer,
            status,
        } => {
            let rules = access
                .list_rules(AccessRuleFilter {
                    group_name: group,
                    customer_id: customer,
                    status,
                    as_of: Some(today),
                })
                .await?;
            print_json(&rules)
        }
        RulesCommand::Add(args) => {
            let cap = app.admin().await?;
            let rule = access.add_rule(&cap, args.into_draft(today)).await?;
            print_json(&rule)
        }
        RulesCommand::Update { id, rule } => {
            let cap = app.admin().await?;
            let rule = access.update_rule(&cap, id, rule.into_draft(today)).await?;
            print_json(&rule)
        }
        RulesCommand::Expire { id } => {
            let cap = app.admin().await?;
            let rule = access.expire_rule(&cap, id, today).await?;
            print_json(&rule)
        }
        RulesCommand::Delete { id } => {
            let cap = app.admin().await?;
            let rule = access.delete_rule(&cap, id, today).await?;
            info!(rule_id = %rule.id, "deleted");
            print_json(&rule)
        }
    }
}

pub async fn evaluate(
    app: &App,
    customer: i64,
    groups: Vec<String>,
    as_of: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let groups: BTreeSet<String> = groups.into_iter().collect();
    let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let evaluation = app.access().evaluate(customer, &groups, as_of).await?;
    print_json(&evaluation)
}

pub async fn check(
    app: &App,
    customer: i64,
    principal: Option<String>,
    as_of: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let principal = principal
        .map(Principal::new)
        .unwrap_or_else(|| app.settings.principal.clone());
    let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let evaluation = app.access().check_access(&principal, customer, as_of).await?;
    print_json(&evaluation)
}

/// Print reconcile findings; any finding makes the command fail.
pub async fn reconcile(app: &App) -> anyhow::Result<()> {
    let findings = app.access().reconcile().await?;
    print_json(&findings)?;
    if findings.is_empty() {
        info!("every access rule agrees with the audit log");
        return Ok(());
    }
    Err(UcamError::Inconsistency(format!(
        "{} access rule(s) disagree with the audit log",
        findings.len()
    ))
    .into())
}
