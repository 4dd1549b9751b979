//! UCAM operator command line: customer access rules, governed tags and
//! row-filter policies.

mod app;
mod commands;
mod settings;

use anyhow::bail;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ucam_core::models::principal::Principal;

use app::{App, print_json};
use commands::audit::{AuditCommand, ReportCommand, handle_audit_command, handle_report_command};
use commands::catalog::{
    BrowseCommand, MembersCommand, TagsCommand, handle_browse_command, handle_members_command,
    handle_tags_command,
};
use commands::policy::{PolicyCommand, handle_policy_command};
use commands::rules::{RulesCommand, handle_rules_command};
use settings::Settings;

#[derive(Parser)]
#[command(name = "ucam")]
#[command(about = "Manage customer access rules and Unity Catalog governance", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply migrations and verify the access and audit tables
    Setup {
        /// Add this principal to the admin group while the group is empty
        #[arg(long)]
        admin: Option<String>,
    },

    /// Manage access rules
    #[command(subcommand)]
    Rules(RulesCommand),

    /// Evaluate a customer against a set of groups
    Evaluate {
        customer: i64,

        /// Group, repeatable
        #[arg(long = "group")]
        groups: Vec<String>,

        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Evaluate a customer for a principal's groups
    Check {
        customer: i64,

        /// Defaults to UCAM_PRINCIPAL
        #[arg(long)]
        principal: Option<String>,

        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// List access rule mutations with no audit entry
    Reconcile,

    /// Browse catalogs, schemas, tables and columns
    #[command(subcommand)]
    Browse(BrowseCommand),

    /// Inspect and change governed tags
    #[command(subcommand)]
    Tags(TagsCommand),

    /// Manage group membership
    #[command(subcommand)]
    Members(MembersCommand),

    /// Generate row-filter functions and policies, propagate tags
    #[command(subcommand)]
    Policy(PolicyCommand),

    /// Query the audit log
    #[command(subcommand)]
    Audit(AuditCommand),

    /// Reports over rules, tags and changes
    #[command(subcommand)]
    Report(ReportCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ucam=info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();
    let app = App::connect(settings).await?;

    match cli.command {
        Commands::Setup { admin } => {
            let status = app.db().prepare().await;
            print_json(&json!({
                "status": &status,
                "access_table": app.settings.governance.qualified_access_table(),
                "audit_table": app.settings.governance.qualified_audit_table(),
                "warehouse": &app.settings.warehouse,
            }))?;
            if !status.setup_complete {
                bail!("setup incomplete: {}", status.errors.join("; "));
            }
            info!(schema_version = status.schema_version, "setup complete");
            if let Some(admin) = admin {
                let cap = app.bootstrap_admin(&Principal::new(admin)).await?;
                print_json(&json!({
                    "admin": cap.user(),
                    "group": app.settings.governance.admin_group,
                }))?;
            }
            Ok(())
        }
        Commands::Rules(command) => handle_rules_command(&app, command).await,
        Commands::Evaluate {
            customer,
            groups,
            as_of,
        } => commands::rules::evaluate(&app, customer, groups, as_of).await,
        Commands::Check {
            customer,
            principal,
            as_of,
        } => commands::rules::check(&app, customer, principal, as_of).await,
        Commands::Reconcile => commands::rules::reconcile(&app).await,
        Commands::Browse(command) => handle_browse_command(&app, command).await,
        Commands::Tags(command) => handle_tags_command(&app, command).await,
        Commands::Members(command) => handle_members_command(&app, command).await,
        Commands::Policy(command) => handle_policy_command(&app, command).await,
        Commands::Audit(command) => handle_audit_command(&app, command).await,
        Commands::Report(command) => handle_report_command(&app, command).await,
    }
}
