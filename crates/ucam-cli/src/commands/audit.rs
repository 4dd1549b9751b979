//! Audit log and report commands.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Subcommand};
use serde_json::json;
use ucam_core::models::audit::{AuditAction, AuditLogFilter, AuditObjectType};
use ucam_core::models::catalog::TagOption;

use crate::app::{App, print_json};

#[derive(Args)]
pub struct AuditFilterArgs {
    #[arg(long)]
    user: Option<String>,

    /// Action type, repeatable (e.g. INSERT, TAG_APPLY)
    #[arg(long = "action")]
    actions: Vec<AuditAction>,

    #[arg(long)]
    object_type: Option<AuditObjectType>,

    /// RFC 3339 lower bound
    #[arg(long)]
    since: Option<DateTime<Utc>>,

    /// RFC 3339 upper bound
    #[arg(long)]
    until: Option<DateTime<Utc>>,

    #[arg(long)]
    limit: Option<u64>,
}

impl From<AuditFilterArgs> for AuditLogFilter {
    fn from(args: AuditFilterArgs) -> Self {
        AuditLogFilter {
            start: args.since,
            end: args.until,
            user: args.user,
            action_types: args.actions,
            object_type: args.object_type,
            limit: args.limit,
        }
    }
}

#[derive(Subcommand)]
pub enum AuditCommand {
    /// Audit entries, newest first
    List {
        #[command(flatten)]
        filter: AuditFilterArgs,

        /// Print CSV instead of JSON
        #[arg(long)]
        csv: bool,
    },
}

#[derive(Subcommand)]
pub enum ReportCommand {
    /// Total, active and soon-expiring rule counts
    Metrics {
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Current and recently expired rules with a group heatmap
    Matrix {
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Share of tables and columns in a schema carrying a tag
    Coverage {
        catalog: String,
        schema: String,

        #[arg(long)]
        tag: String,

        #[arg(long)]
        value: String,
    },

    /// Change summary and matching audit entries
    History {
        #[command(flatten)]
        filter: AuditFilterArgs,
    },
}

pub async fn handle_audit_command(app: &App, command: AuditCommand) -> anyhow::Result<()> {
    let reports = app.reports();
    match command {
        AuditCommand::List { filter, csv } => {
            if csv {
                print!("{}", reports.export_csv(filter.into()).await?);
                Ok(())
            } else {
                print_json(&reports.change_history(filter.into()).await?.entries)
            }
        }
    }
}

pub async fn handle_report_command(app: &App, command: ReportCommand) -> anyhow::Result<()> {
    let reports = app.reports();
    let today = Utc::now().date_naive();

    match command {
        ReportCommand::Metrics { as_of } => {
            let metrics = reports.rule_metrics(as_of.unwrap_or(today)).await?;
            let labelled: serde_json::Map<String, serde_json::Value> = metrics
                .labelled()
                .into_iter()
                .map(|(label, count)| (label.to_string(), json!(count)))
                .collect();
            print_json(&labelled)
        }
        ReportCommand::Matrix { as_of } => {
            print_json(&reports.access_matrix(as_of.unwrap_or(today)).await?)
        }
        ReportCommand::Coverage {
            catalog,
            schema,
            tag,
            value,
        } => {
            let option = TagOption {
                tag_name: tag,
                tag_value: value,
            };
            let report = reports.tag_coverage(&catalog, &schema, &option).await?;
            print_json(&json!({
                "tag": report.tag.to_string(),
                "tables": report.tables,
                "tables_percent": report.tables.percent(),
                "columns": report.columns,
                "columns_percent": report.columns.percent(),
            }))
        }
        ReportCommand::History { filter } => {
            let history = reports.change_history(filter.into()).await?;
            print_json(&json!({
                "total_changes": history.summary.total_changes,
                "unique_users": history.summary.unique_users,
                "most_common_action": history.summary.most_common_action_label(),
                "entries": history.entries,
            }))
        }
    }
}
