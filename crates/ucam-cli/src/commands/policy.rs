//! Row-filter function, policy and tag propagation commands.

use clap::{Subcommand, ValueEnum};
use ucam_core::statement::{CreateRowFilterPolicy, GroupCheck, RowFilterPolicyParams};
use ucam_governance::policy::{DEFAULT_TARGET_COLUMN, default_policy_params};
use ucam_governance::{FilterFunctionRequest, PropagationOutcome, PropagationRequest};

use crate::app::{App, print_json};

#[derive(Clone, Copy, ValueEnum)]
pub enum GroupCheckArg {
    /// Workspace-local groups
    IsMember,
    /// Account-level groups
    IsAccountGroupMember,
}

impl From<GroupCheckArg> for GroupCheck {
    fn from(arg: GroupCheckArg) -> Self {
        match arg {
            GroupCheckArg::IsMember => GroupCheck::IsMember,
            GroupCheckArg::IsAccountGroupMember => GroupCheck::IsAccountGroupMember,
        }
    }
}

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// Generate the customer row-filter function
    Function {
        /// Function name inside the configured catalog and schema
        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_enum, default_value = "is-member")]
        group_check: GroupCheckArg,

        /// Print the SQL without issuing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate the schema-level row-filter policy
    RowFilter {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        comment: Option<String>,

        /// Qualified filter function name
        #[arg(long)]
        function: Option<String>,

        /// Principal the policy applies to
        #[arg(long)]
        principal: Option<String>,

        /// Column tag the policy matches on
        #[arg(long)]
        tag: Option<String>,

        #[arg(long)]
        tag_value: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Tag a column on every table below a tagged catalog, schema or table
    Propagate {
        #[arg(long)]
        parent_tag: String,

        /// Value the parent tag must contain
        #[arg(long)]
        required_value: String,

        #[arg(long, default_value = DEFAULT_TARGET_COLUMN)]
        column: String,

        #[arg(long)]
        column_tag: String,

        #[arg(long)]
        column_value: String,

        #[arg(long)]
        catalog: Option<String>,

        #[arg(long)]
        schema: Option<String>,

        /// Show the planned statements without applying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Statements handed to the warehouse, newest first
    Issued {
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
}

pub async fn handle_policy_command(app: &App, command: PolicyCommand) -> anyhow::Result<()> {
    let config = &app.settings.governance;
    let policy = app.policy();

    match command {
        PolicyCommand::Function {
            name,
            group_check,
            dry_run,
        } => {
            let mut request = FilterFunctionRequest::from_config(config);
            if let Some(name) = name {
                request.function_name = name;
            }
            request.group_check = group_check.into();

            if dry_run {
                println!("{}", request.build()?);
                return Ok(());
            }
            let cap = app.admin().await?;
            print_json(&policy.create_filter_function(&cap, &request).await?)
        }
        PolicyCommand::RowFilter {
            name,
            comment,
            function,
            principal,
            tag,
            tag_value,
            dry_run,
        } => {
            let defaults = default_policy_params(config);
            let params = RowFilterPolicyParams {
                policy_name: name.unwrap_or(defaults.policy_name),
                comment: comment.unwrap_or(defaults.comment),
                function: function.unwrap_or(defaults.function),
                principal: principal.unwrap_or(defaults.principal),
                tag_name: tag.unwrap_or(defaults.tag_name),
                tag_value: tag_value.unwrap_or(defaults.tag_value),
                ..defaults
            };

            if dry_run {
                println!("{}", CreateRowFilterPolicy::from_params(&params)?);
                return Ok(());
            }
            let cap = app.admin().await?;
            print_json(&policy.create_row_filter_policy(&cap, &params).await?)
        }
        PolicyCommand::Propagate {
            parent_tag,
            required_value,
            column,
            column_tag,
            column_value,
            catalog,
            schema,
            dry_run,
        } => {
            let request = PropagationRequest {
                parent_tag,
                required_value,
                column_name: column,
                column_tag,
                column_tag_value: column_value,
                catalog,
                schema,
            };
            let outcome = if dry_run {
                let actions = policy.plan_propagation(&request).await?;
                PropagationOutcome {
                    dry_run: true,
                    actions,
                }
            } else {
                let cap = app.admin().await?;
                policy.propagate(&cap, &request, false).await?
            };
            print_json(&outcome)
        }
        PolicyCommand::Issued { limit } => print_json(&policy.issued_statements(limit).await?),
    }
}
