//! Lifecycle commands shared by users and email templates.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use tracing::info;
use warden_id::{RemoteId, StateKey};
use warden_reconcile::{
    Attributes, EmailTemplateResource, Plan, ReconcileError, Reconciler, Refreshed, Report,
    Resource, Schema, StateRecord, StateStore, UserResource,
};

use crate::descriptor;
use crate::output::{
    attribute_rows, mask_sensitive, print_diagnostics, print_info, print_json, print_output,
    print_success, OutputFormat, SENSITIVE,
};

use super::CommandContext;

/// Lifecycle commands for one resource type.
#[derive(Debug, Args)]
pub struct ResourceCommand {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Create the resource, adopting an existing object with the same natural key.
    Create(DeclaredArgs),

    /// Read the remote object back into the state record.
    Refresh(KeyArgs),

    /// Show what `apply` would change.
    Plan(DeclaredArgs),

    /// Apply in-place changes to a managed resource.
    Update(DeclaredArgs),

    /// Create, update, or replace as needed.
    Apply(DeclaredArgs),

    /// Delete the remote object and forget the record.
    Destroy(KeyArgs),

    /// Start managing an existing remote object.
    Import(ImportArgs),
}

#[derive(Debug, Args)]
struct KeyArgs {
    /// State key of the record.
    #[arg(long)]
    key: StateKey,
}

#[derive(Debug, Args)]
struct DeclaredArgs {
    /// State key of the record.
    #[arg(long)]
    key: StateKey,

    /// TOML file with the declared attributes.
    #[arg(long, short = 'f')]
    file: PathBuf,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// State key to record the object under.
    #[arg(long)]
    key: StateKey,

    /// Id of the remote object.
    #[arg(long)]
    id: RemoteId,
}

impl ResourceCommand {
    pub async fn run_user(self, ctx: CommandContext) -> Result<()> {
        let reconciler = Reconciler::new(UserResource::new(ctx.client()?), ctx.store()?)
            .with_cancellation(ctx.cancel.clone());
        execute(&reconciler, self.action, ctx.format).await
    }

    pub async fn run_template(self, ctx: CommandContext) -> Result<()> {
        let reconciler = Reconciler::new(EmailTemplateResource::new(ctx.client()?), ctx.store()?)
            .with_cancellation(ctx.cancel.clone());
        execute(&reconciler, self.action, ctx.format).await
    }
}

async fn execute<R: Resource, S: StateStore>(
    reconciler: &Reconciler<R, S>,
    action: Action,
    format: OutputFormat,
) -> Result<()> {
    let schema = reconciler.resource().schema();

    match action {
        Action::Create(args) => {
            let declared = descriptor::from_path(&args.file)?;
            let report = reconciler.create(&args.key, &declared).await?;
            print_report(&args.key, &report, format);
        }
        Action::Update(args) => {
            let declared = descriptor::from_path(&args.file)?;
            let report = reconciler.update(&args.key, &declared).await?;
            print_report(&args.key, &report, format);
        }
        Action::Apply(args) => {
            let declared = descriptor::from_path(&args.file)?;
            let report = reconciler.apply(&args.key, &declared).await?;
            print_report(&args.key, &report, format);
        }
        Action::Plan(args) => {
            let declared = descriptor::from_path(&args.file)?;
            let view = match reconciler.plan(&args.key, &declared).await {
                Ok(plan) => PlanView::from_plan(&args.key, &plan, schema),
                Err(ReconcileError::NotManaged(_)) => {
                    PlanView::for_create(&args.key, &declared, schema)
                }
                Err(e) => return Err(e).context("plan failed"),
            };
            print_plan(&view, format);
        }
        Action::Refresh(args) => {
            let refreshed = reconciler.refresh(&args.key).await?;
            print_refreshed(&args.key, &refreshed, schema, format);
        }
        Action::Destroy(args) => {
            let report = reconciler.destroy(&args.key).await?;
            print_report(&args.key, &report, format);
        }
        Action::Import(args) => {
            let report = reconciler.import(&args.key, &args.id).await?;
            info!(key = %args.key, id = %args.id, "Imported");
            print_report(&args.key, &report, format);
        }
    }

    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct ReportRow {
    #[tabled(rename = "Key")]
    key: String,

    #[tabled(rename = "Outcome")]
    outcome: String,

    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "Organization")]
    organization: String,
}

#[derive(Debug, Serialize)]
struct ReportView<'a> {
    key: &'a StateKey,
    #[serde(flatten)]
    report: &'a Report,
}

fn print_report(key: &StateKey, report: &Report, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let (id, organization) = report
                .handle
                .as_ref()
                .map(|handle| (handle.id.to_string(), handle.organization.to_string()))
                .unwrap_or_default();
            print_output(
                &[ReportRow {
                    key: key.to_string(),
                    outcome: report.outcome.to_string(),
                    id,
                    organization,
                }],
                format,
            );
            print_diagnostics(&report.diagnostics);
        }
        OutputFormat::Json => print_json(&ReportView { key, report }),
    }
}

/// One row of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
struct ChangeRow {
    #[tabled(rename = "Attribute")]
    attribute: String,

    #[tabled(rename = "Old")]
    old: String,

    #[tabled(rename = "New")]
    new: String,

    #[tabled(rename = "Forces Replacement")]
    force_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PlanView {
    key: String,
    /// `no_change`, `create`, `update` or `replace`.
    action: &'static str,
    changes: Vec<ChangeRow>,
}

impl PlanView {
    fn from_plan(key: &StateKey, plan: &Plan, schema: &Schema) -> Self {
        let action = match plan {
            Plan::NoChange => "no_change",
            Plan::Update(_) => "update",
            Plan::Replace { .. } => "replace",
        };

        let changes = plan
            .changes()
            .map(|changes| {
                changes
                    .iter()
                    .map(|change| {
                        let sensitive = change.sensitive
                            || schema
                                .attribute(change.attribute)
                                .is_some_and(|spec| spec.sensitive);
                        let shown = |value: &str| {
                            if sensitive {
                                SENSITIVE.to_string()
                            } else {
                                value.to_string()
                            }
                        };
                        ChangeRow {
                            attribute: change.attribute.to_string(),
                            old: shown(&change.old),
                            new: shown(&change.new),
                            force_new: change.force_new,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            key: key.to_string(),
            action,
            changes,
        }
    }

    fn for_create(key: &StateKey, declared: &Attributes, schema: &Schema) -> Self {
        let changes = mask_sensitive(schema, declared)
            .iter()
            .map(|(name, value)| ChangeRow {
                attribute: name.to_string(),
                old: String::new(),
                new: value.to_string(),
                force_new: false,
            })
            .collect();

        Self {
            key: key.to_string(),
            action: "create",
            changes,
        }
    }
}

fn print_plan(view: &PlanView, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            match view.action {
                "no_change" => print_success(&format!("{} is up to date", view.key)),
                "create" => print_info(&format!("{} will be created", view.key)),
                "replace" => print_info(&format!("{} will be replaced", view.key)),
                _ => print_info(&format!("{} will be updated in place", view.key)),
            }
            if !view.changes.is_empty() {
                print_output(&view.changes, format);
            }
        }
        OutputFormat::Json => print_json(view),
    }
}

#[derive(Debug, Serialize)]
struct RefreshView<'a> {
    key: &'a StateKey,
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<StateRecord>,
}

fn print_refreshed(key: &StateKey, refreshed: &Refreshed, schema: &Schema, format: OutputFormat) {
    let record = refreshed.record().map(|record| StateRecord {
        attributes: mask_sensitive(schema, &record.attributes),
        ..record.clone()
    });

    match format {
        OutputFormat::Table => match (&record, refreshed) {
            (Some(record), Refreshed::Present { diagnostics, .. }) => {
                print_info(&format!("{key} is {}", record.handle));
                print_output(&attribute_rows(&record.attributes), format);
                print_diagnostics(diagnostics);
            }
            _ => print_info(&format!(
                "{key} no longer exists remotely; the state record was removed"
            )),
        },
        OutputFormat::Json => print_json(&RefreshView {
            key,
            outcome: refreshed.outcome().to_string(),
            record,
        }),
    }
}
