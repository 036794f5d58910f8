//! State record inspection.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use warden_id::StateKey;
use warden_reconcile::resources::{EMAIL_TEMPLATE_SCHEMA, USER_SCHEMA};
use warden_reconcile::{ReconcileError, ResourceType, StateRecord, StateStore};

use crate::output::{
    attribute_rows, mask_sensitive, print_info, print_json, print_output, OutputFormat,
};

use super::CommandContext;

/// State record commands.
#[derive(Debug, Args)]
pub struct StateCommand {
    #[command(subcommand)]
    command: StateSubcommand,
}

#[derive(Debug, Subcommand)]
enum StateSubcommand {
    /// List managed records.
    List,

    /// Show one record.
    Show(ShowArgs),
}

#[derive(Debug, Args)]
struct ShowArgs {
    /// State key of the record.
    #[arg(long)]
    key: StateKey,
}

impl StateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let store = ctx.store()?;
        match self.command {
            StateSubcommand::List => list(&store, ctx.format).await,
            StateSubcommand::Show(args) => show(&store, &args.key, ctx.format).await,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct RecordRow {
    #[tabled(rename = "Key")]
    key: String,

    #[tabled(rename = "Type")]
    resource_type: String,

    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "Organization")]
    organization: String,

    #[tabled(rename = "Schema")]
    schema_version: u32,

    #[tabled(rename = "Updated")]
    updated_at: String,
}

async fn rows<S: StateStore>(store: &S) -> Result<Vec<RecordRow>> {
    let mut rows = Vec::new();
    for key in store.keys().await.context("failed to list state")? {
        // Skip records removed since listing.
        let Some(record) = store.get(&key).await? else {
            continue;
        };
        rows.push(RecordRow {
            key: key.to_string(),
            resource_type: record.resource_type.to_string(),
            id: record.handle.id.to_string(),
            organization: record.handle.organization.to_string(),
            schema_version: record.schema_version,
            updated_at: record.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        });
    }
    Ok(rows)
}

async fn list<S: StateStore>(store: &S, format: OutputFormat) -> Result<()> {
    print_output(&rows(store).await?, format);
    Ok(())
}

fn masked(record: StateRecord) -> StateRecord {
    let schema = match record.resource_type {
        ResourceType::User => &USER_SCHEMA,
        ResourceType::EmailTemplate => &EMAIL_TEMPLATE_SCHEMA,
    };
    StateRecord {
        attributes: mask_sensitive(schema, &record.attributes),
        ..record
    }
}

async fn show<S: StateStore>(store: &S, key: &StateKey, format: OutputFormat) -> Result<()> {
    let record = store
        .get(key)
        .await?
        .ok_or_else(|| ReconcileError::NotManaged(key.clone()))?;
    let record = masked(record);

    match format {
        OutputFormat::Table => {
            print_info(&format!(
                "{key}: {} {} (schema v{})",
                record.resource_type, record.handle, record.schema_version
            ));
            print_output(&attribute_rows(&record.attributes), format);
        }
        OutputFormat::Json => print_json(&record),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use warden_id::{OrgId, RemoteId};
    use warden_reconcile::{Attributes, MemoryStore, ResourceHandle};

    use super::*;

    fn record(resource_type: ResourceType, id: &str) -> StateRecord {
        StateRecord::new(
            resource_type,
            ResourceHandle {
                id: RemoteId::parse(id).unwrap(),
                organization: OrgId::parse("org-1").unwrap(),
            },
            Attributes::new()
                .with("login", "foo@x.com")
                .with("password", "s3cret"),
            2,
        )
    }

    #[tokio::test]
    async fn test_rows_describe_each_record() {
        let store = MemoryStore::new();
        let users = StateKey::parse("users.foo").unwrap();
        let templates = StateKey::parse("templates.welcome").unwrap();
        store.put(&users, &record(ResourceType::User, "u-1")).await.unwrap();
        store
            .put(&templates, &record(ResourceType::EmailTemplate, "t-1"))
            .await
            .unwrap();

        let rows = rows(&store).await.unwrap();

        assert_eq!(rows.len(), 2);
        let user = rows.iter().find(|row| row.key == "users.foo").unwrap();
        assert_eq!(user.resource_type, "iam_user");
        assert_eq!(user.id, "u-1");
        assert_eq!(user.organization, "org-1");
    }

    #[test]
    fn test_show_masks_password() {
        let shown = masked(record(ResourceType::User, "u-1"));
        assert_eq!(shown.attributes.get("password"), crate::output::SENSITIVE);
        assert_eq!(shown.attributes.get("login"), "foo@x.com");
    }

    #[tokio::test]
    async fn test_show_missing_record_is_not_managed() {
        let store = MemoryStore::new();
        let key = StateKey::parse("users.none").unwrap();

        let err = show(&store, &key, OutputFormat::Json).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReconcileError>(),
            Some(ReconcileError::NotManaged(_))
        ));
    }
}
