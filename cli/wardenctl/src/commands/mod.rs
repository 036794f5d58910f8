//! CLI commands.

mod auth;
mod resource;
mod state;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, warn};
use warden_iam::{IamClient, IamConfig};
use warden_reconcile::FileStore;

use crate::config::{Config, Credentials};
use crate::error::CliError;
use crate::output::OutputFormat;

/// wardenctl - reconcile IAM users and email templates against the identity service.
#[derive(Debug, Parser)]
#[command(name = "wardenctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage IAM users.
    User(resource::ResourceCommand),

    /// Manage email templates.
    Template(resource::ResourceCommand),

    /// Inspect local state records.
    State(state::StateCommand),

    /// Store or remove the API token.
    Auth(auth::AuthCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::load()?;
        crate::init_tracing(config.log_format);
        debug!(api_url = %config.api_url, "Configuration loaded");

        let credentials = Credentials::load()?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                let _ = cancel_tx.send(true);
            }
        });

        let ctx = CommandContext {
            config,
            credentials,
            format: self.format,
            cancel: cancel_rx,
        };

        match self.command {
            Commands::User(cmd) => cmd.run_user(ctx).await,
            Commands::Template(cmd) => cmd.run_template(ctx).await,
            Commands::State(cmd) => cmd.run(ctx).await,
            Commands::Auth(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("wardenctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub credentials: Option<Credentials>,
    pub format: OutputFormat,
    /// Flips to `true` on Ctrl+C.
    pub cancel: watch::Receiver<bool>,
}

impl CommandContext {
    /// Authenticated IAM client.
    pub fn client(&self) -> Result<IamClient> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(CliError::NotAuthenticated)?;

        let mut iam = IamConfig::new(&self.config.api_url, &credentials.token);
        if let Some(version) = &self.config.api_version {
            iam = iam.with_api_version(version);
        }
        if let Some(secs) = self.config.timeout_secs {
            iam = iam.with_timeout(Duration::from_secs(secs));
        }

        IamClient::new(&iam).context("failed to build IAM client")
    }

    pub fn store(&self) -> Result<FileStore> {
        Ok(FileStore::new(self.config.state_dir()?))
    }
}
