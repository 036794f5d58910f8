//! Token storage.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::Credentials;
use crate::output::{print_info, print_success};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Debug, Subcommand)]
enum AuthSubcommand {
    /// Store a bearer token in the credentials file.
    Login(LoginArgs),

    /// Remove the stored token.
    Logout,

    /// Show whether a token is available.
    Status,
}

#[derive(Debug, Args)]
struct LoginArgs {
    /// Bearer token for the IAM service.
    #[arg(long, env = "WARDEN_TOKEN", hide_env_values = true)]
    token: String,
}

impl AuthCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            AuthSubcommand::Login(args) => {
                let path = Credentials::new(args.token).save()?;
                print_success(&format!("Token stored in {}", path.display()));
            }
            AuthSubcommand::Logout => {
                if Credentials::delete()? {
                    print_success("Stored token removed");
                } else {
                    print_info("No stored token");
                }
            }
            AuthSubcommand::Status => match &ctx.credentials {
                Some(_) => print_info(&format!("Authenticated against {}", ctx.config.api_url)),
                None => print_info("Not authenticated"),
            },
        }
        Ok(())
    }
}
