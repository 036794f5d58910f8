//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;
use warden_reconcile::ReconcileError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Not authenticated. Set WARDEN_TOKEN or run `wardenctl auth login`.")]
    NotAuthenticated,
}

fn hint(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::NotAuthenticated => {
                Some("Hint: export WARDEN_TOKEN or store a token with `wardenctl auth login`.")
            }
        };
    }

    match err.downcast_ref::<ReconcileError>()? {
        ReconcileError::OwnershipConflict { .. } => Some(
            "Hint: the natural key is taken in another organization. Choose another login or fix organization_id.",
        ),
        ReconcileError::DeleteConflict { .. } => Some(
            "Hint: remove whatever still references the object and run destroy again. The state record was kept.",
        ),
        ReconcileError::UnsupportedMutation { .. } => {
            Some("Hint: `apply` replaces the resource when an immutable attribute changes.")
        }
        ReconcileError::NotManaged(_) => Some("Hint: run `create` or `import` for this key first."),
        ReconcileError::AlreadyManaged(_) => {
            Some("Hint: pick another --key, or destroy the existing record first.")
        }
        ReconcileError::UnsupportedSchemaVersion { .. } => {
            Some("Hint: this state was written by a newer wardenctl; upgrade to read it.")
        }
        ReconcileError::Remote { .. } => {
            Some("Hint: check the API endpoint, the token, and that the service is reachable.")
        }
        _ => None,
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", hint.yellow());
    }
}

#[cfg(test)]
mod tests {
    use warden_id::StateKey;

    use super::*;

    #[test]
    fn test_hints_follow_error_kind() {
        let key = StateKey::parse("users.foo").unwrap();

        let not_managed = anyhow::Error::new(ReconcileError::NotManaged(key));
        assert!(hint(&not_managed).unwrap().contains("import"));

        let auth = anyhow::Error::new(CliError::NotAuthenticated);
        assert!(hint(&auth).unwrap().contains("WARDEN_TOKEN"));

        assert!(hint(&anyhow::anyhow!("plain failure")).is_none());
        assert!(hint(&anyhow::Error::new(ReconcileError::Cancelled)).is_none());
    }

    #[test]
    fn test_hint_survives_context() {
        let err = anyhow::Error::new(ReconcileError::NotManaged(
            StateKey::parse("users.foo").unwrap(),
        ))
        .context("plan failed");

        assert!(hint(&err).is_some());
    }
}
