//! Reconciliation errors.
//!
//! Every variant is fatal for the current attempt. Absence of a remote
//! object is not an error: it is handled as a state transition (see
//! [`crate::classify::Classification::RecoverableEmpty`]). Non-fatal
//! conditions travel as warning [`crate::diag::Diagnostic`]s.

use thiserror::Error;
use warden_id::{RemoteId, StateKey};

use crate::classify::Call;
use crate::diag::Diagnostic;
use crate::reconciler::Outcome;
use crate::resource::ResourceType;
use crate::store::StoreError;

/// Result type for reconciler operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The natural key is claimed by an object owned by another organization.
    #[error(
        "{resource_type} '{key}' already exists but is managed by organization '{owner}', not '{declared}'"
    )]
    OwnershipConflict {
        resource_type: ResourceType,
        key: String,
        owner: String,
        declared: String,
    },

    /// The service refused the delete because the object is still referenced.
    #[error("delete of {resource_type} {id} blocked by a conflict: {detail}")]
    DeleteConflict {
        resource_type: ResourceType,
        id: RemoteId,
        detail: String,
    },

    /// An immutable attribute was changed without forcing replacement.
    #[error("attribute '{attribute}' of {resource_type} cannot be changed in place; replace the resource")]
    UnsupportedMutation {
        resource_type: ResourceType,
        attribute: String,
    },

    /// A remote call failed in a way the classifier treats as fatal.
    #[error("{operation} {resource_type} '{resource}' failed: {detail}")]
    Remote {
        operation: Call,
        resource_type: ResourceType,
        resource: String,
        detail: String,
    },

    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    #[error("no {resource_type} with id '{id}' exists")]
    ImportNotFound {
        resource_type: ResourceType,
        id: RemoteId,
    },

    #[error("state '{0}' is already managed")]
    AlreadyManaged(StateKey),

    #[error("no state recorded for '{0}'")]
    NotManaged(StateKey),

    #[error("state '{key}' holds a {found} record, expected {expected}")]
    TypeMismatch {
        key: StateKey,
        found: ResourceType,
        expected: ResourceType,
    },

    #[error("state '{key}' has schema version {found}, newer than supported version {supported}")]
    UnsupportedSchemaVersion {
        key: StateKey,
        found: u32,
        supported: u32,
    },

    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("reconciliation cancelled")]
    Cancelled,

    #[error("reconciliation task failed: {0}")]
    Task(String),
}

impl ReconcileError {
    /// Conflict errors are never resolved automatically.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::OwnershipConflict { .. } | Self::DeleteConflict { .. }
        )
    }

    /// Outcome tag for errors that correspond to a lifecycle outcome.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::DeleteConflict { .. } => Some(Outcome::DeleteConflict),
            _ => None,
        }
    }

    /// Render as an error-severity diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let summary = match self {
            Self::OwnershipConflict { .. } => "natural key owned by another organization",
            Self::DeleteConflict { .. } => "delete blocked by conflict",
            Self::UnsupportedMutation { .. } => "unsupported in-place change",
            Self::Remote { .. } => "remote call failed",
            Self::InvalidDeclaration(_) => "invalid declaration",
            Self::ImportNotFound { .. } => "import target not found",
            Self::AlreadyManaged(_) | Self::NotManaged(_) | Self::TypeMismatch { .. } => {
                "state mismatch"
            }
            Self::UnsupportedSchemaVersion { .. } => "unsupported state version",
            Self::Store(_) => "state store failure",
            Self::Cancelled => "cancelled",
            Self::Task(_) => "internal failure",
        };

        let diagnostic = Diagnostic::error(summary, self.to_string());
        match self {
            Self::UnsupportedMutation { attribute, .. } => diagnostic.for_attribute(attribute),
            _ => diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Severity;

    #[test]
    fn test_delete_conflict_maps_to_outcome() {
        let err = ReconcileError::DeleteConflict {
            resource_type: ResourceType::User,
            id: RemoteId::parse("u1").unwrap(),
            detail: "HTTP 409".to_string(),
        };
        assert!(err.is_conflict());
        assert_eq!(err.outcome(), Some(Outcome::DeleteConflict));
        assert_eq!(err.to_diagnostic().severity, Severity::Error);
    }

    #[test]
    fn test_remote_error_carries_context() {
        let err = ReconcileError::Remote {
            operation: Call::Read,
            resource_type: ResourceType::EmailTemplate,
            resource: "t-1".to_string(),
            detail: "transport error: timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "read iam_email_template 't-1' failed: transport error: timeout"
        );
        assert!(err.outcome().is_none());
    }
}
