//! Error classification.
//!
//! Maps the outcome of a remote call to what the reconciler should do with
//! it. Absence is a first-class branch here rather than a caught failure.
//! The classifier never retries.

use std::fmt;

use serde::Serialize;

use crate::api::ApiError;

/// The kind of remote call whose outcome is being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    Resolve,
    Create,
    Read,
    Update,
    Delete,
}

impl Call {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn treats_absence_as_empty(&self) -> bool {
        matches!(self, Self::Resolve | Self::Read | Self::Delete)
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a remote call came back with.
#[derive(Debug, Clone, Copy)]
pub enum RemoteOutcome<'a> {
    /// The call reached the service and completed with this HTTP status.
    Completed(u16),
    /// The call failed.
    Failed(&'a ApiError),
}

impl<'a, T> From<&'a Result<T, ApiError>> for RemoteOutcome<'a> {
    /// Successful results without an explicit status count as `200`.
    fn from(result: &'a Result<T, ApiError>) -> Self {
        match result {
            Ok(_) => Self::Completed(200),
            Err(err) => Self::Failed(err),
        }
    }
}

/// Classification of a remote outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// The object does not exist; handled as a state transition.
    RecoverableEmpty,
    /// Surface to the caller and continue.
    Warning(String),
    /// Abort the reconciliation attempt.
    Fatal(String),
}

impl Classification {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Classify the outcome of `call`.
pub fn classify(call: Call, outcome: RemoteOutcome<'_>) -> Classification {
    match outcome {
        RemoteOutcome::Completed(status) => classify_status(call, status),
        RemoteOutcome::Failed(err) => classify_error(call, err),
    }
}

fn classify_status(call: Call, status: u16) -> Classification {
    match (call, status) {
        (Call::Delete, 204) => Classification::Success,
        (Call::Delete, 404) => Classification::RecoverableEmpty,
        (Call::Delete, 409) => {
            Classification::Fatal("delete returned HTTP 409 Conflict".to_string())
        }
        (Call::Delete, other) => Classification::Warning(format!(
            "delete returned status '{other}', which is unexpected"
        )),
        (_, 200..=299) => Classification::Success,
        (call, 404) if call.treats_absence_as_empty() => Classification::RecoverableEmpty,
        (call, other) => Classification::Fatal(format!("{call} returned HTTP {other}")),
    }
}

fn classify_error(call: Call, err: &ApiError) -> Classification {
    if err.is_absence() && call.treats_absence_as_empty() {
        return Classification::RecoverableEmpty;
    }

    match (call, err.status()) {
        (Call::Delete, Some(409)) => {
            Classification::Fatal(format!("delete returned HTTP 409 Conflict: {err}"))
        }
        _ => Classification::Fatal(err.to_string()),
    }
}

/// Returns true if the outcome of a delete signals a blocking conflict.
pub fn is_delete_conflict(outcome: RemoteOutcome<'_>) -> bool {
    match outcome {
        RemoteOutcome::Completed(status) => status == 409,
        RemoteOutcome::Failed(err) => err.status() == Some(409),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn domain(status: u16) -> ApiError {
        ApiError::Domain {
            status,
            code: "invalid".to_string(),
            message: "rejected".to_string(),
        }
    }

    #[rstest]
    #[case(Call::Delete, 204, Classification::Success)]
    #[case(Call::Delete, 404, Classification::RecoverableEmpty)]
    #[case(Call::Read, 200, Classification::Success)]
    #[case(Call::Read, 404, Classification::RecoverableEmpty)]
    #[case(Call::Create, 201, Classification::Success)]
    fn test_completed_status(
        #[case] call: Call,
        #[case] status: u16,
        #[case] expected: Classification,
    ) {
        assert_eq!(classify(call, RemoteOutcome::Completed(status)), expected);
    }

    #[test]
    fn test_delete_conflict_is_fatal() {
        let classified = classify(Call::Delete, RemoteOutcome::Completed(409));
        assert!(classified.is_fatal());
        assert!(is_delete_conflict(RemoteOutcome::Completed(409)));

        let err = domain(409);
        assert!(classify(Call::Delete, RemoteOutcome::Failed(&err)).is_fatal());
        assert!(is_delete_conflict(RemoteOutcome::Failed(&err)));
    }

    #[test]
    fn test_delete_unexpected_status_is_warning() {
        assert!(matches!(
            classify(Call::Delete, RemoteOutcome::Completed(200)),
            Classification::Warning(_)
        ));
        assert!(matches!(
            classify(Call::Delete, RemoteOutcome::Completed(202)),
            Classification::Warning(_)
        ));
    }

    #[test]
    fn test_empty_results_recoverable_on_reads() {
        let err = ApiError::EmptyResults;
        assert_eq!(
            classify(Call::Read, RemoteOutcome::Failed(&err)),
            Classification::RecoverableEmpty
        );
        assert_eq!(
            classify(Call::Resolve, RemoteOutcome::Failed(&err)),
            Classification::RecoverableEmpty
        );
        assert!(classify(Call::Create, RemoteOutcome::Failed(&err)).is_fatal());
    }

    #[test]
    fn test_domain_errors_fatal_on_create_and_delete() {
        let err = domain(400);
        assert!(classify(Call::Create, RemoteOutcome::Failed(&err)).is_fatal());
        assert!(classify(Call::Delete, RemoteOutcome::Failed(&err)).is_fatal());
    }

    #[test]
    fn test_not_found_on_update_is_fatal() {
        let err = domain(404);
        assert!(classify(Call::Update, RemoteOutcome::Failed(&err)).is_fatal());
    }

    #[test]
    fn test_transport_failure_is_fatal() {
        let err = ApiError::Transport("connection reset".to_string());
        assert_eq!(
            classify(Call::Read, RemoteOutcome::Failed(&err)),
            Classification::Fatal("transport error: connection reset".to_string())
        );
    }
}
