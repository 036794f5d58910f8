//! The capability interface every managed resource type implements.
//!
//! The reconciler state machine is generic over [`Resource`]; each resource
//! type supplies its schema, natural key, and the remote calls.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_id::{OrgId, RemoteId};

use crate::api::{ApiError, DeleteResponse};
use crate::attributes::{Attributes, ChangeSet, Schema};
use crate::diag::Diagnostics;

/// Tag identifying the resource type of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    #[serde(rename = "iam_user")]
    User,
    #[serde(rename = "iam_email_template")]
    EmailTemplate,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "iam_user",
            Self::EmailTemplate => "iam_email_template",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iam_user" | "user" => Ok(Self::User),
            "iam_email_template" | "template" => Ok(Self::EmailTemplate),
            other => Err(format!("unknown resource type '{other}'")),
        }
    }
}

/// Binds a local record to one remote object.
///
/// Assigned once on create or adoption and never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub id: RemoteId,
    pub organization: OrgId,
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (organization {})", self.id, self.organization)
    }
}

/// A remote object as reported by create or a natural-key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub id: RemoteId,
    /// Managing organization as reported by the service.
    pub organization: String,
    /// Computed attributes only available from this response.
    pub computed: Attributes,
}

/// Failure of one sub-operation of an in-place update.
#[derive(Debug, Clone, Error)]
#[error("{operation}: {source}")]
pub struct UpdateError {
    pub operation: &'static str,
    #[source]
    pub source: ApiError,
}

impl UpdateError {
    pub fn new(operation: &'static str, source: ApiError) -> Self {
        Self { operation, source }
    }
}

/// Remote capability of one resource type.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    fn resource_type(&self) -> ResourceType;

    fn schema(&self) -> &'static Schema;

    /// Attribute holding the managing organization.
    fn organization_attribute(&self) -> &'static str;

    /// Caller-assignable unique key, if the type has one.
    fn natural_key(&self, _declared: &Attributes) -> Option<String> {
        None
    }

    /// Look up an existing object by natural key.
    async fn find_by_natural_key(&self, _key: &str) -> Result<RemoteObject, ApiError> {
        Err(ApiError::EmptyResults)
    }

    async fn create(&self, declared: &Attributes) -> Result<RemoteObject, ApiError>;

    /// Fetch the readable attributes. Write-only attributes are never present.
    async fn read(&self, id: &RemoteId) -> Result<Attributes, ApiError>;

    /// Issue exactly the calls needed for `changes`. Returns non-fatal
    /// diagnostics for changes that are accepted but not propagated.
    async fn update(
        &self,
        id: &RemoteId,
        changes: &ChangeSet,
        declared: &Attributes,
    ) -> Result<Diagnostics, UpdateError>;

    async fn delete(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError>;
}
