//! Remote IAM client interface.
//!
//! The reconciler treats the client as an opaque, already-authenticated
//! capability. Connection pooling, TLS, and retries belong to the
//! implementation (see the `warden-iam` crate).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_id::RemoteId;

/// Raw failure of a remote call, before classification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The service answered a lookup with an empty result set.
    #[error("empty results")]
    EmptyResults,

    /// Structured error returned by the service.
    #[error("HTTP {status} {code}: {message}")]
    Domain {
        status: u16,
        code: String,
        message: String,
    },

    /// Non-success status without a structured body.
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// Network-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The service offers no call for the requested change.
    #[error("not supported: {0}")]
    Unsupported(String),
}

impl ApiError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Domain { status, .. } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the error signals that the object does not exist.
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::EmptyResults) || self.status() == Some(404)
    }
}

/// Response to a delete call that reached the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResponse {
    pub status: u16,
}

impl DeleteResponse {
    pub const NO_CONTENT: Self = Self { status: 204 };
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub given: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelecomEntry {
    pub system: String,
    pub value: String,
}

/// A user as returned by the identity endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default = "person_resource_type")]
    pub resource_type: String,
    #[serde(default)]
    pub login_id: String,
    #[serde(default)]
    pub name: PersonName,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email_address: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub telecom: Vec<TelecomEntry>,
    #[serde(default)]
    pub managing_organization: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preferred_language: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preferred_communication_channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_age_validated: Option<String>,
}

fn person_resource_type() -> String {
    "Person".to_string()
}

impl Person {
    fn telecom(&self, system: &str) -> Option<&str> {
        self.telecom
            .iter()
            .find(|entry| entry.system == system)
            .map(|entry| entry.value.as_str())
    }

    /// Email address, from the flat field or the telecom list.
    pub fn email(&self) -> &str {
        if self.email_address.is_empty() {
            self.telecom("email").unwrap_or("")
        } else {
            &self.email_address
        }
    }

    pub fn mobile(&self) -> &str {
        self.telecom("mobile").unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub email_address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mobile_phone: String,
}

/// Editable user profile (legacy profile endpoint).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub middle_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub preferred_language: String,
    #[serde(default)]
    pub preferred_communication_channel: String,
    #[serde(default)]
    pub contact: Contact,
}

/// User operations of the IAM service.
#[async_trait]
pub trait UserApi: Send + Sync {
    async fn create_user(&self, person: &Person) -> Result<Person, ApiError>;

    async fn get_user_by_id(&self, id: &RemoteId) -> Result<Person, ApiError>;

    /// Look a user up by login id. `ApiError::EmptyResults` when none exists.
    async fn get_user_by_login(&self, login: &str) -> Result<Person, ApiError>;

    async fn change_login_id(&self, id: &RemoteId, login: &str) -> Result<(), ApiError>;

    async fn get_profile(&self, id: &RemoteId) -> Result<Profile, ApiError>;

    async fn update_profile(&self, profile: &Profile) -> Result<(), ApiError>;

    async fn delete_user(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError>;
}

// =============================================================================
// Email templates
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub template_type: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub subject: String,
    /// Base64 encoded body. Only present on create.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub locale: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
    #[serde(default)]
    pub managing_organization: String,
}

/// Email template operations of the IAM service.
#[async_trait]
pub trait EmailTemplateApi: Send + Sync {
    async fn create_template(&self, template: &EmailTemplate) -> Result<EmailTemplate, ApiError>;

    async fn get_template_by_id(&self, id: &RemoteId) -> Result<EmailTemplate, ApiError>;

    async fn delete_template(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError>;
}

#[async_trait]
impl<T: UserApi + ?Sized> UserApi for std::sync::Arc<T> {
    async fn create_user(&self, person: &Person) -> Result<Person, ApiError> {
        (**self).create_user(person).await
    }

    async fn get_user_by_id(&self, id: &RemoteId) -> Result<Person, ApiError> {
        (**self).get_user_by_id(id).await
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Person, ApiError> {
        (**self).get_user_by_login(login).await
    }

    async fn change_login_id(&self, id: &RemoteId, login: &str) -> Result<(), ApiError> {
        (**self).change_login_id(id, login).await
    }

    async fn get_profile(&self, id: &RemoteId) -> Result<Profile, ApiError> {
        (**self).get_profile(id).await
    }

    async fn update_profile(&self, profile: &Profile) -> Result<(), ApiError> {
        (**self).update_profile(profile).await
    }

    async fn delete_user(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError> {
        (**self).delete_user(id).await
    }
}

#[async_trait]
impl<T: EmailTemplateApi + ?Sized> EmailTemplateApi for std::sync::Arc<T> {
    async fn create_template(&self, template: &EmailTemplate) -> Result<EmailTemplate, ApiError> {
        (**self).create_template(template).await
    }

    async fn get_template_by_id(&self, id: &RemoteId) -> Result<EmailTemplate, ApiError> {
        (**self).get_template_by_id(id).await
    }

    async fn delete_template(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError> {
        (**self).delete_template(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_email_from_telecom() {
        let person: Person = serde_json::from_value(serde_json::json!({
            "id": "u1",
            "loginId": "foo",
            "telecom": [
                {"system": "email", "value": "foo@x.com"},
                {"system": "mobile", "value": "+31600000000"}
            ],
            "managingOrganization": "org-1"
        }))
        .unwrap();

        assert_eq!(person.resource_type, "Person");
        assert_eq!(person.email(), "foo@x.com");
        assert_eq!(person.mobile(), "+31600000000");
    }

    #[test]
    fn test_template_type_field_name() {
        let template = EmailTemplate {
            template_type: "ACCOUNT_VERIFICATION".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&template).unwrap();
        assert_eq!(json["type"], "ACCOUNT_VERIFICATION");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_absence_detection() {
        assert!(ApiError::EmptyResults.is_absence());
        assert!(ApiError::Status {
            status: 404,
            body: String::new()
        }
        .is_absence());
        assert!(!ApiError::Transport("reset".into()).is_absence());
    }
}
