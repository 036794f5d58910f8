//! HTTP client for the IAM identity and legacy security endpoints.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_id::RemoteId;
use warden_reconcile::api::{
    ApiError, DeleteResponse, EmailTemplate, EmailTemplateApi, Person, Profile, UserApi,
};

use crate::config::{ClientError, IamConfig};

const USERS: &str = "/authorize/identity/User";
const TEMPLATES: &str = "/authorize/identity/EmailTemplate";
const LEGACY_USERS: &str = "/security/users";

/// IAM API client.
#[derive(Debug, Clone)]
pub struct IamClient {
    http: reqwest::Client,
    base_url: String,
}

/// Structured error body.
#[derive(Debug, Deserialize)]
struct OperationOutcome {
    #[serde(default)]
    issue: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    #[serde(default)]
    code: String,
    #[serde(default)]
    diagnostics: String,
}

/// Search result wrapper.
#[derive(Debug, Deserialize)]
struct Bundle<T> {
    #[serde(default)]
    total: u32,
    #[serde(default = "Vec::new")]
    entry: Vec<BundleEntry<T>>,
}

#[derive(Debug, Deserialize)]
struct BundleEntry<T> {
    resource: T,
}

/// Legacy profile responses are wrapped in an `exchange` object.
#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    exchange: Profile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangeLoginId<'a> {
    login_id: &'a str,
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Turn a non-success response into an [`ApiError`].
async fn error_from(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let issue = serde_json::from_str::<OperationOutcome>(&body)
        .ok()
        .and_then(|outcome| outcome.issue.into_iter().next());

    match issue {
        Some(issue) => ApiError::Domain {
            status,
            code: issue.code,
            message: issue.diagnostics,
        },
        None => ApiError::Status { status, body },
    }
}

/// Id of a created object from its `Location` header.
fn id_from_location(location: &str) -> Option<&str> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

impl IamClient {
    pub fn new(config: &IamConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.token))
                .map_err(|_| ClientError::InvalidHeader("Authorization"))?,
        );
        headers.insert(
            "Api-Version",
            HeaderValue::from_str(&config.api_version)
                .map_err(|_| ClientError::InvalidHeader("Api-Version"))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.normalized_base_url()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, mapping non-success statuses to errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(transport)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from(response).await)
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        let response = self.send(self.http.get(self.url(path))).await?;
        let body = response.text().await.map_err(transport)?;
        decode(&body)
    }

    async fn delete(&self, path: &str) -> Result<DeleteResponse, ApiError> {
        debug!(path, "DELETE");
        let response = self.send(self.http.delete(self.url(path))).await?;
        Ok(DeleteResponse {
            status: response.status().as_u16(),
        })
    }
}

#[async_trait]
impl UserApi for IamClient {
    async fn create_user(&self, person: &Person) -> Result<Person, ApiError> {
        debug!(login = %person.login_id, "Creating user");
        let response = self
            .send(self.http.post(self.url(USERS)).json(person))
            .await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(transport)?;

        if !body.trim().is_empty() {
            return decode(&body);
        }

        // Some deployments answer 201 with only a Location header.
        let id = location
            .as_deref()
            .and_then(id_from_location)
            .ok_or_else(|| {
                ApiError::Decode("create response carries neither a body nor a Location".into())
            })?;

        Ok(Person {
            id: id.to_string(),
            password: None,
            ..person.clone()
        })
    }

    async fn get_user_by_id(&self, id: &RemoteId) -> Result<Person, ApiError> {
        self.get(&format!("{USERS}/{id}")).await
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Person, ApiError> {
        debug!(login, "Looking up user by login");
        let response = self
            .send(self.http.get(self.url(USERS)).query(&[("loginId", login)]))
            .await?;
        let body = response.text().await.map_err(transport)?;
        let bundle: Bundle<Person> = decode(&body)?;

        if bundle.total == 0 {
            return Err(ApiError::EmptyResults);
        }
        bundle
            .entry
            .into_iter()
            .next()
            .map(|entry| entry.resource)
            .ok_or(ApiError::EmptyResults)
    }

    async fn change_login_id(&self, id: &RemoteId, login: &str) -> Result<(), ApiError> {
        debug!(id = %id, "Changing login id");
        let url = self.url(&format!("{USERS}/{id}/$change-loginid"));
        self.send(self.http.post(url).json(&ChangeLoginId { login_id: login }))
            .await?;
        Ok(())
    }

    async fn get_profile(&self, id: &RemoteId) -> Result<Profile, ApiError> {
        let envelope: ProfileEnvelope = self.get(&format!("{LEGACY_USERS}/{id}")).await?;
        Ok(envelope.exchange)
    }

    async fn update_profile(&self, profile: &Profile) -> Result<(), ApiError> {
        debug!(id = %profile.id, "Updating profile");
        let url = self.url(&format!("{LEGACY_USERS}/{}", profile.id));
        self.send(self.http.put(url).json(profile)).await?;
        Ok(())
    }

    async fn delete_user(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError> {
        self.delete(&format!("{USERS}/{id}")).await
    }
}

#[async_trait]
impl EmailTemplateApi for IamClient {
    async fn create_template(&self, template: &EmailTemplate) -> Result<EmailTemplate, ApiError> {
        debug!(template_type = %template.template_type, "Creating email template");
        let response = self
            .send(self.http.post(self.url(TEMPLATES)).json(template))
            .await?;
        let body = response.text().await.map_err(transport)?;
        decode(&body)
    }

    async fn get_template_by_id(&self, id: &RemoteId) -> Result<EmailTemplate, ApiError> {
        self.get(&format!("{TEMPLATES}/{id}")).await
    }

    async fn delete_template(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError> {
        self.delete(&format!("{TEMPLATES}/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_location() {
        assert_eq!(
            id_from_location("https://iam.example.com/authorize/identity/User/u-1"),
            Some("u-1")
        );
        assert_eq!(id_from_location("/authorize/identity/User/u-2/"), Some("u-2"));
        assert_eq!(id_from_location(""), None);
    }

    #[test]
    fn test_url_building() {
        let client = IamClient::new(&IamConfig::new("https://iam.example.com/", "t")).unwrap();
        assert_eq!(
            client.url("/authorize/identity/User"),
            "https://iam.example.com/authorize/identity/User"
        );
    }

    #[test]
    fn test_rejects_token_with_newline() {
        let config = IamConfig::new("https://iam.example.com", "bad\ntoken");
        let err = IamClient::new(&config).unwrap_err();
        assert!(matches!(err, ClientError::InvalidHeader("Authorization")));
    }
}
