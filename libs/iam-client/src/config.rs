//! Client configuration.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_API_VERSION: &str = "1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors building an [`crate::IamClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base URL '{0}'")]
    InvalidUrl(String),

    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Connection settings for the IAM service.
#[derive(Debug, Clone)]
pub struct IamConfig {
    /// Base URL, e.g. `https://iam.example.com`.
    pub base_url: String,

    /// Bearer token sent with every request.
    pub token: String,

    /// Value of the `Api-Version` header.
    pub api_version: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl IamConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL without a trailing slash.
    pub(crate) fn normalized_base_url(&self) -> Result<String, ClientError> {
        let url = self.base_url.trim().trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(self.base_url.clone()));
        }
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IamConfig::new("https://iam.example.com/", "token");
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(
            config.normalized_base_url().unwrap(),
            "https://iam.example.com"
        );
    }

    #[test]
    fn test_rejects_url_without_scheme() {
        let config = IamConfig::new("iam.example.com", "token");
        assert!(matches!(
            config.normalized_base_url(),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
