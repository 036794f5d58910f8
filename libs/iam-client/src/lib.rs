//! HTTP client for the IAM identity service.
//!
//! [`IamClient`] implements the reconciler's [`UserApi`] and
//! [`EmailTemplateApi`] traits over `reqwest`. Every request carries the
//! bearer token and API version header from [`IamConfig`].
//!
//! [`UserApi`]: warden_reconcile::api::UserApi
//! [`EmailTemplateApi`]: warden_reconcile::api::EmailTemplateApi

mod client;
mod config;

pub use client::IamClient;
pub use config::{ClientError, IamConfig, DEFAULT_API_VERSION, DEFAULT_TIMEOUT};
