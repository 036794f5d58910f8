//! Concrete resource types.

mod email_template;
mod user;

pub use email_template::{EmailTemplateResource, EMAIL_TEMPLATE_SCHEMA};
pub use user::{UserResource, USER_SCHEMA};
