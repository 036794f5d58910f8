//! IAM email templates.
//!
//! Templates are immutable: every declared attribute forces replacement. The
//! message body is sent base64 encoded and never returned by a read.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use warden_id::RemoteId;

use crate::api::{ApiError, DeleteResponse, EmailTemplate, EmailTemplateApi};
use crate::attributes::{AttributeSpec, Attributes, ChangeSet, Schema};
use crate::diag::Diagnostics;
use crate::resource::{RemoteObject, Resource, ResourceType, UpdateError};
use crate::suppress::Suppression;

const SERVICE_DEFAULT: &[Suppression] = &[Suppression::EmptyMeansDefault("default")];

pub static EMAIL_TEMPLATE_SCHEMA: Schema = Schema {
    version: 1,
    attributes: &[
        AttributeSpec::required("managing_organization").force_new(),
        AttributeSpec::required("type").force_new(),
        AttributeSpec::optional("from").force_new().suppress(SERVICE_DEFAULT),
        AttributeSpec::optional("format").force_new().default_value("HTML"),
        AttributeSpec::optional("subject").force_new().default_value("default"),
        AttributeSpec::required("message")
            .force_new()
            .suppress(&[Suppression::WriteOnly]),
        AttributeSpec::optional("locale").force_new().suppress(SERVICE_DEFAULT),
        AttributeSpec::optional("link").force_new().suppress(SERVICE_DEFAULT),
        AttributeSpec::computed("message_base64"),
    ],
};

/// Email template resource over any [`EmailTemplateApi`] client.
#[derive(Debug, Clone)]
pub struct EmailTemplateResource<A> {
    api: A,
}

impl<A: EmailTemplateApi> EmailTemplateResource<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }
}

fn template_from(declared: &Attributes) -> EmailTemplate {
    EmailTemplate {
        id: String::new(),
        template_type: declared.get("type").to_string(),
        format: declared.get("format").to_string(),
        subject: declared.get("subject").to_string(),
        message: STANDARD.encode(declared.get("message")),
        link: declared.get("link").to_string(),
        locale: declared.get("locale").to_string(),
        from: declared.get("from").to_string(),
        managing_organization: declared.get("managing_organization").to_string(),
    }
}

fn attributes_from(template: &EmailTemplate) -> Attributes {
    Attributes::new()
        .with("managing_organization", &template.managing_organization)
        .with("type", &template.template_type)
        .with("from", &template.from)
        .with("format", &template.format)
        .with("subject", &template.subject)
        .with("locale", &template.locale)
        .with("link", &template.link)
}

#[async_trait]
impl<A: EmailTemplateApi + 'static> Resource for EmailTemplateResource<A> {
    fn resource_type(&self) -> ResourceType {
        ResourceType::EmailTemplate
    }

    fn schema(&self) -> &'static Schema {
        &EMAIL_TEMPLATE_SCHEMA
    }

    fn organization_attribute(&self) -> &'static str {
        "managing_organization"
    }

    async fn create(&self, declared: &Attributes) -> Result<RemoteObject, ApiError> {
        let created = self.api.create_template(&template_from(declared)).await?;
        let id = RemoteId::parse(&created.id).map_err(|e| ApiError::Decode(e.to_string()))?;

        Ok(RemoteObject {
            id,
            organization: created.managing_organization,
            computed: Attributes::new().with("message_base64", created.message),
        })
    }

    async fn read(&self, id: &RemoteId) -> Result<Attributes, ApiError> {
        let template = self.api.get_template_by_id(id).await?;
        Ok(attributes_from(&template))
    }

    async fn update(
        &self,
        _id: &RemoteId,
        changes: &ChangeSet,
        _declared: &Attributes,
    ) -> Result<Diagnostics, UpdateError> {
        // Every attribute forces replacement; the service has no update call.
        if changes.is_empty() {
            return Ok(Diagnostics::new());
        }
        Err(UpdateError::new(
            "update email template",
            ApiError::Unsupported(format!(
                "in-place change of {}",
                changes.attributes().join(", ")
            )),
        ))
    }

    async fn delete(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError> {
        self.api.delete_template(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;

    fn declared() -> Attributes {
        Attributes::new()
            .with("managing_organization", "org-1")
            .with("type", "ACCOUNT_VERIFICATION")
            .with("message", "Hello {{name}}")
    }

    #[test]
    fn test_schema_version_matches_migrator() {
        assert_eq!(
            EMAIL_TEMPLATE_SCHEMA.version,
            migrate::current_version(ResourceType::EmailTemplate)
        );
    }

    #[test]
    fn test_every_declared_attribute_forces_new() {
        assert!(EMAIL_TEMPLATE_SCHEMA
            .attributes
            .iter()
            .filter(|spec| !spec.computed)
            .all(|spec| spec.force_new));
    }

    /// Client for tests that must not reach the service.
    struct NoCalls;

    #[async_trait]
    impl EmailTemplateApi for NoCalls {
        async fn create_template(&self, _: &EmailTemplate) -> Result<EmailTemplate, ApiError> {
            Err(ApiError::Transport("unexpected call".into()))
        }

        async fn get_template_by_id(&self, _: &RemoteId) -> Result<EmailTemplate, ApiError> {
            Err(ApiError::Transport("unexpected call".into()))
        }

        async fn delete_template(&self, _: &RemoteId) -> Result<DeleteResponse, ApiError> {
            Err(ApiError::Transport("unexpected call".into()))
        }
    }

    #[tokio::test]
    async fn test_in_place_update_is_rejected() {
        let resource = EmailTemplateResource::new(NoCalls);
        let id = RemoteId::parse("t-1").unwrap();
        let prior = declared();
        let changed = declared().with("subject", "Verify");
        let changes = EMAIL_TEMPLATE_SCHEMA.diff(&prior, &changed);
        assert!(!changes.is_empty());

        let err = resource.update(&id, &changes, &changed).await.unwrap_err();
        assert!(matches!(
            err.source,
            ApiError::Unsupported(ref what) if what.contains("subject")
        ));

        let nothing = EMAIL_TEMPLATE_SCHEMA.diff(&prior, &prior);
        let diagnostics = resource.update(&id, &nothing, &prior).await.unwrap();
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_message_sent_base64_encoded() {
        let (normalized, _) = EMAIL_TEMPLATE_SCHEMA.validate(&declared()).unwrap();
        let template = template_from(&normalized);
        assert_eq!(template.message, "SGVsbG8ge3tuYW1lfX0=");
        assert_eq!(template.format, "HTML");
        assert_eq!(template.subject, "default");
        assert_eq!(template.locale, "");
    }

    #[test]
    fn test_default_locale_round_trip_is_no_change() {
        let (normalized, _) = EMAIL_TEMPLATE_SCHEMA.validate(&declared()).unwrap();
        let remote = EmailTemplate {
            id: "t-1".to_string(),
            template_type: "ACCOUNT_VERIFICATION".to_string(),
            format: "HTML".to_string(),
            subject: "default".to_string(),
            locale: "default".to_string(),
            link: "default".to_string(),
            from: "default".to_string(),
            managing_organization: "org-1".to_string(),
            ..Default::default()
        };

        let mut observed = attributes_from(&remote);
        observed.set("message", normalized.get("message"));
        assert!(EMAIL_TEMPLATE_SCHEMA.plan(&observed, &normalized).is_no_change());
    }
}
