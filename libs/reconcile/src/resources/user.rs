//! IAM users.
//!
//! Keyed by login. Profile fields are edited through the legacy profile
//! endpoint; the login has its own rename call. Passwords can only be set at
//! creation.

use async_trait::async_trait;
use warden_id::RemoteId;

use crate::api::{ApiError, DeleteResponse, Person, PersonName, Profile, TelecomEntry, UserApi};
use crate::attributes::{AttributeSpec, Attributes, ChangeSet, Schema};
use crate::diag::{Diagnostic, Diagnostics};
use crate::resource::{RemoteObject, Resource, ResourceType, UpdateError};
use crate::suppress::Suppression;

const DEFAULT_LANGUAGE: &str = "en-US";
const DEFAULT_CHANNEL: &str = "email";

/// Attributes carried by the legacy profile.
const PROFILE_ATTRIBUTES: &[&str] = &[
    "first_name",
    "last_name",
    "email",
    "mobile",
    "preferred_language",
    "preferred_communication_channel",
];

pub static USER_SCHEMA: Schema = Schema {
    version: 2,
    attributes: &[
        AttributeSpec::optional("username").deprecated("use login field instead"),
        AttributeSpec::required("login").suppress(&[Suppression::CaseInsensitive]),
        AttributeSpec::required("email").suppress(&[Suppression::CaseInsensitive]),
        AttributeSpec::optional("password")
            .sensitive()
            .suppress(&[Suppression::WriteOnly]),
        AttributeSpec::required("first_name"),
        AttributeSpec::required("last_name"),
        AttributeSpec::optional("mobile"),
        AttributeSpec::required("organization_id").force_new(),
        AttributeSpec::optional("preferred_language")
            .suppress(&[Suppression::EmptyMeansDefault(DEFAULT_LANGUAGE)]),
        AttributeSpec::optional("preferred_communication_channel")
            .suppress(&[Suppression::EmptyMeansDefault(DEFAULT_CHANNEL)]),
    ],
};

/// User resource over any [`UserApi`] client.
#[derive(Debug, Clone)]
pub struct UserResource<A> {
    api: A,
}

impl<A: UserApi> UserResource<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}

fn remote_object(person: Person) -> Result<RemoteObject, ApiError> {
    let id = RemoteId::parse(&person.id).map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(RemoteObject {
        id,
        organization: person.managing_organization,
        computed: Attributes::new(),
    })
}

fn person_from(declared: &Attributes) -> Person {
    let mut telecom = vec![TelecomEntry {
        system: "email".to_string(),
        value: declared.get("email").to_string(),
    }];
    let mobile = declared.get("mobile");
    if !mobile.is_empty() {
        telecom.push(TelecomEntry {
            system: "mobile".to_string(),
            value: mobile.to_string(),
        });
    }

    let password = declared.get("password");

    Person {
        id: String::new(),
        resource_type: "Person".to_string(),
        login_id: login_of(declared).unwrap_or_default(),
        name: PersonName {
            family: declared.get("last_name").to_string(),
            given: declared.get("first_name").to_string(),
        },
        email_address: String::new(),
        telecom,
        managing_organization: declared.get("organization_id").to_string(),
        preferred_language: declared.get("preferred_language").to_string(),
        preferred_communication_channel: declared
            .get("preferred_communication_channel")
            .to_string(),
        password: (!password.is_empty()).then(|| password.to_string()),
        is_age_validated: Some("true".to_string()),
    }
}

fn attributes_from(person: &Person) -> Attributes {
    Attributes::new()
        .with("login", &person.login_id)
        .with("first_name", &person.name.given)
        .with("last_name", &person.name.family)
        .with("email", person.email())
        .with("mobile", person.mobile())
        .with("organization_id", &person.managing_organization)
        .with("preferred_language", &person.preferred_language)
        .with(
            "preferred_communication_channel",
            &person.preferred_communication_channel,
        )
}

fn apply_to_profile(profile: &mut Profile, id: &RemoteId, declared: &Attributes) {
    profile.id = id.to_string();
    profile.given_name = declared.get("first_name").to_string();
    profile.family_name = declared.get("last_name").to_string();
    profile.preferred_language = declared.get("preferred_language").to_string();
    profile.preferred_communication_channel =
        declared.get("preferred_communication_channel").to_string();
    profile.contact.email_address = declared.get("email").to_string();
    profile.contact.mobile_phone = declared.get("mobile").to_string();
    // The legacy endpoint rejects an empty middle name.
    if profile.middle_name.is_empty() {
        profile.middle_name = " ".to_string();
    }
}

/// The login, falling back to the deprecated username.
fn login_of(declared: &Attributes) -> Option<String> {
    [declared.get("login"), declared.get("username")]
        .into_iter()
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<A: UserApi + 'static> Resource for UserResource<A> {
    fn resource_type(&self) -> ResourceType {
        ResourceType::User
    }

    fn schema(&self) -> &'static Schema {
        &USER_SCHEMA
    }

    fn organization_attribute(&self) -> &'static str {
        "organization_id"
    }

    fn natural_key(&self, declared: &Attributes) -> Option<String> {
        login_of(declared)
    }

    async fn find_by_natural_key(&self, key: &str) -> Result<RemoteObject, ApiError> {
        let person = self.api.get_user_by_login(key).await?;
        if person.id.is_empty() {
            return Err(ApiError::EmptyResults);
        }
        remote_object(person)
    }

    async fn create(&self, declared: &Attributes) -> Result<RemoteObject, ApiError> {
        let created = self.api.create_user(&person_from(declared)).await?;
        remote_object(created)
    }

    async fn read(&self, id: &RemoteId) -> Result<Attributes, ApiError> {
        let person = self.api.get_user_by_id(id).await?;
        Ok(attributes_from(&person))
    }

    async fn update(
        &self,
        id: &RemoteId,
        changes: &ChangeSet,
        declared: &Attributes,
    ) -> Result<Diagnostics, UpdateError> {
        let mut diagnostics = Diagnostics::new();

        if changes.contains("login") {
            self.api
                .change_login_id(id, declared.get("login"))
                .await
                .map_err(|e| UpdateError::new("change login id", e))?;
        }

        if changes.contains_any(PROFILE_ATTRIBUTES) {
            let mut profile = self
                .api
                .get_profile(id)
                .await
                .map_err(|e| UpdateError::new("get profile", e))?;
            apply_to_profile(&mut profile, id, declared);
            self.api
                .update_profile(&profile)
                .await
                .map_err(|e| UpdateError::new("update profile", e))?;
        }

        if changes.contains("password") {
            diagnostics.push(
                Diagnostic::warning(
                    "password change not propagated",
                    "changing the password after a user is created has no effect",
                )
                .for_attribute("password"),
            );
        }

        Ok(diagnostics)
    }

    async fn delete(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError> {
        self.api.delete_user(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;

    fn declared() -> Attributes {
        Attributes::new()
            .with("login", "Foo@x.com")
            .with("email", "foo@x.com")
            .with("first_name", "Foo")
            .with("last_name", "Bar")
            .with("organization_id", "org-1")
    }

    #[test]
    fn test_schema_version_matches_migrator() {
        assert_eq!(USER_SCHEMA.version, migrate::current_version(ResourceType::User));
    }

    #[test]
    fn test_login_falls_back_to_username() {
        assert_eq!(login_of(&declared()).as_deref(), Some("Foo@x.com"));

        let legacy = Attributes::new().with("username", "legacy");
        assert_eq!(login_of(&legacy).as_deref(), Some("legacy"));
        assert_eq!(login_of(&Attributes::new()), None);
    }

    #[test]
    fn test_person_from_declared() {
        let person = person_from(&declared().with("mobile", "+31600000000"));
        assert_eq!(person.resource_type, "Person");
        assert_eq!(person.login_id, "Foo@x.com");
        assert_eq!(person.name.given, "Foo");
        assert_eq!(person.name.family, "Bar");
        assert_eq!(person.email(), "foo@x.com");
        assert_eq!(person.mobile(), "+31600000000");
        assert_eq!(person.managing_organization, "org-1");
        assert_eq!(person.password, None);
        assert_eq!(person.is_age_validated.as_deref(), Some("true"));
    }

    #[test]
    fn test_person_without_mobile_has_single_telecom() {
        let person = person_from(&declared().with("password", "s3cret"));
        assert_eq!(person.telecom.len(), 1);
        assert_eq!(person.password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_read_never_reports_write_only_attributes() {
        let person = Person {
            id: "u-1".to_string(),
            login_id: "foo@x.com".to_string(),
            password: Some("leaked".to_string()),
            ..Default::default()
        };
        let attrs = attributes_from(&person);
        assert_eq!(attrs.get("login"), "foo@x.com");
        assert!(!attrs.contains("password"));
        assert!(!attrs.contains("username"));
    }

    #[test]
    fn test_profile_keeps_existing_middle_name() {
        let id = RemoteId::parse("u-1").unwrap();

        let mut blank = Profile::default();
        apply_to_profile(&mut blank, &id, &declared());
        assert_eq!(blank.middle_name, " ");
        assert_eq!(blank.id, "u-1");
        assert_eq!(blank.contact.email_address, "foo@x.com");

        let mut named = Profile {
            middle_name: "Q".to_string(),
            ..Default::default()
        };
        apply_to_profile(&mut named, &id, &declared());
        assert_eq!(named.middle_name, "Q");
    }

    #[test]
    fn test_preferences_suppressed_against_service_defaults() {
        assert!(USER_SCHEMA.should_suppress("preferred_language", "", "en-US"));
        assert!(USER_SCHEMA.should_suppress("preferred_communication_channel", "", "email"));
        assert!(!USER_SCHEMA.should_suppress("preferred_language", "nl-NL", "en-US"));
        assert!(USER_SCHEMA.should_suppress("login", "Foo@x.com", "foo@x.com"));
    }
}
