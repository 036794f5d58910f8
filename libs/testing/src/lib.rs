//! Test support for the warden crates.
//!
//! [`FakeIam`] is an in-memory stand-in for the IAM service. It mimics the
//! server-side behavior the reconciler has to cope with (login
//! normalization, defaulted preferences, write-only fields) and counts every
//! call so tests can assert on exactly which requests were made.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use warden_id::{IdError, RemoteId};
use warden_reconcile::api::{
    ApiError, Contact, DeleteResponse, EmailTemplate, EmailTemplateApi, Person, Profile,
    TelecomEntry, UserApi,
};

pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_CHANNEL: &str = "email";
pub const TEMPLATE_DEFAULT: &str = "default";

/// A call the fake can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateUser,
    GetUser,
    GetUserByLogin,
    ChangeLoginId,
    GetProfile,
    UpdateProfile,
    DeleteUser,
    CreateTemplate,
    GetTemplate,
    DeleteTemplate,
}

impl Op {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateUser
                | Self::ChangeLoginId
                | Self::UpdateProfile
                | Self::DeleteUser
                | Self::CreateTemplate
                | Self::DeleteTemplate
        )
    }
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<String, Person>,
    middle_names: HashMap<String, String>,
    templates: BTreeMap<String, EmailTemplate>,
    next_id: u64,
    calls: HashMap<Op, usize>,
    failures: HashMap<Op, ApiError>,
    delete_status: Option<u16>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    /// Count the call and return a scripted failure, if any.
    fn enter(&mut self, op: Op) -> Result<(), ApiError> {
        *self.calls.entry(op).or_default() += 1;
        debug!(op = ?op, "[FAKE] IAM call");
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Status for a delete of an existing object.
    fn delete_response(&mut self) -> Result<DeleteResponse, ApiError> {
        match self.delete_status.take() {
            None => Ok(DeleteResponse::NO_CONTENT),
            Some(status @ 200..=299) => Ok(DeleteResponse { status }),
            Some(status) => Err(ApiError::Domain {
                status,
                code: "conflict".to_string(),
                message: "object is still referenced".to_string(),
            }),
        }
    }
}

fn not_found(what: &str, id: &str) -> ApiError {
    ApiError::Domain {
        status: 404,
        code: "not-found".to_string(),
        message: format!("{what} '{id}' not found"),
    }
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn set_telecom(person: &mut Person, system: &str, value: &str) {
    person.telecom.retain(|entry| entry.system != system);
    if !value.is_empty() {
        person.telecom.push(TelecomEntry {
            system: system.to_string(),
            value: value.to_string(),
        });
    }
}

/// In-memory IAM service.
#[derive(Debug, Default)]
pub struct FakeIam {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl FakeIam {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every create call by `latency`.
    pub fn with_create_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `op` call fail with `err`.
    pub fn fail_next(&self, op: Op, err: ApiError) {
        self.state().failures.insert(op, err);
    }

    /// Answer the next delete of an existing object with `status`.
    pub fn script_delete_status(&self, status: u16) {
        self.state().delete_status = Some(status);
    }

    /// Seed a user as if created out of band. Returns its id.
    pub fn insert_user(&self, login: &str, organization: &str) -> Result<RemoteId, IdError> {
        let mut state = self.state();
        let id = state.next_id("user");
        let person = Person {
            id: id.clone(),
            login_id: login.to_lowercase(),
            telecom: vec![TelecomEntry {
                system: "email".to_string(),
                value: login.to_lowercase(),
            }],
            managing_organization: organization.to_string(),
            preferred_language: DEFAULT_LANGUAGE.to_string(),
            preferred_communication_channel: DEFAULT_CHANNEL.to_string(),
            ..Default::default()
        };
        state.users.insert(id.clone(), person);
        RemoteId::parse(&id)
    }

    /// Delete a user behind the reconciler's back.
    pub fn remove_user(&self, id: &RemoteId) -> bool {
        self.state().users.remove(id.as_str()).is_some()
    }

    /// Delete a template behind the reconciler's back.
    pub fn remove_template(&self, id: &RemoteId) -> bool {
        self.state().templates.remove(id.as_str()).is_some()
    }

    pub fn user(&self, id: &RemoteId) -> Option<Person> {
        self.state().users.get(id.as_str()).cloned()
    }

    pub fn template(&self, id: &RemoteId) -> Option<EmailTemplate> {
        self.state().templates.get(id.as_str()).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.state().users.len()
    }

    pub fn template_count(&self) -> usize {
        self.state().templates.len()
    }

    /// Number of `op` calls received.
    pub fn calls(&self, op: Op) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of calls that could have changed remote state.
    pub fn mutations(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|(op, _)| op.is_mutation())
            .map(|(_, count)| count)
            .sum()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    async fn create_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl UserApi for FakeIam {
    async fn create_user(&self, person: &Person) -> Result<Person, ApiError> {
        self.state().enter(Op::CreateUser)?;
        self.create_delay().await;

        let mut state = self.state();
        let login = person.login_id.to_lowercase();
        if state.users.values().any(|existing| existing.login_id == login) {
            return Err(ApiError::Domain {
                status: 409,
                code: "duplicate".to_string(),
                message: format!("login '{login}' already exists"),
            });
        }

        let id = state.next_id("user");
        let mut stored = person.clone();
        stored.id = id.clone();
        stored.login_id = login;
        stored.password = None;
        stored.preferred_language = or_default(&person.preferred_language, DEFAULT_LANGUAGE);
        stored.preferred_communication_channel =
            or_default(&person.preferred_communication_channel, DEFAULT_CHANNEL);
        state.users.insert(id, stored.clone());

        Ok(stored)
    }

    async fn get_user_by_id(&self, id: &RemoteId) -> Result<Person, ApiError> {
        let mut state = self.state();
        state.enter(Op::GetUser)?;
        state
            .users
            .get(id.as_str())
            .cloned()
            .ok_or(ApiError::EmptyResults)
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Person, ApiError> {
        let mut state = self.state();
        state.enter(Op::GetUserByLogin)?;
        state
            .users
            .values()
            .find(|person| person.login_id.eq_ignore_ascii_case(login))
            .cloned()
            .ok_or(ApiError::EmptyResults)
    }

    async fn change_login_id(&self, id: &RemoteId, login: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        state.enter(Op::ChangeLoginId)?;
        let person = state
            .users
            .get_mut(id.as_str())
            .ok_or_else(|| not_found("user", id.as_str()))?;
        person.login_id = login.to_lowercase();
        Ok(())
    }

    async fn get_profile(&self, id: &RemoteId) -> Result<Profile, ApiError> {
        let mut state = self.state();
        state.enter(Op::GetProfile)?;
        let person = state
            .users
            .get(id.as_str())
            .ok_or_else(|| not_found("user", id.as_str()))?;

        Ok(Profile {
            id: person.id.clone(),
            given_name: person.name.given.clone(),
            middle_name: state
                .middle_names
                .get(id.as_str())
                .cloned()
                .unwrap_or_default(),
            family_name: person.name.family.clone(),
            preferred_language: person.preferred_language.clone(),
            preferred_communication_channel: person.preferred_communication_channel.clone(),
            contact: Contact {
                email_address: person.email().to_string(),
                mobile_phone: person.mobile().to_string(),
            },
        })
    }

    async fn update_profile(&self, profile: &Profile) -> Result<(), ApiError> {
        let mut state = self.state();
        state.enter(Op::UpdateProfile)?;
        if profile.middle_name.is_empty() {
            return Err(ApiError::Domain {
                status: 400,
                code: "invalid".to_string(),
                message: "middleName is required".to_string(),
            });
        }

        let person = state
            .users
            .get_mut(&profile.id)
            .ok_or_else(|| not_found("user", &profile.id))?;
        person.name.given = profile.given_name.clone();
        person.name.family = profile.family_name.clone();
        person.preferred_language = or_default(&profile.preferred_language, DEFAULT_LANGUAGE);
        person.preferred_communication_channel =
            or_default(&profile.preferred_communication_channel, DEFAULT_CHANNEL);
        person.email_address.clear();
        set_telecom(person, "email", &profile.contact.email_address);
        set_telecom(person, "mobile", &profile.contact.mobile_phone);

        state
            .middle_names
            .insert(profile.id.clone(), profile.middle_name.clone());
        Ok(())
    }

    async fn delete_user(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError> {
        let mut state = self.state();
        state.enter(Op::DeleteUser)?;
        if !state.users.contains_key(id.as_str()) {
            return Err(not_found("user", id.as_str()));
        }

        let response = state.delete_response()?;
        state.users.remove(id.as_str());
        Ok(response)
    }
}

#[async_trait]
impl EmailTemplateApi for FakeIam {
    async fn create_template(&self, template: &EmailTemplate) -> Result<EmailTemplate, ApiError> {
        self.state().enter(Op::CreateTemplate)?;
        self.create_delay().await;

        let mut state = self.state();
        let id = state.next_id("tmpl");
        let mut stored = template.clone();
        stored.id = id.clone();
        stored.from = or_default(&template.from, TEMPLATE_DEFAULT);
        stored.locale = or_default(&template.locale, TEMPLATE_DEFAULT);
        stored.link = or_default(&template.link, TEMPLATE_DEFAULT);
        state.templates.insert(id, stored.clone());

        Ok(stored)
    }

    async fn get_template_by_id(&self, id: &RemoteId) -> Result<EmailTemplate, ApiError> {
        let mut state = self.state();
        state.enter(Op::GetTemplate)?;
        let mut template = state
            .templates
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| not_found("email template", id.as_str()))?;
        // The message body is never returned by a read.
        template.message.clear();
        Ok(template)
    }

    async fn delete_template(&self, id: &RemoteId) -> Result<DeleteResponse, ApiError> {
        let mut state = self.state();
        state.enter(Op::DeleteTemplate)?;
        if !state.templates.contains_key(id.as_str()) {
            return Err(not_found("email template", id.as_str()));
        }

        let response = state.delete_response()?;
        state.templates.remove(id.as_str());
        Ok(response)
    }
}
