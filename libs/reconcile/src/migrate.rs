//! State schema migration.
//!
//! Records written under an older attribute schema are upgraded once, before
//! the reconciler operates on them. Each step fills a successor attribute from
//! its predecessor when the successor is empty; nothing already populated is
//! overwritten and no attribute is dropped.
//!
//! | type           | version | change                                          |
//! |----------------|---------|-------------------------------------------------|
//! | iam_user       | 1       | `login` introduced, seeded from `username`      |
//! | iam_user       | 2       | `email` required, seeded from `username`        |
//! | iam_email_tmpl | 1       | computed `message_base64` derived from `message`|

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::attributes::Attributes;
use crate::resource::ResourceType;

/// One upgrade step, producing version `to`.
struct Step {
    to: u32,
    apply: fn(&mut Attributes),
}

const USER_STEPS: &[Step] = &[
    Step {
        to: 1,
        apply: user_login_from_username,
    },
    Step {
        to: 2,
        apply: user_email_from_username,
    },
];

const TEMPLATE_STEPS: &[Step] = &[Step {
    to: 1,
    apply: template_message_base64,
}];

fn steps(resource_type: ResourceType) -> &'static [Step] {
    match resource_type {
        ResourceType::User => USER_STEPS,
        ResourceType::EmailTemplate => TEMPLATE_STEPS,
    }
}

/// Schema version produced by [`migrate`] for a resource type.
pub fn current_version(resource_type: ResourceType) -> u32 {
    steps(resource_type).last().map_or(0, |step| step.to)
}

/// Upgrade attributes recorded under `from_version` to the current version.
///
/// Pure and total. Attributes at or beyond the current version are returned
/// unchanged.
pub fn migrate(
    resource_type: ResourceType,
    attributes: &Attributes,
    from_version: u32,
) -> Attributes {
    steps(resource_type)
        .iter()
        .filter(|step| step.to > from_version)
        .fold(attributes.clone(), |mut attrs, step| {
            (step.apply)(&mut attrs);
            attrs
        })
}

fn fill_if_empty(attrs: &mut Attributes, target: &str, value: String) {
    if attrs.get(target).is_empty() && !value.is_empty() {
        attrs.set(target, value);
    }
}

fn user_login_from_username(attrs: &mut Attributes) {
    let username = attrs.get("username").to_string();
    fill_if_empty(attrs, "login", username);
}

fn user_email_from_username(attrs: &mut Attributes) {
    let username = attrs.get("username");
    if username.contains('@') {
        let username = username.to_string();
        fill_if_empty(attrs, "email", username);
    }
}

fn template_message_base64(attrs: &mut Attributes) {
    let encoded = STANDARD.encode(attrs.get("message"));
    fill_if_empty(attrs, "message_base64", encoded);
}
