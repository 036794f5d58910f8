//! Attribute maps, per-type attribute schemas, and change planning.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diag::{Diagnostic, Diagnostics};
use crate::error::ReconcileError;
use crate::suppress::{self, Suppression};

/// Attribute values keyed by attribute name.
///
/// A missing attribute reads as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an attribute value, or `""` when unset.
    pub fn get(&self, name: &str) -> &str {
        self.0.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style `set`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Declaration of one attribute of a resource type.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub required: bool,
    /// Changing the attribute requires replacing the remote object.
    pub force_new: bool,
    /// Set by the service, never declared.
    pub computed: bool,
    pub sensitive: bool,
    pub default: Option<&'static str>,
    pub deprecated: Option<&'static str>,
    pub suppression: &'static [Suppression],
}

impl AttributeSpec {
    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            force_new: false,
            computed: false,
            sensitive: false,
            default: None,
            deprecated: None,
            suppression: &[],
        }
    }

    pub const fn required(name: &'static str) -> Self {
        let mut spec = Self::optional(name);
        spec.required = true;
        spec
    }

    pub const fn computed(name: &'static str) -> Self {
        let mut spec = Self::optional(name);
        spec.computed = true;
        spec
    }

    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub const fn default_value(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    pub const fn deprecated(mut self, message: &'static str) -> Self {
        self.deprecated = Some(message);
        self
    }

    pub const fn suppress(mut self, rules: &'static [Suppression]) -> Self {
        self.suppression = rules;
        self
    }

    pub fn is_write_only(&self) -> bool {
        suppress::is_write_only(self.suppression)
    }
}

/// Attribute schema of one resource type.
#[derive(Debug)]
pub struct Schema {
    /// Version of the persisted record layout.
    pub version: u32,
    pub attributes: &'static [AttributeSpec],
}

impl Schema {
    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|spec| spec.name == name)
    }

    /// Per-attribute suppression decision for a declared value against the
    /// value held remotely. Unknown attributes are never suppressed.
    pub fn should_suppress(&self, attribute: &str, declared: &str, remote: &str) -> bool {
        match self.attribute(attribute) {
            Some(spec) => suppress::should_suppress(spec.suppression, declared, remote),
            None => declared == remote,
        }
    }

    /// Check a declared descriptor and fill in defaults.
    ///
    /// Rejects unknown and computed attributes and missing required values.
    /// Deprecated attributes produce a warning.
    pub fn validate(
        &self,
        declared: &Attributes,
    ) -> Result<(Attributes, Diagnostics), ReconcileError> {
        let mut diagnostics = Diagnostics::new();

        for (name, _) in declared.iter() {
            match self.attribute(name) {
                None => {
                    return Err(ReconcileError::InvalidDeclaration(format!(
                        "unknown attribute '{name}'"
                    )))
                }
                Some(spec) if spec.computed => {
                    return Err(ReconcileError::InvalidDeclaration(format!(
                        "attribute '{name}' is computed and cannot be declared"
                    )))
                }
                Some(_) => {}
            }
        }

        let mut normalized = Attributes::new();
        for spec in self.attributes.iter().filter(|spec| !spec.computed) {
            let value = declared.get(spec.name);

            if spec.required && value.trim().is_empty() {
                return Err(ReconcileError::InvalidDeclaration(format!(
                    "attribute '{}' is required",
                    spec.name
                )));
            }

            if let (Some(message), false) = (spec.deprecated, value.is_empty()) {
                diagnostics.push(
                    Diagnostic::warning("deprecated attribute", message).for_attribute(spec.name),
                );
            }

            let value = match (value.is_empty(), spec.default) {
                (true, Some(default)) => default,
                _ => value,
            };
            normalized.set(spec.name, value);
        }

        Ok((normalized, diagnostics))
    }

    /// Compute the attribute changes needed to move `prior` to `declared`.
    ///
    /// Readable attributes in `prior` hold what the service last reported and
    /// are compared through the suppression rules. Write-only attributes hold
    /// the last applied value and are compared verbatim; one that was never
    /// applied (an imported record) is unknown and never a change.
    pub fn diff(&self, prior: &Attributes, declared: &Attributes) -> ChangeSet {
        let changes = self
            .attributes
            .iter()
            .filter(|spec| !spec.computed)
            .filter_map(|spec| {
                let old = prior.get(spec.name);
                let new = declared.get(spec.name);

                let unchanged = if spec.is_write_only() {
                    old == new || !prior.contains(spec.name)
                } else {
                    suppress::should_suppress(spec.suppression, new, old)
                };

                (!unchanged).then(|| Change {
                    attribute: spec.name,
                    old: old.to_string(),
                    new: new.to_string(),
                    force_new: spec.force_new,
                    sensitive: spec.sensitive,
                })
            })
            .collect();

        ChangeSet(changes)
    }

    /// Plan how to move `prior` to `declared`.
    pub fn plan(&self, prior: &Attributes, declared: &Attributes) -> Plan {
        let changes = self.diff(prior, declared);
        let force_new: Vec<&'static str> = changes
            .iter()
            .filter(|change| change.force_new)
            .map(|change| change.attribute)
            .collect();

        if changes.is_empty() {
            Plan::NoChange
        } else if force_new.is_empty() {
            Plan::Update(changes)
        } else {
            Plan::Replace { force_new, changes }
        }
    }
}

/// A single attribute change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub attribute: &'static str,
    pub old: String,
    pub new: String,
    pub force_new: bool,
    pub sensitive: bool,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.force_new { " (forces replacement)" } else { "" };
        if self.sensitive {
            write!(f, "{}: (sensitive value){marker}", self.attribute)
        } else {
            write!(f, "{}: {:?} -> {:?}{marker}", self.attribute, self.old, self.new)
        }
    }
}

/// The set of attributes that differ.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(Vec<Change>);

impl ChangeSet {
    pub fn contains(&self, attribute: &str) -> bool {
        self.0.iter().any(|change| change.attribute == attribute)
    }

    pub fn contains_any(&self, attributes: &[&str]) -> bool {
        attributes.iter().any(|attribute| self.contains(attribute))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.0.iter()
    }

    pub fn attributes(&self) -> Vec<&'static str> {
        self.0.iter().map(|change| change.attribute).collect()
    }
}

impl FromIterator<Change> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of planning a declared descriptor against a persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    NoChange,
    /// Mutable attributes changed; apply in place.
    Update(ChangeSet),
    /// An immutable attribute changed; delete then create.
    Replace {
        force_new: Vec<&'static str>,
        changes: ChangeSet,
    },
}

impl Plan {
    pub fn is_no_change(&self) -> bool {
        matches!(self, Self::NoChange)
    }

    pub fn changes(&self) -> Option<&ChangeSet> {
        match self {
            Self::NoChange => None,
            Self::Update(changes) | Self::Replace { changes, .. } => Some(changes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SCHEMA: Schema = Schema {
        version: 1,
        attributes: &[
            AttributeSpec::required("name").suppress(&[Suppression::CaseInsensitive]),
            AttributeSpec::required("owner").force_new(),
            AttributeSpec::optional("locale").suppress(&[Suppression::EmptyMeansDefault("en-US")]),
            AttributeSpec::optional("format").default_value("HTML"),
            AttributeSpec::optional("secret")
                .sensitive()
                .suppress(&[Suppression::WriteOnly]),
            AttributeSpec::optional("alias").deprecated("use name instead"),
            AttributeSpec::computed("digest"),
        ],
    };

    fn declared() -> Attributes {
        Attributes::new().with("name", "Alice").with("owner", "org-1")
    }

    #[test]
    fn test_validate_fills_defaults() {
        let (normalized, diags) = SCHEMA.validate(&declared()).unwrap();
        assert_eq!(normalized.get("format"), "HTML");
        assert_eq!(normalized.get("locale"), "");
        assert!(!normalized.contains("digest"));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_validate_rejects_missing_required() {
        let err = SCHEMA.validate(&Attributes::new().with("name", "a")).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidDeclaration(_)));
    }

    #[test]
    fn test_validate_rejects_unknown_and_computed() {
        assert!(SCHEMA.validate(&declared().with("bogus", "x")).is_err());
        assert!(SCHEMA.validate(&declared().with("digest", "x")).is_err());
    }

    #[test]
    fn test_validate_warns_on_deprecated() {
        let (_, diags) = SCHEMA.validate(&declared().with("alias", "al")).unwrap();
        assert_eq!(diags.warning_count(), 1);
    }

    #[test]
    fn test_plan_no_change_under_suppression() {
        let prior = Attributes::new()
            .with("name", "alice")
            .with("owner", "org-1")
            .with("locale", "en-US")
            .with("format", "HTML");
        let (declared, _) = SCHEMA.validate(&declared()).unwrap();
        assert_eq!(SCHEMA.plan(&prior, &declared), Plan::NoChange);
    }

    #[test]
    fn test_plan_update_for_mutable_change() {
        let prior = Attributes::new()
            .with("name", "alice")
            .with("owner", "org-1")
            .with("format", "HTML");
        let (declared, _) = SCHEMA.validate(&declared().with("locale", "nl-NL")).unwrap();

        match SCHEMA.plan(&prior, &declared) {
            Plan::Update(changes) => assert_eq!(changes.attributes(), vec!["locale"]),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_replace_for_force_new() {
        let prior = Attributes::new()
            .with("name", "alice")
            .with("owner", "org-2")
            .with("format", "HTML");
        let (declared, _) = SCHEMA.validate(&declared()).unwrap();

        match SCHEMA.plan(&prior, &declared) {
            Plan::Replace { force_new, .. } => assert_eq!(force_new, vec!["owner"]),
            other => panic!("expected replace, got {other:?}"),
        }
    }

    #[test]
    fn test_write_only_compared_against_last_applied() {
        let prior = Attributes::new()
            .with("name", "alice")
            .with("owner", "org-1")
            .with("format", "HTML")
            .with("secret", "one");
        let (declared, _) = SCHEMA.validate(&declared().with("secret", "two")).unwrap();

        let changes = SCHEMA.diff(&prior, &declared);
        assert!(changes.contains("secret"));
        let rendered = changes.iter().next().unwrap().to_string();
        assert!(!rendered.contains("two"));
    }

    #[test]
    fn test_unknown_write_only_value_is_not_a_change() {
        let imported = Attributes::new()
            .with("name", "alice")
            .with("owner", "org-1")
            .with("format", "HTML");
        let (declared, _) = SCHEMA.validate(&declared().with("secret", "two")).unwrap();
        assert!(SCHEMA.diff(&imported, &declared).is_empty());
    }

    #[test]
    fn test_should_suppress_by_name() {
        assert!(SCHEMA.should_suppress("name", "ALICE", "alice"));
        assert!(SCHEMA.should_suppress("secret", "x", ""));
        assert!(!SCHEMA.should_suppress("unknown", "a", "b"));
    }
}
