//! Diff suppression.
//!
//! Decides whether a difference between a declared value and the value held
//! by the remote service is meaningful, or an artifact of server-side
//! normalization and defaulting. Rules are pure and evaluated fresh on every
//! pass.

/// A suppression policy attached to one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Values that differ only in letter case are equivalent.
    CaseInsensitive,

    /// An empty declared value is equivalent to the service default.
    EmptyMeansDefault(&'static str),

    /// The attribute is never returned by a read. Remote comparisons are
    /// always suppressed; the last applied value is the only source of truth.
    WriteOnly,
}

impl Suppression {
    /// Evaluate this policy alone.
    pub fn suppresses(&self, declared: &str, remote: &str) -> bool {
        match self {
            Self::CaseInsensitive => declared.to_lowercase() == remote.to_lowercase(),
            Self::EmptyMeansDefault(default) => declared.is_empty() && remote == *default,
            Self::WriteOnly => true,
        }
    }
}

/// Returns true if the difference between `declared` and `remote` should not
/// be acted upon under the given rules.
///
/// Equal values are never a diff.
pub fn should_suppress(rules: &[Suppression], declared: &str, remote: &str) -> bool {
    declared == remote || rules.iter().any(|rule| rule.suppresses(declared, remote))
}

/// Returns true if any rule marks the attribute as write-only.
pub fn is_write_only(rules: &[Suppression]) -> bool {
    rules.contains(&Suppression::WriteOnly)
}

/// Value to record after a read observed `remote` for an attribute whose
/// recorded value is `recorded`.
///
/// The remote value wins, except that an empty recorded value is kept when
/// the service reports its own default for the attribute.
pub fn write_back<'a>(rules: &[Suppression], recorded: &'a str, remote: &'a str) -> &'a str {
    if is_write_only(rules) {
        return recorded;
    }

    let keeps_empty = rules.iter().any(|rule| {
        matches!(rule, Suppression::EmptyMeansDefault(_)) && rule.suppresses(recorded, remote)
    });

    if keeps_empty {
        recorded
    } else {
        remote
    }
}
