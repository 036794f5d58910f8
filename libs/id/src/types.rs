//! Typed identifier definitions.

use crate::define_id;
use crate::IdError;

/// Maximum length of a state key.
pub const STATE_KEY_MAX_LEN: usize = 128;

// =============================================================================
// Remote identities
// =============================================================================

define_id!(RemoteId, "remote id");
define_id!(OrgId, "organization id");

// =============================================================================
// Local state
// =============================================================================

define_id!(StateKey, "state key", validate_state_key);

/// State keys double as file names in the file-backed store.
fn validate_state_key(s: &str) -> Result<(), IdError> {
    if s.len() > STATE_KEY_MAX_LEN {
        return Err(IdError::TooLong {
            kind: StateKey::KIND,
            max: STATE_KEY_MAX_LEN,
        });
    }

    if s.starts_with('.') {
        return Err(IdError::InvalidFormat {
            kind: StateKey::KIND,
            message: "must not start with '.'".to_string(),
        });
    }

    if let Some(bad) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(IdError::InvalidFormat {
            kind: StateKey::KIND,
            message: format!("character '{bad}' is not allowed"),
        });
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_remote_id_roundtrip() {
        let id: RemoteId = "5f0b2a4e-4c1d-4b8e-9a57-1b5a0c1f2d3e".parse().unwrap();
        assert_eq!(id.to_string(), "5f0b2a4e-4c1d-4b8e-9a57-1b5a0c1f2d3e");
    }

    #[test]
    fn test_remote_id_trims() {
        let id = RemoteId::parse("  abc  ").unwrap();
        assert_eq!(id.as_str(), "abc");
    }

    #[test]
    fn test_remote_id_empty() {
        let err = RemoteId::parse("   ").unwrap_err();
        assert!(err.is_empty());
    }

    #[test]
    fn test_remote_id_inner_whitespace() {
        let err = OrgId::parse("org one").unwrap_err();
        assert!(matches!(err, IdError::InvalidCharacter { .. }));
    }

    #[test]
    fn test_state_key_rejects_path_separators() {
        assert!(StateKey::parse("users/alice").is_err());
        assert!(StateKey::parse("..").is_err());
        assert!(StateKey::parse(".hidden").is_err());
        assert!(StateKey::parse("users.alice").is_ok());
    }

    #[test]
    fn test_state_key_too_long() {
        let long = "k".repeat(STATE_KEY_MAX_LEN + 1);
        assert!(matches!(
            StateKey::parse(&long),
            Err(IdError::TooLong { .. })
        ));
    }

    #[test]
    fn test_json_rejects_invalid() {
        let parsed: Result<StateKey, _> = serde_json::from_str("\"a b\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_org_id_json_roundtrip() {
        let id = OrgId::parse("org-1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"org-1\"");
        let parsed: OrgId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    proptest! {
        #[test]
        fn valid_state_keys_roundtrip(key in "[A-Za-z0-9_-][A-Za-z0-9._-]{0,127}") {
            let parsed = StateKey::parse(&key).unwrap();
            prop_assert_eq!(parsed.as_str(), key.as_str());
        }
    }
}
