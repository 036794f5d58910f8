//! Macros for defining typed identifiers.

/// Macro to define a typed string identifier.
///
/// This generates a newtype wrapper around `String` with:
/// - A `KIND` constant used in error messages
/// - `parse()` which trims and validates the input
/// - `Display`, `FromStr`, `AsRef<str>`
/// - `Serialize` and `Deserialize` implementations that validate on the way in
///
/// The optional third argument names an extra validation function
/// `fn(&str) -> Result<(), IdError>` run after the common checks.
///
/// # Example
///
/// ```ignore
/// define_id!(RemoteId, "remote id");
/// define_id!(StateKey, "state key", validate_state_key);
///
/// let id: RemoteId = "5f0b2a4e".parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $kind:literal) => {
        $crate::define_id!($name, $kind, $crate::no_extra_validation);
    };
    ($name:ident, $kind:literal, $validate:path) => {
        /// A typed identifier.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Human-readable name of this identifier kind.
            pub const KIND: &'static str = $kind;

            /// Parses an identifier, trimming surrounding whitespace.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                let s = s.trim();
                if s.is_empty() {
                    return Err($crate::IdError::Empty { kind: Self::KIND });
                }

                if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
                    return Err($crate::IdError::InvalidCharacter {
                        kind: Self::KIND,
                        actual: s.to_string(),
                    });
                }

                $validate(s)?;

                Ok(Self(s.to_string()))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

#[doc(hidden)]
pub fn no_extra_validation(_: &str) -> Result<(), crate::IdError> {
    Ok(())
}
