//! # warden-id
//!
//! Typed identifiers used by the reconciler.
//!
//! ## Design Principles
//!
//! - Remote identifiers are assigned by the IAM service and treated as opaque
//! - State keys are chosen by the caller and name one persisted record
//! - All identifiers have strict parsing and roundtrip through serde
//! - Identifiers are typed so a state key can never be passed as a remote id
//!
//! ## Formats
//!
//! - `RemoteId`: any non-empty token without whitespace, e.g.
//!   `5f0b2a4e-4c1d-4b8e-9a57-1b5a0c1f2d3e`
//! - `OrgId`: same rules as `RemoteId`, names a managing organization
//! - `StateKey`: `[A-Za-z0-9._-]{1,128}`, not starting with `.`, e.g.
//!   `users.alice`

mod error;
mod macros;
mod types;

pub use error::IdError;
#[doc(hidden)]
pub use macros::no_extra_validation;
pub use types::*;
