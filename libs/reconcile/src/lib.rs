//! Reconciliation engine for IAM users and email templates.
//!
//! Converges declared resource descriptors with a remote identity service
//! that normalizes, defaults, and hides some of the values it stores. Key
//! pieces:
//!
//! - **Resolver**: finds an existing object by natural key so it is adopted
//!   instead of duplicated.
//! - **Suppression**: decides which declared/remote differences are noise.
//! - **Classifier**: maps remote call outcomes to success, recoverable
//!   absence, warning, or fatal.
//! - **Reconciler**: the per-record state machine over a [`StateStore`].
//! - **Migrator**: upgrades state records written under older schemas.
//!
//! # Invariants
//!
//! - A handle is recorded only after the remote object exists, and never
//!   reassigned.
//! - Creating twice with the same descriptor issues one create call.
//! - An object owned by another organization is never adopted.
//! - A record is never removed after a failed delete.

pub mod api;
pub mod attributes;
pub mod classify;
pub mod diag;
pub mod error;
pub mod locks;
pub mod migrate;
pub mod reconciler;
pub mod resolve;
pub mod resource;
pub mod resources;
pub mod store;
pub mod suppress;

pub use attributes::{Attributes, Change, ChangeSet, Plan, Schema};
pub use classify::{classify, Call, Classification, RemoteOutcome};
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use error::{ReconcileError, ReconcileResult};
pub use locks::{KeyGuard, KeyedLocks};
pub use reconciler::{Outcome, Phase, Reconciler, Refreshed, Report};
pub use resource::{RemoteObject, Resource, ResourceHandle, ResourceType};
pub use resources::{EmailTemplateResource, UserResource};
pub use store::{FileStore, MemoryStore, StateRecord, StateStore, StoreError};
