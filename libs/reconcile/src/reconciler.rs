//! The resource reconciler.
//!
//! Drives one state record through its lifecycle:
//!
//! ```text
//! Absent -> Resolving -> Creating | Adopting -> Created -> Reading
//!        -> Updating -> Reading -> Deleting -> Deleted
//! ```
//!
//! with `Conflict` as the terminal state for ownership and delete conflicts.
//! Every remote outcome is passed through the classifier; absence is a state
//! transition, not an error. Operations on one key are serialized with
//! [`KeyedLocks`]; operations on different keys run independently.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use warden_id::{OrgId, RemoteId, StateKey};

use crate::api::ApiError;
use crate::attributes::{Attributes, Plan};
use crate::classify::{classify, is_delete_conflict, Call, Classification, RemoteOutcome};
use crate::diag::{Diagnostic, Diagnostics};
use crate::error::{ReconcileError, ReconcileResult};
use crate::locks::{KeyGuard, KeyedLocks};
use crate::migrate;
use crate::resolve::resolve;
use crate::resource::{Resource, ResourceHandle};
use crate::store::{StateRecord, StateStore};
use crate::suppress;

/// Lifecycle phase of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Absent,
    Resolving,
    Creating,
    Adopting,
    Created,
    Reading,
    Updating,
    Deleting,
    Deleted,
    Conflict,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Resolving => "resolving",
            Self::Creating => "creating",
            Self::Adopting => "adopting",
            Self::Created => "created",
            Self::Reading => "reading",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a reconciliation step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Adopted,
    Read,
    Updated,
    /// Deleted and created again because an immutable attribute changed.
    Replaced,
    /// The remote object is gone; the record was removed.
    DriftedAbsent,
    DeletedClean,
    DeleteConflict,
    DeleteUnexpectedStatus,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Adopted => "adopted",
            Self::Read => "read",
            Self::Updated => "updated",
            Self::Replaced => "replaced",
            Self::DriftedAbsent => "drifted_absent",
            Self::DeletedClean => "deleted_clean",
            Self::DeleteConflict => "delete_conflict",
            Self::DeleteUnexpectedStatus => "delete_unexpected_status",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub outcome: Outcome,
    /// Handle of the record after the step, if one remains.
    pub handle: Option<ResourceHandle>,
    pub diagnostics: Diagnostics,
}

impl Report {
    fn new(outcome: Outcome, handle: Option<ResourceHandle>, diagnostics: Diagnostics) -> Self {
        Self {
            outcome,
            handle,
            diagnostics,
        }
    }
}

/// Result of reading a record back from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refreshed {
    Present {
        record: StateRecord,
        diagnostics: Diagnostics,
    },
    /// The remote object no longer exists and the record was removed.
    Absent,
}

impl Refreshed {
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Present { .. } => Outcome::Read,
            Self::Absent => Outcome::DriftedAbsent,
        }
    }

    pub fn record(&self) -> Option<&StateRecord> {
        match self {
            Self::Present { record, .. } => Some(record),
            Self::Absent => None,
        }
    }
}

/// Reconciles declared descriptors of one resource type against the remote
/// service, persisting state in `S`.
pub struct Reconciler<R, S> {
    resource: Arc<R>,
    store: Arc<S>,
    locks: KeyedLocks,
    cancel: Option<watch::Receiver<bool>>,
}

impl<R, S> Clone for Reconciler<R, S> {
    fn clone(&self) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
            store: Arc::clone(&self.store),
            locks: self.locks.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Detail of a failed remote call, as classified.
fn failure_detail(call: Call, err: &ApiError) -> String {
    match classify(call, RemoteOutcome::Failed(err)) {
        Classification::Fatal(detail) | Classification::Warning(detail) => detail,
        Classification::Success | Classification::RecoverableEmpty => err.to_string(),
    }
}

impl<R: Resource, S: StateStore> Reconciler<R, S> {
    pub fn new(resource: R, store: S) -> Self {
        Self::from_shared(Arc::new(resource), Arc::new(store))
    }

    pub fn from_shared(resource: Arc<R>, store: Arc<S>) -> Self {
        Self {
            resource,
            store,
            locks: KeyedLocks::new(),
            cancel: None,
        }
    }

    /// Abort between steps once `cancel` turns true.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Share a lock table with other reconcilers over the same store.
    pub fn with_locks(mut self, locks: KeyedLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Bring a declared resource under management.
    ///
    /// An existing record is only read back. Otherwise an object holding the
    /// natural key is adopted, and failing that a new one is created.
    #[instrument(
        skip(self, declared),
        fields(key = %key, resource_type = %self.resource.resource_type())
    )]
    pub async fn create(&self, key: &StateKey, declared: &Attributes) -> ReconcileResult<Report> {
        let guard = self.locks.lock(key).await;
        self.create_locked(key, declared, guard).await
    }

    /// Read the managed object and fold its current attributes into the record.
    #[instrument(
        skip(self),
        fields(key = %key, resource_type = %self.resource.resource_type())
    )]
    pub async fn refresh(&self, key: &StateKey) -> ReconcileResult<Refreshed> {
        let _guard = self.locks.lock(key).await;
        let record = self.load_managed(key).await?;
        self.read_record(key, record).await
    }

    /// Plan the changes needed to move the recorded state to `declared`.
    /// Issues no remote calls.
    #[instrument(
        skip(self, declared),
        fields(key = %key, resource_type = %self.resource.resource_type())
    )]
    pub async fn plan(&self, key: &StateKey, declared: &Attributes) -> ReconcileResult<Plan> {
        let _guard = self.locks.lock(key).await;
        let (declared, _) = self.resource.schema().validate(declared)?;
        let record = self.load_managed(key).await?;
        Ok(self.resource.schema().plan(&record.attributes, &declared))
    }

    /// Apply in-place changes. Fails before any remote call if an immutable
    /// attribute changed.
    #[instrument(
        skip(self, declared),
        fields(key = %key, resource_type = %self.resource.resource_type())
    )]
    pub async fn update(&self, key: &StateKey, declared: &Attributes) -> ReconcileResult<Report> {
        let _guard = self.locks.lock(key).await;
        let record = self.load_managed(key).await?;
        self.update_locked(key, record, declared).await
    }

    /// Converge on `declared`: create when unmanaged, otherwise refresh, plan
    /// and then update in place or replace.
    #[instrument(
        skip(self, declared),
        fields(key = %key, resource_type = %self.resource.resource_type())
    )]
    pub async fn apply(&self, key: &StateKey, declared: &Attributes) -> ReconcileResult<Report> {
        let guard = self.locks.lock(key).await;

        let Some(record) = self.load(key).await? else {
            return self.create_locked(key, declared, guard).await;
        };

        let (normalized, validation) = self.resource.schema().validate(declared)?;
        let (record, mut diagnostics) = match self.read_record(key, record).await? {
            Refreshed::Present {
                record,
                diagnostics,
            } => (record, diagnostics),
            Refreshed::Absent => {
                info!(key = %key, "Managed object disappeared, creating it again");
                return self.create_locked(key, declared, guard).await;
            }
        };

        self.check_cancelled()?;

        match self.resource.schema().plan(&record.attributes, &normalized) {
            Plan::NoChange => {
                debug!(key = %key, "No changes");
                diagnostics.extend(validation);
                Ok(Report::new(Outcome::Read, Some(record.handle), diagnostics))
            }
            Plan::Update(_) => {
                let report = self.update_locked(key, record, declared).await?;
                diagnostics.extend(report.diagnostics);
                Ok(Report::new(report.outcome, report.handle, diagnostics))
            }
            Plan::Replace { force_new, .. } => {
                info!(key = %key, attributes = ?force_new, "Replacing resource");
                let deleted = self.destroy_locked(key, record).await?;
                diagnostics.extend(deleted.diagnostics);

                self.check_cancelled()?;
                let created = self.create_locked(key, declared, guard).await?;
                diagnostics.extend(created.diagnostics);
                Ok(Report::new(Outcome::Replaced, created.handle, diagnostics))
            }
        }
    }

    /// Delete the managed object and drop its record.
    ///
    /// A conflict leaves the record in place.
    #[instrument(
        skip(self),
        fields(key = %key, resource_type = %self.resource.resource_type())
    )]
    pub async fn destroy(&self, key: &StateKey) -> ReconcileResult<Report> {
        let _guard = self.locks.lock(key).await;
        let record = self.load_managed(key).await?;
        self.destroy_locked(key, record).await
    }

    /// Bring an existing remote object under management by id.
    #[instrument(
        skip(self),
        fields(key = %key, resource_type = %self.resource.resource_type())
    )]
    pub async fn import(&self, key: &StateKey, id: &RemoteId) -> ReconcileResult<Report> {
        let _guard = self.locks.lock(key).await;

        if self.store.get(key).await?.is_some() {
            return Err(ReconcileError::AlreadyManaged(key.clone()));
        }

        self.check_cancelled()?;
        self.transition(key, Phase::Reading);

        let resource_type = self.resource.resource_type();
        let attributes = match self.resource.read(id).await {
            Ok(attributes) => attributes,
            Err(err) => {
                return match classify(Call::Read, RemoteOutcome::Failed(&err)) {
                    Classification::RecoverableEmpty => Err(ReconcileError::ImportNotFound {
                        resource_type,
                        id: id.clone(),
                    }),
                    _ => Err(self.remote_error(Call::Read, id, failure_detail(Call::Read, &err))),
                };
            }
        };

        let organization = OrgId::parse(attributes.get(self.resource.organization_attribute()))
            .map_err(|e| {
                self.remote_error(Call::Read, id, format!("response carries no organization: {e}"))
            })?;

        let handle = ResourceHandle {
            id: id.clone(),
            organization,
        };
        let record = StateRecord::new(
            resource_type,
            handle.clone(),
            attributes,
            self.resource.schema().version,
        );
        self.store.put(key, &record).await?;

        info!(key = %key, handle = %handle, "Imported resource");
        Ok(Report::new(Outcome::Read, Some(handle), Diagnostics::new()))
    }

    // =========================================================================
    // Steps
    // =========================================================================

    async fn create_locked(
        &self,
        key: &StateKey,
        declared: &Attributes,
        guard: KeyGuard,
    ) -> ReconcileResult<Report> {
        let (declared, mut diagnostics) = self.resource.schema().validate(declared)?;

        if let Some(record) = self.load(key).await? {
            debug!(key = %key, handle = %record.handle, "Already recorded, reading");
            match self.read_record(key, record).await? {
                Refreshed::Present {
                    record,
                    diagnostics: read,
                } => {
                    diagnostics.extend(read);
                    return Ok(Report::new(Outcome::Read, Some(record.handle), diagnostics));
                }
                Refreshed::Absent => {
                    info!(key = %key, "Recorded object is gone, creating it again");
                }
            }
        }

        self.check_cancelled()?;
        self.transition(key, Phase::Resolving);

        let resolution = match resolve(self.resource.as_ref(), &declared).await {
            Ok(resolution) => resolution,
            Err(err) => {
                if err.is_conflict() {
                    self.transition(key, Phase::Conflict);
                    warn!(key = %key, error = %err, "Natural key owned by another organization");
                }
                return Err(err);
            }
        };

        self.check_cancelled()?;

        let (outcome, record, _guard) = match resolution {
            Some(found) => {
                self.transition(key, Phase::Adopting);
                let mut attributes = declared;
                for (name, value) in found.object.computed.iter() {
                    attributes.set(name, value);
                }
                let record = StateRecord::new(
                    self.resource.resource_type(),
                    found.handle,
                    attributes,
                    self.resource.schema().version,
                );
                self.store.put(key, &record).await?;
                info!(
                    key = %key,
                    natural_key = %found.key,
                    handle = %record.handle,
                    "Adopted existing resource"
                );
                (Outcome::Adopted, record, guard)
            }
            None => {
                self.transition(key, Phase::Creating);
                let (record, guard) = self.create_remote(key, declared, guard).await?;
                info!(key = %key, handle = %record.handle, "Created resource");
                (Outcome::Created, record, guard)
            }
        };

        self.transition(key, Phase::Created);
        self.check_cancelled()?;

        match self.read_record(key, record).await? {
            Refreshed::Present {
                record,
                diagnostics: read,
            } => {
                diagnostics.extend(read);
                Ok(Report::new(outcome, Some(record.handle), diagnostics))
            }
            Refreshed::Absent => Ok(Report::new(Outcome::DriftedAbsent, None, diagnostics)),
        }
    }

    /// Issue the create call and record the handle as one step.
    ///
    /// Runs on its own task so that dropping the caller's future cannot leave
    /// a created object without a record. The task owns the key's guard until
    /// the record is written, then hands it back.
    async fn create_remote(
        &self,
        key: &StateKey,
        declared: Attributes,
        guard: KeyGuard,
    ) -> ReconcileResult<(StateRecord, KeyGuard)> {
        let organization = OrgId::parse(declared.get(self.resource.organization_attribute()))
            .map_err(|e| ReconcileError::InvalidDeclaration(e.to_string()))?;
        let label = self
            .resource
            .natural_key(&declared)
            .unwrap_or_else(|| key.to_string());

        let resource = Arc::clone(&self.resource);
        let store = Arc::clone(&self.store);
        let key = key.clone();

        let task = tokio::spawn(async move {
            let resource_type = resource.resource_type();
            let created = resource
                .create(&declared)
                .await
                .map_err(|err| ReconcileError::Remote {
                    operation: Call::Create,
                    resource_type,
                    resource: label,
                    detail: failure_detail(Call::Create, &err),
                })?;

            let mut attributes = declared;
            for (name, value) in created.computed.iter() {
                attributes.set(name, value);
            }

            let record = StateRecord::new(
                resource_type,
                ResourceHandle {
                    id: created.id,
                    organization,
                },
                attributes,
                resource.schema().version,
            );
            store.put(&key, &record).await?;
            Ok::<_, ReconcileError>((record, guard))
        });

        task.await
            .map_err(|e| ReconcileError::Task(e.to_string()))?
    }

    /// Read the object behind `record` and apply the write-back rule.
    async fn read_record(
        &self,
        key: &StateKey,
        mut record: StateRecord,
    ) -> ReconcileResult<Refreshed> {
        self.transition(key, Phase::Reading);

        let remote = match self.resource.read(&record.handle.id).await {
            Ok(remote) => remote,
            Err(err) => match classify(Call::Read, RemoteOutcome::Failed(&err)) {
                Classification::RecoverableEmpty => {
                    self.store.delete(key).await?;
                    self.transition(key, Phase::Absent);
                    info!(key = %key, handle = %record.handle, "Remote object gone, dropped state");
                    return Ok(Refreshed::Absent);
                }
                _ => {
                    return Err(self.remote_error(
                        Call::Read,
                        &record.handle.id,
                        failure_detail(Call::Read, &err),
                    ))
                }
            },
        };

        let observed = self.write_back(&record.attributes, &remote);
        if observed != record.attributes {
            debug!(key = %key, "Recorded attributes changed after read");
            record.attributes = observed;
            record.updated_at = chrono::Utc::now();
            self.store.put(key, &record).await?;
        }

        Ok(Refreshed::Present {
            record,
            diagnostics: Diagnostics::new(),
        })
    }

    fn write_back(&self, recorded: &Attributes, remote: &Attributes) -> Attributes {
        let mut observed = recorded.clone();
        for spec in self.resource.schema().attributes {
            if spec.is_write_only() || !remote.contains(spec.name) {
                continue;
            }
            let value = suppress::write_back(
                spec.suppression,
                recorded.get(spec.name),
                remote.get(spec.name),
            );
            observed.set(spec.name, value);
        }
        observed
    }

    async fn update_locked(
        &self,
        key: &StateKey,
        record: StateRecord,
        declared: &Attributes,
    ) -> ReconcileResult<Report> {
        let resource_type = self.resource.resource_type();
        let (declared, mut diagnostics) = self.resource.schema().validate(declared)?;
        let changes = self.resource.schema().diff(&record.attributes, &declared);

        if let Some(change) = changes.iter().find(|change| change.force_new) {
            return Err(ReconcileError::UnsupportedMutation {
                resource_type,
                attribute: change.attribute.to_string(),
            });
        }

        if changes.is_empty() {
            debug!(key = %key, "Nothing to update");
            return match self.read_record(key, record).await? {
                Refreshed::Present { record, .. } => {
                    Ok(Report::new(Outcome::Read, Some(record.handle), diagnostics))
                }
                Refreshed::Absent => Ok(Report::new(Outcome::DriftedAbsent, None, diagnostics)),
            };
        }

        self.check_cancelled()?;
        self.transition(key, Phase::Updating);
        debug!(key = %key, attributes = ?changes.attributes(), "Updating in place");

        let update_diagnostics = self
            .resource
            .update(&record.handle.id, &changes, &declared)
            .await
            .map_err(|err| {
                self.remote_error(
                    Call::Update,
                    &record.handle.id,
                    format!("{}: {}", err.operation, failure_detail(Call::Update, &err.source)),
                )
            })?;

        for diagnostic in update_diagnostics.iter() {
            warn!(key = %key, diagnostic = %diagnostic, "Update completed with warning");
        }
        diagnostics.extend(update_diagnostics);

        let mut record = record;
        for (name, value) in declared.iter() {
            record.attributes.set(name, value);
        }
        record.updated_at = chrono::Utc::now();
        self.store.put(key, &record).await?;

        self.check_cancelled()?;

        match self.read_record(key, record).await? {
            Refreshed::Present {
                record,
                diagnostics: read,
            } => {
                diagnostics.extend(read);
                info!(key = %key, handle = %record.handle, "Updated resource");
                Ok(Report::new(Outcome::Updated, Some(record.handle), diagnostics))
            }
            Refreshed::Absent => Ok(Report::new(Outcome::DriftedAbsent, None, diagnostics)),
        }
    }

    async fn destroy_locked(&self, key: &StateKey, record: StateRecord) -> ReconcileResult<Report> {
        self.check_cancelled()?;
        self.transition(key, Phase::Deleting);

        let id = record.handle.id.clone();
        let result = self.resource.delete(&id).await;
        let outcome = match &result {
            Ok(response) => RemoteOutcome::Completed(response.status),
            Err(err) => RemoteOutcome::Failed(err),
        };

        match classify(Call::Delete, outcome) {
            Classification::Success | Classification::RecoverableEmpty => {
                self.store.delete(key).await?;
                self.transition(key, Phase::Deleted);
                info!(key = %key, handle = %record.handle, "Deleted resource");
                Ok(Report::new(
                    Outcome::DeletedClean,
                    Some(record.handle),
                    Diagnostics::new(),
                ))
            }
            Classification::Warning(detail) => {
                self.store.delete(key).await?;
                self.transition(key, Phase::Deleted);
                warn!(
                    key = %key,
                    handle = %record.handle,
                    detail = %detail,
                    "Delete returned unexpected status"
                );
                Ok(Report::new(
                    Outcome::DeleteUnexpectedStatus,
                    Some(record.handle),
                    Diagnostic::warning("unexpected delete status", detail).into(),
                ))
            }
            Classification::Fatal(detail) if is_delete_conflict(outcome) => {
                self.transition(key, Phase::Conflict);
                warn!(
                    key = %key,
                    handle = %record.handle,
                    detail = %detail,
                    "Delete blocked by conflict"
                );
                Err(ReconcileError::DeleteConflict {
                    resource_type: self.resource.resource_type(),
                    id,
                    detail,
                })
            }
            Classification::Fatal(detail) => Err(self.remote_error(Call::Delete, &id, detail)),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Load a record, migrating it to the current schema version.
    async fn load(&self, key: &StateKey) -> ReconcileResult<Option<StateRecord>> {
        let Some(mut record) = self.store.get(key).await? else {
            return Ok(None);
        };

        let expected = self.resource.resource_type();
        if record.resource_type != expected {
            return Err(ReconcileError::TypeMismatch {
                key: key.clone(),
                found: record.resource_type,
                expected,
            });
        }

        let current = self.resource.schema().version;
        if record.schema_version > current {
            return Err(ReconcileError::UnsupportedSchemaVersion {
                key: key.clone(),
                found: record.schema_version,
                supported: current,
            });
        }

        if record.schema_version < current {
            let from = record.schema_version;
            record.attributes = migrate::migrate(expected, &record.attributes, from);
            record.schema_version = current;
            self.store.put(key, &record).await?;
            info!(key = %key, from, to = current, "Migrated state record");
        }

        Ok(Some(record))
    }

    async fn load_managed(&self, key: &StateKey) -> ReconcileResult<StateRecord> {
        self.load(key)
            .await?
            .ok_or_else(|| ReconcileError::NotManaged(key.clone()))
    }

    fn check_cancelled(&self) -> ReconcileResult<()> {
        match &self.cancel {
            Some(cancel) if *cancel.borrow() => Err(ReconcileError::Cancelled),
            _ => Ok(()),
        }
    }

    fn transition(&self, key: &StateKey, phase: Phase) {
        debug!(key = %key, phase = %phase, "Phase transition");
    }

    fn remote_error(&self, operation: Call, id: &RemoteId, detail: String) -> ReconcileError {
        ReconcileError::Remote {
            operation,
            resource_type: self.resource.resource_type(),
            resource: id.to_string(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refreshed_outcomes() {
        assert_eq!(Refreshed::Absent.outcome(), Outcome::DriftedAbsent);
        assert!(Refreshed::Absent.record().is_none());
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&Outcome::DeleteUnexpectedStatus).unwrap();
        assert_eq!(json, "\"delete_unexpected_status\"");
        assert_eq!(Outcome::DriftedAbsent.to_string(), "drifted_absent");
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::Resolving.to_string(), "resolving");
        assert_eq!(Phase::Conflict.as_str(), "conflict");
    }
}
