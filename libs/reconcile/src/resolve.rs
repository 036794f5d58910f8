//! Natural-key resolution.
//!
//! Before creating, look for an existing remote object with the declared
//! natural key. An object owned by the declared organization is adopted; one
//! owned by anybody else is a conflict. Resolution never mutates anything.

use tracing::debug;
use warden_id::OrgId;

use crate::attributes::Attributes;
use crate::classify::{classify, Call, Classification, RemoteOutcome};
use crate::error::ReconcileError;
use crate::resource::{RemoteObject, Resource, ResourceHandle};

/// An existing remote object that may be adopted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Natural key the object was found under.
    pub key: String,
    pub handle: ResourceHandle,
    pub object: RemoteObject,
}

/// Look up `declared` by natural key.
///
/// Returns `Ok(None)` when the type has no natural key or no object holds it.
pub async fn resolve<R>(
    resource: &R,
    declared: &Attributes,
) -> Result<Option<Resolution>, ReconcileError>
where
    R: Resource + ?Sized,
{
    let Some(key) = resource.natural_key(declared) else {
        return Ok(None);
    };

    let object = match resource.find_by_natural_key(&key).await {
        Ok(object) => object,
        Err(err) => match classify(Call::Resolve, RemoteOutcome::Failed(&err)) {
            Classification::RecoverableEmpty => {
                debug!(key = %key, "No existing object for natural key");
                return Ok(None);
            }
            _ => {
                return Err(ReconcileError::Remote {
                    operation: Call::Resolve,
                    resource_type: resource.resource_type(),
                    resource: key,
                    detail: err.to_string(),
                })
            }
        },
    };

    let declared_org = declared.get(resource.organization_attribute());

    if object.organization != declared_org {
        return Err(ReconcileError::OwnershipConflict {
            resource_type: resource.resource_type(),
            key,
            owner: object.organization,
            declared: declared_org.to_string(),
        });
    }

    let organization = OrgId::parse(declared_org)
        .map_err(|e| ReconcileError::InvalidDeclaration(e.to_string()))?;

    debug!(key = %key, id = %object.id, "Found existing object for natural key");
    Ok(Some(Resolution {
        key,
        handle: ResourceHandle {
            id: object.id.clone(),
            organization,
        },
        object,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, DeleteResponse};
    use crate::attributes::{AttributeSpec, ChangeSet, Schema};
    use crate::diag::Diagnostics;
    use crate::resource::{ResourceType, UpdateError};
    use async_trait::async_trait;
    use warden_id::RemoteId;

    static SCHEMA: Schema = Schema {
        version: 1,
        attributes: &[AttributeSpec::required("name"), AttributeSpec::required("org")],
    };

    /// Resource whose natural-key lookup returns a fixed answer.
    struct Lookup(Result<RemoteObject, ApiError>);

    #[async_trait]
    impl Resource for Lookup {
        fn resource_type(&self) -> ResourceType {
            ResourceType::User
        }

        fn schema(&self) -> &'static Schema {
            &SCHEMA
        }

        fn organization_attribute(&self) -> &'static str {
            "org"
        }

        fn natural_key(&self, declared: &Attributes) -> Option<String> {
            Some(declared.get("name").to_string())
        }

        async fn find_by_natural_key(&self, _key: &str) -> Result<RemoteObject, ApiError> {
            self.0.clone()
        }

        async fn create(&self, _declared: &Attributes) -> Result<RemoteObject, ApiError> {
            unreachable!("resolution never creates")
        }

        async fn read(&self, _id: &RemoteId) -> Result<Attributes, ApiError> {
            unreachable!("resolution never reads")
        }

        async fn update(
            &self,
            _id: &RemoteId,
            _changes: &ChangeSet,
            _declared: &Attributes,
        ) -> Result<Diagnostics, UpdateError> {
            unreachable!("resolution never updates")
        }

        async fn delete(&self, _id: &RemoteId) -> Result<DeleteResponse, ApiError> {
            unreachable!("resolution never deletes")
        }
    }

    fn found(org: &str) -> Lookup {
        Lookup(Ok(RemoteObject {
            id: RemoteId::parse("u-1").unwrap(),
            organization: org.to_string(),
            computed: Attributes::new(),
        }))
    }

    fn declared() -> Attributes {
        Attributes::new().with("name", "foo").with("org", "org-1")
    }

    #[tokio::test]
    async fn test_owned_match_is_adoptable() {
        let resolution = resolve(&found("org-1"), &declared()).await.unwrap().unwrap();
        assert_eq!(resolution.key, "foo");
        assert_eq!(resolution.handle.id.as_str(), "u-1");
        assert_eq!(resolution.handle.organization.as_str(), "org-1");
    }

    #[tokio::test]
    async fn test_foreign_owner_conflicts() {
        let err = resolve(&found("org-2"), &declared()).await.unwrap_err();
        match err {
            ReconcileError::OwnershipConflict { owner, declared, .. } => {
                assert_eq!(owner, "org-2");
                assert_eq!(declared, "org-1");
            }
            other => panic!("expected ownership conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_results_resolve_to_none() {
        let lookup = Lookup(Err(ApiError::EmptyResults));
        assert!(resolve(&lookup, &declared()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_fatal() {
        let lookup = Lookup(Err(ApiError::Transport("timeout".to_string())));
        let err = resolve(&lookup, &declared()).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Remote {
                operation: Call::Resolve,
                ..
            }
        ));
    }
}
