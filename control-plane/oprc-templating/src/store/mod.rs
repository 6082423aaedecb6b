//! The slice of the Kubernetes API the reconciler consumes.

mod kube_store;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use kube::core::DynamicObject;
use serde_json::Value as JsonValue;

use crate::resource::{KeyError, ObjectKey};

pub use kube_store::KubeStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("cannot discover api resource for {0}: {1}")]
    Discovery(String, #[source] kube::Error),
    #[error("kubernetes api error: {0}")]
    Api(#[source] kube::Error),
    #[error("cannot serialize object: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Key(#[from] KeyError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Map API errors onto the store's sentinels.
pub fn from_kube(err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound,
        kube::Error::Api(ae) if ae.code == 409 => {
            StoreError::Conflict(ae.message)
        }
        e => StoreError::Api(e),
    }
}

/// Get/create/patch/delete on arbitrary objects plus status writes.
///
/// All calls return [`StoreError::NotFound`] when the addressed object does
/// not exist so callers can branch on it without inspecting API codes.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject, StoreError>;

    async fn create(
        &self,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// JSON merge patch against the main resource.
    async fn patch(
        &self,
        key: &ObjectKey,
        patch: &JsonValue,
    ) -> Result<DynamicObject, StoreError>;

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// JSON merge patch against the status subresource.
    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &JsonValue,
    ) -> Result<(), StoreError>;
}
