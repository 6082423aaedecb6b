//! Create-or-patch of a single rendered child.

use kube::ResourceExt;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::resource::{ChildResource, KeyError, ObjectKey};
use crate::store::{Store, StoreError};

#[derive(thiserror::Error, Debug)]
pub enum ApplyError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("could not get child resource: {0}")]
    Get(#[source] StoreError),
    #[error("could not create child resource: {0}")]
    Create(#[source] StoreError),
    #[error("could not patch child resource: {0}")]
    Patch(#[source] StoreError),
    #[error("cannot encode child resource: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Converge the stored object towards `child`.
///
/// A missing object is created. An existing one receives the rendered
/// content as a merge patch pinned to the stored resource version; fields
/// the template does not mention are left alone.
pub async fn apply(
    store: &dyn Store,
    child: &ChildResource,
) -> Result<(), ApplyError> {
    let key = ObjectKey::of(child)?;
    let current = match store.get(&key).await {
        Ok(obj) => obj,
        Err(e) if e.is_not_found() => {
            debug!(%key, "apply: creating");
            store.create(child).await.map_err(ApplyError::Create)?;
            return Ok(());
        }
        Err(e) => return Err(ApplyError::Get(e)),
    };

    let mut patch = serde_json::to_value(child)?;
    if let Some(meta) = patch
        .as_object_mut()
        .and_then(|o| o.get_mut("metadata"))
        .and_then(JsonValue::as_object_mut)
    {
        meta.insert(
            "resourceVersion".to_string(),
            current.resource_version().map_or(JsonValue::Null, JsonValue::from),
        );
    }
    debug!(%key, "apply: patching");
    store.patch(&key, &patch).await.map_err(ApplyError::Patch)?;
    Ok(())
}
