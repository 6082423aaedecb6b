//! Priority ordered teardown of child resources.

use std::num::ParseIntError;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use crate::policy::AnnotationPolicy;
use crate::resource::{
    ChildResource, KeyError, ObjectKey, ParentResource, controller_of,
    is_controlled_by,
};
use crate::store::{Store, StoreError};

#[derive(thiserror::Error, Debug)]
pub enum DeleteError {
    #[error("cannot convert deletion priority into integer: {name}: {source}")]
    Priority {
        name: String,
        #[source]
        source: ParseIntError,
    },
    #[error("could not get child resource: {0}")]
    Get(#[source] StoreError),
    #[error("child resource is not controlled by given parent: {0}")]
    NotController(String),
    #[error("cannot delete child resource: {0}")]
    Delete(#[source] StoreError),
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Deletes one priority class of children per call. Callers keep calling
/// until an empty batch comes back, which means nothing is left.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChildResourceDeleter: Send + Sync {
    async fn delete(
        &self,
        parent: &ParentResource,
        children: Vec<ChildResource>,
    ) -> Result<Vec<ChildResource>, DeleteError>;
}

/// Highest deletion priority goes first; equal priorities go together.
pub struct OrderedDeleter {
    store: Arc<dyn Store>,
    policy: AnnotationPolicy,
}

impl OrderedDeleter {
    pub fn new(store: Arc<dyn Store>, policy: AnnotationPolicy) -> Self {
        Self { store, policy }
    }

    /// Children still present in the store with their priority.
    async fn existing(
        &self,
        children: Vec<ChildResource>,
    ) -> Result<Vec<(i64, ChildResource)>, DeleteError> {
        let mut found = Vec::with_capacity(children.len());
        for child in children {
            let priority =
                self.policy.deletion_priority(&child).map_err(|source| {
                    DeleteError::Priority {
                        name: child.name_any(),
                        source,
                    }
                })?;
            let key = ObjectKey::of(&child)?;
            match self.store.get(&key).await {
                Ok(live) => found.push((priority, live)),
                Err(e) if e.is_not_found() => {
                    debug!(%key, "deleter: already gone");
                }
                Err(e) => return Err(DeleteError::Get(e)),
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl ChildResourceDeleter for OrderedDeleter {
    async fn delete(
        &self,
        parent: &ParentResource,
        children: Vec<ChildResource>,
    ) -> Result<Vec<ChildResource>, DeleteError> {
        let existing = self.existing(children).await?;
        let Some(highest) = existing.iter().map(|(p, _)| *p).max() else {
            return Ok(Vec::new());
        };
        let batch: Vec<ChildResource> = existing
            .into_iter()
            .filter(|(p, _)| *p == highest)
            .map(|(_, c)| c)
            .collect();

        for child in &batch {
            if controller_of(child).is_some() && !is_controlled_by(child, parent)
            {
                return Err(DeleteError::NotController(
                    ObjectKey::of(child)?.to_string(),
                ));
            }
        }

        info!(
            parent = %parent.name_any(),
            priority = highest,
            count = batch.len(),
            "deleter: deleting batch"
        );
        for child in &batch {
            let key = ObjectKey::of(child)?;
            match self.store.delete(&key).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(DeleteError::Delete(e)),
            }
        }
        Ok(batch)
    }
}
