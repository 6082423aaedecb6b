use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
#[cfg(test)]
use mockall::automock;
use serde_json::json;
use tracing::info;

use crate::resource::{ObjectKey, ParentResource, has_finalizer};
use crate::store::{Store, StoreError};

pub const FINALIZER: &str = "templating.oaas.io/finalizer";

/// Keeps the parent around until its children are torn down.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn add_finalizer(
        &self,
        parent: &mut ParentResource,
    ) -> Result<(), StoreError>;

    async fn remove_finalizer(
        &self,
        parent: &mut ParentResource,
    ) -> Result<(), StoreError>;
}

/// Writes the finalizer list with a merge patch pinned to the parent's
/// resource version. A stale parent fails with a conflict.
pub struct ApiFinalizer {
    store: Arc<dyn Store>,
    token: String,
}

impl ApiFinalizer {
    pub fn new(store: Arc<dyn Store>, token: impl Into<String>) -> Self {
        Self {
            store,
            token: token.into(),
        }
    }

    async fn write(
        &self,
        parent: &mut ParentResource,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let key = ObjectKey::of(parent)?;
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": parent.resource_version(),
            }
        });
        let updated = self.store.patch(&key, &patch).await?;
        parent.metadata.finalizers = updated.metadata.finalizers;
        parent.metadata.resource_version = updated.metadata.resource_version;
        Ok(())
    }
}

#[async_trait]
impl Finalizer for ApiFinalizer {
    async fn add_finalizer(
        &self,
        parent: &mut ParentResource,
    ) -> Result<(), StoreError> {
        if has_finalizer(parent, &self.token) {
            return Ok(());
        }
        info!(name = %parent.name_any(), "finalizer: adding");
        let mut finalizers = parent.finalizers().to_vec();
        finalizers.push(self.token.clone());
        self.write(parent, finalizers).await
    }

    async fn remove_finalizer(
        &self,
        parent: &mut ParentResource,
    ) -> Result<(), StoreError> {
        if !has_finalizer(parent, &self.token) {
            return Ok(());
        }
        info!(name = %parent.name_any(), "finalizer: removing");
        let finalizers: Vec<String> = parent
            .finalizers()
            .iter()
            .filter(|f| **f != self.token)
            .cloned()
            .collect();
        self.write(parent, finalizers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::*;
    use crate::store::fake::{FakeStore, Op};

    fn setup(p: &ParentResource) -> (Arc<FakeStore>, ApiFinalizer, ParentResource) {
        let store = Arc::new(FakeStore::with_objects([p.clone()]));
        let stored = store.object(&ObjectKey::of(p).unwrap()).unwrap();
        let finalizer = ApiFinalizer::new(store.clone(), FINALIZER);
        (store, finalizer, stored)
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let (store, finalizer, mut p) = setup(&parent("default", "blog"));

        finalizer.add_finalizer(&mut p).await.unwrap();
        finalizer.add_finalizer(&mut p).await.unwrap();

        assert_eq!(p.finalizers(), [FINALIZER]);
        assert_eq!(store.calls(Op::Patch).len(), 1);
        let stored = store.object(&ObjectKey::of(&p).unwrap()).unwrap();
        assert_eq!(stored.finalizers(), [FINALIZER]);
        assert_eq!(stored.resource_version(), p.resource_version());
    }

    #[tokio::test]
    async fn remove_keeps_foreign_finalizers() {
        let mut initial = parent("default", "blog");
        initial.metadata.finalizers =
            Some(vec!["other.io/keep".into(), FINALIZER.into()]);
        let (store, finalizer, mut p) = setup(&initial);

        finalizer.remove_finalizer(&mut p).await.unwrap();
        finalizer.remove_finalizer(&mut p).await.unwrap();

        assert_eq!(p.finalizers(), ["other.io/keep"]);
        assert_eq!(store.calls(Op::Patch).len(), 1);
    }

    #[tokio::test]
    async fn stale_parent_conflicts() {
        let (store, finalizer, mut p) = setup(&parent("default", "blog"));
        p.metadata.resource_version = Some("0".into());

        let err = finalizer.add_finalizer(&mut p).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        let stored = store.object(&ObjectKey::of(&p).unwrap()).unwrap();
        assert!(stored.finalizers().is_empty());
    }
}
