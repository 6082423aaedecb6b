use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::{self, ApiCapabilities, ApiResource, Scope};
use kube::Client;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::{Store, StoreError, from_kube};
use crate::resource::{ObjectKey, api_version_of};

type Resolved = (ApiResource, ApiCapabilities);

/// [`Store`] backed by the API server. Kinds are resolved through discovery
/// on first use and cached for the lifetime of the store.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    resources: Arc<RwLock<HashMap<String, Resolved>>>,
    field_manager: Option<String>,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: Arc::new(RwLock::new(HashMap::new())),
            field_manager: None,
        }
    }

    /// Name recorded in `managedFields` for writes made through this store.
    pub fn with_field_manager(mut self, manager: impl Into<String>) -> Self {
        self.field_manager = Some(manager.into());
        self
    }

    fn patch_params(&self) -> PatchParams {
        PatchParams {
            field_manager: self.field_manager.clone(),
            ..Default::default()
        }
    }

    pub async fn resolve(
        &self,
        gvk: &GroupVersionKind,
    ) -> Result<Resolved, StoreError> {
        let cache_key = format!("{}/{}", api_version_of(gvk), gvk.kind);
        let hit = self.resources.read().await.get(&cache_key).cloned();
        if let Some(resolved) = hit {
            trace!(%cache_key, "discovery: cache hit");
            return Ok(resolved);
        }
        let resolved = discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| StoreError::Discovery(cache_key.clone(), e))?;
        debug!(%cache_key, plural = %resolved.0.plural, "discovery: resolved kind");
        self.resources
            .write()
            .await
            .insert(cache_key, resolved.clone());
        Ok(resolved)
    }

    async fn api_for(
        &self,
        key: &ObjectKey,
    ) -> Result<Api<DynamicObject>, StoreError> {
        let (ar, caps) = self.resolve(&key.gvk).await?;
        let client = self.client.clone();
        Ok(match (caps.scope, key.namespace.as_deref()) {
            (Scope::Cluster, _) => Api::all_with(client, &ar),
            (Scope::Namespaced, Some(ns)) => {
                Api::namespaced_with(client, ns, &ar)
            }
            (Scope::Namespaced, None) => {
                Api::default_namespaced_with(client, &ar)
            }
        })
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        let api = self.api_for(key).await?;
        api.get(&key.name).await.map_err(from_kube)
    }

    async fn create(
        &self,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::of(obj)?;
        let api = self.api_for(&key).await?;
        let pp = PostParams {
            field_manager: self.field_manager.clone(),
            ..Default::default()
        };
        api.create(&pp, obj)
            .await
            .map_err(from_kube)
    }

    async fn patch(
        &self,
        key: &ObjectKey,
        patch: &JsonValue,
    ) -> Result<DynamicObject, StoreError> {
        let api = self.api_for(key).await?;
        api.patch(&key.name, &self.patch_params(), &Patch::Merge(patch))
            .await
            .map_err(from_kube)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let api = self.api_for(key).await?;
        api.delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(from_kube)
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &JsonValue,
    ) -> Result<(), StoreError> {
        let api = self.api_for(key).await?;
        api.patch_status(
            &key.name,
            &self.patch_params(),
            &Patch::Merge(patch),
        )
        .await
        .map(|_| ())
        .map_err(from_kube)
    }
}
