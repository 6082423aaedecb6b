//! Stack definition: which parent kind to watch and how to render it.

use std::path::{Path, PathBuf};

use kube::core::{DynamicObject, GroupVersionKind};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::resource::{ObjectKey, split_api_version};
use crate::store::{Store, StoreError};
use crate::templating::{ManifestEngine, NopEngine, Overlay, TemplatingEngine};

pub const ENGINE_KUSTOMIZE: &str = "kustomize";
pub const ENGINE_MANIFEST: &str = "manifest";
pub const ENGINE_NOP: &str = "nop";

const NAMESPACE_SCOPED: &str = "Namespaced";

#[derive(thiserror::Error, Debug)]
pub enum StackError {
    #[error("could not fetch the stack definition: {0}")]
    Fetch(#[source] StoreError),
    #[error("invalid stack definition: {0}")]
    Invalid(#[source] serde_json::Error),
    #[error("stack definition does not name a parent kind")]
    MissingCrd,
    #[error("the engine type {0:?} is not supported")]
    UnsupportedEngine(String),
    #[error("scope is Namespaced but the stack definition has no namespace")]
    MissingNamespace,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    #[serde(default)]
    pub permission_scope: Option<String>,
    #[serde(default)]
    pub behavior: StackBehavior,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct StackBehavior {
    #[serde(default)]
    pub crd: CrdReference,
    #[serde(default)]
    pub engine: EngineConfiguration,
    #[serde(default)]
    pub source: Source,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrdReference {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct EngineConfiguration {
    #[serde(default, rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub kustomize: Option<KustomizeConfiguration>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct KustomizeConfiguration {
    #[serde(default)]
    pub overlays: Vec<Overlay>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Source {
    /// Sub-directory of the resources directory holding the manifests.
    #[serde(default)]
    pub path: String,
}

/// The parts of a stack definition the controller runs on.
#[derive(Clone, Debug, PartialEq)]
pub struct StackDefinition {
    pub name: String,
    pub namespace: Option<String>,
    pub spec: StackSpec,
}

impl StackDefinition {
    pub fn from_object(obj: &DynamicObject) -> Result<Self, StackError> {
        let spec = match obj.data.get("spec") {
            Some(v) => {
                serde_json::from_value(v.clone()).map_err(StackError::Invalid)?
            }
            None => StackSpec::default(),
        };
        Ok(Self {
            name: obj.metadata.name.clone().unwrap_or_default(),
            namespace: obj.metadata.namespace.clone(),
            spec,
        })
    }

    pub fn parent_gvk(&self) -> Result<GroupVersionKind, StackError> {
        let crd = &self.spec.behavior.crd;
        if crd.api_version.is_empty() || crd.kind.is_empty() {
            return Err(StackError::MissingCrd);
        }
        let (group, version) = split_api_version(&crd.api_version);
        Ok(GroupVersionKind::gvk(&group, &version, &crd.kind))
    }

    /// Namespace the controller is confined to, if any. An explicit
    /// override wins over the stack's permission scope.
    pub fn watch_namespace(
        &self,
        explicit: Option<&str>,
    ) -> Result<Option<String>, StackError> {
        if let Some(ns) = explicit.filter(|ns| !ns.is_empty()) {
            return Ok(Some(ns.to_string()));
        }
        if self.spec.permission_scope.as_deref() != Some(NAMESPACE_SCOPED) {
            return Ok(None);
        }
        match self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            Some(ns) => Ok(Some(ns.to_string())),
            None => Err(StackError::MissingNamespace),
        }
    }

    pub fn resource_path(&self, resources_dir: &Path) -> PathBuf {
        let sub = self.spec.behavior.source.path.trim_start_matches('/');
        if sub.is_empty() {
            resources_dir.to_path_buf()
        } else {
            resources_dir.join(sub)
        }
    }

    pub fn engine(
        &self,
        resources_dir: &Path,
    ) -> Result<Box<dyn TemplatingEngine>, StackError> {
        let engine = &self.spec.behavior.engine;
        match engine.type_.as_str() {
            ENGINE_KUSTOMIZE | ENGINE_MANIFEST => {
                let overlays = engine
                    .kustomize
                    .as_ref()
                    .map(|k| k.overlays.clone())
                    .unwrap_or_default();
                let path = self.resource_path(resources_dir);
                info!(path = %path.display(), overlays = overlays.len(), "using manifest engine");
                Ok(Box::new(ManifestEngine::new(path).with_overlays(overlays)))
            }
            ENGINE_NOP => Ok(Box::new(NopEngine)),
            other => Err(StackError::UnsupportedEngine(other.to_string())),
        }
    }
}

/// Fetch the stack definition once, at startup.
pub async fn load_stack_definition(
    store: &dyn Store,
    key: &ObjectKey,
) -> Result<StackDefinition, StackError> {
    let obj = store.get(key).await.map_err(StackError::Fetch)?;
    StackDefinition::from_object(&obj)
}
