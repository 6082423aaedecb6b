//! Parent and child resource model.
//!
//! Both sides of a reconcile are untyped Kubernetes objects: the parent is
//! whatever kind the stack definition names, and children are whatever the
//! templating engine renders. Deep copies are plain `Clone`s.

pub mod condition;
pub mod meta;

use std::fmt;

use kube::ResourceExt;
use kube::core::{DynamicObject, GroupVersionKind};

pub use condition::{
    Condition, ConditionStatus, conditions, reconcile_error,
    reconcile_success, set_conditions,
};
pub use meta::*;

/// The object driving a reconcile. Carries configuration and status.
pub type ParentResource = DynamicObject;

/// An object rendered from the parent and converged against the store.
pub type ChildResource = DynamicObject;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("object {0} has no apiVersion/kind")]
    MissingType(String),
    #[error("object of kind {0} has no name")]
    MissingName(String),
}

/// Identity used to address an object in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectKey {
    pub gvk: GroupVersionKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        gvk: GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Self {
        Self {
            gvk,
            namespace: namespace
                .filter(|ns| !ns.is_empty())
                .map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn of(obj: &DynamicObject) -> Result<Self, KeyError> {
        let gvk = gvk_of(obj)?;
        let name = obj
            .metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| KeyError::MissingName(gvk.kind.clone()))?;
        Ok(Self::new(gvk, obj.namespace().as_deref(), name))
    }

    pub fn api_version(&self) -> String {
        api_version_of(&self.gvk)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(
                f,
                "{}/{}/{}/{}",
                self.api_version(),
                self.gvk.kind,
                ns,
                self.name
            ),
            None => write!(
                f,
                "{}/{}/{}",
                self.api_version(),
                self.gvk.kind,
                self.name
            ),
        }
    }
}

/// Split `group/version` (or a bare core `version`) into its parts.
pub fn split_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

pub fn api_version_of(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

pub fn gvk_of(obj: &DynamicObject) -> Result<GroupVersionKind, KeyError> {
    let types = obj
        .types
        .as_ref()
        .filter(|t| !t.api_version.is_empty() && !t.kind.is_empty())
        .ok_or_else(|| KeyError::MissingType(obj.name_any()))?;
    let (group, version) = split_api_version(&types.api_version);
    Ok(GroupVersionKind::gvk(&group, &version, &types.kind))
}

/// Human readable `group/version, Kind=kind`, used in condition messages.
pub fn describe_gvk(gvk: &GroupVersionKind) -> String {
    format!("{}, Kind={}", api_version_of(gvk), gvk.kind)
}
