use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube::core::DynamicObject;

use super::{KeyError, gvk_of};

/// Controller reference pointing at `parent`, blocking its foreground
/// deletion until the child is gone.
pub fn controller_reference(
    parent: &DynamicObject,
) -> Result<OwnerReference, KeyError> {
    gvk_of(parent)?;
    let Some(types) = parent.types.as_ref() else {
        return Err(KeyError::MissingType(parent.name_any()));
    };
    Ok(OwnerReference {
        api_version: types.api_version.clone(),
        kind: types.kind.clone(),
        name: parent.name_any(),
        uid: parent.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Add `reference`, replacing any existing reference to the same uid.
pub fn add_owner_reference(obj: &mut DynamicObject, reference: OwnerReference) {
    let refs = obj.owner_references_mut();
    match refs.iter_mut().find(|r| r.uid == reference.uid) {
        Some(existing) => *existing = reference,
        None => refs.push(reference),
    }
}

pub fn controller_of(obj: &DynamicObject) -> Option<&OwnerReference> {
    obj.owner_references()
        .iter()
        .find(|r| r.controller.unwrap_or(false))
}

pub fn is_controlled_by(obj: &DynamicObject, owner: &DynamicObject) -> bool {
    match (controller_of(obj), owner.metadata.uid.as_deref()) {
        (Some(r), Some(uid)) => r.uid == uid,
        _ => false,
    }
}

/// Union `labels` into the object's labels; incoming values win.
pub fn add_labels(obj: &mut DynamicObject, labels: &BTreeMap<String, String>) {
    if labels.is_empty() {
        return;
    }
    let current = obj.labels_mut();
    for (k, v) in labels {
        current.insert(k.clone(), v.clone());
    }
}

pub fn remove_annotations(obj: &mut DynamicObject, keys: &[&str]) {
    let Some(annotations) = obj.metadata.annotations.as_mut() else {
        return;
    };
    for key in keys {
        annotations.remove(*key);
    }
}

pub fn was_deleted(obj: &DynamicObject) -> bool {
    obj.metadata.deletion_timestamp.is_some()
}

pub fn has_finalizer(obj: &DynamicObject, token: &str) -> bool {
    obj.finalizers().iter().any(|f| f == token)
}
