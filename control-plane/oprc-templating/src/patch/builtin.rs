use std::collections::BTreeMap;

use kube::ResourceExt;

use super::{ChildResourcePatcher, PatchError};
use crate::policy::{
    AnnotationPolicy, LABEL_PARENT_GROUP, LABEL_PARENT_KIND, LABEL_PARENT_NAME,
    LABEL_PARENT_NAMESPACE, LABEL_PARENT_VERSION, SharedDependencyPolicy,
};
use crate::resource::{
    ChildResource, ParentResource, add_labels, add_owner_reference,
    controller_reference, gvk_of, remove_annotations,
};

/// Makes the parent the controller of every child except shared
/// dependencies, which have to outlive any single parent.
#[derive(Clone, Debug, Default)]
pub struct OwnerReferenceAdder {
    shared: SharedDependencyPolicy,
}

impl OwnerReferenceAdder {
    pub fn new(shared: SharedDependencyPolicy) -> Self {
        Self { shared }
    }
}

impl ChildResourcePatcher for OwnerReferenceAdder {
    fn patch(
        &self,
        parent: &ParentResource,
        mut children: Vec<ChildResource>,
    ) -> Result<Vec<ChildResource>, PatchError> {
        if parent.uid().is_none_or(|u| u.is_empty()) {
            return Err(PatchError::MissingParentUid);
        }
        let reference = controller_reference(parent)?;
        for child in children.iter_mut() {
            if self.shared.matches(child) {
                continue;
            }
            add_owner_reference(child, reference.clone());
        }
        Ok(children)
    }
}

/// Strips the defaulting annotation from children when the parent asks
/// for it.
#[derive(Clone, Debug, Default)]
pub struct DefaultingAnnotationRemover {
    policy: AnnotationPolicy,
}

impl DefaultingAnnotationRemover {
    pub fn new(policy: AnnotationPolicy) -> Self {
        Self { policy }
    }
}

impl ChildResourcePatcher for DefaultingAnnotationRemover {
    fn patch(
        &self,
        parent: &ParentResource,
        mut children: Vec<ChildResource>,
    ) -> Result<Vec<ChildResource>, PatchError> {
        if !self.policy.remove_defaulting_requested(parent) {
            return Ok(children);
        }
        for child in children.iter_mut() {
            remove_annotations(child, &[self.policy.defaulting_key.as_str()]);
        }
        Ok(children)
    }
}

/// Fills empty child namespaces with the parent's.
#[derive(Clone, Copy, Debug, Default)]
pub struct NamespacePatcher;

impl ChildResourcePatcher for NamespacePatcher {
    fn patch(
        &self,
        parent: &ParentResource,
        mut children: Vec<ChildResource>,
    ) -> Result<Vec<ChildResource>, PatchError> {
        let Some(ns) = parent.namespace().filter(|ns| !ns.is_empty()) else {
            return Ok(children);
        };
        for child in children.iter_mut() {
            if child.namespace().is_none_or(|c| c.is_empty()) {
                child.metadata.namespace = Some(ns.clone());
            }
        }
        Ok(children)
    }
}

/// Copies every parent label onto every child.
#[derive(Clone, Copy, Debug, Default)]
pub struct LabelPropagator;

impl ChildResourcePatcher for LabelPropagator {
    fn patch(
        &self,
        parent: &ParentResource,
        mut children: Vec<ChildResource>,
    ) -> Result<Vec<ChildResource>, PatchError> {
        for child in children.iter_mut() {
            add_labels(child, parent.labels());
        }
        Ok(children)
    }
}

/// Labels linking each child back to its parent, usable for lookups that
/// do not go through owner references.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParentLabelSetAdder;

impl ParentLabelSetAdder {
    pub fn labels_for(
        parent: &ParentResource,
    ) -> Result<BTreeMap<String, String>, PatchError> {
        let gvk = gvk_of(parent)?;
        let mut labels = BTreeMap::from([
            (LABEL_PARENT_GROUP.to_string(), gvk.group),
            (LABEL_PARENT_VERSION.to_string(), gvk.version),
            (LABEL_PARENT_KIND.to_string(), gvk.kind),
            (LABEL_PARENT_NAME.to_string(), parent.name_any()),
        ]);
        if let Some(ns) = parent.namespace().filter(|ns| !ns.is_empty()) {
            labels.insert(LABEL_PARENT_NAMESPACE.to_string(), ns);
        }
        Ok(labels)
    }
}

impl ChildResourcePatcher for ParentLabelSetAdder {
    fn patch(
        &self,
        parent: &ParentResource,
        mut children: Vec<ChildResource>,
    ) -> Result<Vec<ChildResource>, PatchError> {
        let labels = Self::labels_for(parent)?;
        for child in children.iter_mut() {
            add_labels(child, &labels);
        }
        Ok(children)
    }
}
