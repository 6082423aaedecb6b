//! Mutation passes run over rendered children before they are applied.

mod builtin;

pub use builtin::{
    DefaultingAnnotationRemover, LabelPropagator, NamespacePatcher,
    OwnerReferenceAdder, ParentLabelSetAdder,
};

use crate::policy::{AnnotationPolicy, SharedDependencyPolicy};
use crate::resource::{ChildResource, KeyError, ParentResource};

#[derive(thiserror::Error, Debug)]
pub enum PatchError {
    #[error("parent resource identity is incomplete: {0}")]
    ParentIdentity(#[from] KeyError),
    #[error("parent resource has no uid")]
    MissingParentUid,
}

pub trait ChildResourcePatcher: Send + Sync {
    fn patch(
        &self,
        parent: &ParentResource,
        children: Vec<ChildResource>,
    ) -> Result<Vec<ChildResource>, PatchError>;
}

/// Adapts a plain function into a [`ChildResourcePatcher`].
pub struct PatcherFn<F>(F);

impl<F> PatcherFn<F>
where
    F: Fn(&ParentResource, Vec<ChildResource>) -> Result<Vec<ChildResource>, PatchError>
        + Send
        + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ChildResourcePatcher for PatcherFn<F>
where
    F: Fn(&ParentResource, Vec<ChildResource>) -> Result<Vec<ChildResource>, PatchError>
        + Send
        + Sync,
{
    fn patch(
        &self,
        parent: &ParentResource,
        children: Vec<ChildResource>,
    ) -> Result<Vec<ChildResource>, PatchError> {
        (self.0)(parent, children)
    }
}

/// Patchers run left to right, each receiving the previous output. The
/// first error stops the chain.
#[derive(Default)]
pub struct PatcherChain {
    patchers: Vec<Box<dyn ChildResourcePatcher>>,
}

impl PatcherChain {
    pub fn push(mut self, patcher: impl ChildResourcePatcher + 'static) -> Self {
        self.patchers.push(Box::new(patcher));
        self
    }

    /// Owner references, defaulting annotation removal, namespace, parent
    /// labels, parent linkage labels; in that order.
    pub fn defaults(
        annotations: &AnnotationPolicy,
        shared: &SharedDependencyPolicy,
    ) -> Self {
        Self::default()
            .push(OwnerReferenceAdder::new(shared.clone()))
            .push(DefaultingAnnotationRemover::new(annotations.clone()))
            .push(NamespacePatcher)
            .push(LabelPropagator)
            .push(ParentLabelSetAdder)
    }
}

impl ChildResourcePatcher for PatcherChain {
    fn patch(
        &self,
        parent: &ParentResource,
        children: Vec<ChildResource>,
    ) -> Result<Vec<ChildResource>, PatchError> {
        self.patchers
            .iter()
            .try_fold(children, |current, p| p.patch(parent, current))
    }
}
