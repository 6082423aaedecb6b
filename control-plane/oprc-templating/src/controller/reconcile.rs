use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use kube::core::GroupVersionKind;
use kube::runtime::controller::Action;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, instrument, warn};

use super::ReconcileError;
use crate::apply::{ApplyError, apply};
use crate::deleter::{ChildResourceDeleter, DeleteError, OrderedDeleter};
use crate::finalizer::{ApiFinalizer, FINALIZER, Finalizer};
use crate::patch::{ChildResourcePatcher, PatchError, PatcherChain};
use crate::policy::{AnnotationPolicy, SharedDependencyPolicy};
use crate::resource::{
    ChildResource, Condition, ObjectKey, ParentResource, describe_gvk, gvk_of,
    reconcile_error, reconcile_success, set_conditions, was_deleted,
};
use crate::store::{Store, StoreError};
use crate::templating::{NopEngine, TemplatingEngine, TemplatingError};

pub const DEFAULT_SHORT_WAIT: Duration = Duration::from_secs(30);
pub const DEFAULT_LONG_WAIT: Duration = Duration::from_secs(60);
pub const DEFAULT_TINY_WAIT: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(60);

const WAITING_FOR_CHILDREN: &str = "waiting for deletion of child resources";

/// What to do with the parent after a reconcile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub requeue_after: Option<Duration>,
}

impl Outcome {
    pub fn done() -> Self {
        Self {
            requeue_after: None,
        }
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }

    pub fn into_action(self) -> Action {
        match self.requeue_after {
            Some(d) => Action::requeue(d),
            None => Action::await_change(),
        }
    }
}

/// Failures recorded on the parent's condition rather than returned.
#[derive(thiserror::Error, Debug)]
enum SyncFailure {
    #[error("templating operation failed: {0}")]
    Templating(#[source] TemplatingError),
    #[error("child resource patchers failed: {0}")]
    Patch(#[source] PatchError),
    #[error("cannot run deleter: {0}")]
    Delete(#[source] DeleteError),
    #[error("cannot remove finalizer from parent resource: {0}")]
    RemoveFinalizer(#[source] StoreError),
    #[error("cannot add finalizer to parent resource: {0}")]
    AddFinalizer(#[source] StoreError),
    #[error("apply failed: {name}/{namespace} of type {gvk}: {source}")]
    Apply {
        name: String,
        namespace: String,
        gvk: String,
        #[source]
        source: ApplyError,
    },
}

/// Drives one parent kind: render, patch, then converge or tear down.
///
/// Immutable once built; share it behind an `Arc`.
pub struct Reconciler {
    store: Arc<dyn Store>,
    parent_gvk: GroupVersionKind,
    engine: Arc<dyn TemplatingEngine>,
    patchers: Box<dyn ChildResourcePatcher>,
    deleter: Box<dyn ChildResourceDeleter>,
    finalizer: Box<dyn Finalizer>,
    short_wait: Duration,
    long_wait: Duration,
    tiny_wait: Duration,
    timeout: Duration,
}

pub struct ReconcilerBuilder {
    store: Arc<dyn Store>,
    parent_gvk: GroupVersionKind,
    engine: Option<Box<dyn TemplatingEngine>>,
    patchers: Option<Box<dyn ChildResourcePatcher>>,
    deleter: Option<Box<dyn ChildResourceDeleter>>,
    finalizer: Option<Box<dyn Finalizer>>,
    annotations: AnnotationPolicy,
    shared: SharedDependencyPolicy,
    finalizer_token: String,
    short_wait: Duration,
    long_wait: Duration,
    tiny_wait: Duration,
    timeout: Duration,
}

impl ReconcilerBuilder {
    pub fn engine(mut self, engine: Box<dyn TemplatingEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn patchers(
        mut self,
        patchers: impl ChildResourcePatcher + 'static,
    ) -> Self {
        self.patchers = Some(Box::new(patchers));
        self
    }

    pub fn deleter(
        mut self,
        deleter: impl ChildResourceDeleter + 'static,
    ) -> Self {
        self.deleter = Some(Box::new(deleter));
        self
    }

    pub fn finalizer(mut self, finalizer: impl Finalizer + 'static) -> Self {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    pub fn annotation_policy(mut self, policy: AnnotationPolicy) -> Self {
        self.annotations = policy;
        self
    }

    pub fn shared_dependencies(mut self, policy: SharedDependencyPolicy) -> Self {
        self.shared = policy;
        self
    }

    pub fn finalizer_token(mut self, token: impl Into<String>) -> Self {
        self.finalizer_token = token.into();
        self
    }

    pub fn short_wait(mut self, d: Duration) -> Self {
        self.short_wait = d;
        self
    }

    pub fn long_wait(mut self, d: Duration) -> Self {
        self.long_wait = d;
        self
    }

    pub fn tiny_wait(mut self, d: Duration) -> Self {
        self.tiny_wait = d;
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    /// Unset collaborators fall back to the stock ones: no-op engine,
    /// default patch chain, ordered deleter and API finalizer.
    pub fn build(self) -> Reconciler {
        let store = self.store;
        let annotations = self.annotations;
        let shared = self.shared;
        let token = self.finalizer_token;
        Reconciler {
            engine: match self.engine {
                Some(engine) => Arc::from(engine),
                None => Arc::new(NopEngine),
            },
            patchers: self.patchers.unwrap_or_else(|| {
                Box::new(PatcherChain::defaults(&annotations, &shared))
            }),
            deleter: self.deleter.unwrap_or_else(|| {
                Box::new(OrderedDeleter::new(store.clone(), annotations.clone()))
            }),
            finalizer: self.finalizer.unwrap_or_else(|| {
                Box::new(ApiFinalizer::new(store.clone(), token))
            }),
            store,
            parent_gvk: self.parent_gvk,
            short_wait: self.short_wait,
            long_wait: self.long_wait,
            tiny_wait: self.tiny_wait,
            timeout: self.timeout,
        }
    }
}

impl Reconciler {
    pub fn builder(
        store: Arc<dyn Store>,
        parent_gvk: GroupVersionKind,
    ) -> ReconcilerBuilder {
        ReconcilerBuilder {
            store,
            parent_gvk,
            engine: None,
            patchers: None,
            deleter: None,
            finalizer: None,
            annotations: AnnotationPolicy::default(),
            shared: SharedDependencyPolicy::default(),
            finalizer_token: FINALIZER.to_string(),
            short_wait: DEFAULT_SHORT_WAIT,
            long_wait: DEFAULT_LONG_WAIT,
            tiny_wait: DEFAULT_TINY_WAIT,
            timeout: DEFAULT_RECONCILE_TIMEOUT,
        }
    }

    pub fn parent_gvk(&self) -> &GroupVersionKind {
        &self.parent_gvk
    }

    pub fn short_wait(&self) -> Duration {
        self.short_wait
    }

    /// Reconcile the parent named `namespace`/`name`, bounded by the
    /// configured timeout.
    #[instrument(skip(self), fields(kind = %self.parent_gvk.kind))]
    pub async fn reconcile(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Outcome, ReconcileError> {
        tokio::time::timeout(self.timeout, self.sync(namespace, name))
            .await
            .map_err(|_| ReconcileError::Timeout(self.timeout))?
    }

    async fn sync(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Outcome, ReconcileError> {
        let key = ObjectKey::new(self.parent_gvk.clone(), namespace, name);
        let mut parent = match self.store.get(&key).await {
            Ok(p) => p,
            Err(e) if e.is_not_found() => {
                debug!(%key, "reconcile: parent is gone");
                return Ok(Outcome::done());
            }
            Err(e) => return Err(ReconcileError::FetchParent(e)),
        };

        let children = match self.render(&parent).await {
            Ok(c) => c,
            Err(e) => {
                return self.fail(&key, &mut parent, SyncFailure::Templating(e)).await;
            }
        };
        let children = match self.patchers.patch(&parent, children) {
            Ok(c) => c,
            Err(e) => {
                return self.fail(&key, &mut parent, SyncFailure::Patch(e)).await;
            }
        };

        if was_deleted(&parent) {
            return self.finalize(&key, &mut parent, children).await;
        }

        if let Err(e) = self.finalizer.add_finalizer(&mut parent).await {
            return self.fail(&key, &mut parent, SyncFailure::AddFinalizer(e)).await;
        }

        for child in &children {
            if let Err(source) = apply(self.store.as_ref(), child).await {
                let failure = SyncFailure::Apply {
                    name: child.name_any(),
                    namespace: child.namespace().unwrap_or_default(),
                    gvk: gvk_of(child)
                        .map(|g| describe_gvk(&g))
                        .unwrap_or_default(),
                    source,
                };
                return self.fail(&key, &mut parent, failure).await;
            }
        }
        info!(%key, children = children.len(), "reconcile: children applied");
        self.report(&key, &mut parent, reconcile_success(), self.long_wait)
            .await
    }

    /// Engines may block on file I/O, so they run off the async workers.
    async fn render(
        &self,
        parent: &ParentResource,
    ) -> Result<Vec<ChildResource>, TemplatingError> {
        let engine = self.engine.clone();
        let parent = parent.clone();
        tokio::task::spawn_blocking(move || engine.run(&parent))
            .await
            .map_err(|e| TemplatingError::Other(e.to_string()))?
    }

    async fn finalize(
        &self,
        key: &ObjectKey,
        parent: &mut ParentResource,
        children: Vec<ChildResource>,
    ) -> Result<Outcome, ReconcileError> {
        let deleted = match self.deleter.delete(parent, children).await {
            Ok(batch) => batch,
            Err(e) => {
                return self.fail(key, parent, SyncFailure::Delete(e)).await;
            }
        };
        if !deleted.is_empty() {
            info!(%key, count = deleted.len(), "reconcile: waiting for children");
            let waiting = reconcile_success().with_message(WAITING_FOR_CHILDREN);
            return self.report(key, parent, waiting, self.tiny_wait).await;
        }

        match self.finalizer.remove_finalizer(parent).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return self
                    .fail(key, parent, SyncFailure::RemoveFinalizer(e))
                    .await;
            }
        }
        info!(%key, "reconcile: teardown complete");
        Ok(Outcome::done())
    }

    async fn fail(
        &self,
        key: &ObjectKey,
        parent: &mut ParentResource,
        failure: SyncFailure,
    ) -> Result<Outcome, ReconcileError> {
        warn!(%key, error = %failure, "reconcile: failed");
        self.report(key, parent, reconcile_error(&failure), self.short_wait)
            .await
    }

    /// Record `condition` on the parent's status and requeue after `wait`.
    async fn report(
        &self,
        key: &ObjectKey,
        parent: &mut ParentResource,
        condition: Condition,
        wait: Duration,
    ) -> Result<Outcome, ReconcileError> {
        if let Err(e) = set_conditions(parent, [condition]) {
            warn!(%key, error = %e, "reconcile: cannot record condition");
        }
        let conditions = parent
            .data
            .get("status")
            .and_then(|s| s.get("conditions"))
            .cloned()
            .unwrap_or(JsonValue::Array(Vec::new()));
        let patch = json!({"status": {"conditions": conditions}});
        self.store
            .patch_status(key, &patch)
            .await
            .map_err(ReconcileError::StatusWrite)?;
        Ok(Outcome::requeue(wait))
    }
}
