pub mod reconcile;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use kube::{
    Client, ResourceExt,
    api::Api,
    core::{ApiResource, DynamicObject},
    runtime::{Controller, controller::Action, watcher::Config},
};
use tracing::{error, info, instrument};

use crate::store::StoreError;

pub use reconcile::{Outcome, Reconciler, ReconcilerBuilder};

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("could not get the parent resource: {0}")]
    FetchParent(#[source] StoreError),
    #[error("could not update status of the parent resource: {0}")]
    StatusWrite(#[source] StoreError),
    #[error("reconcile did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(Clone)]
pub struct ControllerContext {
    pub reconciler: Arc<Reconciler>,
}

/// Watch parents of kind `parent` (optionally in one namespace) and
/// reconcile them until a shutdown signal arrives.
pub async fn run_controller(
    client: Client,
    parent: ApiResource,
    reconciler: Arc<Reconciler>,
    namespace: Option<String>,
) -> anyhow::Result<()> {
    let api: Api<DynamicObject> = match namespace.as_deref() {
        Some(ns) => Api::namespaced_with(client, ns, &parent),
        None => Api::all_with(client, &parent),
    };
    info!(kind = %parent.kind, namespace = ?namespace, "starting controller");
    let ctx = Arc::new(ControllerContext { reconciler });

    Controller::new_with(api, Config::default(), parent)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(name = %obj_ref.name, "reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip_all, fields(ns = ?obj.namespace(), name = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<DynamicObject>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let ns = obj.namespace();
    let name = obj.name_any();
    ctx.reconciler
        .reconcile(ns.as_deref(), &name)
        .await
        .map(Outcome::into_action)
}

pub fn error_policy(
    _obj: Arc<DynamicObject>,
    _error: &ReconcileError,
    ctx: Arc<ControllerContext>,
) -> Action {
    Action::requeue(ctx.reconciler.short_wait())
}
