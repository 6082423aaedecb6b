use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use kube::Client;
use kube::core::GroupVersionKind;
use tracing::info;

use crate::config::TemplatingConfig;
use crate::controller::{Reconciler, run_controller};
use crate::resource::{ObjectKey, split_api_version};
use crate::stack::{StackDefinition, load_stack_definition};
use crate::store::{KubeStore, Store};

/// Key of the stack definition object named by the configuration.
pub fn stack_definition_key(cfg: &TemplatingConfig) -> ObjectKey {
    let (group, version) = split_api_version(&cfg.stack_api_version);
    ObjectKey::new(
        GroupVersionKind::gvk(&group, &version, &cfg.stack_kind),
        cfg.stack_namespace.as_deref(),
        &cfg.stack_name,
    )
}

/// Wire a reconciler for the parent kind `stack` describes.
pub fn build_reconciler(
    cfg: &TemplatingConfig,
    stack: &StackDefinition,
    store: Arc<dyn Store>,
) -> anyhow::Result<Reconciler> {
    let gvk = stack.parent_gvk()?;
    let engine = stack.engine(Path::new(&cfg.resources_dir))?;
    let shared = cfg
        .policy
        .shared_dependencies()
        .context("invalid shared dependency rules")?;
    Ok(Reconciler::builder(store, gvk)
        .engine(engine)
        .annotation_policy(cfg.policy.annotations())
        .shared_dependencies(shared)
        .finalizer_token(cfg.policy.finalizer_token())
        .short_wait(cfg.waits.short())
        .long_wait(cfg.waits.long())
        .tiny_wait(cfg.waits.tiny())
        .timeout(cfg.waits.timeout())
        .build())
}

/// Load the stack definition, then run the controller until shutdown.
pub async fn run(client: Client, cfg: TemplatingConfig) -> anyhow::Result<()> {
    let store = KubeStore::new(client.clone())
        .with_field_manager(cfg.field_manager.clone());

    let stack = load_stack_definition(&store, &stack_definition_key(&cfg))
        .await
        .context("could not fetch the stack definition")?;
    let namespace = stack.watch_namespace(cfg.watch_namespace.as_deref())?;

    let reconciler = build_reconciler(&cfg, &stack, Arc::new(store.clone()))?;
    let (parent, _) = store.resolve(reconciler.parent_gvk()).await?;
    info!(
        stack = %stack.name,
        kind = %parent.kind,
        engine = %stack.spec.behavior.engine.type_,
        "stack definition loaded"
    );

    run_controller(client, parent, Arc::new(reconciler), namespace).await
}
