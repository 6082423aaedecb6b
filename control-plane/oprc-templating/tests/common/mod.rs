#![allow(dead_code)]

use std::time::Duration;

use kube::{
    Client,
    api::{Api, DeleteParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
};

/// Parent kind the cluster setup installs for these tests.
pub fn test_parent_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("templating.oaas.io", "v1alpha1", "TestStack"),
        "teststacks",
    )
}

// DNS-1123 safe suffix for unique names
pub fn uniq(prefix: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_subsec_nanos();
    format!("{prefix}-{}", nanos % 1_000_000)
}

pub async fn wait_until_gone(api: &Api<DynamicObject>, name: &str) -> bool {
    for _ in 0..30 {
        if api.get_opt(name).await.unwrap_or(None).is_none() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    false
}

/// Best-effort removal of a parent left behind by a failed test.
pub async fn cleanup_parent(client: Client, ns: &str, name: &str) {
    let api: Api<DynamicObject> =
        Api::namespaced_with(client, ns, &test_parent_resource());
    let _ = api
        .patch(
            name,
            &kube::api::PatchParams::default(),
            &kube::api::Patch::Merge(
                serde_json::json!({"metadata": {"finalizers": null}}),
            ),
        )
        .await;
    let _ = api.delete(name, &DeleteParams::default()).await;
}
