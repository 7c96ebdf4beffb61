//! Status updates for QuarksSecret resources.

use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

use crate::constants;
use crate::controller::error::Result;
use crate::crd::QuarksSecret;

/// Mark the secret as generated and stamp the meltdown timestamp.
pub async fn set_generated(client: &Client, namespace: &str, name: &str) -> Result<()> {
    debug!("Marking QuarksSecret '{}/{}' as generated", namespace, name);
    patch_status(
        client,
        namespace,
        name,
        json!({
            "generated": true,
            "lastReconcile": chrono::Utc::now().to_rfc3339(),
        }),
    )
    .await
}

/// Mark the copy destinations as up to date and stamp the meltdown timestamp.
pub async fn set_copied(client: &Client, namespace: &str, name: &str) -> Result<()> {
    debug!("Marking QuarksSecret '{}/{}' as copied", namespace, name);
    patch_status(
        client,
        namespace,
        name,
        json!({
            "copied": true,
            "lastReconcile": chrono::Utc::now().to_rfc3339(),
        }),
    )
    .await
}

/// Mark only the copy propagation as dirty, so the copy reconciler refreshes
/// the destinations without regenerating the source secret.
pub async fn invalidate_copied(client: &Client, namespace: &str, name: &str) -> Result<()> {
    debug!(
        "Invalidating copy status of QuarksSecret '{}/{}'",
        namespace, name
    );
    patch_status(client, namespace, name, json!({ "copied": false })).await
}

/// Invalidate the resource so the reconcilers regenerate it: `generated` and
/// `copied` become `false` and the meltdown timestamp is cleared.
pub async fn invalidate(client: &Client, namespace: &str, name: &str) -> Result<()> {
    debug!("Invalidating QuarksSecret '{}/{}'", namespace, name);
    patch_status(
        client,
        namespace,
        name,
        json!({
            "generated": false,
            "copied": false,
            "lastReconcile": null,
        }),
    )
    .await
}

async fn patch_status(
    client: &Client,
    namespace: &str,
    name: &str,
    status: serde_json::Value,
) -> Result<()> {
    let api: Api<QuarksSecret> = Api::namespaced(client.clone(), namespace);
    api.patch_status(
        name,
        &PatchParams::apply(constants::FIELD_MANAGER),
        &Patch::Merge(json!({ "status": status })),
    )
    .await?;
    Ok(())
}
