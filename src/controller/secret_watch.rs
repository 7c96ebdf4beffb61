//! Drift detection for user-provided secrets.
//!
//! A plain watcher over all secrets. When a user-provided secret (one without
//! the `generated` label) in a monitored namespace changes, every QuarksSecret
//! referencing it is flagged as dirty, which re-triggers the QuarksSecret and
//! copy reconcilers. Downstream copies of user-provided secrets must not
//! drift when the user edits the source.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::ResourceExt;
use kube_runtime::watcher;
use kube_runtime::WatchStreamExt;
use tracing::{debug, warn};

use crate::controller::{predicate, reference, status, Ctx};
use crate::crd::QuarksSecret;

/// Start the watch in a background task. The watcher restarts itself with
/// backoff on transient errors.
pub fn spawn(ctx: Arc<Ctx>) {
    tokio::spawn(run(ctx));
}

async fn run(ctx: Arc<Ctx>) {
    let secrets: Api<Secret> = Api::all(ctx.client.clone());
    let stream = watcher(secrets, watcher::Config::default()).default_backoff();
    pin_mut!(stream);

    // Fingerprints of everything seen so far, keyed by namespace/name. The
    // initial listing primes the map so a restart does not misread existing
    // secrets as drift; a first apply is a creation, not a change.
    let mut fingerprints: HashMap<String, [u8; 16]> = HashMap::new();

    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::InitApply(secret)) => {
                fingerprints.insert(secret_key(&secret), fingerprint(&secret));
            }
            Ok(watcher::Event::Apply(secret)) => {
                let key = secret_key(&secret);
                let current = fingerprint(&secret);
                let previous = fingerprints.insert(key, current);
                match previous {
                    Some(previous) if previous != current => {
                        handle_user_secret_change(&ctx, &secret).await;
                    }
                    _ => {}
                }
            }
            Ok(watcher::Event::Delete(secret)) => {
                fingerprints.remove(&secret_key(&secret));
            }
            Ok(watcher::Event::Init | watcher::Event::InitDone) => {}
            Err(err) => {
                warn!("Error watching secrets: {}", err);
            }
        }
    }

    warn!("User secret watch stream ended");
}

/// Mark every QuarksSecret that references the changed secret as dirty.
async fn handle_user_secret_change(ctx: &Ctx, secret: &Secret) {
    if !predicate::is_user_provided_secret(secret) {
        return;
    }
    let Some(namespace) = secret.namespace() else {
        return;
    };
    match predicate::namespace_is_monitored(&ctx.client, &namespace, &ctx.settings.monitored_id)
        .await
    {
        Ok(true) => {}
        _ => return,
    }

    let name = secret.name_any();
    debug!("User provided secret '{}/{}' changed", namespace, name);

    let quarks_secrets: Api<QuarksSecret> = Api::namespaced(ctx.client.clone(), &namespace);
    let list = match quarks_secrets.list(&ListParams::default()).await {
        Ok(list) => list,
        Err(err) => {
            warn!(
                "Failed to list QuarksSecrets for secret '{}/{}': {}",
                namespace, name, err
            );
            return;
        }
    };

    for qsec in reference::referencing(&list.items, &name) {
        let qsec_name = qsec.name_any();
        debug!(
            "Invalidating QuarksSecret '{}/{}' after change of secret '{}'",
            namespace, qsec_name, name
        );
        if let Err(err) = status::invalidate(&ctx.client, &namespace, &qsec_name).await {
            warn!(
                "Failed to invalidate QuarksSecret '{}/{}': {}",
                namespace, qsec_name, err
            );
        }
    }
}

fn secret_key(secret: &Secret) -> String {
    format!(
        "{}/{}",
        secret.namespace().unwrap_or_default(),
        secret.name_any()
    )
}

/// Fingerprint of the watched fields: data, labels and annotations. Changes
/// anywhere else (resource version bumps, managed fields) are not drift.
fn fingerprint(secret: &Secret) -> [u8; 16] {
    let material = serde_json::to_vec(&(
        &secret.data,
        &secret.metadata.labels,
        &secret.metadata.annotations,
    ))
    .unwrap_or_default();
    md5::compute(material).0
}
