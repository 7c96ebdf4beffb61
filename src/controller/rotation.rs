//! # Secret rotation reconciler
//!
//! A ConfigMap labeled `secret-rotation=yes` names QuarksSecrets to rotate in
//! its `secrets` entry, a JSON array of names. Each named QuarksSecret is
//! flagged as not generated; the QuarksSecret reconciler then regenerates the
//! target secret. No secret is ever deleted here, which keeps the ConfigMap
//! as an auditable rotation trail.

use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::events::EventType;
use serde_json::json;
use tracing::{info, warn};

use crate::constants;
use crate::controller::error::{ReconcilerError, Result};
use crate::controller::{predicate, status, Ctx};
use crate::observability::metrics;

pub async fn reconcile(config_map: Arc<ConfigMap>, ctx: Arc<Ctx>) -> Result<Action> {
    let deadline = ctx.settings.ctx_timeout();
    match tokio::time::timeout(deadline, reconcile_inner(config_map, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(ReconcilerError::DeadlineExceeded),
    }
}

async fn reconcile_inner(config_map: Arc<ConfigMap>, ctx: Arc<Ctx>) -> Result<Action> {
    let name = config_map.name_any();
    let namespace = config_map
        .namespace()
        .ok_or_else(|| ReconcilerError::Validation("ConfigMap has no namespace".into()))?;

    if !predicate::namespace_is_monitored(&ctx.client, &namespace, &ctx.settings.monitored_id)
        .await?
    {
        return Ok(Action::await_change());
    }

    // Rotation triggers on creation. The marker keeps a controller restart,
    // which replays the whole list of config maps, from rotating everything
    // a second time.
    if config_map
        .annotations()
        .contains_key(constants::ANNOTATION_ROTATION_PROCESSED)
    {
        return Ok(Action::await_change());
    }

    info!("Reconciling rotation config map '{}/{}'", namespace, name);

    let Some(entry) = config_map
        .data
        .as_ref()
        .and_then(|data| data.get(constants::ROTATE_LIST_KEY))
    else {
        return Ok(Action::await_change());
    };

    let names: Vec<String> = match parse_rotation_list(entry) {
        Ok(names) => names,
        Err(err) => {
            ctx.publish_event(
                config_map.as_ref(),
                EventType::Warning,
                "RotationError",
                format!("Entry '{}' is not a JSON array of names: {}", constants::ROTATE_LIST_KEY, err),
            )
            .await;
            return Ok(Action::await_change());
        }
    };

    for qsec_name in &names {
        match status::invalidate(&ctx.client, &namespace, qsec_name).await {
            Ok(()) => info!(
                "Rotating QuarksSecret '{}/{}', triggered by config map '{}'",
                namespace, qsec_name, name
            ),
            Err(ReconcilerError::Kube(kube::Error::Api(err))) if err.code == 404 => {
                warn!(
                    "Rotation config map '{}' names unknown QuarksSecret '{}/{}'",
                    name, namespace, qsec_name
                );
            }
            Err(err) => return Err(err),
        }
    }

    mark_processed(&ctx, &namespace, &name).await?;
    metrics::increment_reconciliations("secret-rotation");
    Ok(Action::await_change())
}

async fn mark_processed(ctx: &Ctx, namespace: &str, name: &str) -> Result<()> {
    let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), namespace);
    api.patch(
        name,
        &PatchParams::default(),
        &Patch::Merge(json!({
            "metadata": {
                "annotations": {
                    (constants::ANNOTATION_ROTATION_PROCESSED): chrono::Utc::now().to_rfc3339(),
                }
            }
        })),
    )
    .await?;
    Ok(())
}

/// Parse the rotation list entry.
pub fn parse_rotation_list(entry: &str) -> serde_json::Result<Vec<String>> {
    serde_json::from_str(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_list_parses_json_arrays() {
        assert_eq!(
            parse_rotation_list(r#"["qs1","qs2"]"#).unwrap(),
            vec!["qs1".to_string(), "qs2".to_string()]
        );
        assert!(parse_rotation_list("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_rotation_lists_are_rejected() {
        assert!(parse_rotation_list("qs1,qs2").is_err());
        assert!(parse_rotation_list(r#"{"secrets":["qs1"]}"#).is_err());
    }
}
