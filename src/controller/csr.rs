//! # Certificate signing request reconciler
//!
//! Watches cluster-scoped `CertificateSigningRequest` objects that carry this
//! operator's routing annotations: approves pending requests, and once the
//! cluster signer attaches the certificate, merges it with the parked private
//! key into the target secret. The CSR and the key holder secret are
//! intermediate state and are removed afterwards.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::events::EventType;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::constants;
use crate::controller::error::{ReconcilerError, Result};
use crate::controller::quarks_secret::{apply, certificates};
use crate::controller::{predicate, status, Ctx};
use crate::crd::{csr_private_key_secret_name, QuarksSecret};
use crate::observability::metrics;

pub async fn reconcile(csr: Arc<CertificateSigningRequest>, ctx: Arc<Ctx>) -> Result<Action> {
    let deadline = ctx.settings.ctx_timeout();
    match tokio::time::timeout(deadline, reconcile_inner(csr, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(ReconcilerError::DeadlineExceeded),
    }
}

async fn reconcile_inner(csr: Arc<CertificateSigningRequest>, ctx: Arc<Ctx>) -> Result<Action> {
    if !predicate::csr_owned_by_quarks_secret(&ctx.settings.monitored_id, csr.annotations()) {
        return Ok(Action::await_change());
    }

    let name = csr.name_any();
    info!("Reconciling certificate signing request '{}'", name);

    let annotations = csr.annotations();
    let qsec_namespace = annotations
        .get(constants::ANNOTATION_QSEC_NAMESPACE)
        .cloned()
        .unwrap_or_default();
    let qsec_name = annotations
        .get(constants::ANNOTATION_QSEC_NAME)
        .cloned()
        .unwrap_or_default();
    let target_secret_name = annotations
        .get(constants::ANNOTATION_CERT_SECRET_NAME)
        .cloned()
        .unwrap_or_default();

    let conditions = csr
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();
    let has_condition = |type_: &str| {
        conditions
            .iter()
            .any(|c| c.type_ == type_ && c.status == "True")
    };

    // A terminally failed CSR is removed so the QuarksSecret reconciler
    // re-requests on its next pass.
    if has_condition("Failed") || has_condition("Denied") {
        ctx.publish_event(
            csr.as_ref(),
            EventType::Warning,
            "SigningRequestFailed",
            format!("CSR '{name}' failed or was denied, removing it to request again"),
        )
        .await;
        delete_csr(&ctx, &name).await?;
        if !qsec_namespace.is_empty() && !qsec_name.is_empty() {
            match status::invalidate(&ctx.client, &qsec_namespace, &qsec_name).await {
                Ok(()) => {}
                Err(ReconcilerError::Kube(kube::Error::Api(err))) if err.code == 404 => {}
                Err(err) => return Err(err),
            }
        }
        return Ok(Action::await_change());
    }

    // Carrying our routing annotations is the approval policy: the CSR was
    // created by this operator for a monitored namespace.
    if !has_condition("Approved") {
        approve(&ctx, &name).await?;
        metrics::increment_reconciliations("certificate-signing-request");
        return Ok(Action::requeue(Duration::from_secs(
            constants::CSR_PENDING_REQUEUE_SECS,
        )));
    }

    let Some(certificate) = csr
        .status
        .as_ref()
        .and_then(|s| s.certificate.as_ref())
        .filter(|bytes| !bytes.0.is_empty())
    else {
        debug!("CSR '{}' is approved but not signed yet", name);
        return Ok(Action::requeue(Duration::from_secs(
            constants::CSR_PENDING_REQUEUE_SECS,
        )));
    };
    let certificate = String::from_utf8(certificate.0.clone())
        .map_err(|_| ReconcilerError::Validation(format!("CSR '{name}' certificate is not PEM")))?;

    let result = harvest(
        &ctx,
        &name,
        &qsec_namespace,
        &qsec_name,
        &target_secret_name,
        certificate,
    )
    .await;

    match result {
        Ok(()) => {
            ctx.clear_backoff(&name);
            metrics::increment_reconciliations("certificate-signing-request");
            Ok(Action::await_change())
        }
        Err(err) if err.is_not_ready() => {
            info!("Dependency for CSR '{}' is not ready yet: {}", name, err);
            metrics::increment_requeues("dependency-not-ready");
            Ok(Action::requeue(Duration::from_secs(
                constants::NOT_READY_REQUEUE_SECS,
            )))
        }
        Err(err) => Err(err),
    }
}

/// Approve the CSR through the approval subresource.
async fn approve(ctx: &Ctx, name: &str) -> Result<()> {
    info!("Approving certificate signing request '{}'", name);
    let api: Api<CertificateSigningRequest> = Api::all(ctx.client.clone());
    let approval = json!({
        "status": {
            "conditions": [{
                "type": "Approved",
                "status": "True",
                "reason": "AutoApproved",
                "message": "This CSR was approved by the quarks secret controller",
                "lastUpdateTime": chrono::Utc::now().to_rfc3339(),
            }]
        }
    });
    api.patch_approval(name, &PatchParams::default(), &Patch::Merge(&approval))
        .await?;
    Ok(())
}

/// Merge the parked private key and the signed certificate into the target
/// secret, then clean up the intermediate state.
async fn harvest(
    ctx: &Ctx,
    csr_name: &str,
    qsec_namespace: &str,
    qsec_name: &str,
    target_secret_name: &str,
    certificate: String,
) -> Result<()> {
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), qsec_namespace);
    let key_secret_name = csr_private_key_secret_name(csr_name);
    let key_secret = secrets.get_opt(&key_secret_name).await?.ok_or_else(|| {
        ReconcilerError::SecretNotReady(format!("private key secret '{key_secret_name}' not found"))
    })?;

    let private_key = secret_string(&key_secret, "private_key")?;
    let is_ca = secret_string(&key_secret, "is_ca")? == "true";

    let ca = cluster_root_ca(ctx, qsec_namespace).await?;

    let quarks_secrets: Api<QuarksSecret> = Api::namespaced(ctx.client.clone(), qsec_namespace);
    let Some(qsec) = quarks_secrets.get_opt(qsec_name).await? else {
        // The owner is gone; the intermediate state has no owner reference
        // and has to be removed explicitly.
        warn!(
            "QuarksSecret '{}/{}' for CSR '{}' no longer exists, cleaning up",
            qsec_namespace, qsec_name, csr_name
        );
        let _ = secrets
            .delete(&key_secret_name, &DeleteParams::default())
            .await;
        delete_csr(ctx, csr_name).await?;
        return Ok(());
    };

    let mut secret = apply::new_target_secret(&qsec);
    secret.metadata.name = Some(target_secret_name.to_string());
    secret.string_data = Some(certificates::certificate_secret_data(
        &qsec.spec.type_,
        &certificate,
        &private_key,
        Some(&ca),
        is_ca,
    ));
    if qsec.spec.type_ == crate::crd::secret_type::TLS {
        secret.type_ = Some("kubernetes.io/tls".into());
    }
    apply::apply_secret(ctx, &qsec, &mut secret).await?;

    info!(
        "Certificate for QuarksSecret '{}/{}' has been signed and stored in secret '{}'",
        qsec_namespace, qsec_name, target_secret_name
    );

    // Both only carried intermediate state.
    let _ = secrets
        .delete(&key_secret_name, &DeleteParams::default())
        .await;
    delete_csr(ctx, csr_name).await?;

    status::set_generated(&ctx.client, qsec_namespace, qsec_name).await?;
    Ok(())
}

/// The cluster root CA bundle, published into every namespace.
async fn cluster_root_ca(ctx: &Ctx, namespace: &str) -> Result<String> {
    let config_maps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), namespace);
    let config_map = config_maps
        .get_opt(constants::ROOT_CA_CONFIG_MAP)
        .await?
        .ok_or_else(|| {
            ReconcilerError::SecretNotReady(format!(
                "root CA config map '{}' not found",
                constants::ROOT_CA_CONFIG_MAP
            ))
        })?;
    config_map
        .data
        .as_ref()
        .and_then(|data| data.get(constants::ROOT_CA_KEY))
        .cloned()
        .ok_or_else(|| {
            ReconcilerError::Validation(format!(
                "root CA config map has no '{}' entry",
                constants::ROOT_CA_KEY
            ))
        })
}

async fn delete_csr(ctx: &Ctx, name: &str) -> Result<()> {
    let api: Api<CertificateSigningRequest> = Api::all(ctx.client.clone());
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn secret_string(secret: &Secret, key: &str) -> Result<String> {
    let data = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| {
            ReconcilerError::Validation(format!(
                "secret '{}' has no key '{}'",
                secret.name_any(),
                key
            ))
        })?;
    String::from_utf8(data.0.clone()).map_err(|_| {
        ReconcilerError::Validation(format!(
            "secret '{}' key '{}' is not valid UTF-8",
            secret.name_any(),
            key
        ))
    })
}
