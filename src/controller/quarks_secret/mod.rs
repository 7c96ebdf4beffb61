//! # QuarksSecret reconciler
//!
//! Reads the declared state of a QuarksSecret and materializes the matching
//! Kubernetes secret: at most one created or updated `Secret` per reconcile,
//! possibly a `CertificateSigningRequest` plus a key holder secret for the
//! cluster signing path, and a status update on the QuarksSecret itself.

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::events::EventType;
use tracing::{debug, info};

use crate::constants;
use crate::controller::error::{ReconcilerError, Result};
use crate::controller::{meltdown, predicate, status, Ctx};
use crate::crd::{secret_type, GenerationState, QuarksSecret};
use crate::observability::metrics;

pub mod apply;
pub mod certificates;
pub mod generate;
pub mod secret_copy;
pub mod templated;

/// Reconcile a single QuarksSecret under the configured deadline.
pub async fn reconcile(qsec: Arc<QuarksSecret>, ctx: Arc<Ctx>) -> Result<Action> {
    let deadline = ctx.settings.ctx_timeout();
    match tokio::time::timeout(deadline, reconcile_inner(qsec, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(ReconcilerError::DeadlineExceeded),
    }
}

async fn reconcile_inner(qsec: Arc<QuarksSecret>, ctx: Arc<Ctx>) -> Result<Action> {
    let name = qsec.name_any();
    let namespace = qsec
        .namespace()
        .ok_or_else(|| ReconcilerError::Validation("QuarksSecret has no namespace".into()))?;

    if !predicate::namespace_is_monitored(&ctx.client, &namespace, &ctx.settings.monitored_id)
        .await?
    {
        return Ok(Action::await_change());
    }

    info!("Reconciling QuarksSecret '{}/{}'", namespace, name);

    let resource_status = qsec.status.clone().unwrap_or_default();
    let window = meltdown::Window::new(
        ctx.settings.meltdown_duration(),
        resource_status.last_reconcile_time(),
    );
    if window.contains(chrono::Utc::now()) {
        ctx.publish_event(
            qsec.as_ref(),
            EventType::Normal,
            "Meltdown",
            format!(
                "Resource '{}/{}' is in meltdown, requeue reconcile after {:?}",
                namespace,
                name,
                ctx.settings.meltdown_requeue_after()
            ),
        )
        .await;
        metrics::increment_requeues("meltdown");
        return Ok(Action::requeue(ctx.settings.meltdown_requeue_after()));
    }

    // Copies are materialized by the copy reconciler on the receiving side.
    if qsec.spec.type_ == secret_type::SECRET_COPY {
        return Ok(Action::await_change());
    }

    // An already generated resource only needs its secret metadata kept in
    // sync; regeneration happens when rotation or drift detection flips the
    // status back to dirty.
    if resource_status.generation() == GenerationState::Clean {
        debug!(
            "QuarksSecret '{}/{}' has already been generated",
            namespace, name
        );
        apply::sync_secret_metadata(&ctx, &qsec).await?;
        return Ok(Action::await_change());
    }

    let result = match qsec.spec.type_.as_str() {
        secret_type::PASSWORD => generate::create_password_secret(&ctx, &qsec).await,
        secret_type::RSA_KEY => generate::create_rsa_secret(&ctx, &qsec).await,
        secret_type::SSH_KEY => generate::create_ssh_secret(&ctx, &qsec).await,
        secret_type::BASIC_AUTH => generate::create_basic_auth_secret(&ctx, &qsec).await,
        secret_type::DOCKER_CONFIG_JSON => {
            generate::create_docker_config_json_secret(&ctx, &qsec).await
        }
        secret_type::TEMPLATED_CONFIG => templated::create_templated_secret(&ctx, &qsec).await,
        secret_type::CERTIFICATE | secret_type::TLS => {
            certificates::create_certificate_secret(&ctx, &qsec).await
        }
        unknown => {
            ctx.publish_event(
                qsec.as_ref(),
                EventType::Warning,
                "InvalidTypeError",
                format!("Invalid type: {unknown}"),
            )
            .await;
            return Err(ReconcilerError::InvalidType(unknown.to_string()));
        }
    };

    match result {
        Ok(()) => {
            status::set_generated(&ctx.client, &namespace, &name).await?;
            ctx.clear_backoff(&format!("{namespace}/{name}"));
            metrics::increment_reconciliations("quarks-secret");
            Ok(Action::await_change())
        }
        Err(err) if err.is_not_ready() => {
            info!(
                "Dependency for QuarksSecret '{}/{}' is not ready yet: {}",
                namespace, name, err
            );
            metrics::increment_requeues("dependency-not-ready");
            Ok(Action::requeue(Duration::from_secs(
                constants::NOT_READY_REQUEUE_SECS,
            )))
        }
        Err(err) => Err(err),
    }
}
