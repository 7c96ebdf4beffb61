//! # Copy reconciler
//!
//! Keeps pre-existing copies in peer namespaces aligned with their source
//! secret. Only the update path runs here: creation of copies stays gated
//! behind the placeholder validation in the QuarksSecret reconciler, so a
//! destination namespace always has to opt in first.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::events::EventType;
use tracing::{debug, info};

use crate::constants;
use crate::controller::error::{ReconcilerError, Result};
use crate::controller::quarks_secret::secret_copy;
use crate::controller::{meltdown, predicate, status, Ctx};
use crate::crd::{secret_type, GenerationState, QuarksSecret};
use crate::observability::metrics;

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

    // Receivers are passive; sources without copies have nothing to do.
    if qsec.spec.type_ == secret_type::SECRET_COPY || qsec.spec.copies.is_empty() {
        return Ok(Action::await_change());
    }

    let resource_status = qsec.status.clone().unwrap_or_default();
    if resource_status.copy() == GenerationState::Clean {
        debug!("Copies of QuarksSecret '{}/{}' are up to date", namespace, name);
        return Ok(Action::await_change());
    }

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

    info!("Reconciling copies of QuarksSecret '{}/{}'", namespace, name);

    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);
    let Some(source_secret) = secrets.get_opt(&qsec.spec.secret_name).await? else {
        // The source has not been generated yet.
        metrics::increment_requeues("dependency-not-ready");
        return Ok(Action::requeue(Duration::from_secs(
            constants::NOT_READY_REQUEUE_SECS,
        )));
    };
    let user_provided = predicate::is_user_provided_secret(&source_secret);
    let copy_of = qsec.namespaced_name();

    for copy in &qsec.spec.copies {
        let destination: Api<Secret> = Api::namespaced(ctx.client.clone(), &copy.namespace);
        match destination.get_opt(&copy.name).await? {
            Some(existing)
                if secret_copy::validate_copy(
                    existing.labels(),
                    existing.annotations(),
                    &copy_of,
                    user_provided,
                ) =>
            {
                secret_copy::update_copy_secret(&ctx, copy, &source_secret, &copy_of).await?;
                info!("Copied secret '{copy}' has been updated");
            }
            Some(_) => {
                ctx.publish_event(
                    qsec.as_ref(),
                    EventType::Normal,
                    "SkipCopyCreation",
                    format!("Secret '{copy}' is missing the copy markers"),
                )
                .await;
            }
            None => {
                ctx.publish_event(
                    qsec.as_ref(),
                    EventType::Normal,
                    "SkipCopyCreation",
                    format!("Secret '{copy}' must exist to receive an updated copy"),
                )
                .await;
            }
        }
    }

    status::set_copied(&ctx.client, &namespace, &name).await?;
    ctx.clear_backoff(&format!("{namespace}/{name}"));
    metrics::increment_reconciliations("copy");
    Ok(Action::await_change())
}
