//! Writing generated secrets to the cluster.
//!
//! `create_secrets` is the single funnel for every builder: it decides
//! whether generation must be skipped (already satisfied by a user-provided
//! secret), writes the target secret with the `generated` marker and the
//! owner reference, and walks the copy destinations.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Resource, ResourceExt};
use kube_runtime::events::EventType;
use serde_json::json;
use tracing::debug;

use crate::constants;
use crate::controller::error::{ReconcilerError, Result};
use crate::controller::quarks_secret::secret_copy;
use crate::controller::{predicate, status, Ctx};
use crate::crd::QuarksSecret;

/// Outcome of the pre-write check on the target secret.
enum Disposition {
    /// No conflicting secret; generate and write.
    Generate,
    /// A user created a secret at the target name; leave it untouched.
    UserProvided(Box<Secret>),
}

/// A prospective secret carrying the metadata every generated secret gets:
/// the target name, the QuarksSecret's namespace, and the user-requested
/// labels and annotations.
pub fn new_target_secret(qsec: &QuarksSecret) -> Secret {
    let mut secret = Secret::default();
    secret.metadata.name = Some(qsec.spec.secret_name.clone());
    secret.metadata.namespace = qsec.metadata.namespace.clone();
    secret.metadata.labels = qsec.spec.secret_labels.clone();
    secret.metadata.annotations = qsec.spec.secret_annotations.clone();
    secret
}

/// Write the prospective secret and update the copy destinations.
///
/// When a user-provided secret occupies the target name, nothing is written
/// locally, a `SkipCreation` event is recorded and the user's data is what
/// gets propagated to the copies.
pub async fn create_secrets(ctx: &Ctx, qsec: &QuarksSecret, mut secret: Secret) -> Result<()> {
    let (source, user_provided) = match skip_creation(ctx, qsec, &secret).await? {
        Disposition::UserProvided(existing) => {
            ctx.publish_event(
                qsec,
                EventType::Normal,
                "SkipCreation",
                format!(
                    "Skip creation: Secret '{}/{}' already exists and it's not generated",
                    existing.namespace().unwrap_or_default(),
                    existing.name_any()
                ),
            )
            .await;
            (*existing, true)
        }
        Disposition::Generate => {
            apply_secret(ctx, qsec, &mut secret).await?;
            (secret, false)
        }
    };

    for copy in &qsec.spec.copies {
        secret_copy::copy_or_skip(ctx, qsec, copy, &source, user_provided).await?;
    }

    Ok(())
}

/// Decide whether the write must be skipped because the occupant of the
/// target name was created by a user.
async fn skip_creation(ctx: &Ctx, qsec: &QuarksSecret, secret: &Secret) -> Result<Disposition> {
    let namespace = qsec
        .namespace()
        .ok_or_else(|| ReconcilerError::Validation("QuarksSecret has no namespace".into()))?;
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);

    match api.get_opt(&secret.name_any()).await? {
        None => Ok(Disposition::Generate),
        Some(existing) if predicate::is_user_provided_secret(&existing) => {
            debug!(
                "Existing secret '{}/{}' doesn't have the label {}={}",
                namespace,
                existing.name_any(),
                constants::LABEL_SECRET_KIND,
                constants::GENERATED_SECRET_KIND,
            );
            Ok(Disposition::UserProvided(Box::new(existing)))
        }
        // Our own earlier output; the regeneration path updates it in place.
        Some(_) => Ok(Disposition::Generate),
    }
}

/// Apply the `generated` marker and the owner reference, then create or
/// update the secret.
pub(crate) async fn apply_secret(ctx: &Ctx, qsec: &QuarksSecret, secret: &mut Secret) -> Result<()> {
    debug!(
        "Creating secret '{}/{}', owned by quarks secret '{}'",
        secret.namespace().unwrap_or_default(),
        secret.name_any(),
        qsec.namespaced_name()
    );

    secret
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(
            constants::LABEL_SECRET_KIND.into(),
            constants::GENERATED_SECRET_KIND.into(),
        );

    if let Some(owner_ref) = qsec.controller_owner_ref(&()) {
        secret.metadata.owner_references = Some(vec![owner_ref]);
    }

    let namespace = qsec
        .namespace()
        .ok_or_else(|| ReconcilerError::Validation("QuarksSecret has no namespace".into()))?;
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);
    let name = secret.name_any();

    match api.get_opt(&name).await? {
        None => {
            api.create(&PostParams::default(), secret).await?;
        }
        Some(_) => {
            api.patch(&name, &PatchParams::default(), &Patch::Merge(&secret))
                .await?;
        }
    }

    Ok(())
}

/// Keep the generated secret's labels and annotations aligned with the
/// QuarksSecret spec after generation. Flips `copied` to dirty when metadata
/// changed so the copy reconciler refreshes the destinations.
pub async fn sync_secret_metadata(ctx: &Ctx, qsec: &QuarksSecret) -> Result<()> {
    let namespace = qsec
        .namespace()
        .ok_or_else(|| ReconcilerError::Validation("QuarksSecret has no namespace".into()))?;
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);

    let Some(secret) = api.get_opt(&qsec.spec.secret_name).await? else {
        return Ok(());
    };
    if predicate::is_user_provided_secret(&secret) {
        return Ok(());
    }

    let mut desired_labels = qsec.spec.secret_labels.clone().unwrap_or_default();
    desired_labels.insert(
        constants::LABEL_SECRET_KIND.into(),
        constants::GENERATED_SECRET_KIND.into(),
    );
    let desired_annotations = qsec.spec.secret_annotations.clone().unwrap_or_default();

    let current_labels = secret.metadata.labels.clone().unwrap_or_default();
    let current_annotations = secret.metadata.annotations.clone().unwrap_or_default();

    // A merge patch can only add or overwrite entries, so the desired
    // metadata being a subset of what is live means there is nothing to do.
    // Annotations added by other controllers stay untouched.
    let is_subset = |desired: &BTreeMap<String, String>, current: &BTreeMap<String, String>| {
        desired
            .iter()
            .all(|(key, value)| current.get(key) == Some(value))
    };
    if is_subset(&desired_labels, &current_labels)
        && is_subset(&desired_annotations, &current_annotations)
    {
        return Ok(());
    }

    debug!(
        "Updating metadata of generated secret '{}/{}'",
        namespace, qsec.spec.secret_name
    );
    api.patch(
        &qsec.spec.secret_name,
        &PatchParams::default(),
        &Patch::Merge(json!({
            "metadata": {
                "labels": desired_labels,
                "annotations": desired_annotations,
            }
        })),
    )
    .await?;

    // Destination copies must not drift from the refreshed metadata.
    if !qsec.spec.copies.is_empty() {
        status::invalidate_copied(&ctx.client, &namespace, &qsec.name_any()).await?;
    }

    Ok(())
}
