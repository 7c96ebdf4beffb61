//! Cross-namespace copy handling.
//!
//! Copies are never pushed into arbitrary namespaces: a destination must be
//! pre-provisioned with either a receiver QuarksSecret of type `copy` or an
//! existing secret carrying the expected markers. Anything else is skipped
//! with an event, which keeps a compromised source from exfiltrating data
//! into namespaces it was never granted.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Resource, ResourceExt};
use kube_runtime::events::EventType;
use serde_json::json;
use tracing::debug;

use crate::constants;
use crate::controller::error::Result;
use crate::controller::Ctx;
use crate::crd::{secret_type, Copy, QuarksSecret};

/// Write one copy destination, or skip it when the destination is not a
/// valid placeholder.
pub async fn copy_or_skip(
    ctx: &Ctx,
    source_qsec: &QuarksSecret,
    copy: &Copy,
    source_secret: &Secret,
    user_provided: bool,
) -> Result<()> {
    let copy_of = source_qsec.namespaced_name();

    let receivers: Api<QuarksSecret> = Api::namespaced(ctx.client.clone(), &copy.namespace);
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &copy.namespace);
    let receiver = receivers.get_opt(&copy.name).await?;
    let existing = secrets.get_opt(&copy.name).await?;

    match (receiver, existing) {
        (None, None) => {
            ctx.publish_event(
                source_qsec,
                EventType::Normal,
                "SkipCopyCreation",
                format!(
                    "Secret/QSecret '{copy}' must exist and have the appropriate labels and annotations to receive a copy"
                ),
            )
            .await;
            Ok(())
        }
        (Some(receiver), _) => {
            if receiver.spec.type_ != secret_type::SECRET_COPY {
                ctx.publish_event(
                    source_qsec,
                    EventType::Normal,
                    "SkipCopyCreation",
                    format!("Invalid type for receiver QSecret '{copy}'. It must be 'copy' type."),
                )
                .await;
                return Ok(());
            }
            if !validate_copy(
                receiver.labels(),
                receiver.annotations(),
                &copy_of,
                user_provided,
            ) {
                ctx.publish_event(
                    source_qsec,
                    EventType::Normal,
                    "SkipCopyCreation",
                    format!("Receiver QSecret '{copy}' is missing the copy markers"),
                )
                .await;
                return Ok(());
            }
            create_copy_secret(ctx, &receiver, copy, source_secret, &copy_of, user_provided).await
        }
        (None, Some(existing)) => {
            if !validate_copy(
                existing.labels(),
                existing.annotations(),
                &copy_of,
                user_provided,
            ) {
                ctx.publish_event(
                    source_qsec,
                    EventType::Normal,
                    "SkipCopyCreation",
                    format!("Secret '{copy}' is missing the copy markers"),
                )
                .await;
                return Ok(());
            }
            update_copy_secret(ctx, copy, source_secret, &copy_of).await
        }
    }
}

/// A destination is a valid copy target iff it carries the `generated` label
/// and the `secret-copy-of` annotation naming this source. A user-provided
/// source relaxes the label requirement.
pub fn validate_copy(
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
    copy_of: &str,
    user_provided: bool,
) -> bool {
    let mut valid = true;

    let generated = labels
        .get(constants::LABEL_SECRET_KIND)
        .is_some_and(|v| v == constants::GENERATED_SECRET_KIND);
    if !generated && !user_provided {
        debug!("Copy target doesn't have the generated label");
        valid = false;
    }

    if annotations
        .get(constants::ANNOTATION_COPY_OF)
        .map(String::as_str)
        != Some(copy_of)
    {
        debug!(
            "Copy target doesn't have the expected '{}' annotation",
            constants::ANNOTATION_COPY_OF
        );
        valid = false;
    }

    valid
}

/// Create the copy next to its receiver QuarksSecret, owned by the receiver
/// so deleting the receiver garbage-collects the copy.
async fn create_copy_secret(
    ctx: &Ctx,
    receiver: &QuarksSecret,
    copy: &Copy,
    source_secret: &Secret,
    copy_of: &str,
    user_provided: bool,
) -> Result<()> {
    debug!(
        "Creating copied secret '{copy}', owned by quarks secret '{}'",
        receiver.namespaced_name()
    );

    let mut secret = Secret::default();
    secret.metadata.name = Some(copy.name.clone());
    secret.metadata.namespace = Some(copy.namespace.clone());
    secret.data.clone_from(&source_secret.data);
    secret.string_data.clone_from(&source_secret.string_data);

    let mut labels = source_secret.labels().clone();
    if !user_provided {
        labels.insert(
            constants::LABEL_SECRET_KIND.into(),
            constants::GENERATED_SECRET_KIND.into(),
        );
    }
    let mut annotations = source_secret.annotations().clone();
    annotations.remove("kubectl.kubernetes.io/last-applied-configuration");
    annotations.insert(constants::ANNOTATION_COPY_OF.into(), copy_of.to_string());
    secret.metadata.labels = Some(labels);
    secret.metadata.annotations = Some(annotations);

    if let Some(owner_ref) = receiver.controller_owner_ref(&()) {
        secret.metadata.owner_references = Some(vec![owner_ref]);
    }

    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &copy.namespace);
    match api.get_opt(&copy.name).await? {
        None => {
            api.create(&PostParams::default(), &secret).await?;
        }
        Some(_) => {
            api.patch(&copy.name, &PatchParams::default(), &Patch::Merge(&secret))
                .await?;
        }
    }
    Ok(())
}

/// Update a pre-existing copy in place: data, labels and annotations. No
/// create and no owner reference, since cross-namespace references are not
/// supported.
pub async fn update_copy_secret(
    ctx: &Ctx,
    copy: &Copy,
    source_secret: &Secret,
    copy_of: &str,
) -> Result<()> {
    debug!("Updating copied secret '{copy}'");

    let labels = source_secret.labels().clone();
    let mut annotations = source_secret.annotations().clone();
    annotations.remove("kubectl.kubernetes.io/last-applied-configuration");
    annotations.insert(constants::ANNOTATION_COPY_OF.into(), copy_of.to_string());

    let mut patch = json!({
        "metadata": {
            "labels": labels,
            "annotations": annotations,
        }
    });
    if let Some(string_data) = &source_secret.string_data {
        patch["stringData"] = json!(string_data);
    }
    if let Some(data) = &source_secret.data {
        patch["data"] = json!(data);
    }

    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &copy.namespace);
    api.patch(&copy.name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(copy_of: &str) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
        let labels = BTreeMap::from([(
            constants::LABEL_SECRET_KIND.to_string(),
            constants::GENERATED_SECRET_KIND.to_string(),
        )]);
        let annotations = BTreeMap::from([(
            constants::ANNOTATION_COPY_OF.to_string(),
            copy_of.to_string(),
        )]);
        (labels, annotations)
    }

    #[test]
    fn valid_when_both_markers_match() {
        let (labels, annotations) = markers("ns1/qs1");
        assert!(validate_copy(&labels, &annotations, "ns1/qs1", false));
    }

    #[test]
    fn invalid_without_generated_label() {
        let (_, annotations) = markers("ns1/qs1");
        assert!(!validate_copy(
            &BTreeMap::new(),
            &annotations,
            "ns1/qs1",
            false
        ));
    }

    #[test]
    fn user_provided_source_relaxes_the_label_requirement() {
        let (_, annotations) = markers("ns1/qs1");
        assert!(validate_copy(&BTreeMap::new(), &annotations, "ns1/qs1", true));
    }

    #[test]
    fn invalid_with_wrong_copy_of_annotation() {
        let (labels, annotations) = markers("other/qsec");
        assert!(!validate_copy(&labels, &annotations, "ns1/qs1", false));
    }

    #[test]
    fn invalid_without_any_annotation() {
        let (labels, _) = markers("ns1/qs1");
        assert!(!validate_copy(&labels, &BTreeMap::new(), "ns1/qs1", false));
    }
}
