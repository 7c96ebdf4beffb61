//! Admission predicates applied before reconciling.
//!
//! Namespace partitioning: a change event is only acted upon if the object's
//! namespace carries the `monitored` label with this operator's ID. This lets
//! several operator instances share a cluster without interfering. CSRs are
//! cluster scoped and are routed through their annotations instead.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::Api;
use kube::{Client, ResourceExt};
use tracing::warn;

use crate::constants;
use crate::controller::error::Result;

/// Pure check: does the namespace carry `monitored=<id>`?
pub fn is_monitored_namespace(namespace: &Namespace, id: &str) -> bool {
    namespace
        .labels()
        .get(constants::LABEL_MONITORED_NAMESPACE)
        .is_some_and(|value| value == id)
}

/// Look up the namespace through the client and check its monitoring label.
/// A namespace that cannot be read is treated as not monitored.
pub async fn namespace_is_monitored(client: &Client, name: &str, id: &str) -> Result<bool> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    match namespaces.get_opt(name).await {
        Ok(Some(namespace)) => Ok(is_monitored_namespace(&namespace, id)),
        Ok(None) => Ok(false),
        Err(err) => {
            warn!("Failed to get namespace '{}': {}", name, err);
            Ok(false)
        }
    }
}

/// A secret at the target name that does not carry the `generated` label was
/// created by a user and is authoritative.
pub fn is_user_provided_secret(secret: &Secret) -> bool {
    !secret
        .labels()
        .get(constants::LABEL_SECRET_KIND)
        .is_some_and(|value| value == constants::GENERATED_SECRET_KIND)
}

/// A CSR belongs to this operator when it carries the target secret name, the
/// owning QuarksSecret namespace and a matching monitored ID annotation.
pub fn csr_owned_by_quarks_secret(
    monitored_id: &str,
    annotations: &BTreeMap<String, String>,
) -> bool {
    annotations.contains_key(constants::ANNOTATION_CERT_SECRET_NAME)
        && annotations.contains_key(constants::ANNOTATION_QSEC_NAMESPACE)
        && annotations
            .get(constants::ANNOTATION_MONITORED_ID)
            .is_some_and(|id| id == monitored_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn namespace_with_labels(labels: &[(&str, &str)]) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some("ns".into()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn monitored_namespace_requires_matching_id() {
        let monitored =
            namespace_with_labels(&[(constants::LABEL_MONITORED_NAMESPACE, "operator-1")]);
        assert!(is_monitored_namespace(&monitored, "operator-1"));
        assert!(!is_monitored_namespace(&monitored, "operator-2"));

        let unlabeled = namespace_with_labels(&[]);
        assert!(!is_monitored_namespace(&unlabeled, "operator-1"));
    }

    #[test]
    fn secret_without_generated_label_is_user_provided() {
        let mut secret = Secret::default();
        assert!(is_user_provided_secret(&secret));

        secret.metadata.labels = Some(
            [(
                constants::LABEL_SECRET_KIND.to_string(),
                "something-else".to_string(),
            )]
            .into(),
        );
        assert!(is_user_provided_secret(&secret));

        secret.metadata.labels = Some(
            [(
                constants::LABEL_SECRET_KIND.to_string(),
                constants::GENERATED_SECRET_KIND.to_string(),
            )]
            .into(),
        );
        assert!(!is_user_provided_secret(&secret));
    }

    #[test]
    fn csr_routing_requires_all_annotations() {
        let mut annotations = BTreeMap::new();
        assert!(!csr_owned_by_quarks_secret("operator-1", &annotations));

        annotations.insert(constants::ANNOTATION_CERT_SECRET_NAME.into(), "tgt".into());
        annotations.insert(constants::ANNOTATION_QSEC_NAMESPACE.into(), "ns".into());
        assert!(!csr_owned_by_quarks_secret("operator-1", &annotations));

        annotations.insert(constants::ANNOTATION_MONITORED_ID.into(), "operator-1".into());
        assert!(csr_owned_by_quarks_secret("operator-1", &annotations));
        assert!(!csr_owned_by_quarks_secret("operator-2", &annotations));
    }
}
