//! Resolve which QuarksSecrets reference a given secret.
//!
//! A QuarksSecret references a secret as its generation target, as CA
//! material, as username or password source for image credentials, or as a
//! value source for templated configs. When such a secret changes, every
//! referencing QuarksSecret has to be revisited.

use std::collections::BTreeSet;

use crate::crd::QuarksSecret;

/// All secret names referenced by a QuarksSecret in its own namespace.
pub fn referenced_secret_names(qsec: &QuarksSecret) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    names.insert(qsec.spec.secret_name.clone());

    let certificate = &qsec.spec.request.certificate;
    if !certificate.ca_ref.name.is_empty() {
        names.insert(certificate.ca_ref.name.clone());
    }
    if !certificate.ca_key_ref.name.is_empty() {
        names.insert(certificate.ca_key_ref.name.clone());
    }

    let image_credentials = &qsec.spec.request.image_credentials;
    if !image_credentials.username.name.is_empty() {
        names.insert(image_credentials.username.name.clone());
    }
    if !image_credentials.password.name.is_empty() {
        names.insert(image_credentials.password.name.clone());
    }

    for reference in qsec.spec.request.templated_config.values.values() {
        if !reference.name.is_empty() {
            names.insert(reference.name.clone());
        }
    }

    names
}

/// Filter a list of QuarksSecrets down to the ones referencing `secret_name`.
pub fn referencing<'a>(
    quarks_secrets: &'a [QuarksSecret],
    secret_name: &str,
) -> Vec<&'a QuarksSecret> {
    quarks_secrets
        .iter()
        .filter(|qsec| referenced_secret_names(qsec).contains(secret_name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{QuarksSecretSpec, SecretReference};

    fn quarks_secret(name: &str, spec: QuarksSecretSpec) -> QuarksSecret {
        let mut qsec = QuarksSecret::new(name, spec);
        qsec.metadata.namespace = Some("default".into());
        qsec
    }

    fn password_spec(secret_name: &str) -> QuarksSecretSpec {
        serde_json::from_value(serde_json::json!({
            "type": "password",
            "secretName": secret_name,
        }))
        .unwrap()
    }

    #[test]
    fn target_secret_is_referenced() {
        let qsec = quarks_secret("qs1", password_spec("gen-secret1"));
        assert!(referenced_secret_names(&qsec).contains("gen-secret1"));
    }

    #[test]
    fn certificate_and_value_references_are_collected() {
        let mut spec = password_spec("gen-cert");
        spec.request.certificate.ca_ref = SecretReference {
            name: "ca-secret".into(),
            key: "certificate".into(),
        };
        spec.request.certificate.ca_key_ref = SecretReference {
            name: "ca-key-secret".into(),
            key: "private_key".into(),
        };
        spec.request.templated_config.values.insert(
            "password".into(),
            SecretReference {
                name: "other-secret".into(),
                key: "password".into(),
            },
        );
        let qsec = quarks_secret("qs1", spec);

        let names = referenced_secret_names(&qsec);
        for expected in ["gen-cert", "ca-secret", "ca-key-secret", "other-secret"] {
            assert!(names.contains(expected), "missing {expected}");
        }
    }

    #[test]
    fn referencing_filters_by_name() {
        let list = vec![
            quarks_secret("qs1", password_spec("gen-secret1")),
            quarks_secret("qs2", password_spec("gen-secret2")),
        ];

        let hits = referencing(&list, "gen-secret1");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.name.as_deref(), Some("qs1"));
        assert!(referencing(&list, "unrelated").is_empty());
    }
}
