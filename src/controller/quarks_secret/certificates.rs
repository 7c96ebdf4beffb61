//! Certificate generation: local (self-signed or CA-signed) and cluster
//! (CSR API) signing paths.

use std::collections::BTreeMap;

use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestSpec,
};
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::constants;
use crate::controller::error::{ReconcilerError, Result};
use crate::controller::quarks_secret::apply;
use crate::controller::Ctx;
use crate::crd::{
    csr_name, csr_private_key_secret_name, secret_type, signer_type, CertificateRequest,
    QuarksSecret,
};
use crate::credsgen::{CaMaterial, CertificateGenerationRequest};

pub async fn create_certificate_secret(ctx: &Ctx, qsec: &QuarksSecret) -> Result<()> {
    info!("Generating certificate for '{}'", qsec.namespaced_name());
    let namespace = qsec
        .namespace()
        .ok_or_else(|| ReconcilerError::Validation("QuarksSecret has no namespace".into()))?;
    let certificate_request = &qsec.spec.request.certificate;

    let (service_names, service_ip_for_eks_workaround) =
        resolve_service_addresses(ctx, &namespace, certificate_request).await?;

    let signer = match certificate_request.signer_type.as_str() {
        "" | signer_type::LOCAL => signer_type::LOCAL,
        signer_type::CLUSTER => signer_type::CLUSTER,
        other => {
            return Err(ReconcilerError::Validation(format!(
                "unrecognized signer type: {other}"
            )))
        }
    };

    let mut alternative_names = certificate_request.alternative_names.clone();
    alternative_names.extend(service_names);

    match signer {
        signer_type::CLUSTER => {
            let mut generation_request = CertificateGenerationRequest {
                common_name: certificate_request.common_name.clone(),
                alternative_names,
                ..Default::default()
            };

            if certificate_request.activate_eks_workaround_for_san {
                let service_ip = service_ip_for_eks_workaround.ok_or_else(|| {
                    ReconcilerError::Validation(format!(
                        "can't activate EKS workaround for QuarksSecret '{}'; couldn't find a ClusterIP for any service reference",
                        qsec.namespaced_name()
                    ))
                })?;
                info!(
                    "Activating EKS workaround for QuarksSecret '{}'. Using IP '{}' as a common name",
                    qsec.namespaced_name(),
                    service_ip
                );
                generation_request.common_name = service_ip;
            }

            info!("Generating certificate signing request and its key");
            let (csr, private_key) = ctx
                .generator
                .generate_certificate_signing_request(&generation_request)
                .map_err(ReconcilerError::Generation)?;

            // The private key is parked in a deterministically named secret
            // and merged with the signed certificate by the CSR reconciler.
            create_private_key_secret(ctx, qsec, private_key).await?;
            create_certificate_signing_request(ctx, qsec, csr).await
        }
        _ => {
            let generation_request = local_generation_request(
                ctx,
                &namespace,
                certificate_request,
                alternative_names,
            )
            .await?;

            let certificate = ctx
                .generator
                .generate_certificate(&qsec.name_any(), &generation_request)
                .map_err(ReconcilerError::Generation)?;

            let ca = generation_request
                .ca
                .as_ref()
                .map(|ca| ca.certificate.clone())
                .filter(|pem| !pem.is_empty());

            let mut secret = apply::new_target_secret(qsec);
            secret.string_data = Some(certificate_secret_data(
                &qsec.spec.type_,
                &certificate.certificate,
                &certificate.private_key,
                ca.as_deref(),
                certificate.is_ca,
            ));
            if qsec.spec.type_ == secret_type::TLS {
                secret.type_ = Some("kubernetes.io/tls".into());
            }

            apply::create_secrets(ctx, qsec, secret).await
        }
    }
}

/// Secret payload for a certificate: plain convention for `certificate`
/// QuarksSecrets, TLS convention (`tls.crt`/`tls.key`) for `tls` ones.
pub fn certificate_secret_data(
    qsec_type: &str,
    certificate: &str,
    private_key: &str,
    ca: Option<&str>,
    is_ca: bool,
) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    if qsec_type == secret_type::TLS {
        data.insert("tls.crt".into(), certificate.into());
        data.insert("tls.key".into(), private_key.into());
        if let Some(ca) = ca {
            data.insert("ca.crt".into(), ca.into());
        }
    } else {
        data.insert("certificate".into(), certificate.into());
        data.insert("private_key".into(), private_key.into());
        data.insert("is_ca".into(), is_ca.to_string());
        if let Some(ca) = ca {
            data.insert("ca".into(), ca.into());
        }
    }
    data
}

/// Append, for every referenced service, its name, short and namespaced DNS
/// names with wildcards, cluster IP, load balancer IP, external name and
/// external IPs. Returns the collected names and the first cluster IP for the
/// EKS workaround.
async fn resolve_service_addresses(
    ctx: &Ctx,
    namespace: &str,
    request: &CertificateRequest,
) -> Result<(Vec<String>, Option<String>)> {
    let services: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);
    let mut names = Vec::new();
    let mut first_cluster_ip = None;

    for service_ref in &request.service_ref {
        let service = services.get_opt(&service_ref.name).await?.ok_or_else(|| {
            ReconcilerError::Validation(format!(
                "failed to get service reference '{}'",
                service_ref.name
            ))
        })?;
        let service_name = service.name_any();
        let spec = service.spec.unwrap_or_default();

        if first_cluster_ip.is_none() {
            first_cluster_ip = spec.cluster_ip.clone().filter(|ip| !ip.is_empty());
        }

        names.push(service_name.clone());
        names.push(format!("{service_name}.{namespace}"));
        names.push(format!("*.{service_name}"));
        names.push(format!("*.{service_name}.{namespace}"));
        names.extend(spec.cluster_ip.into_iter().filter(|ip| !ip.is_empty()));
        names.extend(spec.load_balancer_ip.into_iter().filter(|ip| !ip.is_empty()));
        names.extend(spec.external_name.into_iter().filter(|n| !n.is_empty()));
        names.extend(spec.external_ips.unwrap_or_default());
    }

    Ok((names, first_cluster_ip))
}

/// Build the generation request for the local signer, fetching CA material
/// from the referenced secrets. Missing CA secrets are a not-ready condition.
async fn local_generation_request(
    ctx: &Ctx,
    namespace: &str,
    request: &CertificateRequest,
    alternative_names: Vec<String>,
) -> Result<CertificateGenerationRequest> {
    let mut generation_request = CertificateGenerationRequest {
        common_name: request.common_name.clone(),
        alternative_names,
        is_ca: request.is_ca,
        ca: None,
    };

    if request.ca_ref.name.is_empty() {
        return Ok(generation_request);
    }

    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    let ca_secret = secrets
        .get_opt(&request.ca_ref.name)
        .await?
        .ok_or_else(|| ReconcilerError::CaNotReady("CA secret not found".into()))?;
    let certificate = secret_value(&ca_secret, &request.ca_ref.key)?;

    let key_secret = if request.ca_key_ref.name != request.ca_ref.name {
        secrets
            .get_opt(&request.ca_key_ref.name)
            .await?
            .ok_or_else(|| ReconcilerError::CaNotReady("CA key secret not found".into()))?
    } else {
        ca_secret
    };
    let private_key = secret_value(&key_secret, &request.ca_key_ref.key)?;

    generation_request.ca = Some(CaMaterial {
        certificate,
        private_key,
    });
    Ok(generation_request)
}

fn secret_value(secret: &Secret, key: &str) -> Result<String> {
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

/// Park the CSR's private key in `<csrName>-key` until the signed certificate
/// arrives.
async fn create_private_key_secret(
    ctx: &Ctx,
    qsec: &QuarksSecret,
    private_key: String,
) -> Result<()> {
    let name = csr_private_key_secret_name(&csr_name(
        &qsec.namespace().unwrap_or_default(),
        &qsec.name_any(),
    ));

    let mut secret = apply::new_target_secret(qsec);
    secret.metadata.name = Some(name);
    secret
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            constants::ANNOTATION_MONITORED_ID.into(),
            ctx.settings.monitored_id.clone(),
        );
    secret.string_data = Some(BTreeMap::from([
        ("private_key".to_string(), private_key),
        (
            "is_ca".to_string(),
            qsec.spec.request.certificate.is_ca.to_string(),
        ),
    ]));

    apply::apply_secret(ctx, qsec, &mut secret).await
}

/// Submit the cluster-scoped CSR. The CSR spec is immutable after creation,
/// so an existing CSR under the deterministic name is left alone.
async fn create_certificate_signing_request(
    ctx: &Ctx,
    qsec: &QuarksSecret,
    csr: String,
) -> Result<()> {
    let namespace = qsec.namespace().unwrap_or_default();
    let name = csr_name(&namespace, &qsec.name_any());
    debug!("Creating certificatesigningrequest '{}'", name);

    let api: Api<CertificateSigningRequest> = Api::all(ctx.client.clone());
    if api.get_opt(&name).await?.is_some() {
        info!("Ignoring immutable CSR '{}'", name);
        return Ok(());
    }

    let mut annotations = qsec.annotations().clone();
    annotations.insert(
        constants::ANNOTATION_CERT_SECRET_NAME.into(),
        qsec.spec.secret_name.clone(),
    );
    annotations.insert(constants::ANNOTATION_QSEC_NAMESPACE.into(), namespace);
    annotations.insert(constants::ANNOTATION_QSEC_NAME.into(), qsec.name_any());
    annotations.insert(
        constants::ANNOTATION_MONITORED_ID.into(),
        ctx.settings.monitored_id.clone(),
    );

    let usages = &qsec.spec.request.certificate.usages;
    let mut csr_object = CertificateSigningRequest::default();
    csr_object.metadata.name = Some(name);
    csr_object.metadata.labels = Some(qsec.labels().clone());
    csr_object.metadata.annotations = Some(annotations);
    csr_object.spec = CertificateSigningRequestSpec {
        request: ByteString(csr.into_bytes()),
        signer_name: constants::CLUSTER_SIGNER_NAME.into(),
        usages: (!usages.is_empty()).then(|| usages.clone()),
        ..Default::default()
    };

    api.create(&PostParams::default(), &csr_object).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_certificates_use_the_legacy_key_names() {
        let data = certificate_secret_data("certificate", "CERT", "KEY", Some("CA"), false);
        assert_eq!(data["certificate"], "CERT");
        assert_eq!(data["private_key"], "KEY");
        assert_eq!(data["ca"], "CA");
        assert_eq!(data["is_ca"], "false");
    }

    #[test]
    fn tls_certificates_use_the_tls_convention() {
        let data = certificate_secret_data("tls", "CERT", "KEY", Some("CA"), false);
        assert_eq!(data["tls.crt"], "CERT");
        assert_eq!(data["tls.key"], "KEY");
        assert_eq!(data["ca.crt"], "CA");
        assert!(!data.contains_key("certificate"));
        assert!(!data.contains_key("is_ca"));
    }

    #[test]
    fn missing_ca_is_omitted() {
        let data = certificate_secret_data("certificate", "CERT", "KEY", None, true);
        assert!(!data.contains_key("ca"));
        assert_eq!(data["is_ca"], "true");
    }
}
