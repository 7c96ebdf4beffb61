//! # Custom Resource Definitions
//!
//! CRD types for the QuarksSecret controller.
//!
//! A `QuarksSecret` declares *what* credential should exist; the controller
//! materializes it into a Kubernetes `Secret`.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: quarks.cloudfoundry.org/v1alpha1
//! kind: QuarksSecret
//! metadata:
//!   name: gen-password
//!   namespace: default
//! spec:
//!   type: password
//!   secretName: gen-secret1
//! ```

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod install;
pub mod status;

pub use status::{GenerationState, QuarksSecretStatus};

/// Valid values for `spec.type`.
pub mod secret_type {
    pub const PASSWORD: &str = "password";
    pub const CERTIFICATE: &str = "certificate";
    pub const TLS: &str = "tls";
    pub const SSH_KEY: &str = "ssh";
    pub const RSA_KEY: &str = "rsa";
    pub const BASIC_AUTH: &str = "basic-auth";
    pub const DOCKER_CONFIG_JSON: &str = "dockerconfigjson";
    pub const SECRET_COPY: &str = "copy";
    pub const TEMPLATED_CONFIG: &str = "templatedconfig";
}

/// Valid values for `spec.request.certificate.signerType`.
pub mod signer_type {
    /// The operator signs the certificate itself (self-signed or CA-signed).
    pub const LOCAL: &str = "local";
    /// The certificate is signed through the cluster CSR API.
    pub const CLUSTER: &str = "cluster";
}

/// Template engine tag accepted in `spec.request.templatedConfig.type`.
pub const HELM_TEMPLATE: &str = "helm";

/// QuarksSecret Custom Resource Definition
///
/// Declares a credential to be generated: its type, the name of the target
/// secret, the type-specific generation request, and optional cross-namespace
/// copy destinations.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "QuarksSecret",
    group = "quarks.cloudfoundry.org",
    version = "v1alpha1",
    namespaced,
    status = "QuarksSecretStatus",
    shortname = "qsec",
    shortname = "qsecs",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type","description":"The type of the generated secret"}"#,
    printcolumn = r#"{"name":"Generated","type":"boolean","jsonPath":".status.generated","description":"Whether the secret has been generated"}"#,
    printcolumn = r#"{"name":"Copied","type":"boolean","jsonPath":".status.copied","description":"Whether copy destinations have been updated"}"#,
    printcolumn = r#"{"name":"Last Reconcile","type":"date","jsonPath":".status.lastReconcile"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct QuarksSecretSpec {
    /// The type of credential to generate, one of `password`, `rsa`, `ssh`,
    /// `certificate`, `tls`, `basic-auth`, `dockerconfigjson`,
    /// `templatedconfig` or `copy`.
    #[serde(rename = "type")]
    pub type_: String,
    /// Type-specific details for the secret generation.
    #[serde(default)]
    pub request: Request,
    /// Name of the target `Secret` in the same namespace.
    pub secret_name: String,
    /// Destinations in peer namespaces that receive a copy of the generated
    /// secret. Copies are only written into pre-provisioned placeholders.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copies: Vec<Copy>,
    /// Labels applied to the generated secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_labels: Option<BTreeMap<String, String>>,
    /// Annotations applied to the generated secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_annotations: Option<BTreeMap<String, String>>,
}

/// Type-discriminated payload for the secret generation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default, rename = "basic-auth")]
    pub basic_auth: BasicAuthRequest,
    #[serde(default)]
    pub certificate: CertificateRequest,
    #[serde(default)]
    pub image_credentials: ImageCredentialsRequest,
    #[serde(default)]
    pub templated_config: TemplatedConfigRequest,
}

/// A reference to a single key inside another secret.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct SecretReference {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
}

/// A reference to a service whose addresses are added to the certificate SANs.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ServiceReference {
    pub name: String,
}

/// Details for certificate generation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequest {
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub alternative_names: Vec<String>,
    /// Whether the generated certificate is a certificate authority.
    #[serde(default, rename = "isCA")]
    pub is_ca: bool,
    /// Reference to the CA certificate used to sign the leaf.
    #[serde(default, rename = "CARef")]
    pub ca_ref: SecretReference,
    /// Reference to the CA private key used to sign the leaf.
    #[serde(default, rename = "CAKeyRef")]
    pub ca_key_ref: SecretReference,
    /// `local` or `cluster`; defaults to `local` when empty.
    #[serde(default)]
    pub signer_type: String,
    /// Requested certificate usages, forwarded to the cluster signer.
    #[serde(default)]
    pub usages: Vec<String>,
    /// Services whose DNS names and IPs are appended to the SAN list.
    #[serde(default)]
    pub service_ref: Vec<ServiceReference>,
    /// Use the first referenced service's cluster IP as the common name, to
    /// work around SAN handling on EKS.
    #[serde(default, rename = "activateEKSWorkaroundForSAN")]
    pub activate_eks_workaround_for_san: bool,
}

/// Details for generating a basic-auth secret.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct BasicAuthRequest {
    /// Preset username; generated when empty.
    #[serde(default)]
    pub username: String,
}

/// Details for generating docker registry image credentials.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ImageCredentialsRequest {
    #[serde(default)]
    pub username: SecretReference,
    #[serde(default)]
    pub password: SecretReference,
    #[serde(default)]
    pub registry: String,
    #[serde(default)]
    pub email: String,
}

/// Templates to render, one per output key, and the secret references that
/// supply the template values.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct TemplatedConfigRequest {
    /// Template engine tag; only `helm` is supported.
    #[serde(default, rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    #[serde(default)]
    pub values: BTreeMap<String, SecretReference>,
}

/// Destination of a copied generated secret.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct Copy {
    pub name: String,
    pub namespace: String,
}

impl std::fmt::Display for Copy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl QuarksSecret {
    /// The resource name with its namespace, `<namespace>/<name>`.
    pub fn namespaced_name(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }
}

/// Name of the cluster-scoped CSR submitted for a QuarksSecret. Deterministic
/// in `(namespace, name)` so repeated reconciles converge on one CSR.
pub fn csr_name(namespace: &str, name: &str) -> String {
    format!("{namespace}-{name}")
}

/// Name of the secret holding the private key while the CSR is pending.
pub fn csr_private_key_secret_name(csr_name: &str) -> String {
    format!("{csr_name}-key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn csr_name_is_deterministic() {
        assert_eq!(csr_name("default", "qsec1"), "default-qsec1");
        assert_eq!(csr_name("default", "qsec1"), csr_name("default", "qsec1"));
        assert_eq!(
            csr_private_key_secret_name(&csr_name("default", "qsec1")),
            "default-qsec1-key"
        );
    }

    #[test]
    fn spec_round_trips_through_wire_format() {
        let json = serde_json::json!({
            "type": "certificate",
            "secretName": "gen-cert",
            "request": {
                "certificate": {
                    "commonName": "example.com",
                    "alternativeNames": ["www.example.com"],
                    "isCA": false,
                    "CARef": {"name": "ca-secret", "key": "certificate"},
                    "CAKeyRef": {"name": "ca-secret", "key": "private_key"},
                    "signerType": "local"
                }
            },
            "copies": [{"name": "copy1", "namespace": "other"}]
        });

        let spec: QuarksSecretSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.type_, secret_type::CERTIFICATE);
        assert_eq!(spec.secret_name, "gen-cert");
        assert_eq!(spec.request.certificate.common_name, "example.com");
        assert_eq!(spec.request.certificate.ca_ref.name, "ca-secret");
        assert_eq!(spec.copies[0].to_string(), "other/copy1");
    }

    #[test]
    fn request_fields_default_when_absent() {
        let json = serde_json::json!({
            "type": "password",
            "secretName": "gen-secret1"
        });

        let spec: QuarksSecretSpec = serde_json::from_value(json).unwrap();
        assert!(spec.copies.is_empty());
        assert!(spec.request.certificate.common_name.is_empty());
        assert!(!spec.request.certificate.is_ca);
    }

    #[test]
    fn crd_carries_shortnames_and_printcolumns() {
        let crd = QuarksSecret::crd();
        assert_eq!(crd.spec.group, crate::constants::GROUP_NAME);
        let names = &crd.spec.names;
        assert_eq!(names.plural, "quarkssecrets");
        assert_eq!(
            names.short_names.as_deref().unwrap_or_default(),
            ["qsec", "qsecs"]
        );
        let columns = crd.spec.versions[0]
            .additional_printer_columns
            .as_deref()
            .unwrap_or_default();
        assert!(columns.iter().any(|c| c.json_path == ".spec.type"));
        assert!(columns.iter().any(|c| c.json_path == ".status.generated"));
    }
}
