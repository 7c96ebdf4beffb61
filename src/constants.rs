//! Shared constants: API group, label and annotation keys, default timings.

/// API group of the QuarksSecret custom resource.
pub const GROUP_NAME: &str = "quarks.cloudfoundry.org";

/// Label key marking the kind of a secret produced by this operator.
pub const LABEL_SECRET_KIND: &str = "quarks.cloudfoundry.org/secret-kind";

/// Label value marking a secret as generated by this operator.
pub const GENERATED_SECRET_KIND: &str = "generated";

/// Label key on a namespace, indicating which operator instance monitors it.
pub const LABEL_MONITORED_NAMESPACE: &str = "quarks.cloudfoundry.org/monitored";

/// Annotation key for secrets that are copies of generated secrets,
/// holding `<source namespace>/<source name>`.
pub const ANNOTATION_COPY_OF: &str = "quarks.cloudfoundry.org/secret-copy-of";

/// Annotation key on a CSR naming the target certificate secret.
pub const ANNOTATION_CERT_SECRET_NAME: &str = "quarks.cloudfoundry.org/cert-secret-name";

/// Annotation key on a CSR naming the owning QuarksSecret.
pub const ANNOTATION_QSEC_NAME: &str = "quarks.cloudfoundry.org/quarks-secret-name";

/// Annotation key on a CSR naming the owning QuarksSecret's namespace,
/// since CSRs are cluster scoped.
pub const ANNOTATION_QSEC_NAMESPACE: &str = "quarks.cloudfoundry.org/quarks-secret-namespace";

/// Annotation key linking a CSR (and the private key holder secret) to a
/// specific operator instance.
pub const ANNOTATION_MONITORED_ID: &str = "quarks.cloudfoundry.org/monitored-id";

/// Label key on a ConfigMap that triggers secret rotation when the
/// ConfigMap is created.
pub const LABEL_SECRET_ROTATION: &str = "quarks.cloudfoundry.org/secret-rotation";

/// Annotation recording that a rotation ConfigMap has been processed, so a
/// controller restart does not rotate the listed secrets again.
pub const ANNOTATION_ROTATION_PROCESSED: &str = "quarks.cloudfoundry.org/rotation-processed";

/// ConfigMap entry holding the JSON array of QuarksSecret names to rotate.
pub const ROTATE_LIST_KEY: &str = "secrets";

/// Field manager used for server side apply and status patches.
pub const FIELD_MANAGER: &str = "quarks-secret-controller";

/// Signer name requested for cluster-signed certificates.
pub const CLUSTER_SIGNER_NAME: &str = "kubernetes.io/legacy-unknown";

/// ConfigMap holding the cluster root CA bundle, present in every namespace.
pub const ROOT_CA_CONFIG_MAP: &str = "kube-root-ca.crt";

/// Key of the CA bundle inside [`ROOT_CA_CONFIG_MAP`].
pub const ROOT_CA_KEY: &str = "ca.crt";

/// Requeue delay when a referenced CA or input secret is not ready yet.
pub const NOT_READY_REQUEUE_SECS: u64 = 5;

/// Requeue delay while waiting for the cluster signer to attach a certificate.
pub const CSR_PENDING_REQUEUE_SECS: u64 = 1;

/// Default port for the metrics and probe HTTP server.
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind during startup.
pub const SERVER_STARTUP_TIMEOUT_SECS: u64 = 30;

/// Poll interval while waiting for the HTTP server to bind.
pub const SERVER_POLL_INTERVAL_MS: u64 = 100;

/// How long to wait for the applied CRD to become established.
pub const CRD_READY_TIMEOUT_SECS: u64 = 60;
