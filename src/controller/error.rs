//! Error taxonomy shared by all reconcilers.

use thiserror::Error;

/// Errors surfaced by the reconcilers.
///
/// `CaNotReady` and `SecretNotReady` are sentinels: the dispatcher translates
/// them into a short requeue instead of an error requeue with backoff, since
/// a missing dependency is expected to appear on its own.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The referenced CA certificate or key secret does not exist yet.
    #[error("CA not ready: {0}")]
    CaNotReady(String),

    /// A referenced input secret does not exist yet.
    #[error("secret not ready: {0}")]
    SecretNotReady(String),

    /// `spec.type` holds an unknown value; user intervention is expected.
    #[error("invalid type: {0}")]
    InvalidType(String),

    /// The resource is malformed beyond the type field.
    #[error("invalid resource: {0}")]
    Validation(String),

    /// Credential generation failed.
    #[error("credential generation failed: {0:#}")]
    Generation(#[source] anyhow::Error),

    /// Transport or API server error.
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    /// The reconcile exceeded its configured deadline.
    #[error("reconcile deadline exceeded")]
    DeadlineExceeded,
}

impl ReconcilerError {
    /// True for the sentinel variants that mean "dependency missing, try
    /// again shortly" rather than "something went wrong".
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            ReconcilerError::CaNotReady(_) | ReconcilerError::SecretNotReady(_)
        )
    }

    /// True when the underlying API error is an optimistic concurrency
    /// conflict on a stale resource version.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcilerError::Kube(kube::Error::Api(e)) if e.code == 409)
    }
}

pub type Result<T, E = ReconcilerError> = std::result::Result<T, E>;
