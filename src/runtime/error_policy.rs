//! Error handling for the controller watch loops.

use std::sync::Arc;
use std::time::Duration;

use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use tracing::{error, info, warn};

use crate::controller::{Ctx, ReconcilerError};
use crate::observability::metrics;

/// Requeue delay when the per-resource backoff state is unavailable.
const FALLBACK_REQUEUE_SECS: u64 = 60;

/// Handle a reconciliation error.
///
/// Stale resource version conflicts requeue immediately; everything else
/// backs off with a per-resource Fibonacci sequence so one failing resource
/// does not slow down its peers.
pub fn requeue_for_error<K>(obj: Arc<K>, error: &ReconcilerError, ctx: Arc<Ctx>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    error!(
        "Reconciliation error for '{}/{}': {}",
        namespace, name, error
    );
    metrics::increment_reconciliation_errors();

    if error.is_conflict() {
        metrics::increment_requeues("conflict");
        return Action::requeue(Duration::from_secs(1));
    }

    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(resource_key).or_default();
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(err) => {
            warn!(
                "Failed to lock backoff states: {}, using default requeue",
                err
            );
            (FALLBACK_REQUEUE_SECS, 0)
        }
    };

    info!(
        "Retrying '{}/{}' with Fibonacci backoff: {}s (error count: {})",
        namespace, name, backoff_seconds, error_count
    );
    metrics::increment_requeues("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}
