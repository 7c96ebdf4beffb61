//! Prometheus metrics.

use std::sync::LazyLock;

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "quarks_secret_reconciliations_total",
            "Total number of successful reconciliations, by controller",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "quarks_secret_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "quarks_secret_requeues_total",
            "Total number of requeued reconciliations, by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric")
});

/// Register all metrics with the registry. Called once at startup.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    Ok(())
}

/// The registry backing the `/metrics` endpoint.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL
        .with_label_values(&[controller])
        .inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let before = RECONCILIATIONS_TOTAL
            .with_label_values(&["quarks-secret"])
            .get();
        increment_reconciliations("quarks-secret");
        let after = RECONCILIATIONS_TOTAL
            .with_label_values(&["quarks-secret"])
            .get();
        assert_eq!(after, before + 1);

        let before = REQUEUES_TOTAL.with_label_values(&["meltdown"]).get();
        increment_requeues("meltdown");
        assert_eq!(
            REQUEUES_TOTAL.with_label_values(&["meltdown"]).get(),
            before + 1
        );
    }
}
