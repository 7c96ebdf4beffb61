//! Observability: Prometheus metrics for the reconcilers.

pub mod metrics;
