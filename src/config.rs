//! Controller settings parsed from command line flags and environment variables.

use clap::Parser;

use crate::constants;

/// Runtime settings for the controller.
///
/// Every flag can also be supplied through its environment variable, which is
/// how the Helm chart configures the deployed controller.
#[derive(Parser, Debug, Clone)]
#[command(name = "quarks-secret-controller", version, about)]
pub struct Settings {
    /// ID of this operator instance. Only namespaces labeled
    /// `quarks.cloudfoundry.org/monitored=<id>` are reconciled, and only CSRs
    /// annotated with this ID are approved.
    #[arg(long, env = "MONITORED_ID")]
    pub monitored_id: String,

    /// Apply the QuarksSecret CRD at startup and wait for it to be established.
    #[arg(long, env = "APPLY_CRD", default_value_t = true, action = clap::ArgAction::Set)]
    pub apply_crd: bool,

    /// Maximum number of concurrently running reconciles per controller.
    #[arg(long, env = "MAX_WORKERS", default_value_t = 1)]
    pub max_workers: u16,

    /// Duration of the per-resource meltdown window, in seconds.
    #[arg(long = "meltdown-duration", env = "MELTDOWN_DURATION", default_value_t = 60)]
    pub meltdown_duration_secs: u64,

    /// Requeue delay while a resource is inside its meltdown window, in seconds.
    #[arg(long = "meltdown-requeue-after", env = "MELTDOWN_REQUEUE_AFTER", default_value_t = 30)]
    pub meltdown_requeue_after_secs: u64,

    /// Deadline for a single reconcile, in seconds.
    #[arg(long = "ctx-timeout", env = "CTX_TIMEOUT", default_value_t = 30)]
    pub ctx_timeout_secs: u64,

    /// Port of the metrics and probe HTTP server.
    #[arg(long, env = "METRICS_PORT", default_value_t = constants::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

impl Settings {
    /// The meltdown window duration.
    pub fn meltdown_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.meltdown_duration_secs as i64)
    }

    /// The requeue delay for resources inside the meltdown window.
    pub fn meltdown_requeue_after(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.meltdown_requeue_after_secs)
    }

    /// The per-reconcile deadline.
    pub fn ctx_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ctx_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let settings =
            Settings::try_parse_from(["quarks-secret-controller", "--monitored-id", "default"])
                .unwrap();
        assert_eq!(settings.monitored_id, "default");
        assert!(settings.apply_crd);
        assert_eq!(settings.max_workers, 1);
        assert_eq!(settings.meltdown_duration_secs, 60);
        assert_eq!(settings.meltdown_requeue_after_secs, 30);
        assert_eq!(settings.ctx_timeout_secs, 30);
    }

    #[test]
    fn missing_monitored_id_is_an_error() {
        assert!(Settings::try_parse_from(["quarks-secret-controller"]).is_err());
    }

    #[test]
    fn apply_crd_can_be_disabled() {
        let settings = Settings::try_parse_from([
            "quarks-secret-controller",
            "--monitored-id",
            "id1",
            "--apply-crd",
            "false",
        ])
        .unwrap();
        assert!(!settings.apply_crd);
    }
}
