//! Controller initialization: rustls setup, tracing, metrics, probe server,
//! Kubernetes client and CRD install.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::constants;
use crate::controller::server::{start_server, ServerState};
use crate::controller::Ctx;
use crate::crd::{self, QuarksSecret};
use crate::observability;

/// Everything the watch loops need, produced once at startup.
pub struct InitializationResult {
    pub ctx: Arc<Ctx>,
    pub server_state: Arc<ServerState>,
}

/// Initialize the controller runtime.
pub async fn initialize() -> Result<InitializationResult> {
    // Configure the rustls crypto provider before any TLS connection is
    // attempted; rustls 0.23+ has no default provider without it.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarks_secret_controller=info".into()),
        )
        .init();

    let settings = Settings::parse();
    info!(
        "Starting QuarksSecret controller, monitored id '{}'",
        settings.monitored_id
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });
    let server_state_clone = server_state.clone();
    let server_port = settings.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(err) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", err);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    if settings.apply_crd {
        crd::install::apply(&client)
            .await
            .context("failed to apply the QuarksSecret CRD")?;
    }

    let ctx = Arc::new(Ctx::new(client, settings));

    // The watch lists existing resources on start; this summary only gives
    // operators visibility into what the controller found.
    log_existing_resources(&ctx).await;

    info!("Controller initialized, starting watch loops...");
    Ok(InitializationResult { ctx, server_state })
}

/// Wait for the HTTP server to become ready, so readiness probes pass as soon
/// as the controller starts reconciling.
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout =
        std::time::Duration::from_secs(constants::SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = std::time::Duration::from_millis(constants::SERVER_POLL_INTERVAL_MS);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            anyhow::bail!("HTTP server failed to start");
        }
        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            anyhow::bail!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            );
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Log a summary of the QuarksSecrets present at startup, per namespace.
async fn log_existing_resources(ctx: &Arc<Ctx>) {
    let api: Api<QuarksSecret> = Api::all(ctx.client.clone());
    match api.list(&ListParams::default()).await {
        Ok(list) => {
            let mut per_namespace: HashMap<String, usize> = HashMap::new();
            for item in &list.items {
                let namespace = item
                    .metadata
                    .namespace
                    .as_deref()
                    .unwrap_or("default")
                    .to_string();
                *per_namespace.entry(namespace).or_insert(0) += 1;
            }

            info!(
                "Found {} existing QuarksSecret resources in {} namespaces",
                list.items.len(),
                per_namespace.len()
            );
            let mut namespaces: Vec<_> = per_namespace.into_iter().collect();
            namespaces.sort();
            for (namespace, count) in namespaces {
                info!("Namespace '{}': {} resources", namespace, count);
            }
        }
        Err(err) => {
            error!("CRD is not queryable: {}. Is the CRD installed?", err);
            warn!("Continuing despite CRD queryability check failure - the watch will retry");
        }
    }
}
