use anyhow::Result;

use quarks_secret_controller::controller;
use quarks_secret_controller::runtime::initialization::initialize;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the controller runtime: tracing, metrics, probe server,
    // Kubernetes client, CRD install.
    let init_result = initialize().await?;

    // Run all controllers until shutdown.
    controller::run(init_result.ctx).await?;

    Ok(())
}
