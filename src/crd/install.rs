//! CRD installation: apply the QuarksSecret CRD and wait for it to be served.

use anyhow::{Context, Result};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};
use kube_runtime::wait::{await_condition, conditions};
use tracing::info;

use crate::constants;
use crate::crd::QuarksSecret;

/// Apply the QuarksSecret CRD and block until the API server reports it as
/// established. A failure here is an unrecoverable bootstrap error.
pub async fn apply(client: &Client) -> Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = QuarksSecret::crd();
    let name = crd
        .metadata
        .name
        .clone()
        .context("generated CRD has no name")?;

    info!("Applying CRD '{}'", name);
    crds.patch(
        &name,
        &PatchParams::apply(constants::FIELD_MANAGER).force(),
        &Patch::Apply(&crd),
    )
    .await
    .with_context(|| format!("failed to apply CRD '{name}'"))?;

    let established = await_condition(crds, &name, conditions::is_crd_established());
    tokio::time::timeout(
        std::time::Duration::from_secs(constants::CRD_READY_TIMEOUT_SECS),
        established,
    )
    .await
    .with_context(|| format!("timed out waiting for CRD '{name}' to become established"))?
    .with_context(|| format!("failed to wait for CRD '{name}' to become established"))?;

    info!("CRD '{}' is established", name);
    Ok(())
}
