//! # Controllers
//!
//! The reconcilers and their shared context. Four controllers cooperate:
//!
//! - [`quarks_secret`] generates credentials for QuarksSecret resources
//! - [`csr`] approves and harvests cluster-signed certificate requests
//! - [`rotation`] invalidates QuarksSecrets named in rotation ConfigMaps
//! - [`copy`] propagates generated data into peer-namespace copies
//!
//! plus [`secret_watch`], a plain watcher that detects drift on user-provided
//! secrets and invalidates the referencing QuarksSecrets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use kube_runtime::{controller, watcher, Controller};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::constants;
use crate::crd::QuarksSecret;
use crate::credsgen::{Generator, InMemoryGenerator};
use crate::runtime::error_policy;

pub mod backoff;
pub mod copy;
pub mod csr;
pub mod error;
pub mod meltdown;
pub mod predicate;
pub mod quarks_secret;
pub mod reference;
pub mod rotation;
pub mod secret_watch;
pub mod server;
pub mod status;

pub use error::ReconcilerError;

use backoff::BackoffState;

/// Shared context handed to every reconciler.
pub struct Ctx {
    pub client: Client,
    pub settings: Settings,
    pub generator: Box<dyn Generator>,
    recorder: Recorder,
    /// Per-resource error backoff, keyed by `<namespace>/<name>`.
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl Ctx {
    pub fn new(client: Client, settings: Settings) -> Self {
        let reporter = Reporter {
            controller: constants::FIELD_MANAGER.into(),
            instance: Some(settings.monitored_id.clone()),
        };
        let recorder = Recorder::new(client.clone(), reporter);
        Ctx {
            client,
            settings,
            generator: Box::new(InMemoryGenerator::new()),
            recorder,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Publish a Kubernetes event for the object. Event delivery is best
    /// effort and never fails the reconcile.
    pub async fn publish_event<K>(&self, obj: &K, type_: EventType, reason: &str, note: String)
    where
        K: Resource<DynamicType = ()>,
    {
        let reference = obj.object_ref(&());
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: "Reconciling".into(),
            secondary: None,
        };
        if let Err(err) = self.recorder.publish(&event, &reference).await {
            warn!("Failed to publish '{}' event: {}", reason, err);
        }
    }

    /// Forget the error backoff for a resource after a successful reconcile.
    pub fn clear_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}

/// Run all controllers until shutdown. Each controller dedups reconcile
/// requests by namespaced name and dispatches to a bounded worker pool.
pub async fn run(ctx: Arc<Ctx>) -> anyhow::Result<()> {
    let client = ctx.client.clone();
    let concurrency = ctx.settings.max_workers;

    secret_watch::spawn(ctx.clone());

    let quarks_secret_controller = Controller::new(
        Api::<QuarksSecret>::all(client.clone()),
        watcher::Config::default(),
    )
    .with_config(controller::Config::default().concurrency(concurrency))
    .shutdown_on_signal()
    .run(
        quarks_secret::reconcile,
        error_policy::requeue_for_error,
        ctx.clone(),
    )
    .for_each(|result| async move { log_result("quarks-secret", result) });

    let csr_controller = Controller::new(
        Api::<CertificateSigningRequest>::all(client.clone()),
        watcher::Config::default(),
    )
    .with_config(controller::Config::default().concurrency(concurrency))
    .shutdown_on_signal()
    .run(csr::reconcile, error_policy::requeue_for_error, ctx.clone())
    .for_each(|result| async move { log_result("certificate-signing-request", result) });

    // Rotation config maps are selected by label on the server side.
    let rotation_controller = Controller::new(
        Api::<ConfigMap>::all(client.clone()),
        watcher::Config::default().labels(&format!("{}=yes", constants::LABEL_SECRET_ROTATION)),
    )
    .with_config(controller::Config::default().concurrency(concurrency))
    .shutdown_on_signal()
    .run(
        rotation::reconcile,
        error_policy::requeue_for_error,
        ctx.clone(),
    )
    .for_each(|result| async move { log_result("secret-rotation", result) });

    let copy_controller = Controller::new(
        Api::<QuarksSecret>::all(client.clone()),
        watcher::Config::default(),
    )
    .with_config(controller::Config::default().concurrency(concurrency))
    .shutdown_on_signal()
    .run(copy::reconcile, error_policy::requeue_for_error, ctx.clone())
    .for_each(|result| async move { log_result("copy", result) });

    tokio::select! {
        _ = quarks_secret_controller => warn!("QuarksSecret controller stopped"),
        _ = csr_controller => warn!("CSR controller stopped"),
        _ = rotation_controller => warn!("Rotation controller stopped"),
        _ = copy_controller => warn!("Copy controller stopped"),
    }

    Ok(())
}

fn log_result<K, E>(
    controller_name: &str,
    result: Result<(kube_runtime::reflector::ObjectRef<K>, controller::Action), E>,
) where
    K: kube_runtime::reflector::Lookup + ?Sized,
    E: std::fmt::Display,
{
    match result {
        Ok((obj_ref, _)) => debug!(
            "{} reconciled '{}/{}'",
            controller_name,
            obj_ref.namespace.as_deref().unwrap_or_default(),
            obj_ref.name
        ),
        Err(err) => warn!("{} reconcile failed: {}", controller_name, err),
    }
}
