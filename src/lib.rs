//! # QuarksSecret Controller
//!
//! A Kubernetes controller that materializes `QuarksSecret` custom resources
//! into concrete `Secret` objects holding generated credentials.
//!
//! ## Overview
//!
//! The controller runs a small population of cooperating reconcilers:
//!
//! 1. **QuarksSecret reconciler** - dispatches on the declared secret type and
//!    generates passwords, RSA/SSH keypairs, X.509 certificates, TLS bundles,
//!    basic-auth pairs, docker registry credentials and templated configs
//! 2. **CSR reconciler** - approves operator-owned `CertificateSigningRequest`
//!    objects and harvests the cluster-signed certificate into the target secret
//! 3. **Rotation reconciler** - invalidates QuarksSecrets listed in a labeled
//!    rotation ConfigMap so they are regenerated
//! 4. **Copy reconciler** - propagates generated secret data into pre-provisioned
//!    copy destinations in peer namespaces
//!
//! ## Features
//!
//! - **Namespace partitioning**: only namespaces labeled with the operator's
//!   monitored ID are acted upon, so several operators can share a cluster
//! - **User-provided secrets**: a pre-existing secret without the `generated`
//!   label is treated as authoritative and never overwritten
//! - **Meltdown back-pressure**: a per-resource cooling-off window absorbs
//!   self-triggered reconcile cascades
//! - **Prometheus metrics**: reconcile counters exposed over HTTP
//! - **Health probes**: liveness and readiness endpoints

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod credsgen;
pub mod observability;
pub mod runtime;
