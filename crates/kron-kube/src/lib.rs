//! [`ClusterClient`](kron_core::ClusterClient) backed by the Kubernetes
//! API: templates and executions are `batch/v1` Jobs, their workloads are
//! core Pods, all in one namespace.

pub mod client;
mod convert;
pub mod error;

pub use client::KubeClusterClient;
pub use error::ConnectError;
