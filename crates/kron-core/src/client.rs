//! The cluster capability the controller is written against.
//!
//! [`ClusterClient`] is the only way the engine and the collector talk to
//! the outside world. Implementations must tolerate concurrent calls: the
//! event loop, trigger fires and the retention pass all share one client.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::types::{JobTemplate, NewExecution, Pod, ScheduledExecution, WatchEvent};

/// Errors returned by a [`ClusterClient`].
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The object does not exist (anymore).
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: &'static str, name: String },

    /// The API server rejected the request.
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// The API server could not be reached or the connection broke.
    #[error("transport error: {0}")]
    Transport(String),

    /// An object could not be converted to or from its wire form.
    #[error("decode error for {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClusterError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { code, .. } => *code >= 500,
            Self::NotFound { .. } | Self::Decode { .. } => false,
        }
    }
}

/// List/watch/get/create/delete over templates, executions and pods in one
/// namespace.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    async fn list_templates(&self, selector: &str) -> Result<Vec<JobTemplate>, ClusterError>;

    /// Opens a watch on templates matching `selector`, starting after
    /// `resource_version` (`"0"` replays current templates as `Added`).
    ///
    /// Errors on the open stream are delivered as [`WatchEvent::Error`]
    /// items; the stream ends when the server closes the watch.
    async fn watch_templates(
        &self,
        selector: &str,
        resource_version: &str,
    ) -> Result<BoxStream<'static, WatchEvent>, ClusterError>;

    async fn get_template(&self, name: &str) -> Result<JobTemplate, ClusterError>;

    async fn create_execution(
        &self,
        execution: &NewExecution,
    ) -> Result<ScheduledExecution, ClusterError>;

    async fn list_executions(
        &self,
        selector: &str,
    ) -> Result<Vec<ScheduledExecution>, ClusterError>;

    async fn delete_execution(&self, name: &str) -> Result<(), ClusterError>;

    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>, ClusterError>;

    async fn delete_pod(&self, name: &str) -> Result<(), ClusterError>;
}
