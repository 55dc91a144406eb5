//! Age-based collection of finished executions and their pods.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use kron_core::labels::{correlation_selector, execution_selector};
use kron_core::{ClusterClient, ClusterError, ScheduledExecution};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to list executions: {0}")]
    List(#[source] ClusterError),

    #[error("execution {execution} has no creation timestamp")]
    MissingTimestamp { execution: String },

    #[error("execution {execution} has no uid; its pods cannot be located")]
    MissingUid { execution: String },

    #[error("failed to list pods of {execution}: {source}")]
    ListPods {
        execution: String,
        #[source]
        source: ClusterError,
    },

    #[error("failed to delete pod {pod} of {execution}: {source}")]
    DeletePod {
        execution: String,
        pod: String,
        #[source]
        source: ClusterError,
    },

    #[error("failed to delete execution {execution}: {source}")]
    DeleteExecution {
        execution: String,
        #[source]
        source: ClusterError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Executions strictly older than this are deleted.
    pub max_age: TimeDelta,
    /// Sleep between passes.
    pub interval: Duration,
}

/// Outcome of one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub examined: usize,
    pub deleted: usize,
    pub kept: usize,
    pub failed: usize,
}

pub struct RetentionCollector<C: ClusterClient> {
    client: Arc<C>,
    policy: RetentionPolicy,
}

impl<C: ClusterClient> RetentionCollector<C> {
    pub fn new(client: Arc<C>, policy: RetentionPolicy) -> Self {
        Self { client, policy }
    }

    /// Runs one pass against the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::List`] if executions cannot be listed; no
    /// execution is touched in that case.
    pub async fn collect(&self) -> Result<CollectReport, CollectError> {
        self.collect_at(Utc::now()).await
    }

    /// Runs one pass, measuring ages against `now`.
    ///
    /// Per-execution failures are logged and counted; they never abort the
    /// pass.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::List`] if executions cannot be listed.
    pub async fn collect_at(&self, now: DateTime<Utc>) -> Result<CollectReport, CollectError> {
        let executions = self
            .client
            .list_executions(&execution_selector())
            .await
            .map_err(CollectError::List)?;

        let mut report = CollectReport {
            examined: executions.len(),
            ..CollectReport::default()
        };

        for execution in &executions {
            let Some(created_at) = execution.created_at else {
                let e = CollectError::MissingTimestamp {
                    execution: execution.name.clone(),
                };
                tracing::warn!(error = %e, "retention: skipping execution");
                report.failed += 1;
                continue;
            };

            let age = now - created_at;
            tracing::debug!(
                execution = %execution.name,
                age_secs = age.num_seconds(),
                "retention: found execution"
            );
            if age <= self.policy.max_age {
                report.kept += 1;
                continue;
            }

            match self.reap(execution).await {
                Ok(pods) => {
                    tracing::info!(
                        execution = %execution.name,
                        pods,
                        "retention: deleted expired execution"
                    );
                    report.deleted += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "retention: skipping execution until next pass");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Runs passes every `policy.interval` until `shutdown` flips to `true`
    /// or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!(
            interval_secs = self.policy.interval.as_secs(),
            max_age_secs = self.policy.max_age.num_seconds(),
            "retention: collector enabled"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tracing::debug!("retention: collecting garbage");
            match self.collect().await {
                Ok(report) => tracing::info!(
                    examined = report.examined,
                    deleted = report.deleted,
                    kept = report.kept,
                    failed = report.failed,
                    "retention: pass complete"
                ),
                Err(e) => tracing::error!(error = %e, "retention: pass aborted"),
            }

            tokio::select! {
                () = tokio::time::sleep(self.policy.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("retention: collector stopped");
    }

    /// Deletes the execution's pods, then the execution. Returns the number
    /// of pods deleted.
    async fn reap(&self, execution: &ScheduledExecution) -> Result<usize, CollectError> {
        let uid = execution
            .uid
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CollectError::MissingUid {
                execution: execution.name.clone(),
            })?;

        let pods = self
            .client
            .list_pods(&correlation_selector(uid))
            .await
            .map_err(|source| CollectError::ListPods {
                execution: execution.name.clone(),
                source,
            })?;

        for pod in &pods {
            self.client
                .delete_pod(&pod.name)
                .await
                .map_err(|source| CollectError::DeletePod {
                    execution: execution.name.clone(),
                    pod: pod.name.clone(),
                    source,
                })?;
        }

        self.client
            .delete_execution(&execution.name)
            .await
            .map_err(|source| CollectError::DeleteExecution {
                execution: execution.name.clone(),
                source,
            })?;

        Ok(pods.len())
    }
}
