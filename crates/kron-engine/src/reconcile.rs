//! Keeps the live trigger set consistent with the templates seen on the
//! watch stream.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use kron_core::{ClusterClient, ClusterError, JobTemplate, NewExecution, ObjectRef, WatchEvent};
use thiserror::Error;

use crate::registry::ScheduleRegistry;
use crate::trigger::{FireAction, TriggerError, TriggerId, TriggerScheduler};

/// Why a template ended up unscheduled after an event.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to fetch template {name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("template {name} has no usable schedule: {source}")]
    Schedule {
        name: String,
        #[source]
        source: TriggerError,
    },

    #[error("template {name} does not match selector {selector:?}")]
    NotSchedulable { name: String, selector: String },
}

/// Event-driven state machine mapping templates to triggers.
///
/// `process` takes `&mut self`, so events are handled one at a time and the
/// registry has a single writer.
pub struct ReconciliationEngine<C: ClusterClient> {
    client: Arc<C>,
    registry: ScheduleRegistry,
    triggers: TriggerScheduler,
    /// Selector the template watch uses; fetched templates must still match.
    selector: String,
}

impl<C: ClusterClient> ReconciliationEngine<C> {
    pub fn new(client: Arc<C>, triggers: TriggerScheduler, selector: impl Into<String>) -> Self {
        Self {
            client,
            registry: ScheduleRegistry::new(),
            triggers,
            selector: selector.into(),
        }
    }

    pub fn registry(&self) -> &ScheduleRegistry {
        &self.registry
    }

    pub fn triggers(&self) -> &TriggerScheduler {
        &self.triggers
    }

    /// Applies one watch event.
    ///
    /// Never fails: every problem is logged and confined to the template
    /// the event was about.
    pub async fn process(&mut self, event: WatchEvent) {
        tracing::debug!(kind = event.kind(), "reconcile: got event");

        match event {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) => self.apply(&obj).await,
            WatchEvent::Deleted(obj) => {
                let Some(name) = obj.resolved_name() else {
                    tracing::debug!("reconcile: dropping delete without a resolvable name");
                    return;
                };
                let name = name.to_string();
                if self.unschedule(&name).await {
                    tracing::info!(
                        template = %name,
                        total = self.triggers.len(),
                        "reconcile: template deleted; trigger removed"
                    );
                }
            }
            WatchEvent::Bookmark { .. } => {}
            WatchEvent::Error(err) => {
                tracing::error!(error = %err, "reconcile: watch stream reported an error");
            }
            other => {
                tracing::warn!(kind = other.kind(), "reconcile: ignoring unrecognized event");
            }
        }
    }

    /// Drops triggers for registered templates that are not in `live`.
    ///
    /// Used after a watch gap, when deletions may have been missed.
    pub async fn resync(&mut self, live: &[JobTemplate]) {
        let live: HashSet<&str> = live.iter().map(|t| t.name.as_str()).collect();
        for name in self.registry.names() {
            if !live.contains(name.as_str()) {
                self.unschedule(&name).await;
                tracing::info!(template = %name, "reconcile: template vanished during watch gap; unscheduled");
            }
        }
    }

    /// Stops firing and waits for in-flight fires to complete.
    pub async fn shutdown(&mut self, drain_timeout: Duration) {
        self.triggers.shutdown(drain_timeout).await;
    }

    async fn apply(&mut self, obj: &ObjectRef) {
        let Some(name) = obj.resolved_name() else {
            tracing::debug!("reconcile: dropping event without a resolvable name");
            return;
        };
        let name = name.to_string();

        self.unschedule(&name).await;

        match self.schedule(&name).await {
            Ok(id) => {
                self.registry.insert(name.clone(), id);
                tracing::info!(
                    template = %name,
                    trigger = %id,
                    expression = self.triggers.expression(id).unwrap_or_default(),
                    total = self.triggers.len(),
                    "reconcile: template scheduled"
                );
            }
            Err(e @ ReconcileError::NotSchedulable { .. }) => {
                tracing::warn!(template = %name, reason = %e, "reconcile: template left unscheduled");
            }
            Err(e) => {
                tracing::error!(template = %name, error = %e, "reconcile: template left unscheduled");
            }
        }
    }

    async fn schedule(&mut self, name: &str) -> Result<TriggerId, ReconcileError> {
        let template =
            self.client
                .get_template(name)
                .await
                .map_err(|source| ReconcileError::Fetch {
                    name: name.to_string(),
                    source,
                })?;

        if !template.matches_selector(&self.selector) {
            return Err(ReconcileError::NotSchedulable {
                name: name.to_string(),
                selector: self.selector.clone(),
            });
        }

        let expression = template.schedule.as_deref().unwrap_or_default();
        let action = fire_action(Arc::clone(&self.client), template.to_execution());
        self.triggers
            .add(expression, action)
            .await
            .map_err(|source| ReconcileError::Schedule {
                name: name.to_string(),
                source,
            })
    }

    /// Removes the trigger and registry entry for `name`. Returns whether
    /// anything was registered.
    async fn unschedule(&mut self, name: &str) -> bool {
        match self.registry.remove(name) {
            Some(id) => {
                self.triggers.remove(id).await;
                true
            }
            None => false,
        }
    }
}

/// Builds the fire action for a template snapshot.
///
/// The action owns `snapshot`; nothing it captures can be changed by later
/// events. Each fire submits one execution and only logs on failure, the
/// next occurrence being the retry.
pub fn fire_action<C: ClusterClient>(client: Arc<C>, snapshot: NewExecution) -> FireAction {
    let snapshot = Arc::new(snapshot);
    Arc::new(move || -> BoxFuture<'static, ()> {
        let client = Arc::clone(&client);
        let snapshot = Arc::clone(&snapshot);
        Box::pin(async move {
            let template = snapshot.template_name().unwrap_or_default();
            match client.create_execution(&snapshot).await {
                Ok(created) => {
                    tracing::info!(template, execution = %created.name, "reconcile: scheduled a job");
                }
                Err(e) => {
                    tracing::error!(template, error = %e, "reconcile: failed to create execution");
                }
            }
        })
    })
}
