//! Cron-driven triggers.
//!
//! Wraps a [`JobScheduler`] and keeps its own table of registered triggers
//! so they can be inspected, removed idempotently and fired on demand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

/// Identifier of a registered trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerId(Uuid);

impl TriggerId {
    #[cfg(test)]
    pub(crate) fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// The work a trigger performs on every fire.
pub type FireAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("schedule expression is missing or empty")]
    MissingExpression,

    #[error("invalid schedule expression \"{expression}\": {source}")]
    InvalidExpression {
        expression: String,
        #[source]
        source: JobSchedulerError,
    },

    #[error("scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

struct Trigger {
    expression: String,
    action: FireAction,
    running: Arc<AtomicBool>,
}

/// Registers, removes and fires cron triggers.
///
/// `add`/`remove` take `&mut self`: only the reconciliation engine calls
/// them. Fire actions run on the scheduler's own tasks.
pub struct TriggerScheduler {
    scheduler: JobScheduler,
    triggers: HashMap<TriggerId, Trigger>,
    in_flight: Arc<AtomicUsize>,
}

impl TriggerScheduler {
    /// Creates a scheduler that does not fire until [`start`](Self::start)
    /// is called.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Scheduler`] if the underlying scheduler
    /// cannot be initialised.
    pub async fn new() -> Result<Self, TriggerError> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            triggers: HashMap::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Starts firing registered triggers.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Scheduler`] if the scheduler fails to start.
    pub async fn start(&self) -> Result<(), TriggerError> {
        self.scheduler.start().await?;
        Ok(())
    }

    /// Registers `action` to run at every occurrence of `expression`.
    ///
    /// # Errors
    ///
    /// - [`TriggerError::MissingExpression`] for an empty expression.
    /// - [`TriggerError::InvalidExpression`] if the expression does not parse.
    /// - [`TriggerError::Scheduler`] if the scheduler rejects the job.
    pub async fn add(
        &mut self,
        expression: &str,
        action: FireAction,
    ) -> Result<TriggerId, TriggerError> {
        let expression = normalize_expression(expression)?;
        let running = Arc::new(AtomicBool::new(false));

        let job = {
            let action = Arc::clone(&action);
            let running = Arc::clone(&running);
            let in_flight = Arc::clone(&self.in_flight);
            Job::new_async(expression.as_str(), move |_uuid, _lock| {
                let action = Arc::clone(&action);
                let running = Arc::clone(&running);
                let in_flight = Arc::clone(&in_flight);
                Box::pin(async move {
                    run_guarded(&running, &in_flight, &action).await;
                })
            })
            .map_err(|source| TriggerError::InvalidExpression {
                expression: expression.clone(),
                source,
            })?
        };

        let id = TriggerId(self.scheduler.add(job).await?);
        tracing::debug!(trigger = %id, expression = %expression, "trigger: registered");
        self.triggers.insert(
            id,
            Trigger {
                expression,
                action,
                running,
            },
        );
        Ok(id)
    }

    /// Removes a trigger. Unknown ids are ignored.
    pub async fn remove(&mut self, id: TriggerId) {
        if self.triggers.remove(&id).is_none() {
            return;
        }
        if let Err(e) = self.scheduler.remove(&id.0).await {
            tracing::warn!(trigger = %id, error = %e, "trigger: scheduler failed to drop job");
        } else {
            tracing::debug!(trigger = %id, "trigger: removed");
        }
    }

    /// Runs a trigger's action now, as if its schedule had fired.
    ///
    /// Returns `false` if the id is unknown or the trigger is already running.
    pub async fn fire(&self, id: TriggerId) -> bool {
        let Some(trigger) = self.triggers.get(&id) else {
            return false;
        };
        run_guarded(&trigger.running, &self.in_flight, &trigger.action).await
    }

    #[must_use]
    pub fn contains(&self, id: TriggerId) -> bool {
        self.triggers.contains_key(&id)
    }

    /// The normalized expression a trigger was registered with.
    #[must_use]
    pub fn expression(&self, id: TriggerId) -> Option<&str> {
        self.triggers.get(&id).map(|t| t.expression.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Number of fire actions currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stops the scheduler, then waits up to `drain_timeout` for in-flight
    /// fire actions to finish.
    pub async fn shutdown(&mut self, drain_timeout: Duration) {
        if let Err(e) = self.scheduler.shutdown().await {
            tracing::warn!(error = %e, "trigger: scheduler shutdown failed");
        }

        let deadline = tokio::time::Instant::now() + drain_timeout;
        loop {
            let pending = self.in_flight();
            if pending == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(pending, "trigger: drain timeout reached with fires still running");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Normalizes a cron expression for the scheduler.
///
/// Five-field expressions get a leading `0` seconds field; anything else
/// (six/seven fields, `@hourly`-style descriptors) passes through with
/// whitespace collapsed.
///
/// # Errors
///
/// Returns [`TriggerError::MissingExpression`] for an empty expression.
pub fn normalize_expression(expression: &str) -> Result<String, TriggerError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(TriggerError::MissingExpression);
    }
    if trimmed.starts_with('@') {
        return Ok(trimmed.to_string());
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() == 5 {
        Ok(format!("0 {}", fields.join(" ")))
    } else {
        Ok(fields.join(" "))
    }
}

/// Decrements the bookkeeping counters even if the action panics.
struct FireGuard<'a> {
    running: &'a AtomicBool,
    in_flight: &'a AtomicUsize,
}

impl Drop for FireGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

async fn run_guarded(running: &AtomicBool, in_flight: &AtomicUsize, action: &FireAction) -> bool {
    if running.swap(true, Ordering::SeqCst) {
        tracing::warn!("trigger: previous fire still running; skipping this occurrence");
        return false;
    }
    in_flight.fetch_add(1, Ordering::SeqCst);
    let _guard = FireGuard { running, in_flight };
    action().await;
    true
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use tokio::sync::watch;
    use tokio::time::Instant;

    use super::*;

    fn counting_action(counter: &Arc<AtomicU32>) -> FireAction {
        let counter = Arc::clone(counter);
        Arc::new(move || -> BoxFuture<'static, ()> {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    /// Counts starts, then blocks until `release` flips to `true`.
    fn blocking_action(started: &Arc<AtomicU32>, release: watch::Receiver<bool>) -> FireAction {
        let started = Arc::clone(started);
        Arc::new(move || -> BoxFuture<'static, ()> {
            let started = Arc::clone(&started);
            let mut release = release.clone();
            Box::pin(async move {
                started.fetch_add(1, Ordering::SeqCst);
                let _ = release.wait_for(|released| *released).await;
            })
        })
    }

    async fn wait_until_started(started: &AtomicU32) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while started.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("cron tick should start the action");
    }

    #[test]
    fn five_field_expression_gets_seconds() {
        assert_eq!(normalize_expression("*/1 * * * *").unwrap(), "0 */1 * * * *");
    }

    #[test]
    fn six_field_expression_is_kept() {
        assert_eq!(
            normalize_expression("  0 0 2 * *   SUN ").unwrap(),
            "0 0 2 * * SUN"
        );
    }

    #[test]
    fn descriptor_is_kept() {
        assert_eq!(normalize_expression("@hourly").unwrap(), "@hourly");
    }

    #[test]
    fn empty_expression_is_missing() {
        assert!(matches!(
            normalize_expression("   "),
            Err(TriggerError::MissingExpression)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn add_and_fire_runs_action() {
        let mut triggers = TriggerScheduler::new().await.unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let id = triggers
            .add("*/1 * * * *", counting_action(&counter))
            .await
            .unwrap();

        assert!(triggers.contains(id));
        assert_eq!(triggers.expression(id), Some("0 */1 * * * *"));
        assert!(triggers.fire(id).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(triggers.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_expression_is_rejected() {
        let mut triggers = TriggerScheduler::new().await.unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let err = triggers
            .add("not a cron", counting_action(&counter))
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::InvalidExpression { .. }));
        assert!(triggers.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn remove_is_idempotent() {
        let mut triggers = TriggerScheduler::new().await.unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let id = triggers
            .add("0 0 * * * *", counting_action(&counter))
            .await
            .unwrap();

        triggers.remove(id).await;
        triggers.remove(id).await;
        triggers.remove(TriggerId::new_v4()).await;

        assert!(!triggers.contains(id));
        assert!(!triggers.fire(id).await);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overlapping_fire_is_skipped() {
        let mut triggers = TriggerScheduler::new().await.unwrap();
        let (release_tx, release_rx) = watch::channel(false);
        let started = Arc::new(AtomicU32::new(0));

        let id = triggers
            .add("0 0 * * * *", blocking_action(&started, release_rx))
            .await
            .unwrap();

        let triggers = Arc::new(triggers);
        let first = {
            let triggers = Arc::clone(&triggers);
            tokio::spawn(async move { triggers.fire(id).await })
        };
        while started.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!triggers.fire(id).await, "second fire must be skipped");
        assert_eq!(triggers.in_flight(), 1);

        release_tx.send(true).unwrap();
        assert!(first.await.unwrap());
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(triggers.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn started_scheduler_fires_on_schedule() {
        let mut triggers = TriggerScheduler::new().await.unwrap();
        triggers.start().await.unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        triggers
            .add("* * * * * *", counting_action(&counter))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        triggers.shutdown(Duration::from_secs(1)).await;

        assert!(
            counter.load(Ordering::SeqCst) >= 1,
            "every-second trigger should have fired"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_waits_for_running_fire() {
        let mut triggers = TriggerScheduler::new().await.unwrap();
        triggers.start().await.unwrap();
        let (release_tx, release_rx) = watch::channel(false);
        let started = Arc::new(AtomicU32::new(0));
        triggers
            .add("* * * * * *", blocking_action(&started, release_rx))
            .await
            .unwrap();
        wait_until_started(&started).await;

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            release_tx.send(true).ok();
            release_tx
        });
        let begun = Instant::now();
        triggers.shutdown(Duration::from_secs(10)).await;
        let waited = begun.elapsed();

        assert!(waited >= Duration::from_millis(250), "returned after {waited:?}");
        assert!(waited < Duration::from_secs(10), "hit the drain timeout");
        assert_eq!(triggers.in_flight(), 0);
        release.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_gives_up_after_drain_timeout() {
        let mut triggers = TriggerScheduler::new().await.unwrap();
        triggers.start().await.unwrap();
        let (release_tx, release_rx) = watch::channel(false);
        let started = Arc::new(AtomicU32::new(0));
        triggers
            .add("* * * * * *", blocking_action(&started, release_rx))
            .await
            .unwrap();
        wait_until_started(&started).await;

        let begun = Instant::now();
        triggers.shutdown(Duration::from_millis(200)).await;
        let waited = begun.elapsed();

        assert!(waited >= Duration::from_millis(200), "returned after {waited:?}");
        assert!(waited < Duration::from_secs(5), "drain ignored its timeout");
        assert_eq!(triggers.in_flight(), 1);
        release_tx.send(true).unwrap();
    }
}
