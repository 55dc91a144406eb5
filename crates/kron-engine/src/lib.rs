//! Scheduling core of the kron controller.
//!
//! - [`ReconciliationEngine`] turns template watch events into cron
//!   triggers that create executions.
//! - [`RetentionCollector`] deletes executions (and their pods) once they
//!   outlive the retention threshold.
//! - [`run_watch_loop`] drives the engine from the cluster's watch stream.

pub mod reconcile;
pub mod registry;
pub mod retention;
mod retry;
pub mod trigger;
pub mod watch;

#[cfg(test)]
pub(crate) mod testing;

pub use reconcile::{fire_action, ReconcileError, ReconciliationEngine};
pub use registry::ScheduleRegistry;
pub use retention::{CollectError, CollectReport, RetentionCollector, RetentionPolicy};
pub use trigger::{normalize_expression, FireAction, TriggerError, TriggerId, TriggerScheduler};
pub use watch::{run_watch_loop, WatchLoopError, WatchOptions};
