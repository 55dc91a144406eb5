//! Feeds the template watch stream into the reconciliation engine.
//!
//! The loop keeps a resource-version cursor so a closed stream can be
//! resumed where it left off. Without a cursor (first start, or after the
//! server answered 410 Gone) it lists templates, drops triggers for those
//! that disappeared, and watches from `"0"` so current templates are
//! replayed as `Added` events.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use kron_core::{ClusterClient, ClusterError, JobTemplate, WatchEvent};
use thiserror::Error;
use tokio::sync::watch;

use crate::reconcile::ReconciliationEngine;
use crate::retry::retry_with_backoff;

const REPLAY_FROM_START: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    pub selector: String,
    pub retry_max: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Error)]
pub enum WatchLoopError {
    #[error("failed to establish template watch: {0}")]
    Establish(#[source] ClusterError),

    #[error("failed to re-establish template watch: {0}")]
    Reestablish(#[source] ClusterError),
}

/// Runs until `shutdown` flips to `true` (or its sender is dropped).
///
/// # Errors
///
/// - [`WatchLoopError::Establish`] if the very first watch cannot be opened.
/// - [`WatchLoopError::Reestablish`] if re-opening a closed watch keeps
///   failing after the configured retries.
pub async fn run_watch_loop<C: ClusterClient>(
    client: Arc<C>,
    engine: &mut ReconciliationEngine<C>,
    options: &WatchOptions,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), WatchLoopError> {
    let mut cursor: Option<String> = None;
    let mut established = false;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let (live, mut stream) = if established {
            retry_with_backoff(options.retry_max, options.retry_backoff_ms, || {
                open(client.as_ref(), &options.selector, cursor.as_deref())
            })
            .await
            .map_err(WatchLoopError::Reestablish)?
        } else {
            open(client.as_ref(), &options.selector, None)
                .await
                .map_err(WatchLoopError::Establish)?
        };
        established = true;

        if let Some(live) = live {
            tracing::info!(templates = live.len(), "watch: resyncing from template list");
            engine.resync(&live).await;
        }
        tracing::debug!(
            resource_version = cursor.as_deref().unwrap_or(REPLAY_FROM_START),
            "watch: stream open"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("watch: shutdown requested");
                        return Ok(());
                    }
                }
                next = stream.next() => {
                    let Some(event) = next else {
                        tracing::debug!("watch: stream closed; re-opening");
                        break;
                    };
                    if let WatchEvent::Error(err) = &event {
                        if err.is_gone() {
                            tracing::warn!(error = %err, "watch: cursor expired; relisting");
                            cursor = None;
                            break;
                        }
                    }
                    if let Some(version) = event.resource_version() {
                        cursor = Some(version.to_string());
                    }
                    engine.process(event).await;
                }
            }
        }
    }
}

/// Opens a watch from `cursor`, or lists and replays when there is none.
async fn open<C: ClusterClient>(
    client: &C,
    selector: &str,
    cursor: Option<&str>,
) -> Result<(Option<Vec<JobTemplate>>, BoxStream<'static, WatchEvent>), ClusterError> {
    match cursor {
        Some(version) => {
            let stream = client.watch_templates(selector, version).await?;
            Ok((None, stream))
        }
        None => {
            let live = client.list_templates(selector).await?;
            let stream = client.watch_templates(selector, REPLAY_FROM_START).await?;
            Ok((Some(live), stream))
        }
    }
}
