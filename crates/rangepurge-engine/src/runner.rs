//! Batch purge loop.
//!
//! [`PurgeRunner`] executes a claimed [`RunPlan`]: it pages the channel's
//! history from the start marker toward the end marker, drops messages past
//! the end or in the exclusion snapshot, and deletes each page's remainder
//! in one bulk call.
//!
//! ## Exits
//!
//! ```text
//! page contains end marker ──> Completed   (report, remove session)
//! history exhausted        ──> Exhausted   (report error, release session)
//! fetch / delete failure   ──> Failed      (report error, release session)
//! cancellation token fired ──> Cancelled   (report, release session)
//! progress sink failure    ──> SinkClosed  (release session)
//! ```
//!
//! Pages and deletes are strictly sequential; there is never more than one
//! bulk delete in flight per run. Nothing is retried.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use rangepurge_core::{ChannelId, MessageId, PurgeError};
use rangepurge_session::{RunPlan, SessionStore};

use crate::transport::{MessageTransport, ProgressReport, ProgressSink, TransportError};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The end marker was reached and the session removed.
    Completed { total: usize, batches: usize },
    /// A fetch or delete failed.
    Failed { error: PurgeError, total: usize },
    /// History ran out before the end marker showed up.
    Exhausted { total: usize },
    /// The run was cancelled through its token.
    Cancelled { total: usize },
    /// The progress sink stopped accepting reports.
    SinkClosed { total: usize },
}

impl RunOutcome {
    /// Messages deleted before the run ended.
    pub fn total(&self) -> usize {
        match self {
            RunOutcome::Completed { total, .. }
            | RunOutcome::Failed { total, .. }
            | RunOutcome::Exhausted { total }
            | RunOutcome::Cancelled { total }
            | RunOutcome::SinkClosed { total } => *total,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// Handle to a purge running in the background.
#[derive(Debug)]
pub struct RunHandle {
    id: Uuid,
    channel: ChannelId,
    cancel_token: CancellationToken,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Request cancellation; takes effect at the next suspension point.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// A clone of the run's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end.
    pub async fn wait(self) -> Result<RunOutcome, tokio::task::JoinError> {
        self.join.await
    }
}

/// Executes claimed purge plans against a transport.
#[derive(Clone)]
pub struct PurgeRunner {
    transport: Arc<dyn MessageTransport>,
    store: Arc<SessionStore>,
}

impl PurgeRunner {
    pub fn new(transport: Arc<dyn MessageTransport>, store: Arc<SessionStore>) -> Self {
        Self { transport, store }
    }

    /// Run `plan` on a background task.
    pub fn spawn(
        &self,
        channel: ChannelId,
        plan: RunPlan,
        sink: Arc<dyn ProgressSink>,
    ) -> RunHandle {
        let id = Uuid::new_v4();
        let cancel_token = CancellationToken::new();
        let span = info_span!("purge", run = %id, %channel);

        let runner = self.clone();
        let token = cancel_token.clone();
        let join = tokio::spawn(
            async move { runner.run(channel, plan, sink.as_ref(), token).await }.instrument(span),
        );

        RunHandle {
            id,
            channel,
            cancel_token,
            join,
        }
    }

    /// Run `plan` to one of its exits on the current task.
    pub async fn run(
        &self,
        channel: ChannelId,
        plan: RunPlan,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> RunOutcome {
        info!(
            start = %plan.start,
            end = %plan.end,
            direction = ?plan.direction,
            bulk_limit = plan.bulk_limit,
            "Purge started"
        );

        let mut cursor = match self
            .transport
            .open_history(channel, plan.start, plan.bulk_limit)
            .await
        {
            Ok(cursor) => cursor,
            Err(e) => {
                return self
                    .fail(channel, &plan, sink, PurgeError::PageFetchFailed(e.to_string()), 0)
                    .await;
            }
        };

        let mut total = 0;
        let mut index = 0;
        loop {
            if cancel.is_cancelled() {
                return self.cancelled(channel, &plan, sink, total).await;
            }

            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(channel, &plan, sink, total).await,
                page = cursor.advance(plan.direction) => page,
            };
            let items = match page {
                Ok(items) if !items.is_empty() => items,
                Ok(_) | Err(TransportError::NoMorePages) => {
                    warn!(total, "History exhausted before the end marker");
                    let error = PurgeError::RangeExhaustedWithoutEnd(plan.end);
                    self.fail(channel, &plan, sink, error, total).await;
                    return RunOutcome::Exhausted { total };
                }
                Err(e) => {
                    return self
                        .fail(channel, &plan, sink, PurgeError::PageFetchFailed(e.to_string()), total)
                        .await;
                }
            };
            index += 1;

            let batch: Vec<MessageId> = items
                .iter()
                .map(|item| item.id)
                .filter(|id| plan.should_delete(*id))
                .collect();

            if !batch.is_empty() {
                if cancel.is_cancelled() {
                    return self.cancelled(channel, &plan, sink, total).await;
                }
                if let Err(e) = self.transport.bulk_delete(channel, &batch).await {
                    return self
                        .fail(channel, &plan, sink, PurgeError::BulkDeleteFailed(e.to_string()), total)
                        .await;
                }
            }
            total += batch.len();
            debug!(batch = index, fetched = items.len(), deleted = batch.len(), total, "Batch purged");

            // Once the end marker is deleted the run is complete, cancelled or not.
            let reached_end = items.iter().any(|item| item.id == plan.end);
            if !reached_end && cancel.is_cancelled() {
                return self.cancelled(channel, &plan, sink, total).await;
            }

            let report = ProgressReport::Batch {
                index,
                deleted: batch.len(),
                total,
            };
            if let Err(e) = sink.report(report).await {
                error!(error = %e, "Error while reporting purge progress");
                self.store.release(channel, plan.session);
                return RunOutcome::SinkClosed { total };
            }

            if reached_end {
                if let Err(e) = sink.report(ProgressReport::Completed { total }).await {
                    error!(error = %e, "Error while reporting purge completion");
                }
                self.store.complete(channel, plan.session);
                info!(total, batches = index, "Purge completed");
                return RunOutcome::Completed {
                    total,
                    batches: index,
                };
            }
        }
    }

    async fn fail(
        &self,
        channel: ChannelId,
        plan: &RunPlan,
        sink: &dyn ProgressSink,
        error: PurgeError,
        total: usize,
    ) -> RunOutcome {
        error!(error = %error, total, "Purge stopped");
        self.store.release(channel, plan.session);
        let report = ProgressReport::Failed {
            error: error.clone(),
            total,
        };
        if let Err(e) = sink.report(report).await {
            error!(error = %e, "Error while reporting purge failure");
        }
        RunOutcome::Failed { error, total }
    }

    async fn cancelled(
        &self,
        channel: ChannelId,
        plan: &RunPlan,
        sink: &dyn ProgressSink,
        total: usize,
    ) -> RunOutcome {
        info!(total, "Purge cancelled");
        self.store.release(channel, plan.session);
        if let Err(e) = sink.report(ProgressReport::Cancelled { total }).await {
            error!(error = %e, "Error while reporting purge cancellation");
        }
        RunOutcome::Cancelled { total }
    }
}
