//! Bounded polling of generation jobs.
//!
//! [`JobPoller::start`] spawns one task per job that fetches
//! `GET /generation/{id}`, classifies the status, sleeps, and repeats until
//! the job is terminal, the attempt budget runs out, a request fails, or
//! the sequence is cancelled. Results arrive on a [`JobUpdates`] handle,
//! which is also a [`Stream`].
//!
//! Rounds are single-flight: the next request is only sent after the
//! previous one returned and the interval elapsed.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use shotcraft_core::generation::JobSnapshot;
use shotcraft_core::types::EntityId;

use crate::backend::SharedBackend;
use crate::error::{StudioError, StudioResult};

/// Buffered snapshots per job before the poll task waits on the consumer.
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Attempt budget and spacing for one poll sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Requests sent before giving up with [`StudioError::PollTimeout`].
    pub max_attempts: u32,
    /// Delay between the end of one request and the start of the next.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 150,
            interval: Duration::from_millis(2500),
        }
    }
}

/// Starts poll sequences against a backend.
#[derive(Clone)]
pub struct JobPoller {
    backend: SharedBackend,
    config: PollConfig,
    parent: Option<CancellationToken>,
}

impl JobPoller {
    pub fn new(backend: SharedBackend, config: PollConfig) -> Self {
        Self {
            backend,
            config,
            parent: None,
        }
    }

    /// Derive every sequence's token from `parent`, so cancelling it stops
    /// all of them.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Spawn a poll sequence for `job_id`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, job_id: impl Into<EntityId>) -> JobUpdates {
        let job_id = job_id.into();
        let cancel = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);

        tokio::spawn(poll_job(
            self.backend.clone(),
            job_id.clone(),
            self.config,
            cancel.clone(),
            tx,
        ));

        JobUpdates {
            job_id,
            rx,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
        }
    }
}

/// Receiving end of one poll sequence.
///
/// Yields zero or more non-terminal snapshots that carry group updates,
/// then either exactly one terminal snapshot or one error, then ends.
/// Dropping the handle cancels the sequence.
pub struct JobUpdates {
    job_id: EntityId,
    rx: mpsc::Receiver<StudioResult<JobSnapshot>>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl JobUpdates {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Next update, or `None` once the sequence has ended.
    pub async fn recv(&mut self) -> Option<StudioResult<JobSnapshot>> {
        self.rx.recv().await
    }

    /// Stop polling. The in-flight request and any pending sleep are
    /// abandoned; no terminal snapshot follows.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drain the sequence, returning the terminal snapshot.
    ///
    /// Fails with the first error, or with [`StudioError::Cancelled`] when
    /// the sequence ends without a terminal snapshot.
    pub async fn final_snapshot(mut self) -> StudioResult<JobSnapshot> {
        while let Some(update) = self.recv().await {
            let snapshot = update?;
            if snapshot.is_terminal() {
                return Ok(snapshot);
            }
        }
        Err(StudioError::Cancelled)
    }
}

impl Stream for JobUpdates {
    type Item = StudioResult<JobSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

async fn poll_job(
    backend: SharedBackend,
    job_id: EntityId,
    config: PollConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<StudioResult<JobSnapshot>>,
) {
    for attempt in 1..=config.max_attempts {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job_id, attempt, "Polling cancelled");
                return;
            }
            result = backend.get_generation(&job_id) => result,
        };

        match result {
            Ok(snapshot) if snapshot.is_terminal() => {
                tracing::info!(
                    job_id = %job_id,
                    attempt,
                    status = %snapshot.status(),
                    groups = snapshot.groups().len(),
                    "Generation job finished",
                );
                let _ = tx.send(Ok(snapshot)).await;
                return;
            }
            Ok(snapshot) => {
                tracing::debug!(
                    job_id = %job_id,
                    attempt,
                    status = %snapshot.status(),
                    groups = snapshot.groups().len(),
                    "Generation job still running",
                );
                if snapshot.has_updates() && tx.send(Ok(snapshot)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, attempt, error = %e, "Polling failed");
                let _ = tx.send(Err(e.into())).await;
                return;
            }
        }

        if attempt < config.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(job_id = %job_id, attempt, "Polling cancelled");
                    return;
                }
                _ = tokio::time::sleep(config.interval) => {}
            }
        }
    }

    tracing::warn!(
        job_id = %job_id,
        attempts = config.max_attempts,
        "Generation job did not finish in time",
    );
    let _ = tx
        .send(Err(StudioError::PollTimeout {
            job_id,
            attempts: config.max_attempts,
        }))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget() {
        let config = PollConfig::default();
        assert_eq!(config.max_attempts, 150);
        assert_eq!(config.interval, Duration::from_millis(2500));
    }
}
