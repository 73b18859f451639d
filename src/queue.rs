use std::cell::Cell;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::remote::{ChapterProgressPayload, LearnRemote, RemoteError, with_timeout};
use crate::resolver::DEFAULT_REQUEST_TIMEOUT;
use crate::store::{KvStore, SyncError};

/// Store key holding the serialized FIFO array.
pub const QUEUE_KEY: &str = "sync_queue";
/// Store key holding the last issued mutation id.
pub const QUEUE_SEQ_KEY: &str = "sync_queue_seq";

pub const DEFAULT_MAX_PERMANENT_FAILURES: u32 = 3;

/// Kind of state change waiting for remote confirmation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind {
    SyncChapterProgress,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::SyncChapterProgress => "SYNC_CHAPTER_PROGRESS",
        }
    }
}

/// A state change the remote has not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: MutationKind,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    /// Permanent rejections seen so far.
    #[serde(default)]
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Permanent rejections tolerated before a mutation is dropped.
    pub max_permanent_failures: u32,
    pub request_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_permanent_failures: DEFAULT_MAX_PERMANENT_FAILURES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub dropped: usize,
    pub remaining: usize,
    /// Mutation that halted the pass, if it did not run to the end.
    pub stopped_on: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained(DrainReport),
    /// Another drain on this queue was still in flight.
    AlreadyRunning,
}

struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Durable FIFO of pending mutations with at-least-once delivery.
///
/// A mutation leaves the queue only after the remote acknowledged it, or after
/// it exhausted its permanent-rejection budget. Delivery stops at the first
/// retryable failure so later entries never overtake earlier ones.
pub struct MutationQueue<'s> {
    store: &'s KvStore,
    config: QueueConfig,
    draining: Cell<bool>,
}

impl<'s> MutationQueue<'s> {
    pub fn new(store: &'s KvStore, config: QueueConfig) -> Self {
        Self {
            store,
            config,
            draining: Cell::new(false),
        }
    }

    /// Append a mutation durably. Never touches the network.
    pub fn enqueue(&self, kind: MutationKind, payload: Value) -> Result<PendingMutation, SyncError> {
        // id first, so a crash between the two writes burns an id instead of reusing one
        let id = self.store.get::<i64>(QUEUE_SEQ_KEY)?.unwrap_or(0) + 1;
        self.store.put(QUEUE_SEQ_KEY, &id)?;

        let mutation = PendingMutation {
            id,
            kind,
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
        };
        let mut pending = self.peek_all()?;
        pending.push(mutation.clone());
        self.store.put(QUEUE_KEY, &pending)?;
        tracing::debug!(id, kind = kind.as_str(), queued = pending.len(), "mutation enqueued");
        Ok(mutation)
    }

    pub fn enqueue_chapter_progress(
        &self,
        payload: &ChapterProgressPayload,
    ) -> Result<PendingMutation, SyncError> {
        self.enqueue(MutationKind::SyncChapterProgress, serde_json::to_value(payload)?)
    }

    /// Snapshot of the queue in FIFO order.
    pub fn peek_all(&self) -> Result<Vec<PendingMutation>, SyncError> {
        Ok(self.store.get(QUEUE_KEY)?.unwrap_or_default())
    }

    /// Remove exactly the given ids; entries appended meanwhile are kept.
    pub fn remove_delivered(&self, ids: &[i64]) -> Result<(), SyncError> {
        let mut pending = self.peek_all()?;
        pending.retain(|m| !ids.contains(&m.id));
        self.store.put(QUEUE_KEY, &pending)
    }

    pub fn len(&self) -> Result<usize, SyncError> {
        Ok(self.peek_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, SyncError> {
        Ok(self.len()? == 0)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.get()
    }

    fn record_rejection(&self, id: i64) -> Result<u32, SyncError> {
        let mut pending = self.peek_all()?;
        let mutation = pending
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(SyncError::State("rejected mutation vanished from queue"))?;
        mutation.attempts += 1;
        let attempts = mutation.attempts;
        self.store.put(QUEUE_KEY, &pending)?;
        Ok(attempts)
    }

    fn begin_drain(&self) -> Option<DrainGuard<'_>> {
        if self.draining.replace(true) {
            None
        } else {
            Some(DrainGuard(&self.draining))
        }
    }

    /// Deliver pending mutations in order until the queue is empty or a
    /// retryable failure stops the pass. Only storage errors are returned.
    pub async fn drain<R: LearnRemote>(&self, remote: &R) -> Result<DrainOutcome, SyncError> {
        let Some(_guard) = self.begin_drain() else {
            tracing::debug!("drain already in flight, skipping");
            return Ok(DrainOutcome::AlreadyRunning);
        };

        let mut report = DrainReport::default();
        for mutation in self.peek_all()? {
            match with_timeout(self.config.request_timeout, deliver(remote, &mutation)).await {
                Ok(()) => {
                    self.remove_delivered(&[mutation.id])?;
                    report.delivered += 1;
                }
                Err(err) if err.is_retryable() => {
                    tracing::debug!(id = mutation.id, error = %err, "delivery failed, stopping pass");
                    report.stopped_on = Some(mutation.id);
                    break;
                }
                Err(err) => {
                    let attempts = self.record_rejection(mutation.id)?;
                    if attempts >= self.config.max_permanent_failures {
                        tracing::warn!(
                            id = mutation.id,
                            kind = mutation.kind.as_str(),
                            attempts,
                            error = %err,
                            payload = %mutation.payload,
                            "dropping mutation rejected by remote"
                        );
                        self.remove_delivered(&[mutation.id])?;
                        report.dropped += 1;
                    } else {
                        tracing::warn!(
                            id = mutation.id,
                            attempts,
                            error = %err,
                            "mutation rejected by remote, will retry"
                        );
                        report.stopped_on = Some(mutation.id);
                        break;
                    }
                }
            }
        }

        report.remaining = self.len()?;
        tracing::info!(
            delivered = report.delivered,
            dropped = report.dropped,
            remaining = report.remaining,
            "sync queue drained"
        );
        Ok(DrainOutcome::Drained(report))
    }
}

async fn deliver<R: LearnRemote>(remote: &R, mutation: &PendingMutation) -> Result<(), RemoteError> {
    match mutation.kind {
        MutationKind::SyncChapterProgress => {
            let payload: ChapterProgressPayload = serde_json::from_value(mutation.payload.clone())?;
            remote.submit_chapter_progress(&payload).await
        }
    }
}
