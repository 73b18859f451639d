use crate::connectivity::Connectivity;
use crate::ledger::{ContentUnitProgress, ProgressAggregate, ProgressLedger};
use crate::queue::{DrainOutcome, MutationQueue, QueueConfig};
use crate::remote::{ChapterProgressPayload, LearnRemote, with_timeout};
use crate::store::{KvStore, SyncError};

/// What happened to the remote side of a recorded completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote acknowledged the update immediately.
    Confirmed,
    /// The update waits in the mutation queue (offline or remote failure).
    Queued { mutation_id: i64 },
}

/// Ties the ledger, the connectivity oracle and the mutation queue together.
/// The local write always happens first; the remote is a best-effort side channel.
pub struct SyncCoordinator<'s, R, C> {
    ledger: ProgressLedger<'s>,
    queue: MutationQueue<'s>,
    remote: &'s R,
    connectivity: &'s C,
    config: QueueConfig,
}

impl<'s, R: LearnRemote, C: Connectivity> SyncCoordinator<'s, R, C> {
    pub fn new(store: &'s KvStore, remote: &'s R, connectivity: &'s C, config: QueueConfig) -> Self {
        Self {
            ledger: ProgressLedger::new(store),
            queue: MutationQueue::new(store, config.clone()),
            remote,
            connectivity,
            config,
        }
    }

    pub fn ledger(&self) -> &ProgressLedger<'s> {
        &self.ledger
    }

    pub fn queue(&self) -> &MutationQueue<'s> {
        &self.queue
    }

    /// Mark a unit complete locally, then try to confirm it remotely.
    ///
    /// The ledger write is durable before the first await. Network trouble
    /// turns into `SyncOutcome::Queued`; only storage errors are returned.
    pub async fn record_completion(
        &self,
        unit_id: &str,
        subject_id: &str,
        class_id: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let record = self.ledger.upsert(unit_id, subject_id, class_id, true)?;
        let payload = ChapterProgressPayload::from(&record);

        if !self.connectivity.is_online() {
            let mutation = self.queue.enqueue_chapter_progress(&payload)?;
            tracing::debug!(unit_id, mutation_id = mutation.id, "offline, completion queued");
            return Ok(SyncOutcome::Queued {
                mutation_id: mutation.id,
            });
        }

        let attempt = with_timeout(
            self.config.request_timeout,
            self.remote.submit_chapter_progress(&payload),
        )
        .await;
        match attempt {
            Ok(()) => {
                tracing::debug!(unit_id, "completion confirmed by remote");
                Ok(SyncOutcome::Confirmed)
            }
            Err(err) => {
                let mutation = self.queue.enqueue_chapter_progress(&payload)?;
                tracing::info!(
                    unit_id,
                    mutation_id = mutation.id,
                    error = %err,
                    "remote confirmation failed, completion queued"
                );
                Ok(SyncOutcome::Queued {
                    mutation_id: mutation.id,
                })
            }
        }
    }

    /// Record that a unit was opened. Purely local.
    pub fn record_access(
        &self,
        unit_id: &str,
        subject_id: &str,
        class_id: &str,
    ) -> Result<ContentUnitProgress, SyncError> {
        self.ledger.record_access(unit_id, subject_id, class_id)
    }

    /// Drain the queue if the oracle says we are online; `None` when offline.
    pub async fn replay(&self) -> Result<Option<DrainOutcome>, SyncError> {
        if !self.connectivity.is_online() {
            tracing::debug!("offline, replay skipped");
            return Ok(None);
        }
        Ok(Some(self.queue.drain(self.remote).await?))
    }

    pub fn progress(
        &self,
        subject_id: &str,
        class_id: &str,
        total_units: usize,
    ) -> Result<ProgressAggregate, SyncError> {
        self.ledger.aggregate(subject_id, class_id, total_units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityFlag;
    use crate::content::ContentQuery;
    use crate::ledger::unit_id;
    use crate::remote::RemoteError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::cell::{Cell, RefCell};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRemote {
        fail: Cell<bool>,
        received: RefCell<Vec<ChapterProgressPayload>>,
    }

    #[async_trait(?Send)]
    impl LearnRemote for RecordingRemote {
        async fn fetch_content(&self, _query: &ContentQuery) -> Result<Value, RemoteError> {
            Ok(Value::Null)
        }

        async fn submit_chapter_progress(
            &self,
            payload: &ChapterProgressPayload,
        ) -> Result<(), RemoteError> {
            if self.fail.get() {
                return Err(RemoteError::Timeout(Duration::from_millis(1)));
            }
            self.received.borrow_mut().push(payload.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn online_success_is_confirmed_without_queueing() {
        let store = KvStore::open_in_memory().unwrap();
        let remote = RecordingRemote::default();
        let online = ConnectivityFlag::new(true);
        let sync = SyncCoordinator::new(&store, &remote, &online, QueueConfig::default());

        let outcome = sync.record_completion("u1", "math", "c6").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Confirmed);
        assert!(sync.queue().is_empty().unwrap());

        let sent = remote.received.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chapter_id, "u1");
        assert!(sent[0].completed);
        assert!(sent[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn offline_enqueues_without_calling_remote() {
        let store = KvStore::open_in_memory().unwrap();
        let remote = RecordingRemote::default();
        let offline = ConnectivityFlag::new(false);
        let sync = SyncCoordinator::new(&store, &remote, &offline, QueueConfig::default());

        let outcome = sync.record_completion("u1", "math", "c6").await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Queued { .. }));
        assert!(remote.received.borrow().is_empty());
        assert!(sync.ledger().get("u1").unwrap().unwrap().completed);
        assert_eq!(sync.replay().await.unwrap(), None);
    }

    #[tokio::test]
    async fn remote_failure_enqueues_and_replay_delivers() {
        let store = KvStore::open_in_memory().unwrap();
        let remote = RecordingRemote::default();
        remote.fail.set(true);
        let online = ConnectivityFlag::new(true);
        let sync = SyncCoordinator::new(&store, &remote, &online, QueueConfig::default());

        let outcome = sync.record_completion("u1", "math", "c6").await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Queued { .. }));
        assert_eq!(sync.queue().len().unwrap(), 1);

        remote.fail.set(false);
        let replayed = sync.replay().await.unwrap();
        assert!(matches!(replayed, Some(DrainOutcome::Drained(ref r)) if r.delivered == 1));
        assert!(sync.queue().is_empty().unwrap());
    }

    #[tokio::test]
    async fn repeated_completion_resends_first_timestamp() {
        let store = KvStore::open_in_memory().unwrap();
        let remote = RecordingRemote::default();
        let online = ConnectivityFlag::new(true);
        let sync = SyncCoordinator::new(&store, &remote, &online, QueueConfig::default());

        sync.record_completion("u1", "math", "c6").await.unwrap();
        sync.record_completion("u1", "math", "c6").await.unwrap();

        let sent = remote.received.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert_eq!(sync.ledger().all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn composite_unit_id_sends_the_chapter_id() {
        let store = KvStore::open_in_memory().unwrap();
        let remote = RecordingRemote::default();
        let online = ConnectivityFlag::new(true);
        let sync = SyncCoordinator::new(&store, &remote, &online, QueueConfig::default());
        let unit = unit_id("class-6", "class-6/mathematics", "class-6/mathematics/fractions");

        sync.record_completion(&unit, "class-6/mathematics", "class-6")
            .await
            .unwrap();
        assert_eq!(
            remote.received.borrow()[0].chapter_id,
            "class-6/mathematics/fractions"
        );

        // the queued copy carries the same chapter id
        online.set_online(false);
        sync.record_completion(&unit, "class-6/mathematics", "class-6")
            .await
            .unwrap();
        let queued = sync.queue().peek_all().unwrap();
        assert_eq!(queued[0].payload["chapterId"], "class-6/mathematics/fractions");
        assert!(sync.ledger().get(&unit).unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn access_then_progress_is_local_only() {
        let store = KvStore::open_in_memory().unwrap();
        let remote = RecordingRemote::default();
        let online = ConnectivityFlag::new(true);
        let sync = SyncCoordinator::new(&store, &remote, &online, QueueConfig::default());

        sync.record_access("u1", "math", "c6").unwrap();
        sync.record_completion("u2", "math", "c6").await.unwrap();

        let agg = sync.progress("math", "c6", 4).unwrap();
        assert_eq!(agg.completed_count, 1);
        assert_eq!(agg.percent_complete, 25);
        assert_eq!(remote.received.borrow().len(), 1);
    }
}
