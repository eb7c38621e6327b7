//! Best-effort background persistence of fetched records.
//!
//! Searches hand each provider's records to a bounded queue and move on.
//! A single worker task drains the queue and upserts into the
//! [`ContentStore`]. When the queue is full the job is dropped with a
//! warning; searches never wait on persistence.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::store::ContentStore;
use crate::types::ContentRecord;

/// Records from one provider awaiting persistence.
#[derive(Debug)]
pub struct PersistJob {
    pub provider: String,
    pub records: Vec<ContentRecord>,
}

/// Sending half of the persistence queue. Cheap to clone.
#[derive(Clone)]
pub struct PersistQueue {
    tx: mpsc::Sender<PersistJob>,
}

impl PersistQueue {
    /// Create a queue of `capacity` jobs and spawn its worker.
    ///
    /// Must be called from within a tokio runtime. The worker exits once
    /// every clone of the queue has been dropped and the backlog is drained.
    pub fn spawn(store: Arc<dyn ContentStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(store, rx));
        (Self { tx }, worker)
    }

    /// Queue `records` for persistence without waiting.
    ///
    /// Returns `false` when the job was dropped because the queue is full or
    /// the worker has stopped.
    pub fn enqueue(&self, provider: &str, records: Vec<ContentRecord>) -> bool {
        if records.is_empty() {
            return true;
        }
        let count = records.len();
        let job = PersistJob {
            provider: provider.to_owned(),
            records,
        };
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(provider, count, "persistence queue full, dropping records");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(provider, count, "persistence worker stopped, dropping records");
                false
            }
        }
    }
}

async fn run_worker(store: Arc<dyn ContentStore>, mut rx: mpsc::Receiver<PersistJob>) {
    while let Some(job) = rx.recv().await {
        let mut saved = 0usize;
        for record in &job.records {
            match store.upsert(record).await {
                Ok(()) => saved += 1,
                Err(e) => tracing::warn!(
                    provider = %job.provider,
                    external_id = %record.external_id,
                    error = %e,
                    "failed to persist record"
                ),
            }
        }
        tracing::debug!(
            provider = %job.provider,
            saved,
            total = job.records.len(),
            "persisted provider records"
        );
    }
    tracing::debug!("persistence worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SearchError};
    use crate::store::InMemoryStore;
    use crate::types::{ContentKind, ProviderContent, SearchParams};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn records(provider: &str, n: usize) -> Vec<ContentRecord> {
        (0..n)
            .map(|i| {
                let content = ProviderContent::new(format!("{provider}-{i}"), "t", ContentKind::Video, Utc::now());
                ContentRecord::from_provider(content, provider, 1.0)
            })
            .collect()
    }

    #[tokio::test]
    async fn worker_persists_queued_records() {
        let store = Arc::new(InMemoryStore::new());
        let (queue, worker) = PersistQueue::spawn(store.clone(), 8);

        assert!(queue.enqueue("videos", records("videos", 3)));
        assert!(queue.enqueue("articles", records("articles", 2)));
        drop(queue);
        worker.await.expect("worker");

        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn full_queue_drops_job() {
        let store = Arc::new(InMemoryStore::new());
        let (queue, worker) = PersistQueue::spawn(store.clone(), 1);

        // The worker cannot run before the next await on this runtime.
        assert!(queue.enqueue("videos", records("videos", 2)));
        assert!(!queue.enqueue("articles", records("articles", 2)));
        drop(queue);
        worker.await.expect("worker");

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn empty_job_is_accepted_without_queueing() {
        let store = Arc::new(InMemoryStore::new());
        let (queue, worker) = PersistQueue::spawn(store.clone(), 1);
        assert!(queue.enqueue("videos", Vec::new()));
        assert!(queue.enqueue("videos", records("videos", 1)));
        drop(queue);
        worker.await.expect("worker");
        assert_eq!(store.len(), 1);
    }

    struct FailingStore {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ContentStore for FailingStore {
        async fn search(&self, _params: &SearchParams) -> Result<(Vec<ContentRecord>, u64)> {
            Ok((Vec::new(), 0))
        }

        async fn search_by_provider(&self, _: &str, _: &str, _: u32, _: u32) -> Result<Vec<ContentRecord>> {
            Ok(Vec::new())
        }

        async fn upsert(&self, _record: &ContentRecord) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SearchError::Persistence("disk full".into()))
        }

        async fn get_by_id(&self, _id: Uuid) -> Result<Option<ContentRecord>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn record_failures_do_not_stop_the_worker() {
        let store = Arc::new(FailingStore {
            attempts: AtomicUsize::new(0),
        });
        let (queue, worker) = PersistQueue::spawn(store.clone(), 4);
        queue.enqueue("videos", records("videos", 3));
        queue.enqueue("videos", records("videos", 2));
        drop(queue);
        worker.await.expect("worker");
        assert_eq!(store.attempts.load(Ordering::SeqCst), 5);
    }
}
