use super::FanoutCoordinator;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Producer side of the fan-out job queue.
///
/// Enqueueing never blocks the caller: when the queue is full or the worker
/// is gone, the job runs on its own spawned task instead. Those overflow
/// tasks are counted so shutdown can wait for them.
#[derive(Clone)]
pub struct FanoutQueue {
    tx: mpsc::Sender<Uuid>,
    coordinator: Arc<FanoutCoordinator>,
    overflow: Arc<watch::Sender<usize>>,
}

impl FanoutQueue {
    pub fn new(coordinator: Arc<FanoutCoordinator>, capacity: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (overflow, _) = watch::channel(0usize);
        (
            Self {
                tx,
                coordinator,
                overflow: Arc::new(overflow),
            },
            rx,
        )
    }

    /// Overflow jobs still running
    pub fn overflow_in_flight(&self) -> usize {
        *self.overflow.borrow()
    }

    /// Resolves once every overflow job has finished
    pub async fn wait_overflow(&self) {
        let mut rx = self.overflow.subscribe();
        let _ = rx.wait_for(|running| *running == 0).await;
    }

    pub fn enqueue(&self, post_id: Uuid) {
        let post_id = match self.tx.try_send(post_id) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(id)) => {
                warn!(post_id = %id, "Fan-out queue full, running job inline");
                id
            }
            Err(mpsc::error::TrySendError::Closed(id)) => {
                warn!(post_id = %id, "Fan-out worker stopped, running job inline");
                id
            }
        };

        let coordinator = self.coordinator.clone();
        let overflow = self.overflow.clone();
        overflow.send_modify(|running| *running += 1);
        tokio::spawn(async move {
            run_job(&coordinator, post_id).await;
            overflow.send_modify(|running| *running -= 1);
        });
    }
}

async fn run_job(coordinator: &FanoutCoordinator, post_id: Uuid) {
    if let Err(e) = coordinator.fan_out(post_id).await {
        error!(post_id = %post_id, error = %e, "Fan-out failed");
    }
}

/// Consume fan-out jobs until shutdown is signalled, then drain what is
/// already queued so accepted posts are not lost.
pub async fn run_fanout_worker(
    coordinator: Arc<FanoutCoordinator>,
    mut jobs: mpsc::Receiver<Uuid>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Fan-out worker started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            job = jobs.recv() => match job {
                Some(post_id) => run_job(&coordinator, post_id).await,
                None => break,
            },
        }
    }

    jobs.close();
    let mut drained = 0usize;
    while let Ok(post_id) = jobs.try_recv() {
        run_job(&coordinator, post_id).await;
        drained += 1;
    }

    info!(drained, "Fan-out worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FeedCacheStore, InMemoryFeedCache};
    use crate::config::FeedSettings;
    use crate::models::FriendEdge;
    use crate::registry::InMemorySubscriberRegistry;
    use crate::store::{InMemoryPostStore, PostStore};

    async fn setup() -> (InMemoryPostStore, InMemoryFeedCache, Arc<FanoutCoordinator>, Uuid, Uuid) {
        let store = InMemoryPostStore::new();
        let (author, follower) = (Uuid::new_v4(), Uuid::new_v4());
        store.add_user(author, "Author").await;
        store.add_user(follower, "Follower").await;
        store
            .add_friend(FriendEdge::new(follower, author))
            .await
            .unwrap();

        let cache = InMemoryFeedCache::new();
        let coordinator = Arc::new(FanoutCoordinator::new(
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            Arc::new(InMemorySubscriberRegistry::new()),
            None,
            FeedSettings::default(),
        ));
        (store, cache, coordinator, author, follower)
    }

    #[tokio::test]
    async fn test_queued_jobs_drain_on_shutdown() {
        let (store, cache, coordinator, author, follower) = setup().await;
        let (queue, rx) = FanoutQueue::new(coordinator.clone(), 8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let post_id = store.create_post(author, "queued").await.unwrap();
        queue.enqueue(post_id);
        shutdown_tx.send(true).unwrap();

        run_fanout_worker(coordinator, rx, shutdown_rx).await;

        let items = cache.read(follower).await.unwrap().unwrap();
        assert_eq!(items[0].id, post_id);
    }

    #[tokio::test]
    async fn test_full_queue_runs_job_inline() {
        let (store, cache, coordinator, author, follower) = setup().await;
        let (queue, _rx) = FanoutQueue::new(coordinator, 1);

        let first = store.create_post(author, "one").await.unwrap();
        let second = store.create_post(author, "two").await.unwrap();
        queue.enqueue(first);
        // No worker is consuming, so this one overflows
        queue.enqueue(second);

        assert_eq!(queue.overflow_in_flight(), 1);

        queue.wait_overflow().await;
        assert_eq!(queue.overflow_in_flight(), 0);
        let items = cache.read(follower).await.unwrap().unwrap();
        assert!(items.iter().any(|i| i.id == second));
    }

    #[tokio::test]
    async fn test_wait_overflow_returns_immediately_when_idle() {
        let (_store, _cache, coordinator, _author, _follower) = setup().await;
        let (queue, _rx) = FanoutQueue::new(coordinator, 4);
        tokio::time::timeout(std::time::Duration::from_secs(1), queue.wait_overflow())
            .await
            .unwrap();
    }
}
