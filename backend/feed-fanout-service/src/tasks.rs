//! Background task management
//!
//! Long-running tasks (delivery listener, fan-out worker) share one shutdown
//! signal. Shutdown signals them all, then awaits each handle in spawn order.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Spawn `make(shutdown_rx)`; the task must return once the receiver sees `true`.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, make: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(make(self.shutdown_tx.subscribe()));
        info!(task = name, "Spawned background task");
        self.handles.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub async fn shutdown(self) {
        info!("Shutting down background tasks...");
        let _ = self.shutdown_tx.send(true);

        for (name, handle) in self.handles {
            let abort = handle.abort_handle();
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => info!(task = name, "Background task shut down gracefully"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Background task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "Background task did not stop in time, aborting");
                    abort.abort();
                }
            }
        }

        info!("Background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_signals_and_awaits_every_task() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut tasks = BackgroundTasks::new();

        for name in ["first", "second"] {
            let stopped = stopped.clone();
            tasks.spawn(name, move |mut shutdown| async move {
                let _ = shutdown.changed().await;
                stopped.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(tasks.len(), 2);

        tasks.shutdown().await;
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
    }
}
