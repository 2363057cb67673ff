//! Process-wide FIFO admission for generation batches.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::{Result, SwitchgenError};

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs submitted tasks one at a time, in submission order.
///
/// A single consumer drains the channel and awaits each task to completion
/// before taking the next, so at most one batch is ever in flight.
#[derive(Debug)]
pub struct AdmissionQueue {
    tx: mpsc::UnboundedSender<Task>,
    waiting: Arc<AtomicUsize>,
    busy: Arc<AtomicBool>,
}

impl AdmissionQueue {
    /// Spawns the consumer; must be called inside a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let waiting = Arc::new(AtomicUsize::new(0));
        let busy = Arc::new(AtomicBool::new(false));

        let consumer_waiting = Arc::clone(&waiting);
        let consumer_busy = Arc::clone(&busy);
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                consumer_waiting.fetch_sub(1, Ordering::SeqCst);
                consumer_busy.store(true, Ordering::SeqCst);
                task.await;
                consumer_busy.store(false, Ordering::SeqCst);
            }
            debug!("admission queue closed");
        });

        Self { tx, waiting, busy }
    }

    /// Queues `task` behind everything submitted earlier and waits for its result.
    ///
    /// A panicking task is reported to its caller as [`SwitchgenError::Queue`];
    /// later tasks still run.
    pub async fn enqueue<F, T>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let wrapped = async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(%message, "queued generation task panicked");
                    Err(SwitchgenError::Queue(format!("generation task panicked: {message}")))
                }
            };
            // The caller may have gone away; nothing to do then.
            let _ = reply.send(result);
        };

        self.waiting.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Box::pin(wrapped)).is_err() {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(SwitchgenError::Queue("generation queue is closed".into()));
        }

        receiver
            .await
            .map_err(|_| SwitchgenError::Queue("generation task was dropped".into()))?
    }

    /// Tasks submitted but not yet started.
    pub fn depth(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Whether a task is running right now.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test(start_paused = true)]
    async fn tasks_run_one_at_a_time_in_submission_order() {
        let queue = AdmissionQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let submissions = (0..5).map(|i| {
            let log = Arc::clone(&log);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            queue.enqueue(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                // Later submissions finish faster if they were allowed to overlap.
                tokio::time::sleep(Duration::from_millis(100 * (5 - i))).await;
                log.lock().unwrap().push(i);
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(i * 10)
            })
        });

        let results: Vec<u64> = join_all(submissions)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results, vec![0, 10, 20, 30, 40]);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_task_is_reported_and_queue_keeps_serving() {
        let queue = AdmissionQueue::new();

        let err = queue
            .enqueue(async {
                if true {
                    panic!("renderer exploded");
                }
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchgenError::Queue(ref m) if m.contains("renderer exploded")));

        let value = queue.enqueue(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(!queue.is_busy());
    }

    #[tokio::test]
    async fn task_errors_pass_through_unchanged() {
        let queue = AdmissionQueue::new();
        let err = queue
            .enqueue(async { Err::<(), _>(SwitchgenError::launch("no chrome")) })
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchgenError::Launch(_)));
    }

    #[tokio::test]
    async fn depth_counts_waiting_tasks_only() {
        let queue = Arc::new(AdmissionQueue::new());
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let first = {
            let queue = Arc::clone(&queue);
            let gate = Arc::clone(&gate);
            let started = Arc::clone(&started);
            tokio::spawn(async move {
                queue
                    .enqueue(async move {
                        started.notify_one();
                        gate.notified().await;
                        Ok(())
                    })
                    .await
            })
        };
        started.notified().await;
        assert!(queue.is_busy());
        assert_eq!(queue.depth(), 0);

        let waiting: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.enqueue(async { Ok(()) }).await })
            })
            .collect();
        while queue.depth() < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(queue.depth(), 2);

        gate.notify_one();
        first.await.unwrap().unwrap();
        for handle in waiting {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(queue.depth(), 0);
    }
}
