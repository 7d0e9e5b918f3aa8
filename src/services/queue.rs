//! Strictly sequential work queue
//!
//! One worker task consumes jobs in FIFO order; `push_front` jumps the line
//! for webhook items and manual re-matches. When the queue runs dry after
//! processing at least one job, the drain hook runs once.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tracing::{debug, info};

struct Shared<T> {
    jobs: Mutex<VecDeque<T>>,
    notify: Notify,
    idle: watch::Sender<bool>,
}

/// Handle to a queue; clones share the same jobs and worker
pub struct WorkQueue<T> {
    name: Arc<str>,
    shared: Arc<Shared<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Create an idle queue; jobs pushed before `start` wait for the worker
    pub fn new(name: &str) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            name: Arc::from(name),
            shared: Arc::new(Shared {
                jobs: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                idle,
            }),
        }
    }

    /// Spawn the single worker
    pub fn start<F, Fut, D>(&self, processor: F, on_drain: D)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
        D: Fn() + Send + Sync + 'static,
    {
        let shared = self.shared.clone();
        let name = self.name.clone();

        tokio::spawn(async move {
            info!(queue = %name, "Work queue started");
            let mut processed = 0usize;
            loop {
                let next = shared.jobs.lock().pop_front();
                match next {
                    Some(job) => {
                        processor(job).await;
                        processed += 1;
                    }
                    None => {
                        if processed > 0 {
                            debug!(queue = %name, processed = processed, "Work queue drained");
                            on_drain();
                            processed = 0;
                        }
                        // A push may have landed while the drain hook ran
                        let empty = {
                            let jobs = shared.jobs.lock();
                            if jobs.is_empty() {
                                shared.idle.send_replace(true);
                            }
                            jobs.is_empty()
                        };
                        if empty {
                            shared.notify.notified().await;
                        }
                    }
                }
            }
        });
    }

    pub fn push(&self, job: T) {
        self.with_jobs(|jobs| jobs.push_back(job));
    }

    /// Queue a job ahead of everything already waiting
    pub fn push_front(&self, job: T) {
        self.with_jobs(|jobs| jobs.push_front(job));
    }

    pub fn extend(&self, new_jobs: impl IntoIterator<Item = T>) {
        self.with_jobs(|jobs| jobs.extend(new_jobs));
    }

    /// Idle is flipped under the same lock the worker checks it with
    fn with_jobs(&self, f: impl FnOnce(&mut VecDeque<T>)) {
        {
            let mut jobs = self.shared.jobs.lock();
            f(&mut jobs);
            self.shared.idle.send_replace(false);
        }
        self.shared.notify.notify_one();
    }

    /// Jobs waiting, not counting the one in progress
    pub fn len(&self) -> usize {
        self.shared.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once the queue has drained and the drain hook has run
    pub async fn wait_idle(&self) {
        let mut idle = self.shared.idle.subscribe();
        // The sender lives in `shared`, so the channel cannot close here
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_one_job_in_flight() {
        let queue = WorkQueue::new("test");
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        {
            let (in_flight, max_seen, done) = (in_flight.clone(), max_seen.clone(), done.clone());
            queue.start(
                move |_: u32| {
                    let (in_flight, max_seen, done) = (in_flight.clone(), max_seen.clone(), done.clone());
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        done.fetch_add(1, Ordering::SeqCst);
                    }
                },
                || {},
            );
        }

        queue.extend(0..25);
        queue.wait_idle().await;

        assert_eq!(done.load(Ordering::SeqCst), 25);
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_push_front_jumps_the_line() {
        let queue = WorkQueue::new("test");
        queue.push("a");
        queue.push("b");
        queue.push_front("urgent");

        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        queue.start(
            move |job| {
                seen.lock().push(job);
                async {}
            },
            || {},
        );
        queue.wait_idle().await;

        assert_eq!(*order.lock(), vec!["urgent", "a", "b"]);
    }

    #[tokio::test]
    async fn test_drain_hook_runs_once_per_drain() {
        let queue = WorkQueue::new("test");
        let drains = Arc::new(AtomicUsize::new(0));
        let counter = drains.clone();
        queue.start(
            |_: u8| async {},
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        queue.wait_idle().await;
        assert_eq!(drains.load(Ordering::SeqCst), 0);

        queue.extend([1, 2, 3]);
        queue.wait_idle().await;
        assert_eq!(drains.load(Ordering::SeqCst), 1);

        queue.push(4);
        queue.wait_idle().await;
        assert_eq!(drains.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }
}
