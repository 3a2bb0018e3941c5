//! Dual worker pools for load tasks.
//!
//! The general pool runs network-bound work with bounded concurrency. The fast
//! pool has a single worker for ids already on disc, so disc hits never queue
//! behind slow downloads. Pools are created on first use and recreated if a
//! submission arrives after `stop`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore, mpsc};
use tracing::{debug, error};

/// A unit of work submitted to a pool.
pub type Job = BoxFuture<'static, ()>;

/// Which pool a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Bounded pool for work that has to fetch from the source.
    General,
    /// Single-worker pool for work served from the disc cache.
    Fast,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks submitted to the general pool.
    pub general_submitted: u64,
    /// Tasks submitted to the fast pool.
    pub fast_submitted: u64,
    /// Tasks submitted but not yet finished.
    pub in_flight: usize,
}

#[derive(Default)]
struct Gauge {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Marks one task as in flight until dropped, even if the task panics.
struct InFlight(Arc<Gauge>);

impl InFlight {
    fn enter(gauge: &Arc<Gauge>) -> Self {
        gauge.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(gauge.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

struct WorkerPool {
    tx: mpsc::UnboundedSender<Job>,
}

impl WorkerPool {
    fn spawn(runtime: &Handle, kind: PoolKind, workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        runtime.spawn(Self::run_dispatch_loop(rx, semaphore, kind));
        debug!(pool = %kind, workers = workers.max(1), "Started worker pool");
        Self { tx }
    }

    /// Hands queued jobs to workers as permits free up. Once the sender is
    /// dropped the queue is drained and the loop ends.
    async fn run_dispatch_loop(
        mut rx: mpsc::UnboundedReceiver<Job>,
        semaphore: Arc<Semaphore>,
        kind: PoolKind,
    ) {
        while let Some(job) = rx.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            tokio::spawn(async move {
                job.await;
                drop(permit);
            });
        }
        debug!(pool = %kind, "Worker pool stopped accepting work");
    }

    fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Two independent, lazily created worker pools.
pub struct DualPoolScheduler {
    runtime: Handle,
    general_size: usize,
    general: Mutex<Option<WorkerPool>>,
    fast: Mutex<Option<WorkerPool>>,
    gauge: Arc<Gauge>,
    general_submitted: AtomicU64,
    fast_submitted: AtomicU64,
}

impl DualPoolScheduler {
    /// Creates a scheduler spawning onto `runtime`. No pool is started yet.
    #[must_use]
    pub fn new(runtime: Handle, general_size: usize) -> Self {
        Self {
            runtime,
            general_size: general_size.max(1),
            general: Mutex::new(None),
            fast: Mutex::new(None),
            gauge: Arc::new(Gauge::default()),
            general_submitted: AtomicU64::new(0),
            fast_submitted: AtomicU64::new(0),
        }
    }

    /// Submits `job` to the pool of the given kind, starting it if needed.
    ///
    /// Returns false if the pool could not accept the job.
    pub fn submit(&self, kind: PoolKind, job: Job) -> bool {
        let (slot, workers, counter) = match kind {
            PoolKind::General => (&self.general, self.general_size, &self.general_submitted),
            PoolKind::Fast => (&self.fast, 1, &self.fast_submitted),
        };

        let in_flight = InFlight::enter(&self.gauge);
        let job = async move {
            job.await;
            drop(in_flight);
        }
        .boxed();

        let mut pool = slot.lock();
        if !pool.as_ref().is_some_and(WorkerPool::is_running) {
            *pool = Some(WorkerPool::spawn(&self.runtime, kind, workers));
        }

        let Some(running) = pool.as_ref() else {
            return false;
        };
        if let Err(e) = running.tx.send(job) {
            error!(pool = %kind, "Failed to submit task: {}", e);
            return false;
        }
        counter.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Stops accepting work. Queued and running tasks still complete.
    pub fn stop(&self) {
        let general = self.general.lock().take();
        let fast = self.fast.lock().take();
        if general.is_some() || fast.is_some() {
            debug!("Stopped worker pools");
        }
    }

    /// Returns true if the given pool is currently accepting work.
    #[must_use]
    pub fn is_running(&self, kind: PoolKind) -> bool {
        let slot = match kind {
            PoolKind::General => &self.general,
            PoolKind::Fast => &self.fast,
        };
        slot.lock().as_ref().is_some_and(WorkerPool::is_running)
    }

    /// Returns submission counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            general_submitted: self.general_submitted.load(Ordering::Relaxed),
            fast_submitted: self.fast_submitted.load(Ordering::Relaxed),
            in_flight: self.gauge.in_flight.load(Ordering::SeqCst),
        }
    }

    /// Waits until every submitted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.gauge.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.gauge.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Concurrency {
        current: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    impl Concurrency {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                done: AtomicUsize::new(0),
            })
        }

        fn job(self: &Arc<Self>) -> Job {
            let this = self.clone();
            async move {
                let now = this.current.fetch_add(1, Ordering::SeqCst) + 1;
                this.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                this.current.fetch_sub(1, Ordering::SeqCst);
                this.done.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_general_pool_is_bounded() {
        let scheduler = DualPoolScheduler::new(Handle::current(), 2);
        let tracker = Concurrency::new();

        for _ in 0..6 {
            assert!(scheduler.submit(PoolKind::General, tracker.job()));
        }
        scheduler.wait_idle().await;

        assert_eq!(tracker.done.load(Ordering::SeqCst), 6);
        assert!(tracker.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(scheduler.stats().general_submitted, 6);
        assert_eq!(scheduler.stats().fast_submitted, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fast_pool_has_single_worker() {
        let scheduler = DualPoolScheduler::new(Handle::current(), 4);
        let tracker = Concurrency::new();

        for _ in 0..4 {
            scheduler.submit(PoolKind::Fast, tracker.job());
        }
        scheduler.wait_idle().await;

        assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.stats().fast_submitted, 4);
    }

    #[tokio::test]
    async fn test_pools_start_lazily() {
        let scheduler = DualPoolScheduler::new(Handle::current(), 2);
        assert!(!scheduler.is_running(PoolKind::General));
        assert!(!scheduler.is_running(PoolKind::Fast));

        scheduler.submit(PoolKind::Fast, async {}.boxed());
        assert!(scheduler.is_running(PoolKind::Fast));
        assert!(!scheduler.is_running(PoolKind::General));
        scheduler.wait_idle().await;
    }

    #[tokio::test]
    async fn test_stop_lets_submitted_tasks_finish() {
        let scheduler = DualPoolScheduler::new(Handle::current(), 1);
        let tracker = Concurrency::new();

        for _ in 0..3 {
            scheduler.submit(PoolKind::General, tracker.job());
        }
        scheduler.stop();
        assert!(!scheduler.is_running(PoolKind::General));

        scheduler.wait_idle().await;
        assert_eq!(tracker.done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_submit_after_stop_recreates_pool() {
        let scheduler = DualPoolScheduler::new(Handle::current(), 1);
        let tracker = Concurrency::new();

        scheduler.submit(PoolKind::General, tracker.job());
        scheduler.stop();
        scheduler.submit(PoolKind::General, tracker.job());

        assert!(scheduler.is_running(PoolKind::General));
        scheduler.wait_idle().await;
        assert_eq!(tracker.done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wait_idle_survives_panicking_task() {
        let scheduler = DualPoolScheduler::new(Handle::current(), 1);
        scheduler.submit(PoolKind::General, async { panic!("task blew up"); }.boxed());
        scheduler.wait_idle().await;
        assert_eq!(scheduler.stats().in_flight, 0);
    }
}
