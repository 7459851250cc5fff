//! Singleflight build scheduler.
//!
//! Jobs are keyed by their canonical artifact path. While a key is pending
//! or running, further requests for it only add a waiter. At most
//! `concurrency` jobs run at once, dispatched oldest first. Each waiter gets
//! its own buffered channel and its own deadline; giving up never cancels
//! the job.

mod cache;

pub use cache::ResultCache;

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Work the queue can run.
pub trait QueueJob: Send + 'static {
    type Output: Send + Sync + 'static;

    /// Canonical key. Jobs with equal keys are interchangeable.
    fn key(&self) -> String;

    /// Runs on a worker thread; may block.
    fn run(self) -> Result<Self::Output>;
}

type Outcome<T> = Result<Arc<T>>;

struct Slot<T> {
    id: u64,
    client_id: String,
    tx: oneshot::Sender<Outcome<T>>,
}

type Slots<T> = Mutex<Vec<Slot<T>>>;

struct Task<J: QueueJob> {
    job: Mutex<Option<J>>,
    waiters: Arc<Slots<J::Output>>,
    created_at: SystemTime,
    started_at: OnceLock<SystemTime>,
}

struct State<J: QueueJob> {
    tasks: HashMap<String, Arc<Task<J>>>,
    pending: VecDeque<String>,
    running: usize,
}

struct Inner<J: QueueJob> {
    state: RwLock<State<J>>,
    cache: ResultCache<J::Output>,
    concurrency: usize,
    next_waiter: AtomicU64,
}

/// Bounded singleflight queue. Cheap to clone.
pub struct BuildQueue<J: QueueJob> {
    inner: Arc<Inner<J>>,
}

impl<J: QueueJob> Clone for BuildQueue<J> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Snapshot of one tracked task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStats {
    pub key: String,
    pub waiters: usize,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
}

/// Snapshot of the queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_progress: usize,
    pub cached: usize,
    pub tasks: Vec<TaskStats>,
}

fn epoch_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

impl<J: QueueJob> BuildQueue<J> {
    /// `concurrency` is clamped to at least 1.
    #[must_use]
    pub fn new(concurrency: usize, cache_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State {
                    tasks: HashMap::new(),
                    pending: VecDeque::new(),
                    running: 0,
                }),
                cache: ResultCache::new(cache_capacity),
                concurrency: concurrency.max(1),
                next_waiter: AtomicU64::new(1),
            }),
        }
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    /// Request the result of `job`.
    ///
    /// A cached result is delivered immediately. A key that is already
    /// tracked gains a waiter and `job` is dropped. Otherwise the job is
    /// queued and dispatched when a worker slot frees up.
    pub fn add(&self, job: J, client_id: &str) -> Waiter<J::Output> {
        let key = job.key();
        let id = self.inner.next_waiter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let slot = Slot {
            id,
            client_id: client_id.to_string(),
            tx,
        };

        if let Some(value) = self.inner.cache.get(&key) {
            debug!(%key, client = client_id, "build cache hit");
            let _ = slot.tx.send(Ok(value));
            return Waiter::detached(id, key, rx);
        }

        // Common path: the key is already tracked
        {
            let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(task) = state.tasks.get(&key) {
                return Self::join(task, slot, key, rx);
            }
        }

        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = state.tasks.get(&key) {
            return Self::join(task, slot, key, rx);
        }
        // The job may have finished between the cache check and the write lock
        if let Some(value) = self.inner.cache.get(&key) {
            let _ = slot.tx.send(Ok(value));
            return Waiter::detached(id, key, rx);
        }

        let task = Arc::new(Task {
            job: Mutex::new(Some(job)),
            waiters: Arc::new(Mutex::new(vec![slot])),
            created_at: SystemTime::now(),
            started_at: OnceLock::new(),
        });
        let waiters = Arc::downgrade(&task.waiters);
        state.tasks.insert(key.clone(), task);
        state.pending.push_back(key.clone());
        debug!(%key, client = client_id, pending = state.pending.len(), "build queued");
        Self::dispatch(&self.inner, &mut state);

        Waiter {
            id,
            key,
            rx,
            waiters: Some(waiters),
        }
    }

    fn join(
        task: &Task<J>,
        slot: Slot<J::Output>,
        key: String,
        rx: oneshot::Receiver<Outcome<J::Output>>,
    ) -> Waiter<J::Output> {
        let id = slot.id;
        debug!(%key, client = %slot.client_id, "joined in-flight build");
        task.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(slot);
        Waiter {
            id,
            key,
            rx,
            waiters: Some(Arc::downgrade(&task.waiters)),
        }
    }

    /// Start pending tasks while worker slots are free. Called with the
    /// state write lock held.
    fn dispatch(inner: &Arc<Inner<J>>, state: &mut State<J>) {
        while state.running < inner.concurrency {
            let Some(key) = state.pending.pop_front() else {
                break;
            };
            let Some(task) = state.tasks.get(&key).cloned() else {
                continue;
            };
            let Some(job) = task
                .job
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            else {
                continue;
            };
            let _ = task.started_at.set(SystemTime::now());
            state.running += 1;

            let worker_inner = Arc::clone(inner);
            let worker_key = key.clone();
            let spawned = std::thread::Builder::new()
                .name("esmd-build".to_string())
                .spawn(move || {
                    let started = Instant::now();
                    let outcome = catch_unwind(AssertUnwindSafe(|| job.run()))
                        .unwrap_or_else(|_| Err(Error::upstream("build panicked")))
                        .map(Arc::new);
                    Self::complete(&worker_inner, &worker_key, outcome, started.elapsed());
                });

            if let Err(e) = spawned {
                error!(%key, error = %e, "failed to spawn build worker");
                state.running -= 1;
                if let Some(task) = state.tasks.remove(&key) {
                    broadcast(&task.waiters, &Err(Error::upstream(format!("spawn failed: {e}"))));
                }
            }
        }
    }

    fn complete(inner: &Arc<Inner<J>>, key: &str, outcome: Outcome<J::Output>, elapsed: Duration) {
        if let Ok(value) = &outcome {
            inner.cache.insert(key, Arc::clone(value));
        }

        let task = {
            let mut state = inner.state.write().unwrap_or_else(PoisonError::into_inner);
            state.running = state.running.saturating_sub(1);
            let task = state.tasks.remove(key);
            Self::dispatch(inner, &mut state);
            task
        };

        let elapsed_ms = elapsed.as_millis() as u64;
        match &outcome {
            Ok(_) => info!(%key, elapsed_ms, "build completed"),
            Err(e) => warn!(%key, elapsed_ms, error = %e, code = e.code(), "build failed"),
        }
        if let Some(task) = task {
            broadcast(&task.waiters, &outcome);
        }
    }

    /// Drop a cached result so the next `add` rebuilds it.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.cache.invalidate(key)
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut tasks: Vec<TaskStats> = state
            .tasks
            .iter()
            .map(|(key, task)| TaskStats {
                key: key.clone(),
                waiters: task
                    .waiters
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
                created_at_ms: epoch_ms(task.created_at),
                started_at_ms: task.started_at.get().copied().map(epoch_ms),
            })
            .collect();
        tasks.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.key.cmp(&b.key)));
        QueueStats {
            pending: state.pending.len(),
            in_progress: state.running,
            cached: self.inner.cache.len(),
            tasks,
        }
    }
}

fn broadcast<T>(waiters: &Slots<T>, outcome: &Outcome<T>) {
    let slots = std::mem::take(&mut *waiters.lock().unwrap_or_else(PoisonError::into_inner));
    for slot in slots {
        // A receiver that already gave up is fine to skip
        let _ = slot.tx.send(outcome.clone());
    }
}

/// One caller's handle on a queued build.
pub struct Waiter<T> {
    id: u64,
    key: String,
    rx: oneshot::Receiver<Outcome<T>>,
    waiters: Option<Weak<Slots<T>>>,
}

impl<T> Waiter<T> {
    fn detached(id: u64, key: String, rx: oneshot::Receiver<Outcome<T>>) -> Self {
        Self {
            id,
            key,
            rx,
            waiters: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait up to `timeout` for the result.
    ///
    /// On timeout the waiter removes itself from the task and returns
    /// [`Error::Timeout`]; the build keeps running for everyone else.
    pub async fn wait(mut self, timeout: Duration) -> Result<Arc<T>> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::upstream(format!("build of {} was dropped", self.key))),
            Err(_) => {
                self.detach();
                warn!(key = %self.key, timeout_ms = timeout.as_millis() as u64, "waiter timed out");
                Err(Error::timeout(format!(
                    "timed out after {}s waiting for {}",
                    timeout.as_secs(),
                    self.key
                )))
            }
        }
    }

    /// Block the current thread until the result arrives.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_blocking(self) -> Result<Arc<T>> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(Error::upstream(format!("build of {} was dropped", self.key))))
    }

    fn detach(&self) {
        if let Some(waiters) = self.waiters.as_ref().and_then(Weak::upgrade) {
            waiters
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|slot| slot.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    #[derive(Default)]
    struct Probe {
        runs: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
        started: Mutex<Vec<String>>,
    }

    struct Sleepy {
        key: String,
        delay: Duration,
        fail: bool,
        probe: Arc<Probe>,
    }

    impl Sleepy {
        fn new(key: &str, delay_ms: u64, probe: &Arc<Probe>) -> Self {
            Self {
                key: key.to_string(),
                delay: Duration::from_millis(delay_ms),
                fail: false,
                probe: Arc::clone(probe),
            }
        }
    }

    impl QueueJob for Sleepy {
        type Output = String;

        fn key(&self) -> String {
            self.key.clone()
        }

        fn run(self) -> Result<String> {
            let probe = &self.probe;
            probe.started.lock().unwrap().push(self.key.clone());
            let now = probe.running.fetch_add(1, Ordering::SeqCst) + 1;
            probe.max_running.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            probe.running.fetch_sub(1, Ordering::SeqCst);
            probe.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::upstream(format!("{} failed", self.key)));
            }
            Ok(format!("built {}", self.key))
        }
    }

    struct Panics;

    impl QueueJob for Panics {
        type Output = ();

        fn key(&self) -> String {
            "/boom".to_string()
        }

        fn run(self) -> Result<()> {
            panic!("bundler crashed");
        }
    }

    #[test]
    fn test_singleflight() {
        let queue = BuildQueue::new(4, 16);
        let probe = Arc::new(Probe::default());
        let barrier = Arc::new(Barrier::new(50));

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let queue = queue.clone();
                let probe = Arc::clone(&probe);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    queue
                        .add(Sleepy::new("/react@18.2.0/es2022/react.mjs", 50, &probe), &format!("c{i}"))
                        .wait_blocking()
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<Arc<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(probe.runs.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert_eq!(*results[0], "built /react@18.2.0/es2022/react.mjs");
    }

    #[test]
    fn test_bounded_fifo() {
        let queue = BuildQueue::new(2, 16);
        let probe = Arc::new(Probe::default());
        let waiters: Vec<_> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|key| queue.add(Sleepy::new(key, 40, &probe), "client"))
            .collect();

        let stats = queue.stats();
        assert_eq!(stats.in_progress, 2);
        assert_eq!(stats.pending, 3);

        for waiter in waiters {
            waiter.wait_blocking().unwrap();
        }
        assert!(probe.max_running.load(Ordering::SeqCst) <= 2);

        let started = probe.started.lock().unwrap().clone();
        let mut first: Vec<&str> = started[..2].iter().map(String::as_str).collect();
        let mut second: Vec<&str> = started[2..4].iter().map(String::as_str).collect();
        first.sort_unstable();
        second.sort_unstable();
        assert_eq!(first, ["a", "b"]);
        assert_eq!(second, ["c", "d"]);
        assert_eq!(started[4], "e");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timeout_isolation() {
        let queue = BuildQueue::new(2, 16);
        let probe = Arc::new(Probe::default());

        let impatient = queue.add(Sleepy::new("/slow", 200, &probe), "impatient");
        let patient = queue.add(Sleepy::new("/slow", 200, &probe), "patient");
        assert_eq!(queue.stats().tasks[0].waiters, 2);

        let err = impatient.wait(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(queue.stats().tasks[0].waiters, 1);

        let value = patient.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(*value, "built /slow");
        assert_eq!(probe.runs.load(Ordering::SeqCst), 1);

        // Retrying after the timeout is served from the result cache
        let again = queue
            .add(Sleepy::new("/slow", 200, &probe), "impatient")
            .wait(Duration::from_millis(50))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&again, &value));
        assert_eq!(probe.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_errors_are_shared_not_cached() {
        let queue = BuildQueue::new(1, 16);
        let probe = Arc::new(Probe::default());
        let failing = || Sleepy {
            fail: true,
            ..Sleepy::new("/broken", 30, &probe)
        };

        let a = queue.add(failing(), "a");
        let b = queue.add(failing(), "b");
        let ea = a.wait(Duration::from_secs(5)).await.unwrap_err();
        let eb = b.wait(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(ea, eb);
        assert_eq!(ea.code(), "ESM_UPSTREAM");

        let _ = queue.add(failing(), "c").wait(Duration::from_secs(5)).await;
        assert_eq!(probe.runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panic_becomes_error() {
        let queue = BuildQueue::new(1, 0);
        let err = queue.add(Panics, "x").wait_blocking().unwrap_err();
        assert_eq!(err.to_string(), "build panicked");
        assert_eq!(queue.stats().in_progress, 0);
    }

    #[test]
    fn test_stats_and_invalidate() {
        let queue = BuildQueue::new(1, 16);
        let probe = Arc::new(Probe::default());
        let first = queue.add(Sleepy::new("/one", 80, &probe), "x");
        let second = queue.add(Sleepy::new("/two", 10, &probe), "x");

        let stats = queue.stats();
        assert_eq!(stats.tasks.len(), 2);
        let one = stats.tasks.iter().find(|t| t.key == "/one").unwrap();
        let two = stats.tasks.iter().find(|t| t.key == "/two").unwrap();
        assert!(one.started_at_ms.is_some());
        assert!(two.started_at_ms.is_none());

        first.wait_blocking().unwrap();
        second.wait_blocking().unwrap();
        assert_eq!(queue.stats().cached, 2);
        assert!(queue.invalidate("/one"));
        queue.add(Sleepy::new("/one", 1, &probe), "x").wait_blocking().unwrap();
        assert_eq!(probe.runs.load(Ordering::SeqCst), 3);
    }
}
