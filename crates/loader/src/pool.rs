use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use courier_runtime::PoolConfig;
use crossbeam::channel::{
    self, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};
use log::{debug, error, trace, warn};
use thiserror::Error;

use crate::signal::{CancelToken, Interrupt};

/// How often blocked callers look at the interrupt flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const MIN_IDLE_TIMEOUT: Duration = Duration::from_millis(10);

/// A unit of work. The token is raised when the pool is shut down forcibly.
pub type Job = Box<dyn FnOnce(&CancelToken) + Send + 'static>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("worker pool is shut down")]
    ShutDown,
    #[error("interrupted while waiting for queue space")]
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every worker has exited
    Terminated,
    TimedOut,
    /// The caller's interrupt flag was raised while waiting
    Interrupted,
}

/// The pool operations the shutdown sequence drives.
pub trait Drain {
    /// Stop accepting work; queued and running jobs still complete.
    fn shutdown(&mut self);
    /// Stop accepting work, cancel running jobs and discard queued ones.
    fn shutdown_now(&mut self);
    /// Block until every worker has exited or `timeout` elapses.
    fn await_termination(&self, timeout: Duration) -> Termination;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolShape {
    pub min_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub idle_timeout: Duration,
}

impl From<&PoolConfig> for PoolShape {
    fn from(cfg: &PoolConfig) -> Self {
        Self {
            min_workers: cfg.min_workers,
            max_workers: cfg.max_workers,
            queue_capacity: cfg.queue_capacity,
            idle_timeout: cfg.idle_timeout(),
        }
    }
}

struct Shared {
    receiver: Receiver<Job>,
    cancel: CancelToken,
    min_workers: usize,
    max_workers: usize,
    idle_timeout: Duration,
    /// Live worker threads
    live: Mutex<usize>,
    exited: Condvar,
    next_id: AtomicUsize,
    panicked: AtomicU64,
    discarded: AtomicU64,
}

impl Shared {
    fn live(&self) -> MutexGuard<'_, usize> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give up a slot above `min_workers`. The caller must exit when this returns true.
    ///
    /// Never retires while jobs are queued. Checked under the `live` lock, which
    /// `WorkerPool::ensure_worker` also takes after every accepted job.
    fn try_retire(&self) -> bool {
        let mut live = self.live();
        if *live > self.min_workers && self.receiver.is_empty() {
            *live -= 1;
            self.exited.notify_all();
            true
        } else {
            false
        }
    }
}

/// Releases the worker's slot however the thread ends.
struct LiveGuard<'a> {
    shared: &'a Shared,
    released: bool,
}

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            *self.shared.live() -= 1;
            self.shared.exited.notify_all();
        }
    }
}

/// Bounded worker pool with a bounded FIFO queue.
///
/// `submit` never drops a job: when the queue is full and no more workers may be
/// started, it blocks the caller until a worker frees a slot.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    shared: Arc<Shared>,
    interrupt: Interrupt,
}

impl WorkerPool {
    /// Create the queue and start `min_workers` threads.
    pub fn new(shape: PoolShape, interrupt: Interrupt) -> io::Result<Self> {
        let max_workers = shape.max_workers.max(1);
        let min_workers = shape.min_workers.min(max_workers);
        let (sender, receiver) = channel::bounded::<Job>(shape.queue_capacity.max(1));

        let shared = Arc::new(Shared {
            receiver,
            cancel: CancelToken::new(),
            min_workers,
            max_workers,
            idle_timeout: shape.idle_timeout.max(MIN_IDLE_TIMEOUT),
            live: Mutex::new(0),
            exited: Condvar::new(),
            next_id: AtomicUsize::new(0),
            panicked: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        });

        let pool = Self {
            sender: Some(sender),
            shared,
            interrupt,
        };

        for _ in 0..min_workers {
            let mut live = pool.shared.live();
            *live += 1;
            if let Err((e, _)) = spawn_worker(&pool.shared, None) {
                *live -= 1;
                return Err(e);
            }
        }

        debug!(
            "[pool] started {min_workers} workers (max {max_workers}, queue {})",
            shape.queue_capacity.max(1)
        );
        Ok(pool)
    }

    /// Hand a job to the pool, blocking while the queue is saturated.
    pub fn submit(&self, job: Job) -> Result<(), SubmitError> {
        if self.interrupt.is_triggered() {
            self.discard(job);
            return Err(SubmitError::Interrupted);
        }
        let sender = self.sender.as_ref().ok_or(SubmitError::ShutDown)?;

        let job = match sender.try_send(job) {
            Ok(()) => {
                self.ensure_worker();
                return Ok(());
            }
            Err(TrySendError::Full(job)) => job,
            Err(TrySendError::Disconnected(_)) => return Err(SubmitError::ShutDown),
        };

        // Queue is full: a new worker starts on this job instead of queueing it.
        let job = match self.grow_with(job) {
            Ok(()) => return Ok(()),
            Err(job) => job,
        };

        trace!("[pool] queue full and no worker available; blocking producer");
        self.send_blocking(sender, job)?;
        self.ensure_worker();
        Ok(())
    }

    fn send_blocking(&self, sender: &Sender<Job>, mut job: Job) -> Result<(), SubmitError> {
        loop {
            match sender.send_timeout(job, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(pending)) => {
                    if self.interrupt.is_triggered() {
                        self.discard(pending);
                        return Err(SubmitError::Interrupted);
                    }
                    job = pending;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(SubmitError::ShutDown),
            }
        }
    }

    /// Start a worker if none is alive, so an accepted job always has a taker.
    ///
    /// With `min_workers = 0` the last worker may retire right before a job lands
    /// in the queue; `try_retire` and this check serialize on the `live` lock.
    fn ensure_worker(&self) {
        let mut live = self.shared.live();
        if *live == 0 {
            let _ = self.grow_locked(&mut live, None);
        }
    }

    /// Start one more worker running `job` first, if below `max_workers`.
    /// Hands the job back when no worker could be started.
    fn grow_with(&self, job: Job) -> Result<(), Job> {
        let mut live = self.shared.live();
        match self.grow_locked(&mut live, Some(job)) {
            Ok(()) => Ok(()),
            Err(Some(job)) => Err(job),
            // An empty slot means the new worker already took the job.
            Err(None) => Ok(()),
        }
    }

    fn grow_locked(&self, live: &mut usize, first: Option<Job>) -> Result<(), Option<Job>> {
        if *live >= self.shared.max_workers {
            return Err(first);
        }

        *live += 1;
        match spawn_worker(&self.shared, first) {
            Ok(()) => {
                debug!("[pool] grew to {} workers", *live);
                Ok(())
            }
            Err((e, first)) => {
                *live -= 1;
                error!("[pool] failed to spawn load worker: {e}");
                Err(first)
            }
        }
    }

    fn discard(&self, job: Job) {
        drop(job);
        self.shared.discarded.fetch_add(1, Ordering::Relaxed);
        warn!("[pool] dropped an unsubmitted batch");
    }

    pub fn live_workers(&self) -> usize {
        *self.shared.live()
    }

    pub fn queued(&self) -> usize {
        self.shared.receiver.len()
    }

    /// Jobs that panicked inside a worker.
    pub fn panicked_tasks(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    /// Jobs dropped without running.
    pub fn discarded_jobs(&self) -> u64 {
        self.shared.discarded.load(Ordering::Relaxed)
    }
}

impl Drain for WorkerPool {
    fn shutdown(&mut self) {
        if self.sender.take().is_some() {
            debug!(
                "[pool] shutting down with {} batches queued and {} workers",
                self.queued(),
                self.live_workers()
            );
        }
    }

    fn shutdown_now(&mut self) {
        self.shutdown();
        if !self.shared.cancel.is_cancelled() {
            self.shared.cancel.cancel();
            warn!(
                "[pool] cancelling in-flight deliveries; {} queued batches will be discarded",
                self.queued()
            );
        }
    }

    fn await_termination(&self, timeout: Duration) -> Termination {
        let deadline = Instant::now() + timeout;
        let mut live = self.shared.live();

        while *live > 0 {
            if self.interrupt.is_triggered() {
                return Termination::Interrupted;
            }
            let now = Instant::now();
            if now >= deadline {
                return Termination::TimedOut;
            }

            let wait = (deadline - now).min(POLL_INTERVAL);
            live = self
                .shared
                .exited
                .wait_timeout(live, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        Termination::Terminated
    }
}

/// Start a worker thread. On failure the unstarted `first` job is handed back.
fn spawn_worker(
    shared: &Arc<Shared>,
    first: Option<Job>,
) -> Result<(), (io::Error, Option<Job>)> {
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let worker_shared = Arc::clone(shared);
    // A failed spawn drops the closure; the slot lets the job be taken back.
    let slot = Arc::new(Mutex::new(first));
    let worker_slot = Arc::clone(&slot);

    let spawned = thread::Builder::new()
        .name(format!("courier-worker-{id}"))
        .spawn(move || {
            let first = worker_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            worker_loop(&worker_shared, first);
        });

    match spawned {
        Ok(_) => Ok(()),
        Err(e) => {
            let first = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            Err((e, first))
        }
    }
}

fn worker_loop(shared: &Shared, first: Option<Job>) {
    let mut guard = LiveGuard {
        shared,
        released: false,
    };

    if let Some(job) = first {
        run_job(shared, job);
    }

    loop {
        match shared.receiver.recv_timeout(shared.idle_timeout) {
            Ok(job) => run_job(shared, job),
            Err(RecvTimeoutError::Timeout) => {
                if shared.try_retire() {
                    guard.released = true;
                    debug!("[worker] idle; retiring");
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                trace!("[worker] queue closed and drained; exiting");
                return;
            }
        }
    }
}

fn run_job(shared: &Shared, job: Job) {
    if shared.cancel.is_cancelled() {
        shared.discarded.fetch_add(1, Ordering::Relaxed);
        trace!("[worker] pool cancelled; discarding queued batch");
        return;
    }

    // The job is dropped by the unwind, nothing of it is observed afterwards.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&shared.cancel)));
    if let Err(payload) = outcome {
        shared.panicked.fetch_add(1, Ordering::Relaxed);
        error!(
            "Uncaught panic from load worker: {}",
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
