use super::barrier::Barrier;
use super::future::{Future, TaskQueue};
use crate::error::{Error, Result};
use crossbeam::channel::{unbounded, RecvTimeoutError, Sender};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-worker results of a job, keyed by worker index.
pub type ResultMap<T> = BTreeMap<usize, Result<T>>;

thread_local! {
    static IN_POOL_THREAD: Cell<bool> = Cell::new(false);
}

/// The range `[start, end)` of part `part` when splitting `total` items into `nparts` parts.
///
/// The last part absorbs the remainder.
pub fn partition(total: usize, part: usize, nparts: usize) -> Range<usize> {
    if nparts == 0 {
        return 0..total;
    }
    let start = part * total / nparts;
    let end = if part + 1 == nparts {
        total
    } else {
        (part + 1) * total / nparts
    };
    start..end
}

/// Progress reporting for a job: a maximum and one counter per worker.
#[derive(Debug, Default)]
pub struct Progress {
    max: AtomicUsize,
    counts: Mutex<Vec<usize>>,
}

impl Progress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::Relaxed)
    }

    pub fn set_max(&self, max: usize) {
        self.max.store(max, Ordering::Relaxed);
    }

    /// Sum of the counters of all workers.
    pub fn value(&self) -> usize {
        self.counts.lock().iter().sum()
    }

    fn reset(&self, workers: usize) {
        let mut counts = self.counts.lock();
        counts.clear();
        counts.resize(workers, 0);
    }

    fn set(&self, worker: usize, value: usize) {
        let mut counts = self.counts.lock();
        if worker >= counts.len() {
            counts.resize(worker + 1, 0);
        }
        counts[worker] = value;
    }
}

/// Objects published by the workers of one job, keyed by worker index and name.
#[derive(Default)]
pub struct ObjectSharer {
    objects: Mutex<FxHashMap<(usize, String), Arc<dyn Any + Send + Sync>>>,
}

impl ObjectSharer {
    pub fn share<T: Any + Send + Sync>(&self, index: usize, name: &str, object: T) {
        self.objects
            .lock()
            .insert((index, name.to_string()), Arc::new(object));
    }

    /// Objects of type `T` published under `name` by every worker other than `exclude`.
    pub fn objects<T: Any + Send + Sync + Clone>(&self, name: &str, exclude: Option<usize>) -> BTreeMap<usize, T> {
        self.objects
            .lock()
            .iter()
            .filter(|((i, n), _)| n == name && Some(*i) != exclude)
            .filter_map(|((i, _), o)| o.downcast_ref::<T>().map(|o| (*i, o.clone())))
            .collect()
    }

    pub fn clear(&self) {
        self.objects.lock().clear();
    }
}

/// The view of a job from inside one worker: its index, its row range and the shared facilities.
pub struct Worker {
    index: usize,
    total: usize,
    range: Range<usize>,
    max: usize,
    barrier: Option<Arc<Barrier>>,
    sharer: Option<Arc<ObjectSharer>>,
    progress: Option<Arc<Progress>>,
    stop: Arc<AtomicBool>,
    phase: RefCell<usize>,
    progress_time: Cell<Instant>,
}

impl Worker {
    /// A stand-alone worker covering `[0, total)` without barrier or sharing.
    pub fn local(total: usize, progress: Option<Arc<Progress>>) -> Self {
        Self {
            index: 0,
            total: 1,
            range: 0..total,
            max: total,
            barrier: None,
            sharer: None,
            progress,
            stop: Arc::new(AtomicBool::new(false)),
            phase: RefCell::new(0),
            progress_time: Cell::new(Instant::now()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of workers running this job.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn start(&self) -> usize {
        self.range.start
    }

    pub fn end(&self) -> usize {
        self.range.end
    }

    /// Total number of rows of the job.
    pub fn max(&self) -> usize {
        self.max
    }

    /// This worker's rows.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// This worker's rows, reporting progress as they are consumed.
    pub fn progress_range(&self) -> impl Iterator<Item = usize> + '_ {
        let len = self.range.len();
        self.range
            .clone()
            .enumerate()
            .map(move |(count, row)| {
                self.set_progress(count + 1, count + 1 == len);
                row
            })
    }

    /// This worker's part of `items`, split the same way as rows.
    pub fn partition_slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[partition(items.len(), self.index, self.total)]
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Returns an error if the job has been stopped, to be checked between rows.
    pub fn check_stop(&self) -> Result<()> {
        if self.is_stopped() {
            Err(Error::Worker {
                worker: self.index,
                message: "job stopped".to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Blocks until all workers of the job have called `sync`. Does nothing for a stand-alone worker.
    pub fn sync(&self) -> Result<()> {
        match &self.barrier {
            Some(barrier) => barrier.wait(self.index, &mut self.phase.borrow_mut(), &self.stop),
            None => Ok(()),
        }
    }

    /// Publishes `object` under `name`. With `exchange` the workers synchronize and the objects
    /// published under `name` by the other workers are returned.
    pub fn share<T: Any + Send + Sync + Clone>(&self, name: &str, object: T, exchange: bool) -> Result<BTreeMap<usize, T>> {
        match &self.sharer {
            Some(sharer) if self.total > 1 => {
                sharer.share(self.index, name, object);
                if exchange {
                    self.sync()?;
                    Ok(sharer.objects(name, Some(self.index)))
                } else {
                    Ok(BTreeMap::new())
                }
            }
            _ => Ok(BTreeMap::new()),
        }
    }

    /// Objects published under `name` by the other workers.
    pub fn objects<T: Any + Send + Sync + Clone>(&self, name: &str) -> BTreeMap<usize, T> {
        self.sharer
            .as_ref()
            .map(|s| s.objects(name, Some(self.index)))
            .unwrap_or_default()
    }

    /// Reports `value` rows done, at most every 200 ms unless `force` is set.
    pub fn set_progress(&self, value: usize, force: bool) {
        let now = Instant::now();
        if !force && now.duration_since(self.progress_time.get()) < PROGRESS_INTERVAL {
            return;
        }
        self.progress_time.set(now);
        if let Some(progress) = &self.progress {
            progress.set(self.index, value);
        }
    }
}

type WorkerMessage = Box<dyn FnOnce() + Send>;
type Dispatch = Box<dyn FnOnce(&PoolShared) -> Result<()> + Send>;

struct PoolShared {
    mailboxes: Vec<Sender<WorkerMessage>>,
    stop: Arc<AtomicBool>,
}

/// A fixed pool of worker threads addressed by index, fed by a single dispatch queue.
///
/// Jobs split a row range across the workers. A job asking for one part, or submitted from inside
/// a pool thread, runs inline in the submitting thread.
pub struct WorkerPool {
    num_workers: usize,
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
    queue: Option<TaskQueue<Dispatch, ()>>,
}

static GLOBAL_POOL: Lazy<WorkerPool> = Lazy::new(|| {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    WorkerPool::new(workers)
});

fn worker_loop(index: usize, receiver: crossbeam::channel::Receiver<WorkerMessage>, stop: Arc<AtomicBool>) {
    IN_POOL_THREAD.with(|f| f.set(true));
    log::trace!("Worker {} started", index);
    while !stop.load(Ordering::Acquire) {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(message) => message(),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::trace!("Worker {} exiting", index);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

/// Runs `target` for one worker, converting panics into worker errors.
fn run_target<T, F>(target: &F, worker: &Worker) -> Result<T>
where
    F: Fn(&Worker) -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(|| target(worker))) {
        Ok(result) => result,
        Err(payload) => Err(Error::Worker {
            worker: worker.index(),
            message: panic_message(payload),
        }),
    }
}

/// Replaces every entry by the first failure, preferring a worker's own error over a peer failure.
fn propagate_failure<T>(results: ResultMap<T>) -> ResultMap<T> {
    let first = results
        .values()
        .filter_map(|r| r.as_ref().err())
        .min_by_key(|e| matches!(e, Error::PeerFailed { .. }))
        .cloned();
    match first {
        Some(error) => results.into_keys().map(|i| (i, Err(error.clone()))).collect(),
        None => results,
    }
}

impl WorkerPool {
    /// A pool of `num_workers` threads. With a single worker no threads are started and all jobs
    /// run inline. See [`WorkerPool::global`] for a pool sized to the hardware.
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let stop = Arc::new(AtomicBool::new(false));

        let mut mailboxes = Vec::new();
        let mut threads = Vec::new();
        if num_workers > 1 {
            for index in 0..num_workers {
                let (sender, receiver) = unbounded();
                let worker_stop = Arc::clone(&stop);
                match std::thread::Builder::new()
                    .name(format!("eidolon-worker-{}", index))
                    .spawn(move || worker_loop(index, receiver, worker_stop))
                {
                    Ok(handle) => {
                        mailboxes.push(sender);
                        threads.push(handle);
                    }
                    Err(e) => {
                        log::error!("Failed to start worker thread {}: {}", index, e);
                        break;
                    }
                }
            }
        }

        let shared = Arc::new(PoolShared { mailboxes, stop });
        let queue_shared = Arc::clone(&shared);
        let queue = TaskQueue::new("eidolon-dispatch", move |dispatch: Dispatch| {
            IN_POOL_THREAD.with(|f| f.set(true));
            dispatch(&queue_shared)
        });

        Self {
            num_workers,
            shared,
            threads,
            queue: Some(queue),
        }
    }

    /// The process-wide pool sized to the available parallelism.
    pub fn global() -> &'static WorkerPool {
        &GLOBAL_POOL
    }

    /// Number of workers jobs can be split across.
    pub fn num_workers(&self) -> usize {
        self.shared.mailboxes.len().max(1).min(self.num_workers)
    }

    /// Number of parts for a job of `total` rows when `requested` parts are asked for, where 0 (or
    /// more than there are workers) means all workers.
    pub fn effective_parts(&self, total: usize, requested: usize) -> usize {
        let pool = self.num_workers();
        let parts = if requested == 0 || requested > pool { pool } else { requested };
        parts.min(total)
    }

    /// Picks a part count for `num_elems` elements refined `refine` times: 1 (serial) below
    /// `threshold`, `num_elems` if there are no more elements than workers, otherwise 0 (all workers).
    pub fn choose_proc_count(&self, num_elems: usize, refine: usize, threshold: usize) -> usize {
        if num_elems * (refine + 1) < threshold {
            1
        } else if num_elems <= self.num_workers() {
            num_elems
        } else {
            0
        }
    }

    /// Submits a job over `total` rows split into `nparts` parts (0 for all workers). `target` is
    /// called once per part with the part's [`Worker`].
    pub fn submit<T, F>(&self, total: usize, nparts: usize, progress: Option<Arc<Progress>>, target: F) -> Future<ResultMap<T>>
    where
        T: Send + 'static,
        F: Fn(&Worker) -> Result<T> + Send + Sync + 'static,
    {
        let parts = self.effective_parts(total, nparts);
        if let Some(progress) = &progress {
            progress.set_max(total);
            progress.reset(parts.max(1));
        }

        let in_pool = IN_POOL_THREAD.with(|f| f.get());
        let queue = match &self.queue {
            Some(queue) if parts > 1 && !in_pool && !self.shared.mailboxes.is_empty() => queue,
            _ => {
                let future = Future::new();
                let worker = Worker::local(total, progress);
                let result = run_target(&target, &worker);
                if let Err(e) = &result {
                    log::warn!("Inline job failed: {}", e);
                }
                future.set(BTreeMap::from([(0, result)]));
                return future;
            }
        };

        let future = Future::new();
        let guard = future.guard();
        let dispatch: Dispatch = Box::new(move |shared: &PoolShared| {
            let results = dispatch_job(shared, total, parts, progress, target);
            let failed = results.values().any(|r| r.is_err());
            guard.set(results);
            if failed {
                Err(Error::Worker {
                    worker: 0,
                    message: "job failed".to_string(),
                })
            } else {
                Ok(())
            }
        });
        // The dispatch future only carries the queue's failure signal
        drop(queue.submit(dispatch));
        future
    }

    /// Submits a job and waits for its results.
    pub fn run<T, F>(&self, total: usize, nparts: usize, progress: Option<Arc<Progress>>, target: F) -> Result<ResultMap<T>>
    where
        T: Send + 'static,
        F: Fn(&Worker) -> Result<T> + Send + Sync + 'static,
    {
        self.submit(total, nparts, progress, target).wait()
    }

    /// Stops all workers. Jobs still queued are cancelled and no further jobs run concurrently.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(mut queue) = self.queue.take() {
            queue.stop();
        }
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_job<T, F>(shared: &PoolShared, total: usize, parts: usize, progress: Option<Arc<Progress>>, target: F) -> ResultMap<T>
where
    T: Send + 'static,
    F: Fn(&Worker) -> Result<T> + Send + Sync + 'static,
{
    log::debug!("Dispatching job of {} rows to {} workers", total, parts);
    let started = Instant::now();
    let barrier = Arc::new(Barrier::new(parts));
    let sharer = Arc::new(ObjectSharer::default());
    let target = Arc::new(target);
    let (result_sender, result_receiver) = unbounded();

    for (index, mailbox) in shared.mailboxes.iter().take(parts).enumerate() {
        let worker = Worker {
            index,
            total: parts,
            range: partition(total, index, parts),
            max: total,
            barrier: Some(Arc::clone(&barrier)),
            sharer: Some(Arc::clone(&sharer)),
            progress: progress.clone(),
            stop: Arc::clone(&shared.stop),
            phase: RefCell::new(0),
            progress_time: Cell::new(Instant::now()),
        };
        let target = Arc::clone(&target);
        let worker_barrier = Arc::clone(&barrier);
        let sender = result_sender.clone();

        let message: WorkerMessage = Box::new(move || {
            let result = run_target(target.as_ref(), &worker);
            if let Err(e) = &result {
                if !matches!(e, Error::PeerFailed { .. }) {
                    log::error!("Worker {} failed: {}", index, e);
                }
                worker_barrier.fail();
            }
            drop(target);
            drop(worker);
            let _ = sender.send((index, result));
        });

        if mailbox.send(message).is_err() {
            barrier.fail();
            let _ = result_sender.send((
                index,
                Err(Error::Worker {
                    worker: index,
                    message: "worker thread is not running".to_string(),
                }),
            ));
        }
    }
    drop(result_sender);
    drop(target);

    let mut results = ResultMap::new();
    while results.len() < parts {
        match result_receiver.recv() {
            Ok((index, result)) => {
                results.insert(index, result);
            }
            Err(_) => break,
        }
    }
    for index in 0..parts {
        results.entry(index).or_insert_with(|| {
            Err(Error::Worker {
                worker: index,
                message: "worker exited without a result".to_string(),
            })
        });
    }

    log::debug!("Job of {} rows completed in {:.3?}", total, started.elapsed());
    propagate_failure(results)
}

/// Returns the first error in worker order, if any.
pub fn check_result_map<T>(results: &ResultMap<T>) -> Result<()> {
    match results.values().find_map(|r| r.as_ref().err()) {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

/// Concatenates per-worker vectors in worker order, failing with the first error.
pub fn sum_result_map<T>(results: ResultMap<Vec<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for (_, r) in results {
        out.extend(r?);
    }
    Ok(out)
}

/// Per-worker values in worker order, failing with the first error.
pub fn list_results<T>(results: ResultMap<T>) -> Result<Vec<T>> {
    results.into_values().collect()
}
