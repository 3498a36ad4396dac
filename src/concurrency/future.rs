use crate::error::{Error, Result};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Slot<T> {
    value: Mutex<Option<Result<T>>>,
    ready: Condvar,
}

/// A value provided later by another thread.
///
/// Handles are cheap to clone; all clones refer to the same slot. The value is taken out by the
/// first successful wait.
pub struct Future<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future").field("is_set", &self.is_set()).finish()
    }
}

impl<T> Future<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                value: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    pub fn set_result(&self, result: Result<T>) {
        *self.slot.value.lock() = Some(result);
        self.slot.ready.notify_all();
    }

    pub fn set(&self, value: T) {
        self.set_result(Ok(value));
    }

    pub fn set_error(&self, error: Error) {
        self.set_result(Err(error));
    }

    pub fn is_set(&self) -> bool {
        self.slot.value.lock().is_some()
    }

    /// Blocks until the value is available and takes it, returning a stored error as `Err`.
    pub fn wait(&self) -> Result<T> {
        let mut value = self.slot.value.lock();
        loop {
            if let Some(result) = value.take() {
                return result;
            }
            self.slot.ready.wait(&mut value);
        }
    }

    /// As [`wait`](Self::wait) but gives up after `timeout`, returning `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        let deadline = Instant::now() + timeout;
        let mut value = self.slot.value.lock();
        loop {
            if let Some(result) = value.take() {
                return Some(result);
            }
            if self.slot.ready.wait_until(&mut value, deadline).timed_out() {
                return value.take();
            }
        }
    }

    /// A guard which sets an error on this future if dropped before a value was set.
    pub fn guard(&self) -> FutureGuard<T> {
        FutureGuard { future: self.clone() }
    }
}

/// Sets an error on its future when dropped before a value was set.
pub struct FutureGuard<T> {
    future: Future<T>,
}

impl<T> FutureGuard<T> {
    pub fn future(&self) -> &Future<T> {
        &self.future
    }

    pub fn set(&self, value: T) {
        self.future.set(value);
    }

    pub fn set_result(&self, result: Result<T>) {
        self.future.set_result(result);
    }
}

impl<T> Drop for FutureGuard<T> {
    fn drop(&mut self) {
        let mut value = self.future.slot.value.lock();
        if value.is_none() {
            *value = Some(Err(Error::Worker {
                worker: 0,
                message: "result scope exited without providing a value".to_string(),
            }));
            self.future.slot.ready.notify_all();
        }
    }
}

type Handler<A, T> = Box<dyn FnMut(A) -> Result<T> + Send>;

/// A FIFO of argument values consumed in submission order by a single thread running a handler.
///
/// When the handler fails, every item still pending is dropped and its future receives an error.
pub struct TaskQueue<A, T> {
    sender: Option<Sender<(A, Future<T>)>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl<A, T> TaskQueue<A, T>
where
    A: Send + 'static,
    T: Send + 'static,
{
    pub fn new(name: &str, handler: impl FnMut(A) -> Result<T> + Send + 'static) -> Self {
        let (sender, receiver) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handler: Handler<A, T> = Box::new(handler);
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || process_queue(receiver, handler, thread_stop))
            .map_err(|e| log::error!("Failed to start task queue thread: {}", e))
            .ok();

        Self {
            sender: Some(sender),
            stop,
            thread,
        }
    }

    /// Enqueues `args`, returning the future the handler's result will be placed in.
    pub fn submit(&self, args: A) -> Future<T> {
        let future = Future::new();
        let sent = match (&self.sender, &self.thread) {
            (Some(sender), Some(_)) => sender.send((args, future.clone())).is_ok(),
            _ => false,
        };
        if !sent {
            future.set_error(Error::Worker {
                worker: 0,
                message: "task queue is not running".to_string(),
            });
        }
        future
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |t| !t.is_finished()) && !self.stop.load(Ordering::Acquire)
    }

    /// Stops the queue thread once the item being processed is done. Pending items are cancelled.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Task queue thread panicked");
            }
        }
    }
}

impl<A, T> Drop for TaskQueue<A, T> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn cancel_pending<A, T>(receiver: &Receiver<(A, Future<T>)>, reason: &str) -> usize {
    let mut count = 0;
    while let Ok((args, future)) = receiver.try_recv() {
        drop(args);
        future.set_error(Error::Worker {
            worker: 0,
            message: reason.to_string(),
        });
        count += 1;
    }
    count
}

fn process_queue<A, T>(receiver: Receiver<(A, Future<T>)>, mut handler: Handler<A, T>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Acquire) {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok((args, future)) => {
                let guard = future.guard();
                let result = handler(args);
                let failed = result.is_err();
                guard.set_result(result);
                if failed {
                    let flushed = cancel_pending(&receiver, "cancelled after failure of an earlier job");
                    if flushed > 0 {
                        log::warn!("Flushed {} pending job(s) after a job failure", flushed);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    cancel_pending(&receiver, "task queue stopped");
}
