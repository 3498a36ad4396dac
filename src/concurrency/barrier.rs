use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const WAIT_INTERVAL: Duration = Duration::from_millis(10);

/// A manually reset event.
#[derive(Debug, Default)]
struct SyncEvent {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl SyncEvent {
    fn set(&self) {
        *self.flag.lock() = true;
        self.cond.notify_all();
    }

    fn clear(&self) {
        *self.flag.lock() = false;
    }

    /// Waits up to `timeout` for the event, returning whether it is set.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flag = self.flag.lock();
        if !*flag {
            self.cond.wait_for(&mut flag, timeout);
        }
        *flag
    }
}

/// A reusable barrier for the workers of one job.
///
/// Arrivals are counted under a lock. The first arrival of a cycle clears the cycle's event and
/// the last one sets it and resets the count. Each worker alternates between two events from one
/// cycle to the next, so a fast worker re-entering the barrier cannot clear the event a slow
/// worker of the previous cycle is still waiting on. A negative count marks a failed worker and
/// releases everybody.
#[derive(Debug)]
pub struct Barrier {
    total: usize,
    counter: Mutex<i64>,
    events: [SyncEvent; 2],
}

impl Barrier {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            counter: Mutex::new(0),
            events: Default::default(),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Marks the job as failed, releasing all current and future waiters with `PeerFailed`.
    pub fn fail(&self) {
        *self.counter.lock() = -(self.total as i64) - 1;
        for event in &self.events {
            event.set();
        }
    }

    pub fn is_failed(&self) -> bool {
        *self.counter.lock() < 0
    }

    /// Blocks until all `total` workers have arrived.
    ///
    /// `phase` is the calling worker's cycle count and selects which event to use.
    pub fn wait(&self, worker: usize, phase: &mut usize, stop: &AtomicBool) -> Result<()> {
        let event = &self.events[*phase % 2];

        let mut do_wait = {
            let mut counter = self.counter.lock();
            if *counter < 0 {
                false
            } else {
                if *counter == 0 {
                    event.clear();
                }
                *counter += 1;
                let waiting = *counter < self.total as i64;
                if !waiting {
                    event.set();
                    *counter = 0;
                }
                waiting
            }
        };

        while do_wait && !stop.load(Ordering::Acquire) {
            do_wait = !event.wait_timeout(WAIT_INTERVAL) && *self.counter.lock() >= 0;
        }
        *phase += 1;

        if self.is_failed() {
            return Err(Error::PeerFailed { worker });
        }
        if stop.load(Ordering::Acquire) {
            return Err(Error::Worker {
                worker,
                message: "stopped while waiting at barrier".to_string(),
            });
        }
        Ok(())
    }
}
