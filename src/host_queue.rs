use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::event::{Event, SimulationTime};

/// The per-host event queue, ordered by `(time, insertion sequence)`.
///
/// Every field that mutates after construction is guarded by `lock`. A `HostQueue` never sees
/// contention from more than two threads at once in practice (the owning worker and, during a
/// steal, the thief), but correctness doesn't depend on that.
#[derive(Debug)]
pub struct HostQueue {
    lock: Mutex<Inner>,
    /// Total events ever pushed. Kept outside the mutex since it's only ever incremented and
    /// read for diagnostics/tests, never used to decide control flow under the lock.
    n_pushed: AtomicU64,
}

#[derive(Debug)]
struct Inner {
    queue: BinaryHeap<Reverse<Event>>,
    last_event_time: SimulationTime,
    n_popped: u64,
    next_sequence: u64,
}

impl HostQueue {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(Inner {
                queue: BinaryHeap::new(),
                last_event_time: 0,
                n_popped: 0,
                next_sequence: 0,
            }),
            n_pushed: AtomicU64::new(0),
        }
    }

    /// Pushes an event onto the queue, assigning it the next insertion sequence number.
    pub fn push(&self, mut event: Event) {
        let mut inner = self.lock.lock().unwrap();
        event.set_sequence(inner.next_sequence);
        inner.next_sequence += 1;
        inner.queue.push(Reverse(event));
        self.n_pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Pops the next event if it is due before `barrier`. Panics if the popped event's time would
    /// move this queue's clock backward -- that would indicate a bug in the causality adjustment
    /// upstream of this queue.
    pub fn pop_if_due(&self, barrier: SimulationTime) -> Option<Event> {
        let mut inner = self.lock.lock().unwrap();
        let ready = matches!(inner.queue.peek(), Some(Reverse(e)) if e.time() < barrier);
        if !ready {
            return None;
        }
        let event = inner.queue.pop().unwrap().0;
        assert!(
            event.time() >= inner.last_event_time,
            "host queue time moved backward: popped {} after {}",
            event.time(),
            inner.last_event_time
        );
        inner.last_event_time = event.time();
        inner.n_popped += 1;
        Some(event)
    }

    /// Peeks the time of the earliest queued event without removing it.
    pub fn peek_time(&self) -> Option<SimulationTime> {
        let inner = self.lock.lock().unwrap();
        inner.queue.peek().map(|Reverse(e)| e.time())
    }

    pub fn n_pushed(&self) -> u64 {
        self.n_pushed.load(Ordering::Relaxed)
    }

    pub fn n_popped(&self) -> u64 {
        self.lock.lock().unwrap().n_popped
    }

    pub fn len(&self) -> usize {
        self.lock.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HostQueue {
    fn default() -> Self {
        Self::new()
    }
}
