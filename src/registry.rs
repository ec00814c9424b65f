use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::event::HostId;
use crate::host_queue::HostQueue;
use crate::worker_slot::WorkerId;

struct HostRecord {
    queue: Arc<HostQueue>,
    owner: WorkerId,
}

/// Maps every registered host to its queue and current owning worker.
///
/// Reads (the hot path: every `push`/`pop`/`get_next_time` looks a host up) take the reader lock.
/// The writer lock is taken only when a host is registered for the first time or its ownership
/// changes, which happens at most once per host per migration -- rare compared to the steady
/// stream of event pushes and pops.
#[derive(Default)]
pub struct HostRegistry {
    hosts: RwLock<HashMap<HostId, HostRecord>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the queue for `host`, creating it under the write lock if this is the first time
    /// `host` has been seen, and assigns `owner` as its owning worker.
    ///
    /// Returns `(queue, previous_owner)`, where `previous_owner` is `None` on first registration.
    pub fn register(&self, host: HostId, owner: WorkerId) -> (Arc<HostQueue>, Option<WorkerId>) {
        // fast path: host and owner already exist and match, no write lock needed
        {
            let hosts = self.hosts.read().unwrap();
            if let Some(record) = hosts.get(&host) {
                if record.owner == owner {
                    return (Arc::clone(&record.queue), Some(owner));
                }
            }
        }

        let mut hosts = self.hosts.write().unwrap();
        match hosts.get_mut(&host) {
            Some(record) => {
                let previous = record.owner;
                record.owner = owner;
                (Arc::clone(&record.queue), Some(previous))
            }
            None => {
                let queue = Arc::new(HostQueue::new());
                hosts.insert(
                    host,
                    HostRecord {
                        queue: Arc::clone(&queue),
                        owner,
                    },
                );
                (queue, None)
            }
        }
    }

    /// Looks up the queue for an already-registered host. Panics (contract violation, see §7.1 of
    /// the design doc) if `host` was never registered -- every host reachable by a caller must
    /// have gone through `add_host` first.
    pub fn queue(&self, host: HostId) -> Arc<HostQueue> {
        let hosts = self.hosts.read().unwrap();
        Arc::clone(
            &hosts
                .get(&host)
                .unwrap_or_else(|| panic!("push/pop for unregistered host {host}"))
                .queue,
        )
    }

    pub fn owner(&self, host: HostId) -> Option<WorkerId> {
        self.hosts.read().unwrap().get(&host).map(|r| r.owner)
    }

    /// Updates `host`'s owner without touching any worker slot's `unprocessed_hosts`. Used when a
    /// steal completes: the stolen host already became the thief's `running_host` directly, so
    /// there's nothing to enqueue, just the bookkeeping of who owns it now.
    pub fn reassign_owner(&self, host: HostId, new_owner: WorkerId) {
        let mut hosts = self.hosts.write().unwrap();
        if let Some(record) = hosts.get_mut(&host) {
            record.owner = new_owner;
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
