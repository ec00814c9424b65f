//! A baseline scheduler policy with no stealing: each host stays on the worker it was assigned
//! to. Useful as a correctness and performance comparison point for [`crate::host_steal`].

use crate::event::{Event, HostId, SimulationTime, SIMTIME_MAX};
use crate::policy::{PolicyKind, SchedulerPolicy};
use crate::registry::HostRegistry;
use crate::worker_slot::{WorkerId, WorkerSlot, WorkerSlotState};

pub struct StaticPolicy {
    registry: HostRegistry,
    slots: Vec<WorkerSlot>,
}

impl StaticPolicy {
    pub fn new(n_workers: usize) -> Self {
        assert!(n_workers > 0, "a scheduler needs at least one worker");
        Self {
            registry: HostRegistry::new(),
            slots: (0..n_workers).map(|_| WorkerSlot::new()).collect(),
        }
    }

    fn slot(&self, worker: WorkerId) -> &WorkerSlot {
        self.slots
            .get(worker.0)
            .unwrap_or_else(|| panic!("worker {worker:?} out of range (have {})", self.slots.len()))
    }
}

impl SchedulerPolicy for StaticPolicy {
    fn add_host(&self, host: HostId, thread: Option<WorkerId>, caller: WorkerId) {
        let owner = thread.unwrap_or(caller);
        let (_queue, previous_owner) = self.registry.register(host, owner);
        assert!(
            previous_owner.is_none() || previous_owner == Some(owner),
            "StaticPolicy hosts never migrate once assigned"
        );

        let mut state = self.slot(owner).lock();
        if state.running_host != Some(host) {
            state.unprocessed_hosts.push_back(host);
        }
    }

    fn get_assigned_hosts(&self, caller: WorkerId) -> Vec<HostId> {
        match self.slots.get(caller.0) {
            Some(slot) => slot.lock().all_hosts().collect(),
            None => Vec::new(),
        }
    }

    fn push(&self, mut event: Event, src: HostId, dst: HostId, barrier: SimulationTime, _caller: WorkerId) {
        if src != dst && event.time() < barrier {
            event.set_time(barrier);
        }
        self.registry.queue(dst).push(event);
    }

    fn pop(&self, barrier: SimulationTime, caller: WorkerId) -> Option<Event> {
        let slot = self.slots.get(caller.0)?;
        let mut state = slot.lock();

        if barrier > state.current_barrier {
            state.current_barrier = barrier;
            if state.unprocessed_hosts.is_empty() {
                std::mem::swap(&mut state.unprocessed_hosts, &mut state.processed_hosts);
            } else {
                let rotated: Vec<_> = state.processed_hosts.drain(..).collect();
                state.unprocessed_hosts.extend(rotated);
            }
        }

        let WorkerSlotState {
            unprocessed_hosts,
            processed_hosts,
            running_host,
            ..
        } = &mut *state;

        loop {
            if running_host.is_none() {
                *running_host = Some(unprocessed_hosts.pop_front()?);
            }
            let host = running_host.unwrap();
            let queue = self.registry.queue(host);
            if let Some(event) = queue.pop_if_due(barrier) {
                return Some(event);
            }
            processed_hosts.push_back(host);
            *running_host = None;
        }
    }

    fn get_next_time(&self, caller: WorkerId) -> SimulationTime {
        let Some(slot) = self.slots.get(caller.0) else {
            return SIMTIME_MAX;
        };
        let state = slot.lock();
        state
            .rotation_hosts()
            .filter_map(|h| self.registry.queue(h).peek_time())
            .min()
            .unwrap_or(SIMTIME_MAX)
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::StaticPartition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_event(time: SimulationTime, src: HostId, dst: HostId) -> Event {
        Event::new(Box::new(|| {}), time, src, dst)
    }

    #[test]
    fn hosts_never_move_off_their_worker() {
        let policy = StaticPolicy::new(2);
        let h0 = HostId(0);
        let w0 = WorkerId(0);
        let w1 = WorkerId(1);

        policy.add_host(h0, Some(w0), w0);
        policy.push(noop_event(1, h0, h0), h0, h0, 100, w0);

        assert!(policy.pop(100, w1).is_none());
        assert!(policy.pop(100, w0).is_some());
    }

    #[test]
    #[should_panic(expected = "never migrate")]
    fn reassigning_a_host_panics() {
        let policy = StaticPolicy::new(2);
        policy.add_host(HostId(0), Some(WorkerId(0)), WorkerId(0));
        policy.add_host(HostId(0), Some(WorkerId(1)), WorkerId(0));
    }
}
