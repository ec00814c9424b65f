//! The host-steal scheduler policy: hosts are assigned to worker threads, but an idle worker may
//! steal an unprocessed host from a busier worker rather than wait for the next barrier.

use std::collections::VecDeque;

use crate::event::{Event, HostId, SimulationTime, SIMTIME_MAX};
use crate::policy::{HostLifecycle, NoopLifecycle, PolicyKind, SchedulerPolicy};
use crate::registry::HostRegistry;
use crate::worker_slot::{WorkerId, WorkerSlot, WorkerSlotState};

/// The host-steal scheduler policy.
///
/// Construct with a fixed number of worker threads (§5: "one fixed pool of `n` worker threads").
/// Hosts are assigned with [`add_host`](SchedulerPolicy::add_host) before the run begins (or
/// migrated during the run); from then on, workers call
/// [`pop`](SchedulerPolicy::pop)/[`push`](SchedulerPolicy::push) in a loop.
pub struct HostStealPolicy {
    registry: HostRegistry,
    slots: Vec<WorkerSlot>,
    lifecycle: Box<dyn HostLifecycle>,
}

impl HostStealPolicy {
    /// Creates a policy with `n_workers` worker slots and no host lifecycle hooks.
    pub fn new(n_workers: usize) -> Self {
        Self::with_lifecycle(n_workers, Box::new(NoopLifecycle))
    }

    /// Creates a policy with `n_workers` worker slots, invoking `lifecycle`'s hooks whenever a
    /// worker starts or stops actively draining a host's queue (see [`HostLifecycle`]).
    pub fn with_lifecycle(n_workers: usize, lifecycle: Box<dyn HostLifecycle>) -> Self {
        assert!(n_workers > 0, "a scheduler needs at least one worker");
        Self {
            registry: HostRegistry::new(),
            slots: (0..n_workers).map(|_| WorkerSlot::new()).collect(),
            lifecycle,
        }
    }

    pub fn n_workers(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, worker: WorkerId) -> &WorkerSlot {
        self.slots
            .get(worker.0)
            .unwrap_or_else(|| panic!("worker {worker:?} out of range (have {})", self.slots.len()))
    }

    /// If `host` is moving to a different owner, sanity-checks that it isn't already running on
    /// both the old and new owner's slot at once -- that would mean it's being executed twice
    /// concurrently, a bug in the caller (or in this policy). Called only from the explicit
    /// `add_host`/migration path; the internal ownership handoff after a successful steal is
    /// provably safe by construction (see `pop_from`) and skips this check.
    fn assert_not_double_running(&self, host: HostId, a: WorkerId, b: WorkerId) {
        if a == b {
            return;
        }
        let (lo, hi) = if a.0 < b.0 { (a, b) } else { (b, a) };
        let lo_running = self.slot(lo).lock().running_host;
        let hi_running = self.slot(hi).lock().running_host;
        assert!(
            !(lo_running == Some(host) && hi_running == Some(host)),
            "host {host} appears to be running on both worker {a:?} and {b:?}"
        );
    }

    /// Drains the queue of whichever host is in `running_host` (taking the next one from `hosts`
    /// when there isn't one), returning the first due event found.
    ///
    /// `running_host` and `processed_hosts` always belong to the calling worker's own slot, even
    /// when `hosts` is another worker's `unprocessed_hosts` during a steal: the host being stolen
    /// becomes *this* worker's running host, and lands in *this* worker's `processed_hosts` once
    /// drained, exactly as if it had always been assigned here.
    fn pop_from(
        &self,
        running_host: &mut Option<HostId>,
        processed_hosts: &mut VecDeque<HostId>,
        hosts: &mut VecDeque<HostId>,
        barrier: SimulationTime,
        caller: WorkerId,
    ) -> Option<Event> {
        loop {
            if running_host.is_none() {
                *running_host = Some(hosts.pop_front()?);
                self.lifecycle.on_host_arrived(running_host.unwrap());
            }
            let host = running_host.unwrap();
            let queue = self.registry.queue(host);

            if let Some(event) = queue.pop_if_due(barrier) {
                // ownership handoff: this host now belongs to whichever worker actually drained
                // it, matching the C original's unconditional `migrateHost` after every pop.
                self.registry.reassign_owner(host, caller);
                return Some(event);
            }

            // no more due events on this host for this round
            self.lifecycle.on_host_leaving(host);
            processed_hosts.push_back(host);
            *running_host = None;
        }
    }

    /// Scans the other workers in cyclic order looking for one with an unprocessed host to steal.
    fn steal(&self, barrier: SimulationTime, caller: WorkerId) -> Option<Event> {
        let n = self.slots.len();
        let own = self.slot(caller);

        for i in 1..n {
            let victim_idx = (caller.0 + i) % n;
            let victim = &self.slots[victim_idx];
            let victim_id = WorkerId(victim_idx);

            // if the victim hasn't rotated for this round yet, prime the flag and spin until it
            // has. every worker enters `pop` at the start of the round, so this is bounded.
            //
            // the read of `current_barrier` and the `set_stealable(false)` prime must happen
            // under the same lock acquisition: otherwise the victim can rotate (setting the flag
            // true) in the window between our read and our store, and we'd clobber that `true`
            // back to `false` with nothing left to ever set it again this round.
            let spin_for_init = {
                let state = victim.lock();
                let needs_init = barrier > state.current_barrier;
                if needs_init {
                    victim.set_stealable(false);
                }
                needs_init
            };
            if spin_for_init {
                while !victim.is_stealable() {
                    std::hint::spin_loop();
                    std::thread::yield_now();
                }
            }

            // a stale read here is safe: a false negative just means some other worker (possibly
            // the owner) picks the host up, a false positive costs us one empty lock round-trip
            // below. unlike the C original this briefly takes the victim's lock instead of
            // reading the queue head without one, since there is no lock-free length primitive on
            // a plain `VecDeque` -- see DESIGN.md.
            if victim.lock().unprocessed_hosts.is_empty() {
                continue;
            }

            // acquire both slot locks in ascending worker-index order to avoid deadlock with a
            // concurrent steal going the other way.
            let event = if caller.0 < victim_idx {
                let mut own_state = own.lock();
                let mut victim_state = victim.lock();
                self.steal_from_locked(&mut own_state, &mut victim_state, barrier, caller)
            } else {
                let mut victim_state = victim.lock();
                let mut own_state = own.lock();
                self.steal_from_locked(&mut own_state, &mut victim_state, barrier, caller)
            };

            if event.is_some() {
                log::trace!("worker {caller:?} stole a host from worker {victim_id:?}");
                return event;
            }
        }
        None
    }

    fn steal_from_locked(
        &self,
        own_state: &mut WorkerSlotState,
        victim_state: &mut WorkerSlotState,
        barrier: SimulationTime,
        caller: WorkerId,
    ) -> Option<Event> {
        self.pop_from(
            &mut own_state.running_host,
            &mut own_state.processed_hosts,
            &mut victim_state.unprocessed_hosts,
            barrier,
            caller,
        )
    }
}

impl SchedulerPolicy for HostStealPolicy {
    fn add_host(&self, host: HostId, thread: Option<WorkerId>, caller: WorkerId) {
        let owner = thread.unwrap_or(caller);
        let _ = self.slot(owner); // panics with a clear message if out of range

        let (_queue, previous_owner) = self.registry.register(host, owner);

        if let Some(previous_owner) = previous_owner {
            if previous_owner != owner {
                self.assert_not_double_running(host, previous_owner, owner);
                log::trace!("migrating host {host} from worker {previous_owner:?} to {owner:?}");
            }
        }

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

    fn push(&self, mut event: Event, src: HostId, dst: HostId, barrier: SimulationTime, caller: WorkerId) {
        if src != dst && event.time() < barrier {
            log::debug!(
                "inter-host event time {} bumped to barrier {} to preserve causality",
                event.time(),
                barrier
            );
            event.set_time(barrier);
        }

        // hold the caller's own slot lock (if registered) before the destination queue lock, so
        // that push and pop always acquire locks in the same relative order.
        let _caller_slot_guard = self.slots.get(caller.0).map(|slot| slot.lock());
        let queue = self.registry.queue(dst);
        queue.push(event);
    }

    fn pop(&self, barrier: SimulationTime, caller: WorkerId) -> Option<Event> {
        let Some(slot) = self.slots.get(caller.0) else {
            return None;
        };

        let own_event = {
            let mut state = slot.lock();

            if barrier > state.current_barrier {
                state.current_barrier = barrier;
                if state.unprocessed_hosts.is_empty() {
                    std::mem::swap(&mut state.unprocessed_hosts, &mut state.processed_hosts);
                } else {
                    let rotated: Vec<_> = state.processed_hosts.drain(..).collect();
                    state.unprocessed_hosts.extend(rotated);
                }
                // publish the rotation: any thief spinning on this flag now sees the rotated
                // `unprocessed_hosts` (release pairs with the thief's acquire load).
                slot.set_stealable(true);
            }

            let WorkerSlotState {
                unprocessed_hosts,
                processed_hosts,
                running_host,
                ..
            } = &mut *state;
            self.pop_from(running_host, processed_hosts, unprocessed_hosts, barrier, caller)
        };

        if own_event.is_some() {
            return own_event;
        }

        log::trace!("worker {caller:?} {:?}, falling through to steal", slot.round_phase());
        self.steal(barrier, caller)
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
        PolicyKind::ParallelHostSteal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn noop_event(time: SimulationTime, src: HostId, dst: HostId) -> Event {
        Event::new(Box::new(|| {}), time, src, dst)
    }

    #[test]
    fn single_host_pops_in_time_order() {
        let policy = HostStealPolicy::new(1);
        let h0 = HostId(0);
        let w0 = WorkerId(0);

        policy.add_host(h0, None, w0);
        policy.push(noop_event(5, h0, h0), h0, h0, 10, w0);
        policy.push(noop_event(3, h0, h0), h0, h0, 10, w0);
        policy.push(noop_event(7, h0, h0), h0, h0, 10, w0);

        let times: Vec<_> = std::iter::from_fn(|| policy.pop(10, w0)).map(|e| e.time()).collect();
        assert_eq!(times, vec![3, 5, 7]);
        assert_eq!(policy.get_next_time(w0), SIMTIME_MAX);
    }

    #[test]
    fn cross_host_push_bumps_time_to_barrier() {
        let policy = HostStealPolicy::new(2);
        let h0 = HostId(0);
        let h1 = HostId(1);
        let w0 = WorkerId(0);
        let w1 = WorkerId(1);

        policy.add_host(h0, Some(w0), w0);
        policy.add_host(h1, Some(w1), w0);

        policy.push(noop_event(50, h0, h1), h0, h1, 100, w0);

        assert!(policy.pop(100, w1).is_none());
        let event = policy.pop(200, w1).expect("event should be available past the barrier");
        assert_eq!(event.time(), 100);
    }

    #[test]
    fn round_rotation_moves_host_back_to_unprocessed() {
        let policy = HostStealPolicy::new(1);
        let h0 = HostId(0);
        let w0 = WorkerId(0);
        policy.add_host(h0, None, w0);

        policy.push(noop_event(10, h0, h0), h0, h0, 15, w0);
        policy.push(noop_event(20, h0, h0), h0, h0, 15, w0);
        policy.push(noop_event(30, h0, h0), h0, h0, 15, w0);

        assert_eq!(policy.pop(15, w0).unwrap().time(), 10);
        assert!(policy.pop(15, w0).is_none());
        assert_eq!(policy.pop(25, w0).unwrap().time(), 20);
    }

    #[test]
    fn ties_are_broken_by_push_order() {
        let policy = HostStealPolicy::new(1);
        let h0 = HostId(0);
        let w0 = WorkerId(0);
        policy.add_host(h0, None, w0);

        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_a = order.clone();
        let order_b = order.clone();

        let a = Event::new(Box::new(move || order_a.lock().unwrap().push("A")), 5, h0, h0);
        let b = Event::new(Box::new(move || order_b.lock().unwrap().push("B")), 5, h0, h0);

        policy.push(a, h0, h0, 10, w0);
        policy.push(b, h0, h0, 10, w0);

        policy.pop(10, w0).unwrap().execute();
        policy.pop(10, w0).unwrap().execute();

        assert_eq!(*order.lock().unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn steal_transfers_ownership() {
        let policy = std::sync::Arc::new(HostStealPolicy::new(2));
        let h0 = HostId(0);
        let h1 = HostId(1);
        let w0 = WorkerId(0);
        let w1 = WorkerId(1);

        // both hosts start on worker 0, each with two events so one survives being stolen.
        policy.add_host(h0, Some(w0), w0);
        policy.add_host(h1, Some(w0), w0);
        policy.push(noop_event(5, h0, h0), h0, h0, 1000, w0);
        policy.push(noop_event(6, h0, h0), h0, h0, 1000, w0);
        policy.push(noop_event(5, h1, h1), h1, h1, 1000, w0);
        policy.push(noop_event(6, h1, h1), h1, h1, 1000, w0);

        // every worker must call `pop` each round for stealing to make progress: a thief spins on
        // the victim's rotation flag, which only a `pop` call on that worker ever sets.
        let owner = {
            let policy = policy.clone();
            std::thread::spawn(move || policy.pop(1000, w0))
        };
        let thief = {
            let policy = policy.clone();
            std::thread::spawn(move || policy.pop(1000, w1))
        };

        assert!(owner.join().unwrap().is_some());
        assert!(thief.join().unwrap().is_some());

        // between them, worker 0 and worker 1 now own both hosts, one each.
        let mut assigned: Vec<_> = [w0, w1].into_iter().flat_map(|w| policy.get_assigned_hosts(w)).collect();
        assigned.sort_by_key(|h| h.0);
        assert_eq!(assigned, vec![h0, h1]);
    }

    #[test]
    fn steal_waits_for_victim_rotation() {
        let policy = std::sync::Arc::new(HostStealPolicy::new(2));
        let h0 = HostId(0);
        let w0 = WorkerId(0);
        let w1 = WorkerId(1);
        policy.add_host(h0, Some(w0), w0);
        policy.push(noop_event(5, h0, h0), h0, h0, 1000, w0);

        let thief = {
            let policy = policy.clone();
            std::thread::spawn(move || policy.pop(1000, w1))
        };

        // give the thief a moment to start spinning before worker 0 rotates
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(policy.pop(1000, w0).is_some());

        let stolen = thief.join().unwrap();
        assert!(stolen.is_none(), "host 0 was already drained by its owner");
    }

    #[test]
    #[should_panic]
    fn push_to_unregistered_host_panics() {
        let policy = HostStealPolicy::new(1);
        policy.push(noop_event(1, HostId(9), HostId(9)), HostId(9), HostId(9), 10, WorkerId(0));
    }
}
