use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::event::{HostId, SimulationTime};

/// Stable index of a worker thread, assigned by the caller at registration time.
///
/// Unlike the C original, which looked up a `HostStealThreadData` by `pthread_self()`, every
/// method in this crate takes the `WorkerId` explicitly: there's no hidden global, and a caller
/// can run more than one simulation's worker pool in the same process without them interfering.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

/// The mutable, lock-guarded part of a [`WorkerSlot`].
#[derive(Debug, Default)]
pub struct WorkerSlotState {
    /// Hosts assigned to this worker that have not yet been run this round. Other than the first
    /// round, this is last round's `processed_hosts`.
    pub unprocessed_hosts: VecDeque<HostId>,
    /// Hosts whose events have all been drained (for now) this round.
    pub processed_hosts: VecDeque<HostId>,
    /// The host currently being drained by this worker. Belongs to neither of the above queues.
    pub running_host: Option<HostId>,
    /// The barrier this worker last observed in `pop`.
    pub current_barrier: SimulationTime,
}

impl WorkerSlotState {
    /// All hosts assigned to this worker, in `processed ++ unprocessed ++ running` order. Used by
    /// `get_assigned_hosts` and `get_next_time`; safe to call between rounds.
    pub fn all_hosts(&self) -> impl Iterator<Item = HostId> + '_ {
        self.processed_hosts
            .iter()
            .chain(self.unprocessed_hosts.iter())
            .chain(self.running_host.iter())
            .copied()
    }

    /// Hosts assigned to this worker that aren't currently running: `processed ++ unprocessed`.
    /// `get_next_time` uses this rather than `all_hosts` since it only needs the hosts waiting
    /// their turn, matching §4.6 of the design notes.
    pub fn rotation_hosts(&self) -> impl Iterator<Item = HostId> + '_ {
        self.processed_hosts.iter().chain(self.unprocessed_hosts.iter()).copied()
    }
}

/// A debug/diagnostic snapshot of where a worker sits in its current round, derived on demand
/// from a [`WorkerSlot`]'s fields (see §4.7 of the design notes). Nothing in the scheduler
/// branches on this -- it's recomputed from `is_stealable` and the host lists each time it's
/// asked for, rather than stored, so it can never become a second source of truth.
///
/// `Rotating` (the instant between observing a new barrier and publishing `is_stealable`) isn't
/// represented: that transition happens entirely inside the slot lock held by `pop`, so no
/// observer calling [`WorkerSlot::round_phase`] from outside that critical section can ever
/// catch a slot mid-rotation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum RoundPhase {
    /// Hasn't observed the current round's barrier yet: no rotation performed, not stealable.
    IdleBetweenRounds,
    /// Rotated for this round and still has a running host or unprocessed hosts waiting.
    Running,
    /// Rotated for this round, but this worker's own hosts are exhausted; only a steal (by this
    /// worker, or of this worker by someone else) can make further progress.
    Drained,
}

/// Per-worker scheduling state: the host queues assigned to this worker, and the atomic
/// readiness flag other workers spin on while trying to steal from it.
#[derive(Debug)]
pub struct WorkerSlot {
    state: Mutex<WorkerSlotState>,
    /// `true` once this worker has performed its round-start rotation for `current_barrier`.
    /// Published with `Release` after rotation; thieves spin on it with `Acquire` so that seeing
    /// `true` guarantees they observe the rotated `unprocessed_hosts`.
    is_stealable: AtomicBool,
}

impl WorkerSlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkerSlotState::default()),
            is_stealable: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, WorkerSlotState> {
        self.state.lock().unwrap()
    }

    /// Lock-free read of the stealable flag. A thief uses this to decide whether it needs to spin
    /// waiting for this worker's round-start rotation.
    pub fn is_stealable(&self) -> bool {
        self.is_stealable.load(Ordering::Acquire)
    }

    pub fn set_stealable(&self, value: bool) {
        self.is_stealable.store(value, Ordering::Release);
    }

    /// Derives this slot's [`RoundPhase`] from its current fields. Debug/test-only -- see the
    /// enum's doc comment.
    pub(crate) fn round_phase(&self) -> RoundPhase {
        if !self.is_stealable() {
            return RoundPhase::IdleBetweenRounds;
        }
        let state = self.lock();
        if state.running_host.is_some() || !state.unprocessed_hosts.is_empty() {
            RoundPhase::Running
        } else {
            RoundPhase::Drained
        }
    }
}

impl Default for WorkerSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_hosts_concatenates_in_order() {
        let mut state = WorkerSlotState::default();
        state.processed_hosts.push_back(HostId(1));
        state.unprocessed_hosts.push_back(HostId(2));
        state.running_host = Some(HostId(3));

        let hosts: Vec<_> = state.all_hosts().collect();
        assert_eq!(hosts, vec![HostId(1), HostId(2), HostId(3)]);
    }

    #[test]
    fn stealable_flag_round_trips() {
        let slot = WorkerSlot::new();
        assert!(!slot.is_stealable());
        slot.set_stealable(true);
        assert!(slot.is_stealable());
    }

    #[test]
    fn round_phase_tracks_rotation_and_drain() {
        let slot = WorkerSlot::new();
        assert_eq!(slot.round_phase(), RoundPhase::IdleBetweenRounds);

        slot.lock().unprocessed_hosts.push_back(HostId(0));
        slot.set_stealable(true);
        assert_eq!(slot.round_phase(), RoundPhase::Running);

        slot.lock().unprocessed_hosts.pop_front();
        assert_eq!(slot.round_phase(), RoundPhase::Drained);

        slot.lock().running_host = Some(HostId(0));
        assert_eq!(slot.round_phase(), RoundPhase::Running);
    }
}
