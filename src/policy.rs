use crate::event::{Event, HostId, SimulationTime};
use crate::worker_slot::WorkerId;

/// Identifies which concrete [`SchedulerPolicy`] is behind a handle, for callers that support
/// more than one policy and need to branch on which one is in use (e.g. to pick different
/// diagnostics). Mirrors the `type` tag the C original carries alongside its function-pointer
/// table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PolicyKind {
    /// [`crate::host_steal::HostStealPolicy`]: hosts are assigned to worker threads but may be
    /// stolen by an idle worker.
    ParallelHostSteal,
    /// [`crate::static_policy::StaticPolicy`]: hosts stay on the worker they were assigned to;
    /// no stealing.
    StaticPartition,
}

/// The six operations every scheduler policy in this crate must provide.
///
/// All methods take an explicit `caller: WorkerId` rather than reading thread-local state, since
/// that's the idiomatic Rust way to express "the calling worker's identity" without a hidden
/// global -- see §5 of the design notes.
pub trait SchedulerPolicy: Send + Sync {
    /// Assigns `host` to `thread` (or to `caller` if `thread` is `None`), creating its queue if
    /// this is the first time `host` has been seen. Not idempotent: calling this again with a
    /// different `thread` migrates the host.
    fn add_host(&self, host: HostId, thread: Option<WorkerId>, caller: WorkerId);

    /// Returns every host currently assigned to `caller` (processed, unprocessed, and running).
    fn get_assigned_hosts(&self, caller: WorkerId) -> Vec<HostId>;

    /// Delivers `event` to `dst`'s queue, applying the causality adjustment if `src != dst` and
    /// `event.time() < barrier`.
    fn push(&self, event: Event, src: HostId, dst: HostId, barrier: SimulationTime, caller: WorkerId);

    /// Returns the next event due before `barrier` from any host assigned to or stolen by
    /// `caller`, or `None` if there is none.
    fn pop(&self, barrier: SimulationTime, caller: WorkerId) -> Option<Event>;

    /// Returns the earliest time of any event queued on a host assigned to `caller`, or
    /// [`crate::event::SIMTIME_MAX`] if none.
    fn get_next_time(&self, caller: WorkerId) -> SimulationTime;

    /// Which policy variant this is.
    fn kind(&self) -> PolicyKind;

    /// Tears down the policy's internal state. Dropping the policy does the same thing; this
    /// exists as an explicit, idempotent no-op hook for callers ported from the C interface,
    /// where `free` was the only way to release a `SchedulerPolicy`.
    fn free(&self) {}
}

/// Collaborator hooks invoked when a worker starts and stops actively running a host's events.
///
/// The C original contained a disabled call (`host_migrate`, commented out) to reattach
/// thread-affine host state -- e.g. a ptrace attachment -- when a host moves to a new worker via
/// stealing. Whether that's needed is a property of the caller's host representation, not of the
/// scheduler, so it's expressed here as a callback trait with no-op defaults rather than as a
/// concrete operation this crate performs.
pub trait HostLifecycle: Send + Sync {
    /// Called just before a worker begins draining `host`'s queue (as `running_host`).
    fn on_host_arrived(&self, _host: HostId) {}

    /// Called just after a worker stops draining `host`'s queue for this round (no more due
    /// events, or the queue is empty).
    fn on_host_leaving(&self, _host: HostId) {}
}

/// The default [`HostLifecycle`]: no hooks.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoopLifecycle;

impl HostLifecycle for NoopLifecycle {}
