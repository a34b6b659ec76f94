use std::time::{Duration, Instant};

use crate::types::{
    process_id::Tid,
    run_state::{RunState, StateMask},
};

/// Park/wake primitive provided by the thread scheduler.
pub trait ParkWake: Sync {
    /// Returns the current scheduling state of `tid`.
    fn run_state(&self, tid: Tid) -> Option<RunState>;

    /// Sets the scheduling state of the calling thread without blocking.
    fn set_current_state(&self, tid: Tid, state: RunState);

    /// Blocks the calling thread until it is woken, unless its state is
    /// already `Running`.
    fn schedule(&self, tid: Tid);

    /// Wakes `tid` if it is sleeping in a state covered by `mask`. Returns
    /// whether a matching blocked thread was found.
    fn wake_matching(&self, tid: Tid, mask: StateMask) -> bool;

    /// Wakes every thread in `tids` regardless of the state it sleeps in.
    fn abort_all(&self, tids: &[Tid]);

    /// Forces a running thread through a reschedule so it re-enters the kernel.
    fn force_reschedule(&self, tid: Tid);

    fn preempt_disable(&self, tid: Tid);

    fn preempt_enable_no_resched(&self, tid: Tid);

    fn park_current(&self, tid: Tid, state: RunState) {
        self.set_current_state(tid, state);
        self.schedule(tid);
    }
}

pub trait Clock: Sync {
    /// Monotonic time since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
