use std::{collections::HashMap, sync::Arc, time::Duration};

use log::trace;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::{
    sched::{Clock, MonotonicClock, ParkWake},
    types::{
        process_id::Tid,
        run_state::{RunState, StateMask},
    },
};

#[derive(Debug, Default)]
struct SlotState {
    run_state: RunState,
    preempt_count: i32,
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedProbes {
    pub wakes: Vec<(Tid, StateMask, bool)>,
    pub abort_all_calls: usize,
    pub aborted: Vec<Tid>,
    pub reschedules: Vec<Tid>,
    pub preempt_disables: usize,
    pub preempt_enables: usize,
}

impl SchedProbes {
    pub fn scoped_wakes(&self, mask: StateMask) -> usize {
        self.wakes.iter().filter(|(_, m, _)| *m == mask).count()
    }
}

/// Park/wake primitive for OS threads standing in for kernel threads. Each
/// thread has a slot holding its run state; `schedule` blocks on the slot's
/// condition variable until a wake sets the state back to `Running`.
#[derive(Debug, Default)]
pub struct ParkingScheduler {
    slots: RwLock<HashMap<Tid, Arc<Slot>>>,
    probes: Mutex<SchedProbes>,
    clock: MonotonicClock,
}

impl ParkingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tid: Tid) {
        self.slots.write().entry(tid).or_default();
    }

    pub fn probes(&self) -> SchedProbes {
        self.probes.lock().clone()
    }

    pub fn reset_probes(&self) {
        *self.probes.lock() = SchedProbes::default();
    }

    pub fn preempt_count(&self, tid: Tid) -> Option<i32> {
        self.slot(tid).map(|s| s.state.lock().preempt_count)
    }

    fn slot(&self, tid: Tid) -> Option<Arc<Slot>> {
        self.slots.read().get(&tid).cloned()
    }

    fn slot_or_register(&self, tid: Tid) -> Arc<Slot> {
        if let Some(slot) = self.slot(tid) {
            return slot;
        }
        self.slots.write().entry(tid).or_default().clone()
    }

    fn try_wake(slot: &Slot, mask: Option<StateMask>) -> bool {
        let mut state = slot.state.lock();

        let matched = match mask {
            Some(mask) => state.run_state.matches(mask),
            None => state.run_state.is_sleeping(),
        };

        if matched {
            state.run_state = RunState::Running;
            slot.cond.notify_all();
        }

        matched
    }
}

impl ParkWake for ParkingScheduler {
    fn run_state(&self, tid: Tid) -> Option<RunState> {
        self.slot(tid).map(|s| s.state.lock().run_state)
    }

    fn set_current_state(&self, tid: Tid, state: RunState) {
        self.slot_or_register(tid).state.lock().run_state = state;
    }

    fn schedule(&self, tid: Tid) {
        let slot = self.slot_or_register(tid);
        let mut state = slot.state.lock();

        while state.run_state.is_sleeping() {
            trace!("[{tid}] Sleeping in {}", state.run_state);
            slot.cond.wait(&mut state);
        }
    }

    fn wake_matching(&self, tid: Tid, mask: StateMask) -> bool {
        let woken = self
            .slot(tid)
            .is_some_and(|slot| Self::try_wake(&slot, Some(mask)));

        self.probes.lock().wakes.push((tid, mask, woken));
        woken
    }

    fn abort_all(&self, tids: &[Tid]) {
        {
            let mut probes = self.probes.lock();
            probes.abort_all_calls += 1;
            probes.aborted.extend_from_slice(tids);
        }

        for &tid in tids {
            if let Some(slot) = self.slot(tid) {
                Self::try_wake(&slot, None);
            }
        }
    }

    fn force_reschedule(&self, tid: Tid) {
        trace!("[{tid}] Kicked");
        self.probes.lock().reschedules.push(tid);
    }

    fn preempt_disable(&self, tid: Tid) {
        self.slot_or_register(tid).state.lock().preempt_count += 1;
        self.probes.lock().preempt_disables += 1;
    }

    fn preempt_enable_no_resched(&self, tid: Tid) {
        self.slot_or_register(tid).state.lock().preempt_count -= 1;
        self.probes.lock().preempt_enables += 1;
    }
}

impl Clock for ParkingScheduler {
    fn now(&self) -> Duration {
        self.clock.now()
    }
}
