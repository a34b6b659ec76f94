use std::{
    fmt::Display,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::{Mutex, MutexGuard};

use crate::types::{
    checkpoint_state::CheckpointState,
    process_id::{Pid, Tid},
};

#[derive(Debug)]
pub struct Thread {
    pub tid: Tid,
    pub pid: Pid,
    is_leader: bool,
    checkpoint_requested: AtomicBool,
    state: Mutex<CheckpointState>,
}

impl Thread {
    pub fn new(tid: Tid, pid: Pid, is_leader: bool) -> Self {
        Self {
            tid,
            pid,
            is_leader,
            checkpoint_requested: AtomicBool::new(false),
            state: Mutex::new(CheckpointState::Normal),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn need_checkpoint(&self) -> bool {
        self.checkpoint_requested.load(Ordering::SeqCst)
    }

    /// Sets the pending flag and arms the state machine.
    pub fn request_checkpoint(&self) {
        let mut state = self.state.lock();
        state.request();
        self.checkpoint_requested.store(true, Ordering::SeqCst);
    }

    pub fn clear_need_checkpoint(&self) {
        self.checkpoint_requested.store(false, Ordering::SeqCst);
    }

    pub fn checkpoint_state(&self) -> CheckpointState {
        *self.state.lock()
    }

    /// Locks the participation state. Arrival and cancellation both happen
    /// under this lock so a thread is counted at most once per attempt.
    pub fn lock_state(&self) -> MutexGuard<'_, CheckpointState> {
        self.state.lock()
    }
}

impl Display for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_leader {
            write!(f, "[{}-{}*]", self.tid, self.pid)
        } else {
            write!(f, "[{}-{}]", self.tid, self.pid)
        }
    }
}
