pub mod table;
pub mod thread;

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};

use crate::{
    error::{Error, Result},
    types::process_id::{Pid, Tid},
};

use self::thread::Thread;

/// A thread group.
///
/// The thread list lock is only held while traversing the group. It is never
/// held across the rendezvous itself. The arming lock serializes the
/// dispatcher marking the group against the leader aborting the attempt, and
/// is taken before the thread list lock.
#[derive(Debug)]
pub struct Process {
    pub pid: Pid,
    leader: Arc<Thread>,
    threads: RwLock<Vec<Arc<Thread>>>,
    arming: Mutex<()>,
    arrivals: AtomicUsize,
    attempt_active: AtomicBool,
    pending_departures: AtomicUsize,
}

impl Process {
    pub fn new(pid: Pid, leader_tid: Tid) -> Self {
        let leader = Arc::new(Thread::new(leader_tid, pid, true));

        Self {
            pid,
            leader: leader.clone(),
            threads: RwLock::new(vec![leader]),
            arming: Mutex::new(()),
            arrivals: AtomicUsize::new(0),
            attempt_active: AtomicBool::new(false),
            pending_departures: AtomicUsize::new(0),
        }
    }

    pub fn leader(&self) -> &Arc<Thread> {
        &self.leader
    }

    pub fn threads(&self) -> RwLockReadGuard<'_, Vec<Arc<Thread>>> {
        self.threads.read()
    }

    /// Held by the dispatcher for the whole marking pass, and by the leader
    /// while it cancels a timed-out attempt.
    pub fn lock_arming(&self) -> MutexGuard<'_, ()> {
        self.arming.lock()
    }

    pub fn nr_threads(&self) -> usize {
        self.threads.read().len()
    }

    pub fn thread(&self, tid: Tid) -> Option<Arc<Thread>> {
        self.threads.read().iter().find(|t| t.tid == tid).cloned()
    }

    /// Counts one arrival at the barrier and returns the new count.
    pub fn arrive(&self) -> usize {
        self.arrivals.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn arrivals(&self) -> usize {
        self.arrivals.load(Ordering::SeqCst)
    }

    pub fn reset_arrivals(&self) {
        self.arrivals.store(0, Ordering::SeqCst);
    }

    pub fn is_attempt_active(&self) -> bool {
        self.attempt_active.load(Ordering::SeqCst)
    }

    /// Starts a checkpoint attempt and freezes the group membership until every
    /// member has departed. The returned guard is the member list of the attempt.
    pub fn begin_attempt(&self) -> Result<RwLockReadGuard<'_, Vec<Arc<Thread>>>> {
        let threads = self.threads.read();

        self.attempt_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::AttemptInProgress(self.pid))?;

        self.pending_departures
            .store(threads.len(), Ordering::SeqCst);

        Ok(threads)
    }

    /// Records that one member finished its participation. Returns true if it
    /// was the last one, which ends the attempt.
    pub fn depart(&self) -> bool {
        let last = self
            .pending_departures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok_and(|n| n == 1);

        if last {
            self.attempt_active.store(false, Ordering::SeqCst);
        }

        last
    }

    pub(crate) fn add_thread(&self, thread: Arc<Thread>) -> Result<()> {
        let mut threads = self.threads.write();

        if self.is_attempt_active() {
            return Err(Error::MembershipFrozen(self.pid));
        }

        threads.push(thread);
        Ok(())
    }

    pub(crate) fn remove_thread(&self, tid: Tid) -> Result<Arc<Thread>> {
        let mut threads = self.threads.write();

        if self.is_attempt_active() {
            return Err(Error::MembershipFrozen(self.pid));
        }

        if tid == self.leader.tid {
            return Err(Error::InvalidState);
        }

        let index = threads
            .iter()
            .position(|t| t.tid == tid)
            .ok_or(Error::NoSuchThread(tid))?;

        Ok(threads.remove(index))
    }
}

impl Display for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[P{:>6}]", self.pid)
    }
}
