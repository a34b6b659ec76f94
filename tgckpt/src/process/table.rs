use std::{collections::HashMap, sync::Arc};

use log::debug;
use parking_lot::RwLock;

use crate::{
    error::{Error, Result},
    types::process_id::{Pid, Tid},
};

use super::{thread::Thread, Process};

/// Arena of thread groups and threads addressed by id.
#[derive(Debug, Default)]
pub struct ProcessTable {
    processes: RwLock<HashMap<Pid, Arc<Process>>>,
    threads: RwLock<HashMap<Tid, Arc<Thread>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_process(&self, pid: Pid, leader_tid: Tid) -> Result<Arc<Process>> {
        let mut processes = self.processes.write();
        let mut threads = self.threads.write();

        if processes.contains_key(&pid) || threads.contains_key(&leader_tid) {
            return Err(Error::InvalidState);
        }

        let process = Arc::new(Process::new(pid, leader_tid));
        threads.insert(leader_tid, process.leader().clone());
        processes.insert(pid, process.clone());

        debug!("{process} Created with leader {leader_tid}");

        Ok(process)
    }

    pub fn spawn_thread(&self, pid: Pid, tid: Tid) -> Result<Arc<Thread>> {
        let process = self.find_process(pid).ok_or(Error::NoSuchProcess(pid))?;
        let mut threads = self.threads.write();

        if threads.contains_key(&tid) {
            return Err(Error::InvalidState);
        }

        let thread = Arc::new(Thread::new(tid, pid, false));
        process.add_thread(thread.clone())?;
        threads.insert(tid, thread.clone());

        debug!("{process} Spawned thread {tid}");

        Ok(thread)
    }

    pub fn exit_thread(&self, tid: Tid) -> Result<()> {
        let thread = self.find_thread(tid).ok_or(Error::NoSuchThread(tid))?;
        let process = self
            .find_process(thread.pid)
            .ok_or(Error::NoSuchProcess(thread.pid))?;

        process.remove_thread(tid)?;
        self.threads.write().remove(&tid);

        debug!("{process} Thread {tid} exited");

        Ok(())
    }

    pub fn remove_process(&self, pid: Pid) -> Result<Arc<Process>> {
        let mut processes = self.processes.write();
        let process = processes.get(&pid).ok_or(Error::NoSuchProcess(pid))?;

        if process.is_attempt_active() {
            return Err(Error::MembershipFrozen(pid));
        }

        let mut threads = self.threads.write();
        for t in process.threads().iter() {
            threads.remove(&t.tid);
        }

        processes.remove(&pid).ok_or(Error::NoSuchProcess(pid))
    }

    pub fn find_process(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.read().get(&pid).cloned()
    }

    pub fn find_thread(&self, tid: Tid) -> Option<Arc<Thread>> {
        self.threads.read().get(&tid).cloned()
    }

    pub fn process_of(&self, tid: Tid) -> Option<Arc<Process>> {
        self.find_thread(tid).and_then(|t| self.find_process(t.pid))
    }
}
