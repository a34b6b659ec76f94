use std::sync::Arc;

use itertools::Itertools;
use log::{debug, error};
use scopeguard::defer;

use crate::{
    capture::SnapshotProducer,
    error::{Error, Result},
    process::{thread::Thread, Process},
    sched::ParkWake,
    types::{
        run_state::RunState,
        snapshot::{CaptureStep, ProcessSnapshot, SnapshotStore},
    },
};

/// Leader-side capture of a quiesced thread group.
pub struct Orchestrator<'a> {
    producer: &'a dyn SnapshotProducer,
    sched: &'a dyn ParkWake,
    paranoid_state_check: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        producer: &'a dyn SnapshotProducer,
        sched: &'a dyn ParkWake,
        paranoid_state_check: bool,
    ) -> Self {
        Self {
            producer,
            sched,
            paranoid_state_check,
        }
    }

    /// Captures `process`, whose members are `threads`. Runs with preemption
    /// of the leader disabled.
    pub fn checkpoint_process(
        &self,
        process: &Process,
        threads: &[Arc<Thread>],
    ) -> Result<ProcessSnapshot> {
        let leader = process.leader().tid;

        self.sched.preempt_disable(leader);
        defer! {
            self.sched.preempt_enable_no_resched(leader);
        }

        self.do_checkpoint_process(process, threads)
    }

    fn do_checkpoint_process(
        &self,
        process: &Process,
        threads: &[Arc<Thread>],
    ) -> Result<ProcessSnapshot> {
        if self.paranoid_state_check {
            self.paranoid_state_check(process, threads);
        }

        let mut store = SnapshotStore::allocate(process.pid, threads.len())?;

        // Thread-group shared state first
        let files = self
            .producer
            .save_open_files(process)
            .map_err(Error::capture(CaptureStep::OpenFiles))?;

        let signals = match self.producer.save_signals(process) {
            Ok(signals) => signals,
            Err(e) => {
                self.producer.revert_open_files(process, &files);
                return Err(Error::capture(CaptureStep::Signals)(e));
            }
        };

        store.set_files(files);
        store.set_signals(signals);

        // Then per-thread state
        let ordered = threads.iter().sorted_by_key(|t| t.tid).collect_vec();

        for (i, thread) in ordered.iter().enumerate() {
            let result = self
                .producer
                .save_thread_context(thread)
                .and_then(|context| store.push_task(thread.tid, context));

            if let Err(e) = result {
                error!(
                    "{process} Failed to capture thread {}, reverting {} captured threads",
                    thread.tid, i
                );
                self.revert(process, &ordered[..i], &store);
                return Err(Error::capture(CaptureStep::ThreadContext(thread.tid))(e));
            }
        }

        debug!(
            "{process} Captured {} files, {} threads",
            store.files().map_or(0, |f| f.files.len()),
            store.nr_tasks()
        );

        store.into_snapshot()
    }

    fn revert(&self, process: &Process, captured: &[&Arc<Thread>], store: &SnapshotStore) {
        for (thread, task) in captured.iter().zip(store.tasks()).rev() {
            self.producer.revert_thread_context(thread, &task.context);
        }

        if let Some(signals) = store.signals() {
            self.producer.revert_signals(process, signals);
        }

        if let Some(files) = store.files() {
            self.producer.revert_open_files(process, files);
        }
    }

    fn paranoid_state_check(&self, process: &Process, threads: &[Arc<Thread>]) {
        for t in threads.iter().filter(|t| !t.is_leader()) {
            let state = self.sched.run_state(t.tid);

            if state != Some(RunState::Checkpointing) {
                error!(
                    "BUG: {process} {t} state: {state:?}, expected {}",
                    RunState::Checkpointing
                );
            }
        }
    }
}
