use std::sync::Arc;

use itertools::Itertools;
use log::{debug, error, info, warn};

use crate::{
    checkpointer::Checkpointer,
    error::{Error, Result},
    process::{thread::Thread, Process},
    types::{
        process_id::Tid,
        run_state::{RunState, StateMask},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendezvousOutcome {
    /// A non-leader resumed after the leader finished the attempt.
    Released,
    /// The leader captured the group and handed the snapshot downstream.
    Captured,
    /// The leader gave up waiting. Nothing was captured.
    TimedOut { stalled: Vec<Tid> },
    /// The attempt was aborted before this thread reached the barrier.
    Cancelled,
}

impl<'a> Checkpointer<'a> {
    /// Kernel re-entry hook (trap or syscall boundary) of thread `tid`. Joins
    /// the barrier if a checkpoint is pending.
    pub fn handle_kernel_entry(&self, tid: Tid) -> Result<Option<RendezvousOutcome>> {
        let thread = self
            .table
            .find_thread(tid)
            .ok_or(Error::NoSuchThread(tid))?;

        if !thread.need_checkpoint() {
            return Ok(None);
        }

        self.checkpoint_thread(&thread).map(Some)
    }

    pub fn checkpoint_thread(&self, thread: &Thread) -> Result<RendezvousOutcome> {
        let process = self
            .table
            .find_process(thread.pid)
            .ok_or(Error::NoSuchProcess(thread.pid))?;

        debug!("{thread} Entering checkpoint barrier");

        if thread.is_leader() {
            self.leader_rendezvous(&process, thread)
        } else {
            self.member_rendezvous(&process, thread)
        }
    }

    fn member_rendezvous(&self, process: &Process, thread: &Thread) -> Result<RendezvousOutcome> {
        let saved_state = self.sched.run_state(thread.tid).unwrap_or_default();

        {
            let mut state = thread.lock_state();

            if !state.is_requested() {
                debug!("{thread} Attempt aborted before arrival");
                return Ok(RendezvousOutcome::Cancelled);
            }

            state.park()?;
            self.sched
                .set_current_state(thread.tid, RunState::Checkpointing);
            process.arrive();
        }

        self.sched.schedule(thread.tid);

        // Restore saved task state before returning
        self.sched.set_current_state(thread.tid, saved_state);

        {
            let mut state = thread.lock_state();
            state.release();
            thread.clear_need_checkpoint();
        }
        process.depart();

        Ok(RendezvousOutcome::Released)
    }

    fn leader_rendezvous(&self, process: &Process, leader: &Thread) -> Result<RendezvousOutcome> {
        leader.lock_state().begin_capture()?;
        process.arrive();

        // Membership is frozen until every member departs.
        let members = process.threads().clone();
        let expected = members.len();

        let start = self.clock.now();
        let deadline = start + self.options.barrier_timeout;

        let result = loop {
            if process.arrivals() == expected {
                break self.complete(process, &members, start);
            }

            // Abort whole checkpointing, and wake all threads
            if self.clock.now() > deadline {
                break Ok(self.barrier_timeout_wakeup(process));
            }

            self.backoff();
        };

        // Reset barrier info for next run
        process.reset_arrivals();

        {
            let mut state = leader.lock_state();
            state.release();
            leader.clear_need_checkpoint();
        }
        process.depart();

        result
    }

    fn complete(
        &self,
        process: &Process,
        members: &[Arc<Thread>],
        start: std::time::Duration,
    ) -> Result<RendezvousOutcome> {
        let elapsed = self.clock.now().saturating_sub(start);
        debug!(
            "{process} Barrier elapsed {}.{:03} seconds",
            elapsed.as_secs(),
            elapsed.subsec_millis()
        );

        let capture = self.orchestrator().checkpoint_process(process, members);

        // Wake all threads sleeping in Checkpointing
        let wake = self.wake_up_thread_group(process);

        let snapshot = match capture {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.record_capture_failure();
                error!("{process} Checkpoint failed: {e}");

                // The capture error takes precedence, the violation is
                // already logged and counted
                if let Err(violation) = wake {
                    error!("{process} Also failed to release the group: {violation}");
                }
                return Err(e);
            }
        };

        self.stats.record_capture(elapsed);
        info!(
            "{process} Checkpointed {} threads in {:?}",
            snapshot.nr_tasks, elapsed
        );
        self.sink.consume(snapshot);

        wake.map(|_| RendezvousOutcome::Captured)
    }

    fn wake_up_thread_group(&self, process: &Process) -> Result<()> {
        let threads = process.threads();

        let failed = threads
            .iter()
            // group leader itself is running this
            .filter(|t| !t.is_leader())
            .filter(|t| !self.sched.wake_matching(t.tid, StateMask::CHECKPOINTING))
            .map(|t| {
                error!(
                    "Fail to wake: {t} state: {:?}",
                    self.sched.run_state(t.tid)
                );
                t.tid
            })
            .collect_vec();

        if failed.is_empty() {
            return Ok(());
        }

        self.stats.record_wake_violation();
        Err(Error::WakeProtocolViolation { tids: failed })
    }

    fn barrier_timeout_wakeup(&self, process: &Process) -> RendezvousOutcome {
        // Wait until the dispatcher has marked every thread
        let _arming = process.lock_arming();
        let threads = process.threads();

        warn!(
            "{process} Abort due to barrier timeout. Leader: {}, nr_threads: {}, arrived: {}, barrier_timeout: {:?}",
            process.leader().tid,
            threads.len(),
            process.arrivals(),
            self.options.barrier_timeout
        );

        let mut stalled = Vec::new();

        for (i, t) in threads.iter().enumerate() {
            let mut state = t.lock_state();
            let arrived = state.has_arrived();

            warn!(
                "    Thread {i}: tid={}, state={:?}, checkpoint={}, need_checkpoint={}, arrived={arrived}",
                t.tid,
                self.sched.run_state(t.tid),
                *state,
                t.need_checkpoint()
            );

            if !arrived {
                state.release();
                t.clear_need_checkpoint();
                drop(state);
                process.depart();
                stalled.push(t.tid);
            }
        }

        self.sched
            .abort_all(&threads.iter().map(|t| t.tid).collect_vec());
        self.stats.record_barrier_timeout();

        RendezvousOutcome::TimedOut { stalled }
    }

    fn backoff(&self) {
        if self.options.poll_interval.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.options.poll_interval);
        }
    }
}
