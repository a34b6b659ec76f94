use log::{debug, trace};

use crate::{
    checkpointer::Checkpointer,
    error::{Error, Result},
    types::{process_id::Pid, run_state::StateMask},
};

impl<'a> Checkpointer<'a> {
    /// Checkpoint the thread group `pid`.
    ///
    /// This function is lightweight: it sets the pending flag on every member
    /// and kicks each one so it re-enters the kernel, that is all. The barrier
    /// and the capture happen later in [`Checkpointer::handle_kernel_entry`],
    /// and their outcome is not reported to the caller.
    pub fn checkpoint_process(&self, pid: Pid) -> Result<()> {
        let process = self
            .table
            .find_process(pid)
            .ok_or(Error::NoSuchProcess(pid))?;

        let _arming = process.lock_arming();
        let threads = process.begin_attempt()?;
        self.stats.record_attempt();

        for t in threads.iter() {
            debug!("Set NEED_CHECKPOINT for {t}");
            t.request_checkpoint();

            if !self.sched.wake_matching(t.tid, StateMask::ALL) {
                self.sched.force_reschedule(t.tid);
            }
        }

        Ok(())
    }
}

/// Syscall-style entry: returns 0 on success or a negated errno.
pub fn sys_checkpoint_process(checkpointer: &Checkpointer, pid: u32) -> i64 {
    trace!("checkpoint_process(pid: {pid})");

    let ret = match checkpointer.checkpoint_process(Pid(pid)) {
        Ok(()) => 0,
        Err(e) => {
            debug!("checkpoint_process(pid: {pid}) failed: {e}");
            -(e.errno() as i64)
        }
    };

    trace!("checkpoint_process(pid: {pid}) = {ret}");
    ret
}
