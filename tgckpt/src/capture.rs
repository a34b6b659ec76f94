use crate::{
    error::Result,
    process::{thread::Thread, Process},
    types::snapshot::{OpenFilesFragment, ProcessSnapshot, SignalFragment, ThreadContext},
};

/// Capture collaborators consulted by the group leader while the group is
/// quiesced.
pub trait SnapshotProducer: Sync {
    fn save_open_files(&self, process: &Process) -> Result<OpenFilesFragment>;

    fn revert_open_files(&self, process: &Process, fragment: &OpenFilesFragment);

    fn save_signals(&self, process: &Process) -> Result<SignalFragment>;

    fn revert_signals(&self, _process: &Process, _fragment: &SignalFragment) {}

    fn save_thread_context(&self, thread: &Thread) -> Result<ThreadContext>;

    fn revert_thread_context(&self, _thread: &Thread, _context: &ThreadContext) {}
}

/// Downstream consumer of completed snapshots (serialization, transfer).
pub trait SnapshotSink: Sync {
    fn consume(&self, snapshot: ProcessSnapshot);
}
