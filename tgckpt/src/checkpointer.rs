use derivative::Derivative;

use crate::{
    capture::{SnapshotProducer, SnapshotSink},
    orchestrator::Orchestrator,
    process::table::ProcessTable,
    sched::{Clock, ParkWake},
    statistics::counter::CheckpointStats,
    CheckpointOptions,
};

/// Synchronous checkpoint of thread groups.
///
/// [`Checkpointer::checkpoint_process`] arms a group; each member then joins
/// the barrier through [`Checkpointer::handle_kernel_entry`] the next time it
/// re-enters the kernel. With multiple producers or sinks, wrap them in a
/// single implementation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Checkpointer<'a> {
    pub(crate) table: &'a ProcessTable,
    #[derivative(Debug = "ignore")]
    pub(crate) sched: &'a dyn ParkWake,
    #[derivative(Debug = "ignore")]
    pub(crate) clock: &'a dyn Clock,
    #[derivative(Debug = "ignore")]
    pub(crate) producer: &'a dyn SnapshotProducer,
    #[derivative(Debug = "ignore")]
    pub(crate) sink: &'a dyn SnapshotSink,
    pub(crate) options: CheckpointOptions,
    pub(crate) stats: CheckpointStats,
}

impl<'a> Checkpointer<'a> {
    pub fn new(
        table: &'a ProcessTable,
        sched: &'a dyn ParkWake,
        clock: &'a dyn Clock,
        producer: &'a dyn SnapshotProducer,
        sink: &'a dyn SnapshotSink,
        options: CheckpointOptions,
    ) -> Self {
        Self {
            table,
            sched,
            clock,
            producer,
            sink,
            options,
            stats: CheckpointStats::new(),
        }
    }

    pub fn options(&self) -> &CheckpointOptions {
        &self.options
    }

    pub fn stats(&self) -> &CheckpointStats {
        &self.stats
    }

    pub fn table(&self) -> &'a ProcessTable {
        self.table
    }

    pub(crate) fn orchestrator(&self) -> Orchestrator<'a> {
        Orchestrator::new(
            self.producer,
            self.sched,
            self.options.paranoid_state_check,
        )
    }
}
