use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::process_id::{Pid, Tid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureStep {
    OpenFiles,
    Signals,
    ThreadContext(Tid),
}

impl Display for CaptureStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureStep::OpenFiles => write!(f, "open files"),
            CaptureStep::Signals => write!(f, "signals"),
            CaptureStep::ThreadContext(tid) => write!(f, "thread context of {tid}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFile {
    pub fd: u32,
    pub path: String,
    pub flags: u32,
    pub offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFilesFragment {
    pub files: Vec<OpenFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDisposition {
    Default,
    Ignore,
    Handler { address: u64, flags: u64, mask: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalFragment {
    pub pending: u64,
    pub blocked: u64,
    /// Keyed by signal number. Signals absent here use the default action.
    pub actions: BTreeMap<u32, SignalDisposition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub gprs: [u64; 16],
    pub ip: u64,
    pub sp: u64,
    pub flags: u64,
    pub tls: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadContext {
    pub registers: Registers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadFragment {
    pub tid: Tid,
    pub context: ThreadContext,
}

/// Complete captured state of a thread group at one checkpoint instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub nr_tasks: usize,
    pub files: OpenFilesFragment,
    pub signals: SignalFragment,
    pub tasks: Vec<ThreadFragment>,
}

impl ProcessSnapshot {
    pub fn task(&self, tid: Tid) -> Option<&ThreadFragment> {
        self.tasks.iter().find(|t| t.tid == tid)
    }
}

/// Buffer assembled by the leader while the group is quiesced.
#[derive(Debug)]
pub struct SnapshotStore {
    pid: Pid,
    nr_tasks: usize,
    files: Option<OpenFilesFragment>,
    signals: Option<SignalFragment>,
    tasks: Vec<ThreadFragment>,
}

impl SnapshotStore {
    pub fn allocate(pid: Pid, nr_tasks: usize) -> Result<Self> {
        let mut tasks = Vec::new();
        tasks
            .try_reserve_exact(nr_tasks)
            .map_err(|_| Error::AllocationFailure { nr_tasks })?;

        Ok(Self {
            pid,
            nr_tasks,
            files: None,
            signals: None,
            tasks,
        })
    }

    pub fn nr_tasks(&self) -> usize {
        self.nr_tasks
    }

    pub fn set_files(&mut self, files: OpenFilesFragment) {
        self.files = Some(files);
    }

    pub fn set_signals(&mut self, signals: SignalFragment) {
        self.signals = Some(signals);
    }

    pub fn push_task(&mut self, tid: Tid, context: ThreadContext) -> Result<()> {
        if self.tasks.len() == self.nr_tasks {
            return Err(Error::InvalidState);
        }
        self.tasks.push(ThreadFragment { tid, context });
        Ok(())
    }

    pub fn files(&self) -> Option<&OpenFilesFragment> {
        self.files.as_ref()
    }

    pub fn signals(&self) -> Option<&SignalFragment> {
        self.signals.as_ref()
    }

    pub fn tasks(&self) -> &[ThreadFragment] {
        &self.tasks
    }

    /// Seals the store. Every fragment must be present.
    pub fn into_snapshot(self) -> Result<ProcessSnapshot> {
        if self.tasks.len() != self.nr_tasks {
            return Err(Error::InvalidState);
        }

        Ok(ProcessSnapshot {
            pid: self.pid,
            nr_tasks: self.nr_tasks,
            files: self.files.ok_or(Error::InvalidState)?,
            signals: self.signals.ok_or(Error::InvalidState)?,
            tasks: self.tasks,
        })
    }
}
