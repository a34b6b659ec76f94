use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use parking_lot::Mutex;

use crate::{
    capture::{SnapshotProducer, SnapshotSink},
    error::{Error, Result},
    process::{thread::Thread, Process},
    types::{
        process_id::{Pid, Tid},
        snapshot::{
            CaptureStep, OpenFile, OpenFilesFragment, ProcessSnapshot, Registers,
            SignalDisposition, SignalFragment, ThreadContext,
        },
    },
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProducerProbes {
    pub saves: Vec<CaptureStep>,
    pub reverts: Vec<CaptureStep>,
    /// Name of the OS thread that ran each open-files capture.
    pub capturing_threads: Vec<Option<String>>,
}

impl ProducerProbes {
    pub fn saves_of(&self, step: CaptureStep) -> usize {
        self.saves.iter().filter(|&&s| s == step).count()
    }

    pub fn reverts_of(&self, step: CaptureStep) -> usize {
        self.reverts.iter().filter(|&&s| s == step).count()
    }
}

/// Snapshot producer over canned per-process and per-thread state, with
/// fault injection at any capture step.
#[derive(Debug, Default)]
pub struct InMemoryProducer {
    files: Mutex<HashMap<Pid, OpenFilesFragment>>,
    signals: Mutex<HashMap<Pid, SignalFragment>>,
    registers: Mutex<HashMap<Tid, Registers>>,
    faults: Mutex<HashSet<CaptureStep>>,
    probes: Mutex<ProducerProbes>,
}

impl InMemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_open_files(&self, pid: Pid, files: OpenFilesFragment) {
        self.files.lock().insert(pid, files);
    }

    pub fn set_signals(&self, pid: Pid, signals: SignalFragment) {
        self.signals.lock().insert(pid, signals);
    }

    pub fn set_registers(&self, tid: Tid, registers: Registers) {
        self.registers.lock().insert(tid, registers);
    }

    pub fn inject_fault(&self, step: CaptureStep) {
        self.faults.lock().insert(step);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    pub fn probes(&self) -> ProducerProbes {
        self.probes.lock().clone()
    }

    fn check_fault(&self, step: CaptureStep) -> Result<()> {
        if self.faults.lock().contains(&step) {
            debug!("Injected fault in {step}");
            return Err(Error::Producer(format!("injected fault in {step}")));
        }
        Ok(())
    }

    fn default_files() -> OpenFilesFragment {
        let files = ["/dev/stdin", "/dev/stdout", "/dev/stderr"]
            .into_iter()
            .enumerate()
            .map(|(fd, path)| OpenFile {
                fd: fd as u32,
                path: path.to_owned(),
                flags: if fd == 0 { 0 } else { 1 },
                offset: 0,
            })
            .collect();

        OpenFilesFragment { files }
    }

    fn default_signals() -> SignalFragment {
        SignalFragment {
            pending: 0,
            blocked: 0,
            actions: BTreeMap::from([(13, SignalDisposition::Ignore)]),
        }
    }

    fn default_registers(tid: Tid) -> Registers {
        Registers {
            ip: 0x40_0000 + u64::from(tid.0) * 0x10,
            sp: 0x7fff_0000_0000 - u64::from(tid.0) * 0x1000,
            ..Default::default()
        }
    }
}

impl SnapshotProducer for InMemoryProducer {
    fn save_open_files(&self, process: &Process) -> Result<OpenFilesFragment> {
        let step = CaptureStep::OpenFiles;
        {
            let mut probes = self.probes.lock();
            probes.saves.push(step);
            probes
                .capturing_threads
                .push(std::thread::current().name().map(str::to_owned));
        }
        self.check_fault(step)?;

        Ok(self
            .files
            .lock()
            .get(&process.pid)
            .cloned()
            .unwrap_or_else(Self::default_files))
    }

    fn revert_open_files(&self, _process: &Process, _fragment: &OpenFilesFragment) {
        self.probes.lock().reverts.push(CaptureStep::OpenFiles);
    }

    fn save_signals(&self, process: &Process) -> Result<SignalFragment> {
        self.probes.lock().saves.push(CaptureStep::Signals);
        self.check_fault(CaptureStep::Signals)?;

        Ok(self
            .signals
            .lock()
            .get(&process.pid)
            .cloned()
            .unwrap_or_else(Self::default_signals))
    }

    fn revert_signals(&self, _process: &Process, _fragment: &SignalFragment) {
        self.probes.lock().reverts.push(CaptureStep::Signals);
    }

    fn save_thread_context(&self, thread: &Thread) -> Result<ThreadContext> {
        let step = CaptureStep::ThreadContext(thread.tid);
        self.probes.lock().saves.push(step);
        self.check_fault(step)?;

        let registers = self
            .registers
            .lock()
            .get(&thread.tid)
            .cloned()
            .unwrap_or_else(|| Self::default_registers(thread.tid));

        Ok(ThreadContext { registers })
    }

    fn revert_thread_context(&self, thread: &Thread, _context: &ThreadContext) {
        self.probes
            .lock()
            .reverts
            .push(CaptureStep::ThreadContext(thread.tid));
    }
}

#[derive(Debug, Default)]
pub struct CollectingSink {
    snapshots: Mutex<Vec<ProcessSnapshot>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<ProcessSnapshot> {
        self.snapshots.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }
}

impl SnapshotSink for CollectingSink {
    fn consume(&self, snapshot: ProcessSnapshot) {
        self.snapshots.lock().push(snapshot);
    }
}
