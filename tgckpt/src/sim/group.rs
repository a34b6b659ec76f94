use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use log::{debug, info};
use parking_lot::Mutex;
use scopeguard::defer;
use strum::{Display, EnumString};

use crate::{
    barrier::RendezvousOutcome,
    checkpointer::Checkpointer,
    error::{Error, Result},
    process::table::ProcessTable,
    sched::ParkWake,
    types::{
        process_id::{Pid, Tid},
        run_state::{RunState, StateMask},
    },
};

use super::scheduler::{ParkingScheduler, SchedProbes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SimBehavior {
    /// Re-enters the kernel continuously.
    #[default]
    Busy,
    /// Sleeps interruptibly and enters the kernel only after being woken.
    Sleeper,
    /// Never re-enters the kernel while the attempt runs.
    Stalled,
}

#[derive(Debug, Default)]
pub struct SimReport {
    pub dispatch: Option<String>,
    pub outcomes: BTreeMap<Tid, Vec<RendezvousOutcome>>,
    pub errors: BTreeMap<Tid, Vec<String>>,
    /// Threads whose run state differed across a rendezvous.
    pub run_state_mismatches: Vec<Tid>,
    /// Whether the attempt ended before teardown.
    pub settled: bool,
    /// Scheduler probes taken before teardown.
    pub sched_probes: SchedProbes,
}

impl SimReport {
    pub fn outcomes_of(&self, tid: Tid) -> &[RendezvousOutcome] {
        self.outcomes.get(&tid).map_or(&[], Vec::as_slice)
    }

    pub fn count(&self, pred: impl Fn(&RendezvousOutcome) -> bool) -> usize {
        self.outcomes.values().flatten().filter(|o| pred(o)).count()
    }

    pub fn nr_errors(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }
}

/// A simulated thread group. Member `i` runs `behaviors[i]`; member 0 is the
/// group leader.
#[derive(Debug)]
pub struct SimGroup {
    pub pid: Pid,
    pub tids: Vec<Tid>,
    behaviors: Vec<SimBehavior>,
}

impl SimGroup {
    pub fn create(
        table: &ProcessTable,
        sched: &ParkingScheduler,
        pid: Pid,
        behaviors: Vec<SimBehavior>,
    ) -> Result<Self> {
        if behaviors.is_empty() {
            return Err(Error::InvalidState);
        }

        let tids = (0..behaviors.len() as u32)
            .map(|i| Tid(pid.0 + i))
            .collect::<Vec<_>>();

        table.create_process(pid, tids[0])?;
        for &tid in &tids[1..] {
            table.spawn_thread(pid, tid)?;
        }

        for &tid in &tids {
            sched.register(tid);
        }

        Ok(Self {
            pid,
            tids,
            behaviors,
        })
    }

    pub fn leader(&self) -> Tid {
        self.tids[0]
    }

    /// Starts every member, triggers one checkpoint, waits up to
    /// `settle_timeout` for it to end and tears the group down.
    pub fn run(
        &self,
        checkpointer: &Checkpointer,
        sched: &ParkingScheduler,
        settle_timeout: Duration,
    ) -> Result<SimReport> {
        let process = checkpointer
            .table()
            .find_process(self.pid)
            .ok_or(Error::NoSuchProcess(self.pid))?;

        let stop = AtomicBool::new(false);
        let started = AtomicUsize::new(0);
        let finished = AtomicUsize::new(0);
        let report = Mutex::new(SimReport::default());

        std::thread::scope(|s| -> Result<()> {
            for (&tid, &behavior) in self.tids.iter().zip(&self.behaviors) {
                let (stop, started, finished, report) = (&stop, &started, &finished, &report);

                std::thread::Builder::new()
                    .name(format!("tid-{tid}"))
                    .spawn_scoped(s, move || {
                        defer! {
                            finished.fetch_add(1, Ordering::SeqCst);
                        }
                        started.fetch_add(1, Ordering::SeqCst);
                        Self::thread_main(checkpointer, sched, tid, behavior, stop, report);
                    })?;
            }

            // Sleepers must be parked before the dispatcher looks for them
            while started.load(Ordering::SeqCst) < self.tids.len() || !self.sleepers_parked(sched) {
                std::thread::sleep(Duration::from_millis(1));
            }

            let dispatched = checkpointer.checkpoint_process(self.pid);
            info!("[P{:>6}] Dispatched: {dispatched:?}", self.pid);

            if dispatched.is_ok() {
                let deadline = Instant::now() + settle_timeout;
                while process.is_attempt_active() && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }

            {
                let mut report = report.lock();
                report.dispatch = dispatched.err().map(|e| e.to_string());
                report.settled = !process.is_attempt_active();
                report.sched_probes = sched.probes();
            }

            stop.store(true, Ordering::SeqCst);

            while finished.load(Ordering::SeqCst) < self.tids.len() {
                if report.lock().settled {
                    for &tid in &self.tids {
                        sched.wake_matching(tid, StateMask::ALL);
                    }
                } else {
                    sched.abort_all(&self.tids);
                }
                std::thread::sleep(Duration::from_millis(1));
            }

            Ok(())
        })?;

        Ok(report.into_inner())
    }

    fn sleepers_parked(&self, sched: &ParkingScheduler) -> bool {
        self.tids
            .iter()
            .zip(&self.behaviors)
            .filter(|(_, &b)| b == SimBehavior::Sleeper)
            .all(|(&tid, _)| sched.run_state(tid) == Some(RunState::Interruptible))
    }

    fn thread_main(
        checkpointer: &Checkpointer,
        sched: &ParkingScheduler,
        tid: Tid,
        behavior: SimBehavior,
        stop: &AtomicBool,
        report: &Mutex<SimReport>,
    ) {
        debug!("[{tid}] Running as {behavior}");

        loop {
            match behavior {
                SimBehavior::Busy => std::thread::sleep(Duration::from_micros(50)),
                SimBehavior::Sleeper => sched.park_current(tid, RunState::Interruptible),
                SimBehavior::Stalled => {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }

            if stop.load(Ordering::SeqCst) {
                break;
            }

            if behavior == SimBehavior::Stalled {
                continue;
            }

            let before = sched.run_state(tid);
            let result = checkpointer.handle_kernel_entry(tid);
            let after = sched.run_state(tid);

            let mut report = report.lock();
            match result {
                Ok(Some(outcome)) => {
                    if before != after {
                        report.run_state_mismatches.push(tid);
                    }
                    report.outcomes.entry(tid).or_default().push(outcome);
                }
                Ok(None) => (),
                Err(e) => report.errors.entry(tid).or_default().push(e.to_string()),
            }
        }
    }
}
