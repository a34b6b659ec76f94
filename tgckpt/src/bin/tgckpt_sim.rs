use std::{fs::OpenOptions, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use log::info;

use tgckpt::{
    error::{Error, Result},
    process::table::ProcessTable,
    sim::{CollectingSink, InMemoryProducer, ParkingScheduler, SimBehavior, SimGroup},
    statistics,
    types::{
        process_id::{Pid, Tid},
        snapshot::CaptureStep,
    },
    CheckpointOptions, Checkpointer, RendezvousOutcome,
};

/// Capture step to fail, as given on the command line. Threads are named by
/// their index in the group.
#[derive(Debug, Clone, Copy)]
enum FailAt {
    OpenFiles,
    Signals,
    Thread(u32),
}

impl FromStr for FailAt {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open_files" => Ok(FailAt::OpenFiles),
            "signals" => Ok(FailAt::Signals),
            _ => s
                .strip_prefix("thread:")
                .and_then(|idx| idx.parse().ok())
                .map(FailAt::Thread)
                .ok_or_else(|| format!("invalid capture step `{s}`")),
        }
    }
}

impl FailAt {
    fn step(self, pid: Pid) -> CaptureStep {
        match self {
            FailAt::OpenFiles => CaptureStep::OpenFiles,
            FailAt::Signals => CaptureStep::Signals,
            FailAt::Thread(idx) => CaptureStep::ThreadContext(Tid(pid.0 + idx)),
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct CliArgs {
    /// Number of threads in the group, including the leader
    #[arg(short, long, default_value_t = 4)]
    threads: u32,

    /// Index of a thread that never re-enters the kernel
    #[arg(long)]
    stall: Option<u32>,

    /// Index of a thread that sleeps interruptibly until woken
    #[arg(long, use_value_delimiter = true)]
    sleepers: Vec<u32>,

    /// Capture step to fail: open_files, signals or thread:<idx>
    #[arg(long)]
    fail: Option<FailAt>,

    /// Pid of the simulated process
    #[arg(long, default_value_t = 1000)]
    pid: u32,

    /// Barrier timeout in milliseconds
    #[arg(long)]
    barrier_timeout_ms: Option<u64>,

    /// Backoff between two polls of the barrier, in microseconds
    #[arg(long)]
    poll_interval_us: Option<u64>,

    /// Config file to use
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output filename
    #[arg(long)]
    log_output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = CliArgs::parse();

    let mut env_logger_builder = pretty_env_logger::formatted_timed_builder();

    env_logger_builder.parse_default_env();

    if let Some(log_output) = cli.log_output {
        let log_file = Box::new(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(log_output)?,
        );

        env_logger_builder.target(pretty_env_logger::env_logger::Target::Pipe(log_file));

        log_panics::init();
    }

    env_logger_builder.init();

    let mut options: CheckpointOptions = match cli.config {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            serde_yaml::from_reader(file).expect("Failed to parse config file")
        }
        None => CheckpointOptions::default(),
    };

    if let Some(ms) = cli.barrier_timeout_ms {
        options.barrier_timeout = Duration::from_millis(ms);
    }

    if let Some(us) = cli.poll_interval_us {
        options.poll_interval = Duration::from_micros(us);
    }

    let pid = Pid(cli.pid);
    let behaviors = (0..cli.threads.max(1))
        .map(|idx| {
            if cli.stall == Some(idx) {
                SimBehavior::Stalled
            } else if cli.sleepers.contains(&idx) {
                SimBehavior::Sleeper
            } else {
                SimBehavior::Busy
            }
        })
        .collect::<Vec<_>>();

    let table = ProcessTable::new();
    let sched = ParkingScheduler::new();
    let producer = InMemoryProducer::new();
    let sink = CollectingSink::new();

    if let Some(fail) = cli.fail {
        producer.inject_fault(fail.step(pid));
    }

    let settle_timeout = options.barrier_timeout * 2 + Duration::from_secs(1);
    let checkpointer = Checkpointer::new(&table, &sched, &sched, &producer, &sink, options);

    let group = SimGroup::create(&table, &sched, pid, behaviors)?;
    let report = group.run(&checkpointer, &sched, settle_timeout)?;

    for (tid, outcomes) in &report.outcomes {
        info!("[{tid}] Outcomes: {outcomes:?}");
    }
    for (tid, errors) in &report.errors {
        info!("[{tid}] Errors: {errors:?}");
    }

    for snapshot in sink.snapshots() {
        println!(
            "snapshot pid={} nr_tasks={} files={} signal_actions={}",
            snapshot.pid,
            snapshot.nr_tasks,
            snapshot.files.files.len(),
            snapshot.signals.actions.len()
        );
        for task in &snapshot.tasks {
            println!(
                "  tid={} ip={:#x} sp={:#x}",
                task.tid, task.context.registers.ip, task.context.registers.sp
            );
        }
    }

    println!("{}", statistics::as_text(checkpointer.stats()));

    let stalled = report.outcomes_of(group.leader()).iter().find_map(|o| match o {
        RendezvousOutcome::TimedOut { stalled } => Some(stalled.clone()),
        _ => None,
    });

    if let Some(stalled) = stalled {
        return Err(Error::RendezvousTimeout { pid, stalled });
    }

    Ok(())
}
