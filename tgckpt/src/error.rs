use nix::errno::Errno;

use crate::types::{
    process_id::{Pid, Tid},
    snapshot::CaptureStep,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("std::io error: `{0}`")]
    StdIO(#[from] std::io::Error),

    #[error("No such process: `{0}`")]
    NoSuchProcess(Pid),
    #[error("No such thread: `{0}`")]
    NoSuchThread(Tid),

    #[error("Failed to allocate snapshot store for {nr_tasks} threads")]
    AllocationFailure { nr_tasks: usize },
    #[error("Capture of {step} failed: {source}")]
    CaptureFailure {
        step: CaptureStep,
        #[source]
        source: Box<Error>,
    },
    #[error("Rendezvous of process {pid} timed out, stalled threads: {stalled:?}")]
    RendezvousTimeout { pid: Pid, stalled: Vec<Tid> },

    #[error("A checkpoint of process {0} is already in progress")]
    AttemptInProgress(Pid),
    #[error("Membership of process {0} is frozen by an in-flight checkpoint")]
    MembershipFrozen(Pid),
    #[error("Threads expected in checkpointing state could not be woken: {tids:?}")]
    WakeProtocolViolation { tids: Vec<Tid> },

    #[error("Snapshot producer error: `{0}`")]
    Producer(String),

    #[error("Invalid state")]
    InvalidState,
}

impl Error {
    /// Errno reported to the caller of the checkpoint syscall.
    pub fn errno(&self) -> Errno {
        match self {
            Error::NoSuchProcess(_) | Error::NoSuchThread(_) => Errno::ESRCH,
            Error::AllocationFailure { .. } => Errno::ENOMEM,
            Error::AttemptInProgress(_) | Error::MembershipFrozen(_) => Errno::EBUSY,
            Error::RendezvousTimeout { .. } => Errno::ETIMEDOUT,
            Error::StdIO(_) | Error::CaptureFailure { .. } | Error::Producer(_) => Errno::EIO,
            Error::WakeProtocolViolation { .. } | Error::InvalidState => Errno::EINVAL,
        }
    }

    pub fn capture(step: CaptureStep) -> impl FnOnce(Error) -> Error {
        move |source| Error::CaptureFailure {
            step,
            source: Box::new(source),
        }
    }

    pub fn is_capture_failure(&self) -> bool {
        matches!(self, Error::CaptureFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
