pub mod barrier;
pub mod capture;
pub mod checkpointer;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod sched;
pub mod sim;
pub mod statistics;
pub mod types;

use std::time::Duration;

use cfg_if::cfg_if;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

pub use crate::barrier::RendezvousOutcome;
pub use crate::checkpointer::Checkpointer;
pub use crate::dispatch::sys_checkpoint_process;

cfg_if! {
    if #[cfg(feature = "checkpoint_debug")] {
        pub const DEFAULT_BARRIER_TIMEOUT: Duration = Duration::from_secs(5);
        const DEFAULT_PARANOID_STATE_CHECK: bool = true;
    } else {
        pub const DEFAULT_BARRIER_TIMEOUT: Duration = Duration::from_millis(500);
        const DEFAULT_PARANOID_STATE_CHECK: bool = false;
    }
}

pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(default, pattern = "owned")]
#[serde(default)]
pub struct CheckpointOptions {
    /// Timeout for waiting all threads reach the barrier
    pub barrier_timeout: Duration,

    /// Timeout for transferring a snapshot downstream. Carried for the
    /// consumer, not enforced by the barrier.
    pub job_timeout: Duration,

    /// Backoff between two polls of the arrival counter. Zero yields the CPU
    /// instead of sleeping.
    pub poll_interval: Duration,

    /// Check that every member is parked before capturing
    pub paranoid_state_check: bool,
}

impl Default for CheckpointOptions {
    fn default() -> Self {
        Self {
            barrier_timeout: DEFAULT_BARRIER_TIMEOUT,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            poll_interval: Duration::from_micros(50),
            paranoid_state_check: DEFAULT_PARANOID_STATE_CHECK,
        }
    }
}

impl CheckpointOptionsBuilder {
    pub fn test_default() -> Self {
        Self::default()
            .barrier_timeout(Duration::from_secs(5))
            .poll_interval(Duration::ZERO)
            .paranoid_state_check(true)
    }
}
