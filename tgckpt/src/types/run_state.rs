use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Scheduling state of a thread as seen by the park/wake primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Running,
    Interruptible,
    Uninterruptible,
    Stopped,
    /// Parked at the checkpoint barrier, waiting for the group leader.
    Checkpointing,
}

bitflags! {
    /// Set of sleeping states a wake attempt may match.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateMask: u32 {
        const INTERRUPTIBLE = 1 << 0;
        const UNINTERRUPTIBLE = 1 << 1;
        const STOPPED = 1 << 2;
        const CHECKPOINTING = 1 << 3;

        const NORMAL = Self::INTERRUPTIBLE.bits() | Self::UNINTERRUPTIBLE.bits();
        /// Every ordinary sleep. Threads parked at the checkpoint barrier are
        /// only matched by `CHECKPOINTING`.
        const ALL = Self::NORMAL.bits() | Self::STOPPED.bits();
    }
}

impl RunState {
    pub fn mask(self) -> StateMask {
        match self {
            RunState::Running => StateMask::empty(),
            RunState::Interruptible => StateMask::INTERRUPTIBLE,
            RunState::Uninterruptible => StateMask::UNINTERRUPTIBLE,
            RunState::Stopped => StateMask::STOPPED,
            RunState::Checkpointing => StateMask::CHECKPOINTING,
        }
    }

    pub fn is_sleeping(self) -> bool {
        self != RunState::Running
    }

    /// Whether a wake attempt with `mask` would resume a thread in this state.
    pub fn matches(self, mask: StateMask) -> bool {
        self.is_sleeping() && mask.intersects(self.mask())
    }
}
