use strum::Display;

use crate::error::{Error, Result};

/// Per-thread participation in a checkpoint attempt.
///
/// Non-leaders go `Normal -> CheckpointRequested -> Parked -> Normal`, the
/// group leader goes `Normal -> CheckpointRequested -> Capturing -> Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum CheckpointState {
    #[default]
    Normal,
    CheckpointRequested,
    Parked,
    Capturing,
}

impl CheckpointState {
    /// Arms the thread. Requesting an already armed or participating thread
    /// is a no-op.
    pub fn request(&mut self) {
        if *self == CheckpointState::Normal {
            *self = CheckpointState::CheckpointRequested;
        }
    }

    pub fn park(&mut self) -> Result<()> {
        self.transition(CheckpointState::CheckpointRequested, CheckpointState::Parked)
    }

    pub fn begin_capture(&mut self) -> Result<()> {
        self.transition(
            CheckpointState::CheckpointRequested,
            CheckpointState::Capturing,
        )
    }

    /// Returns the thread to normal execution, from any state.
    pub fn release(&mut self) -> CheckpointState {
        std::mem::take(self)
    }

    pub fn is_requested(&self) -> bool {
        *self == CheckpointState::CheckpointRequested
    }

    pub fn has_arrived(&self) -> bool {
        matches!(self, CheckpointState::Parked | CheckpointState::Capturing)
    }

    fn transition(&mut self, from: CheckpointState, to: CheckpointState) -> Result<()> {
        if *self != from {
            return Err(Error::InvalidState);
        }
        *self = to;
        Ok(())
    }
}
