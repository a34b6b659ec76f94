use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use crate::statistics_list;

use super::{StatValue, StatisticsProvider};

#[derive(Debug, Default)]
pub struct CheckpointStats {
    attempts: AtomicU64,
    captures: AtomicU64,
    barrier_timeouts: AtomicU64,
    capture_failures: AtomicU64,
    wake_violations: AtomicU64,
    last_barrier_wait_us: AtomicU64,
}

impl CheckpointStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_capture(&self, barrier_wait: Duration) {
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.last_barrier_wait_us
            .store(barrier_wait.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn record_barrier_timeout(&self) {
        self.barrier_timeouts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_capture_failure(&self) {
        self.capture_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_wake_violation(&self) {
        self.wake_violations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn barrier_timeouts(&self) -> u64 {
        self.barrier_timeouts.load(Ordering::SeqCst)
    }

    pub fn capture_failures(&self) -> u64 {
        self.capture_failures.load(Ordering::SeqCst)
    }

    pub fn wake_violations(&self) -> u64 {
        self.wake_violations.load(Ordering::SeqCst)
    }

    pub fn last_barrier_wait(&self) -> Duration {
        Duration::from_micros(self.last_barrier_wait_us.load(Ordering::SeqCst))
    }
}

impl StatisticsProvider for CheckpointStats {
    fn class_name(&self) -> &'static str {
        "checkpoint"
    }

    fn statistics(&self) -> Vec<(&'static str, StatValue)> {
        statistics_list!(
            attempts = self.attempts(),
            captures = self.captures(),
            barrier_timeouts = self.barrier_timeouts(),
            capture_failures = self.capture_failures(),
            wake_violations = self.wake_violations(),
            last_barrier_wait = self.last_barrier_wait()
        )
    }
}
