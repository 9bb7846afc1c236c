use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Host execution-limit controls. Delivery only decides when to call them.
pub trait ExecutionLimits: Send + Sync {
    /// Whether the host runs in the legacy safe execution mode.
    fn safe_mode(&self) -> bool;

    /// Give the current request `seconds` more from now.
    fn extend_time_limit(&self, seconds: u64);

    /// True once the current request has run out of time.
    fn expired(&self) -> bool { false }
}

/// No limits at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExecutionLimits;

impl ExecutionLimits for NoExecutionLimits {
    fn safe_mode(&self) -> bool { false }
    fn extend_time_limit(&self, _seconds: u64) {}
}

/// Per-request time budget with an optional deadline.
#[derive(Debug)]
pub struct ConfiguredLimits {
    safe_mode: bool,
    deadline: Mutex<Option<Instant>>,
    extensions: AtomicU64,
}

impl ConfiguredLimits {
    pub fn new(safe_mode: bool, budget: Option<Duration>) -> Self {
        Self {
            safe_mode,
            deadline: Mutex::new(budget.map(|b| Instant::now() + b)),
            extensions: AtomicU64::new(0),
        }
    }

    /// How many times the budget was extended.
    pub fn extensions(&self) -> u64 {
        self.extensions.load(Ordering::Relaxed)
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }
}

impl ExecutionLimits for ConfiguredLimits {
    fn safe_mode(&self) -> bool { self.safe_mode }

    fn extend_time_limit(&self, seconds: u64) {
        *self.deadline.lock() = Some(Instant::now() + Duration::from_secs(seconds));
        self.extensions.fetch_add(1, Ordering::Relaxed);
    }

    fn expired(&self) -> bool {
        matches!(*self.deadline.lock(), Some(d) if Instant::now() >= d)
    }
}
