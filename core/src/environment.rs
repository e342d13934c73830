//! Time source injected into the lifecycle.
//!
//! Every timestamp the core writes (event `created_at`, estimated delivery,
//! token issue time) comes from a [`Clock`], so tests can pin time.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that only moves when told to.
///
/// Clones share the same instant, so a test can advance the clock it handed
/// to the lifecycle.
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Clock frozen at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut time) = self.time.lock() {
            *time += by;
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut time) = self.time.lock() {
            *time = to;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
            .lock()
            .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
    }
}
