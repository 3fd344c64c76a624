//! ==============================================================================
//! clock.rs - wall clock capability
//! ==============================================================================
//!
//! purpose:
//!     the store stamps readings and decides retention against "now".
//!     that "now" comes through the Clock trait so tests can move time
//!     forward by hand instead of sleeping for an hour.
//!
//! relationships:
//!     - used by: store.rs (createdAt assignment, retention filter)
//!     - used by: main.rs (SystemClock for the real server)
//!
//! ==============================================================================

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// source of wall clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// the real clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// a clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// move the clock forward (or backward, with a negative duration)
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
