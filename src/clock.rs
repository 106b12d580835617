//! Injected time source.
//!
//! Every age and window computation in the crate (8-day freshness, 30-day
//! duplicate suppression, Monday week anchor) takes its notion of "now"
//! from this trait so boundary conditions are deterministic under test.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Source of the current instant.
pub trait Clock: Send + Sync {
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

/// Settable clock for tests.
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(instant)),
        }
    }

    /// Move the clock to a new instant. Shared across clones.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.lock().unwrap() = instant;
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.instant.lock().unwrap();
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().unwrap()
    }
}
