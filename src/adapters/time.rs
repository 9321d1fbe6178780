//! Wall-clock adapters.
//!
//! The schedule runner works against absolute epoch seconds, so both
//! targets use the system clock (on the device it is valid once SNTP
//! has synced). Tests use [`SimClock`] and step time by hand.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::app::Clock;
use crate::run::temp_log::EpochSecs;

/// The real system clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> EpochSecs {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as EpochSecs)
            .unwrap_or(0)
    }
}

/// Settable clock for tests and the host simulation.
#[derive(Default)]
pub struct SimClock {
    now: AtomicI64,
}

impl SimClock {
    pub fn new(start: EpochSecs) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: EpochSecs) {
        self.now.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, secs: EpochSecs) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for SimClock {
    fn now(&self) -> EpochSecs {
        self.now.load(Ordering::Relaxed)
    }
}
