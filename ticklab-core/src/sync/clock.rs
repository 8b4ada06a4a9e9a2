//! Simulated-time cursor and wall-clock pacing policy.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wall-clock throttling policy for replay.
///
/// Purely a pacing choice, orthogonal to correctness: the same generations
/// run in the same order at any speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaySpeed {
    /// No sleeping; replay as fast as the machine allows.
    Unthrottled,
    /// One simulated second per wall-clock second.
    Realtime,
    /// N simulated seconds per wall-clock second.
    Accelerated(f64),
}

impl ReplaySpeed {
    /// Wall-clock sleep for one simulated step of width `sim_dt`, if any.
    pub fn wall_delay(&self, sim_dt: ChronoDuration) -> Option<Duration> {
        let factor = match self {
            ReplaySpeed::Unthrottled => return None,
            ReplaySpeed::Realtime => 1.0,
            ReplaySpeed::Accelerated(n) if *n > 0.0 => *n,
            ReplaySpeed::Accelerated(_) => return None,
        };
        let millis = sim_dt.num_milliseconds();
        if millis <= 0 {
            return None;
        }
        Some(Duration::from_secs_f64(millis as f64 / 1000.0 / factor))
    }
}

/// The current simulated time, shared between workers.
///
/// Guarded by its own lock, acquired only by the time-advancement step and
/// by point reads; never held across a barrier wait.
#[derive(Debug)]
pub struct SimClock {
    now: Mutex<DateTime<Utc>>,
}

impl SimClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    /// Advance the cursor. Returns the simulated width of the advance.
    pub fn advance(&self, to: DateTime<Utc>) -> ChronoDuration {
        let mut now = self.now.lock();
        let dt = to - *now;
        debug_assert!(dt >= ChronoDuration::zero(), "simulated time went backwards");
        *now = to;
        dt
    }
}
