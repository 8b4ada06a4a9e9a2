//! Time synchronization: the step barrier, simulated clock, and pacing.

mod barrier;
mod clock;

pub use barrier::{ShutdownFlag, StepBarrier};
pub use clock::{ReplaySpeed, SimClock};
