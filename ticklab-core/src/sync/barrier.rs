//! Reusable cyclic barrier that drives lockstep time progression.

use super::clock::ReplaySpeed;
use chrono::Duration as ChronoDuration;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative shutdown signal shared by the barrier and its participants.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    /// Simulated width of the step about to begin, for pacing.
    step_width: ChronoDuration,
}

/// N-party cyclic barrier with generation counting and optional pacing.
///
/// Converts N independent OS threads into N instruments advancing through
/// simulated time in lockstep: no participant may begin generation `g+1`
/// until every participant has finished generation `g`. There is no
/// special-casing of any participant — the position monitor is just one of
/// the N parties.
pub struct StepBarrier {
    state: Mutex<BarrierState>,
    cvar: Condvar,
    parties: usize,
    speed: ReplaySpeed,
    shutdown: ShutdownFlag,
}

impl StepBarrier {
    pub fn new(parties: usize, speed: ReplaySpeed, shutdown: ShutdownFlag) -> Self {
        assert!(parties > 0, "barrier needs at least one participant");
        Self {
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                step_width: ChronoDuration::zero(),
            }),
            cvar: Condvar::new(),
            parties,
            speed,
            shutdown,
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Record the simulated width of the upcoming step so the last arriver
    /// can apply the pacing sleep before releasing the next generation.
    pub fn note_step_width(&self, width: ChronoDuration) {
        self.state.lock().step_width = width;
    }

    /// Broadcast shutdown: all blocked and future callers of `await_step`
    /// return false.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
        self.cvar.notify_all();
    }

    /// Mark this participant ready and block until all parties have arrived.
    ///
    /// Returns false on shutdown; the caller must exit its loop promptly
    /// without applying any further generation state.
    pub fn await_step(&self) -> bool {
        let mut state = self.state.lock();
        if self.shutdown.is_set() {
            return false;
        }
        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.parties {
            state.arrived = 0;
            // Pacing happens before the release so no participant starts the
            // next generation early. The width is taken one-shot so only the
            // rendezvous that follows a time advance sleeps. The lock is
            // dropped across the sleep so shutdown can still be triggered
            // from outside.
            let width = std::mem::replace(&mut state.step_width, ChronoDuration::zero());
            if let Some(delay) = self.speed.wall_delay(width) {
                drop(state);
                std::thread::sleep(delay);
                state = self.state.lock();
                if self.shutdown.is_set() {
                    self.cvar.notify_all();
                    return false;
                }
            }
            state.generation = generation + 1;
            self.cvar.notify_all();
            return true;
        }

        // Bounded wait so a shutdown that raced the notify is still observed.
        while state.generation == generation && !self.shutdown.is_set() {
            self.cvar
                .wait_for(&mut state, Duration::from_millis(100));
        }
        !self.shutdown.is_set()
    }
}
