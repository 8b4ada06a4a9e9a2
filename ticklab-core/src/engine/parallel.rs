//! Barrier execution: one worker per instrument plus a position monitor.
//!
//! Each generation is two barrier phases. Phase A: every instrument worker
//! consumes its due ticks (candles, broker staging, strategy) while the
//! monitor idles. Phase B: the monitor alone commits the step and records
//! the equity snapshot while the workers idle. Cross-instrument state only
//! changes inside phase B, in registration order, which is what makes this
//! mode byte-identical to the sequential loop.

use super::{process_tick, EngineConfig, ReplayOutcome, StepAccounting};
use crate::broker::Broker;
use crate::candles::CandleAggregator;
use crate::domain::InstrumentIdx;
use crate::strategy::Strategy;
use crate::sync::{ShutdownFlag, SimClock, StepBarrier};
use crate::telemetry::EventSink;
use crate::timeline::EventTimeline;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

pub(crate) fn run(
    timeline: &EventTimeline,
    strategies: Vec<Box<dyn Strategy>>,
    aggregators: Vec<CandleAggregator>,
    broker: &Broker,
    config: &EngineConfig,
    sink: &dyn EventSink,
    shutdown: ShutdownFlag,
) -> ReplayOutcome {
    let steps = timeline.steps();
    let clock = SimClock::new(timeline.start_time());
    // N instrument workers plus exactly one position monitor.
    let barrier = StepBarrier::new(
        timeline.instruments().len() + 1,
        config.speed,
        shutdown.clone(),
    );
    let mut accounting = StepAccounting::new(broker, sink, config, timeline);
    let mut completed = 0usize;

    std::thread::scope(|scope| {
        for (i, (strategy, aggregator)) in
            strategies.into_iter().zip(aggregators).enumerate()
        {
            let barrier = &barrier;
            let clock = &clock;
            scope.spawn(move || {
                // An invariant panic in a worker must abort the run, not
                // leave the other participants blocked at the rendezvous.
                let result = catch_unwind(AssertUnwindSafe(|| {
                    worker_loop(
                        timeline,
                        InstrumentIdx(i as u32),
                        strategy,
                        aggregator,
                        broker,
                        barrier,
                        clock,
                    );
                }));
                if let Err(payload) = result {
                    barrier.shutdown();
                    resume_unwind(payload);
                }
            });
        }

        // The monitor participant runs on the calling thread.
        loop {
            if !barrier.await_step() {
                break; // phase A: workers consume their due ticks
            }
            if !barrier.await_step() {
                break; // phase B: the monitor owns the step boundary
            }
            accounting.on_step_committed(completed, steps[completed].time);
            completed += 1;
            if completed == steps.len() {
                barrier.shutdown();
                break;
            }
            let dt = clock.advance(steps[completed].time);
            barrier.note_step_width(dt);
        }
        // Scope exit joins the workers and propagates any worker panic.
    });

    let cancelled = completed < steps.len();
    if !cancelled {
        accounting.finish(completed);
    }

    let events_processed = if completed == 0 {
        0
    } else {
        steps[completed - 1].end as usize
    };
    ReplayOutcome::assemble(
        broker,
        accounting.equity_curve,
        completed,
        events_processed,
        cancelled,
    )
}

fn worker_loop(
    timeline: &EventTimeline,
    instrument: InstrumentIdx,
    mut strategy: Box<dyn Strategy>,
    mut aggregator: CandleAggregator,
    broker: &Broker,
    barrier: &StepBarrier,
    clock: &SimClock,
) {
    let mut cursor = timeline.cursor(instrument);
    loop {
        if !barrier.await_step() {
            break; // phase A begins
        }
        let now = clock.now();
        for tick in timeline.due(&mut cursor, now) {
            process_tick(tick, &mut aggregator, strategy.as_mut(), broker);
        }
        if !barrier.await_step() {
            break; // phase B begins; nothing to do until the next generation
        }
    }
}
