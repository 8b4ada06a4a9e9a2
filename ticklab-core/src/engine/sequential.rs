//! Sequential execution: one loop over the merged timeline.

use super::{process_tick, EngineConfig, ReplayOutcome, StepAccounting};
use crate::broker::Broker;
use crate::candles::CandleAggregator;
use crate::strategy::Strategy;
use crate::sync::{ShutdownFlag, SimClock};
use crate::telemetry::EventSink;
use crate::timeline::EventTimeline;

pub(crate) fn run(
    timeline: &EventTimeline,
    mut strategies: Vec<Box<dyn Strategy>>,
    mut aggregators: Vec<CandleAggregator>,
    broker: &Broker,
    config: &EngineConfig,
    sink: &dyn EventSink,
    shutdown: ShutdownFlag,
) -> ReplayOutcome {
    let clock = SimClock::new(timeline.start_time());
    let mut accounting = StepAccounting::new(broker, sink, config, timeline);
    let mut completed = 0usize;

    for (g, step) in timeline.steps().iter().enumerate() {
        if shutdown.is_set() {
            break;
        }
        let dt = clock.advance(step.time);
        if let Some(delay) = config.speed.wall_delay(dt) {
            std::thread::sleep(delay);
        }

        for tick in timeline.step_slice(g) {
            let i = tick.instrument.0 as usize;
            process_tick(tick, &mut aggregators[i], strategies[i].as_mut(), broker);
        }
        accounting.on_step_committed(g, step.time);
        completed = g + 1;
    }

    let cancelled = completed < timeline.step_count();
    if !cancelled {
        accounting.finish(completed);
    }

    let events_processed = if completed == 0 {
        0
    } else {
        timeline.steps()[completed - 1].end as usize
    };
    ReplayOutcome::assemble(
        broker,
        accounting.equity_curve,
        completed,
        events_processed,
        cancelled,
    )
}
