//! Engine-level behavior: progress reporting, snapshot cadence, shutdown.

mod common;

use common::{build_timeline, run_pulse, synthetic_ticks, INITIAL_BALANCE};
use std::sync::Arc;
use ticklab_core::broker::{Broker, PositionLimits};
use ticklab_core::candles::CandleAggregator;
use ticklab_core::domain::{InstrumentIdx, Timeframe};
use ticklab_core::engine::{run_replay, EngineConfig, ExecutionMode};
use ticklab_core::strategy::{NoopStrategy, Strategy};
use ticklab_core::sync::ShutdownFlag;
use ticklab_core::telemetry::{EventSink, NullSink, ReplayEvent};

#[test]
fn progress_is_monotone_and_reaches_one() {
    let timeline = build_timeline(vec![
        ("EURUSD", synthetic_ticks(1, 1_000, 1_000, 0, 1.1)),
        ("GBPUSD", synthetic_ticks(2, 400, 2_700, 300, 1.25)),
    ]);
    let (_, sink) = run_pulse(&timeline, ExecutionMode::Sequential, 100);

    let fractions: Vec<f64> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            ReplayEvent::Progress { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .collect();
    assert!(fractions.len() > 2, "expected periodic progress events");
    for pair in fractions.windows(2) {
        assert!(pair[1] >= pair[0], "progress went backwards: {pair:?}");
    }
    assert_eq!(*fractions.last().unwrap(), 1.0);
}

#[test]
fn snapshot_cadence_thins_the_equity_curve() {
    let timeline = build_timeline(vec![(
        "EURUSD",
        synthetic_ticks(3, 1_000, 1_000, 0, 1.1),
    )]);

    let broker = Broker::new(
        timeline.instruments().to_vec(),
        INITIAL_BALANCE,
        PositionLimits::default(),
        Arc::new(NullSink) as Arc<dyn EventSink>,
    );
    let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(NoopStrategy)];
    let aggregators = vec![{
        let mut agg = CandleAggregator::new(InstrumentIdx(0));
        agg.add_incremental(Timeframe::M1, 50, Vec::new());
        agg
    }];
    let config = EngineConfig {
        snapshot_every_steps: 100,
        ..EngineConfig::default()
    };
    let outcome = run_replay(
        &timeline,
        strategies,
        aggregators,
        &broker,
        &config,
        &NullSink,
        ShutdownFlag::new(),
    );

    // 1000 steps at every-100 cadence plus the final post-liquidation
    // snapshot.
    assert_eq!(outcome.equity_curve.len(), 11);
}

#[test]
fn pre_triggered_shutdown_completes_nothing() {
    let timeline = build_timeline(vec![
        ("EURUSD", synthetic_ticks(4, 500, 1_000, 0, 1.1)),
        ("GBPUSD", synthetic_ticks(5, 500, 1_000, 100, 1.25)),
    ]);
    for mode in [ExecutionMode::Sequential, ExecutionMode::Barrier] {
        let broker = Broker::new(
            timeline.instruments().to_vec(),
            INITIAL_BALANCE,
            PositionLimits::default(),
            Arc::new(NullSink) as Arc<dyn EventSink>,
        );
        let strategies: Vec<Box<dyn Strategy>> =
            vec![Box::new(NoopStrategy), Box::new(NoopStrategy)];
        let aggregators = (0..2)
            .map(|i| CandleAggregator::new(InstrumentIdx(i)))
            .collect();

        let shutdown = ShutdownFlag::new();
        shutdown.trigger();
        let config = EngineConfig {
            mode,
            ..EngineConfig::default()
        };
        let outcome = run_replay(
            &timeline,
            strategies,
            aggregators,
            &broker,
            &config,
            &NullSink,
            shutdown,
        );

        assert!(outcome.cancelled);
        assert_eq!(outcome.steps_completed, 0);
        assert_eq!(outcome.events_processed, 0);
        assert!(outcome.trades.is_empty());
    }
}

#[test]
fn fingerprint_changes_with_input() {
    let a = build_timeline(vec![("EURUSD", synthetic_ticks(6, 500, 1_000, 0, 1.1))]);
    let b = build_timeline(vec![("EURUSD", synthetic_ticks(7, 500, 1_000, 0, 1.1))]);
    let (outcome_a, _) = run_pulse(&a, ExecutionMode::Sequential, usize::MAX);
    let (outcome_b, _) = run_pulse(&b, ExecutionMode::Sequential, usize::MAX);
    assert_ne!(outcome_a.fingerprint, outcome_b.fingerprint);
}
