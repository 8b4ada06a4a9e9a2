//! K-way stable merge of per-instrument tick streams.

use super::{convert, TimelineError};
use crate::domain::{InstrumentIdx, InstrumentSpec, Tick};
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Builder that accumulates per-instrument streams and merges them.
///
/// Each registered stream must already be locally time-ordered; the builder
/// only merges across instruments, it never sorts within one. Registration
/// order is the tie-break for equal timestamps, so the caller must register
/// instruments in a stable order.
#[derive(Debug, Default)]
pub struct TimelineBuilder {
    instruments: Vec<InstrumentSpec>,
    streams: Vec<Vec<Tick>>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instrument with an already-converted tick stream.
    ///
    /// Rejects out-of-order streams instead of sorting them: an unsorted
    /// source means the upstream data pipeline is broken.
    pub fn register(
        &mut self,
        spec: InstrumentSpec,
        mut ticks: Vec<Tick>,
    ) -> Result<InstrumentIdx, TimelineError> {
        let idx = InstrumentIdx(self.instruments.len() as u32);
        for (row, pair) in ticks.windows(2).enumerate() {
            if pair[1].time < pair[0].time {
                return Err(TimelineError::UnsortedSource {
                    symbol: spec.symbol,
                    row: row + 1,
                });
            }
        }
        for tick in &mut ticks {
            tick.instrument = idx;
        }
        self.instruments.push(spec);
        self.streams.push(ticks);
        Ok(idx)
    }

    /// Register an instrument from a raw columnar source.
    pub fn register_frame(
        &mut self,
        spec: InstrumentSpec,
        df: &DataFrame,
    ) -> Result<InstrumentIdx, TimelineError> {
        let idx = InstrumentIdx(self.instruments.len() as u32);
        let ticks = convert::ticks_from_dataframe(df, idx)?;
        self.register(spec, ticks)
    }

    /// Merge all registered streams into the global timeline.
    pub fn build(self) -> Result<EventTimeline, TimelineError> {
        let total: usize = self.streams.iter().map(Vec::len).sum();
        if total == 0 {
            return Err(TimelineError::Empty);
        }

        let mut ticks = Vec::with_capacity(total);
        let mut by_instrument: Vec<Vec<u32>> = self.streams.iter().map(|_| Vec::new()).collect();

        // Min-heap keyed (time, registration index, stream position). The
        // position component makes the merge stable for equal keys within a
        // stream; the registration index makes cross-instrument ties
        // deterministic.
        let mut heap: BinaryHeap<Reverse<(i64, u32, u32)>> = BinaryHeap::new();
        for (i, stream) in self.streams.iter().enumerate() {
            if let Some(first) = stream.first() {
                heap.push(Reverse((first.time.timestamp_millis(), i as u32, 0)));
            }
        }

        while let Some(Reverse((_, instrument, pos))) = heap.pop() {
            let stream = &self.streams[instrument as usize];
            let tick = stream[pos as usize];
            by_instrument[instrument as usize].push(ticks.len() as u32);
            ticks.push(tick);

            let next = pos as usize + 1;
            if let Some(tick) = stream.get(next) {
                heap.push(Reverse((
                    tick.time.timestamp_millis(),
                    instrument,
                    next as u32,
                )));
            }
        }

        // Step table: one entry per distinct timestamp with its exclusive
        // end offset into the merged array. Steps define barrier generations.
        let mut steps = Vec::new();
        for (i, tick) in ticks.iter().enumerate() {
            match steps.last_mut() {
                Some(Step { time, end }) if *time == tick.time => *end = i as u32 + 1,
                _ => steps.push(Step {
                    time: tick.time,
                    end: i as u32 + 1,
                }),
            }
        }

        Ok(EventTimeline {
            instruments: self.instruments,
            ticks,
            by_instrument,
            steps,
        })
    }
}

/// One barrier generation: all events sharing a distinct timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub time: DateTime<Utc>,
    /// Exclusive end offset into the merged tick array.
    pub end: u32,
}

/// The globally time-ordered event sequence plus its derived indexes.
///
/// Immutable after construction and shared read-only between workers.
#[derive(Debug)]
pub struct EventTimeline {
    instruments: Vec<InstrumentSpec>,
    ticks: Vec<Tick>,
    by_instrument: Vec<Vec<u32>>,
    steps: Vec<Step>,
}

/// Per-worker read cursor into one instrument's slice of the timeline.
#[derive(Debug, Clone)]
pub struct InstrumentCursor {
    instrument: InstrumentIdx,
    pos: usize,
}

impl EventTimeline {
    pub fn instruments(&self) -> &[InstrumentSpec] {
        &self.instruments
    }

    pub fn spec(&self, instrument: InstrumentIdx) -> &InstrumentSpec {
        &self.instruments[instrument.0 as usize]
    }

    /// All ticks in global order.
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Number of events for one instrument.
    pub fn instrument_len(&self, instrument: InstrumentIdx) -> usize {
        self.by_instrument[instrument.0 as usize].len()
    }

    /// The step (generation) table.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Ticks belonging to step `g`, in merged order.
    pub fn step_slice(&self, g: usize) -> &[Tick] {
        let start = if g == 0 { 0 } else { self.steps[g - 1].end as usize };
        &self.ticks[start..self.steps[g].end as usize]
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.ticks.first().map(|t| t.time).expect("timeline is never built empty")
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.ticks.last().map(|t| t.time).expect("timeline is never built empty")
    }

    /// New cursor positioned before the instrument's first event.
    pub fn cursor(&self, instrument: InstrumentIdx) -> InstrumentCursor {
        InstrumentCursor { instrument, pos: 0 }
    }

    /// Consume and return the instrument's events due up to and including
    /// `until`, advancing the cursor past them.
    pub fn due<'a>(
        &'a self,
        cursor: &mut InstrumentCursor,
        until: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a Tick> + 'a {
        let list = &self.by_instrument[cursor.instrument.0 as usize];
        let start = cursor.pos;
        let mut end = start;
        while end < list.len() && self.ticks[list[end] as usize].time <= until {
            end += 1;
        }
        cursor.pos = end;
        list[start..end].iter().map(move |&i| &self.ticks[i as usize])
    }
}
