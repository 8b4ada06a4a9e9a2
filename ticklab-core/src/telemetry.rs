//! Structured replay events and the telemetry collaborator seam.
//!
//! The kernel never depends on log content for correctness — it only emits.
//! Every SL/TP close must be observable through the sink; swallowing them
//! silently is a correctness bug, not a verbosity choice.

use crate::domain::{CloseReason, InstrumentIdx, PositionSide, Ticket};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A structured event emitted by the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplayEvent {
    PositionOpened {
        ticket: Ticket,
        symbol: String,
        side: PositionSide,
        volume: f64,
        price: f64,
        time: DateTime<Utc>,
    },
    PositionClosed {
        ticket: Ticket,
        symbol: String,
        reason: CloseReason,
        price: f64,
        profit: f64,
        time: DateTime<Utc>,
    },
    OrderRejected {
        symbol: String,
        reason: String,
        time: DateTime<Utc>,
    },
    InstrumentSkipped {
        symbol: String,
        reason: String,
    },
    Progress {
        /// Fraction of elapsed simulated time, in [0, 1].
        fraction: f64,
        simulated_time: DateTime<Utc>,
        generation: u64,
        open_positions: usize,
        closed_trades: usize,
        equity: f64,
    },
}

/// Receiver for structured replay events.
///
/// Implementations must tolerate being called from multiple worker threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ReplayEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &ReplayEvent) {}
}

/// Sink that records every event, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ReplayEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReplayEvent> {
        self.events.lock().clone()
    }

    /// Count of recorded `PositionClosed` events with the given reason.
    pub fn closes_with_reason(&self, reason: CloseReason) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ReplayEvent::PositionClosed { reason: r, .. } if *r == reason))
            .count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &ReplayEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Marker so events can be filtered per instrument downstream.
pub fn event_instrument(event: &ReplayEvent) -> Option<InstrumentIdx> {
    match event {
        ReplayEvent::PositionOpened { ticket, .. } | ReplayEvent::PositionClosed { ticket, .. } => {
            Some(ticket.instrument())
        }
        _ => None,
    }
}
