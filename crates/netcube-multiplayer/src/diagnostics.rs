//! Injected observability for corrections, pings, and clock sync.
//!
//! Pawns and controllers report what happened through a
//! [`DiagnosticsSink`] instead of logging directly, so tests can assert on
//! the exact event sequence and the demo can print counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Something worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    /// Correction arrived with no history left to compare against.
    CorrectionDropped {
        /// Correction timestamp.
        timestamp_ms: i32,
    },
    /// The closest stored move does not carry the correction's timestamp.
    TimestampMismatch {
        /// Correction timestamp.
        received_ms: i32,
        /// Timestamp of the move it was compared against.
        stored_ms: i32,
    },
    /// Prediction matched the authority exactly.
    CorrectionConfirmed {
        /// Correction timestamp.
        timestamp_ms: i32,
    },
    /// Prediction diverged and history was replayed.
    Reconciled {
        /// Correction timestamp.
        timestamp_ms: i32,
        /// Stored moves re-simulated.
        replayed: usize,
    },
    /// Correction arrived during a replay and was ignored.
    CorrectionIgnored {
        /// Correction timestamp.
        timestamp_ms: i32,
    },
    /// A visible correction reset the blend rate.
    SmoothingStarted {
        /// Distance between the pre- and post-correction positions.
        position_error: f32,
    },
    /// A negative round trip was thrown away.
    PingDiscarded {
        /// The rejected sample (s).
        rtt_secs: f32,
    },
    /// The exact ping estimate changed.
    PingUpdated {
        /// New estimate (ms).
        exact_ping_ms: f32,
    },
    /// A timestamp round trip completed.
    ClockSynced {
        /// Round trip (ms).
        rtt_ms: i32,
        /// Committed offset (ms).
        offset_ms: i32,
    },
    /// A timestamp reply arrived with no request outstanding.
    StaleTimestampResponse {
        /// Authority time carried by the reply.
        server_time_ms: i32,
    },
    /// The authority granted a prediction window.
    PredictionWindowNegotiated {
        /// Requested window (ms).
        requested_ms: f32,
        /// Granted window after clamping (ms).
        granted_ms: f32,
    },
}

/// Receives [`NetEvent`]s.
pub trait DiagnosticsSink: Send + Sync {
    /// Record one event.
    fn record(&self, event: NetEvent);
}

// ---------------------------------------------------------------------------
// TracingSink
// ---------------------------------------------------------------------------

/// Point-in-time copy of [`TracingSink`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    /// Corrections dropped on an empty history.
    pub corrections_dropped: u64,
    /// Timestamp mismatches.
    pub timestamp_mismatches: u64,
    /// Corrections that matched the prediction.
    pub corrections_confirmed: u64,
    /// Corrections that triggered a replay.
    pub reconciliations: u64,
    /// Total moves re-simulated.
    pub replayed_moves: u64,
    /// Corrections ignored during a replay.
    pub corrections_ignored: u64,
    /// Visible corrections that started smoothing.
    pub smoothing_started: u64,
    /// Negative ping samples.
    pub pings_discarded: u64,
    /// Ping estimate changes.
    pub ping_updates: u64,
    /// Completed clock round trips.
    pub clock_syncs: u64,
    /// Unsolicited timestamp replies.
    pub stale_timestamp_responses: u64,
    /// Prediction windows granted.
    pub windows_negotiated: u64,
}

/// Emits structured `tracing` events and counts them.
#[derive(Debug, Default)]
pub struct TracingSink {
    corrections_dropped: AtomicU64,
    timestamp_mismatches: AtomicU64,
    corrections_confirmed: AtomicU64,
    reconciliations: AtomicU64,
    replayed_moves: AtomicU64,
    corrections_ignored: AtomicU64,
    smoothing_started: AtomicU64,
    pings_discarded: AtomicU64,
    ping_updates: AtomicU64,
    clock_syncs: AtomicU64,
    stale_timestamp_responses: AtomicU64,
    windows_negotiated: AtomicU64,
}

impl TracingSink {
    /// Sink with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the counters.
    pub fn counters(&self) -> NetCounters {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        NetCounters {
            corrections_dropped: get(&self.corrections_dropped),
            timestamp_mismatches: get(&self.timestamp_mismatches),
            corrections_confirmed: get(&self.corrections_confirmed),
            reconciliations: get(&self.reconciliations),
            replayed_moves: get(&self.replayed_moves),
            corrections_ignored: get(&self.corrections_ignored),
            smoothing_started: get(&self.smoothing_started),
            pings_discarded: get(&self.pings_discarded),
            ping_updates: get(&self.ping_updates),
            clock_syncs: get(&self.clock_syncs),
            stale_timestamp_responses: get(&self.stale_timestamp_responses),
            windows_negotiated: get(&self.windows_negotiated),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl DiagnosticsSink for TracingSink {
    fn record(&self, event: NetEvent) {
        match event {
            NetEvent::CorrectionDropped { timestamp_ms } => {
                bump(&self.corrections_dropped);
                tracing::debug!(timestamp_ms, "correction dropped, no stored moves");
            }
            NetEvent::TimestampMismatch {
                received_ms,
                stored_ms,
            } => {
                bump(&self.timestamp_mismatches);
                tracing::debug!(received_ms, stored_ms, "correction timestamp mismatch");
            }
            NetEvent::CorrectionConfirmed { timestamp_ms } => {
                bump(&self.corrections_confirmed);
                tracing::trace!(timestamp_ms, "prediction confirmed");
            }
            NetEvent::Reconciled {
                timestamp_ms,
                replayed,
            } => {
                bump(&self.reconciliations);
                self.replayed_moves
                    .fetch_add(replayed as u64, Ordering::Relaxed);
                tracing::debug!(timestamp_ms, replayed, "reconciled against authority");
            }
            NetEvent::CorrectionIgnored { timestamp_ms } => {
                bump(&self.corrections_ignored);
                tracing::warn!(timestamp_ms, "correction ignored during replay");
            }
            NetEvent::SmoothingStarted { position_error } => {
                bump(&self.smoothing_started);
                tracing::debug!(position_error, "correction smoothing started");
            }
            NetEvent::PingDiscarded { rtt_secs } => {
                bump(&self.pings_discarded);
                tracing::debug!(rtt_secs, "negative ping sample discarded");
            }
            NetEvent::PingUpdated { exact_ping_ms } => {
                bump(&self.ping_updates);
                tracing::trace!(exact_ping_ms, "ping estimate updated");
            }
            NetEvent::ClockSynced { rtt_ms, offset_ms } => {
                bump(&self.clock_syncs);
                tracing::debug!(rtt_ms, offset_ms, "clock offset committed");
            }
            NetEvent::StaleTimestampResponse { server_time_ms } => {
                bump(&self.stale_timestamp_responses);
                tracing::warn!(server_time_ms, "timestamp reply without a pending request");
            }
            NetEvent::PredictionWindowNegotiated {
                requested_ms,
                granted_ms,
            } => {
                bump(&self.windows_negotiated);
                tracing::info!(requested_ms, granted_ms, "prediction window negotiated");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NetEvent>>,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events so far.
    pub fn events(&self) -> Vec<NetEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&NetEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| predicate(e))
            .count()
    }

    /// Forget recorded events.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DiagnosticsSink for RecordingSink {
    fn record(&self, event: NetEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_sink_counts_events() {
        let sink = TracingSink::new();
        sink.record(NetEvent::Reconciled {
            timestamp_ms: 10,
            replayed: 4,
        });
        sink.record(NetEvent::Reconciled {
            timestamp_ms: 20,
            replayed: 3,
        });
        sink.record(NetEvent::CorrectionConfirmed { timestamp_ms: 30 });
        sink.record(NetEvent::StaleTimestampResponse { server_time_ms: 5 });

        let counters = sink.counters();
        assert_eq!(counters.reconciliations, 2);
        assert_eq!(counters.replayed_moves, 7);
        assert_eq!(counters.corrections_confirmed, 1);
        assert_eq!(counters.stale_timestamp_responses, 1);
        assert_eq!(counters.corrections_dropped, 0);
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.record(NetEvent::PingUpdated {
            exact_ping_ms: 80.0,
        });
        sink.record(NetEvent::CorrectionDropped { timestamp_ms: 7 });

        assert_eq!(
            sink.events(),
            vec![
                NetEvent::PingUpdated {
                    exact_ping_ms: 80.0
                },
                NetEvent::CorrectionDropped { timestamp_ms: 7 },
            ]
        );
        assert_eq!(
            sink.count(|e| matches!(e, NetEvent::CorrectionDropped { .. })),
            1
        );
        sink.clear();
        assert!(sink.events().is_empty());
    }
}
