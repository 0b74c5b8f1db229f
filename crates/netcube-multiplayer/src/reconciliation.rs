//! Server reconciliation: rewind to an authoritative move and replay history.
//!
//! A correction carries the authority's state at some timestamp `T`. The
//! client drops history older than `T`, compares the oldest remaining move
//! with the correction, and on any difference snaps to the authoritative
//! state and re-simulates every later move with its recorded input and step.
//! The compared move is overwritten with the authoritative state and kept as
//! a checkpoint, so repeating the same correction finds a match.

use crate::diagnostics::{DiagnosticsSink, NetEvent};
use crate::history::MoveHistory;
use crate::prediction::PredictionEngine;
use crate::state::{InputState, Move};

/// What a correction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// No history was left to compare; nothing changed.
    Dropped,
    /// The stored prediction matched exactly.
    Confirmed,
    /// The prediction diverged and `replayed` later moves were re-simulated.
    Reconciled {
        /// Number of stored moves re-simulated after the checkpoint.
        replayed: usize,
    },
    /// A replay was already running.
    Ignored,
}

/// Mutable pieces of a pawn that a correction rewrites.
pub struct ReconcileTarget<'a> {
    /// Move history.
    pub history: &'a mut MoveHistory,
    /// Live simulation.
    pub prediction: &'a mut PredictionEngine,
    /// Active input; replaced during replay, restored afterwards.
    pub input: &'a mut InputState,
}

/// Applies authoritative corrections to a predicted history.
#[derive(Debug, Default)]
pub struct ReconciliationEngine {
    replaying: bool,
}

impl ReconciliationEngine {
    /// Idle engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a replay is in progress.
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// Reconcile `target` against `correction`.
    ///
    /// `network_now_ms` is the client's network time when the correction is
    /// handled; the replay ends with a zero-length move recording the
    /// replayed state at that instant.
    pub fn apply_correction(
        &mut self,
        correction: &Move,
        target: ReconcileTarget<'_>,
        network_now_ms: i32,
        diagnostics: &dyn DiagnosticsSink,
    ) -> CorrectionOutcome {
        let timestamp_ms = correction.timestamp_ms;
        if self.replaying {
            diagnostics.record(NetEvent::CorrectionIgnored { timestamp_ms });
            return CorrectionOutcome::Ignored;
        }

        let ReconcileTarget {
            history,
            prediction,
            input,
        } = target;

        history.evict_older_than(timestamp_ms);

        let Some(oldest) = history.dense().oldest() else {
            diagnostics.record(NetEvent::CorrectionDropped { timestamp_ms });
            return CorrectionOutcome::Dropped;
        };

        if oldest.timestamp_ms != timestamp_ms {
            diagnostics.record(NetEvent::TimestampMismatch {
                received_ms: timestamp_ms,
                stored_ms: oldest.timestamp_ms,
            });
        }

        if oldest.state == correction.state {
            diagnostics.record(NetEvent::CorrectionConfirmed { timestamp_ms });
            return CorrectionOutcome::Confirmed;
        }

        // The divergent prediction becomes the authoritative checkpoint.
        let dense = history.dense_mut();
        let checkpoint = dense.tail();
        dense[checkpoint].state = correction.state;

        let saved_input = *input;
        let saved_now_ms = network_now_ms;

        prediction.snap(correction.state);
        self.replaying = true;
        *input = correction.input;

        let mut replayed = 0;
        let mut index = dense.next(checkpoint);
        while index != dense.head() {
            let entry = &mut dense[index];
            *input = entry.input;
            entry.state = prediction.step(input, entry.delta_seconds);
            replayed += 1;
            index = dense.next(index);
        }

        // Record the replayed state at the moment the correction was handled.
        // The next tick integrates the time since the newest move.
        let newest_ms = dense
            .newest()
            .map_or(saved_now_ms, |newest| newest.timestamp_ms);
        history.record(Move::new(
            saved_now_ms.max(newest_ms),
            *prediction.current(),
            *input,
            0.0,
        ));
        history.refresh_important();

        self.replaying = false;
        *input = saved_input;

        diagnostics.record(NetEvent::Reconciled {
            timestamp_ms,
            replayed,
        });
        CorrectionOutcome::Reconciled { replayed }
    }
}

#[cfg(test)]
#[path = "reconciliation_tests.rs"]
mod tests;
