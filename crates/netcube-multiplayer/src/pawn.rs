//! The networked cube pawn.
//!
//! One [`NetPawn`] exists per peer for every cube. Its [`PawnRole`] decides
//! what a tick does:
//!
//! - the owning client predicts, records history, and submits input;
//! - the authority simulates the owner's submitted input and publishes the
//!   result as the next correction;
//! - every non-replaying pawn blends its rendered state toward the simulated one.

use std::sync::Arc;

use bevy_ecs::prelude::*;
use netcube_config::Config;

use crate::clock::TimeSource;
use crate::diagnostics::{DiagnosticsSink, NetEvent};
use crate::history::MoveHistory;
use crate::messages::NetMessage;
use crate::physics::PhysicsBody;
use crate::prediction::PredictionEngine;
use crate::reconciliation::{CorrectionOutcome, ReconcileTarget, ReconciliationEngine};
use crate::smoothing::Smoother;
use crate::state::{InputState, Move, MoveIntent, PhysicsState};

/// Network role of one pawn instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PawnRole {
    /// This peer holds the authoritative simulation.
    pub authority: bool,
    /// This peer's input drives the pawn.
    pub locally_controlled: bool,
}

impl PawnRole {
    /// Owning client: predicts and reconciles.
    pub const AUTONOMOUS: Self = Self {
        authority: false,
        locally_controlled: true,
    };
    /// Authority copy of a remotely controlled pawn.
    pub const AUTHORITY: Self = Self {
        authority: true,
        locally_controlled: false,
    };
    /// Offline play: authoritative and locally controlled.
    pub const STANDALONE: Self = Self {
        authority: true,
        locally_controlled: true,
    };
    /// Another client's pawn, as seen by a non-owner.
    pub const SIMULATED: Self = Self {
        authority: false,
        locally_controlled: false,
    };
}

/// A predicted, reconciled, smoothed cube.
#[derive(Component)]
pub struct NetPawn {
    role: PawnRole,
    input: InputState,
    prediction: PredictionEngine,
    history: MoveHistory,
    reconciliation: ReconciliationEngine,
    smoother: Smoother,
    server_move: Option<Move>,
    replication_pending: bool,
    outbox: Vec<NetMessage>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl NetPawn {
    /// Pawn over a kinematic body at `initial`.
    pub fn new(
        role: PawnRole,
        config: &Config,
        initial: PhysicsState,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let prediction = PredictionEngine::kinematic(&config.movement, initial);
        Self::with_prediction(role, config, prediction, diagnostics)
    }

    /// Pawn driving a caller-supplied body.
    pub fn with_body(
        role: PawnRole,
        config: &Config,
        body: Box<dyn PhysicsBody>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let prediction = PredictionEngine::new(body, config.movement.force_strength);
        Self::with_prediction(role, config, prediction, diagnostics)
    }

    fn with_prediction(
        role: PawnRole,
        config: &Config,
        prediction: PredictionEngine,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let smoother = Smoother::new(&config.smoothing, *prediction.current());
        Self {
            role,
            input: InputState::default(),
            prediction,
            history: MoveHistory::from_config(&config.history),
            reconciliation: ReconciliationEngine::new(),
            smoother,
            server_move: None,
            replication_pending: false,
            outbox: Vec::new(),
            diagnostics,
        }
    }

    // -- Input --

    /// Press `intent`. Ignored unless locally controlled.
    pub fn press(&mut self, intent: MoveIntent) {
        if self.role.locally_controlled {
            self.input.set(intent, true);
        }
    }

    /// Release `intent`. Ignored unless locally controlled.
    pub fn release(&mut self, intent: MoveIntent) {
        if self.role.locally_controlled {
            self.input.set(intent, false);
        }
    }

    /// Replace the whole input. Ignored unless locally controlled.
    pub fn set_input(&mut self, input: InputState) {
        if self.role.locally_controlled {
            self.input = input;
        }
    }

    /// Authority: adopt the input submitted by the owning peer.
    pub fn on_submit_input(&mut self, input: InputState) {
        if self.role.authority {
            self.input = input;
        } else {
            tracing::debug!("submitted input reached a non-authoritative pawn, ignoring");
        }
    }

    // -- Tick --

    /// Advance the pawn by `delta_seconds`.
    pub fn tick(&mut self, delta_seconds: f32, time: &dyn TimeSource) {
        let state = self.prediction.step(&self.input, delta_seconds);

        if !self.role.authority && self.role.locally_controlled {
            self.update_history_buffer(time.network_time_ms(), delta_seconds);
            self.outbox.push(NetMessage::SubmitInput(self.input));
        }

        if self.role.authority && !self.role.locally_controlled {
            self.server_move = Some(Move::new(
                time.local_time_ms(),
                state,
                self.input,
                delta_seconds,
            ));
            self.replication_pending = true;
        }

        if !self.reconciliation.is_replaying() {
            self.smoother.blend_toward(self.prediction.current());
        }
        self.smoother.relax(delta_seconds);
    }

    /// Record the current input and state at `timestamp_ms`.
    /// Returns whether the move was important.
    pub fn update_history_buffer(&mut self, timestamp_ms: i32, delta_seconds: f32) -> bool {
        let mv = Move::new(
            timestamp_ms,
            *self.prediction.current(),
            self.input,
            delta_seconds,
        );
        self.history.record(mv)
    }

    // -- Corrections --

    /// Owning client: reconcile against an authoritative move.
    pub fn on_server_move(&mut self, correction: &Move, time: &dyn TimeSource) -> CorrectionOutcome {
        let before = *self.prediction.current();

        let outcome = self.reconciliation.apply_correction(
            correction,
            ReconcileTarget {
                history: &mut self.history,
                prediction: &mut self.prediction,
                input: &mut self.input,
            },
            time.network_time_ms(),
            self.diagnostics.as_ref(),
        );

        if let CorrectionOutcome::Reconciled { .. } = outcome {
            let after = *self.prediction.current();
            if self.smoother.is_visible_correction(&before, &after) {
                self.smoother.begin_smoothing();
                self.diagnostics.record(NetEvent::SmoothingStarted {
                    position_error: (after.position - before.position).length(),
                });
            }
        }
        outcome
    }

    /// Authority: the newest snapshot, once per tick that produced one.
    pub fn take_replication(&mut self) -> Option<Move> {
        if !self.replication_pending {
            return None;
        }
        self.replication_pending = false;
        self.server_move
    }

    /// Take every queued outgoing message.
    pub fn drain_outbox(&mut self) -> Vec<NetMessage> {
        std::mem::take(&mut self.outbox)
    }

    // -- Accessors --

    /// Network role.
    pub fn role(&self) -> PawnRole {
        self.role
    }

    /// Active input.
    pub fn input(&self) -> InputState {
        self.input
    }

    /// Simulated state.
    pub fn current_state(&self) -> &PhysicsState {
        self.prediction.current()
    }

    /// Smoothed state for drawing.
    pub fn rendered_state(&self) -> &PhysicsState {
        self.smoother.rendered()
    }

    /// Current smoothing blend factor.
    pub fn blend_rate(&self) -> f32 {
        self.smoother.blend_rate()
    }

    /// Recorded moves.
    pub fn history(&self) -> &MoveHistory {
        &self.history
    }

    /// Whether a replay is running.
    pub fn is_replaying(&self) -> bool {
        self.reconciliation.is_replaying()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use crate::physics::KinematicBody;
    use glam::Vec3;

    const DT: f32 = 1.0 / 60.0;

    struct FixedTime {
        local_ms: i32,
        offset_ms: i32,
    }

    impl TimeSource for FixedTime {
        fn local_time_ms(&self) -> i32 {
            self.local_ms
        }

        fn network_time_ms(&self) -> i32 {
            self.local_ms + self.offset_ms
        }
    }

    fn at(local_ms: i32) -> FixedTime {
        FixedTime {
            local_ms,
            offset_ms: 0,
        }
    }

    fn pawn(role: PawnRole) -> (NetPawn, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let pawn = NetPawn::new(role, &Config::default(), PhysicsState::default(), sink.clone());
        (pawn, sink)
    }

    #[test]
    fn test_autonomous_tick_records_and_submits() {
        let (mut pawn, _) = pawn(PawnRole::AUTONOMOUS);
        pawn.press(MoveIntent::Right);
        pawn.tick(
            DT,
            &FixedTime {
                local_ms: 16,
                offset_ms: 1000,
            },
        );

        let newest = *pawn.history().dense().newest().unwrap();
        assert_eq!(newest.timestamp_ms, 1016);
        assert_eq!(newest.state, *pawn.current_state());
        assert!(newest.input.right);
        assert_eq!(newest.delta_seconds, DT);
        assert!(pawn.current_state().velocity.x > 0.0);

        assert_eq!(
            pawn.drain_outbox(),
            vec![NetMessage::SubmitInput(pawn.input())]
        );
        assert!(pawn.take_replication().is_none());
    }

    #[test]
    fn test_history_marks_input_changes_important() {
        let (mut pawn, _) = pawn(PawnRole::AUTONOMOUS);
        pawn.press(MoveIntent::Forward);
        assert!(pawn.update_history_buffer(10, DT));
        assert!(!pawn.update_history_buffer(20, DT));
        pawn.press(MoveIntent::Left);
        assert!(pawn.update_history_buffer(30, DT));

        assert_eq!(pawn.history().dense().len(), 3);
        assert_eq!(pawn.history().important().len(), 2);
    }

    #[test]
    fn test_authority_publishes_snapshot_once() {
        let (mut pawn, _) = pawn(PawnRole::AUTHORITY);
        pawn.on_submit_input(InputState {
            backward: true,
            ..InputState::default()
        });
        pawn.tick(DT, &at(500));

        let snapshot = pawn.take_replication().unwrap();
        assert_eq!(snapshot.timestamp_ms, 500);
        assert!(snapshot.input.backward);
        assert!(snapshot.state.velocity.y > 0.0);
        assert!(pawn.take_replication().is_none());
        assert!(pawn.history().dense().is_empty());
        assert!(pawn.drain_outbox().is_empty());
    }

    #[test]
    fn test_input_ignored_without_local_control() {
        let (mut authority, _) = pawn(PawnRole::AUTHORITY);
        authority.press(MoveIntent::Forward);
        authority.set_input(InputState {
            left: true,
            ..InputState::default()
        });
        assert!(!authority.input().any());

        let (mut client, _) = pawn(PawnRole::AUTONOMOUS);
        client.on_submit_input(InputState {
            left: true,
            ..InputState::default()
        });
        assert!(!client.input().any());

        client.press(MoveIntent::Left);
        client.release(MoveIntent::Left);
        assert!(!client.input().any());
    }

    #[test]
    fn test_standalone_neither_records_nor_replicates() {
        let (mut pawn, _) = pawn(PawnRole::STANDALONE);
        pawn.press(MoveIntent::Forward);
        pawn.tick(DT, &at(16));

        assert!(pawn.history().dense().is_empty());
        assert!(pawn.take_replication().is_none());
        assert!(pawn.drain_outbox().is_empty());
        assert!(pawn.current_state().velocity.y < 0.0);
    }

    #[test]
    fn test_simulated_proxy_only_smooths() {
        let (mut pawn, _) = pawn(PawnRole::SIMULATED);
        pawn.press(MoveIntent::Forward);
        pawn.on_submit_input(InputState {
            forward: true,
            ..InputState::default()
        });
        pawn.tick(DT, &at(16));

        assert!(!pawn.input().any());
        assert!(pawn.history().dense().is_empty());
        assert!(pawn.take_replication().is_none());
        assert!(pawn.drain_outbox().is_empty());
        assert_eq!(*pawn.current_state(), PhysicsState::default());
    }

    #[test]
    fn test_custom_body_drives_prediction() {
        let sink = Arc::new(RecordingSink::new());
        let start = PhysicsState::at(Vec3::new(0.0, 0.0, 5.0));
        let mut pawn = NetPawn::with_body(
            PawnRole::STANDALONE,
            &Config::default(),
            Box::new(KinematicBody::new(start, 0.0)),
            sink,
        );
        assert_eq!(*pawn.current_state(), start);
        assert_eq!(*pawn.rendered_state(), start);

        pawn.press(MoveIntent::Right);
        pawn.tick(0.5, &at(500));

        // Undamped: v = 15 * 0.5, x = v * 0.5.
        let state = *pawn.current_state();
        assert_eq!(state.velocity, Vec3::new(7.5, 0.0, 0.0));
        assert_eq!(state.position, Vec3::new(3.75, 0.0, 5.0));
    }

    #[test]
    fn test_rendered_state_trails_simulation() {
        let (mut pawn, _) = pawn(PawnRole::STANDALONE);
        pawn.press(MoveIntent::Right);
        for t in 1..=30 {
            pawn.tick(DT, &at(16 * t));
        }
        let simulated = pawn.current_state().position.x;
        let rendered = pawn.rendered_state().position.x;
        assert!(rendered > 0.0);
        assert!(rendered < simulated);
    }

    #[test]
    fn test_visible_correction_starts_smoothing() {
        let (mut pawn, sink) = pawn(PawnRole::AUTONOMOUS);
        for t in [10, 20, 30] {
            pawn.tick(DT, &at(t));
        }
        let correction = Move::new(
            10,
            PhysicsState::at(Vec3::new(5.0, 0.0, 0.0)),
            InputState::default(),
            DT,
        );

        let outcome = pawn.on_server_move(&correction, &at(30));

        assert_eq!(outcome, CorrectionOutcome::Reconciled { replayed: 2 });
        assert_eq!(pawn.blend_rate(), 0.1);
        assert!((pawn.current_state().position.x - 5.0).abs() < 1e-3);
        assert_eq!(
            sink.count(|e| matches!(e, NetEvent::SmoothingStarted { position_error } if *position_error > 4.9)),
            1
        );
    }

    #[test]
    fn test_correction_after_offset_change_leaves_other_axes_untouched() {
        let (mut corrected, _) = pawn(PawnRole::AUTONOMOUS);
        let (mut reference, _) = pawn(PawnRole::AUTONOMOUS);
        for p in [&mut corrected, &mut reference] {
            p.press(MoveIntent::Right);
            for t in [16, 33, 50] {
                p.tick(DT, &at(t));
            }
        }

        let mut correction = *corrected.history().dense().oldest().unwrap();
        correction.state.position.z += 1.0;
        // The clock offset moved since the newest move was stamped.
        let shifted = FixedTime {
            local_ms: 50,
            offset_ms: 40,
        };
        let outcome = corrected.on_server_move(&correction, &shifted);
        assert_eq!(outcome, CorrectionOutcome::Reconciled { replayed: 2 });
        assert_eq!(
            corrected.current_state().position.x,
            reference.current_state().position.x
        );

        corrected.tick(DT, &at(66));
        reference.tick(DT, &at(66));

        let c = *corrected.current_state();
        let r = *reference.current_state();
        assert_eq!(c.position.x, r.position.x);
        assert_eq!(c.position.y, r.position.y);
        assert_eq!(c.velocity, r.velocity);
        assert_eq!(c.orientation, r.orientation);
        assert_eq!(c.position.z, 1.0);
    }

    #[test]
    fn test_small_correction_keeps_blend_rate() {
        let (mut pawn, sink) = pawn(PawnRole::AUTONOMOUS);
        for t in [10, 20] {
            pawn.tick(DT, &at(t));
        }
        let correction = Move::new(
            10,
            PhysicsState::at(Vec3::new(0.01, 0.0, 0.0)),
            InputState::default(),
            DT,
        );

        let outcome = pawn.on_server_move(&correction, &at(20));

        assert!(matches!(outcome, CorrectionOutcome::Reconciled { .. }));
        assert_eq!(pawn.blend_rate(), 0.25);
        assert_eq!(
            sink.count(|e| matches!(e, NetEvent::SmoothingStarted { .. })),
            0
        );
    }

    #[test]
    fn test_client_follows_authority_snapshots() {
        let config = Config::default();
        let sink: Arc<RecordingSink> = Arc::new(RecordingSink::new());
        let mut client = NetPawn::new(
            PawnRole::AUTONOMOUS,
            &config,
            PhysicsState::default(),
            sink.clone(),
        );
        // The authority disagrees about where the cube started.
        let mut authority = NetPawn::new(
            PawnRole::AUTHORITY,
            &config,
            PhysicsState::at(Vec3::new(0.0, 0.0, 2.0)),
            sink.clone(),
        );

        client.press(MoveIntent::Right);
        for tick in 1..=20 {
            let now = at(tick * 16);
            client.tick(DT, &now);
            for msg in client.drain_outbox() {
                if let NetMessage::SubmitInput(input) = msg {
                    authority.on_submit_input(input);
                }
            }
            authority.tick(DT, &now);
            if let Some(snapshot) = authority.take_replication() {
                client.on_server_move(&snapshot, &now);
            }
        }

        assert_eq!(*client.current_state(), *authority.current_state());
        assert_eq!(
            sink.count(|e| matches!(e, NetEvent::CorrectionConfirmed { .. })),
            19
        );
    }
}
