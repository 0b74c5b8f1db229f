//! Client-side prediction: apply input to the local body immediately.
//!
//! Both peers run the same step, so given identical input, deltas, and
//! starting state, the client's prediction matches the authority bit for bit.

use glam::Vec3;
use netcube_config::MovementConfig;

use crate::physics::{KinematicBody, PhysicsBody, acceleration_for};
use crate::state::{InputState, PhysicsState};

/// Steps a [`PhysicsBody`] from input and tracks the resulting state.
pub struct PredictionEngine {
    body: Box<dyn PhysicsBody>,
    current: PhysicsState,
    force_strength: f32,
}

impl PredictionEngine {
    /// Engine driving `body`.
    pub fn new(body: Box<dyn PhysicsBody>, force_strength: f32) -> Self {
        let current = body.state();
        Self {
            body,
            current,
            force_strength,
        }
    }

    /// Engine over a [`KinematicBody`] at `initial`, configured from the movement section.
    pub fn kinematic(config: &MovementConfig, initial: PhysicsState) -> Self {
        Self::new(
            Box::new(KinematicBody::new(initial, config.linear_damping)),
            config.force_strength,
        )
    }

    /// Simulate one step of `delta_seconds` under `input`.
    pub fn step(&mut self, input: &InputState, delta_seconds: f32) -> PhysicsState {
        let accel = acceleration_for(input, self.force_strength);
        // The cube has no torque source.
        let angular_accel = Vec3::ZERO;

        self.body
            .apply_velocity_delta(accel * delta_seconds, angular_accel * delta_seconds, delta_seconds);
        self.current = self.body.state();
        self.current
    }

    /// Set body and current state directly.
    pub fn snap(&mut self, state: PhysicsState) {
        self.body.set_state(state);
        self.current = state;
    }

    /// State after the last step or snap.
    pub fn current(&self) -> &PhysicsState {
        &self.current
    }
}

impl std::fmt::Debug for PredictionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionEngine")
            .field("current", &self.current)
            .field("force_strength", &self.force_strength)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn engine() -> PredictionEngine {
        PredictionEngine::kinematic(&MovementConfig::default(), PhysicsState::default())
    }

    fn right() -> InputState {
        InputState {
            right: true,
            ..InputState::default()
        }
    }

    #[test]
    fn test_input_applies_immediately() {
        let mut engine = engine();
        let state = engine.step(&right(), DT);
        assert!(state.velocity.x > 0.0);
        assert!(state.position.x > 0.0);
        assert_eq!(state.position.y, 0.0);
        assert_eq!(*engine.current(), state);
    }

    #[test]
    fn test_idle_input_stays_at_rest() {
        let mut engine = engine();
        for _ in 0..30 {
            engine.step(&InputState::default(), DT);
        }
        assert_eq!(*engine.current(), PhysicsState::default());
    }

    #[test]
    fn test_snap_overrides_body() {
        let mut engine = engine();
        engine.step(&right(), DT);
        let target = PhysicsState::at(Vec3::new(-3.0, 1.0, 0.0));
        engine.snap(target);
        assert_eq!(*engine.current(), target);

        // Next step continues from the snapped state.
        let next = engine.step(&InputState::default(), DT);
        assert_eq!(next.position, target.position);
    }

    #[test]
    fn test_two_engines_agree_bitwise() {
        let mut client = engine();
        let mut authority = engine();
        for tick in 0..240 {
            let input = InputState {
                forward: tick % 50 < 25,
                left: tick % 70 < 10,
                ..InputState::default()
            };
            assert_eq!(client.step(&input, DT), authority.step(&input, DT));
        }
    }
}
