//! Physics integration seam and the deterministic reference body.

use glam::{Quat, Vec3};

use crate::state::{InputState, PhysicsState};

/// The rigid body driven by prediction.
///
/// Implementations must be deterministic: the same state, deltas, and step
/// must always produce the same resulting state.
pub trait PhysicsBody: Send + Sync {
    /// Current snapshot.
    fn state(&self) -> PhysicsState;

    /// Overwrite the body with `state`.
    fn set_state(&mut self, state: PhysicsState);

    /// Add `linear_delta` / `angular_delta` to the velocities and advance by `dt`.
    fn apply_velocity_delta(&mut self, linear_delta: Vec3, angular_delta: Vec3, dt: f32);
}

/// Linear acceleration produced by the held intents.
///
/// Left is -X, right +X, forward -Y, backward +Y. Opposing intents cancel.
pub fn acceleration_for(input: &InputState, force_strength: f32) -> Vec3 {
    let mut accel = Vec3::ZERO;
    if input.left {
        accel.x -= force_strength;
    }
    if input.right {
        accel.x += force_strength;
    }
    if input.forward {
        accel.y -= force_strength;
    }
    if input.backward {
        accel.y += force_strength;
    }
    accel
}

/// Semi-implicit Euler body with linear damping and no collisions.
#[derive(Debug, Clone, Default)]
pub struct KinematicBody {
    state: PhysicsState,
    linear_damping: f32,
}

impl KinematicBody {
    /// Body at `state` with the given damping coefficient (1/s).
    pub fn new(state: PhysicsState, linear_damping: f32) -> Self {
        Self {
            state,
            linear_damping,
        }
    }
}

impl PhysicsBody for KinematicBody {
    fn state(&self) -> PhysicsState {
        self.state
    }

    fn set_state(&mut self, state: PhysicsState) {
        self.state = state;
    }

    fn apply_velocity_delta(&mut self, linear_delta: Vec3, angular_delta: Vec3, dt: f32) {
        let s = &mut self.state;
        s.velocity += linear_delta;
        s.angular_velocity += angular_delta;

        if self.linear_damping > 0.0 {
            s.velocity *= (1.0 - self.linear_damping * dt).max(0.0);
        }

        s.position += s.velocity * dt;

        // Orientation is untouched at rest.
        if s.angular_velocity != Vec3::ZERO {
            let angle = s.angular_velocity.length() * dt;
            let spin = Quat::from_axis_angle(s.angular_velocity.normalize(), angle);
            s.orientation = (spin * s.orientation).normalize();
        }
    }
}
