//! Physics snapshots, input flags, and recorded moves.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PhysicsState
// ---------------------------------------------------------------------------

/// Full rigid-body snapshot of the pawn.
///
/// `PartialEq` is exact, component-wise equality. Use
/// [`differs_significantly`](Self::differs_significantly) for a tolerant
/// comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsState {
    /// World position.
    pub position: Vec3,
    /// Linear velocity.
    pub velocity: Vec3,
    /// Angular velocity (axis * rad/s).
    pub angular_velocity: Vec3,
    /// Orientation. Always a unit quaternion.
    pub orientation: Quat,
}

impl Default for PhysicsState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

/// Tolerances for [`PhysicsState::differs_significantly`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferenceThresholds {
    /// Position distance (m).
    pub position: f32,
    /// Norm of the component-wise quaternion difference.
    pub rotation: f32,
}

impl Default for DifferenceThresholds {
    fn default() -> Self {
        Self {
            position: 0.1,
            rotation: 0.1,
        }
    }
}

impl PhysicsState {
    /// State at rest at `position`.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Whether `other` is visibly different from `self`.
    ///
    /// Compares the squared position delta and the squared norm of the
    /// quaternion component difference against the squared thresholds.
    pub fn differs_significantly(&self, other: &Self, thresholds: DifferenceThresholds) -> bool {
        let position_sq = (other.position - self.position).length_squared();
        let rotation_sq = (other.orientation - self.orientation).length_squared();
        position_sq > thresholds.position * thresholds.position
            || rotation_sq > thresholds.rotation * thresholds.rotation
    }

    /// Blend from `from` toward `to`: vectors lerp, orientation slerps.
    pub fn interpolate(from: &Self, to: &Self, alpha: f32) -> Self {
        Self {
            position: from.position.lerp(to.position, alpha),
            velocity: from.velocity.lerp(to.velocity, alpha),
            angular_velocity: from.angular_velocity.lerp(to.angular_velocity, alpha),
            orientation: from.orientation.slerp(to.orientation, alpha),
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One of the four movement intents a player can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveIntent {
    /// Push toward -Y.
    Forward,
    /// Push toward +Y.
    Backward,
    /// Push toward -X.
    Left,
    /// Push toward +X.
    Right,
}

impl MoveIntent {
    /// All intents, in a fixed order.
    pub const ALL: [MoveIntent; 4] = [Self::Forward, Self::Backward, Self::Left, Self::Right];
}

/// Held movement intents. Opposite directions may be held at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputState {
    /// Forward held.
    pub forward: bool,
    /// Backward held.
    pub backward: bool,
    /// Left held.
    pub left: bool,
    /// Right held.
    pub right: bool,
}

impl InputState {
    /// Whether `intent` is held.
    pub fn is_pressed(&self, intent: MoveIntent) -> bool {
        match intent {
            MoveIntent::Forward => self.forward,
            MoveIntent::Backward => self.backward,
            MoveIntent::Left => self.left,
            MoveIntent::Right => self.right,
        }
    }

    /// Set `intent` to `pressed`.
    pub fn set(&mut self, intent: MoveIntent, pressed: bool) {
        let flag = match intent {
            MoveIntent::Forward => &mut self.forward,
            MoveIntent::Backward => &mut self.backward,
            MoveIntent::Left => &mut self.left,
            MoveIntent::Right => &mut self.right,
        };
        *flag = pressed;
    }

    /// Whether any intent is held.
    pub fn any(&self) -> bool {
        MoveIntent::ALL.iter().any(|&intent| self.is_pressed(intent))
    }
}

// ---------------------------------------------------------------------------
// Move
// ---------------------------------------------------------------------------

/// A timestamped record of the state reached after one simulation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Move {
    /// Network time (client) or local time (authority) in milliseconds.
    pub timestamp_ms: i32,
    /// State after the step.
    pub state: PhysicsState,
    /// Input active during the step.
    pub input: InputState,
    /// Length of the step that produced `state`.
    pub delta_seconds: f32,
}

impl Move {
    /// Creates a move record.
    pub fn new(timestamp_ms: i32, state: PhysicsState, input: InputState, delta_seconds: f32) -> Self {
        Self {
            timestamp_ms,
            state,
            input,
            delta_seconds,
        }
    }
}
