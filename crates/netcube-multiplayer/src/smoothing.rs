//! Rendered-state smoothing.
//!
//! The simulated state snaps on every correction; the rendered state chases
//! it. After a visible correction the chase slows to `correction_blend_rate`
//! and then relaxes back toward `default_blend_rate` over time.

use netcube_config::SmoothingConfig;

use crate::state::{DifferenceThresholds, PhysicsState};

/// Blends a rendered state toward the simulated one.
#[derive(Debug, Clone)]
pub struct Smoother {
    rendered: PhysicsState,
    blend_rate: f32,
    default_blend_rate: f32,
    correction_blend_rate: f32,
    thresholds: DifferenceThresholds,
}

impl Smoother {
    /// Smoother starting at `initial`, at the default blend rate.
    pub fn new(config: &SmoothingConfig, initial: PhysicsState) -> Self {
        Self {
            rendered: initial,
            blend_rate: config.default_blend_rate,
            default_blend_rate: config.default_blend_rate,
            correction_blend_rate: config.correction_blend_rate,
            thresholds: DifferenceThresholds {
                position: config.position_threshold,
                rotation: config.rotation_threshold,
            },
        }
    }

    /// Move the rendered state `blend_rate` of the way toward `current`.
    pub fn blend_toward(&mut self, current: &PhysicsState) {
        self.rendered = PhysicsState::interpolate(&self.rendered, current, self.blend_rate);
    }

    /// Relax the blend rate toward its default over `dt` seconds.
    pub fn relax(&mut self, dt: f32) {
        self.blend_rate += (self.default_blend_rate - self.blend_rate) * dt;
    }

    /// Whether a correction from `before` to `after` is large enough to smooth.
    pub fn is_visible_correction(&self, before: &PhysicsState, after: &PhysicsState) -> bool {
        before.differs_significantly(after, self.thresholds)
    }

    /// Install the post-correction blend rate.
    pub fn begin_smoothing(&mut self) {
        self.blend_rate = self.correction_blend_rate;
    }

    /// What should be drawn.
    pub fn rendered(&self) -> &PhysicsState {
        &self.rendered
    }

    /// Current blend factor.
    pub fn blend_rate(&self) -> f32 {
        self.blend_rate
    }
}
