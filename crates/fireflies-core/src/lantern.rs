//! Static, pulsing attractors placed by the user.

use serde::{Deserialize, Serialize};

use crate::vector::{Vec2, lerp};

/// A lantern pulls nearby fireflies toward its centre.
///
/// Lanterns have no task of their own; the manager owns the list and advances
/// pulses under its write lock. Fireflies only ever see a copied snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Lantern {
    position: Vec2,
    radius: f32,
    pulse_phase: f32,
}

impl Lantern {
    #[must_use]
    pub const fn new(position: Vec2, radius: f32) -> Self {
        Self {
            position,
            radius,
            pulse_phase: 0.0,
        }
    }

    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    #[must_use]
    pub const fn radius(&self) -> f32 {
        self.radius
    }

    #[must_use]
    pub const fn pulse_phase(&self) -> f32 {
        self.pulse_phase
    }

    /// Advance the pulse animation; the phase wraps back to zero past 1.0.
    pub fn update(&mut self, dt: f32) {
        self.pulse_phase += dt * 2.0;
        if self.pulse_phase > 1.0 {
            self.pulse_phase = 0.0;
        }
    }

    /// Glow intensity in `[0.7, 1.0]`, rising with the pulse phase.
    #[must_use]
    pub fn intensity(&self) -> f32 {
        lerp(0.7, 1.0, self.pulse_phase)
    }

    /// Force this lantern exerts on a firefly at `point`.
    ///
    /// Zero at and beyond the radius and within one unit of the centre;
    /// otherwise `influence * (radius - d) / radius` toward the centre.
    #[must_use]
    pub fn pull_on(&self, point: Vec2, influence: f32) -> Vec2 {
        let distance = point.distance(self.position);
        if distance <= 1.0 || distance >= self.radius {
            return Vec2::ZERO;
        }
        let falloff = (self.radius - distance) / self.radius;
        (self.position - point).normalized() * (influence * falloff)
    }
}
