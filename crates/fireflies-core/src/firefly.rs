//! Firefly motion, blinking and lifecycle, one fixed-size step at a time.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::fmt;

use crate::config::FireflySettings;
use crate::lantern::Lantern;
use crate::vector::{Vec2, wrap_toroidal};

/// Unique firefly identity; assigned monotonically and never reused.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct FireflyId(pub u64);

impl FireflyId {
    /// Returns the next sequential id.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for FireflyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable state a firefly publishes every tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FireflyState {
    pub id: FireflyId,
    pub position: Vec2,
    /// Glow in `[0, 1]`.
    pub brightness: f32,
    /// `false` on the final emission of a firefly's life.
    pub alive: bool,
}

/// Environment a firefly reads during one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forces<'a> {
    pub lanterns: &'a [Lantern],
    pub attraction: Option<Vec2>,
    pub wind: Option<Vec2>,
}

/// Outcome of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vitality {
    Alive,
    /// Age passed the lifespan; the firefly must publish a final state and stop.
    Expired,
}

/// One autonomous firefly. Owned and mutated exclusively by its own task.
#[derive(Debug, Clone)]
pub struct Firefly {
    id: FireflyId,
    position: Vec2,
    velocity: Vec2,
    brightness: f32,
    blink_phase: f32,
    blink_cycle: f32,
    age: f32,
    lifespan: f32,
    settings: FireflySettings,
    bounds: Vec2,
}

impl Firefly {
    /// Create a firefly at `position` heading in a random direction at base speed.
    pub fn spawn<R: Rng + ?Sized>(
        id: FireflyId,
        position: Vec2,
        settings: &FireflySettings,
        bounds: Vec2,
        rng: &mut R,
    ) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::random_unit(rng) * settings.speed,
            brightness: 0.0,
            blink_phase: 0.0,
            blink_cycle: rng.random_range(settings.blink_cycle_min..=settings.blink_cycle_max),
            age: 0.0,
            lifespan: rng.random_range(settings.lifespan_min..=settings.lifespan_max),
            settings: *settings,
            bounds,
        }
    }

    #[must_use]
    pub const fn id(&self) -> FireflyId {
        self.id
    }

    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    #[must_use]
    pub const fn velocity(&self) -> Vec2 {
        self.velocity
    }

    #[must_use]
    pub const fn brightness(&self) -> f32 {
        self.brightness
    }

    #[must_use]
    pub const fn age(&self) -> f32 {
        self.age
    }

    #[must_use]
    pub const fn lifespan(&self) -> f32 {
        self.lifespan
    }

    /// Snapshot of the publishable state.
    #[must_use]
    pub const fn state(&self, alive: bool) -> FireflyState {
        FireflyState {
            id: self.id,
            position: self.position,
            brightness: self.brightness,
            alive,
        }
    }

    /// Advance the firefly by `dt` seconds.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        dt: f32,
        forces: &Forces<'_>,
        rng: &mut R,
    ) -> Vitality {
        self.advance_blink(dt, rng);
        self.wander(rng);
        for lantern in forces.lanterns {
            self.velocity += lantern.pull_on(self.position, self.settings.lantern_influence);
        }
        if let Some(point) = forces.attraction {
            self.velocity += self.attraction_pull(point);
        }
        if let Some(wind) = forces.wind {
            self.velocity += wind * self.settings.wind_resistance;
        }

        self.position = wrap_toroidal(
            self.position + self.velocity * dt,
            self.bounds.x,
            self.bounds.y,
        );
        self.velocity = self.velocity.clamp_length(self.settings.speed * 2.0);

        self.age += dt;
        if self.age > self.lifespan {
            Vitality::Expired
        } else {
            Vitality::Alive
        }
    }

    fn advance_blink<R: Rng + ?Sized>(&mut self, dt: f32, rng: &mut R) {
        self.blink_phase += dt / self.blink_cycle;
        if self.blink_phase > 1.0 {
            self.blink_phase = 0.0;
            self.blink_cycle = rng
                .random_range(self.settings.blink_cycle_min..=self.settings.blink_cycle_max);
        }
        self.brightness = ((self.blink_phase * TAU).sin() + 1.0) / 2.0;
    }

    fn wander<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if rng.random_bool(self.settings.wander_probability) {
            self.velocity += Vec2::random_unit(rng) * self.settings.wander_impulse;
        }
    }

    /// Constant-magnitude pull toward `point`, absent inside the dead zone.
    fn attraction_pull(&self, point: Vec2) -> Vec2 {
        if self.position.distance(point) <= self.settings.attraction_dead_zone {
            return Vec2::ZERO;
        }
        (point - self.position).normalized() * self.settings.attraction_force
    }
}
