//! 2D vector arithmetic and the small numeric helpers used by the simulation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

const FULL_TURN: f32 = std::f32::consts::TAU;

/// Point or direction in garden space (x grows right, y grows down).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Construct a new vector.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    /// Unit vector pointing the same way; the zero vector stays zero.
    #[must_use]
    pub fn normalized(self) -> Self {
        let length = self.length();
        if length == 0.0 {
            return Self::ZERO;
        }
        Self::new(self.x / length, self.y / length)
    }

    /// Distance between two points.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Rescale so the length never exceeds `max`.
    #[must_use]
    pub fn clamp_length(self, max: f32) -> Self {
        if self.length() > max {
            self.normalized() * max
        } else {
            self
        }
    }

    /// Unit vector with a uniformly random heading.
    pub fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let angle = rng.random_range(0.0..FULL_TURN);
        Self::new(angle.cos(), angle.sin())
    }

    /// Uniform point inside `[0, width) x [0, height)`.
    pub fn random_in<R: Rng + ?Sized>(rng: &mut R, width: f32, height: f32) -> Self {
        Self::new(rng.random_range(0.0..width), rng.random_range(0.0..height))
    }

    /// Offset by an independent uniform amount in `[-radius, radius]` on each axis.
    #[must_use]
    pub fn jitter<R: Rng + ?Sized>(self, rng: &mut R, radius: f32) -> Self {
        if radius <= 0.0 {
            return self;
        }
        Self::new(
            self.x + rng.random_range(-radius..=radius),
            self.y + rng.random_range(-radius..=radius),
        )
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, scalar: f32) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

/// Toroidal wrap: leaving one edge re-enters from the opposite edge.
#[must_use]
pub fn wrap_toroidal(position: Vec2, width: f32, height: f32) -> Vec2 {
    Vec2::new(wrap_axis(position.x, width), wrap_axis(position.y, height))
}

fn wrap_axis(value: f32, extent: f32) -> f32 {
    if extent <= 0.0 || value.is_nan() {
        return 0.0;
    }
    let wrapped = value.rem_euclid(extent);
    // rem_euclid can round up to `extent` for tiny negative inputs
    if wrapped >= extent { 0.0 } else { wrapped }
}

/// Linear interpolation between `a` and `b`.
#[must_use]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
