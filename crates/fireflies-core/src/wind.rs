//! Global wind: a compass direction and the force vector derived from it.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::fmt;

use crate::vector::Vec2;

/// Symbolic wind direction. Screen space: north points toward negative y.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum WindDirection {
    #[default]
    None,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl WindDirection {
    /// The eight blowing directions in clockwise order starting at north.
    pub const COMPASS: [Self; 8] = [
        Self::North,
        Self::NorthEast,
        Self::East,
        Self::SouthEast,
        Self::South,
        Self::SouthWest,
        Self::West,
        Self::NorthWest,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::North => "North",
            Self::NorthEast => "NorthEast",
            Self::East => "East",
            Self::SouthEast => "SouthEast",
            Self::South => "South",
            Self::SouthWest => "SouthWest",
            Self::West => "West",
            Self::NorthWest => "NorthWest",
        }
    }

    /// Heading in radians; `None` reports 0 but has no force.
    #[must_use]
    pub const fn angle(self) -> f32 {
        match self {
            Self::None | Self::East => 0.0,
            Self::North => -FRAC_PI_2,
            Self::South => FRAC_PI_2,
            Self::West => PI,
            Self::NorthEast => -FRAC_PI_4,
            Self::NorthWest => -3.0 * FRAC_PI_4,
            Self::SouthEast => FRAC_PI_4,
            Self::SouthWest => 3.0 * FRAC_PI_4,
        }
    }

    /// Unit vector for the direction; zero for `None`.
    #[must_use]
    pub fn unit(self) -> Vec2 {
        if self == Self::None {
            return Vec2::ZERO;
        }
        let angle = self.angle();
        Vec2::new(angle.cos(), angle.sin())
    }

    /// Next direction clockwise; `None` starts the cycle at north.
    #[must_use]
    pub fn next_clockwise(self) -> Self {
        let next = Self::COMPASS
            .iter()
            .position(|&direction| direction == self)
            .map_or(0, |idx| (idx + 1) % Self::COMPASS.len());
        Self::COMPASS[next]
    }

    /// Uniformly random blowing direction (never `None`).
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::COMPASS[rng.random_range(0..Self::COMPASS.len())]
    }
}

impl fmt::Display for WindDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current wind: direction, strength and the derived force.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WindState {
    direction: WindDirection,
    strength: f32,
    force: Vec2,
}

impl WindState {
    /// Wind starts blowing east at full strength.
    #[must_use]
    pub fn new(strength: f32) -> Self {
        let mut state = Self {
            direction: WindDirection::East,
            strength,
            force: Vec2::ZERO,
        };
        state.set_direction(WindDirection::East);
        state
    }

    #[must_use]
    pub const fn direction(&self) -> WindDirection {
        self.direction
    }

    #[must_use]
    pub const fn strength(&self) -> f32 {
        self.strength
    }

    #[must_use]
    pub const fn force(&self) -> Vec2 {
        self.force
    }

    pub fn set_direction(&mut self, direction: WindDirection) {
        self.direction = direction;
        self.force = direction.unit() * self.strength;
    }

    /// Advance one step clockwise and return the new direction.
    pub fn cycle(&mut self) -> WindDirection {
        self.set_direction(self.direction.next_clockwise());
        self.direction
    }

    /// Jump to a random blowing direction and return it.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> WindDirection {
        self.set_direction(WindDirection::random(rng));
        self.direction
    }
}
