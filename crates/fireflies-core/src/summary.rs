//! Aggregate statistics over a snapshot of firefly states.

use serde::{Deserialize, Serialize};

use crate::firefly::{FireflyId, FireflyState};
use crate::vector::Vec2;

/// Population-wide view of a snapshot, cheap enough to compute off the hot path.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SwarmSummary {
    pub count: usize,
    pub mean_brightness: f32,
    pub centroid: Vec2,
    /// Mean distance from the centroid.
    pub spread: f32,
    pub brightest: Option<FireflyId>,
}

impl SwarmSummary {
    /// Summarise the live states in `states`; entries with `alive == false` are ignored.
    #[must_use]
    pub fn from_states(states: &[FireflyState]) -> Self {
        let live: Vec<&FireflyState> = states.iter().filter(|state| state.alive).collect();
        if live.is_empty() {
            return Self::default();
        }

        let count = live.len();
        let inv = 1.0 / count as f32;
        let mut brightness_sum = 0.0_f32;
        let mut position_sum = Vec2::ZERO;
        let mut brightest: Option<&FireflyState> = None;
        for state in &live {
            brightness_sum += state.brightness;
            position_sum += state.position;
            if brightest.is_none_or(|best| state.brightness > best.brightness) {
                brightest = Some(state);
            }
        }

        let centroid = position_sum * inv;
        let spread = live
            .iter()
            .map(|state| state.position.distance(centroid))
            .sum::<f32>()
            * inv;

        Self {
            count,
            mean_brightness: brightness_sum * inv,
            centroid,
            spread,
            brightest: brightest.map(|state| state.id),
        }
    }
}
