use std::sync::Arc;
use std::time::Duration;

use fireflies_core::{Vec2, WindDirection, WindState};
use parking_lot::RwLock;
use rand::rngs::SmallRng;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::shutdown::Shutdown;

/// Wind state shared between the wind task, firefly tasks and the manager.
#[derive(Debug, Clone)]
pub struct SharedWind {
    inner: Arc<RwLock<WindState>>,
}

impl SharedWind {
    #[must_use]
    pub fn new(strength: f32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(WindState::new(strength))),
        }
    }

    pub fn force(&self) -> Vec2 {
        self.inner.read().force()
    }

    pub fn direction(&self) -> WindDirection {
        self.inner.read().direction()
    }

    pub fn direction_name(&self) -> &'static str {
        self.direction().name()
    }

    pub fn snapshot(&self) -> WindState {
        *self.inner.read()
    }

    /// Rotate one compass step clockwise.
    pub fn cycle(&self) -> WindDirection {
        self.inner.write().cycle()
    }

    pub fn shuffle(&self, rng: &mut SmallRng) -> WindDirection {
        self.inner.write().shuffle(rng)
    }
}

/// Re-roll the wind direction every `interval` until shutdown.
pub async fn run_wind(
    wind: SharedWind,
    interval: Duration,
    mut shutdown: Shutdown,
    mut rng: SmallRng,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let direction = wind.shuffle(&mut rng);
                debug!(direction = direction.name(), "wind changed");
            }
        }
    }
}
