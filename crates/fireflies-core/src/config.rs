//! Tunable parameters for a firefly garden.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::ConfigError;

/// Master configuration for a garden run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GardenConfig {
    /// Logical world bounds and tick rate.
    pub world: WorldSettings,
    /// Spawning policy and population limits.
    pub population: PopulationSettings,
    /// Per-firefly motion and lifecycle parameters.
    pub firefly: FireflySettings,
    /// Lantern placement limits and pull strength.
    pub lantern: LanternSettings,
    /// Global wind behaviour.
    pub wind: WindSettings,
    /// Bounded queue capacities.
    pub channels: ChannelSettings,
    /// Worker pool sizing.
    pub pool: PoolSettings,
    /// Optional RNG seed; `None` draws a seed from the OS.
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldSettings {
    pub width: f32,
    pub height: f32,
    /// Firefly ticks per second.
    pub tick_rate_hz: u32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            width: 1024.0,
            height: 768.0,
            tick_rate_hz: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PopulationSettings {
    /// Hard cap on live fireflies.
    pub max: usize,
    /// Population the auto-spawner tops up to.
    pub target: usize,
    /// Fireflies spawned synchronously on start.
    pub initial: usize,
    /// Whether the periodic auto-spawner runs.
    pub auto_spawn: bool,
    /// Nominal spawn period; the auto-spawner ticks at twice this rate.
    pub spawn_interval_ms: u64,
    /// Fireflies per burst (auto-spawner batches and lantern feedback).
    pub burst_size: usize,
    /// Per-axis jitter applied around a burst origin.
    pub burst_jitter: f32,
    /// Chance per auto-spawner tick of one extra firefly once the target is met.
    pub idle_spawn_probability: f64,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            max: 100,
            target: 50,
            initial: 12,
            auto_spawn: true,
            spawn_interval_ms: 2_000,
            burst_size: 6,
            burst_jitter: 40.0,
            idle_spawn_probability: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FireflySettings {
    /// Base speed; velocity is clamped to twice this.
    pub speed: f32,
    /// Shortest blink cycle in seconds.
    pub blink_cycle_min: f32,
    /// Longest blink cycle in seconds.
    pub blink_cycle_max: f32,
    /// Constant pull toward the attraction point.
    pub attraction_force: f32,
    /// No attraction pull closer than this distance.
    pub attraction_dead_zone: f32,
    /// Fraction of the wind force applied each tick.
    pub wind_resistance: f32,
    /// Shortest lifespan in seconds.
    pub lifespan_min: f32,
    /// Longest lifespan in seconds.
    pub lifespan_max: f32,
    /// Chance per tick of a random impulse.
    pub wander_probability: f64,
    /// Magnitude of the random impulse.
    pub wander_impulse: f32,
    /// Lantern pull at the lantern centre (falls off linearly to the radius).
    pub lantern_influence: f32,
}

impl Default for FireflySettings {
    fn default() -> Self {
        Self {
            speed: 1.5,
            blink_cycle_min: 1.0,
            blink_cycle_max: 3.0,
            attraction_force: 0.3,
            attraction_dead_zone: 10.0,
            wind_resistance: 0.5,
            lifespan_min: 12.0,
            lifespan_max: 30.0,
            wander_probability: 0.05,
            wander_impulse: 0.2,
            lantern_influence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LanternSettings {
    pub max: usize,
    pub radius: f32,
}

impl Default for LanternSettings {
    fn default() -> Self {
        Self {
            max: 10,
            radius: 120.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindSettings {
    /// Period between random direction changes.
    pub change_interval_ms: u64,
    /// Magnitude of the wind force vector.
    pub strength: f32,
}

impl Default for WindSettings {
    fn default() -> Self {
        Self {
            change_interval_ms: 5_000,
            strength: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelSettings {
    pub state_buffer: usize,
    pub command_buffer: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            state_buffer: 200,
            command_buffer: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolSettings {
    pub workers: usize,
    pub job_buffer: usize,
    pub result_buffer: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            job_buffer: 100,
            result_buffer: 100,
        }
    }
}

impl GardenConfig {
    /// Load configuration from a JSON file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FIREFLIES_*` environment overrides on top of the current values.
    ///
    /// Reads:
    /// - FIREFLIES_MAX: population cap
    /// - FIREFLIES_TARGET: auto-spawner target
    /// - FIREFLIES_INITIAL: initial population
    /// - FIREFLIES_SEED: RNG seed
    pub fn apply_env_overrides(&mut self) {
        if let Some(max) = env_parse("FIREFLIES_MAX") {
            self.population.max = max;
        }
        if let Some(target) = env_parse("FIREFLIES_TARGET") {
            self.population.target = target;
        }
        if let Some(initial) = env_parse("FIREFLIES_INITIAL") {
            self.population.initial = initial;
        }
        if let Some(seed) = env_parse("FIREFLIES_SEED") {
            self.rng_seed = Some(seed);
        }
    }

    /// Check every value the runtime depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let world = &self.world;
        if !(world.width > 0.0 && world.height > 0.0) {
            return Err(ConfigError::Invalid("world dimensions must be positive"));
        }
        if world.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("tick_rate_hz must be non-zero"));
        }

        let population = &self.population;
        if population.max == 0 {
            return Err(ConfigError::Invalid("population.max must be non-zero"));
        }
        if population.target > population.max || population.initial > population.max {
            return Err(ConfigError::Invalid(
                "population target and initial count cannot exceed population.max",
            ));
        }
        if population.spawn_interval_ms < 2 {
            return Err(ConfigError::Invalid(
                "spawn_interval_ms must be at least 2",
            ));
        }
        if population.burst_jitter < 0.0 {
            return Err(ConfigError::Invalid("burst_jitter must be non-negative"));
        }
        if !(0.0..=1.0).contains(&population.idle_spawn_probability) {
            return Err(ConfigError::Invalid(
                "idle_spawn_probability must be within [0, 1]",
            ));
        }

        let firefly = &self.firefly;
        if firefly.speed <= 0.0 {
            return Err(ConfigError::Invalid("firefly.speed must be positive"));
        }
        if firefly.blink_cycle_min <= 0.0 || firefly.blink_cycle_min > firefly.blink_cycle_max {
            return Err(ConfigError::Invalid(
                "blink cycle bounds must be positive and ordered",
            ));
        }
        if firefly.lifespan_min <= 0.0 || firefly.lifespan_min > firefly.lifespan_max {
            return Err(ConfigError::Invalid(
                "lifespan bounds must be positive and ordered",
            ));
        }
        if !(0.0..=1.0).contains(&firefly.wander_probability) {
            return Err(ConfigError::Invalid(
                "wander_probability must be within [0, 1]",
            ));
        }
        if firefly.attraction_force < 0.0
            || firefly.attraction_dead_zone < 0.0
            || firefly.wind_resistance < 0.0
            || firefly.wander_impulse < 0.0
            || firefly.lantern_influence < 0.0
        {
            return Err(ConfigError::Invalid(
                "firefly force parameters must be non-negative",
            ));
        }

        if self.lantern.radius <= 0.0 {
            return Err(ConfigError::Invalid("lantern.radius must be positive"));
        }
        if self.wind.change_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "wind.change_interval_ms must be non-zero",
            ));
        }
        if self.wind.strength < 0.0 {
            return Err(ConfigError::Invalid("wind.strength must be non-negative"));
        }
        if self.channels.state_buffer == 0 || self.channels.command_buffer == 0 {
            return Err(ConfigError::Invalid("channel buffers must be non-zero"));
        }
        if self.pool.workers == 0 || self.pool.job_buffer == 0 || self.pool.result_buffer == 0 {
            return Err(ConfigError::Invalid(
                "pool workers and buffers must be non-zero",
            ));
        }
        Ok(())
    }

    /// Wall-clock period between firefly ticks.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.world.tick_rate_hz.max(1)))
    }

    /// Simulated seconds advanced per firefly tick.
    #[must_use]
    pub fn dt(&self) -> f32 {
        1.0 / self.world.tick_rate_hz.max(1) as f32
    }

    /// Period of the auto-spawner (twice the nominal spawn rate).
    #[must_use]
    pub fn auto_spawn_interval(&self) -> Duration {
        Duration::from_millis((self.population.spawn_interval_ms / 2).max(1))
    }

    #[must_use]
    pub fn wind_interval(&self) -> Duration {
        Duration::from_millis(self.wind.change_interval_ms.max(1))
    }

    /// Returns the configured RNG, drawing a seed from the OS if none is set.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
}
