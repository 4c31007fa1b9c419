//! Core types shared across the firefly garden workspace.
//!
//! Everything here is synchronous and deterministic given an RNG: the
//! concurrent runtime in `fireflies-app` drives these types from its tasks.

use thiserror::Error;

pub mod config;
pub mod firefly;
pub mod lantern;
pub mod summary;
pub mod vector;
pub mod wind;

pub use config::{
    ChannelSettings, FireflySettings, GardenConfig, LanternSettings, PoolSettings,
    PopulationSettings, WindSettings, WorldSettings,
};
pub use firefly::{Firefly, FireflyId, FireflyState, Forces, Vitality};
pub use lantern::Lantern;
pub use summary::SwarmSummary;
pub use vector::{Vec2, lerp, wrap_toroidal};
pub use wind::{WindDirection, WindState};

/// Errors raised while loading or validating a [`GardenConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent with another.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    /// The configuration file could not be read.
    #[error("failed to read configuration from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
