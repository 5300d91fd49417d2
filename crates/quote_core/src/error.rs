//! Error types for the quoting engine.
//!
//! Only [`QuoteError`] and [`ConfigError`] reach callers. Demand model and surge
//! failures degrade to defaults inside the engine and are logged instead.

use std::path::PathBuf;

use thiserror::Error;

/// Validation failures surfaced at the public boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuoteError {
    #[error("coordinate out of range: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("invalid vehicle class: {0}")]
    InvalidVehicleClass(String),

    #[error("invalid vehicle status: {0}")]
    InvalidStatus(String),

    /// Negative or non-finite distance, duration or surge.
    #[error("invalid {name}: {value}")]
    InvalidTripMetric { name: &'static str, value: f64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum DemandModelError {
    #[error("failed to read demand model '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid demand model json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid demand model csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid region id '{0}'")]
    InvalidRegion(String),

    #[error("hour {0} out of range 0-23")]
    InvalidHour(u8),

    #[error("demand model mixes region-only and hour-resolved records")]
    MixedSchema,
}

/// Computation failures inside the surge pipeline. Never escapes
/// [`SurgeEngine::with_fallback`](crate::surge::SurgeEngine::with_fallback).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurgeError {
    #[error("non-finite demand-supply ratio (score={score}, supply={supply})")]
    NonFiniteRatio { score: f64, supply: usize },

    #[error("non-finite surge multiplier for ratio {ratio}")]
    NonFiniteMultiplier { ratio: f64 },
}
