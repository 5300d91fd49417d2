//! Engine configuration.
//!
//! Every section has defaults, so a JSON file only needs to name what it
//! changes. Call [`EngineConfig::validate`] before building an engine;
//! [`EngineConfig::from_path`] does so for you.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fleet::{VehicleClass, DEFAULT_PREFILTER_DELTA_DEG};
use crate::geo::BoundingBox;
use crate::pricing::{default_fare_table, FareRates};
use crate::ranking::{ModeWeights, RankingConfig, UserMode};
use crate::region::RegionGrid;
use crate::surge::{OverrideZone, SurgeConfig, SurgeTier};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub bbox: BoundingBox,
    /// Cells per axis.
    pub resolution: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::default(),
            resolution: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub radius_km: f64,
    pub prefilter_delta_deg: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            radius_km: 15.0,
            prefilter_delta_deg: DEFAULT_PREFILTER_DELTA_DEG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtaConfig {
    /// Speed used for vehicle-to-pickup ETAs.
    pub pickup_speed_kmh: f64,
    /// Trip speed used when no duration estimator answers.
    pub fallback_speed_kmh: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            pickup_speed_kmh: 40.0,
            fallback_speed_kmh: crate::duration::FALLBACK_SPEED_KMH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub fares: BTreeMap<VehicleClass, FareRates>,
    pub surge: SurgeConfig,
    pub ranking: RankingConfig,
    pub search: SearchConfig,
    pub eta: EtaConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            fares: default_fare_table(),
            surge: SurgeConfig::default(),
            ranking: RankingConfig::default(),
            search: SearchConfig::default(),
            eta: EtaConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file and validate it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn grid(&self) -> RegionGrid {
        RegionGrid::new(self.grid.bbox, self.grid.resolution)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.grid.bbox.is_valid() {
            return invalid(format!("bounding box is empty or inverted: {:?}", self.grid.bbox));
        }
        if self.grid.resolution == 0 {
            return invalid("grid resolution must be at least 1");
        }

        for class in VehicleClass::ALL {
            let Some(rates) = self.fares.get(&class) else {
                return invalid(format!("no fare rates for class {class}"));
            };
            let values = [rates.base_fare, rates.per_km_rate, rates.per_min_rate];
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return invalid(format!("fare rates for {class} must be finite and non-negative"));
            }
        }

        let surge = &self.surge;
        if !surge.tiers.is_monotonic() {
            return invalid("surge thresholds and multipliers must be non-decreasing");
        }
        let floor = surge.tiers.multiplier(SurgeTier::Discount);
        if !surge.cap.is_finite() || surge.cap < floor {
            return invalid(format!("surge cap {} is below the discount multiplier {floor}", surge.cap));
        }
        if !(surge.reference_peak_demand.is_finite() && surge.reference_peak_demand > 0.0) {
            return invalid("reference peak demand must be positive");
        }
        if !(floor..=surge.cap).contains(&surge.default_surge) {
            return invalid(format!(
                "default surge {} outside [{floor}, {}]",
                surge.default_surge, surge.cap
            ));
        }
        for zone in &surge.overrides {
            validate_override(zone, floor, surge.cap)?;
        }

        for mode in [UserMode::Fastest, UserMode::Cheapest, UserMode::Balanced] {
            validate_weights(mode, self.ranking.weights(mode))?;
        }
        if self.ranking.top_k == 0 {
            return invalid("ranking top_k must be at least 1");
        }

        if !(self.search.radius_km.is_finite() && self.search.radius_km >= 0.0) {
            return invalid("search radius must be non-negative");
        }
        if !(self.search.prefilter_delta_deg.is_finite() && self.search.prefilter_delta_deg > 0.0) {
            return invalid("prefilter delta must be positive");
        }
        for (name, speed) in [
            ("pickup", self.eta.pickup_speed_kmh),
            ("fallback", self.eta.fallback_speed_kmh),
        ] {
            if !(speed.is_finite() && speed > 0.0) {
                return invalid(format!("{name} speed must be positive"));
            }
        }
        Ok(())
    }

    pub fn with_grid(mut self, bbox: BoundingBox, resolution: u32) -> Self {
        self.grid = GridConfig { bbox, resolution };
        self
    }

    pub fn with_fare(mut self, class: VehicleClass, rates: FareRates) -> Self {
        self.fares.insert(class, rates);
        self
    }

    pub fn with_surge(mut self, surge: SurgeConfig) -> Self {
        self.surge = surge;
        self
    }

    pub fn with_override(mut self, zone: OverrideZone) -> Self {
        self.surge.overrides.push(zone);
        self
    }

    pub fn with_ranking(mut self, ranking: RankingConfig) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.ranking.top_k = top_k;
        self
    }

    pub fn with_search_radius(mut self, radius_km: f64) -> Self {
        self.search.radius_km = radius_km;
        self
    }

    pub fn with_pickup_speed(mut self, speed_kmh: f64) -> Self {
        self.eta.pickup_speed_kmh = speed_kmh;
        self
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid(message.into()))
}

fn validate_override(zone: &OverrideZone, floor: f64, cap: f64) -> Result<(), ConfigError> {
    if !(zone.radius_km.is_finite() && zone.radius_km > 0.0) {
        return invalid(format!("override zone '{}' needs a positive radius", zone.label));
    }
    if !(zone.center_lat.is_finite() && zone.center_lon.is_finite())
        || !(-90.0..=90.0).contains(&zone.center_lat)
        || !(-180.0..=180.0).contains(&zone.center_lon)
    {
        return invalid(format!("override zone '{}' has an invalid centre", zone.label));
    }
    if !(floor..=cap).contains(&zone.multiplier) {
        return invalid(format!(
            "override zone '{}' multiplier {} outside [{floor}, {cap}]",
            zone.label, zone.multiplier
        ));
    }
    Ok(())
}

fn validate_weights(mode: UserMode, weights: ModeWeights) -> Result<(), ConfigError> {
    let parts = [weights.eta, weights.cost, weights.comfort];
    if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return invalid(format!("{mode} weights must be non-negative"));
    }
    if (weights.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return invalid(format!("{mode} weights sum to {}, expected 1.0", weights.sum()));
    }
    Ok(())
}
