//! Surge multiplier derivation.
//!
//! A pure pipeline: demand score → demand-supply ratio → tier multiplier, capped.
//! Geofenced override zones are checked first and bypass the pipeline entirely.
//! Nothing is retained between calls.

use std::fmt;

use h3o::LatLng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::demand::{self, DemandLookup, DemandModel};
use crate::error::SurgeError;
use crate::geo::distance_km;
use crate::region::RegionId;

/// Label reported when the pipeline fails and the default surge is used.
pub const FALLBACK_REASON: &str = "Normal demand";

/// Demand/supply band, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SurgeTier {
    Discount,
    Normal,
    Moderate,
    High,
}

/// Ordered threshold table. `ratio < discount_threshold` is a discount,
/// `< normal_threshold` normal, `< moderate_threshold` moderate, otherwise high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeTiers {
    pub discount_threshold: f64,
    pub normal_threshold: f64,
    pub moderate_threshold: f64,
    pub discount_mult: f64,
    pub normal_mult: f64,
    pub moderate_mult: f64,
    pub high_mult: f64,
}

impl Default for SurgeTiers {
    fn default() -> Self {
        Self {
            discount_threshold: 0.5,
            normal_threshold: 1.5,
            moderate_threshold: 3.0,
            discount_mult: 0.9,
            normal_mult: 1.0,
            moderate_mult: 1.3,
            high_mult: 1.5,
        }
    }
}

impl SurgeTiers {
    /// Band for `ratio`. NaN falls through to `High`; callers check finiteness first.
    pub fn tier(&self, ratio: f64) -> SurgeTier {
        if ratio < self.discount_threshold {
            SurgeTier::Discount
        } else if ratio < self.normal_threshold {
            SurgeTier::Normal
        } else if ratio < self.moderate_threshold {
            SurgeTier::Moderate
        } else {
            SurgeTier::High
        }
    }

    pub fn multiplier(&self, tier: SurgeTier) -> f64 {
        match tier {
            SurgeTier::Discount => self.discount_mult,
            SurgeTier::Normal => self.normal_mult,
            SurgeTier::Moderate => self.moderate_mult,
            SurgeTier::High => self.high_mult,
        }
    }

    /// True when thresholds and multipliers are both non-decreasing.
    pub fn is_monotonic(&self) -> bool {
        let thresholds = [
            self.discount_threshold,
            self.normal_threshold,
            self.moderate_threshold,
        ];
        let multipliers = [
            self.discount_mult,
            self.normal_mult,
            self.moderate_mult,
            self.high_mult,
        ];
        thresholds.iter().chain(multipliers.iter()).all(|v| v.is_finite())
            && thresholds.windows(2).all(|w| w[0] <= w[1])
            && multipliers.windows(2).all(|w| w[0] <= w[1])
    }
}

/// A named circular zone with a fixed multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideZone {
    pub label: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_km: f64,
    pub multiplier: f64,
}

impl OverrideZone {
    pub fn contains(&self, point: LatLng) -> bool {
        LatLng::new(self.center_lat, self.center_lon)
            .map(|center| distance_km(center, point) <= self.radius_km)
            .unwrap_or(false)
    }
}

/// Why a multiplier was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurgeReason {
    Override {
        label: String,
    },
    Computed {
        ratio: f64,
        tier: SurgeTier,
        demand: DemandLookup,
    },
    Fallback {
        error: String,
    },
}

impl fmt::Display for SurgeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurgeReason::Override { label } => f.write_str(label),
            SurgeReason::Computed { ratio, .. } => {
                write!(f, "Calculated from demand-supply ratio ({ratio:.2})")
            }
            SurgeReason::Fallback { .. } => f.write_str(FALLBACK_REASON),
        }
    }
}

/// Multiplier applied to a fare and why it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurgeDecision {
    pub multiplier: f64,
    pub reason: SurgeReason,
}

impl SurgeDecision {
    /// True when the default surge stood in for a failed computation.
    pub fn is_fallback(&self) -> bool {
        matches!(self.reason, SurgeReason::Fallback { .. })
    }
}

/// Surge settings. Validated by [`EngineConfig::validate`](crate::config::EngineConfig::validate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeConfig {
    /// Assumed hourly ride volume of a saturated region; rescales the [0, 1]
    /// demand score into vehicle-count units.
    pub reference_peak_demand: f64,
    pub tiers: SurgeTiers,
    /// Upper bound on any computed multiplier.
    pub cap: f64,
    /// Used when the computed pipeline fails.
    pub default_surge: f64,
    /// Evaluated in order; first zone containing the pickup wins.
    pub overrides: Vec<OverrideZone>,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            reference_peak_demand: 50.0,
            tiers: SurgeTiers::default(),
            cap: 1.5,
            default_surge: 1.0,
            overrides: Vec::new(),
        }
    }
}

/// Turns demand and supply into a capped surge multiplier.
#[derive(Debug, Clone, Default)]
pub struct SurgeEngine {
    config: SurgeConfig,
}

impl SurgeEngine {
    pub fn new(config: SurgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SurgeConfig {
        &self.config
    }

    /// `demand_score * reference_peak_demand / max(supply, 1)`.
    pub fn ratio(&self, demand_score: f64, supply: usize) -> f64 {
        demand_score * self.config.reference_peak_demand / supply.max(1) as f64
    }

    /// Tier multiplier for `ratio`, never above the cap.
    pub fn tier_multiplier(&self, ratio: f64) -> f64 {
        let tier = self.config.tiers.tier(ratio);
        self.config.tiers.multiplier(tier).min(self.config.cap)
    }

    /// First override zone containing `pickup`, if any.
    pub fn override_for(&self, pickup: LatLng) -> Option<SurgeDecision> {
        let zone = self.config.overrides.iter().find(|zone| zone.contains(pickup))?;
        debug!(label = %zone.label, multiplier = zone.multiplier, "surge override zone hit");
        Some(SurgeDecision {
            multiplier: zone.multiplier,
            reason: SurgeReason::Override {
                label: zone.label.clone(),
            },
        })
    }

    /// Run score → ratio → tier, surfacing numeric failures.
    pub fn compute(
        &self,
        region: RegionId,
        hour: u8,
        supply: usize,
        model: Option<&DemandModel>,
    ) -> Result<SurgeDecision, SurgeError> {
        let demand = demand::score(model, region, hour);
        let ratio = self.ratio(demand.score, supply);
        if !ratio.is_finite() {
            return Err(SurgeError::NonFiniteRatio {
                score: demand.score,
                supply,
            });
        }
        let tier = self.config.tiers.tier(ratio);
        let multiplier = self.tier_multiplier(ratio);
        if !multiplier.is_finite() {
            return Err(SurgeError::NonFiniteMultiplier { ratio });
        }
        Ok(SurgeDecision {
            multiplier,
            reason: SurgeReason::Computed {
                ratio,
                tier,
                demand,
            },
        })
    }

    /// [`compute`](Self::compute), replacing any failure with the default surge.
    pub fn with_fallback(
        &self,
        region: RegionId,
        hour: u8,
        supply: usize,
        model: Option<&DemandModel>,
    ) -> SurgeDecision {
        self.compute(region, hour, supply, model)
            .unwrap_or_else(|error| {
                warn!(%region, hour, supply, %error, "surge computation failed, using default");
                SurgeDecision {
                    multiplier: self.config.default_surge,
                    reason: SurgeReason::Fallback {
                        error: error.to_string(),
                    },
                }
            })
    }

    /// Overrides first, then the computed pipeline.
    pub fn decide(
        &self,
        pickup: LatLng,
        region: RegionId,
        hour: u8,
        supply: usize,
        model: Option<&DemandModel>,
    ) -> SurgeDecision {
        self.override_for(pickup)
            .unwrap_or_else(|| self.with_fallback(region, hour, supply, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::DemandSource;

    fn engine_with_cap(cap: f64) -> SurgeEngine {
        SurgeEngine::new(SurgeConfig {
            cap,
            ..SurgeConfig::default()
        })
    }

    #[test]
    fn ratio_rescales_score_and_floors_supply() {
        let engine = SurgeEngine::default();
        assert_eq!(engine.ratio(0.8, 5), 8.0);
        assert_eq!(engine.ratio(0.5, 0), 25.0);
        assert_eq!(engine.ratio(0.5, 1), 25.0);
    }

    #[test]
    fn high_ratio_lands_in_high_tier_and_respects_cap() {
        let engine = SurgeEngine::default();
        let ratio = engine.ratio(0.8, 5);
        assert_eq!(engine.config().tiers.tier(ratio), SurgeTier::High);
        assert_eq!(engine.tier_multiplier(ratio), 1.5);
        assert_eq!(engine_with_cap(1.2).tier_multiplier(ratio), 1.2);
    }

    #[test]
    fn tier_boundaries_are_half_open() {
        let engine = SurgeEngine::default();
        assert_eq!(engine.tier_multiplier(0.49), 0.9);
        assert_eq!(engine.tier_multiplier(0.5), 1.0);
        assert_eq!(engine.tier_multiplier(1.5), 1.3);
        assert_eq!(engine.tier_multiplier(3.0), 1.5);
    }

    #[test]
    fn tier_multiplier_is_capped_and_non_decreasing() {
        for cap in [1.0, 1.2, 1.5, 2.0] {
            let engine = engine_with_cap(cap);
            let mut previous = f64::MIN;
            for step in 0..=400 {
                let ratio = step as f64 * 0.025;
                let multiplier = engine.tier_multiplier(ratio);
                assert!(multiplier <= cap);
                assert!(multiplier >= previous);
                previous = multiplier;
            }
        }
    }

    #[test]
    fn missing_model_uses_default_score() {
        let engine = SurgeEngine::default();
        let decision = engine.with_fallback(RegionId::new(1, 1), 9, 25, None);
        assert_eq!(decision.multiplier, 1.0);
        let SurgeReason::Computed { ratio, tier, demand } = decision.reason else {
            panic!("expected computed reason");
        };
        assert_eq!(ratio, 1.0);
        assert_eq!(tier, SurgeTier::Normal);
        assert_eq!(demand.source, DemandSource::NoModel);
    }

    #[test]
    fn computed_reason_reports_ratio() {
        let engine = SurgeEngine::default();
        let decision = engine.with_fallback(RegionId::new(0, 0), 3, 5, None);
        assert_eq!(decision.reason.to_string(), "Calculated from demand-supply ratio (5.00)");
    }

    #[test]
    fn numeric_failure_falls_back_to_default_surge() {
        let engine = SurgeEngine::new(SurgeConfig {
            reference_peak_demand: f64::NAN,
            default_surge: 1.0,
            ..SurgeConfig::default()
        });
        assert!(engine.compute(RegionId::new(0, 0), 8, 3, None).is_err());

        let decision = engine.with_fallback(RegionId::new(0, 0), 8, 3, None);
        assert!(decision.is_fallback());
        assert_eq!(decision.multiplier, 1.0);
        assert_eq!(decision.reason.to_string(), "Normal demand");
    }

    #[test]
    fn first_matching_override_wins() {
        let engine = SurgeEngine::new(SurgeConfig {
            overrides: vec![
                OverrideZone {
                    label: "High Demand (Student Rush)".to_string(),
                    center_lat: 13.3467,
                    center_lon: 74.7926,
                    radius_km: 1.0,
                    multiplier: 1.4,
                },
                OverrideZone {
                    label: "Wide zone".to_string(),
                    center_lat: 13.3467,
                    center_lon: 74.7926,
                    radius_km: 50.0,
                    multiplier: 0.9,
                },
            ],
            ..SurgeConfig::default()
        });
        let pickup = LatLng::new(13.3470, 74.7920).expect("pickup");
        let decision = engine.decide(pickup, RegionId::new(0, 0), 8, 1, None);
        assert_eq!(decision.multiplier, 1.4);
        assert_eq!(decision.reason.to_string(), "High Demand (Student Rush)");

        let elsewhere = LatLng::new(13.20, 74.79).expect("pickup");
        assert_eq!(engine.decide(elsewhere, RegionId::new(0, 0), 8, 1, None).multiplier, 0.9);

        let outside = LatLng::new(40.75, -73.97).expect("pickup");
        let computed = engine.decide(outside, RegionId::new(0, 0), 8, 1, None);
        assert!(matches!(computed.reason, SurgeReason::Computed { .. }));
    }

    #[test]
    fn default_tiers_are_monotonic() {
        assert!(SurgeTiers::default().is_monotonic());
        let broken = SurgeTiers {
            moderate_mult: 0.8,
            ..SurgeTiers::default()
        };
        assert!(!broken.is_monotonic());
    }
}
