//! Multi-criteria ranking of priced candidates.
//!
//! ETA, cost and comfort are min-max normalized jointly over the whole
//! candidate set, combined with the weights of a [`UserMode`], then stably
//! sorted by score and truncated to the top K.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fleet::VehicleClass;
use crate::pricing::FareBreakdown;

/// Rider preference selecting a weight triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserMode {
    Fastest,
    Cheapest,
    #[default]
    Balanced,
}

impl UserMode {
    /// Parse a mode name; anything unrecognized is `Balanced`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "fastest" => UserMode::Fastest,
            "cheapest" => UserMode::Cheapest,
            _ => UserMode::Balanced,
        }
    }
}

impl fmt::Display for UserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UserMode::Fastest => "fastest",
            UserMode::Cheapest => "cheapest",
            UserMode::Balanced => "balanced",
        })
    }
}

/// Weights over (eta, cost, comfort). Each triple sums to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeWeights {
    pub eta: f64,
    pub cost: f64,
    pub comfort: f64,
}

impl ModeWeights {
    pub const fn new(eta: f64, cost: f64, comfort: f64) -> Self {
        Self { eta, cost, comfort }
    }

    pub fn sum(&self) -> f64 {
        self.eta + self.cost + self.comfort
    }
}

/// Weights per mode, class comfort levels and the default result size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub fastest: ModeWeights,
    pub cheapest: ModeWeights,
    pub balanced: ModeWeights,
    /// Comfort per class; classes missing here score 1.
    pub comfort: BTreeMap<VehicleClass, u8>,
    /// Offers kept when the caller gives no limit.
    pub top_k: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            fastest: ModeWeights::new(0.7, 0.2, 0.1),
            cheapest: ModeWeights::new(0.2, 0.7, 0.1),
            balanced: ModeWeights::new(0.4, 0.4, 0.2),
            comfort: BTreeMap::from([
                (VehicleClass::Economy, 1),
                (VehicleClass::Sedan, 2),
                (VehicleClass::Suv, 3),
            ]),
            top_k: 10,
        }
    }
}

impl RankingConfig {
    pub fn weights(&self, mode: UserMode) -> ModeWeights {
        match mode {
            UserMode::Fastest => self.fastest,
            UserMode::Cheapest => self.cheapest,
            UserMode::Balanced => self.balanced,
        }
    }

    pub fn comfort_for(&self, class: VehicleClass) -> u8 {
        self.comfort.get(&class).copied().unwrap_or(1)
    }
}

/// A priced vehicle waiting to be ranked.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferCandidate {
    pub vehicle_id: String,
    pub vehicle_class: VehicleClass,
    pub eta_pickup_minutes: f64,
    pub fare: FareBreakdown,
    /// Looked up from the class when absent.
    pub comfort: Option<u8>,
}

/// An offer with its comfort level resolved and its weighted score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedOffer {
    pub vehicle_id: String,
    pub vehicle_class: VehicleClass,
    pub eta_pickup_minutes: f64,
    pub fare: FareBreakdown,
    pub comfort_score: u8,
    /// Weighted sum of the normalized criteria, in `[0, 1]`.
    pub final_score: f64,
}

/// Normalized criteria for one candidate, each in `[0, 1]`, higher is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriteriaScores {
    pub eta: f64,
    pub cost: f64,
    pub comfort: f64,
}

/// Min-max scale `values` into `[0, 1]` jointly.
///
/// A single value or an all-equal set maps to `1.0`. With `lower_is_better`
/// the minimum maps to `1.0` and the maximum to `0.0`; otherwise the reverse.
/// Non-finite values score `0.0` and are ignored when finding the range.
pub fn normalize(values: &[f64], lower_is_better: bool) -> Vec<f64> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let span = max - min;

    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                0.0
            } else if span <= 0.0 {
                1.0
            } else if lower_is_better {
                (max - v) / span
            } else {
                (v - min) / span
            }
        })
        .collect()
}

/// Multi-criteria offer ranking.
///
/// ETA and fare are normalized jointly across the candidate set, so a score is
/// only comparable within one call to [`rank`](Self::rank).
#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Dot product of `criteria` with the weights for `mode`.
    pub fn weighted_score(&self, criteria: &CriteriaScores, mode: UserMode) -> f64 {
        let weights = self.config.weights(mode);
        weights.eta * criteria.eta + weights.cost * criteria.cost + weights.comfort * criteria.comfort
    }

    /// Score, stable-sort descending and keep the best `top_k`.
    ///
    /// Ties keep their input order. Empty input yields an empty result.
    pub fn rank(&self, offers: Vec<OfferCandidate>, mode: UserMode, top_k: usize) -> Vec<RankedOffer> {
        if offers.is_empty() {
            return Vec::new();
        }

        let comforts: Vec<u8> = offers
            .iter()
            .map(|offer| offer.comfort.unwrap_or_else(|| self.config.comfort_for(offer.vehicle_class)))
            .collect();
        let etas: Vec<f64> = offers.iter().map(|offer| offer.eta_pickup_minutes).collect();
        let costs: Vec<f64> = offers.iter().map(|offer| offer.fare.final_fare).collect();
        let comfort_values: Vec<f64> = comforts.iter().map(|c| *c as f64).collect();

        let eta_scores = normalize(&etas, true);
        let cost_scores = normalize(&costs, true);
        let comfort_scores = normalize(&comfort_values, false);

        let mut ranked: Vec<RankedOffer> = offers
            .into_iter()
            .enumerate()
            .map(|(i, offer)| {
                let criteria = CriteriaScores {
                    eta: eta_scores[i],
                    cost: cost_scores[i],
                    comfort: comfort_scores[i],
                };
                let mut score = self.weighted_score(&criteria, mode);
                if !score.is_finite() {
                    warn!(vehicle_id = %offer.vehicle_id, "non-finite ranking score, scoring as 0");
                    score = 0.0;
                }
                RankedOffer {
                    vehicle_id: offer.vehicle_id,
                    vehicle_class: offer.vehicle_class,
                    eta_pickup_minutes: offer.eta_pickup_minutes,
                    fare: offer.fare,
                    comfort_score: comforts[i],
                    final_score: score.clamp(0.0, 1.0),
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(top_k);
        ranked
    }
}
