//! Quote orchestration.
//!
//! [`QuoteEngine`] wires the grid, demand model, surge, fare and ranking engines
//! around a shared [`VehicleStore`]. All request-path work is synchronous and
//! in-memory; the only shared mutable state is the store.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, Timelike};
use h3o::LatLng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::demand::DemandModel;
use crate::duration::{AverageSpeedEstimator, DurationEstimator, TemporalContext};
use crate::error::{ConfigError, QuoteError};
use crate::fleet::{VehicleClass, VehicleSnapshot, VehicleStatus, VehicleStore};
use crate::geo::{distance_km, validate_coordinate};
use crate::pricing::{round2, FareBreakdown, FareCalculator};
use crate::ranking::{OfferCandidate, RankedOffer, RankingEngine, UserMode};
use crate::region::{RegionGrid, RegionId};
use crate::surge::{SurgeDecision, SurgeEngine, SurgeReason};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    fn validated(&self) -> Result<LatLng, QuoteError> {
        validate_coordinate(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub pickup: Location,
    pub drop: Location,
    /// Local wall-clock time of the request; now when absent.
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    /// `fastest`, `cheapest` or `balanced`; anything else ranks as balanced.
    #[serde(default)]
    pub user_mode: String,
}

impl QuoteRequest {
    pub fn new(pickup: Location, drop: Location) -> Self {
        Self {
            pickup,
            drop,
            timestamp: None,
            user_mode: UserMode::default().to_string(),
        }
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.user_mode = mode.into();
        self
    }
}

/// Where a trip duration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationSource {
    Estimator,
    AverageSpeed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteOffer {
    pub vehicle_id: String,
    pub vehicle_class: VehicleClass,
    pub eta_pickup_minutes: f64,
    pub eta_trip_minutes: f64,
    pub fare: FareBreakdown,
    pub final_fare: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideQuote {
    pub request_id: String,
    pub pickup: Location,
    pub drop: Location,
    pub distance_km: f64,
    pub estimated_duration_minutes: f64,
    pub duration_source: DurationSource,
    pub region: RegionId,
    pub surge_multiplier: f64,
    pub surge_reason: String,
    pub surge_detail: SurgeReason,
    /// Empty when no vehicle is in range.
    pub offers: Vec<QuoteOffer>,
}

impl RideQuote {
    pub fn has_offers(&self) -> bool {
        !self.offers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineHealth {
    pub demand_model_loaded: bool,
    pub duration_estimator_loaded: bool,
    pub vehicles_registered: usize,
}

pub struct QuoteEngine {
    config: EngineConfig,
    grid: RegionGrid,
    demand: Option<DemandModel>,
    surge: SurgeEngine,
    fares: FareCalculator,
    ranking: RankingEngine,
    store: Arc<VehicleStore>,
    estimator: Option<Box<dyn DurationEstimator>>,
    fallback_duration: AverageSpeedEstimator,
}

impl QuoteEngine {
    /// Validate `config` and build an engine with an empty store, no demand
    /// model and no duration estimator.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let store = Arc::new(VehicleStore::with_prefilter_delta(
            config.search.prefilter_delta_deg,
        ));
        Ok(Self {
            grid: config.grid(),
            demand: None,
            surge: SurgeEngine::new(config.surge.clone()),
            fares: FareCalculator::new(config.fares.clone()),
            ranking: RankingEngine::new(config.ranking.clone()),
            store,
            estimator: None,
            fallback_duration: AverageSpeedEstimator::new(config.eta.fallback_speed_kmh),
            config,
        })
    }

    pub fn with_demand_model(mut self, model: Option<DemandModel>) -> Self {
        self.demand = model;
        self
    }

    pub fn with_duration_estimator(mut self, estimator: Box<dyn DurationEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Share an existing store instead of the engine's own.
    pub fn with_store(mut self, store: Arc<VehicleStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn grid(&self) -> &RegionGrid {
        &self.grid
    }

    pub fn store(&self) -> &Arc<VehicleStore> {
        &self.store
    }

    pub fn demand_model(&self) -> Option<&DemandModel> {
        self.demand.as_ref()
    }

    pub fn health(&self) -> EngineHealth {
        EngineHealth {
            demand_model_loaded: self.demand.is_some(),
            duration_estimator_loaded: self.estimator.is_some(),
            vehicles_registered: self.store.len(),
        }
    }

    /// Move an existing vehicle. Unknown ids return `Ok(false)`; nothing is created.
    pub fn update_vehicle(
        &self,
        vehicle_id: &str,
        lat: f64,
        lon: f64,
        status: Option<VehicleStatus>,
    ) -> Result<bool, QuoteError> {
        let location = validate_coordinate(lat, lon)?;
        let updated = self.store.update(vehicle_id, location, status);
        if !updated {
            debug!(vehicle_id, "update for unknown vehicle ignored");
        }
        Ok(updated)
    }

    /// Never fails; out-of-box coordinates clamp to the edge cells.
    pub fn resolve_region(&self, lat: f64, lon: f64) -> RegionId {
        self.grid.resolve(lat, lon)
    }

    /// Computed surge for a region, with failures replaced by the default.
    pub fn get_surge(&self, region: RegionId, hour: u8, supply: usize) -> SurgeDecision {
        self.surge
            .with_fallback(region, hour, supply.max(1), self.demand.as_ref())
    }

    /// Surge at a pickup point: override zones first, then the pickup
    /// region's available supply.
    pub fn surge_at(&self, pickup: LatLng, hour: u8) -> (RegionId, SurgeDecision) {
        let region = self.grid.resolve(pickup.lat(), pickup.lng());
        if let Some(decision) = self.surge.override_for(pickup) {
            return (region, decision);
        }
        let supply = self.store.available_in_region(&self.grid, region);
        (region, self.get_surge(region, hour, supply))
    }

    pub fn price(
        &self,
        distance_km: f64,
        duration_min: f64,
        vehicle_class: &str,
        surge_multiplier: f64,
    ) -> Result<FareBreakdown, QuoteError> {
        self.fares
            .compute_named(distance_km, duration_min, vehicle_class, surge_multiplier)
    }

    /// Available vehicles around a point; `radius_km` defaults to the configured search radius.
    pub fn nearby_vehicles(
        &self,
        lat: f64,
        lon: f64,
        radius_km: Option<f64>,
    ) -> Result<Vec<VehicleSnapshot>, QuoteError> {
        let point = validate_coordinate(lat, lon)?;
        let radius = radius_km.unwrap_or(self.config.search.radius_km);
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(QuoteError::InvalidTripMetric {
                name: "radius_km",
                value: radius,
            });
        }
        Ok(self.store.nearby(point, radius))
    }

    /// Rank with a mode name; `top_k` defaults to the configured value.
    pub fn rank(&self, offers: Vec<OfferCandidate>, mode: &str, top_k: Option<usize>) -> Vec<RankedOffer> {
        let top_k = top_k.unwrap_or(self.config.ranking.top_k);
        self.ranking.rank(offers, UserMode::from_name(mode), top_k)
    }

    /// Trip minutes from the installed estimator, else the average-speed fallback.
    pub fn estimate_duration(&self, distance_km: f64, context: &TemporalContext) -> (f64, DurationSource) {
        let estimate = self
            .estimator
            .as_ref()
            .and_then(|estimator| estimator.estimate_minutes(distance_km, context));
        match estimate {
            Some(minutes) if minutes.is_finite() && minutes >= 0.0 => (minutes, DurationSource::Estimator),
            Some(minutes) => {
                warn!(minutes, distance_km, "duration estimator returned an unusable value");
                (self.fallback_duration.minutes(distance_km), DurationSource::AverageSpeed)
            }
            None => (self.fallback_duration.minutes(distance_km), DurationSource::AverageSpeed),
        }
    }

    pub fn quote(&self, request: &QuoteRequest) -> Result<RideQuote, QuoteError> {
        let pickup = request.pickup.validated()?;
        let drop = request.drop.validated()?;
        let requested_at = request
            .timestamp
            .unwrap_or_else(|| Local::now().naive_local());

        let distance = distance_km(pickup, drop);
        let context = TemporalContext::from_datetime(&requested_at);
        let (duration, duration_source) = self.estimate_duration(distance, &context);

        let (region, surge) = self.surge_at(pickup, requested_at.hour() as u8);

        let pickup_speed = self.config.eta.pickup_speed_kmh;
        let mut candidates = Vec::new();
        for snapshot in self.store.nearby(pickup, self.config.search.radius_km) {
            let fare = self
                .fares
                .compute(distance, duration, snapshot.vehicle.class, surge.multiplier)?;
            candidates.push(OfferCandidate {
                vehicle_id: snapshot.vehicle.id,
                vehicle_class: snapshot.vehicle.class,
                eta_pickup_minutes: snapshot.distance_km / pickup_speed * 60.0,
                fare,
                comfort: None,
            });
        }

        let candidate_count = candidates.len();
        let ranked = self.rank(candidates, &request.user_mode, None);
        let offers: Vec<QuoteOffer> = ranked
            .into_iter()
            .map(|offer| QuoteOffer {
                vehicle_id: offer.vehicle_id,
                vehicle_class: offer.vehicle_class,
                eta_pickup_minutes: round1(offer.eta_pickup_minutes),
                eta_trip_minutes: round1(duration),
                final_fare: offer.fare.final_fare,
                fare: offer.fare,
                score: round3(offer.final_score),
            })
            .collect();

        debug!(
            %region,
            distance_km = distance,
            duration_min = duration,
            surge = surge.multiplier,
            candidates = candidate_count,
            offers = offers.len(),
            "quote computed"
        );

        Ok(RideQuote {
            request_id: request_id(),
            pickup: request.pickup,
            drop: request.drop,
            distance_km: round2(distance),
            estimated_duration_minutes: round1(duration),
            duration_source,
            region,
            surge_multiplier: surge.multiplier,
            surge_reason: surge.reason.to_string(),
            surge_detail: surge.reason,
            offers,
        })
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn request_id() -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("REQ_{}_{suffix}", Local::now().format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::Vehicle;
    use crate::surge::OverrideZone;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("datetime")
    }

    fn point(lat: f64, lon: f64) -> LatLng {
        LatLng::new(lat, lon).expect("point")
    }

    fn engine() -> QuoteEngine {
        QuoteEngine::new(EngineConfig::default()).expect("engine")
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig::default().with_top_k(0);
        assert!(QuoteEngine::new(config).is_err());
    }

    #[test]
    fn update_unknown_vehicle_is_false() {
        let engine = engine();
        assert_eq!(engine.update_vehicle("unknown_id", 40.75, -73.97, None), Ok(false));
        assert!(engine.store().is_empty());
    }

    #[test]
    fn update_rejects_out_of_range_coordinates() {
        let engine = engine();
        assert!(matches!(
            engine.update_vehicle("a", 91.0, 0.0, None),
            Err(QuoteError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn get_surge_without_model_uses_default_score() {
        let engine = engine();
        let decision = engine.get_surge(RegionId::new(2, 2), 9, 0);
        // 0.5 * 50 / 1 = 25 → high tier
        assert_eq!(decision.multiplier, 1.5);
        let decision = engine.get_surge(RegionId::new(2, 2), 9, 25);
        assert_eq!(decision.multiplier, 1.0);
    }

    #[test]
    fn surge_at_prefers_override_zone() {
        let zone = OverrideZone {
            label: "Stadium".to_string(),
            center_lat: 40.75,
            center_lon: -73.97,
            radius_km: 1.0,
            multiplier: 1.4,
        };
        let engine = QuoteEngine::new(EngineConfig::default().with_override(zone)).expect("engine");
        let (region, decision) = engine.surge_at(point(40.751, -73.971), 9);
        assert_eq!(region.to_string(), "2_2");
        assert_eq!(decision.multiplier, 1.4);
        assert_eq!(decision.reason.to_string(), "Stadium");
    }

    #[test]
    fn price_rejects_unknown_class() {
        assert_eq!(
            engine().price(1.0, 1.0, "limo", 1.0),
            Err(QuoteError::InvalidVehicleClass("limo".to_string()))
        );
    }

    #[test]
    fn nearby_uses_default_radius() {
        let engine = engine();
        engine
            .store()
            .register(Vehicle::new("near", VehicleClass::Economy, point(40.76, -73.97)));
        engine
            .store()
            .register(Vehicle::new("far", VehicleClass::Economy, point(41.2, -73.97)));
        let found = engine.nearby_vehicles(40.75, -73.97, None).expect("nearby");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].vehicle.id, "near");
    }

    #[test]
    fn quote_without_vehicles_has_no_offers() {
        let request = QuoteRequest::new(Location::new(40.75, -73.97), Location::new(40.78, -73.95)).at(noon());
        let quote = engine().quote(&request).expect("quote");
        assert!(!quote.has_offers());
        assert_eq!(quote.duration_source, DurationSource::AverageSpeed);
        assert!(quote.request_id.starts_with("REQ_"));
    }

    #[test]
    fn quote_rejects_bad_drop() {
        let request = QuoteRequest::new(Location::new(40.75, -73.97), Location::new(40.75, 200.0));
        assert!(engine().quote(&request).is_err());
    }

    struct Fixed(Option<f64>);

    impl DurationEstimator for Fixed {
        fn estimate_minutes(&self, _distance_km: f64, _context: &TemporalContext) -> Option<f64> {
            self.0
        }
    }

    #[test]
    fn estimator_answer_is_used_when_sane() {
        let ctx = TemporalContext::from_datetime(&noon());
        let sane = engine().with_duration_estimator(Box::new(Fixed(Some(12.0))));
        assert_eq!(sane.estimate_duration(5.0, &ctx), (12.0, DurationSource::Estimator));

        let broken = engine().with_duration_estimator(Box::new(Fixed(Some(f64::NAN))));
        assert_eq!(broken.estimate_duration(5.0, &ctx), (10.0, DurationSource::AverageSpeed));

        let silent = engine().with_duration_estimator(Box::new(Fixed(None)));
        assert_eq!(silent.estimate_duration(5.0, &ctx).1, DurationSource::AverageSpeed);
    }

    #[test]
    fn health_reports_loaded_collaborators() {
        let engine = QuoteEngine::new(EngineConfig::default()).expect("engine");
        engine
            .store()
            .register(Vehicle::new("a", VehicleClass::Suv, point(40.75, -73.97)));
        let health = engine.health();
        assert!(!health.demand_model_loaded);
        assert!(!health.duration_estimator_loaded);
        assert_eq!(health.vehicles_registered, 1);
    }
}
