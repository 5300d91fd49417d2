//! In-memory vehicle registry with radius-bounded proximity queries.
//!
//! The store is an explicitly constructed value. Share it between request
//! handlers with `Arc<VehicleStore>`; all access goes through an internal
//! `RwLock`, so concurrent `nearby` reads and `update` writes never observe a
//! half-applied mutation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use h3o::LatLng;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::QuoteError;
use crate::geo::{distance_km, KM_PER_DEGREE};
use crate::region::{RegionGrid, RegionId};

/// Default bounding-box prefilter half-width in degrees.
pub const DEFAULT_PREFILTER_DELTA_DEG: f64 = 0.1;

/// Service class. Ordered cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Economy,
    Sedan,
    Suv,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 3] = [VehicleClass::Economy, VehicleClass::Sedan, VehicleClass::Suv];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Economy => "economy",
            VehicleClass::Sedan => "sedan",
            VehicleClass::Suv => "suv",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleClass {
    type Err = QuoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "economy" => Ok(VehicleClass::Economy),
            "sedan" => Ok(VehicleClass::Sedan),
            "suv" => Ok(VehicleClass::Suv),
            other => Err(QuoteError::InvalidVehicleClass(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Available,
    Busy,
    Offline,
}

impl FromStr for VehicleStatus {
    type Err = QuoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(VehicleStatus::Available),
            "busy" => Ok(VehicleStatus::Busy),
            "offline" => Ok(VehicleStatus::Offline),
            other => Err(QuoteError::InvalidStatus(other.to_string())),
        }
    }
}

/// Last known state of one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: String,
    pub class: VehicleClass,
    pub location: LatLng,
    pub status: VehicleStatus,
    pub last_updated: DateTime<Utc>,
    /// Driver rating out of 5.
    pub rating: Option<f64>,
    pub trips_completed: Option<u32>,
}

impl Vehicle {
    /// New available vehicle stamped with the current time.
    pub fn new(id: impl Into<String>, class: VehicleClass, location: LatLng) -> Self {
        Self {
            id: id.into(),
            class,
            location,
            status: VehicleStatus::Available,
            last_updated: Utc::now(),
            rating: None,
            trips_completed: None,
        }
    }

    pub fn with_status(mut self, status: VehicleStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == VehicleStatus::Available
    }
}

/// A vehicle copied out of the store together with its distance to the query point.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub vehicle: Vehicle,
    pub distance_km: f64,
}

/// Thread-safe in-memory fleet keyed by vehicle id.
///
/// Readers copy vehicles out, so no lock is held once a method returns.
#[derive(Debug)]
pub struct VehicleStore {
    vehicles: RwLock<HashMap<String, Vehicle>>,
    prefilter_delta_deg: f64,
}

impl Default for VehicleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleStore {
    pub fn new() -> Self {
        Self::with_prefilter_delta(DEFAULT_PREFILTER_DELTA_DEG)
    }

    /// Store whose `nearby` prefilter box is at least `prefilter_delta_deg` wide.
    pub fn with_prefilter_delta(prefilter_delta_deg: f64) -> Self {
        Self {
            vehicles: RwLock::new(HashMap::new()),
            prefilter_delta_deg: prefilter_delta_deg.max(0.0),
        }
    }

    /// Insert a vehicle under a new id. Returns `false` if the id is taken.
    pub fn register(&self, vehicle: Vehicle) -> bool {
        let mut vehicles = self.vehicles.write();
        if vehicles.contains_key(&vehicle.id) {
            return false;
        }
        vehicles.insert(vehicle.id.clone(), vehicle);
        true
    }

    /// Move an existing vehicle and optionally change its status.
    ///
    /// Unknown ids are left alone and return `false`; this never creates a vehicle.
    pub fn update(&self, vehicle_id: &str, location: LatLng, status: Option<VehicleStatus>) -> bool {
        let mut vehicles = self.vehicles.write();
        let Some(vehicle) = vehicles.get_mut(vehicle_id) else {
            debug!(vehicle_id, "update for unknown vehicle ignored");
            return false;
        };
        vehicle.location = location;
        vehicle.last_updated = Utc::now();
        if let Some(status) = status {
            vehicle.status = status;
        }
        true
    }

    pub fn get(&self, vehicle_id: &str) -> Option<Vehicle> {
        self.vehicles.read().get(vehicle_id).cloned()
    }

    /// Snapshot of every vehicle, in no particular order.
    pub fn get_all(&self) -> Vec<Vehicle> {
        self.vehicles.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.vehicles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.read().is_empty()
    }

    /// Available vehicles within `radius_km` of `point`, in no particular order.
    ///
    /// A bounding-box check on degrees runs before the haversine distance so
    /// far-away vehicles skip the trigonometry. Longitude wraps at the antimeridian. The box is widened when the
    /// radius is larger than the configured delta.
    pub fn nearby(&self, point: LatLng, radius_km: f64) -> Vec<VehicleSnapshot> {
        let lat_delta = self.prefilter_delta_deg.max(radius_km / KM_PER_DEGREE);
        let lon_scale = point.lat().to_radians().cos().abs().max(0.01);
        let lon_delta = self
            .prefilter_delta_deg
            .max(radius_km / (KM_PER_DEGREE * lon_scale));

        let vehicles = self.vehicles.read();
        vehicles
            .values()
            .filter(|vehicle| vehicle.is_available())
            .filter(|vehicle| {
                (vehicle.location.lat() - point.lat()).abs() <= lat_delta
                    && lon_gap(vehicle.location.lng(), point.lng()) <= lon_delta
            })
            .filter_map(|vehicle| {
                let distance = distance_km(point, vehicle.location);
                (distance <= radius_km).then(|| VehicleSnapshot {
                    vehicle: vehicle.clone(),
                    distance_km: distance,
                })
            })
            .collect()
    }

    /// Number of available vehicles whose position resolves to `region`.
    pub fn available_in_region(&self, grid: &RegionGrid, region: RegionId) -> usize {
        self.vehicles
            .read()
            .values()
            .filter(|vehicle| vehicle.is_available())
            .filter(|vehicle| grid.resolve(vehicle.location.lat(), vehicle.location.lng()) == region)
            .count()
    }

    /// Populate an empty store with `count` available vehicles scattered
    /// uniformly within `spread_deg` of `center`.
    ///
    /// Does nothing if the store already holds vehicles or `spread_deg` is not
    /// finite. Returns the number added.
    pub fn seed_fleet(&self, center: LatLng, count: usize, spread_deg: f64, seed: Option<u64>) -> usize {
        if !spread_deg.is_finite() {
            warn!(spread_deg, "non-finite fleet spread, nothing seeded");
            return 0;
        }
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut vehicles = self.vehicles.write();
        if !vehicles.is_empty() {
            debug!(existing = vehicles.len(), "fleet already seeded");
            return 0;
        }

        let spread = spread_deg.abs();
        let mut added = 0;
        for i in 0..count {
            let id = format!("v_{i}_{}", rng.gen_range(1000..=9999));
            let lat = (center.lat() + rng.gen_range(-spread..=spread)).clamp(-90.0, 90.0);
            let lon = (center.lng() + rng.gen_range(-spread..=spread)).clamp(-180.0, 180.0);
            let Ok(location) = LatLng::new(lat, lon) else {
                continue;
            };
            let class = match rng.gen::<f64>() {
                r if r < 0.5 => VehicleClass::Economy,
                r if r < 0.8 => VehicleClass::Sedan,
                _ => VehicleClass::Suv,
            };
            let mut vehicle = Vehicle::new(id, class, location);
            vehicle.rating = Some((rng.gen_range(3.5..=5.0_f64) * 10.0).round() / 10.0);
            vehicle.trips_completed = Some(rng.gen_range(10..=500));
            vehicles.insert(vehicle.id.clone(), vehicle);
            added += 1;
        }

        info!(count = added, lat = center.lat(), lon = center.lng(), "seeded fleet");
        added
    }
}

/// Absolute longitude difference in degrees, taken the short way round the antimeridian.
fn lon_gap(a: f64, b: f64) -> f64 {
    ((a - b + 540.0) % 360.0 - 180.0).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::BoundingBox;

    fn point(lat: f64, lon: f64) -> LatLng {
        LatLng::new(lat, lon).expect("point")
    }

    fn store_with(vehicles: Vec<Vehicle>) -> VehicleStore {
        let store = VehicleStore::new();
        for vehicle in vehicles {
            assert!(store.register(vehicle));
        }
        store
    }

    #[test]
    fn update_unknown_id_returns_false_and_leaves_store_unchanged() {
        let store = store_with(vec![Vehicle::new("a", VehicleClass::Sedan, point(40.75, -73.97))]);
        let before = store.get_all();

        assert!(!store.update("unknown_id", point(40.76, -73.96), Some(VehicleStatus::Busy)));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_all(), before);
        assert!(store.get("unknown_id").is_none());
    }

    #[test]
    fn update_moves_vehicle_and_keeps_status_when_none() {
        let store = store_with(vec![Vehicle::new("a", VehicleClass::Suv, point(40.75, -73.97))]);
        let stamp = store.get("a").expect("vehicle").last_updated;

        assert!(store.update("a", point(40.76, -73.95), None));
        let moved = store.get("a").expect("vehicle");
        assert_eq!(moved.location, point(40.76, -73.95));
        assert_eq!(moved.status, VehicleStatus::Available);
        assert!(moved.last_updated >= stamp);

        assert!(store.update("a", point(40.76, -73.95), Some(VehicleStatus::Offline)));
        assert_eq!(store.get("a").expect("vehicle").status, VehicleStatus::Offline);
    }

    #[test]
    fn register_rejects_duplicate_ids() {
        let store = VehicleStore::new();
        assert!(store.register(Vehicle::new("a", VehicleClass::Economy, point(0.0, 0.0))));
        assert!(!store.register(Vehicle::new("a", VehicleClass::Suv, point(1.0, 1.0))));
        assert_eq!(store.get("a").expect("vehicle").class, VehicleClass::Economy);
    }

    #[test]
    fn nearby_filters_by_status_and_radius() {
        let store = store_with(vec![
            Vehicle::new("close", VehicleClass::Economy, point(40.751, -73.971)),
            Vehicle::new("busy", VehicleClass::Economy, point(40.751, -73.971))
                .with_status(VehicleStatus::Busy),
            Vehicle::new("mid", VehicleClass::Sedan, point(40.78, -73.97)),
            Vehicle::new("far", VehicleClass::Suv, point(41.5, -73.0)),
        ]);

        let mut ids: Vec<String> = store
            .nearby(point(40.75, -73.97), 2.0)
            .into_iter()
            .map(|snapshot| snapshot.vehicle.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["close".to_string()]);

        let within_five = store.nearby(point(40.75, -73.97), 5.0);
        assert_eq!(within_five.len(), 2);
        for snapshot in within_five {
            assert!(snapshot.distance_km <= 5.0);
            assert!(snapshot.vehicle.is_available());
        }
    }

    #[test]
    fn nearby_radius_wider_than_prefilter_still_finds_vehicles() {
        // ~13 km north: outside a 0.1 degree box, inside a 15 km radius.
        let store = store_with(vec![Vehicle::new("edge", VehicleClass::Sedan, point(40.87, -73.97))]);
        let found = store.nearby(point(40.75, -73.97), 15.0);
        assert_eq!(found.len(), 1);
        assert!(found[0].distance_km > 11.0);
    }

    #[test]
    fn available_in_region_counts_only_available_vehicles() {
        let grid = RegionGrid::new(BoundingBox::default(), 5);
        let store = store_with(vec![
            Vehicle::new("a", VehicleClass::Economy, point(40.75, -73.97)),
            Vehicle::new("b", VehicleClass::Economy, point(40.751, -73.969)),
            Vehicle::new("c", VehicleClass::Economy, point(40.75, -73.97))
                .with_status(VehicleStatus::Busy),
            Vehicle::new("d", VehicleClass::Economy, point(40.71, -74.01)),
        ]);
        assert_eq!(store.available_in_region(&grid, RegionId::new(2, 2)), 2);
        assert_eq!(store.available_in_region(&grid, RegionId::new(0, 0)), 1);
        assert_eq!(store.available_in_region(&grid, RegionId::new(4, 4)), 0);
    }

    #[test]
    fn seed_fleet_is_reproducible_and_only_runs_once() {
        let center = point(13.3525, 74.7928);
        let a = VehicleStore::new();
        let b = VehicleStore::new();
        assert_eq!(a.seed_fleet(center, 20, 0.05, Some(7)), 20);
        assert_eq!(b.seed_fleet(center, 20, 0.05, Some(7)), 20);

        let mut ids_a: Vec<String> = a.get_all().into_iter().map(|v| v.id).collect();
        let mut ids_b: Vec<String> = b.get_all().into_iter().map(|v| v.id).collect();
        ids_a.sort();
        ids_b.sort();
        assert_eq!(ids_a, ids_b);

        assert_eq!(a.seed_fleet(center, 20, 0.05, Some(8)), 0);
        assert_eq!(a.len(), 20);
        for vehicle in a.get_all() {
            assert!((vehicle.location.lat() - center.lat()).abs() <= 0.05 + 1e-9);
            let rating = vehicle.rating.expect("rating");
            assert!((3.5..=5.0).contains(&rating));
        }
    }

    #[test]
    fn class_and_status_parse_from_wire_names() {
        assert_eq!("suv".parse::<VehicleClass>(), Ok(VehicleClass::Suv));
        assert_eq!(
            "limo".parse::<VehicleClass>(),
            Err(QuoteError::InvalidVehicleClass("limo".to_string()))
        );
        assert_eq!("busy".parse::<VehicleStatus>(), Ok(VehicleStatus::Busy));
        assert!("parked".parse::<VehicleStatus>().is_err());
    }

    #[test]
    fn non_finite_spread_seeds_nothing() {
        let store = VehicleStore::new();
        assert_eq!(store.seed_fleet(point(13.35, 74.79), 3, f64::NAN, Some(1)), 0);
        assert_eq!(store.seed_fleet(point(13.35, 74.79), 3, f64::INFINITY, Some(1)), 0);
        assert!(store.is_empty());

        assert_eq!(store.seed_fleet(point(13.35, 74.79), 3, 0.05, Some(1)), 3);
    }

    #[test]
    fn nearby_finds_vehicles_across_the_antimeridian() {
        let store = store_with(vec![Vehicle::new("east", VehicleClass::Sedan, point(0.0, 179.999))]);
        let found = store.nearby(point(0.0, -179.999), 5.0);
        assert_eq!(found.len(), 1);
        assert!(found[0].distance_km < 0.3);

        assert!(store.nearby(point(0.0, 170.0), 5.0).is_empty());
    }

    #[test]
    fn lon_gap_wraps() {
        assert!((lon_gap(179.999, -179.999) - 0.002).abs() < 1e-9);
        assert!((lon_gap(-73.97, -73.99) - 0.02).abs() < 1e-9);
        assert!((lon_gap(10.0, -170.0) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn concurrent_updates_and_reads_do_not_lose_vehicles() {
        use std::sync::Arc;

        let store = Arc::new(VehicleStore::new());
        for i in 0..50 {
            store.register(Vehicle::new(format!("v{i}"), VehicleClass::Economy, point(40.75, -73.97)));
        }

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("v{i}");
                        let lat = 40.75 + (t as f64) * 0.001;
                        store.update(&id, point(lat, -73.97), None);
                        let _ = store.nearby(point(40.75, -73.97), 3.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker");
        }

        assert_eq!(store.len(), 50);
        assert_eq!(store.nearby(point(40.75, -73.97), 3.0).len(), 50);
    }
}
