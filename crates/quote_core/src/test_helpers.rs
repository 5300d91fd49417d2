//! Shared fixtures for unit tests, integration tests and benches.
//!
//! Everything here uses the default Manhattan grid (lat 40.70–40.80,
//! lon -74.02 to -73.92, 5×5).

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use h3o::LatLng;

use crate::config::EngineConfig;
use crate::demand::{DemandKey, DemandLevel, DemandModel, DemandSchema, DemandSlot};
use crate::fleet::{Vehicle, VehicleClass, VehicleStatus};
use crate::quote::QuoteEngine;
use crate::region::RegionId;

/// Centre of the default grid; resolves to region `2_2`.
pub const TEST_LAT: f64 = 40.75;
pub const TEST_LON: f64 = -73.97;

/// Region of [`test_point`] on the default grid.
pub fn test_region() -> RegionId {
    RegionId::new(2, 2)
}

/// # Panics
///
/// Panics if the constants are not a valid coordinate (never).
pub fn test_point() -> LatLng {
    LatLng::new(TEST_LAT, TEST_LON).expect("test point is a valid coordinate")
}

/// A point offset from [`test_point`] by whole degrees.
///
/// # Panics
///
/// Panics if the offset leaves the valid coordinate range.
pub fn offset_point(d_lat: f64, d_lon: f64) -> LatLng {
    LatLng::new(TEST_LAT + d_lat, TEST_LON + d_lon).expect("offset point in range")
}

/// Monday 2024-03-04 at `hour`:00 local time.
///
/// # Panics
///
/// Panics if `hour` is not a valid hour of day.
pub fn weekday_at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .and_then(|date| date.and_hms_opt(hour, 0, 0))
        .expect("valid hour")
}

/// An available vehicle at `location`.
pub fn vehicle_at(id: &str, class: VehicleClass, location: LatLng) -> Vehicle {
    Vehicle::new(id, class, location).with_status(VehicleStatus::Available)
}

/// Default engine with the given vehicles registered.
///
/// # Panics
///
/// Panics if the default config fails validation (never).
pub fn engine_with_vehicles(vehicles: impl IntoIterator<Item = Vehicle>) -> QuoteEngine {
    let engine = QuoteEngine::new(EngineConfig::default()).expect("default config is valid");
    for vehicle in vehicles {
        engine.store().register(vehicle);
    }
    engine
}

/// Hour-resolved model with a single slot.
pub fn single_slot_model(region: RegionId, hour: u8, score: f64) -> DemandModel {
    let slot = DemandSlot {
        demand_score: score,
        demand_count: 0,
        avg_fare: 0.0,
        avg_duration: 0.0,
        demand_level: DemandLevel::from_score(score),
    };
    DemandModel::from_slots(
        DemandSchema::HourResolved,
        HashMap::from([(DemandKey::hourly(region, hour), slot)]),
    )
}
