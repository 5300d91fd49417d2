//! Fare computation per vehicle class.
//!
//! Formula: `subtotal = base_fare + distance_km * per_km + duration_min * per_min`,
//! `final_fare = subtotal * surge_multiplier`. Monetary fields are rounded to two
//! decimals on output; the final fare is computed from unrounded inputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::QuoteError;
use crate::fleet::VehicleClass;

/// Per-class tariff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareRates {
    /// Flat charge per trip.
    pub base_fare: f64,
    pub per_km_rate: f64,
    pub per_min_rate: f64,
}

impl FareRates {
    pub const fn new(base_fare: f64, per_km_rate: f64, per_min_rate: f64) -> Self {
        Self {
            base_fare,
            per_km_rate,
            per_min_rate,
        }
    }
}

/// Default fare table (INR).
pub fn default_fare_table() -> BTreeMap<VehicleClass, FareRates> {
    BTreeMap::from([
        (VehicleClass::Economy, FareRates::new(30.0, 15.0, 2.0)),
        (VehicleClass::Sedan, FareRates::new(50.0, 18.0, 3.0)),
        (VehicleClass::Suv, FareRates::new(80.0, 25.0, 5.0)),
    ])
}

/// Itemized fare, every field rounded to two decimals.
///
/// `final_fare` is `subtotal * surge_multiplier` rounded once from the
/// unrounded terms, so it can differ by a cent from the product of the
/// rounded `subtotal` and `surge_multiplier` fields shown here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub base_fare: f64,
    pub distance_cost: f64,
    pub time_cost: f64,
    pub subtotal: f64,
    pub surge_multiplier: f64,
    pub final_fare: f64,
}

/// Round to two decimals (currency precision).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Prices trips against a per-class rate table.
#[derive(Debug, Clone)]
pub struct FareCalculator {
    rates: BTreeMap<VehicleClass, FareRates>,
}

impl Default for FareCalculator {
    fn default() -> Self {
        Self::new(default_fare_table())
    }
}

impl FareCalculator {
    pub fn new(rates: BTreeMap<VehicleClass, FareRates>) -> Self {
        Self { rates }
    }

    /// Rates for `class`. A class missing from the table is an error, never a default.
    pub fn rates(&self, class: VehicleClass) -> Result<FareRates, QuoteError> {
        self.rates
            .get(&class)
            .copied()
            .ok_or_else(|| QuoteError::InvalidVehicleClass(class.to_string()))
    }

    /// Fare for a trip of `distance_km` and `duration_min` in `class`.
    ///
    /// # Errors
    ///
    /// [`QuoteError::InvalidTripMetric`] if any input is negative or not finite,
    /// [`QuoteError::InvalidVehicleClass`] if `class` has no rates.
    pub fn compute(
        &self,
        distance_km: f64,
        duration_min: f64,
        class: VehicleClass,
        surge_multiplier: f64,
    ) -> Result<FareBreakdown, QuoteError> {
        check_metric("distance_km", distance_km)?;
        check_metric("duration_min", duration_min)?;
        check_metric("surge_multiplier", surge_multiplier)?;

        let rates = self.rates(class)?;
        let distance_cost = distance_km * rates.per_km_rate;
        let time_cost = duration_min * rates.per_min_rate;
        let subtotal = rates.base_fare + distance_cost + time_cost;
        let final_fare = subtotal * surge_multiplier;

        Ok(FareBreakdown {
            base_fare: round2(rates.base_fare),
            distance_cost: round2(distance_cost),
            time_cost: round2(time_cost),
            subtotal: round2(subtotal),
            surge_multiplier: round2(surge_multiplier),
            final_fare: round2(final_fare),
        })
    }

    /// Like [`compute`](Self::compute) but accepts a class name from the wire.
    pub fn compute_named(
        &self,
        distance_km: f64,
        duration_min: f64,
        class: &str,
        surge_multiplier: f64,
    ) -> Result<FareBreakdown, QuoteError> {
        let class = class.parse::<VehicleClass>()?;
        self.compute(distance_km, duration_min, class, surge_multiplier)
    }
}

fn check_metric(name: &'static str, value: f64) -> Result<(), QuoteError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(QuoteError::InvalidTripMetric { name, value })
    }
}
