//! Trip duration estimation.
//!
//! The production estimator is an external learned model reached through the
//! [`DurationEstimator`] trait. When it is absent, or declines to answer, the
//! engine falls back to [`AverageSpeedEstimator`].

use chrono::{Datelike, Timelike};
use serde::Serialize;

/// Average speed assumed when no estimator answers (km/h).
pub const FALLBACK_SPEED_KMH: f64 = 30.0;

/// Time-of-day features handed to duration estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemporalContext {
    pub hour: u8,
    /// 0 = Monday.
    pub day_of_week: u8,
    pub day_of_month: u8,
    pub month: u8,
    pub is_rush_hour: bool,
    pub is_morning_rush: bool,
    pub is_evening_rush: bool,
    pub is_weekend: bool,
    pub is_late_night: bool,
}

impl TemporalContext {
    pub fn from_datetime<T: Datelike + Timelike>(at: &T) -> Self {
        let hour = at.hour() as u8;
        let day_of_week = at.weekday().num_days_from_monday() as u8;
        let is_morning_rush = (7..10).contains(&hour);
        let is_evening_rush = (17..20).contains(&hour);
        Self {
            hour,
            day_of_week,
            day_of_month: at.day() as u8,
            month: at.month() as u8,
            is_rush_hour: is_morning_rush || is_evening_rush,
            is_morning_rush,
            is_evening_rush,
            is_weekend: day_of_week >= 5,
            is_late_night: hour >= 23 || hour < 5,
        }
    }
}

/// Estimate trip duration in minutes. `None` means "no opinion".
pub trait DurationEstimator: Send + Sync {
    fn estimate_minutes(&self, distance_km: f64, context: &TemporalContext) -> Option<f64>;
}

/// Fixed average speed, independent of time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AverageSpeedEstimator {
    pub speed_kmh: f64,
}

impl AverageSpeedEstimator {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Never fails; a non-positive speed is treated as 1 km/h.
    pub fn minutes(&self, distance_km: f64) -> f64 {
        distance_km.max(0.0) / self.speed_kmh.max(1.0) * 60.0
    }
}

impl Default for AverageSpeedEstimator {
    fn default() -> Self {
        Self::new(FALLBACK_SPEED_KMH)
    }
}

impl DurationEstimator for AverageSpeedEstimator {
    fn estimate_minutes(&self, distance_km: f64, _context: &TemporalContext) -> Option<f64> {
        Some(self.minutes(distance_km))
    }
}

/// Base free-flow speed scaled by an hourly factor (1.0 = free flow).
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficProfileEstimator {
    pub base_speed_kmh: f64,
    pub hourly_factors: [f64; 24],
}

impl TrafficProfileEstimator {
    pub fn new(base_speed_kmh: f64, hourly_factors: [f64; 24]) -> Self {
        Self {
            base_speed_kmh,
            hourly_factors,
        }
    }

    /// City profile with morning and evening rush slowdowns.
    ///
    /// - 00–06: 1.0
    /// - 07–09: 0.5 (morning rush)
    /// - 10–16: 0.75
    /// - 17–19: 0.45 (evening rush)
    /// - 20–22: 0.8
    /// - 23: 1.0
    pub fn rush_hour(base_speed_kmh: f64) -> Self {
        let mut f = [1.0_f64; 24];
        for slot in &mut f[7..10] {
            *slot = 0.5;
        }
        for slot in &mut f[10..17] {
            *slot = 0.75;
        }
        for slot in &mut f[17..20] {
            *slot = 0.45;
        }
        for slot in &mut f[20..23] {
            *slot = 0.8;
        }
        Self::new(base_speed_kmh, f)
    }
}

impl DurationEstimator for TrafficProfileEstimator {
    fn estimate_minutes(&self, distance_km: f64, context: &TemporalContext) -> Option<f64> {
        let factor = self.hourly_factors[(context.hour % 24) as usize];
        let speed = self.base_speed_kmh * factor;
        (speed.is_finite() && speed > 0.0).then(|| distance_km.max(0.0) / speed * 60.0)
    }
}
