//! Geographic primitives: coordinate validation, bounding boxes and
//! great-circle distance.

use h3o::LatLng;
use serde::{Deserialize, Serialize};

use crate::error::QuoteError;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate length of one degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Validate a coordinate at the public boundary.
///
/// Rejects non-finite values and anything outside lat [-90, 90], lon [-180, 180].
pub fn validate_coordinate(lat: f64, lon: f64) -> Result<LatLng, QuoteError> {
    let in_range = (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon);
    if !in_range {
        return Err(QuoteError::InvalidCoordinate { lat, lon });
    }
    LatLng::new(lat, lon).map_err(|_| QuoteError::InvalidCoordinate { lat, lon })
}

/// Haversine distance between two coordinates in kilometres.
pub fn distance_km(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lon1) = (a.lat().to_radians(), a.lng().to_radians());
    let (lat2, lon2) = (b.lat().to_radians(), b.lng().to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// True when both spans are finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.lat_span().is_finite()
            && self.lon_span().is_finite()
            && self.lat_span() > 0.0
            && self.lon_span() > 0.0
    }

    pub fn contains(&self, point: LatLng) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat())
            && (self.min_lon..=self.max_lon).contains(&point.lng())
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.min_lat + self.lat_span() / 2.0,
            self.min_lon + self.lon_span() / 2.0,
        )
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new(40.70, 40.80, -74.02, -73.92)
    }
}
