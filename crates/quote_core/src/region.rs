//! Region bucketing over a fixed N×N grid laid across a bounding box.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::geo::BoundingBox;

/// Discrete grid cell, rendered as `"<lat_idx>_<lon_idx>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId {
    pub lat_idx: u32,
    pub lon_idx: u32,
}

impl RegionId {
    pub fn new(lat_idx: u32, lon_idx: u32) -> Self {
        Self { lat_idx, lon_idx }
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.lat_idx, self.lon_idx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRegionIdError(pub String);

impl fmt::Display for ParseRegionIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid region id '{}'", self.0)
    }
}

impl std::error::Error for ParseRegionIdError {}

impl FromStr for RegionId {
    type Err = ParseRegionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRegionIdError(s.to_string());
        let (lat, lon) = s.trim().split_once('_').ok_or_else(err)?;
        let lat_idx = lat.parse().map_err(|_| err())?;
        let lon_idx = lon.parse().map_err(|_| err())?;
        Ok(Self { lat_idx, lon_idx })
    }
}

impl Serialize for RegionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RegionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Maps coordinates to [`RegionId`]s.
///
/// Points outside the bounding box are clamped to the nearest edge cell, and a
/// point on the upper bound lands in the last cell. Resolution is at least 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionGrid {
    bbox: BoundingBox,
    resolution: u32,
}

impl RegionGrid {
    pub fn new(bbox: BoundingBox, resolution: u32) -> Self {
        Self {
            bbox,
            resolution: resolution.max(1),
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn resolve(&self, lat: f64, lon: f64) -> RegionId {
        RegionId {
            lat_idx: self.axis_index(lat, self.bbox.min_lat, self.bbox.lat_span()),
            lon_idx: self.axis_index(lon, self.bbox.min_lon, self.bbox.lon_span()),
        }
    }

    fn axis_index(&self, value: f64, min: f64, span: f64) -> u32 {
        let last = (self.resolution - 1) as f64;
        let raw = ((value - min) / span * self.resolution as f64).floor();
        if raw.is_nan() {
            return 0;
        }
        raw.clamp(0.0, last) as u32
    }

    /// True when the region lies on this grid.
    pub fn contains(&self, region: RegionId) -> bool {
        region.lat_idx < self.resolution && region.lon_idx < self.resolution
    }

    /// Every region on the grid, row-major.
    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        (0..self.resolution)
            .flat_map(move |i| (0..self.resolution).map(move |j| RegionId::new(i, j)))
    }
}
