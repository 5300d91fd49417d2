//! Read-only demand lookup keyed by region, optionally resolved by hour.
//!
//! The model is produced offline and loaded once. Two on-disk schemas are
//! accepted and normalized into the same [`DemandKey`] map:
//!
//! - **region-only**: one slot per region, `hour` absent;
//! - **hour-resolved**: one slot per `(region, hour)`.
//!
//! [`DemandModel::score`] walks an ordered chain of fallback tiers and reports
//! which one answered via [`DemandSource`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DemandModelError;
use crate::region::RegionId;

/// Score used when every tier misses.
pub const DEFAULT_DEMAND_SCORE: f64 = 0.5;

/// Neighbouring hours tried for an hour-resolved miss, in order.
const HOUR_OFFSETS: [i32; 4] = [1, -1, 2, -2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DemandKey {
    pub region: RegionId,
    pub hour: Option<u8>,
}

impl DemandKey {
    pub fn region(region: RegionId) -> Self {
        Self { region, hour: None }
    }

    pub fn hourly(region: RegionId, hour: u8) -> Self {
        Self {
            region,
            hour: Some(hour),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandLevel {
    Low,
    Medium,
    High,
}

impl DemandLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            DemandLevel::Low
        } else if score < 0.7 {
            DemandLevel::Medium
        } else {
            DemandLevel::High
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemandSlot {
    pub demand_score: f64,
    pub demand_count: u32,
    pub avg_fare: f64,
    pub avg_duration: f64,
    pub demand_level: DemandLevel,
}

impl DemandSlot {
    /// The score, if it is usable for pricing.
    fn usable_score(&self) -> Option<f64> {
        let score = self.demand_score;
        (score.is_finite() && (0.0..=1.0).contains(&score)).then_some(score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandSchema {
    RegionOnly,
    HourResolved,
}

/// Which fallback tier produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum DemandSource {
    ExactHour,
    Region,
    NeighbouringHour { hour: u8 },
    CityWideHourMean,
    Default,
    NoModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DemandLookup {
    pub score: f64,
    pub source: DemandSource,
}

impl DemandLookup {
    fn new(score: f64, source: DemandSource) -> Self {
        Self { score, source }
    }

    pub fn is_fallback(&self) -> bool {
        !matches!(self.source, DemandSource::ExactHour | DemandSource::Region)
    }
}

#[derive(Debug, Clone)]
pub struct DemandModel {
    schema: DemandSchema,
    slots: HashMap<DemandKey, DemandSlot>,
    hour_means: HashMap<u8, f64>,
}

// ---------------------------------------------------------------------------
// On-disk records
// ---------------------------------------------------------------------------

/// Flat record shared by the JSON array form and CSV rows. CSV cannot carry
/// `#[serde(flatten)]`, so the slot fields are repeated here.
#[derive(Debug, Deserialize)]
struct DemandRecord {
    region_id: String,
    #[serde(default)]
    hour: Option<u8>,
    /// Empty CSV cells and JSON `null` load as an unusable slot.
    #[serde(default)]
    demand_score: Option<f64>,
    #[serde(default)]
    demand_count: u32,
    #[serde(default)]
    avg_fare: f64,
    #[serde(default)]
    avg_duration: f64,
    #[serde(default)]
    demand_level: Option<DemandLevel>,
}

/// Value side of the region-keyed JSON object form.
#[derive(Debug, Deserialize)]
struct SlotFields {
    #[serde(default)]
    demand_score: Option<f64>,
    #[serde(default)]
    demand_count: u32,
    #[serde(default)]
    avg_fare: f64,
    #[serde(default)]
    avg_duration: f64,
    #[serde(default)]
    demand_level: Option<DemandLevel>,
}

impl DemandRecord {
    fn into_slot(self) -> DemandSlot {
        let demand_score = self.demand_score.unwrap_or(f64::NAN);
        let demand_level = self.demand_level.unwrap_or_else(|| {
            if demand_score.is_finite() {
                DemandLevel::from_score(demand_score)
            } else {
                DemandLevel::Low
            }
        });
        DemandSlot {
            demand_level,
            demand_score,
            demand_count: self.demand_count,
            avg_fare: self.avg_fare,
            avg_duration: self.avg_duration,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DemandFile {
    Records(Vec<DemandRecord>),
    /// Batch-job output: `{"demand_data": [...], "grid_size": .., "summary": {..}}`.
    /// Keys other than `demand_data` are ignored.
    Envelope { demand_data: Vec<DemandRecord> },
    ByRegion(BTreeMap<String, SlotFields>),
}

impl DemandModel {
    /// Load a model, returning `None` (and logging why) if the source cannot be
    /// read or parsed. Callers treat `None` as "defaults everywhere".
    pub fn load(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        match Self::from_path(path) {
            Ok(model) => {
                info!(
                    path = %path.display(),
                    slots = model.len(),
                    schema = ?model.schema(),
                    "demand model loaded"
                );
                Some(model)
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "demand model unavailable, using defaults");
                None
            }
        }
    }

    /// Parse a model file. `.csv` files are read as CSV, anything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DemandModelError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| DemandModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            Self::from_csv_str(&contents)
        } else {
            Self::from_json_str(&contents)
        }
    }

    pub fn from_json_str(contents: &str) -> Result<Self, DemandModelError> {
        let records = match serde_json::from_str::<DemandFile>(contents)? {
            DemandFile::Records(records) | DemandFile::Envelope { demand_data: records } => records,
            DemandFile::ByRegion(by_region) => by_region
                .into_iter()
                .map(|(region_id, fields)| DemandRecord {
                    region_id,
                    hour: None,
                    demand_score: fields.demand_score,
                    demand_count: fields.demand_count,
                    avg_fare: fields.avg_fare,
                    avg_duration: fields.avg_duration,
                    demand_level: fields.demand_level,
                })
                .collect(),
        };
        Self::from_records(records)
    }

    /// A CSV with an `hour` column is hour-resolved; without one it is region-only.
    pub fn from_csv_str(contents: &str) -> Result<Self, DemandModelError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());
        let records = reader
            .deserialize::<DemandRecord>()
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_records(records)
    }

    fn from_records(records: Vec<DemandRecord>) -> Result<Self, DemandModelError> {
        let hourly = records.iter().filter(|record| record.hour.is_some()).count();
        let schema = match hourly {
            0 => DemandSchema::RegionOnly,
            n if n == records.len() => DemandSchema::HourResolved,
            _ => return Err(DemandModelError::MixedSchema),
        };

        let mut slots = HashMap::with_capacity(records.len());
        for record in records {
            let region = record
                .region_id
                .parse::<RegionId>()
                .map_err(|_| DemandModelError::InvalidRegion(record.region_id.clone()))?;
            if let Some(hour) = record.hour {
                if hour > 23 {
                    return Err(DemandModelError::InvalidHour(hour));
                }
            }
            let key = DemandKey {
                region,
                hour: record.hour,
            };
            slots.insert(key, record.into_slot());
        }

        Ok(Self::from_slots(schema, slots))
    }

    /// Build a model from already-keyed slots. Keys must match `schema`.
    pub fn from_slots(schema: DemandSchema, slots: HashMap<DemandKey, DemandSlot>) -> Self {
        let mut sums: HashMap<u8, (f64, usize)> = HashMap::new();
        for (key, slot) in &slots {
            let (Some(hour), Some(score)) = (key.hour, slot.usable_score()) else {
                continue;
            };
            let entry = sums.entry(hour).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
        let hour_means = sums
            .into_iter()
            .map(|(hour, (sum, count))| (hour, sum / count as f64))
            .collect();

        Self {
            schema,
            slots,
            hour_means,
        }
    }

    pub fn schema(&self) -> DemandSchema {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, key: &DemandKey) -> Option<&DemandSlot> {
        self.slots.get(key)
    }

    fn usable(&self, key: DemandKey) -> Option<f64> {
        self.slots.get(&key).and_then(DemandSlot::usable_score)
    }

    /// Demand score for `region` at `hour` (taken modulo 24), in `[0, 1]`.
    ///
    /// Tiers, first hit wins:
    /// 1. exact `(region, hour)` (hour-resolved models);
    /// 2. `region` alone (region-only models);
    /// 3. `hour+1, hour-1, hour+2, hour-2`, wrapping (hour-resolved models);
    /// 4. mean score of every slot at `hour`;
    /// 5. [`DEFAULT_DEMAND_SCORE`].
    ///
    /// A slot with an unusable score counts as a miss for its tier.
    pub fn score(&self, region: RegionId, hour: u8) -> DemandLookup {
        let hour = hour % 24;
        let lookup = match self.schema {
            DemandSchema::HourResolved => self
                .usable(DemandKey::hourly(region, hour))
                .map(|score| DemandLookup::new(score, DemandSource::ExactHour))
                .or_else(|| self.neighbouring_hour(region, hour)),
            DemandSchema::RegionOnly => self
                .usable(DemandKey::region(region))
                .map(|score| DemandLookup::new(score, DemandSource::Region)),
        }
        .or_else(|| {
            self.hour_means
                .get(&hour)
                .map(|mean| DemandLookup::new(*mean, DemandSource::CityWideHourMean))
        })
        .unwrap_or(DemandLookup::new(DEFAULT_DEMAND_SCORE, DemandSource::Default));

        if lookup.is_fallback() {
            debug!(%region, hour, source = ?lookup.source, score = lookup.score, "demand fallback");
        }
        lookup
    }

    fn neighbouring_hour(&self, region: RegionId, hour: u8) -> Option<DemandLookup> {
        HOUR_OFFSETS.iter().find_map(|offset| {
            let candidate = (hour as i32 + offset).rem_euclid(24) as u8;
            self.usable(DemandKey::hourly(region, candidate)).map(|score| {
                DemandLookup::new(score, DemandSource::NeighbouringHour { hour: candidate })
            })
        })
    }
}

/// Score lookup that tolerates a missing model.
pub fn score(model: Option<&DemandModel>, region: RegionId, hour: u8) -> DemandLookup {
    match model {
        Some(model) => model.score(region, hour),
        None => DemandLookup::new(DEFAULT_DEMAND_SCORE, DemandSource::NoModel),
    }
}
