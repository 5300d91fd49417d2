mod support;

use quote_core::demand::{self, DemandLevel, DemandModel, DemandSchema, DemandSource, DEFAULT_DEMAND_SCORE};
use quote_core::error::DemandModelError;
use quote_core::region::RegionId;

use support::temp_file;

fn region(id: &str) -> RegionId {
    id.parse().expect("region id")
}

#[test]
fn hour_resolved_json_records() {
    let file = temp_file(
        ".json",
        r#"[
            { "region_id": "2_2", "hour": 8, "demand_score": 0.9, "demand_count": 42 },
            { "region_id": "2_2", "hour": 9, "demand_score": 0.7 },
            { "region_id": "1_3", "hour": 8, "demand_score": 0.3, "demand_level": "low" }
        ]"#,
    );
    let model = DemandModel::load(file.path()).expect("model");
    assert_eq!(model.schema(), DemandSchema::HourResolved);
    assert_eq!(model.len(), 3);

    let exact = model.score(region("2_2"), 8);
    assert_eq!(exact.score, 0.9);
    assert_eq!(exact.source, DemandSource::ExactHour);

    // 2_2 has no 10:00 slot; 9:00 is the nearest neighbour tried first.
    let neighbour = model.score(region("2_2"), 10);
    assert_eq!(neighbour.score, 0.7);
    assert_eq!(neighbour.source, DemandSource::NeighbouringHour { hour: 9 });

    // 4_4 is unknown; fall back to the mean of all 8:00 slots.
    let mean = model.score(region("4_4"), 8);
    assert!((mean.score - 0.6).abs() < 1e-9);
    assert_eq!(mean.source, DemandSource::CityWideHourMean);

    let nothing = model.score(region("4_4"), 20);
    assert_eq!(nothing.score, DEFAULT_DEMAND_SCORE);
    assert_eq!(nothing.source, DemandSource::Default);
}

#[test]
fn batch_job_output_with_demand_data_key() {
    let file = temp_file(
        ".json",
        r#"{
            "demand_data": [
                { "region_id": "2_3", "hour": 8, "demand_count": 40, "avg_fare": 210.5,
                  "avg_duration": 22.0, "demand_score": 0.9, "demand_level": "high",
                  "surge_multiplier": 1.5 },
                { "region_id": "1_1", "hour": 8, "demand_count": 4, "avg_fare": 95.0,
                  "avg_duration": 11.0, "demand_score": 0.1, "demand_level": "low",
                  "surge_multiplier": 0.9 }
            ],
            "grid_size": 5,
            "summary": { "total_demand": 44, "peak_hours": [8], "high_demand_regions": ["2_3"] }
        }"#,
    );
    let model = DemandModel::load(file.path()).expect("batch output loads");
    assert_eq!(model.schema(), DemandSchema::HourResolved);
    assert_eq!(model.len(), 2);

    let lookup = model.score(region("2_3"), 8);
    assert_eq!(lookup.score, 0.9);
    assert_eq!(lookup.source, DemandSource::ExactHour);
    assert!((model.score(region("4_4"), 8).score - 0.5).abs() < 1e-9);
}

#[test]
fn csv_with_blank_scores_still_loads() {
    let file = temp_file(
        ".csv",
        "region_id,hour,demand_count,avg_fare,avg_duration,demand_score,demand_level
         2_2,7,10,150.0,18.0,,
         2_2,8,10,150.0,18.0,,
",
    );
    let model = DemandModel::load(file.path()).expect("blank scores are not fatal");
    assert_eq!(model.len(), 2);

    let lookup = model.score(region("2_2"), 7);
    assert_eq!(lookup.score, DEFAULT_DEMAND_SCORE);
    assert_eq!(lookup.source, DemandSource::Default);
}

#[test]
fn region_keyed_json_object() {
    let file = temp_file(
        ".json",
        r#"{ "0_0": { "demand_score": 0.2 }, "3_1": { "demand_score": 0.8, "avg_fare": 210.5 } }"#,
    );
    let model = DemandModel::load(file.path()).expect("model");
    assert_eq!(model.schema(), DemandSchema::RegionOnly);

    let lookup = model.score(region("3_1"), 17);
    assert_eq!(lookup.score, 0.8);
    assert_eq!(lookup.source, DemandSource::Region);

    let slot = model.slot(&quote_core::demand::DemandKey::region(region("3_1"))).expect("slot");
    assert_eq!(slot.demand_level, DemandLevel::High);
    assert_eq!(slot.avg_fare, 210.5);

    assert_eq!(model.score(region("4_4"), 17).source, DemandSource::Default);
}

#[test]
fn csv_with_and_without_hour_column() {
    let hourly = temp_file(
        ".csv",
        "region_id,hour,demand_score,demand_count\n2_2,7,0.85,30\n2_2,8,0.95,41\n",
    );
    let model = DemandModel::from_path(hourly.path()).expect("hourly csv");
    assert_eq!(model.schema(), DemandSchema::HourResolved);
    assert_eq!(model.score(region("2_2"), 7).score, 0.85);

    let static_table = temp_file(".csv", "region_id,demand_score\n2_2, 0.4\n0_1,0.1\n");
    let model = DemandModel::from_path(static_table.path()).expect("static csv");
    assert_eq!(model.schema(), DemandSchema::RegionOnly);
    assert_eq!(model.score(region("2_2"), 3).score, 0.4);
}

#[test]
fn mixed_schema_is_rejected() {
    let file = temp_file(
        ".json",
        r#"[{ "region_id": "2_2", "hour": 8, "demand_score": 0.9 }, { "region_id": "2_3", "demand_score": 0.5 }]"#,
    );
    assert!(matches!(
        DemandModel::from_path(file.path()),
        Err(DemandModelError::MixedSchema)
    ));
    assert!(DemandModel::load(file.path()).is_none());
}

#[test]
fn bad_region_or_hour_is_rejected() {
    let bad_region = temp_file(".json", r#"[{ "region_id": "north", "demand_score": 0.9 }]"#);
    assert!(matches!(
        DemandModel::from_path(bad_region.path()),
        Err(DemandModelError::InvalidRegion(_))
    ));

    let bad_hour = temp_file(".json", r#"[{ "region_id": "1_1", "hour": 24, "demand_score": 0.9 }]"#);
    assert!(matches!(
        DemandModel::from_path(bad_hour.path()),
        Err(DemandModelError::InvalidHour(24))
    ));
}

#[test]
fn missing_or_garbled_file_means_no_model() {
    assert!(DemandModel::load("/no/such/demand_model.json").is_none());

    let garbled = temp_file(".json", "not json at all");
    assert!(DemandModel::load(garbled.path()).is_none());

    let lookup = demand::score(None, region("2_2"), 8);
    assert_eq!(lookup.score, DEFAULT_DEMAND_SCORE);
    assert_eq!(lookup.source, DemandSource::NoModel);
}
