#![allow(dead_code)]

use std::io::Write;

use quote_core::fleet::{Vehicle, VehicleClass};
use quote_core::test_helpers::{offset_point, vehicle_at};
use tempfile::{Builder, NamedTempFile};

/// Write `contents` to a temp file ending in `suffix` (`.json`, `.csv`).
pub fn temp_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

/// A close but expensive suv and a distant cheap economy car, both inside the
/// default search radius.
pub fn near_suv_far_economy() -> Vec<Vehicle> {
    vec![
        vehicle_at("near_suv", VehicleClass::Suv, offset_point(0.005, 0.0)),
        vehicle_at("far_economy", VehicleClass::Economy, offset_point(0.06, 0.0)),
    ]
}

/// A ring of `count` available vehicles around the test point.
pub fn ring_of_vehicles(count: usize) -> Vec<Vehicle> {
    let classes = VehicleClass::ALL;
    (0..count)
        .map(|i| {
            let angle = i as f64 / count.max(1) as f64 * std::f64::consts::TAU;
            let radius = 0.01 + 0.04 * (i % 5) as f64 / 5.0;
            vehicle_at(
                &format!("ring_{i}"),
                classes[i % classes.len()],
                offset_point(radius * angle.sin(), radius * angle.cos()),
            )
        })
        .collect()
}
