//! Seed a demo fleet around Manipal and print quotes for each ranking mode.
//!
//! Run with: cargo run -p quote_core --example quote_run

use quote_core::config::EngineConfig;
use quote_core::duration::TrafficProfileEstimator;
use quote_core::quote::{Location, QuoteEngine, QuoteRequest};

fn main() {
    const FLEET_SIZE: usize = 50;
    const SEED: u64 = 123;

    let config_path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/udupi.json");
    let config = match EngineConfig::from_path(config_path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("falling back to default config: {error}");
            EngineConfig::default()
        }
    };
    let center = config.grid.bbox.center();

    let engine = match QuoteEngine::new(config) {
        Ok(engine) => engine.with_duration_estimator(Box::new(TrafficProfileEstimator::rush_hour(35.0))),
        Err(error) => {
            eprintln!("invalid config: {error}");
            return;
        }
    };
    let Ok(center) = h3o::LatLng::new(center.0, center.1) else {
        eprintln!("bounding box centre is not a valid coordinate");
        return;
    };
    engine.store().seed_fleet(center, FLEET_SIZE, 0.05, Some(SEED));

    let trips = [
        ("Manipal University", Location::new(13.3467, 74.7926)),
        ("Malpe Beach", Location::new(13.35, 74.7042)),
        ("Udupi town", Location::new(13.3409, 74.7421)),
    ];
    let drop = Location::new(13.3300, 74.7500);

    println!("--- Quote run ({FLEET_SIZE} vehicles, seed {SEED}) ---");
    for (name, pickup) in trips {
        for mode in ["fastest", "cheapest", "balanced"] {
            let request = QuoteRequest::new(pickup, drop).mode(mode);
            match engine.quote(&request) {
                Ok(quote) => {
                    println!(
                        "{name:<20} {mode:<9} {:>5.2} km  {:>5.1} min  surge x{:.2} ({})",
                        quote.distance_km,
                        quote.estimated_duration_minutes,
                        quote.surge_multiplier,
                        quote.surge_reason,
                    );
                    for (i, offer) in quote.offers.iter().take(3).enumerate() {
                        println!(
                            "    {}. {:<12} {:<8} pickup {:>4.1} min  fare {:>8.2}  score {:.3}",
                            i + 1,
                            offer.vehicle_id,
                            offer.vehicle_class.as_str(),
                            offer.eta_pickup_minutes,
                            offer.final_fare,
                            offer.score,
                        );
                    }
                    if quote.offers.is_empty() {
                        println!("    no vehicles available");
                    }
                }
                Err(error) => println!("{name}: {error}"),
            }
        }
    }
}
