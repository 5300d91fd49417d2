use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime, Timelike};
use clap::{Parser, Subcommand};
use h3o::LatLng;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quote_core::config::EngineConfig;
use quote_core::demand::DemandModel;
use quote_core::duration::TrafficProfileEstimator;
use quote_core::fleet::VehicleStatus;
use quote_core::quote::{Location, QuoteEngine, QuoteRequest};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "quote",
    about = "Price, rank and look up ride offers against a seeded demo fleet"
)]
struct Cli {
    /// Engine config (JSON); defaults apply when omitted
    #[arg(long, env = "QUOTE_CONFIG")]
    config: Option<PathBuf>,
    /// Demand model (JSON or CSV); a missing or unreadable file means default demand
    #[arg(long, env = "QUOTE_DEMAND_MODEL")]
    demand_model: Option<PathBuf>,
    /// Vehicles to seed around the fleet centre
    #[arg(long, default_value_t = 50)]
    fleet_size: usize,
    /// RNG seed for the demo fleet
    #[arg(long)]
    seed: Option<u64>,
    /// Fleet centre latitude (defaults to the grid centre)
    #[arg(long, requires = "center_lon", allow_negative_numbers = true)]
    center_lat: Option<f64>,
    /// Fleet centre longitude (defaults to the grid centre)
    #[arg(long, requires = "center_lat", allow_negative_numbers = true)]
    center_lon: Option<f64>,
    /// Fleet scatter around the centre, in degrees
    #[arg(long, default_value_t = 0.05)]
    spread: f64,
    /// Estimate trip durations with the rush-hour traffic profile at this base speed (km/h)
    #[arg(long)]
    traffic_speed: Option<f64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quote a trip and rank the nearby vehicles
    Quote {
        #[arg(long, allow_negative_numbers = true)]
        pickup_lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        pickup_lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        drop_lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        drop_lon: f64,
        /// fastest, cheapest or balanced
        #[arg(long, default_value = "balanced")]
        mode: String,
        /// Local request time, e.g. 2024-03-04T08:30:00
        #[arg(long)]
        at: Option<NaiveDateTime>,
    },
    /// Surge multiplier and reason at a pickup point
    Surge {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Hour of day; defaults to the current local hour
        #[arg(long)]
        hour: Option<u8>,
    },
    /// Grid region of a point
    Region {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },
    /// Fare breakdown for a trip
    Price {
        #[arg(long)]
        distance_km: f64,
        #[arg(long)]
        duration_min: f64,
        /// economy, sedan or suv
        #[arg(long)]
        class: String,
        #[arg(long, default_value_t = 1.0)]
        surge: f64,
    },
    /// Available vehicles around a point
    Nearby {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long)]
        radius_km: Option<f64>,
    },
    /// Move a seeded vehicle (unknown ids are reported, not created)
    Update {
        #[arg(long)]
        id: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// available, busy or offline
        #[arg(long)]
        status: Option<String>,
    },
    /// Which collaborators are loaded and how many vehicles are registered
    Health,
}

// ── Entry point ────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = build_engine(&cli)?;

    let output = match cli.command {
        Commands::Quote {
            pickup_lat,
            pickup_lon,
            drop_lat,
            drop_lon,
            mode,
            at,
        } => {
            let mut request = QuoteRequest::new(
                Location::new(pickup_lat, pickup_lon),
                Location::new(drop_lat, drop_lon),
            )
            .mode(mode);
            if let Some(at) = at {
                request = request.at(at);
            }
            let quote = engine.quote(&request)?;
            if !quote.has_offers() {
                info!("no vehicles available in range");
            }
            serde_json::to_value(quote)?
        }
        Commands::Surge { lat, lon, hour } => {
            let hour = hour.unwrap_or_else(|| Local::now().hour() as u8);
            if hour > 23 {
                bail!("hour must be 0-23, got {hour}");
            }
            let pickup = quote_core::geo::validate_coordinate(lat, lon)?;
            let (region, decision) = engine.surge_at(pickup, hour);
            json!({
                "region_id": region,
                "hour": hour,
                "surge_multiplier": decision.multiplier,
                "surge_reason": decision.reason.to_string(),
                "detail": decision.reason,
            })
        }
        Commands::Region { lat, lon } => {
            json!({ "region_id": engine.resolve_region(lat, lon) })
        }
        Commands::Price {
            distance_km,
            duration_min,
            class,
            surge,
        } => serde_json::to_value(engine.price(distance_km, duration_min, &class, surge)?)?,
        Commands::Nearby { lat, lon, radius_km } => {
            let vehicles: Vec<_> = engine
                .nearby_vehicles(lat, lon, radius_km)?
                .into_iter()
                .map(|snapshot| {
                    json!({
                        "id": snapshot.vehicle.id,
                        "vehicle_class": snapshot.vehicle.class,
                        "lat": snapshot.vehicle.location.lat(),
                        "lon": snapshot.vehicle.location.lng(),
                        "rating": snapshot.vehicle.rating,
                        "trips_completed": snapshot.vehicle.trips_completed,
                        "distance_km": snapshot.distance_km,
                    })
                })
                .collect();
            json!({ "count": vehicles.len(), "vehicles": vehicles })
        }
        Commands::Update { id, lat, lon, status } => {
            let status = status.as_deref().map(str::parse::<VehicleStatus>).transpose()?;
            let updated = engine.update_vehicle(&id, lat, lon, status)?;
            json!({
                "vehicle_id": id,
                "updated": updated,
                "region_id": engine.resolve_region(lat, lon),
            })
        }
        Commands::Health => serde_json::to_value(engine.health())?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn build_engine(cli: &Cli) -> Result<QuoteEngine> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    if !cli.spread.is_finite() || cli.spread < 0.0 {
        bail!("--spread must be a non-negative number of degrees, got {}", cli.spread);
    }
    let (grid_lat, grid_lon) = config.grid.bbox.center();
    let center = LatLng::new(
        cli.center_lat.unwrap_or(grid_lat),
        cli.center_lon.unwrap_or(grid_lon),
    )
    .context("fleet centre is not a valid coordinate")?;

    let demand = cli.demand_model.as_ref().and_then(|path| DemandModel::load(path));
    let mut engine = QuoteEngine::new(config)?.with_demand_model(demand);
    if let Some(speed) = cli.traffic_speed {
        engine = engine.with_duration_estimator(Box::new(TrafficProfileEstimator::rush_hour(speed)));
    }

    let seeded = engine
        .store()
        .seed_fleet(center, cli.fleet_size, cli.spread, cli.seed);
    info!(vehicles = seeded, "demo fleet ready");
    Ok(engine)
}
