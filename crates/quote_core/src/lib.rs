//! Ride-quote engine: region grid, demand lookup, surge pricing, fares,
//! multi-criteria ranking and an in-memory fleet store.

pub mod config;
pub mod demand;
pub mod duration;
pub mod error;
pub mod fleet;
pub mod geo;
pub mod pricing;
pub mod quote;
pub mod ranking;
pub mod region;
pub mod surge;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use config::EngineConfig;
pub use error::{ConfigError, QuoteError};
pub use fleet::{Vehicle, VehicleClass, VehicleStatus, VehicleStore};
pub use quote::{QuoteEngine, QuoteRequest, RideQuote};
pub use ranking::UserMode;
pub use region::RegionId;
