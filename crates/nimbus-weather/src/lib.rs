//! Weather data for Nimbus
//!
//! Location search and multi-day forecasts from WeatherAPI.com, served
//! cache-first from a local SQLite store.

pub mod cache;
pub mod dto;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod repository;
pub mod types;
pub mod usecase;

pub use cache::{CacheChange, ForecastCache, LocationCache, WeatherCache};
pub use error::WeatherError;
pub use orchestrator::ResultStream;
pub use provider::{WeatherApi, WeatherApiClient};
pub use repository::{ForecastRepository, LocationRepository};
pub use types::*;
pub use usecase::{GetForecastUseCase, SearchLocationsUseCase};
