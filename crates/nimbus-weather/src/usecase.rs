//! Entry points the presentation layer calls.

use std::sync::Arc;

use nimbus_core::{ResultState, MAX_FORECAST_DAYS, MIN_QUERY_LENGTH};

use crate::orchestrator::ResultStream;
use crate::repository::{ForecastRepository, LocationRepository};
use crate::types::{Forecast, Location};

pub const DEFAULT_FORECAST_DAYS: u8 = 3;

/// Location search with a minimum-length gate in front of the repository.
pub struct SearchLocationsUseCase {
    repository: Arc<LocationRepository>,
    min_query_length: usize,
}

impl SearchLocationsUseCase {
    pub fn new(repository: Arc<LocationRepository>) -> Self {
        Self::with_min_query_length(repository, MIN_QUERY_LENGTH)
    }

    /// A minimum below two characters is raised to two.
    pub fn with_min_query_length(
        repository: Arc<LocationRepository>,
        min_query_length: usize,
    ) -> Self {
        Self {
            repository,
            min_query_length: min_query_length.max(MIN_QUERY_LENGTH),
        }
    }

    /// Queries shorter than the minimum (in characters) yield a single empty
    /// `Success` without touching the cache or the network.
    pub fn execute(&self, query: &str) -> ResultStream<Vec<Location>> {
        if query.chars().count() < self.min_query_length {
            tracing::debug!("Query '{}' below minimum length, skipping search", query);
            return Box::pin(tokio_stream::once(ResultState::success(Vec::new())));
        }
        self.repository.search_locations(query)
    }
}

pub struct GetForecastUseCase {
    repository: Arc<ForecastRepository>,
}

impl GetForecastUseCase {
    pub fn new(repository: Arc<ForecastRepository>) -> Self {
        Self { repository }
    }

    /// `days` is clamped to `1..=MAX_FORECAST_DAYS`.
    pub fn execute(&self, location_name: &str, days: u8) -> ResultStream<Forecast> {
        let days = days.clamp(1, MAX_FORECAST_DAYS);
        self.repository.get_forecast(location_name, days)
    }

    pub fn execute_default(&self, location_name: &str) -> ResultStream<Forecast> {
        self.execute(location_name, DEFAULT_FORECAST_DAYS)
    }
}
